use pretty_assertions::assert_eq;

use crate::{compile, Flags};

/// Compiles `pattern` with the given flag letters and returns the span of
/// the first match in `subject`, if any.
fn span(pattern: &str, flags: &str, subject: &str) -> Option<(usize, usize)> {
    let flags = Flags::parse(flags).unwrap();
    let pattern = compile(pattern, flags).unwrap();
    pattern.find(subject, 0).map(|m| (m.start(), m.end()))
}

/// Like [`span`], but returns the text of every group, `None` for groups
/// that did not participate.
fn groups<'s>(
    pattern: &str,
    flags: &str,
    subject: &'s str,
) -> Option<Vec<Option<&'s str>>> {
    let flags = Flags::parse(flags).unwrap();
    let pattern = compile(pattern, flags).unwrap();
    let m = pattern.find(subject, 0)?;
    Some((0..m.len()).map(|i| m.group_str(subject, i)).collect())
}

#[test]
fn literals() {
    assert_eq!(span("world", "", "hello world"), Some((6, 11)));
    assert_eq!(span("world", "", "hello"), None);
    assert_eq!(span("", "", "abc"), Some((0, 0)));
    assert_eq!(span("abc", "", "ababc"), Some((2, 5)));
}

#[test]
fn classes() {
    assert_eq!(span("[0-9]+", "", "order 4231!"), Some((6, 10)));
    assert_eq!(span("[^ ]+", "", "  xy "), Some((2, 4)));
    assert_eq!(span("[]a]+", "", "x]a]"), Some((1, 4)));
    assert_eq!(span("[a-]+", "", "b-a-"), Some((1, 4)));
    assert_eq!(span("[[:xdigit:]]+", "", "zzcafez"), Some((2, 6)));
    assert_eq!(span(r"[\d]+", "", "a12b"), Some((1, 3)));
    assert_eq!(span(r"[\D]+", "", "12ab3"), Some((2, 4)));
}

#[test]
fn dot() {
    assert_eq!(span("a.c", "", "abc"), Some((0, 3)));
    assert_eq!(span("a.c", "", "a\nc"), None);
    assert_eq!(span("a.c", "s", "a\nc"), Some((0, 3)));
}

#[test]
fn alternation_prefers_first_branch() {
    assert_eq!(span("a|ab", "", "ab"), Some((0, 1)));
    assert_eq!(span("ab|a", "", "ab"), Some((0, 2)));
    assert_eq!(span("x|y|z", "", "ccyb"), Some((2, 3)));
}

#[test]
fn greedy_loops() {
    assert_eq!(span("a{2,4}", "", "aaaaa"), Some((0, 4)));
    assert_eq!(span("a*", "", "aaa"), Some((0, 3)));
    assert_eq!(span("a+b", "", "caaab"), Some((1, 5)));
    assert_eq!(span("a{3}", "", "aa"), None);
    assert_eq!(span("ab{2,}", "", "abbbb"), Some((0, 5)));
}

#[test]
fn lazy_loops() {
    assert_eq!(span("a{2,4}?", "", "aaaaa"), Some((0, 2)));
    assert_eq!(span("a*?", "", "aaa"), Some((0, 0)));
    assert_eq!(span("a+?b", "", "aaab"), Some((0, 4)));
    assert_eq!(span("<.+?>", "", "<a><b>"), Some((0, 3)));
}

#[test]
fn possessive_loops() {
    // The loop eats all four characters and never gives one back.
    assert_eq!(span("a{2,4}+a", "", "aaaa"), None);
    assert_eq!(span("a{2,4}+a", "", "aaaaa"), Some((0, 5)));
    assert_eq!(span("a*+", "", "aaa"), Some((0, 3)));
    // General (non-single-node) possessive body.
    assert_eq!(span("(?:ab)++ab", "", "ababab"), None);
    assert_eq!(span("(?:ab)++c", "", "ababc"), Some((0, 5)));
}

#[test]
fn ungreedy_flag_inverts_quantifiers() {
    assert_eq!(span("a{2,4}", "U", "aaaaa"), Some((0, 2)));
    assert_eq!(span("a{2,4}?", "U", "aaaaa"), Some((0, 4)));
}

#[test]
fn empty_loop_bodies_terminate() {
    assert_eq!(span("(a?)*", "", "aaa"), Some((0, 3)));
    assert_eq!(span("(a?)*", "", "bbb"), Some((0, 0)));
    assert_eq!(span("(?:a*)*", "", "aab"), Some((0, 2)));
    assert_eq!(span("(?:)*x", "", "x"), Some((0, 1)));
}

#[test]
fn groups_and_spans() {
    assert_eq!(
        groups("(a)(b)?", "", "a"),
        Some(vec![Some("a"), Some("a"), None])
    );
    assert_eq!(
        groups("(a)(b)?", "", "ab"),
        Some(vec![Some("ab"), Some("a"), Some("b")])
    );
    // The group reports its last iteration's capture.
    assert_eq!(
        groups("(?:(a|b))+", "", "ab"),
        Some(vec![Some("ab"), Some("b")])
    );
    assert_eq!(
        groups("(x(y))z", "", "wxyz"),
        Some(vec![Some("xyz"), Some("xy"), Some("y")])
    );
}

#[test]
fn backreferences() {
    assert_eq!(span(r"(a)\1", "", "aa"), Some((0, 2)));
    assert_eq!(span(r"(a)\1", "", "ab"), None);
    assert_eq!(span(r"(\w+) \1", "", "hey hey you"), Some((0, 7)));
    // A backreference to a group that never matched fails.
    assert_eq!(span(r"(?:(a)|b)\1", "", "ba"), None);
    assert_eq!(span(r"(?:(a)|b)\1", "", "aa"), Some((0, 2)));
    // Caseless backreference.
    assert_eq!(span(r"(ab)\1", "i", "aBAb"), Some((0, 4)));
}

#[test]
fn named_groups() {
    let pattern =
        compile(r"(?P<word>\w+)=(?P<num>\d+)", Flags::empty()).unwrap();
    let subject = "k=42";
    let m = pattern.find(subject, 0).unwrap();
    assert_eq!(m.named_span("word"), Some(0..1));
    assert_eq!(m.named_span("num"), Some(2..4));
    assert_eq!(m.named_span("nope"), None);
    assert_eq!(pattern.group_name(2), Some("num"));
    assert_eq!(pattern.group_index("word"), Some(1));

    // Named backreference.
    assert_eq!(span(r"(?P<c>.)x(?P=c)", "", "zaxa"), Some((1, 4)));
    assert_eq!(span(r"(?P<c>.)x(?P=c)", "", "axb"), None);
}

#[test]
fn anchors() {
    assert_eq!(span("^abc", "", "abcd"), Some((0, 3)));
    assert_eq!(span("^abc", "", "xabc"), None);
    assert_eq!(span("abc$", "", "xabc"), Some((1, 4)));
    assert_eq!(span("^abc$", "m", "x\nabc\ny"), Some((2, 5)));
    assert_eq!(span("^abc$", "", "x\nabc\ny"), None);
    // `$` tolerates one trailing newline unless end-only is set.
    assert_eq!(span("a$", "", "a\n"), Some((0, 1)));
    assert_eq!(span("a$", "D", "a\n"), None);
    assert_eq!(span("a$", "D", "a"), Some((0, 1)));
    assert_eq!(span(r"\Aab", "m", "ab"), Some((0, 2)));
    assert_eq!(span(r"a\z", "", "a\n"), None);
    assert_eq!(span(r"a\Z", "", "a\n"), Some((0, 1)));
}

#[test]
fn match_start_anchor() {
    let pattern = compile(r"\Ga+", Flags::empty()).unwrap();
    assert_eq!(pattern.find("baaa", 0).map(|m| m.range()), None);
    assert_eq!(pattern.find("baaa", 1).map(|m| m.range()), Some(1..4));
}

#[test]
fn word_boundaries() {
    assert_eq!(span(r"\bfoo\b", "", "a foo b"), Some((2, 5)));
    assert_eq!(span(r"\bfoo\b", "", "foods"), None);
    assert_eq!(span(r"\Bar\b", "", "bar"), Some((1, 3)));
    assert_eq!(span(r"\bbar", "", "bar"), Some((0, 3)));
}

#[test]
fn lookahead() {
    assert_eq!(span("a(?=b)", "", "ab"), Some((0, 1)));
    assert_eq!(span("a(?=b)", "", "ac"), None);
    assert_eq!(span("a(?!b)", "", "ac"), Some((0, 1)));
    assert_eq!(span("a(?!b)", "", "ab"), None);
    // Captures made inside a positive lookahead are kept.
    assert_eq!(
        groups("a(?=(b+))b*", "", "abbb"),
        Some(vec![Some("abbb"), Some("bbb")])
    );
}

#[test]
fn lookbehind() {
    assert_eq!(span("(?<=a)b", "", "ab"), Some((1, 2)));
    assert_eq!(span("(?<=a)b", "", "cb"), None);
    assert_eq!(span("(?<!a)b", "", "cb"), Some((1, 2)));
    assert_eq!(span("(?<!a)b", "", "ab"), None);
    assert_eq!(span("(?<=ab|cd)x", "", "zcdx"), Some((3, 4)));
    // At the very start of the subject there is nothing behind.
    assert_eq!(span("(?<=a)b", "", "b"), None);
    assert_eq!(span("(?<!a)b", "", "b"), Some((0, 1)));
}

#[test]
fn conditionals() {
    assert_eq!(span("(a)?(?(1)b|c)", "", "ab"), Some((0, 2)));
    assert_eq!(span("(a)?(?(1)b|c)", "", "c"), Some((0, 1)));
    assert_eq!(span("(a)?(?(1)b|c)", "", "b"), None);
    // Missing no-branch falls through.
    assert_eq!(span("(a)?(?(1)b)x", "", "abx"), Some((0, 3)));
    assert_eq!(span("(a)?(?(1)b)x", "", "x"), Some((0, 1)));
}

#[test]
fn caseless() {
    assert_eq!(span("[A-Z]+", "i", "hello"), Some((0, 5)));
    assert_eq!(span("HeLLo", "i", "hEllO"), Some((0, 5)));
    assert_eq!(span("[^a-z]+", "i", "xyZ9"), Some((3, 4)));
    assert_eq!(span("straße", "iu", "STRASSE"), None);
}

#[test]
fn inline_flags() {
    assert_eq!(span("(?i)abc", "", "ABC"), Some((0, 3)));
    assert_eq!(span("a(?i)bc", "", "aBC"), Some((0, 3)));
    // Scoped to the group it appears in.
    assert_eq!(span("(?:(?i)a)a", "", "Aa"), Some((0, 2)));
    assert_eq!(span("(?:(?i)a)a", "", "AA"), None);
    assert_eq!(span("(?i:a)a", "", "Aa"), Some((0, 2)));
    assert_eq!(span("(?i)(?-i)a", "", "A"), None);
    assert_eq!(span("(?s).", "", "\n"), Some((0, 1)));
}

#[test]
fn extended_mode() {
    assert_eq!(span("a b  c", "x", "abc"), Some((0, 3)));
    assert_eq!(span("a # comment\nb", "x", "ab"), Some((0, 2)));
    // Whitespace inside classes is meaningful even in extended mode.
    assert_eq!(span("[ ]", "x", "a b"), Some((1, 2)));
}

#[test]
fn escapes() {
    assert_eq!(span(r"\x41+", "", "zAAb"), Some((1, 3)));
    assert_eq!(span(r"\x{2603}", "u", "x☃y"), Some((1, 4)));
    assert_eq!(span(r"\t\n", "", "a\t\nb"), Some((1, 3)));
    assert_eq!(span(r"\101", "", "A"), Some((0, 1)));
    assert_eq!(span(r"a\.b", "", "a.b"), Some((0, 3)));
    assert_eq!(span(r"a\.b", "", "axb"), None);
    // Unknown escapes are literals unless strict mode is on.
    assert_eq!(span(r"\q", "", "q"), Some((0, 1)));
}

#[test]
fn octal_vs_backreference() {
    // One group declared, so \1 is a backreference.
    assert_eq!(span(r"(a)\1", "", "aa"), Some((0, 2)));
    // No second group: \2 re-reads as octal, character 0x02.
    assert_eq!(span(r"(a)\2", "", "a\x02"), Some((0, 2)));
    // \12 with one group: octal 0o12, a newline.
    assert_eq!(span(r"(a)\12", "", "a\n"), Some((0, 2)));
    // Octal overflow digits stay literal: \101 then "9".
    assert_eq!(span(r"\1019", "", "A9"), Some((0, 2)));
}

#[test]
fn unicode_categories() {
    assert_eq!(span(r"\p{L}+", "u", "héllo!"), Some((0, 6)));
    assert_eq!(span(r"\p{N}+", "u", "a42b"), Some((1, 3)));
    assert_eq!(span(r"\P{L}+", "u", "ab!?cd"), Some((2, 4)));
    assert_eq!(span(r"\p{^L}+", "u", "ab!?cd"), Some((2, 4)));
    assert_eq!(span(r"\pZ", "u", "a b"), Some((1, 2)));
    assert_eq!(span(r"[\p{N}x]+", "u", "ax1b"), Some((1, 3)));
}

#[test]
fn unicode_mode_spans_are_byte_offsets() {
    assert_eq!(span("é", "u", "xéy"), Some((1, 3)));
    assert_eq!(span("y", "u", "xéy"), Some((3, 4)));
    // In byte mode the two UTF-8 bytes of é are separate positions and
    // the single-character pattern cannot match them.
    assert_eq!(span("é", "", "xéy"), None);
}

#[test]
fn anchored_flag() {
    assert_eq!(span("b", "A", "abc"), None);
    assert_eq!(span("a", "A", "abc"), Some((0, 1)));
    let pattern = compile("b", Flags::ANCHORED).unwrap();
    assert_eq!(pattern.find("abc", 1).map(|m| m.range()), Some(1..2));
}

#[test]
fn find_iter_advances_past_matches() {
    let pattern = compile("a+", Flags::empty()).unwrap();
    let spans: Vec<_> =
        pattern.find_iter("aa b aaa a").map(|m| m.range()).collect();
    assert_eq!(spans, vec![0..2, 5..8, 9..10]);
}

#[test]
fn find_iter_zero_width_makes_progress() {
    let pattern = compile("a*", Flags::empty()).unwrap();
    let spans: Vec<_> = pattern.find_iter("ab").map(|m| m.range()).collect();
    // One match per position: "a", the gap before `b`, the end.
    assert_eq!(spans, vec![0..1, 1..1, 2..2]);

    let pattern = compile("", Flags::empty()).unwrap();
    let spans: Vec<_> = pattern.find_iter("").map(|m| m.range()).collect();
    assert_eq!(spans, vec![0..0]);
}

#[test]
fn step_budget_cuts_off_catastrophic_backtracking() {
    // Classic exponential blowup; the budget turns it into a clean miss.
    let pattern = compile("(a+)+$", Flags::empty())
        .unwrap()
        .with_step_limit(100_000);
    let subject = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaab";
    assert_eq!(pattern.find(subject, 0).map(|m| m.range()), None);
}

#[test]
fn start_offset() {
    let pattern = compile("a", Flags::empty()).unwrap();
    assert_eq!(pattern.find("aba", 1).map(|m| m.range()), Some(2..3));
    assert_eq!(pattern.find("aba", 3).map(|m| m.range()), None);
    assert_eq!(pattern.find("aba", 7).map(|m| m.range()), None);
}
