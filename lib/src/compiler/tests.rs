use pretty_assertions::assert_eq;

use crate::compiler::PatternSyntaxError;
use crate::{compile, Flags};

macro_rules! assert_program {
    ($pattern:expr, $dump:expr) => {{
        let pattern = compile($pattern, Flags::empty()).unwrap();
        assert_eq!($dump, pattern.dump_program());
    }};
}

macro_rules! assert_error {
    ($pattern:expr, $err:expr) => {{
        assert_eq!(compile($pattern, Flags::empty()).unwrap_err(), $err);
    }};
}

#[test]
fn program_literal() {
    assert_program!(
        "ab",
        r#"start 00000
00000: LIT "ab", next 00001
00001: ACCEPT
"#
    );
}

#[test]
fn program_alternation() {
    // The two branches are disjoint on their first character, so
    // backtrack elimination marks the alternation unique.
    assert_program!(
        "a|b",
        r#"start 00003
00000: LIT "a", next 00002
00001: LIT "b", next 00002
00002: JOIN, next 00004
00003: ALT [00000, 00001] unique, next 00002
00004: ACCEPT
"#
    );
}

#[test]
fn program_loop_links_back_to_loop_node() {
    assert_program!(
        "a*",
        r#"start 00001
00000: LIT "a", next 00002
00001: LOOP_INIT 1, next 00002
00002: LOOP_GREEDY 1 {0,} body 00000, next 00003
00003: ACCEPT
"#
    );
}

#[test]
fn program_unique_loop() {
    // The loop body (a) and the continuation (b) are disjoint, so the
    // matcher can decide iterate-vs-exit from one character.
    assert_program!(
        "a+b",
        r#"start 00001
00000: LIT "a", next 00002
00001: LOOP_INIT 1, next 00002
00002: LOOP_GREEDY 1 {1,} body 00000 unique, next 00003
00003: LIT "b", next 00004
00004: ACCEPT
"#
    );
}

#[test]
fn program_group() {
    assert_program!(
        "(a)",
        r#"start 00000
00000: GROUP_BEGIN 1, next 00001
00001: LIT "a", next 00002
00002: GROUP_END 1, next 00003
00003: ACCEPT
"#
    );
}

#[test]
fn no_unique_marking_when_branches_share_first_chars() {
    let pattern = compile("ab|ac", Flags::empty()).unwrap();
    assert!(!pattern.dump_program().contains("unique"));
}

#[test]
fn no_unique_marking_for_caseless_patterns() {
    // Case folding widens first sets, so the analysis is skipped.
    let pattern = compile("a|b", Flags::CASELESS).unwrap();
    assert!(!pattern.dump_program().contains("unique"));
    assert!(pattern.dump_program().contains("LIT_CI"));
}

#[test]
fn case_folding_rewrites_node_kinds() {
    let pattern = compile(r"(a)[bc]\1", Flags::CASELESS).unwrap();
    let dump = pattern.dump_program();
    assert!(dump.contains("LIT_CI"));
    assert!(dump.contains("CLASS_CI"));
    assert!(dump.contains("BACKREF_CI"));
}

#[test]
fn minimum_length() {
    assert_eq!(compile("abc", Flags::empty()).unwrap().min_length(), 3);
    assert_eq!(compile("a{3,5}", Flags::empty()).unwrap().min_length(), 3);
    assert_eq!(compile("a*", Flags::empty()).unwrap().min_length(), 0);
    assert_eq!(
        compile("ab|cde", Flags::empty()).unwrap().min_length(),
        2
    );
    assert_eq!(
        compile(r"(\d{4})-(\d{2})", Flags::empty()).unwrap().min_length(),
        7
    );
    assert_eq!(
        compile("(?=abc)x", Flags::empty()).unwrap().min_length(),
        1
    );
}

#[test]
fn required_prefix() {
    let pattern = compile("abc+d", Flags::empty()).unwrap();
    assert_eq!(pattern.prefix.as_deref(), Some(&['a', 'b'][..]));

    // A leading anchor does not change what the match text starts with.
    let pattern = compile("^abc", Flags::empty()).unwrap();
    assert_eq!(pattern.prefix.as_deref(), Some(&['a', 'b', 'c'][..]));

    // Optional head: no required prefix.
    let pattern = compile("a?bc", Flags::empty()).unwrap();
    assert_eq!(pattern.prefix, None);

    // Folding would need multi-variant search.
    let pattern = compile("abc", Flags::CASELESS).unwrap();
    assert_eq!(pattern.prefix, None);
}

#[test]
fn first_set() {
    let pattern = compile("[ab]x|cy", Flags::empty()).unwrap();
    let first_set = pattern.first_set.as_ref().unwrap();
    assert!(first_set.contains_char('a'));
    assert!(first_set.contains_char('b'));
    assert!(first_set.contains_char('c'));
    assert!(!first_set.contains_char('x'));

    // A pattern that can match empty has no useful first set.
    let pattern = compile("a*", Flags::empty()).unwrap();
    assert!(pattern.first_set.is_none());
}

#[test]
fn loop_minimum_demoted_for_nullable_bodies() {
    // The body can derive the empty string, so the declared minimum of 3
    // is demoted to 1 and the pattern matches a subject with one `a`.
    let pattern = compile("(?:a?){3,}", Flags::empty()).unwrap();
    assert!(pattern.dump_program().contains("{1,}"));

    let pattern = compile("a{3,}", Flags::empty()).unwrap();
    assert!(pattern.dump_program().contains("{3,}"));
}

#[test]
fn group_numbering_and_names() {
    let pattern =
        compile(r"(a(?P<inner>b))(?:c)(?P<last>d)", Flags::empty())
            .unwrap();
    assert_eq!(pattern.group_count(), 3);
    assert_eq!(pattern.group_name(1), None);
    assert_eq!(pattern.group_name(2), Some("inner"));
    assert_eq!(pattern.group_name(3), Some("last"));
    assert_eq!(pattern.group_index("inner"), Some(2));
    assert_eq!(pattern.group_index("missing"), None);
}

#[test]
fn syntax_errors() {
    assert_error!("(a", PatternSyntaxError::UnterminatedGroup { pos: 0 });
    assert_error!("x(a", PatternSyntaxError::UnterminatedGroup { pos: 1 });
    assert_error!("[ab", PatternSyntaxError::UnterminatedClass { pos: 0 });
    assert_error!("a)", PatternSyntaxError::UnmatchedParenthesis { pos: 1 });
    assert_error!(
        "*a",
        PatternSyntaxError::NothingToRepeat { ch: '*', pos: 0 }
    );
    assert_error!(
        "a**",
        PatternSyntaxError::NothingToRepeat { ch: '*', pos: 2 }
    );
    assert_error!(
        "a{3,1}",
        PatternSyntaxError::QuantifierOutOfOrder { pos: 1 }
    );
    assert_error!(
        "(?(2)a)",
        PatternSyntaxError::InvalidGroupReference { group: 2, pos: 3 }
    );
    assert_error!(
        "(?P=nope)",
        PatternSyntaxError::UnknownGroupName {
            name: "nope".to_string(),
            pos: 0
        }
    );
    assert_error!(
        "(?P<x>a)(?P<x>b)",
        PatternSyntaxError::DuplicateGroupName {
            name: "x".to_string(),
            pos: 8
        }
    );
    assert_error!("(?<x)", PatternSyntaxError::MalformedGroup { pos: 0 });
    assert_error!(
        r"\x{110000}",
        PatternSyntaxError::MalformedEscape { ch: 'x', pos: 1 }
    );
    assert_error!(
        r"\x{}",
        PatternSyntaxError::MalformedEscape { ch: 'x', pos: 1 }
    );
    assert_error!(
        r"\p{Q}",
        PatternSyntaxError::MalformedEscape { ch: 'p', pos: 1 }
    );
    assert_error!(
        "[[:foo:]]",
        PatternSyntaxError::UnknownPosixClass {
            name: "foo".to_string(),
            pos: 1
        }
    );
    assert_error!("[z-a]", PatternSyntaxError::InvalidClassRange { pos: 1 });
    assert_error!(
        "(?<=a*)b",
        PatternSyntaxError::VariableLookbehind { pos: 0 }
    );
    assert_error!(
        "(?<=a|bc)d",
        PatternSyntaxError::VariableLookbehind { pos: 0 }
    );
    assert_error!(
        "(?i^)a",
        PatternSyntaxError::UnknownInlineFlag { ch: '^', pos: 3 }
    );
    assert_error!("\\", PatternSyntaxError::TrailingBackslash);
}

#[test]
fn strict_escapes() {
    assert_eq!(
        compile(r"\q", Flags::STRICT).unwrap_err(),
        PatternSyntaxError::UnknownEscape { ch: 'q', pos: 1 }
    );
    assert!(compile(r"\q", Flags::empty()).is_ok());
    assert!(compile(r"\d\w\s", Flags::STRICT).is_ok());
}

#[test]
fn brace_without_bounds_is_literal() {
    assert!(compile("a{b}", Flags::empty()).is_ok());
    assert!(compile("{x}", Flags::empty()).is_ok());
    assert!(compile("a{,}", Flags::empty()).is_ok());
}

#[test]
fn lookbehind_lengths() {
    // Fixed-length bodies are fine, alternations must agree.
    assert!(compile("(?<=abc)d", Flags::empty()).is_ok());
    assert!(compile("(?<=ab|cd)x", Flags::empty()).is_ok());
    assert!(compile("(?<=a{3})x", Flags::empty()).is_ok());
    assert!(compile("(?<=a{2,3})x", Flags::empty()).is_err());
}

#[test]
fn compile_is_deterministic() {
    let first = compile(r"(a|b)+c\d{2,}", Flags::empty()).unwrap();
    let second = compile(r"(a|b)+c\d{2,}", Flags::empty()).unwrap();
    assert_eq!(first.dump_program(), second.dump_program());
    assert_eq!(first.min_length(), second.min_length());
}
