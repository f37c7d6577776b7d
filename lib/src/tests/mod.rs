/*! End-to-end tests exercising the public API. */

use pretty_assertions::assert_eq;

use crate::{compile, Flags, Pattern};

#[test]
fn plain_patterns_behave_like_substring_search() {
    // For a pattern with no metacharacters, find agrees with str::find.
    let subjects = ["", "needle", "haystack with a needle inside", "nee"];
    let pattern = compile("needle", Flags::empty()).unwrap();
    for subject in subjects {
        let expected = subject.find("needle");
        let found = pattern.find(subject, 0).map(|m| m.start());
        assert_eq!(expected, found, "subject: {:?}", subject);
    }
}

#[test]
fn compile_twice_agree_on_every_input() {
    let source = r"(?P<tag><(\w+)>)[^<]*</\2>";
    let first = compile(source, Flags::empty()).unwrap();
    let second = compile(source, Flags::empty()).unwrap();
    for subject in
        ["<b>bold</b>", "<i>x</b>", "no tags here", "<a></a>", "<<x>>"]
    {
        let a = first.find(subject, 0).map(|m| (m.start(), m.end()));
        let b = second.find(subject, 0).map(|m| (m.start(), m.end()));
        assert_eq!(a, b, "subject: {:?}", subject);
    }
}

#[test]
fn quantifier_policies() {
    let subject = "aaaaa";
    let greedy = compile("a{2,4}", Flags::empty()).unwrap();
    assert_eq!(greedy.find(subject, 0).unwrap().range(), 0..4);

    let lazy = compile("a{2,4}?", Flags::empty()).unwrap();
    assert_eq!(lazy.find(subject, 0).unwrap().range(), 0..2);

    let possessive = compile("a{2,4}+a", Flags::empty()).unwrap();
    assert_eq!(possessive.find("aaaa", 0).map(|m| m.range()), None);
}

#[test]
fn unmatched_group_is_not_an_empty_span() {
    let pattern = compile("(a)(b)?", Flags::empty()).unwrap();
    let m = pattern.find("a", 0).unwrap();
    assert_eq!(m.span(1), Some(0..1));
    assert_eq!(m.span(2), None);

    // An empty span, in contrast, is reported.
    let pattern = compile("(b*)a", Flags::empty()).unwrap();
    let m = pattern.find("a", 0).unwrap();
    assert_eq!(m.span(1), Some(0..0));
}

#[test]
fn global_search_contract() {
    // Empty subject, pattern that matches empty: exactly one zero-width
    // match, then termination.
    let pattern = compile("x*", Flags::GLOBAL).unwrap();
    let matches: Vec<_> = pattern.find_iter("").map(|m| m.range()).collect();
    assert_eq!(matches, vec![0..0]);

    // Zero-width matches advance by one position.
    let matches: Vec<_> =
        pattern.find_iter("yxy").map(|m| m.range()).collect();
    assert_eq!(matches, vec![0..0, 1..2, 2..2, 3..3]);
}

#[test]
fn serialization_round_trip() {
    let source = r"(?P<user>\w+)@(?P<host>[\w.]+)";
    let pattern = compile(source, Flags::CASELESS).unwrap();
    let bytes = pattern.serialize().unwrap();

    let restored = Pattern::deserialize(&bytes).unwrap();
    assert_eq!(pattern.dump_program(), restored.dump_program());
    assert_eq!(pattern.flags(), restored.flags());
    assert_eq!(pattern.source(), source);

    let subject = "Mail Ana@Example.org today";
    let original = pattern.find(subject, 0).unwrap();
    let roundtripped = restored.find(subject, 0).unwrap();
    assert_eq!(original.range(), roundtripped.range());
    assert_eq!(original.named_span("host"), roundtripped.named_span("host"));

    assert!(Pattern::deserialize(b"garbage").is_err());
}

#[test]
fn serialization_io() {
    let pattern = compile("ab+c", Flags::empty()).unwrap();
    let mut buffer = Vec::new();
    pattern.serialize_into(&mut buffer).unwrap();
    let restored = Pattern::deserialize_from(buffer.as_slice()).unwrap();
    assert_eq!(restored.find("xabbc", 0).unwrap().range(), 1..5);
}

#[test]
fn shared_pattern_concurrent_searches() {
    // A compiled pattern is immutable; concurrent searches against the
    // same instance must not interfere.
    let pattern = std::sync::Arc::new(
        compile(r"(\w+)-(\d+)", Flags::empty()).unwrap(),
    );
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pattern = std::sync::Arc::clone(&pattern);
            std::thread::spawn(move || {
                let subject = format!("item-{} rest", i);
                let m = pattern.find(&subject, 0).unwrap();
                assert_eq!(m.start(), 0);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn step_limit_is_configurable() {
    let pattern = compile("a+b", Flags::empty()).unwrap().with_step_limit(1);
    // The budget is tiny, so even a trivial search fails deterministically.
    assert_eq!(pattern.find("aaab", 0).map(|m| m.range()), None);

    let pattern =
        compile("a+b", Flags::empty()).unwrap().with_step_limit(1 << 16);
    assert_eq!(pattern.find("aaab", 0).unwrap().range(), 0..4);
}

#[test]
fn flag_letters_round_trip() {
    let flags = Flags::parse("imsxgADUXu").unwrap();
    assert_eq!(flags, Flags::all());
}
