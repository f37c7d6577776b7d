/*! A PCRE-flavored backtracking regular expression engine.

The engine is a miniature compiler plus an interpreter: a
recursive-descent parser turns a pattern string into a program graph, a
set of optimization passes refine that graph, and a backtracking virtual
machine evaluates it against subject text with full support for capture
groups, named groups, backreferences, lookaround, conditionals and
greedy/lazy/possessive quantifiers.

There are two entry points: [`compile`] produces an immutable
[`Pattern`], and [`Pattern::find`]/[`Pattern::find_iter`] run it against
subjects. A compiled pattern can be shared freely: all mutable matching
state is private to each search.

# Example

```rust
use preg::{compile, Flags};

let pattern = compile(r"(?P<key>\w+)=(?P<value>\w+)", Flags::empty()).unwrap();

let subject = "retries=5;";
let m = pattern.find(subject, 0).unwrap();

assert_eq!(m.group_str(subject, 0), Some("retries=5"));
assert_eq!(m.named_span("key"), Some(0..7));
assert_eq!(m.group_str(subject, 2), Some("5"));
```

Matching never fails at run time: searching returns `None` on no match,
and pathological backtracking is cut off by a configurable step budget
([`DEFAULT_STEP_LIMIT`], see [`Pattern::with_step_limit`]) instead of
running away.
*/

#![deny(missing_docs)]

pub use compiler::compile;
pub use compiler::Pattern;
pub use compiler::PatternSyntaxError;
pub use compiler::SerializationError;

pub use flags::Flags;
pub use flags::UnknownFlagError;

pub use matcher::MatchResult;
pub use matcher::Matches;
pub use matcher::DEFAULT_STEP_LIMIT;

mod charclass;
mod compiler;
mod flags;
mod matcher;
mod program;
mod unicode;
mod unicode_tables;

#[cfg(test)]
mod tests;
