use std::io;

use thiserror::Error;

/// Errors returned while serializing or deserializing compiled patterns.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// The data is not a serialized compiled pattern.
    #[error("not a compiled pattern file")]
    InvalidFormat,

    /// The data carries the right header but its body is corrupt.
    #[error("invalid compiled pattern file")]
    InvalidEncoding(#[from] bincode::Error),

    /// An I/O error occurred while reading or writing.
    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// An error found while compiling a pattern.
///
/// Every variant carries the position (in code points, relative to the
/// start of the pattern text) where the problem was detected, and, when it
/// makes sense, the offending character, so callers can produce a precise
/// diagnostic. Compilation is the only fallible stage: once a pattern
/// compiles, matching it never raises an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternSyntaxError {
    /// A group was opened but never closed.
    #[error("missing closing parenthesis for group opened at position {pos}")]
    UnterminatedGroup {
        /// Position of the opening parenthesis.
        pos: usize,
    },

    /// A character class was opened but never closed.
    #[error("missing closing bracket for class opened at position {pos}")]
    UnterminatedClass {
        /// Position of the opening bracket.
        pos: usize,
    },

    /// A closing parenthesis with no matching open group.
    #[error("unmatched `)` at position {pos}")]
    UnmatchedParenthesis {
        /// Position of the closing parenthesis.
        pos: usize,
    },

    /// A quantifier that is not preceded by a quantifiable atom.
    #[error("quantifier `{ch}` with no preceding atom at position {pos}")]
    NothingToRepeat {
        /// The quantifier character.
        ch: char,
        /// Position of the quantifier.
        pos: usize,
    },

    /// A `{n,m}` quantifier with `n` greater than `m`.
    #[error("quantifier bounds out of order at position {pos}")]
    QuantifierOutOfOrder {
        /// Position of the opening brace.
        pos: usize,
    },

    /// A backreference or conditional that names a group that does not
    /// exist.
    #[error("reference to non-existent group {group} at position {pos}")]
    InvalidGroupReference {
        /// The referenced group number.
        group: u32,
        /// Position of the reference.
        pos: usize,
    },

    /// A named reference to a group name that was never declared.
    #[error("reference to undeclared group name `{name}` at position {pos}")]
    UnknownGroupName {
        /// The undeclared name.
        name: String,
        /// Position of the reference.
        pos: usize,
    },

    /// A group name declared more than once.
    #[error("duplicate group name `{name}` at position {pos}")]
    DuplicateGroupName {
        /// The duplicated name.
        name: String,
        /// Position of the second declaration.
        pos: usize,
    },

    /// A malformed `(?...)` group prefix or group name.
    #[error("malformed group at position {pos}")]
    MalformedGroup {
        /// Position of the problem.
        pos: usize,
    },

    /// A malformed hex (`\xHH`, `\x{...}`) or Unicode category
    /// (`\p{...}`) escape.
    #[error("malformed escape sequence `\\{ch}` at position {pos}")]
    MalformedEscape {
        /// The escape letter.
        ch: char,
        /// Position of the escape.
        pos: usize,
    },

    /// An escape letter with no meaning, rejected under the strict flag.
    #[error("unknown escape `\\{ch}` at position {pos}")]
    UnknownEscape {
        /// The unknown letter.
        ch: char,
        /// Position of the escape.
        pos: usize,
    },

    /// A `[:name:]` class with an unknown name.
    #[error("unknown POSIX class `[:{name}:]` at position {pos}")]
    UnknownPosixClass {
        /// The unknown class name.
        name: String,
        /// Position of the class.
        pos: usize,
    },

    /// A class range whose endpoints are out of order, like `[z-a]`.
    #[error("class range out of order at position {pos}")]
    InvalidClassRange {
        /// Position of the range.
        pos: usize,
    },

    /// A lookbehind whose body length cannot be determined statically.
    #[error(
        "lookbehind body starting at position {pos} does not have a \
         fixed length"
    )]
    VariableLookbehind {
        /// Position of the lookbehind body.
        pos: usize,
    },

    /// An unknown letter inside an inline `(?imsx)` flag group.
    #[error("unknown inline flag `{ch}` at position {pos}")]
    UnknownInlineFlag {
        /// The unknown flag letter.
        ch: char,
        /// Position of the letter.
        pos: usize,
    },

    /// A pattern that ends in the middle of an escape sequence.
    #[error("pattern ends with a trailing backslash")]
    TrailingBackslash,
}
