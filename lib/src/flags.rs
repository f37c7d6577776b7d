use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

bitflags! {
    /// The set of flags that modify how a pattern is compiled and matched.
    ///
    /// Flags are passed to [`crate::compile`]. Some of them can also be
    /// toggled from within the pattern itself with `(?imsx)` groups.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// `^` and `$` match at internal line boundaries.
        const MULTILINE = 0x0001;
        /// `.` matches newline characters.
        const DOT_ALL = 0x0002;
        /// Literal, class and backreference matching ignores case.
        const CASELESS = 0x0004;
        /// Whitespace and `#`-comments in the pattern are ignored.
        const EXTENDED = 0x0008;
        /// The caller intends repeated search. This flag affects the
        /// search-loop contract implemented by [`crate::Pattern::find_iter`],
        /// not compilation.
        const GLOBAL = 0x0010;
        /// The match is forced to begin at the search start offset.
        const ANCHORED = 0x0020;
        /// `$` matches only at the true end of the subject, not before a
        /// trailing newline.
        const END_ONLY = 0x0040;
        /// The default quantifier greediness is inverted: unmarked
        /// quantifiers are lazy and `?`-marked ones are greedy.
        const UNGREEDY = 0x0080;
        /// Unknown escape letters are compile errors instead of literals.
        const STRICT = 0x0100;
        /// Pattern and subject are interpreted as code-point sequences
        /// rather than byte sequences.
        const UNICODE = 0x0200;
    }
}

impl Serialize for Flags {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Flags {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Flags::from_bits_retain(u16::deserialize(d)?))
    }
}

/// Error returned by [`Flags::parse`] when a flag letter is not recognized.
#[derive(Error, Debug, Eq, PartialEq)]
#[error("unknown flag letter `{letter}`")]
pub struct UnknownFlagError {
    /// The letter that was not recognized.
    pub letter: char,
}

impl Flags {
    /// Parses a string of PCRE-style flag letters into a [`Flags`] value.
    ///
    /// The accepted letters are `m` (multiline), `s` (dot-all), `i`
    /// (caseless), `x` (extended), `g` (global), `A` (anchored), `D`
    /// (dollar-end-only), `U` (ungreedy), `X` (strict escapes) and `u`
    /// (unicode). Any other letter is an error.
    ///
    /// ```
    /// # use preg::Flags;
    /// let flags = Flags::parse("im").unwrap();
    /// assert!(flags.contains(Flags::CASELESS | Flags::MULTILINE));
    /// ```
    pub fn parse(letters: &str) -> Result<Flags, UnknownFlagError> {
        let mut flags = Flags::empty();
        for letter in letters.chars() {
            flags |= match letter {
                'm' => Flags::MULTILINE,
                's' => Flags::DOT_ALL,
                'i' => Flags::CASELESS,
                'x' => Flags::EXTENDED,
                'g' => Flags::GLOBAL,
                'A' => Flags::ANCHORED,
                'D' => Flags::END_ONLY,
                'U' => Flags::UNGREEDY,
                'X' => Flags::STRICT,
                'u' => Flags::UNICODE,
                _ => return Err(UnknownFlagError { letter }),
            };
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::Flags;

    #[test]
    fn parse() {
        assert_eq!(
            Flags::parse("imsx").unwrap(),
            Flags::CASELESS
                | Flags::MULTILINE
                | Flags::DOT_ALL
                | Flags::EXTENDED
        );
        assert_eq!(Flags::parse("").unwrap(), Flags::empty());
        assert_eq!(Flags::parse("e").unwrap_err().letter, 'e');
    }
}
