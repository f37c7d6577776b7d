/*! Compiles pattern text into an executable [`Pattern`].

Compilation is a pipeline: the recursive-descent [`parser`] turns the
pattern text into a raw program graph, the [`optimizer`] passes refine it
(case folding, backtrack elimination, scan hints, loop linking), and the
result is assembled into an immutable [`Pattern`] that any number of
concurrent searches may share.
*/

use std::io::{BufWriter, Read, Write};
#[cfg(feature = "logging")]
use std::time::Instant;

use bincode::Options;
#[cfg(feature = "logging")]
use log::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::charclass::ClassSet;
use crate::flags::Flags;
use crate::matcher::DEFAULT_STEP_LIMIT;
use crate::program::Program;

pub use errors::PatternSyntaxError;
pub use errors::SerializationError;

pub mod errors;

mod parser;
pub(crate) mod optimizer;

#[cfg(test)]
mod tests;

/// Header identifying serialized compiled patterns.
const MAGIC: &[u8] = b"PREG";

/// A compiled pattern: the executable program graph plus everything the
/// matcher needs alongside it.
///
/// A `Pattern` is immutable once compiled. Sharing one across threads and
/// running any number of simultaneous searches against it is safe; all
/// mutable matching state lives in the per-search state the matcher
/// allocates internally.
#[derive(Debug, Serialize, Deserialize)]
pub struct Pattern {
    pub(crate) program: Program,
    pub(crate) flags: Flags,
    pub(crate) group_count: u32,
    pub(crate) loop_count: u32,
    /// Declared name to group index.
    pub(crate) group_names: FxHashMap<String, u32>,
    /// Group index to declared name. Entry 0 is unused.
    pub(crate) names_by_index: Vec<Option<String>>,
    /// Minimum number of characters any match consumes.
    pub(crate) min_len: u32,
    /// Required literal prefix, when one could be determined.
    pub(crate) prefix: Option<Vec<char>>,
    /// The prefix encoded for byte-wise search in the subject text.
    pub(crate) prefix_bytes: Option<Vec<u8>>,
    /// Characters that can begin a match.
    pub(crate) first_set: Option<ClassSet>,
    /// The pattern text this was compiled from.
    pub(crate) source: String,
    /// Step budget for one search; see
    /// [`crate::DEFAULT_STEP_LIMIT`].
    pub(crate) step_limit: usize,
}

/// Compiles a pattern into an executable [`Pattern`].
///
/// `pattern` is the bare pattern text, without delimiters; `flags` is the
/// already-parsed flag set (see [`Flags::parse`] for the letter form).
/// Errors carry the offending character and its position within the
/// pattern.
///
/// ```
/// # use preg::{compile, Flags};
/// let pattern = compile(r"^(\d{4})-(\d{2})", Flags::empty()).unwrap();
/// assert!(pattern.find("2024-06-01", 0).is_some());
/// ```
pub fn compile(
    pattern: &str,
    flags: Flags,
) -> Result<Pattern, PatternSyntaxError> {
    #[cfg(feature = "logging")]
    let started = Instant::now();

    let parsed = parser::Parser::new(pattern, flags).parse()?;
    let parser::Parsed {
        mut program,
        group_count,
        loop_count,
        group_names,
        names_by_index,
        loop_tails,
    } = parsed;

    let caseless = flags.contains(Flags::CASELESS);
    if caseless {
        optimizer::case_fold(&mut program);
    } else {
        // Folding widens first sets past the point where disjointness
        // analysis is useful, so this pass only runs on case-sensitive
        // patterns.
        optimizer::eliminate_backtracking(&mut program);
    }
    let hints = optimizer::compute_hints(&program, caseless);
    optimizer::link_loops(&mut program, loop_tails);

    let prefix_bytes = hints.prefix.as_ref().and_then(|prefix| {
        if flags.contains(Flags::UNICODE) {
            Some(prefix.iter().collect::<String>().into_bytes())
        } else if prefix.iter().all(|&c| (c as u32) < 0x100) {
            Some(prefix.iter().map(|&c| c as u8).collect())
        } else {
            // A character above 0xFF can never occur in a byte-mode
            // subject; the minimum-length check will reject everything
            // anyway, so no byte-wise search is attempted.
            None
        }
    });

    #[cfg(feature = "logging")]
    {
        info!(
            "pattern compiled in {:?}: {} nodes, {} groups, {} loops",
            started.elapsed(),
            program.len(),
            group_count,
            loop_count,
        );
        debug!(
            "scan hints: min length {}, prefix {:?}, first set {}",
            hints.min_len,
            hints.prefix,
            hints
                .first_set
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string()),
        );
    }

    Ok(Pattern {
        program,
        flags,
        group_count,
        loop_count,
        group_names,
        names_by_index,
        min_len: hints.min_len,
        prefix: hints.prefix,
        prefix_bytes,
        first_set: hints.first_set,
        source: pattern.to_string(),
        step_limit: DEFAULT_STEP_LIMIT,
    })
}

impl Pattern {
    /// The flags this pattern was compiled with.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// The pattern text this was compiled from.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of capture groups, the whole match not included.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.group_count as usize
    }

    /// The declared name of a capture group, if it has one.
    pub fn group_name(&self, group: usize) -> Option<&str> {
        self.names_by_index.get(group)?.as_deref()
    }

    /// The group index a declared name refers to.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.group_names.get(name).map(|&index| index as usize)
    }

    /// Minimum number of characters any match of this pattern consumes.
    #[inline]
    pub fn min_length(&self) -> usize {
        self.min_len as usize
    }

    /// Replaces the step budget available to each search. The default is
    /// [`crate::DEFAULT_STEP_LIMIT`].
    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Renders the compiled program graph as text, one node per line.
    /// Intended for diagnostics and tests.
    pub fn dump_program(&self) -> String {
        self.program.to_string()
    }

    /// Serializes the compiled pattern into a byte vector that
    /// [`Pattern::deserialize`] can load back.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializationError> {
        let mut bytes = Vec::new();
        self.serialize_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Serializes the compiled pattern into a writer.
    pub fn serialize_into<W>(
        &self,
        writer: W,
    ) -> Result<(), SerializationError>
    where
        W: Write,
    {
        let mut writer = BufWriter::new(writer);
        writer.write_all(MAGIC)?;
        Ok(bincode::DefaultOptions::new()
            .with_varint_encoding()
            .serialize_into(writer, self)?)
    }

    /// Deserializes a pattern from bytes produced by
    /// [`Pattern::serialize`].
    pub fn deserialize<B>(bytes: B) -> Result<Self, SerializationError>
    where
        B: AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(SerializationError::InvalidFormat);
        }
        Ok(bincode::DefaultOptions::new()
            .with_varint_encoding()
            .deserialize(&bytes[MAGIC.len()..])?)
    }

    /// Deserializes a pattern from a reader.
    pub fn deserialize_from<R>(
        mut reader: R,
    ) -> Result<Self, SerializationError>
    where
        R: Read,
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::deserialize(bytes)
    }
}
