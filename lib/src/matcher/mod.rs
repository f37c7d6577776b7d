/*!
The matching engine's outer layer: the scan loop that advances candidate
start offsets, the public [`MatchResult`] type, and the [`Matches`]
iterator implementing the repeated-search contract.

The walk itself lives in [`exec`]; this module decides *where* to attempt
it. At each candidate offset the scan first applies the compiled hints:
if fewer than the minimum match length characters remain the scan stops,
if the pattern has a required literal prefix the scan jumps straight to
its next occurrence, and otherwise the first-character set filters
offsets whose character cannot begin a match.
*/

use std::ops::Range;

use memchr::memmem;

use crate::compiler::Pattern;
use crate::flags::Flags;
use crate::matcher::exec::{GroupSpan, MatchState};

pub(crate) mod exec;

#[cfg(test)]
mod tests;

/// Default step budget for one call to [`Pattern::find`]. Every node
/// transition of the backtracking walk spends one step; when the budget
/// runs out the search fails deterministically. Patterns that trigger
/// catastrophic backtracking hit this limit instead of hanging.
pub const DEFAULT_STEP_LIMIT: usize = 1 << 20;

/// A subject string decoded for matching.
///
/// The engine matches over a sequence of positions: code points when the
/// pattern has the `unicode` flag, raw bytes otherwise. This structure
/// owns the decoded sequence plus the byte offset of every position, so
/// spans can always be reported as byte offsets into the original
/// string.
pub(crate) struct Subject<'s> {
    text: &'s str,
    chars: Vec<char>,
    /// Byte offset of every position, plus one trailing entry holding
    /// `text.len()`.
    offsets: Vec<usize>,
}

impl<'s> Subject<'s> {
    pub fn new(text: &'s str, unicode: bool) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(text.len() + 1);
        if unicode {
            for (offset, c) in text.char_indices() {
                offsets.push(offset);
                chars.push(c);
            }
        } else {
            for (offset, b) in text.bytes().enumerate() {
                offsets.push(offset);
                chars.push(b as char);
            }
        }
        offsets.push(text.len());
        Self { text, chars, offsets }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[inline]
    pub fn char_at(&self, pos: usize) -> char {
        self.chars[pos]
    }

    #[inline]
    pub fn slice(&self, from: usize, to: usize) -> &[char] {
        &self.chars[from..to]
    }

    #[inline]
    pub fn text(&self) -> &'s str {
        self.text
    }

    /// Byte offset of the given position.
    #[inline]
    pub fn byte_offset(&self, pos: usize) -> usize {
        self.offsets[pos]
    }

    /// The first position whose byte offset is at or after `byte`.
    pub fn position_at_byte(&self, byte: usize) -> usize {
        self.offsets.partition_point(|&offset| offset < byte)
    }
}

/// The result of a successful match.
///
/// Spans are byte ranges into the subject, directly usable for slicing,
/// for every capture group plus group 0, the whole match. Groups that did
/// not participate in the match report no span at all, which is distinct
/// from an empty span.
#[derive(Debug, Clone)]
pub struct MatchResult<'p> {
    pattern: &'p Pattern,
    spans: Vec<Option<(usize, usize)>>,
}

impl<'p> MatchResult<'p> {
    /// Byte range of the whole match.
    pub fn range(&self) -> Range<usize> {
        match self.spans.first().copied().flatten() {
            Some((start, end)) => start..end,
            // Group 0 is recorded for every successful match.
            None => unreachable!("match result without a whole-match span"),
        }
    }

    /// Start byte offset of the whole match.
    pub fn start(&self) -> usize {
        self.range().start
    }

    /// End byte offset of the whole match.
    pub fn end(&self) -> usize {
        self.range().end
    }

    /// Byte range of capture group `group`, or `None` when the group did
    /// not participate in the match. Group 0 is the whole match.
    pub fn span(&self, group: usize) -> Option<Range<usize>> {
        self.spans.get(group).copied().flatten().map(|(s, e)| s..e)
    }

    /// Number of spans, capture groups plus one for the whole match.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when there are no capture groups besides the whole match.
    pub fn is_empty(&self) -> bool {
        self.spans.len() <= 1
    }

    /// The group index a declared name refers to.
    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.pattern.group_index(name)
    }

    /// Byte range of the named group, or `None` when the name is unknown
    /// or the group did not participate in the match.
    pub fn named_span(&self, name: &str) -> Option<Range<usize>> {
        self.span(self.group_index(name)?)
    }

    /// The text matched by a group, sliced out of `subject`, which must
    /// be the string the match was produced from.
    pub fn group_str<'s>(
        &self,
        subject: &'s str,
        group: usize,
    ) -> Option<&'s str> {
        self.span(group).map(|range| &subject[range])
    }
}

/// An iterator over all non-overlapping matches of a pattern, returned by
/// [`Pattern::find_iter`].
///
/// Implements the repeated-search contract of global matching: every next
/// search starts at the end of the previous match, or one position past
/// it when the previous match was zero-width, so the iteration always
/// makes progress and terminates.
pub struct Matches<'p, 's> {
    pattern: &'p Pattern,
    subject: Subject<'s>,
    next_pos: usize,
    done: bool,
}

impl<'p> Iterator for Matches<'p, '_> {
    type Item = MatchResult<'p>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pattern.exec(&self.subject, self.next_pos) {
            Some((start, end, groups)) => {
                self.next_pos = if end == start { end + 1 } else { end };
                Some(self.pattern.make_result(
                    &self.subject,
                    start,
                    end,
                    groups,
                ))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl Pattern {
    /// Searches `subject` for the leftmost match starting at or after the
    /// byte offset `start`.
    ///
    /// Returns `None` when nothing matches; a compiled pattern never
    /// fails at match time. When the pattern was compiled with
    /// [`Flags::ANCHORED`] the match must begin exactly at `start`.
    ///
    /// ```
    /// # use preg::{compile, Flags};
    /// let pattern = compile(r"(\w+)@(\w+)", Flags::empty()).unwrap();
    /// let m = pattern.find("mail me: ana@example", 0).unwrap();
    /// assert_eq!(m.group_str("mail me: ana@example", 1), Some("ana"));
    /// ```
    pub fn find<'p>(
        &'p self,
        subject: &str,
        start: usize,
    ) -> Option<MatchResult<'p>> {
        let subject =
            Subject::new(subject, self.flags().contains(Flags::UNICODE));
        let start = subject.position_at_byte(start);
        self.exec(&subject, start).map(|(begin, end, groups)| {
            self.make_result(&subject, begin, end, groups)
        })
    }

    /// Returns an iterator over every non-overlapping match in `subject`,
    /// scanning forward from its beginning. This is the search loop the
    /// `global` flag calls for.
    pub fn find_iter<'p, 's>(&'p self, subject: &'s str) -> Matches<'p, 's> {
        Matches {
            pattern: self,
            subject: Subject::new(
                subject,
                self.flags().contains(Flags::UNICODE),
            ),
            next_pos: 0,
            done: false,
        }
    }

    /// Scans forward from `start` (a position, not a byte offset) and
    /// attempts a full match at each admissible candidate offset.
    pub(crate) fn exec(
        &self,
        subject: &Subject,
        start: usize,
    ) -> Option<(usize, usize, Vec<GroupSpan>)> {
        let len = subject.len();
        let min_len = self.min_len as usize;
        let mut state = MatchState::new(
            &self.program,
            subject,
            self.group_count,
            self.loop_count,
            start,
            self.step_limit,
        );
        let mut at = start;
        loop {
            if at > len || len - at < min_len {
                return None;
            }
            if let Some(prefix_bytes) = &self.prefix_bytes {
                let from = subject.byte_offset(at);
                match memmem::find(
                    &subject.text().as_bytes()[from..],
                    prefix_bytes,
                ) {
                    Some(found) => {
                        let candidate =
                            subject.position_at_byte(from + found);
                        if self.anchored() && candidate != at {
                            return None;
                        }
                        at = candidate;
                        if len - at < min_len {
                            return None;
                        }
                    }
                    None => return None,
                }
            } else if let Some(first_set) = &self.first_set {
                // A pattern with a first set cannot match empty, so
                // min_len >= 1 and `at` is within bounds here.
                if !first_set.contains_char(subject.char_at(at)) {
                    if self.anchored() {
                        return None;
                    }
                    at += 1;
                    continue;
                }
            }
            state.prepare();
            if let Some(end) = state.walk(self.program.start(), at, None) {
                return Some((at, end, state.take_groups()));
            }
            if state.exhausted() || self.anchored() {
                return None;
            }
            at += 1;
        }
    }

    fn anchored(&self) -> bool {
        self.flags().contains(Flags::ANCHORED)
    }

    pub(crate) fn make_result<'p>(
        &'p self,
        subject: &Subject,
        start: usize,
        end: usize,
        groups: Vec<GroupSpan>,
    ) -> MatchResult<'p> {
        let mut spans = Vec::with_capacity(groups.len().max(1));
        spans.push(Some((
            subject.byte_offset(start),
            subject.byte_offset(end),
        )));
        for group in groups.iter().skip(1) {
            spans.push(if group.matched {
                Some((
                    subject.byte_offset(group.begin),
                    subject.byte_offset(group.end),
                ))
            } else {
                None
            });
        }
        MatchResult { pattern: self, spans }
    }
}
