/*!
The backtracking walk.

The program graph is evaluated in continuation-passing style: succeeding
at a node means the node matched locally *and* everything wired after it
matched too, so [`MatchState::walk`] returns the final offset of the whole
remaining (sub)program. Failure makes the innermost enclosing choice point
(an alternation branch, a non-unique loop decision, a lookaround probe)
restore its snapshot of the capture and loop state and try its next
alternative, so failed attempts never leak partial captures.

Every node transition spends one unit of the step budget. When the budget
runs out the walk fails deterministically; the scan loop then gives up on
the whole attempt instead of trying further start offsets. The budget is
what bounds runaway backtracking on adversarial patterns, and it also
bounds the native recursion depth, since every recursive call consumes at
least one step.
*/

use smallvec::SmallVec;

use crate::matcher::Subject;
use crate::program::{
    LoopData, LoopPolicy, NodeId, NodeKind, Program, UNBOUNDED,
};

/// The recorded span of one capture group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GroupSpan {
    pub begin: usize,
    pub end: usize,
    /// Only when this is set may `begin`/`end` be read; an unmatched
    /// group never reports a span.
    pub matched: bool,
}

/// Per-loop iteration bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
struct LoopState {
    /// Completed iterations of the current activation.
    count: u32,
    /// Offset at which the previous iteration started; detects
    /// zero-width iterations.
    last: usize,
}

/// A copy of the mutable match state taken at a choice point and restored
/// when the attempted branch ultimately fails.
struct Snapshot {
    groups: SmallVec<[GroupSpan; 8]>,
    loops: SmallVec<[LoopState; 4]>,
}

/// The mutable state of one match attempt.
pub(crate) struct MatchState<'a> {
    program: &'a Program,
    subject: &'a Subject<'a>,
    /// The offset where scanning began; `\G` anchors here.
    origin: usize,
    groups: Vec<GroupSpan>,
    loops: Vec<LoopState>,
    steps: usize,
}

impl<'a> MatchState<'a> {
    pub fn new(
        program: &'a Program,
        subject: &'a Subject<'a>,
        group_count: u32,
        loop_count: u32,
        origin: usize,
        step_limit: usize,
    ) -> Self {
        Self {
            program,
            subject,
            origin,
            groups: vec![GroupSpan::default(); group_count as usize + 1],
            loops: vec![LoopState::default(); loop_count as usize + 1],
            steps: step_limit,
        }
    }

    /// Clears capture and loop state for a fresh attempt. The step budget
    /// deliberately carries over: it bounds the whole scan.
    pub fn prepare(&mut self) {
        self.groups.fill(GroupSpan::default());
        self.loops.fill(LoopState::default());
    }

    /// True once the step budget has been spent.
    pub fn exhausted(&self) -> bool {
        self.steps == 0
    }

    /// Takes the capture spans of a successful attempt.
    pub fn take_groups(&mut self) -> Vec<GroupSpan> {
        std::mem::take(&mut self.groups)
    }

    fn save(&self) -> Snapshot {
        Snapshot {
            groups: SmallVec::from_slice(&self.groups),
            loops: SmallVec::from_slice(&self.loops),
        }
    }

    fn restore(&mut self, snapshot: &Snapshot) {
        self.groups.copy_from_slice(&snapshot.groups);
        self.loops.copy_from_slice(&snapshot.loops);
    }

    /// Follows a `next` edge; a missing edge accepts, like an explicit
    /// accept node.
    fn walk_next(
        &mut self,
        next: Option<NodeId>,
        pos: usize,
        stop: Option<NodeId>,
    ) -> Option<usize> {
        match next {
            Some(next) => self.walk(next, pos, stop),
            None => Some(pos),
        }
    }

    /// Evaluates the (sub)program starting at `id` against the subject at
    /// `pos`. Returns the final offset on success. `stop` marks a node
    /// whose mere reach terminates the walk successfully; possessive
    /// loops use it to bound one body iteration.
    pub fn walk(
        &mut self,
        id: NodeId,
        pos: usize,
        stop: Option<NodeId>,
    ) -> Option<usize> {
        if Some(id) == stop {
            return Some(pos);
        }
        if self.steps == 0 {
            return None;
        }
        self.steps -= 1;

        let program = self.program;
        let node = program.node(id);
        let subject = self.subject;
        let len = subject.len();

        match &node.kind {
            NodeKind::Accept => Some(pos),

            NodeKind::Literal(chars) => {
                let end = pos + chars.len();
                if end <= len
                    && subject.slice(pos, end).iter().eq(chars.iter())
                {
                    self.walk_next(node.next, end, stop)
                } else {
                    None
                }
            }

            NodeKind::LiteralCaseless(chars) => {
                let end = pos + chars.len();
                if end <= len
                    && subject
                        .slice(pos, end)
                        .iter()
                        .zip(chars.iter())
                        .all(|(&a, &b)| chars_eq_caseless(a, b))
                {
                    self.walk_next(node.next, end, stop)
                } else {
                    None
                }
            }

            NodeKind::Any => {
                if pos < len {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::Class(set) => {
                if pos < len && set.contains_char(subject.char_at(pos)) {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::ClassCaseless(set) => {
                if pos < len
                    && class_contains_caseless(set, subject.char_at(pos))
                {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::ClassNegated(set) => {
                if pos < len && !set.contains_char(subject.char_at(pos)) {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::ClassNegatedCaseless(set) => {
                if pos < len
                    && !class_contains_caseless(set, subject.char_at(pos))
                {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::Category { category, negated } => {
                if pos < len
                    && (category.contains(subject.char_at(pos)) != *negated)
                {
                    self.walk_next(node.next, pos + 1, stop)
                } else {
                    None
                }
            }

            NodeKind::GroupBegin(group) => {
                self.groups[*group as usize].begin = pos;
                self.walk_next(node.next, pos, stop)
            }

            NodeKind::GroupEnd(group) => {
                let span = &mut self.groups[*group as usize];
                span.end = pos;
                span.matched = true;
                self.walk_next(node.next, pos, stop)
            }

            NodeKind::Backref(group) => {
                let span = self.groups[*group as usize];
                if !span.matched {
                    return None;
                }
                let ref_len = span.end - span.begin;
                let end = pos + ref_len;
                if end <= len
                    && subject
                        .slice(span.begin, span.end)
                        .iter()
                        .eq(subject.slice(pos, end).iter())
                {
                    self.walk_next(node.next, end, stop)
                } else {
                    None
                }
            }

            NodeKind::BackrefCaseless(group) => {
                let span = self.groups[*group as usize];
                if !span.matched {
                    return None;
                }
                let ref_len = span.end - span.begin;
                let end = pos + ref_len;
                if end <= len
                    && subject
                        .slice(span.begin, span.end)
                        .iter()
                        .zip(subject.slice(pos, end).iter())
                        .all(|(&a, &b)| chars_eq_caseless(a, b))
                {
                    self.walk_next(node.next, end, stop)
                } else {
                    None
                }
            }

            NodeKind::LoopInit(index) => {
                self.loops[*index as usize] = LoopState::default();
                self.walk_next(node.next, pos, stop)
            }

            NodeKind::Loop(data) => self.walk_loop(id, data, pos, stop),

            NodeKind::Alt { branches, first_sets } => {
                if let Some(first_sets) = first_sets {
                    // Backtrack-eliminated: at most one branch can start
                    // with the next character, so no snapshot is needed.
                    if pos >= len {
                        return None;
                    }
                    let c = subject.char_at(pos);
                    for (&branch, set) in
                        branches.iter().zip(first_sets.iter())
                    {
                        if set.contains_char(c) {
                            return self.walk(branch, pos, stop);
                        }
                    }
                    return None;
                }
                for &branch in branches.iter() {
                    let snapshot = self.save();
                    if let Some(end) = self.walk(branch, pos, stop) {
                        return Some(end);
                    }
                    self.restore(&snapshot);
                    if self.steps == 0 {
                        return None;
                    }
                }
                None
            }

            NodeKind::Join => self.walk_next(node.next, pos, stop),

            NodeKind::Lookahead { negative, body } => {
                let snapshot = self.save();
                let probe = self.walk(*body, pos, None);
                if *negative {
                    self.restore(&snapshot);
                    if probe.is_some() {
                        None
                    } else {
                        self.walk_next(node.next, pos, stop)
                    }
                } else if probe.is_some() {
                    // Captures made inside a positive lookahead are kept.
                    self.walk_next(node.next, pos, stop)
                } else {
                    self.restore(&snapshot);
                    None
                }
            }

            NodeKind::Lookbehind { negative, body, length } => {
                let snapshot = self.save();
                let probe = match pos.checked_sub(*length as usize) {
                    Some(from) => self
                        .walk(*body, from, None)
                        .filter(|&end| end == pos),
                    None => None,
                };
                if *negative {
                    self.restore(&snapshot);
                    if probe.is_some() {
                        None
                    } else {
                        self.walk_next(node.next, pos, stop)
                    }
                } else if probe.is_some() {
                    self.walk_next(node.next, pos, stop)
                } else {
                    self.restore(&snapshot);
                    None
                }
            }

            NodeKind::Conditional { group, yes, no } => {
                // Deterministic choice; on failure there is no other arm
                // to try, so no snapshot is needed.
                if self.groups[*group as usize].matched {
                    self.walk(*yes, pos, stop)
                } else {
                    match no {
                        Some(no) => self.walk(*no, pos, stop),
                        None => self.walk_next(node.next, pos, stop),
                    }
                }
            }

            NodeKind::StringBegin => {
                if pos == 0 {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::LineBegin => {
                if pos == 0 || subject.char_at(pos - 1) == '\n' {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::StringEnd => {
                if pos == len {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::StringEndNewline => {
                if pos == len
                    || (pos + 1 == len && subject.char_at(pos) == '\n')
                {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::LineEnd => {
                if pos == len || subject.char_at(pos) == '\n' {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::MatchStart => {
                if pos == self.origin {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }

            NodeKind::WordBoundary | NodeKind::NotWordBoundary => {
                let before =
                    pos > 0 && is_word_char(subject.char_at(pos - 1));
                let after = pos < len && is_word_char(subject.char_at(pos));
                let boundary = before != after;
                let wanted =
                    matches!(node.kind, NodeKind::WordBoundary) == boundary;
                if wanted {
                    self.walk_next(node.next, pos, stop)
                } else {
                    None
                }
            }
        }
    }

    fn walk_loop(
        &mut self,
        id: NodeId,
        data: &LoopData,
        pos: usize,
        stop: Option<NodeId>,
    ) -> Option<usize> {
        if data.simple {
            return self.walk_simple_loop(id, data, pos, stop);
        }

        let index = data.index as usize;
        let state = self.loops[index];
        let next = self.program.node(id).next;

        // A body iteration that consumed nothing terminates the loop, no
        // matter the policy; otherwise a nullable body would repeat
        // forever.
        if state.count > 0 && state.last == pos {
            return if state.count >= data.min {
                self.walk_next(next, pos, stop)
            } else {
                None
            };
        }

        if let Some(first_set) = &data.unique {
            // Backtrack-eliminated: the next character alone decides
            // between iterating and leaving.
            let iterate = state.count < data.max
                && pos < self.subject.len()
                && first_set.contains_char(self.subject.char_at(pos));
            return if iterate {
                self.loops[index] =
                    LoopState { count: state.count + 1, last: pos };
                self.walk(data.body, pos, stop)
            } else if state.count >= data.min {
                self.walk_next(next, pos, stop)
            } else {
                None
            };
        }

        match data.policy {
            LoopPolicy::Greedy => {
                if state.count < data.max {
                    let snapshot = self.save();
                    self.loops[index] =
                        LoopState { count: state.count + 1, last: pos };
                    if let Some(end) = self.walk(data.body, pos, stop) {
                        return Some(end);
                    }
                    self.restore(&snapshot);
                    if self.steps == 0 {
                        return None;
                    }
                }
                if state.count >= data.min {
                    self.walk_next(next, pos, stop)
                } else {
                    None
                }
            }
            LoopPolicy::Lazy => {
                if state.count >= data.min {
                    let snapshot = self.save();
                    if let Some(end) = self.walk_next(next, pos, stop) {
                        return Some(end);
                    }
                    self.restore(&snapshot);
                    if self.steps == 0 {
                        return None;
                    }
                }
                if state.count < data.max {
                    self.loops[index] =
                        LoopState { count: state.count + 1, last: pos };
                    self.walk(data.body, pos, stop)
                } else {
                    None
                }
            }
            LoopPolicy::Possessive => {
                // Consume body iterations greedily with the loop node
                // itself as the walk terminator, so each walk covers
                // exactly one iteration. Whatever each iteration chose is
                // final: a later continuation failure fails the whole
                // construct.
                let mut count = state.count;
                let mut p = pos;
                while count < data.max {
                    let snapshot = self.save();
                    self.loops[index] =
                        LoopState { count: count + 1, last: p };
                    match self.walk(data.body, p, Some(id)) {
                        Some(end) if end != p => {
                            count += 1;
                            p = end;
                        }
                        Some(_) => {
                            count += 1;
                            break;
                        }
                        None => {
                            self.restore(&snapshot);
                            break;
                        }
                    }
                    if self.steps == 0 {
                        return None;
                    }
                }
                if count >= data.min {
                    self.walk_next(next, p, stop)
                } else {
                    None
                }
            }
        }
    }

    /// Loops whose body is one character-consuming node are iterated
    /// in place: count the matching characters once, then pick the
    /// repetition count according to the policy. The body itself cannot
    /// capture, so only continuation retries need snapshots.
    fn walk_simple_loop(
        &mut self,
        id: NodeId,
        data: &LoopData,
        pos: usize,
        stop: Option<NodeId>,
    ) -> Option<usize> {
        let program = self.program;
        let body_kind = &program.node(data.body).kind;
        let len = self.subject.len();
        let max = if data.max == UNBOUNDED {
            usize::MAX
        } else {
            data.max as usize
        };
        let min = data.min as usize;

        let mut available = 0;
        while available < max
            && pos + available < len
            && matches_one(body_kind, self.subject.char_at(pos + available))
        {
            available += 1;
        }
        if available < min {
            return None;
        }

        let next = self.program.node(id).next;
        match data.policy {
            LoopPolicy::Greedy => {
                // The body cannot capture, but the continuation can, so
                // every retry at a shorter repetition count starts from a
                // clean snapshot.
                let mut k = available;
                loop {
                    let snapshot = self.save();
                    if let Some(end) = self.walk_next(next, pos + k, stop) {
                        return Some(end);
                    }
                    self.restore(&snapshot);
                    if self.steps == 0 || k == min {
                        return None;
                    }
                    k -= 1;
                }
            }
            LoopPolicy::Lazy => {
                let mut k = min;
                loop {
                    let snapshot = self.save();
                    if let Some(end) = self.walk_next(next, pos + k, stop) {
                        return Some(end);
                    }
                    self.restore(&snapshot);
                    if self.steps == 0 || k == available {
                        return None;
                    }
                    k += 1;
                }
            }
            LoopPolicy::Possessive => {
                self.walk_next(next, pos + available, stop)
            }
        }
    }
}

fn matches_one(kind: &NodeKind, c: char) -> bool {
    match kind {
        NodeKind::Literal(chars) => chars.first() == Some(&c),
        NodeKind::LiteralCaseless(chars) => {
            chars.first().is_some_and(|&l| chars_eq_caseless(l, c))
        }
        NodeKind::Any => true,
        NodeKind::Class(set) => set.contains_char(c),
        NodeKind::ClassCaseless(set) => class_contains_caseless(set, c),
        NodeKind::ClassNegated(set) => !set.contains_char(c),
        NodeKind::ClassNegatedCaseless(set) => {
            !class_contains_caseless(set, c)
        }
        NodeKind::Category { category, negated } => {
            category.contains(c) != *negated
        }
        _ => false,
    }
}

/// One-to-one lowercase folding. Characters whose lowercase expands to
/// multiple characters compare as themselves.
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn chars_eq_caseless(a: char, b: char) -> bool {
    a == b || fold(a) == fold(b)
}

fn class_contains_caseless(set: &crate::charclass::ClassSet, c: char) -> bool {
    if set.contains_char(c) {
        return true;
    }
    let folded = fold(c);
    if folded != c && set.contains_char(folded) {
        return true;
    }
    let mut upper = c.to_uppercase();
    if let (Some(u), None) = (upper.next(), upper.next()) {
        if u != c && set.contains_char(u) {
            return true;
        }
    }
    false
}

pub(crate) fn is_word_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}
