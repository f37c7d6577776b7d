/*!
Optimization passes over the raw program graph.

Four independent passes run in this order:

1. **Case folding** rewrites literal, class and backreference nodes to
   their case-insensitive variants when the pattern is caseless. The graph
   shape is untouched.
2. **Backtrack elimination** marks alternations and loops "unique" when
   their choices are provably disjoint on the next input character, letting
   the matcher pick a branch deterministically instead of snapshotting and
   undoing. Skipped for caseless patterns, where folding widens first sets
   past the point of useful disjointness analysis.
3. **Hint computation** derives the whole-program minimum match length,
   the required literal prefix (when one exists) and the first-character
   admissibility set. The matcher uses all three to reject candidate start
   offsets without entering the backtracking walk.
4. **Loop linking** wires each loop body's tails back to the loop node,
   creating the graph's only cycles, and demotes a loop's declared minimum
   to at most 1 when its body can derive the empty string, so a zero-width
   body can never demand unbounded repetition.

The first-set computations here are over-approximations: a set may contain
characters that cannot actually begin the construct, but never misses one
that can. Disjointness of over-approximations is therefore sound, and so
is pruning start offsets whose character is outside the first set.
*/

use crate::charclass::{ClassSet, MAX_CODE_POINT};
use crate::program::{NodeId, NodeKind, Program};

/// Walk budget for the analysis functions, guarding against pathological
/// graphs. Running out of fuel degrades the analysis to its conservative
/// answer, never to an unsound one.
const ANALYSIS_FUEL: u32 = 4096;

/// The scan hints computed by the third pass.
pub(crate) struct Hints {
    /// Minimum number of characters any successful match consumes.
    pub min_len: u32,
    /// A literal every match must start with, when one can be determined.
    pub prefix: Option<Vec<char>>,
    /// Characters that can begin a match. `None` when a match can be
    /// empty or the set could not be determined.
    pub first_set: Option<ClassSet>,
}

/// Rewrites literal, class and backreference nodes to their caseless
/// variants.
pub(crate) fn case_fold(program: &mut Program) {
    for id in program.ids() {
        let kind = &mut program.node_mut(id).kind;
        *kind = match std::mem::replace(kind, NodeKind::Join) {
            NodeKind::Literal(chars) => NodeKind::LiteralCaseless(chars),
            NodeKind::Class(set) => NodeKind::ClassCaseless(set),
            NodeKind::ClassNegated(set) => {
                NodeKind::ClassNegatedCaseless(set)
            }
            NodeKind::Backref(group) => NodeKind::BackrefCaseless(group),
            other => other,
        };
    }
}

enum Unique {
    Alt(NodeId, Box<[ClassSet]>),
    Loop(NodeId, ClassSet),
}

/// Marks alternation and loop nodes whose choices are provably disjoint
/// on the next input character.
pub(crate) fn eliminate_backtracking(program: &mut Program) {
    let mut updates = Vec::new();
    for id in program.ids() {
        let node = program.node(id);
        match &node.kind {
            NodeKind::Alt { branches, .. } => {
                // Branch chains are wired into the join node that the
                // alternation's `next` edge points at.
                let join = node.next;
                let mut sets = Vec::with_capacity(branches.len());
                let mut eligible = true;
                for &branch in branches.iter() {
                    let mut fuel = ANALYSIS_FUEL;
                    let (set, nullable) =
                        first_info(program, Some(branch), join, &mut fuel);
                    // A branch that can match empty falls through to the
                    // continuation, whose next character is unknown here.
                    if nullable {
                        eligible = false;
                        break;
                    }
                    sets.push(set);
                }
                if eligible && pairwise_disjoint(&sets) {
                    updates
                        .push(Unique::Alt(id, sets.into_boxed_slice()));
                }
            }
            NodeKind::Loop(data) => {
                let mut fuel = ANALYSIS_FUEL;
                let (body_set, body_nullable) =
                    first_info(program, Some(data.body), None, &mut fuel);
                let mut fuel = ANALYSIS_FUEL;
                let (cont_set, cont_nullable) =
                    first_info(program, node.next, None, &mut fuel);
                // If either side can match empty the iterate-vs-exit
                // decision cannot be forced by one character.
                if body_nullable || cont_nullable {
                    continue;
                }
                let mut probe = body_set.clone();
                if probe.intersect_and_check_disjoint(&cont_set) {
                    updates.push(Unique::Loop(id, body_set));
                }
            }
            _ => {}
        }
    }
    for update in updates {
        match update {
            Unique::Alt(id, sets) => {
                if let NodeKind::Alt { first_sets, .. } =
                    &mut program.node_mut(id).kind
                {
                    *first_sets = Some(sets);
                }
            }
            Unique::Loop(id, set) => {
                if let NodeKind::Loop(data) = &mut program.node_mut(id).kind
                {
                    data.unique = Some(set);
                }
            }
        }
    }
}

fn pairwise_disjoint(sets: &[ClassSet]) -> bool {
    let mut seen = ClassSet::new();
    for set in sets {
        let mut probe = set.clone();
        if !probe.intersect_and_check_disjoint(&seen) {
            return false;
        }
        seen.union(set);
    }
    true
}

/// Computes the scan hints for the whole program. Must run before loop
/// linking, while the graph is still acyclic, and after case folding, so
/// the first set reflects the folded nodes.
pub(crate) fn compute_hints(program: &Program, caseless: bool) -> Hints {
    let mut fuel = ANALYSIS_FUEL;
    let min_len = min_length(program, Some(program.start()), None, &mut fuel);
    // A folded prefix would need multi-variant search, so caseless
    // patterns go without one.
    let prefix = if caseless {
        None
    } else {
        let prefix = literal_prefix(program, program.start());
        if prefix.is_empty() {
            None
        } else {
            Some(prefix)
        }
    };
    let mut fuel = ANALYSIS_FUEL;
    let (first_set, nullable) =
        first_info(program, Some(program.start()), None, &mut fuel);
    let first_set = if nullable { None } else { Some(first_set) };
    Hints { min_len, prefix, first_set }
}

/// Wires every loop body back to its loop node and demotes minimum
/// repetition counts of loops whose body can derive the empty string.
pub(crate) fn link_loops(
    program: &mut Program,
    loop_tails: Vec<(NodeId, Vec<NodeId>)>,
) {
    for (loop_id, tails) in loop_tails {
        let (body, min) = match &program.node(loop_id).kind {
            NodeKind::Loop(data) => (data.body, data.min),
            _ => unreachable!("loop tail recorded for a non-loop node"),
        };
        let mut fuel = ANALYSIS_FUEL;
        let demote = min > 1
            && can_match_empty(program, Some(body), Some(loop_id), &mut fuel);
        for tail in tails {
            program.set_next(tail, loop_id);
        }
        let simple = {
            let body_node = program.node(body);
            body_node.next == Some(loop_id)
                && match &body_node.kind {
                    NodeKind::Literal(chars)
                    | NodeKind::LiteralCaseless(chars) => chars.len() == 1,
                    NodeKind::Any
                    | NodeKind::Class(_)
                    | NodeKind::ClassCaseless(_)
                    | NodeKind::ClassNegated(_)
                    | NodeKind::ClassNegatedCaseless(_)
                    | NodeKind::Category { .. } => true,
                    _ => false,
                }
        };
        if let NodeKind::Loop(data) = &mut program.node_mut(loop_id).kind {
            if demote {
                data.min = 1;
            }
            data.simple = simple;
        }
    }
}

/// Computes the exact number of characters a subgraph consumes, or `None`
/// when that length is not statically fixed. Used to validate lookbehind
/// bodies at parse time, while the graph is still acyclic.
pub(crate) fn exact_length(
    program: &Program,
    start: NodeId,
) -> Option<u32> {
    let mut fuel = ANALYSIS_FUEL;
    exact_length_chain(program, Some(start), None, &mut fuel)
}

fn exact_length_chain(
    program: &Program,
    mut cur: Option<NodeId>,
    stop: Option<NodeId>,
    fuel: &mut u32,
) -> Option<u32> {
    let mut total: u32 = 0;
    loop {
        let id = match cur {
            None => return Some(total),
            Some(id) if Some(id) == stop => return Some(total),
            Some(id) => id,
        };
        if *fuel == 0 {
            return None;
        }
        *fuel -= 1;
        let node = program.node(id);
        match &node.kind {
            NodeKind::Accept => return Some(total),
            NodeKind::Literal(chars) | NodeKind::LiteralCaseless(chars) => {
                total = total.saturating_add(chars.len() as u32);
            }
            NodeKind::Any
            | NodeKind::Class(_)
            | NodeKind::ClassCaseless(_)
            | NodeKind::ClassNegated(_)
            | NodeKind::ClassNegatedCaseless(_)
            | NodeKind::Category { .. } => {
                total = total.saturating_add(1);
            }
            NodeKind::Backref(_) | NodeKind::BackrefCaseless(_) => {
                return None;
            }
            NodeKind::Loop(data) => {
                if data.min != data.max {
                    return None;
                }
                let body =
                    exact_length_chain(program, Some(data.body), None, fuel)?;
                total = total.saturating_add(data.min.saturating_mul(body));
            }
            NodeKind::Alt { branches, .. } => {
                let mut len = None;
                for &branch in branches.iter() {
                    let branch_len = exact_length_chain(
                        program,
                        Some(branch),
                        node.next,
                        fuel,
                    )?;
                    match len {
                        None => len = Some(branch_len),
                        Some(len) if len != branch_len => return None,
                        Some(_) => {}
                    }
                }
                total = total.saturating_add(len.unwrap_or(0));
            }
            NodeKind::Conditional { yes, no, .. } => {
                let yes_len =
                    exact_length_chain(program, Some(*yes), node.next, fuel)?;
                let no_len = match no {
                    Some(no) => exact_length_chain(
                        program,
                        Some(*no),
                        node.next,
                        fuel,
                    )?,
                    None => 0,
                };
                if yes_len != no_len {
                    return None;
                }
                total = total.saturating_add(yes_len);
            }
            // Zero-width nodes.
            NodeKind::GroupBegin(_)
            | NodeKind::GroupEnd(_)
            | NodeKind::LoopInit(_)
            | NodeKind::Join
            | NodeKind::Lookahead { .. }
            | NodeKind::Lookbehind { .. }
            | NodeKind::StringBegin
            | NodeKind::LineBegin
            | NodeKind::StringEnd
            | NodeKind::StringEndNewline
            | NodeKind::LineEnd
            | NodeKind::MatchStart
            | NodeKind::WordBoundary
            | NodeKind::NotWordBoundary => {}
        }
        cur = node.next;
    }
}

/// Computes the set of characters that can begin a chain and whether the
/// chain can match without consuming anything. The set is an
/// over-approximation and the nullability errs towards `true`.
pub(crate) fn first_info(
    program: &Program,
    mut cur: Option<NodeId>,
    stop: Option<NodeId>,
    fuel: &mut u32,
) -> (ClassSet, bool) {
    let mut set = ClassSet::new();
    loop {
        let id = match cur {
            None => return (set, true),
            Some(id) if Some(id) == stop => return (set, true),
            Some(id) => id,
        };
        if *fuel == 0 {
            return (ClassSet::full(), true);
        }
        *fuel -= 1;
        let node = program.node(id);
        let nullable = match &node.kind {
            NodeKind::Accept => return (set, true),
            NodeKind::Literal(chars) => {
                if let Some(&c) = chars.first() {
                    set.add_char(c);
                }
                false
            }
            NodeKind::LiteralCaseless(chars) => {
                if let Some(&c) = chars.first() {
                    add_case_variants(&mut set, c);
                }
                false
            }
            NodeKind::Any => {
                set.set_range(0, MAX_CODE_POINT);
                false
            }
            NodeKind::Class(s) => {
                set.union(s);
                false
            }
            NodeKind::ClassNegated(s) => {
                set.union_negated(s);
                false
            }
            // Folding a whole class is not worth the cost; the full set
            // is a sound over-approximation.
            NodeKind::ClassCaseless(_)
            | NodeKind::ClassNegatedCaseless(_) => {
                set.set_range(0, MAX_CODE_POINT);
                false
            }
            NodeKind::Category { category, negated } => {
                match (category.ranges(), negated) {
                    (Some(table), false) => {
                        for &(lo, hi) in table {
                            set.set_range(lo, hi);
                        }
                    }
                    _ => set.set_range(0, MAX_CODE_POINT),
                }
                false
            }
            // A backreference's text is unknown at compile time, and it
            // may be empty.
            NodeKind::Backref(_) | NodeKind::BackrefCaseless(_) => {
                set.set_range(0, MAX_CODE_POINT);
                true
            }
            NodeKind::Loop(data) => {
                let (body_set, body_nullable) =
                    first_info(program, Some(data.body), Some(id), fuel);
                set.union(&body_set);
                data.min == 0 || body_nullable
            }
            NodeKind::Alt { branches, .. } => {
                let mut any_nullable = false;
                for &branch in branches.iter() {
                    let (branch_set, branch_nullable) =
                        first_info(program, Some(branch), node.next, fuel);
                    set.union(&branch_set);
                    any_nullable |= branch_nullable;
                }
                any_nullable
            }
            NodeKind::Conditional { yes, no, .. } => {
                let (yes_set, yes_nullable) =
                    first_info(program, Some(*yes), node.next, fuel);
                set.union(&yes_set);
                let no_nullable = match no {
                    Some(no) => {
                        let (no_set, no_nullable) = first_info(
                            program,
                            Some(*no),
                            node.next,
                            fuel,
                        );
                        set.union(&no_set);
                        no_nullable
                    }
                    None => true,
                };
                yes_nullable || no_nullable
            }
            // Zero-width nodes contribute nothing and never consume.
            NodeKind::GroupBegin(_)
            | NodeKind::GroupEnd(_)
            | NodeKind::LoopInit(_)
            | NodeKind::Join
            | NodeKind::Lookahead { .. }
            | NodeKind::Lookbehind { .. }
            | NodeKind::StringBegin
            | NodeKind::LineBegin
            | NodeKind::StringEnd
            | NodeKind::StringEndNewline
            | NodeKind::LineEnd
            | NodeKind::MatchStart
            | NodeKind::WordBoundary
            | NodeKind::NotWordBoundary => true,
        };
        if !nullable {
            return (set, false);
        }
        cur = node.next;
    }
}

/// Whether a chain can match the empty string. Unlike the nullability of
/// [`first_info`], backreferences count as non-empty here: this drives the
/// loop minimum demotion, which changes declared semantics, so it applies
/// only to bodies that are syntactically able to derive the empty string.
fn can_match_empty(
    program: &Program,
    mut cur: Option<NodeId>,
    stop: Option<NodeId>,
    fuel: &mut u32,
) -> bool {
    loop {
        let id = match cur {
            None => return true,
            Some(id) if Some(id) == stop => return true,
            Some(id) => id,
        };
        if *fuel == 0 {
            return true;
        }
        *fuel -= 1;
        let node = program.node(id);
        let empty = match &node.kind {
            NodeKind::Accept => return true,
            NodeKind::Literal(_)
            | NodeKind::LiteralCaseless(_)
            | NodeKind::Any
            | NodeKind::Class(_)
            | NodeKind::ClassCaseless(_)
            | NodeKind::ClassNegated(_)
            | NodeKind::ClassNegatedCaseless(_)
            | NodeKind::Category { .. }
            | NodeKind::Backref(_)
            | NodeKind::BackrefCaseless(_) => false,
            NodeKind::Loop(data) => {
                data.min == 0
                    || can_match_empty(
                        program,
                        Some(data.body),
                        Some(id),
                        fuel,
                    )
            }
            NodeKind::Alt { branches, .. } => branches.iter().any(|&b| {
                can_match_empty(program, Some(b), node.next, fuel)
            }),
            NodeKind::Conditional { yes, no, .. } => {
                can_match_empty(program, Some(*yes), node.next, fuel)
                    || match no {
                        Some(no) => can_match_empty(
                            program,
                            Some(*no),
                            node.next,
                            fuel,
                        ),
                        None => true,
                    }
            }
            _ => true,
        };
        if !empty {
            return false;
        }
        cur = node.next;
    }
}

/// Minimum number of characters a chain consumes.
fn min_length(
    program: &Program,
    mut cur: Option<NodeId>,
    stop: Option<NodeId>,
    fuel: &mut u32,
) -> u32 {
    let mut total: u32 = 0;
    loop {
        let id = match cur {
            None => return total,
            Some(id) if Some(id) == stop => return total,
            Some(id) => id,
        };
        if *fuel == 0 {
            return total;
        }
        *fuel -= 1;
        let node = program.node(id);
        match &node.kind {
            NodeKind::Accept => return total,
            NodeKind::Literal(chars) | NodeKind::LiteralCaseless(chars) => {
                total = total.saturating_add(chars.len() as u32);
            }
            NodeKind::Any
            | NodeKind::Class(_)
            | NodeKind::ClassCaseless(_)
            | NodeKind::ClassNegated(_)
            | NodeKind::ClassNegatedCaseless(_)
            | NodeKind::Category { .. } => {
                total = total.saturating_add(1);
            }
            NodeKind::Loop(data) => {
                let body =
                    min_length(program, Some(data.body), Some(id), fuel);
                total = total.saturating_add(data.min.saturating_mul(body));
            }
            NodeKind::Alt { branches, .. } => {
                let shortest = branches
                    .iter()
                    .map(|&b| {
                        min_length(program, Some(b), node.next, fuel)
                    })
                    .min()
                    .unwrap_or(0);
                total = total.saturating_add(shortest);
            }
            NodeKind::Conditional { yes, no, .. } => {
                let yes_len =
                    min_length(program, Some(*yes), node.next, fuel);
                let no_len = match no {
                    Some(no) => {
                        min_length(program, Some(*no), node.next, fuel)
                    }
                    None => 0,
                };
                total = total.saturating_add(yes_len.min(no_len));
            }
            // Zero-width nodes, backreferences included: a backreference
            // can consume nothing when its group captured nothing.
            _ => {}
        }
        cur = node.next;
    }
}

/// The literal every match must start with: the longest run of literal
/// nodes reachable from the start through zero-width nodes.
fn literal_prefix(program: &Program, start: NodeId) -> Vec<char> {
    let mut prefix = Vec::new();
    let mut cur = Some(start);
    let mut fuel = ANALYSIS_FUEL;
    while let Some(id) = cur {
        if fuel == 0 {
            break;
        }
        fuel -= 1;
        let node = program.node(id);
        match &node.kind {
            NodeKind::Literal(chars) => prefix.extend(chars.iter()),
            // Zero-width nodes restrict where a match can start but do
            // not change what its text starts with.
            NodeKind::GroupBegin(_)
            | NodeKind::GroupEnd(_)
            | NodeKind::Join
            | NodeKind::Lookahead { .. }
            | NodeKind::Lookbehind { .. }
            | NodeKind::StringBegin
            | NodeKind::LineBegin
            | NodeKind::StringEnd
            | NodeKind::StringEndNewline
            | NodeKind::LineEnd
            | NodeKind::MatchStart
            | NodeKind::WordBoundary
            | NodeKind::NotWordBoundary => {}
            _ => break,
        }
        cur = node.next;
    }
    prefix
}

/// Adds `c` and its simple case foldings to `set`.
pub(crate) fn add_case_variants(set: &mut ClassSet, c: char) {
    set.add_char(c);
    let mut lower = c.to_lowercase();
    if let (Some(l), None) = (lower.next(), lower.next()) {
        set.add_char(l);
    }
    let mut upper = c.to_uppercase();
    if let (Some(u), None) = (upper.next(), upper.next()) {
        set.add_char(u);
    }
}
