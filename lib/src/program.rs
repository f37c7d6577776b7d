/*!
The executable representation of a compiled pattern.

A program is a graph of [`Node`]s stored in a flat arena. Every edge is a
[`NodeId`] index into the arena: the `next` edge sequences nodes, while
branch edges (alternation branches, loop bodies, lookaround bodies,
conditional arms) hang off the node kind itself. After the loop-linking
optimization pass, the tail of every loop body points back at its loop
node; those back-edges are the only cycles in the graph.

The matcher interprets the graph in continuation-passing style: succeeding
at a node means succeeding at everything that follows it, so branch chains
are wired straight into their continuation (through [`NodeKind::Join`]
nodes) and lookaround bodies terminate in their own [`NodeKind::Accept`].
*/

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::charclass::ClassSet;
use crate::unicode::Category;

/// The index of a node within a [`Program`]'s arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub(crate) struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Marks a quantified loop's repetition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum LoopPolicy {
    /// Prefer the longest repetition, backing off on continuation failure.
    Greedy,
    /// Prefer the continuation, repeating only when it fails.
    Lazy,
    /// Repeat to the maximum and never backtrack into the loop.
    Possessive,
}

/// Sentinel for a loop with no upper repetition bound.
pub(crate) const UNBOUNDED: u32 = u32::MAX;

/// The payload of a [`NodeKind::Loop`] node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LoopData {
    pub policy: LoopPolicy,
    /// Minimum repetitions. Demoted to at most 1 by the loop-linking pass
    /// when the body can derive the empty string.
    pub min: u32,
    /// Maximum repetitions, or [`UNBOUNDED`].
    pub max: u32,
    /// Dense, 1-based loop index assigned in declaration order; selects
    /// this loop's counter in the match state.
    pub index: u32,
    /// First node of the loop body. After loop linking the body chain ends
    /// back at this loop's own node.
    pub body: NodeId,
    /// Set by backtrack elimination when the body's first-character set is
    /// provably disjoint from the continuation's: the matcher can then
    /// decide iterate-vs-exit from the next subject character alone.
    pub unique: Option<ClassSet>,
    /// True if the body is a single character-consuming node, which the
    /// matcher iterates without recursion or snapshots.
    pub simple: bool,
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum NodeKind {
    /// Terminates a (sub)program successfully. The top-level program and
    /// every lookaround body end with one of these.
    Accept,
    /// A literal character sequence.
    Literal(Box<[char]>),
    /// A literal character sequence compared ignoring case.
    LiteralCaseless(Box<[char]>),
    /// Any single character, newline included.
    Any,
    /// A single character contained in the set.
    Class(ClassSet),
    /// A single character contained in the set, compared ignoring case.
    ClassCaseless(ClassSet),
    /// A single character not contained in the set.
    ClassNegated(ClassSet),
    /// A single character not contained in the set, ignoring case.
    ClassNegatedCaseless(ClassSet),
    /// A single character tested against a top-level Unicode general
    /// category, possibly negated.
    Category { category: Category, negated: bool },
    /// Records the start of capture group `.0` at the current offset.
    GroupBegin(u32),
    /// Records the end of capture group `.0` and marks it matched.
    GroupEnd(u32),
    /// Matches the text captured by group `.0`.
    Backref(u32),
    /// Matches the text captured by group `.0`, ignoring case.
    BackrefCaseless(u32),
    /// Resets the counter of loop `.0` before its loop node is entered.
    LoopInit(u32),
    /// A quantified loop. The body hangs off [`LoopData::body`].
    Loop(Box<LoopData>),
    /// An alternation. Each branch chain is wired into the shared
    /// [`NodeKind::Join`] that follows the alternation. `first_sets` is
    /// populated by backtrack elimination when the branches are provably
    /// disjoint on their first character.
    Alt {
        branches: Box<[NodeId]>,
        first_sets: Option<Box<[ClassSet]>>,
    },
    /// A no-op junction where alternation or conditional branches meet
    /// their continuation.
    Join,
    /// A zero-width lookahead probe of `body` at the current offset.
    Lookahead { negative: bool, body: NodeId },
    /// A zero-width lookbehind probe of `body`, evaluated `length`
    /// characters before the current offset. `length` is the statically
    /// computed body length.
    Lookbehind { negative: bool, body: NodeId, length: u32 },
    /// Selects `yes` when group `group` has matched, `no` (or the
    /// fall-through `next`) otherwise.
    Conditional { group: u32, yes: NodeId, no: Option<NodeId> },
    /// Start of the subject.
    StringBegin,
    /// Start of the subject or of an internal line.
    LineBegin,
    /// True end of the subject.
    StringEnd,
    /// End of the subject, or just before a trailing newline.
    StringEndNewline,
    /// End of the subject or of an internal line.
    LineEnd,
    /// The offset where the current scan started (`\G`).
    MatchStart,
    /// A word/non-word transition.
    WordBoundary,
    /// The negation of [`NodeKind::WordBoundary`].
    NotWordBoundary,
}

/// A node of the program graph: an operation plus its sequencing edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Node {
    pub kind: NodeKind,
    /// The continuation. `None` behaves like [`NodeKind::Accept`].
    pub next: Option<NodeId>,
}

/// A compiled program: the node arena plus the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Program {
    nodes: Vec<Node>,
    start: NodeId,
}

impl Program {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), start: NodeId(0) }
    }

    /// Appends a new node with no continuation and returns its id.
    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, next: None });
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn set_next(&mut self, id: NodeId, next: NodeId) {
        self.node_mut(id).next = Some(next);
    }

    pub fn set_start(&mut self, start: NodeId) {
        self.start = start;
    }

    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates all node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.len() as u32).map(NodeId)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:05}", self.0)
    }
}

impl Display for Program {
    /// Renders the program one line per node, in arena order. Used by the
    /// compiler tests and by [`crate::Pattern::dump_program`].
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "start {}", self.start)?;
        for id in self.ids() {
            let node = self.node(id);
            write!(f, "{}: ", id)?;
            match &node.kind {
                NodeKind::Accept => write!(f, "ACCEPT")?,
                NodeKind::Literal(chars) => {
                    write!(f, "LIT {:?}", chars.iter().collect::<String>())?
                }
                NodeKind::LiteralCaseless(chars) => write!(
                    f,
                    "LIT_CI {:?}",
                    chars.iter().collect::<String>()
                )?,
                NodeKind::Any => write!(f, "ANY")?,
                NodeKind::Class(set) => write!(f, "CLASS {}", set)?,
                NodeKind::ClassCaseless(set) => {
                    write!(f, "CLASS_CI {}", set)?
                }
                NodeKind::ClassNegated(set) => {
                    write!(f, "NCLASS {}", set)?
                }
                NodeKind::ClassNegatedCaseless(set) => {
                    write!(f, "NCLASS_CI {}", set)?
                }
                NodeKind::Category { category, negated } => write!(
                    f,
                    "CATEGORY {}{}",
                    if *negated { "^" } else { "" },
                    category.letter()
                )?,
                NodeKind::GroupBegin(g) => write!(f, "GROUP_BEGIN {}", g)?,
                NodeKind::GroupEnd(g) => write!(f, "GROUP_END {}", g)?,
                NodeKind::Backref(g) => write!(f, "BACKREF {}", g)?,
                NodeKind::BackrefCaseless(g) => {
                    write!(f, "BACKREF_CI {}", g)?
                }
                NodeKind::LoopInit(i) => write!(f, "LOOP_INIT {}", i)?,
                NodeKind::Loop(data) => {
                    let policy = match data.policy {
                        LoopPolicy::Greedy => "GREEDY",
                        LoopPolicy::Lazy => "LAZY",
                        LoopPolicy::Possessive => "POSSESSIVE",
                    };
                    write!(f, "LOOP_{} {} {{{},", policy, data.index, data.min)?;
                    if data.max == UNBOUNDED {
                        write!(f, "}} body {}", data.body)?;
                    } else {
                        write!(f, "{}}} body {}", data.max, data.body)?;
                    }
                    if data.unique.is_some() {
                        write!(f, " unique")?;
                    }
                }
                NodeKind::Alt { branches, first_sets } => {
                    write!(f, "ALT [")?;
                    for (i, b) in branches.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", b)?;
                    }
                    write!(f, "]")?;
                    if first_sets.is_some() {
                        write!(f, " unique")?;
                    }
                }
                NodeKind::Join => write!(f, "JOIN")?,
                NodeKind::Lookahead { negative, body } => write!(
                    f,
                    "LOOKAHEAD{} body {}",
                    if *negative { "_NEG" } else { "" },
                    body
                )?,
                NodeKind::Lookbehind { negative, body, length } => write!(
                    f,
                    "LOOKBEHIND{} len {} body {}",
                    if *negative { "_NEG" } else { "" },
                    length,
                    body
                )?,
                NodeKind::Conditional { group, yes, no } => {
                    write!(f, "COND {} yes {}", group, yes)?;
                    if let Some(no) = no {
                        write!(f, " no {}", no)?;
                    }
                }
                NodeKind::StringBegin => write!(f, "STR_BEGIN")?,
                NodeKind::LineBegin => write!(f, "LINE_BEGIN")?,
                NodeKind::StringEnd => write!(f, "STR_END")?,
                NodeKind::StringEndNewline => write!(f, "STR_END_NL")?,
                NodeKind::LineEnd => write!(f, "LINE_END")?,
                NodeKind::MatchStart => write!(f, "MATCH_START")?,
                NodeKind::WordBoundary => write!(f, "WORD_BOUNDARY")?,
                NodeKind::NotWordBoundary => write!(f, "NOT_WORD_BOUNDARY")?,
            }
            match node.next {
                Some(next) => writeln!(f, ", next {}", next)?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}
