/*!
The recursive-descent pattern parser.

The parser consumes pattern text and produces the raw program graph that
the optimizer passes then refine. Precedence, lowest to highest:
alternation, concatenation, postfix quantifier, atom. The parser is also
responsible for group numbering (dense, 1-based, in declaration order),
the name tables of named groups, the dense numbering of loop constructs,
inline `(?imsx)` flag state, and all syntax-error detection.

Loop bodies are left unlinked here: the tails of every loop body are
recorded in [`Parsed::loop_tails`] and wired back to their loop node by
the optimizer's loop-linking pass, which is what finally makes the graph
cyclic.
*/

use rustc_hash::FxHashMap;

use crate::charclass::ClassSet;
use crate::compiler::errors::PatternSyntaxError;
use crate::flags::Flags;
use crate::program::{
    LoopData, LoopPolicy, NodeId, NodeKind, Program, UNBOUNDED,
};
use crate::unicode::Category;

/// The output of a successful parse.
pub(crate) struct Parsed {
    pub program: Program,
    pub group_count: u32,
    pub loop_count: u32,
    /// Reverse lookup: declared name to group index.
    pub group_names: FxHashMap<String, u32>,
    /// Forward lookup: group index to declared name. Entry 0 is unused.
    pub names_by_index: Vec<Option<String>>,
    /// For every loop node, the tails of its body chain. Consumed by the
    /// loop-linking pass.
    pub loop_tails: Vec<(NodeId, Vec<NodeId>)>,
}

/// A parsed subgraph: its entry node plus the nodes whose `next` edge must
/// be patched to whatever follows it.
struct Fragment {
    head: NodeId,
    tails: Vec<NodeId>,
}

impl Fragment {
    fn single(id: NodeId) -> Self {
        Self { head: id, tails: vec![id] }
    }
}

/// The result of parsing one escape sequence outside a class.
enum Escaped {
    /// One or more literal characters.
    Str(Vec<char>),
    /// A single-node atom.
    Kind(NodeKind),
}

/// One member of a bracket class.
enum ClassItem {
    /// A single character, usable as a range endpoint.
    Char(char),
    /// A set of characters, like `\d` or `[:alpha:]`.
    Set(ClassSet),
    /// The complement of a set of characters, like `\D`.
    NegSet(ClassSet),
}

pub(crate) struct Parser {
    chars: Vec<char>,
    pos: usize,
    /// The currently effective flags; inline `(?imsx)` toggles mutate this
    /// and group boundaries save/restore it.
    flags: Flags,
    program: Program,
    group_count: u32,
    loop_count: u32,
    group_names: FxHashMap<String, u32>,
    names_by_index: Vec<Option<String>>,
    loop_tails: Vec<(NodeId, Vec<NodeId>)>,
    /// Conditional group references, validated once the total group count
    /// is known, so that forward references work.
    cond_refs: Vec<(u32, usize)>,
}

impl Parser {
    pub fn new(pattern: &str, flags: Flags) -> Self {
        Self {
            chars: pattern.chars().collect(),
            pos: 0,
            flags,
            program: Program::new(),
            group_count: 0,
            loop_count: 0,
            group_names: FxHashMap::default(),
            names_by_index: vec![None],
            loop_tails: Vec::new(),
            cond_refs: Vec::new(),
        }
    }

    /// Parses the whole pattern into a raw program graph.
    pub fn parse(mut self) -> Result<Parsed, PatternSyntaxError> {
        let frag = self.parse_alternation()?;
        if let Some(')') = self.peek() {
            return Err(PatternSyntaxError::UnmatchedParenthesis {
                pos: self.pos,
            });
        }
        let accept = self.program.push(NodeKind::Accept);
        match frag {
            Some(f) => {
                self.link(&f.tails, accept);
                self.program.set_start(f.head);
            }
            None => self.program.set_start(accept),
        }
        for &(group, pos) in self.cond_refs.iter() {
            if group == 0 || group > self.group_count {
                return Err(PatternSyntaxError::InvalidGroupReference {
                    group,
                    pos,
                });
            }
        }
        Ok(Parsed {
            program: self.program,
            group_count: self.group_count,
            loop_count: self.loop_count,
            group_names: self.group_names,
            names_by_index: self.names_by_index,
            loop_tails: self.loop_tails,
        })
    }

    // Cursor helpers.

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn caseless(&self) -> bool {
        self.flags.contains(Flags::CASELESS)
    }

    /// In extended mode, skips whitespace and `#`-comments between pattern
    /// elements. Whitespace inside classes is never skipped.
    fn skip_ignorable(&mut self) {
        if !self.flags.contains(Flags::EXTENDED) {
            return;
        }
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.pos += 1;
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    // Graph construction helpers.

    fn link(&mut self, tails: &[NodeId], to: NodeId) {
        for &tail in tails {
            self.program.set_next(tail, to);
        }
    }

    fn append(&mut self, frag: &mut Option<Fragment>, atom: Fragment) {
        match frag {
            Some(f) => {
                self.link(&f.tails, atom.head);
                f.tails = atom.tails;
            }
            None => *frag = Some(atom),
        }
    }

    fn flush_literal(
        &mut self,
        frag: &mut Option<Fragment>,
        lit: &mut Vec<char>,
    ) {
        if lit.is_empty() {
            return;
        }
        let chars: Box<[char]> = std::mem::take(lit).into_boxed_slice();
        let kind = if self.caseless() {
            NodeKind::LiteralCaseless(chars)
        } else {
            NodeKind::Literal(chars)
        };
        let id = self.program.push(kind);
        self.append(frag, Fragment::single(id));
    }

    fn class_kind(&self, set: ClassSet, negated: bool) -> NodeKind {
        match (negated, self.caseless()) {
            (false, false) => NodeKind::Class(set),
            (false, true) => NodeKind::ClassCaseless(set),
            (true, false) => NodeKind::ClassNegated(set),
            (true, true) => NodeKind::ClassNegatedCaseless(set),
        }
    }

    fn backref_kind(&self, group: u32) -> NodeKind {
        if self.caseless() {
            NodeKind::BackrefCaseless(group)
        } else {
            NodeKind::Backref(group)
        }
    }

    // Grammar productions.

    /// alternation := branch (`|` branch)*
    fn parse_alternation(
        &mut self,
    ) -> Result<Option<Fragment>, PatternSyntaxError> {
        let mut branches = vec![self.parse_branch()?];
        while self.eat('|') {
            branches.push(self.parse_branch()?);
        }
        if branches.len() == 1 {
            return Ok(branches.pop().and_then(|b| b));
        }
        let join = self.program.push(NodeKind::Join);
        let mut heads = Vec::with_capacity(branches.len());
        for branch in branches {
            match branch {
                Some(f) => {
                    self.link(&f.tails, join);
                    heads.push(f.head);
                }
                None => heads.push(join),
            }
        }
        let alt = self.program.push(NodeKind::Alt {
            branches: heads.into_boxed_slice(),
            first_sets: None,
        });
        // The matcher reaches the continuation through the branches, but
        // the analysis passes find the join through this edge.
        self.program.set_next(alt, join);
        Ok(Some(Fragment { head: alt, tails: vec![join] }))
    }

    /// branch := piece*
    fn parse_branch(
        &mut self,
    ) -> Result<Option<Fragment>, PatternSyntaxError> {
        let mut frag: Option<Fragment> = None;
        let mut lit: Vec<char> = Vec::new();
        loop {
            self.skip_ignorable();
            let c = match self.peek() {
                None | Some('|') | Some(')') => break,
                Some(c) => c,
            };
            self.parse_piece(c, &mut frag, &mut lit)?;
        }
        self.flush_literal(&mut frag, &mut lit);
        Ok(frag)
    }

    /// piece := atom quantifier?
    fn parse_piece(
        &mut self,
        c: char,
        frag: &mut Option<Fragment>,
        lit: &mut Vec<char>,
    ) -> Result<(), PatternSyntaxError> {
        match c {
            '*' | '+' | '?' => {
                Err(PatternSyntaxError::NothingToRepeat { ch: c, pos: self.pos })
            }
            '{' => {
                let save = self.pos;
                self.pos += 1;
                if self.parse_bounds(save)?.is_some() {
                    return Err(PatternSyntaxError::NothingToRepeat {
                        ch: '{',
                        pos: save,
                    });
                }
                // Not a quantifier, so the brace is an ordinary literal.
                self.pos = save + 1;
                self.literal_char('{', frag, lit)
            }
            '(' => {
                self.flush_literal(frag, lit);
                let atom = self.parse_group()?;
                self.finish_atom(atom, frag)
            }
            '[' => {
                self.flush_literal(frag, lit);
                let atom = self.parse_class()?;
                self.finish_atom(Some(atom), frag)
            }
            '.' => {
                self.flush_literal(frag, lit);
                self.pos += 1;
                let kind = if self.flags.contains(Flags::DOT_ALL) {
                    NodeKind::Any
                } else {
                    let mut newline = ClassSet::new();
                    newline.add_char('\n');
                    NodeKind::ClassNegated(newline)
                };
                let id = self.program.push(kind);
                self.finish_atom(Some(Fragment::single(id)), frag)
            }
            '^' => {
                self.flush_literal(frag, lit);
                self.pos += 1;
                let kind = if self.flags.contains(Flags::MULTILINE) {
                    NodeKind::LineBegin
                } else {
                    NodeKind::StringBegin
                };
                let id = self.program.push(kind);
                self.finish_atom(Some(Fragment::single(id)), frag)
            }
            '$' => {
                self.flush_literal(frag, lit);
                self.pos += 1;
                let kind = if self.flags.contains(Flags::MULTILINE) {
                    NodeKind::LineEnd
                } else if self.flags.contains(Flags::END_ONLY) {
                    NodeKind::StringEnd
                } else {
                    NodeKind::StringEndNewline
                };
                let id = self.program.push(kind);
                self.finish_atom(Some(Fragment::single(id)), frag)
            }
            '\\' => {
                self.pos += 1;
                match self.parse_escape()? {
                    Escaped::Str(mut chars) => {
                        // Only the last character is subject to a
                        // quantifier that may follow the escape.
                        let last = match chars.pop() {
                            Some(last) => last,
                            None => return Ok(()),
                        };
                        if !chars.is_empty() {
                            lit.extend(chars);
                        }
                        self.literal_char(last, frag, lit)
                    }
                    Escaped::Kind(kind) => {
                        self.flush_literal(frag, lit);
                        let id = self.program.push(kind);
                        self.finish_atom(Some(Fragment::single(id)), frag)
                    }
                }
            }
            _ => {
                self.pos += 1;
                self.literal_char(c, frag, lit)
            }
        }
    }

    /// Appends a literal character, either into the pending literal buffer
    /// or, when a quantifier follows, as its own quantified node.
    fn literal_char(
        &mut self,
        c: char,
        frag: &mut Option<Fragment>,
        lit: &mut Vec<char>,
    ) -> Result<(), PatternSyntaxError> {
        match self.try_parse_quantifier()? {
            Some(quantifier) => {
                self.flush_literal(frag, lit);
                let chars: Box<[char]> = vec![c].into_boxed_slice();
                let kind = if self.caseless() {
                    NodeKind::LiteralCaseless(chars)
                } else {
                    NodeKind::Literal(chars)
                };
                let id = self.program.push(kind);
                let looped =
                    self.wrap_quantifier(Fragment::single(id), quantifier);
                self.append(frag, looped);
                Ok(())
            }
            None => {
                lit.push(c);
                Ok(())
            }
        }
    }

    /// Applies an optional quantifier to a freshly parsed atom and appends
    /// the result to the branch being built.
    fn finish_atom(
        &mut self,
        atom: Option<Fragment>,
        frag: &mut Option<Fragment>,
    ) -> Result<(), PatternSyntaxError> {
        match self.try_parse_quantifier()? {
            Some(quantifier) => {
                let atom = match atom {
                    Some(atom) => atom,
                    // Quantifying an empty group repeats a no-op.
                    None => {
                        Fragment::single(self.program.push(NodeKind::Join))
                    }
                };
                let looped = self.wrap_quantifier(atom, quantifier);
                self.append(frag, looped);
            }
            None => {
                if let Some(atom) = atom {
                    self.append(frag, atom);
                }
            }
        }
        Ok(())
    }

    /// Wraps an atom in a loop-init marker plus a loop node. The body's
    /// tails are recorded for the loop-linking pass instead of being wired
    /// here.
    fn wrap_quantifier(
        &mut self,
        atom: Fragment,
        (min, max, policy): (u32, u32, LoopPolicy),
    ) -> Fragment {
        if min == 1 && max == 1 {
            return atom;
        }
        self.loop_count += 1;
        let index = self.loop_count;
        let init = self.program.push(NodeKind::LoopInit(index));
        let lp = self.program.push(NodeKind::Loop(Box::new(LoopData {
            policy,
            min,
            max,
            index,
            body: atom.head,
            unique: None,
            simple: false,
        })));
        self.program.set_next(init, lp);
        self.loop_tails.push((lp, atom.tails));
        Fragment { head: init, tails: vec![lp] }
    }

    /// Parses a quantifier if one follows the cursor: `*`, `+`, `?`,
    /// `{n}`, `{n,}`, `{n,m}` or `{,m}`, each with an optional trailing
    /// `?` (lazy) or `+` (possessive). Under the ungreedy flag the
    /// unmarked form is lazy and a trailing `?` restores greediness.
    fn try_parse_quantifier(
        &mut self,
    ) -> Result<Option<(u32, u32, LoopPolicy)>, PatternSyntaxError> {
        self.skip_ignorable();
        let (min, max) = match self.peek() {
            Some('*') => {
                self.pos += 1;
                (0, UNBOUNDED)
            }
            Some('+') => {
                self.pos += 1;
                (1, UNBOUNDED)
            }
            Some('?') => {
                self.pos += 1;
                (0, 1)
            }
            Some('{') => {
                let save = self.pos;
                self.pos += 1;
                match self.parse_bounds(save)? {
                    Some(bounds) => bounds,
                    None => {
                        self.pos = save;
                        return Ok(None);
                    }
                }
            }
            _ => return Ok(None),
        };
        let ungreedy = self.flags.contains(Flags::UNGREEDY);
        let policy = if self.eat('?') {
            if ungreedy {
                LoopPolicy::Greedy
            } else {
                LoopPolicy::Lazy
            }
        } else if self.eat('+') {
            LoopPolicy::Possessive
        } else if ungreedy {
            LoopPolicy::Lazy
        } else {
            LoopPolicy::Greedy
        };
        Ok(Some((min, max, policy)))
    }

    /// Parses the `n`, `n,`, `n,m` or `,m` part of a brace quantifier,
    /// the opening brace already consumed. Returns `None` when the braces
    /// do not form a quantifier, in which case the caller rewinds and the
    /// brace becomes a literal.
    fn parse_bounds(
        &mut self,
        brace_pos: usize,
    ) -> Result<Option<(u32, u32)>, PatternSyntaxError> {
        let min = self.take_number();
        if self.eat('}') {
            return Ok(min.map(|n| (n, n)));
        }
        if !self.eat(',') {
            return Ok(None);
        }
        let max = self.take_number();
        if !self.eat('}') {
            return Ok(None);
        }
        match (min, max) {
            (Some(min), Some(max)) => {
                if min > max {
                    Err(PatternSyntaxError::QuantifierOutOfOrder {
                        pos: brace_pos,
                    })
                } else {
                    Ok(Some((min, max)))
                }
            }
            (Some(min), None) => Ok(Some((min, UNBOUNDED))),
            (None, Some(max)) => Ok(Some((0, max))),
            (None, None) => Ok(None),
        }
    }

    /// Consumes a run of decimal digits, saturating on overflow.
    fn take_number(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(c) = self.peek() {
            let digit = match c.to_digit(10) {
                Some(digit) => digit,
                None => break,
            };
            self.pos += 1;
            value = Some(
                value
                    .unwrap_or(0)
                    .saturating_mul(10)
                    .saturating_add(digit)
                    .min(UNBOUNDED - 1),
            );
        }
        value
    }

    // Groups.

    /// Parses everything that starts with `(`.
    fn parse_group(
        &mut self,
    ) -> Result<Option<Fragment>, PatternSyntaxError> {
        let open_pos = self.pos;
        self.pos += 1; // consume `(`
        if !self.eat('?') {
            return self.parse_capture_group(open_pos, None).map(Some);
        }
        match self.peek() {
            Some(':') => {
                self.pos += 1;
                self.parse_group_body(open_pos)
            }
            Some('=') => {
                self.pos += 1;
                self.parse_lookahead(open_pos, false).map(Some)
            }
            Some('!') => {
                self.pos += 1;
                self.parse_lookahead(open_pos, true).map(Some)
            }
            Some('<') => {
                self.pos += 1;
                match self.advance() {
                    Some('=') => {
                        self.parse_lookbehind(open_pos, false).map(Some)
                    }
                    Some('!') => {
                        self.parse_lookbehind(open_pos, true).map(Some)
                    }
                    _ => Err(PatternSyntaxError::MalformedGroup {
                        pos: open_pos,
                    }),
                }
            }
            Some('P') => {
                self.pos += 1;
                match self.advance() {
                    Some('<') => {
                        let name = self.parse_group_name(open_pos, '>')?;
                        self.parse_capture_group(open_pos, Some(name))
                            .map(Some)
                    }
                    Some('=') => self.parse_named_backref(open_pos).map(Some),
                    _ => Err(PatternSyntaxError::MalformedGroup {
                        pos: open_pos,
                    }),
                }
            }
            Some('(') => self.parse_conditional(open_pos).map(Some),
            Some('i' | 'm' | 's' | 'x' | '-') => {
                self.parse_inline_flags(open_pos)
            }
            _ => Err(PatternSyntaxError::MalformedGroup { pos: open_pos }),
        }
    }

    /// Parses a group body up to the closing parenthesis, scoping inline
    /// flag toggles to the group.
    fn parse_group_body(
        &mut self,
        open_pos: usize,
    ) -> Result<Option<Fragment>, PatternSyntaxError> {
        let saved_flags = self.flags;
        let frag = self.parse_alternation()?;
        if !self.eat(')') {
            return Err(PatternSyntaxError::UnterminatedGroup {
                pos: open_pos,
            });
        }
        self.flags = saved_flags;
        Ok(frag)
    }

    fn parse_capture_group(
        &mut self,
        open_pos: usize,
        name: Option<String>,
    ) -> Result<Fragment, PatternSyntaxError> {
        self.group_count += 1;
        let index = self.group_count;
        if let Some(name) = name {
            if self.group_names.contains_key(&name) {
                return Err(PatternSyntaxError::DuplicateGroupName {
                    name,
                    pos: open_pos,
                });
            }
            self.group_names.insert(name.clone(), index);
            self.names_by_index.push(Some(name));
        } else {
            self.names_by_index.push(None);
        }
        let begin = self.program.push(NodeKind::GroupBegin(index));
        let body = self.parse_group_body(open_pos)?;
        let end = self.program.push(NodeKind::GroupEnd(index));
        match body {
            Some(f) => {
                self.program.set_next(begin, f.head);
                self.link(&f.tails, end);
            }
            None => self.program.set_next(begin, end),
        }
        Ok(Fragment { head: begin, tails: vec![end] })
    }

    /// Parses a group name terminated by `terminator`.
    fn parse_group_name(
        &mut self,
        open_pos: usize,
        terminator: char,
    ) -> Result<String, PatternSyntaxError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == terminator {
                break;
            }
            let valid = if name.is_empty() {
                c.is_alphabetic() || c == '_'
            } else {
                c.is_alphanumeric() || c == '_'
            };
            if !valid {
                return Err(PatternSyntaxError::MalformedGroup {
                    pos: open_pos,
                });
            }
            name.push(c);
            self.pos += 1;
        }
        if name.is_empty() || !self.eat(terminator) {
            return Err(PatternSyntaxError::MalformedGroup { pos: open_pos });
        }
        Ok(name)
    }

    /// Parses a `(?P=name)` backreference, the `=` already consumed.
    fn parse_named_backref(
        &mut self,
        open_pos: usize,
    ) -> Result<Fragment, PatternSyntaxError> {
        let name = self.parse_group_name(open_pos, ')')?;
        let index = match self.group_names.get(&name) {
            Some(&index) => index,
            None => {
                return Err(PatternSyntaxError::UnknownGroupName {
                    name,
                    pos: open_pos,
                })
            }
        };
        let kind = self.backref_kind(index);
        let id = self.program.push(kind);
        Ok(Fragment::single(id))
    }

    fn parse_lookahead(
        &mut self,
        open_pos: usize,
        negative: bool,
    ) -> Result<Fragment, PatternSyntaxError> {
        let body = self.parse_lookaround_body(open_pos)?;
        let id =
            self.program.push(NodeKind::Lookahead { negative, body });
        Ok(Fragment::single(id))
    }

    fn parse_lookbehind(
        &mut self,
        open_pos: usize,
        negative: bool,
    ) -> Result<Fragment, PatternSyntaxError> {
        let body = self.parse_lookaround_body(open_pos)?;
        let length = match crate::compiler::optimizer::exact_length(
            &self.program,
            body,
        ) {
            Some(length) => length,
            None => {
                return Err(PatternSyntaxError::VariableLookbehind {
                    pos: open_pos,
                })
            }
        };
        let id = self
            .program
            .push(NodeKind::Lookbehind { negative, body, length });
        Ok(Fragment::single(id))
    }

    /// Parses a lookaround body and terminates it with its own accept
    /// node, making it a self-contained subprogram.
    fn parse_lookaround_body(
        &mut self,
        open_pos: usize,
    ) -> Result<NodeId, PatternSyntaxError> {
        let body = self.parse_group_body(open_pos)?;
        let accept = self.program.push(NodeKind::Accept);
        Ok(match body {
            Some(f) => {
                self.link(&f.tails, accept);
                f.head
            }
            None => accept,
        })
    }

    /// Parses a `(?(n)yes|no)` conditional, cursor at the inner `(`.
    fn parse_conditional(
        &mut self,
        open_pos: usize,
    ) -> Result<Fragment, PatternSyntaxError> {
        self.pos += 1; // consume the inner `(`
        let num_pos = self.pos;
        let group = match self.take_number() {
            Some(group) => group,
            None => {
                return Err(PatternSyntaxError::MalformedGroup {
                    pos: open_pos,
                })
            }
        };
        if !self.eat(')') {
            return Err(PatternSyntaxError::MalformedGroup { pos: open_pos });
        }
        self.cond_refs.push((group, num_pos));
        let saved_flags = self.flags;
        let yes = self.parse_branch()?;
        let no = if self.eat('|') { Some(self.parse_branch()?) } else { None };
        if self.peek() == Some('|') {
            return Err(PatternSyntaxError::MalformedGroup { pos: open_pos });
        }
        if !self.eat(')') {
            return Err(PatternSyntaxError::UnterminatedGroup {
                pos: open_pos,
            });
        }
        self.flags = saved_flags;
        let join = self.program.push(NodeKind::Join);
        let yes = match yes {
            Some(f) => {
                self.link(&f.tails, join);
                f.head
            }
            None => join,
        };
        let no = no.map(|branch| match branch {
            Some(f) => {
                self.link(&f.tails, join);
                f.head
            }
            None => join,
        });
        let cond =
            self.program.push(NodeKind::Conditional { group, yes, no });
        self.program.set_next(cond, join);
        Ok(Fragment { head: cond, tails: vec![join] })
    }

    /// Parses `(?imsx)` and `(?imsx:...)` flag groups, with `-` undoing
    /// the letters that follow it. A bare toggle persists until the end of
    /// the enclosing group; the `:` form scopes to its own body.
    fn parse_inline_flags(
        &mut self,
        open_pos: usize,
    ) -> Result<Option<Fragment>, PatternSyntaxError> {
        let saved_flags = self.flags;
        let mut unset = false;
        loop {
            match self.peek() {
                Some('-') => {
                    self.pos += 1;
                    unset = true;
                }
                Some(c @ ('i' | 'm' | 's' | 'x')) => {
                    self.pos += 1;
                    let flag = match c {
                        'i' => Flags::CASELESS,
                        'm' => Flags::MULTILINE,
                        's' => Flags::DOT_ALL,
                        _ => Flags::EXTENDED,
                    };
                    if unset {
                        self.flags.remove(flag);
                    } else {
                        self.flags.insert(flag);
                    }
                }
                Some(':') => {
                    self.pos += 1;
                    let frag = self.parse_alternation()?;
                    if !self.eat(')') {
                        return Err(PatternSyntaxError::UnterminatedGroup {
                            pos: open_pos,
                        });
                    }
                    self.flags = saved_flags;
                    return Ok(frag);
                }
                Some(')') => {
                    self.pos += 1;
                    return Ok(None);
                }
                Some(c) => {
                    return Err(PatternSyntaxError::UnknownInlineFlag {
                        ch: c,
                        pos: self.pos,
                    })
                }
                None => {
                    return Err(PatternSyntaxError::UnterminatedGroup {
                        pos: open_pos,
                    })
                }
            }
        }
    }

    // Classes.

    /// Parses a `[...]` class into a single class node.
    fn parse_class(&mut self) -> Result<Fragment, PatternSyntaxError> {
        let open_pos = self.pos;
        self.pos += 1; // consume `[`
        let negated = self.eat('^');
        let mut set = ClassSet::new();
        let mut first = true;
        loop {
            match self.peek() {
                None => {
                    return Err(PatternSyntaxError::UnterminatedClass {
                        pos: open_pos,
                    })
                }
                Some(']') if !first => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            first = false;
            if self.peek() == Some('[') && self.peek_at(1) == Some(':') {
                self.parse_posix_class(&mut set)?;
                continue;
            }
            let item_pos = self.pos;
            match self.parse_class_item(open_pos)? {
                ClassItem::Char(lo) => {
                    if self.peek() == Some('-')
                        && !matches!(self.peek_at(1), None | Some(']'))
                    {
                        self.pos += 1; // consume `-`
                        match self.parse_class_item(open_pos)? {
                            ClassItem::Char(hi) => {
                                if (hi as u32) < (lo as u32) {
                                    return Err(
                                        PatternSyntaxError::InvalidClassRange {
                                            pos: item_pos,
                                        },
                                    );
                                }
                                set.set_range(lo as u32, hi as u32);
                            }
                            _ => {
                                return Err(
                                    PatternSyntaxError::InvalidClassRange {
                                        pos: item_pos,
                                    },
                                )
                            }
                        }
                    } else {
                        set.add_char(lo);
                    }
                }
                ClassItem::Set(s) => set.union(&s),
                ClassItem::NegSet(s) => set.union_negated(&s),
            }
        }
        let id = self.program.push(self.class_kind(set, negated));
        Ok(Fragment::single(id))
    }

    /// Parses one class member: a plain character or an escape.
    fn parse_class_item(
        &mut self,
        class_pos: usize,
    ) -> Result<ClassItem, PatternSyntaxError> {
        match self.advance() {
            Some('\\') => self.parse_class_escape(),
            Some(c) => Ok(ClassItem::Char(c)),
            None => Err(PatternSyntaxError::UnterminatedClass {
                pos: class_pos,
            }),
        }
    }

    /// Parses an escape inside a class, the backslash already consumed.
    /// Digit escapes are always octal here: backreferences cannot occur
    /// inside a class.
    fn parse_class_escape(
        &mut self,
    ) -> Result<ClassItem, PatternSyntaxError> {
        let esc_pos = self.pos;
        match self.advance() {
            Some('d') => Ok(ClassItem::Set(digit_set())),
            Some('D') => Ok(ClassItem::NegSet(digit_set())),
            Some('s') => Ok(ClassItem::Set(space_set())),
            Some('S') => Ok(ClassItem::NegSet(space_set())),
            Some('w') => Ok(ClassItem::Set(word_set())),
            Some('W') => Ok(ClassItem::NegSet(word_set())),
            Some(p @ ('p' | 'P')) => {
                let (category, negated) =
                    self.parse_category(p == 'P', esc_pos)?;
                let mut set = ClassSet::new();
                match category.ranges() {
                    Some(table) => {
                        for &(lo, hi) in table {
                            set.set_range(lo, hi);
                        }
                        if negated {
                            Ok(ClassItem::NegSet(set))
                        } else {
                            Ok(ClassItem::Set(set))
                        }
                    }
                    // C is the complement of the other six categories.
                    None => {
                        for letter in ['L', 'M', 'N', 'P', 'S', 'Z'] {
                            if let Some(table) = Category::from_letter(letter)
                                .and_then(Category::ranges)
                            {
                                for &(lo, hi) in table {
                                    set.set_range(lo, hi);
                                }
                            }
                        }
                        if negated {
                            Ok(ClassItem::Set(set))
                        } else {
                            Ok(ClassItem::NegSet(set))
                        }
                    }
                }
            }
            Some('n') => Ok(ClassItem::Char('\n')),
            Some('r') => Ok(ClassItem::Char('\r')),
            Some('t') => Ok(ClassItem::Char('\t')),
            Some('f') => Ok(ClassItem::Char('\x0C')),
            Some('v') => Ok(ClassItem::Char('\x0B')),
            Some('a') => Ok(ClassItem::Char('\x07')),
            Some('e') => Ok(ClassItem::Char('\x1B')),
            // Inside a class, `\b` is a backspace.
            Some('b') => Ok(ClassItem::Char('\x08')),
            Some('x') => self.parse_hex_escape(esc_pos).map(ClassItem::Char),
            Some('0'..='7') => {
                self.pos -= 1;
                Ok(ClassItem::Char(self.take_octal()))
            }
            Some(c @ ('8' | '9')) => Ok(ClassItem::Char(c)),
            Some(c) if c.is_alphanumeric() => {
                if self.flags.contains(Flags::STRICT) {
                    Err(PatternSyntaxError::UnknownEscape {
                        ch: c,
                        pos: esc_pos,
                    })
                } else {
                    Ok(ClassItem::Char(c))
                }
            }
            Some(c) => Ok(ClassItem::Char(c)),
            None => Err(PatternSyntaxError::TrailingBackslash),
        }
    }

    /// Parses a `[:name:]` POSIX class and unions it into `set`.
    fn parse_posix_class(
        &mut self,
        set: &mut ClassSet,
    ) -> Result<(), PatternSyntaxError> {
        let start_pos = self.pos;
        self.pos += 2; // consume `[:`
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_lowercase() {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        if !(self.eat(':') && self.eat(']')) {
            return Err(PatternSyntaxError::UnknownPosixClass {
                name,
                pos: start_pos,
            });
        }
        match name.as_str() {
            "alpha" => {
                set.set_range('A' as u32, 'Z' as u32);
                set.set_range('a' as u32, 'z' as u32);
            }
            "digit" => set.set_range('0' as u32, '9' as u32),
            "alnum" => {
                set.set_range('0' as u32, '9' as u32);
                set.set_range('A' as u32, 'Z' as u32);
                set.set_range('a' as u32, 'z' as u32);
            }
            "upper" => set.set_range('A' as u32, 'Z' as u32),
            "lower" => set.set_range('a' as u32, 'z' as u32),
            "space" => {
                for c in [' ', '\t', '\n', '\r', '\x0B', '\x0C'] {
                    set.add_char(c);
                }
            }
            "blank" => {
                set.add_char(' ');
                set.add_char('\t');
            }
            "punct" => {
                set.set_range(0x21, 0x2F);
                set.set_range(0x3A, 0x40);
                set.set_range(0x5B, 0x60);
                set.set_range(0x7B, 0x7E);
            }
            "graph" => set.set_range(0x21, 0x7E),
            "print" => set.set_range(0x20, 0x7E),
            "cntrl" => {
                set.set_range(0x00, 0x1F);
                set.set(0x7F);
            }
            "xdigit" => {
                set.set_range('0' as u32, '9' as u32);
                set.set_range('A' as u32, 'F' as u32);
                set.set_range('a' as u32, 'f' as u32);
            }
            "word" => {
                set.set_range('0' as u32, '9' as u32);
                set.set_range('A' as u32, 'Z' as u32);
                set.set_range('a' as u32, 'z' as u32);
                set.add_char('_');
            }
            "ascii" => set.set_range(0x00, 0x7F),
            _ => {
                return Err(PatternSyntaxError::UnknownPosixClass {
                    name,
                    pos: start_pos,
                })
            }
        }
        Ok(())
    }

    // Escapes outside classes.

    /// Parses an escape sequence, the backslash already consumed.
    fn parse_escape(&mut self) -> Result<Escaped, PatternSyntaxError> {
        let esc_pos = self.pos;
        match self.advance() {
            Some('1'..='9') => {
                self.pos -= 1;
                Ok(self.parse_digit_escape())
            }
            Some('0') => {
                self.pos -= 1;
                Ok(Escaped::Str(vec![self.take_octal()]))
            }
            Some('x') => {
                self.parse_hex_escape(esc_pos).map(|c| Escaped::Str(vec![c]))
            }
            Some(p @ ('p' | 'P')) => {
                let (category, negated) =
                    self.parse_category(p == 'P', esc_pos)?;
                Ok(Escaped::Kind(NodeKind::Category { category, negated }))
            }
            Some('d') => {
                Ok(Escaped::Kind(self.class_kind(digit_set(), false)))
            }
            Some('D') => {
                Ok(Escaped::Kind(self.class_kind(digit_set(), true)))
            }
            Some('s') => {
                Ok(Escaped::Kind(self.class_kind(space_set(), false)))
            }
            Some('S') => {
                Ok(Escaped::Kind(self.class_kind(space_set(), true)))
            }
            Some('w') => {
                Ok(Escaped::Kind(self.class_kind(word_set(), false)))
            }
            Some('W') => {
                Ok(Escaped::Kind(self.class_kind(word_set(), true)))
            }
            Some('b') => Ok(Escaped::Kind(NodeKind::WordBoundary)),
            Some('B') => Ok(Escaped::Kind(NodeKind::NotWordBoundary)),
            Some('A') => Ok(Escaped::Kind(NodeKind::StringBegin)),
            Some('z') => Ok(Escaped::Kind(NodeKind::StringEnd)),
            Some('Z') => Ok(Escaped::Kind(NodeKind::StringEndNewline)),
            Some('G') => Ok(Escaped::Kind(NodeKind::MatchStart)),
            Some('n') => Ok(Escaped::Str(vec!['\n'])),
            Some('r') => Ok(Escaped::Str(vec!['\r'])),
            Some('t') => Ok(Escaped::Str(vec!['\t'])),
            Some('f') => Ok(Escaped::Str(vec!['\x0C'])),
            Some('v') => Ok(Escaped::Str(vec!['\x0B'])),
            Some('a') => Ok(Escaped::Str(vec!['\x07'])),
            Some('e') => Ok(Escaped::Str(vec!['\x1B'])),
            Some(c) if c.is_alphanumeric() => {
                if self.flags.contains(Flags::STRICT) {
                    Err(PatternSyntaxError::UnknownEscape {
                        ch: c,
                        pos: esc_pos,
                    })
                } else {
                    Ok(Escaped::Str(vec![c]))
                }
            }
            Some(c) => Ok(Escaped::Str(vec![c])),
            None => Err(PatternSyntaxError::TrailingBackslash),
        }
    }

    /// Parses a `\n...` digit escape. Digits are consumed greedily: if
    /// their decimal value designates a group declared so far, this is a
    /// backreference; otherwise up to three leading octal digits form a
    /// character literal and the remaining digits are literal characters.
    fn parse_digit_escape(&mut self) -> Escaped {
        let start = self.pos;
        let mut digits: Vec<char> = Vec::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.pos += 1;
        }
        let mut value: u64 = 0;
        for &d in digits.iter() {
            value = (value * 10 + d.to_digit(10).unwrap_or(0) as u64)
                .min(u32::MAX as u64);
        }
        if value >= 1 && value <= self.group_count as u64 {
            return Escaped::Kind(self.backref_kind(value as u32));
        }
        // Octal reinterpretation.
        self.pos = start;
        let mut chars = Vec::new();
        if matches!(self.peek(), Some('0'..='7')) {
            chars.push(self.take_octal());
        }
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            chars.push(c);
            self.pos += 1;
        }
        Escaped::Str(chars)
    }

    /// Consumes up to three octal digits and returns the character they
    /// encode. The cursor is known to be on an octal digit.
    fn take_octal(&mut self) -> char {
        let mut value: u32 = 0;
        for _ in 0..3 {
            match self.peek().and_then(|c| c.to_digit(8)) {
                Some(digit) => {
                    value = value * 8 + digit;
                    self.pos += 1;
                }
                None => break,
            }
        }
        // Three octal digits max out at 0o777, always a valid char.
        char::from_u32(value).unwrap_or('\0')
    }

    /// Parses `\xHH` or `\x{...}`, the `x` already consumed.
    fn parse_hex_escape(
        &mut self,
        esc_pos: usize,
    ) -> Result<char, PatternSyntaxError> {
        let malformed = PatternSyntaxError::MalformedEscape {
            ch: 'x',
            pos: esc_pos,
        };
        if self.eat('{') {
            let mut value: u32 = 0;
            let mut digits = 0;
            while let Some(digit) = self.peek().and_then(|c| c.to_digit(16)) {
                value = value.saturating_mul(16).saturating_add(digit);
                digits += 1;
                self.pos += 1;
            }
            if digits == 0 || !self.eat('}') {
                return Err(malformed);
            }
            char::from_u32(value).ok_or(malformed)
        } else {
            let mut value: u32 = 0;
            for _ in 0..2 {
                match self.peek().and_then(|c| c.to_digit(16)) {
                    Some(digit) => {
                        value = value * 16 + digit;
                        self.pos += 1;
                    }
                    None => break,
                }
            }
            char::from_u32(value).ok_or(malformed)
        }
    }

    /// Parses the category designation of a `\p`/`\P` escape: a bare
    /// letter, or braces with an optional leading `^` that negates once
    /// more.
    fn parse_category(
        &mut self,
        mut negated: bool,
        esc_pos: usize,
    ) -> Result<(Category, bool), PatternSyntaxError> {
        let malformed = PatternSyntaxError::MalformedEscape {
            ch: 'p',
            pos: esc_pos,
        };
        if self.eat('{') {
            if self.eat('^') {
                negated = !negated;
            }
            let letter = self.advance().ok_or_else(|| malformed.clone())?;
            let category =
                Category::from_letter(letter).ok_or_else(|| malformed.clone())?;
            if !self.eat('}') {
                return Err(malformed);
            }
            Ok((category, negated))
        } else {
            let letter = self.advance().ok_or_else(|| malformed.clone())?;
            let category =
                Category::from_letter(letter).ok_or(malformed)?;
            Ok((category, negated))
        }
    }
}

fn digit_set() -> ClassSet {
    let mut set = ClassSet::new();
    set.set_range('0' as u32, '9' as u32);
    set
}

fn space_set() -> ClassSet {
    let mut set = ClassSet::new();
    for c in [' ', '\t', '\n', '\r', '\x0B', '\x0C'] {
        set.add_char(c);
    }
    set
}

fn word_set() -> ClassSet {
    let mut set = ClassSet::new();
    set.set_range('0' as u32, '9' as u32);
    set.set_range('A' as u32, 'Z' as u32);
    set.set_range('a' as u32, 'z' as u32);
    set.add_char('_');
    set
}
