use crate::element::{Element, LiteralRange, LiteralString, Repetition};
use crate::error::Result;
use crate::forest::{Label, ParseForest};
use crate::grammar::Grammar;
use crate::items::{Chart, Item, ItemId, ItemKey, NodeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Resource cutoffs for a single recognition. Defaults are unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    max_input_len: Option<usize>,
    max_items: Option<usize>,
}

impl Limits {
    /// Reject inputs longer than `len` bytes before doing any work.
    pub fn max_input_len(mut self, len: usize) -> Self {
        self.max_input_len = Some(len);
        self
    }

    /// Stop once the chart holds more than `items` items.
    pub fn max_items(mut self, items: usize) -> Self {
        self.max_items = Some(items);
        self
    }
}

/// The cutoff that stopped a recognition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    InputLength(usize),
    Items(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    NoCompletion,
    LimitExceeded(Limit),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// greatest input position whose item set was not empty
    pub furthest: usize,
    pub reason: RejectReason,
}

#[derive(Debug)]
pub enum ParseResult {
    Accepted {
        forest: ParseForest,
        /// (start, end) spans where the start rule completed over the input
        spans: BTreeSet<(usize, usize)>,
    },
    Rejected(Rejection),
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Limit::InputLength(len) => write!(f, "input longer than {} bytes", len),
            Limit::Items(items) => write!(f, "more than {} chart items", items),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RejectReason::NoCompletion =>
                write!(f, "no item set at that position yielded a completion of the start rule"),
            RejectReason::LimitExceeded(limit) => write!(f, "limit exceeded: {}", limit),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rejected at {}: {}", self.furthest, self.reason)
    }
}

impl ParseResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ParseResult::Accepted { .. })
    }

    pub fn forest(&self) -> Option<&ParseForest> {
        match self {
            ParseResult::Accepted { forest, .. } => Some(forest),
            ParseResult::Rejected(_) => None,
        }
    }

    pub fn into_forest(self) -> Option<ParseForest> {
        match self {
            ParseResult::Accepted { forest, .. } => Some(forest),
            ParseResult::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ParseResult::Accepted { .. } => None,
            ParseResult::Rejected(rejection) => Some(rejection),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

// How items over a compiled node move forward.
enum Shape<'g> {
    Rule(NodeId),
    Alternation(Vec<NodeId>),
    Concatenation(Vec<NodeId>),
    Repetition(NodeId, &'g Repetition),
    String(&'g LiteralString),
    Range(&'g LiteralRange),
}

impl Shape<'_> {
    /// Nodes an item at `dot` waits on.
    fn expects(&self, dot: u32) -> &[NodeId] {
        match self {
            Shape::Rule(body) if dot == 0 => std::slice::from_ref(body),
            Shape::Alternation(alternatives) if dot == 0 => alternatives.as_slice(),
            Shape::Concatenation(elements) => match elements.get(dot as usize) {
                Some(element) => std::slice::from_ref(element),
                None => &[],
            },
            Shape::Repetition(element, rep) if rep.allows_another(dot) =>
                std::slice::from_ref(element),
            _ => &[],
        }
    }

    fn is_complete(&self, dot: u32) -> bool {
        match self {
            Shape::Rule(_) | Shape::Alternation(_) | Shape::Range(_) => dot == 1,
            Shape::Concatenation(elements) => dot as usize == elements.len(),
            Shape::Repetition(_, rep) => rep.is_satisfied_by(dot),
            Shape::String(string) => dot as usize == string.len(),
        }
    }

    fn scans(&self, dot: u32, byte: u8) -> bool {
        match self {
            Shape::String(string) => string.matches_at(dot as usize, byte),
            Shape::Range(range) => dot == 0 && range.contains(byte),
            _ => false,
        }
    }

    /// Dot after one more child completed. Unbounded repetitions stop
    /// counting at their lower bound.
    fn advance(&self, dot: u32) -> u32 {
        match self {
            Shape::Repetition(_, rep) if rep.upper().is_none() && dot >= rep.lower() => dot,
            _ => dot + 1,
        }
    }
}

/// Grammar nodes reachable from the start rule. Rules are keyed by the
/// grammar defining them and elements are interned structurally within that
/// grammar, so equal elements share chart items while calls inside imported
/// rules keep resolving through the import.
struct Program<'g> {
    // grammars whose rules were reached, the root grammar first
    scopes: Vec<&'g Grammar>,
    labels: Vec<Label>,
    shapes: Vec<Shape<'g>>,
    rules: HashMap<(usize, &'g str), NodeId>,
    elements: HashMap<(usize, &'g Element), NodeId>,
    pending: Vec<(NodeId, usize, &'g Element)>,
    root: NodeId,
}

impl<'g> Program<'g> {
    fn compile(grammar: &'g Grammar, start: &str) -> Result<Program<'g>> {
        let mut program = Program {
            scopes: vec![grammar],
            labels: Vec::new(),
            shapes: Vec::new(),
            rules: HashMap::new(),
            elements: HashMap::new(),
            pending: Vec::new(),
            root: 0,
        };
        program.root = program.rule_node(0, start)?;
        while let Some((rule, scope, body)) = program.pending.pop() {
            let body = program.element_node(scope, body)?;
            program.shapes[rule] = Shape::Rule(body);
        }
        tracing::trace!(start, nodes = program.shapes.len(), grammars = program.scopes.len(),
                        "grammar compiled");
        Ok(program)
    }

    fn push(&mut self, label: Label, shape: Shape<'g>) -> NodeId {
        self.labels.push(label);
        self.shapes.push(shape);
        self.shapes.len() - 1
    }

    fn scope_of(&mut self, grammar: &'g Grammar) -> usize {
        match self.scopes.iter().position(|&scope| std::ptr::eq(scope, grammar)) {
            Some(scope) => scope,
            None => {
                self.scopes.push(grammar);
                self.scopes.len() - 1
            },
        }
    }

    /// Node of the rule `name` as called from a rule of `scope`.
    fn rule_node(&mut self, scope: usize, name: &str) -> Result<NodeId> {
        let (owner, rule) = self.scopes[scope].resolve(name)?;
        let scope = self.scope_of(owner);
        if let Some(&id) = self.rules.get(&(scope, rule.name())) {
            return Ok(id);
        }
        // Points at itself until the body is compiled
        let id = self.shapes.len();
        self.push(Label::Rule(rule.name().to_string()), Shape::Rule(id));
        self.rules.insert((scope, rule.name()), id);
        self.pending.push((id, scope, rule.element()));
        Ok(id)
    }

    fn element_node(&mut self, scope: usize, element: &'g Element) -> Result<NodeId> {
        if let Some(&id) = self.elements.get(&(scope, element)) {
            return Ok(id);
        }
        let shape = match element {
            Element::RuleCall(name) => return self.rule_node(scope, name),
            Element::Alternation(alternatives) => {
                let mut ids = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    let id = self.element_node(scope, alternative)?;
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                Shape::Alternation(ids)
            },
            Element::Concatenation(elements) => Shape::Concatenation(
                elements.iter().map(|e| self.element_node(scope, e)).collect::<Result<_>>()?),
            Element::Repetition(rep) =>
                Shape::Repetition(self.element_node(scope, rep.element())?, rep),
            Element::LiteralString(string) => Shape::String(string),
            Element::LiteralRange(range) => Shape::Range(range),
        };
        let id = self.push(Label::Element(element.clone()), shape);
        self.elements.insert((scope, element), id);
        Ok(id)
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Earley recognizer over byte input.
///
/// ```
/// use abnfearley::{Element, Grammar, Recognizer};
///
/// let g = Grammar::new("g", [("digits", Element::repetition(
///     Element::range(b'0', b'9')?, 1, None)?)], vec![])?;
/// let result = Recognizer::new(&g).recognize("digits", b"2024")?;
/// assert!(result.is_accepted());
/// # Ok::<(), abnfearley::Error>(())
/// ```
pub struct Recognizer<'g> {
    grammar: &'g Grammar,
    limits: Limits,
}

// State of one recognition
struct Run<'p, 'g> {
    program: &'p Program<'g>,
    chart: Chart,
    // items that completed at the current position without consuming input
    empties: HashMap<NodeId, Vec<ItemId>>,
    max_items: Option<usize>,
}

impl<'p, 'g> Run<'p, 'g> {
    /// Predict/Complete until no new Items are added to the set at `pos`.
    fn close(&mut self, pos: usize) -> Result<(), Limit> {
        self.empties.clear();
        let mut cursor = 0;
        while let Some(id) = self.chart.set(pos).get(cursor) {
            cursor += 1;
            self.process(id, pos);
            if let Some(max) = self.max_items.filter(|&max| self.chart.num_items() > max) {
                return Err(Limit::Items(max));
            }
        }
        Ok(())
    }

    fn process(&mut self, id: ItemId, pos: usize) {
        let program = self.program;
        let key = self.chart.item(id).key;
        let shape = &program.shapes[key.node];
        for &child in shape.expects(key.dot) {
            self.chart.set_mut(pos).wait_for(child, id);
            self.chart.push(Item::predict_new(child, pos));
            // the child may already have completed here without input
            let done = self.empties.get(&child).cloned().unwrap_or_default();
            for trigger in done {
                self.advance(id, trigger, pos);
            }
        }
        if shape.is_complete(key.dot) {
            if key.origin == pos {
                self.empties.entry(key.node).or_default().push(id);
            }
            let waiting = self.chart.set(key.origin).waiting_on(key.node).to_vec();
            for source in waiting {
                self.advance(source, id, pos);
            }
        }
    }

    /// Move `source` past its expected child because `trigger` completed.
    fn advance(&mut self, source: ItemId, trigger: ItemId, pos: usize) {
        let item = self.chart.item(source);
        let shape = &self.program.shapes[item.key.node];
        let key = ItemKey { dot: shape.advance(item.key.dot), ..item.key };
        // an item can't be its own source
        if key == item.key && item.end == pos {
            return;
        }
        self.chart.push(Item::complete_new(source, trigger, key, pos));
    }

    /// Build the set at `pos + 1` with items accepting `byte`.
    fn scan(&mut self, pos: usize, byte: u8) -> bool {
        let scanned: Vec<_> = self.chart.set(pos).iter().filter_map(|id| {
            let key = self.chart.item(id).key;
            self.program.shapes[key.node].scans(key.dot, byte).then(|| {
                Item::scan_new(id, ItemKey { dot: key.dot + 1, ..key }, pos + 1)
            })
        }).collect();
        let any = !scanned.is_empty();
        for item in scanned {
            self.chart.push(item);
        }
        any
    }

    fn dump(&self) {
        for idx in 0..self.chart.num_sets() {
            tracing::trace!("=== ItemSet {} ===", idx);
            for id in self.chart.set(idx).iter() {
                let item = self.chart.item(id);
                tracing::trace!("{:?} {} -- SRC: {:?}",
                                item, self.program.labels[item.key.node], item.sources());
            }
        }
    }
}

impl<'g> Recognizer<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Recognizer { grammar, limits: Limits::default() }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Decide whether `input` derives from rule `start`. Only an unknown
    /// start rule is an error, rejected input is a `ParseResult::Rejected`.
    pub fn recognize(&self, start: &str, input: &[u8]) -> Result<ParseResult> {
        let program = Program::compile(self.grammar, start)?;
        tracing::debug!(grammar = self.grammar.name(), start, len = input.len(), "recognize");

        if let Some(max) = self.limits.max_input_len.filter(|&max| input.len() > max) {
            let rejection = Rejection { furthest: 0, reason: RejectReason::LimitExceeded(Limit::InputLength(max)) };
            tracing::debug!(%rejection, "recognition stopped");
            return Ok(ParseResult::Rejected(rejection));
        }

        let mut run = Run {
            program: &program,
            chart: Chart::default(),
            empties: HashMap::new(),
            max_items: self.limits.max_items,
        };
        run.chart.push(Item::predict_new(program.root, 0));

        // New item sets are generated from the input bytes (Scans)
        let mut pos = 0;
        let outcome = loop {
            if let Err(limit) = run.close(pos) {
                break Err(limit);
            }
            tracing::trace!(position = pos, items = run.chart.set(pos).len(), "item set closed");
            match input.get(pos) {
                Some(&byte) if run.scan(pos, byte) => pos += 1,
                _ => break Ok(()),
            }
        };

        if cfg!(feature = "debug") {
            run.dump();
        }

        let items = run.chart.num_items();
        // Accept if the start rule completed from 0 at the last position
        let root_key = ItemKey { node: program.root, dot: 1, origin: 0 };
        let root = match outcome {
            Ok(()) if pos == input.len() => run.chart.set(pos).find(&root_key),
            _ => None,
        };
        let Some(root) = root else {
            let reason = match outcome {
                Err(limit) => RejectReason::LimitExceeded(limit),
                Ok(()) => RejectReason::NoCompletion,
            };
            let rejection = Rejection { furthest: pos, reason };
            tracing::debug!(%rejection, items, "input rejected");
            return Ok(ParseResult::Rejected(rejection));
        };
        tracing::debug!(len = input.len(), items, "input accepted");

        let Run { chart, .. } = run;
        let forest = ParseForest::new(chart.into_items(), program.labels, root);
        Ok(ParseResult::Accepted { forest, spans: BTreeSet::from([(0, input.len())]) })
    }
}

/// Recognize `input` from rule `start` of `grammar` without limits.
pub fn recognize(grammar: &Grammar, start: &str, input: &[u8]) -> Result<ParseResult> {
    Recognizer::new(grammar).recognize(start, input)
}

///////////////////////////////////////////////////////////////////////////////
