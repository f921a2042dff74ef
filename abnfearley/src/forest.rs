use crate::element::Element;
use crate::items::{Item, ItemId, NodeId, Trigger};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a forest node derives: a named rule or an anonymous element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    Rule(String),
    Element(Element),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Label::Rule(name) => write!(f, "{}", name),
            Label::Element(element) => write!(f, "{}", element),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

/// A node of the forest: `label` derives `input[start..end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForestNode<'f> {
    pub label: &'f Label,
    pub start: usize,
    pub end: usize,
}

/// One way of deriving a node: its children in input order. Literal
/// matches have no children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Derivation(Vec<NodeIndex>);

impl Derivation {
    pub fn children(&self) -> &[NodeIndex] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// A single derivation tree picked out of a forest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    pub label: Label,
    pub start: usize,
    pub end: usize,
    pub children: Vec<Tree>,
}

impl Tree {
    /// Bytes of `input` this tree spans, None if `input` is shorter than
    /// the recognized one.
    pub fn bytes<'i>(&self, input: &'i [u8]) -> Option<&'i [u8]> {
        input.get(self.start..self.end)
    }
}

/// One line per node, children indented under their parent.
impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut pending = vec![(self, 0)];
        while let Some((tree, level)) = pending.pop() {
            if !std::ptr::eq(tree, self) {
                writeln!(f)?;
            }
            write!(f, "{:indent$}{} [{}-{}]", "", tree.label, tree.start, tree.end, indent = level * 2)?;
            pending.extend(tree.children.iter().rev().map(|child| (child, level + 1)));
        }
        Ok(())
    }
}

// Deep trees are dropped level by level instead of recursively.
impl Drop for Tree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut tree) = pending.pop() {
            pending.append(&mut tree.children);
        }
    }
}

#[derive(Debug)]
struct Entry {
    node: NodeId,
    start: usize,
    end: usize,
    // complete items of the node over this span
    completions: Vec<ItemId>,
}

/// Shared derivation graph of an accepted input.
///
/// Nodes are identified by `(label, start, end)` and reference their
/// children by index, so sub-derivations are never duplicated. Derivations
/// are unrolled from the chart links only when asked for.
#[derive(Debug)]
pub struct ParseForest {
    items: Vec<Item>,
    labels: Vec<Label>,
    nodes: Vec<Entry>,
    index: HashMap<(NodeId, usize, usize), NodeIndex>,
    node_of: HashMap<ItemId, NodeIndex>,
    root: NodeIndex,
}

impl ParseForest {
    /// Collect the nodes reachable through the links of the `root` item.
    pub(crate) fn new(items: Vec<Item>, labels: Vec<Label>, root: ItemId) -> ParseForest {
        let mut forest = ParseForest {
            items,
            labels,
            nodes: Vec::new(),
            index: HashMap::new(),
            node_of: HashMap::new(),
            root: NodeIndex(0),
        };
        forest.root = forest.register(root);
        let mut visited = HashSet::from([root]);
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let sources = forest.items[id].sources().to_vec();
            for link in sources {
                if visited.insert(link.source) {
                    pending.push(link.source);
                }
                if let Trigger::Complete(child) = link.trigger {
                    forest.register(child);
                    if visited.insert(child) {
                        pending.push(child);
                    }
                }
            }
        }
        tracing::trace!(nodes = forest.nodes.len(), "forest built");
        forest
    }

    fn register(&mut self, item: ItemId) -> NodeIndex {
        let (key, end) = (self.items[item].key, self.items[item].end);
        let next = NodeIndex(self.nodes.len());
        let ix = *self.index.entry((key.node, key.origin, end)).or_insert(next);
        if ix == next {
            self.nodes.push(Entry { node: key.node, start: key.origin, end, completions: Vec::new() });
        }
        if self.node_of.insert(item, ix).is_none() {
            self.nodes[ix.0].completions.push(item);
        }
        ix
    }

    /// The start rule over the whole input.
    pub fn root(&self) -> NodeIndex { self.root }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn node(&self, ix: NodeIndex) -> Option<ForestNode<'_>> {
        let entry = self.nodes.get(ix.0)?;
        Some(ForestNode { label: &self.labels[entry.node], start: entry.start, end: entry.end })
    }

    /// First node labeled `label` over `start..end`. Rules of the same name
    /// from different grammars share a label.
    pub fn lookup(&self, label: &Label, start: usize, end: usize) -> Option<NodeIndex> {
        self.labels.iter().enumerate()
            .filter(|(_, l)| *l == label)
            .find_map(|(node, _)| self.index.get(&(node, start, end)).copied())
    }

    /// All distinct derivations of a node in the order they were found.
    pub fn derivations(&self, ix: NodeIndex) -> Vec<Derivation> {
        let Some(entry) = self.nodes.get(ix.0) else { return Vec::new() };
        // Partial items leading to the completions. Along a link the source
        // ends earlier, or at the same place with a smaller dot.
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = entry.completions.clone();
        while let Some(id) = pending.pop() {
            if seen.insert(id) {
                chain.push(id);
                pending.extend(self.items[id].sources().iter().map(|link| link.source));
            }
        }
        chain.sort_by_key(|&id| (self.items[id].end, self.items[id].key.dot));

        let mut prefixes: HashMap<ItemId, Vec<Vec<NodeIndex>>> = HashMap::new();
        for id in chain {
            let sources = self.items[id].sources();
            let mut sequences = Vec::new();
            let mut unique = HashSet::new();
            if sources.is_empty() {
                sequences.push(Vec::new());
            }
            for link in sources {
                let child = match link.trigger {
                    Trigger::Complete(child) => match self.node_of.get(&child) {
                        Some(&child) => Some(child),
                        None => continue,
                    },
                    Trigger::Scan => None,
                };
                for prefix in prefixes.get(&link.source).into_iter().flatten() {
                    let mut sequence = prefix.clone();
                    sequence.extend(child);
                    if unique.insert(sequence.clone()) {
                        sequences.push(sequence);
                    }
                }
            }
            prefixes.insert(id, sequences);
        }

        let mut derivations = Vec::new();
        let mut unique = HashSet::new();
        for id in &entry.completions {
            for sequence in prefixes.remove(id).unwrap_or_default() {
                if unique.insert(sequence.clone()) {
                    derivations.push(Derivation(sequence));
                }
            }
        }
        derivations
    }

    /// Derivations of `label` over `start..end`, empty for unknown spans.
    pub fn derivations_of(&self, label: &Label, start: usize, end: usize) -> Vec<Derivation> {
        self.lookup(label, start, end)
            .map(|ix| self.derivations(ix))
            .unwrap_or_default()
    }

    /// A single derivation tree rooted at `ix`, taking the first derivation
    /// found at each node that doesn't revisit a node of its own path.
    /// Canonical for a given forest, but with no meaning among ambiguous ones.
    pub fn pick_one(&self, ix: NodeIndex) -> Option<Tree> {
        let chosen = self.pick_children(ix)?;
        self.build_tree(ix, &chosen)
    }

    // Depth first search for the children of every node in the picked tree.
    // Nodes are tried in `Pick::Node` frames, the links of one of their
    // complete items in `Pick::Links` frames on top of them.
    fn pick_children(&self, root: NodeIndex) -> Option<HashMap<NodeIndex, Vec<NodeIndex>>> {
        self.nodes.get(root.0)?;
        let mut chosen = HashMap::new();
        let mut path = HashSet::from([root]);
        let mut frames = vec![Pick::Node { ix: root, next: 0 }];
        // what the last popped frame found
        let mut found = None;
        while let Some(frame) = frames.pop() {
            match frame {
                Pick::Node { ix, next } => match found.take() {
                    Some(Found::Children(Some(children))) => {
                        path.remove(&ix);
                        chosen.insert(ix, children);
                        found = Some(Found::Node(true));
                    },
                    _ => match self.nodes[ix.0].completions.get(next) {
                        Some(&item) => {
                            frames.push(Pick::Node { ix, next: next + 1 });
                            frames.push(Pick::Links(Walk::new(item)));
                        },
                        None => {
                            path.remove(&ix);
                            found = Some(Found::Node(false));
                        },
                    },
                },
                Pick::Links(mut walk) => {
                    if let Some(Found::Node(picked)) = found.take() {
                        walk.resume(picked);
                    }
                    match self.walk_links(&mut walk, &chosen, &path) {
                        Step::Enter(child) => {
                            path.insert(child);
                            frames.push(Pick::Links(walk));
                            frames.push(Pick::Node { ix: child, next: 0 });
                        },
                        Step::Done(children) => found = Some(Found::Children(children)),
                    }
                },
            }
        }
        match found {
            Some(Found::Node(true)) => Some(chosen),
            _ => None,
        }
    }

    // Walk links back from a complete item trying them in order. A partial
    // item with no usable link is dead for the rest of the walk. Stops when
    // a child node still has to be picked.
    fn walk_links(&self, walk: &mut Walk, chosen: &HashMap<NodeIndex, Vec<NodeIndex>>,
                  path: &HashSet<NodeIndex>) -> Step {
        while let Some(&(current, next)) = walk.stack.last() {
            let sources = self.items[current].sources();
            if sources.is_empty() {
                return Step::Done(Some(walk.picked.iter().rev().flatten().copied().collect()));
            }
            let Some(&link) = sources.get(next) else {
                walk.dead.insert(current);
                walk.stack.pop();
                walk.picked.pop();
                continue;
            };
            if let Some(top) = walk.stack.last_mut() {
                top.1 += 1;
            }
            if walk.dead.contains(&link.source) {
                continue;
            }
            match link.trigger {
                Trigger::Scan => walk.advance(link.source, None),
                Trigger::Complete(child) => {
                    let Some(&child) = self.node_of.get(&child) else { continue };
                    if chosen.contains_key(&child) {
                        walk.advance(link.source, Some(child));
                    } else if !path.contains(&child) {
                        walk.awaiting = Some((link.source, child));
                        return Step::Enter(child);
                    }
                },
            }
        }
        Step::Done(None)
    }

    // Materialize the picked children bottom up.
    fn build_tree(&self, root: NodeIndex, chosen: &HashMap<NodeIndex, Vec<NodeIndex>>) -> Option<Tree> {
        let mut stack = vec![(root, Vec::new())];
        while let Some((ix, built)) = stack.pop() {
            let children = chosen.get(&ix)?;
            if let Some(&child) = children.get(built.len()) {
                stack.push((ix, built));
                stack.push((child, Vec::new()));
                continue;
            }
            let entry = self.nodes.get(ix.0)?;
            let tree = Tree {
                label: self.labels[entry.node].clone(),
                start: entry.start,
                end: entry.end,
                children: built,
            };
            match stack.last_mut() {
                Some((_, siblings)) => siblings.push(tree),
                None => return Some(tree),
            }
        }
        None
    }
}

// Frames of the `pick_one` search
enum Pick {
    Node { ix: NodeIndex, next: usize },
    Links(Walk),
}

enum Found {
    Node(bool),
    Children(Option<Vec<NodeIndex>>),
}

enum Step {
    Enter(NodeIndex),
    Done(Option<Vec<NodeIndex>>),
}

// Backward walk over the links of one complete item. `picked` holds the
// child node (or nothing for a scan) taken to reach each item of `stack`
// past the first.
struct Walk {
    stack: Vec<(ItemId, usize)>,
    picked: Vec<Option<NodeIndex>>,
    dead: HashSet<ItemId>,
    // link source to continue from once its child node is picked
    awaiting: Option<(ItemId, NodeIndex)>,
}

impl Walk {
    fn new(item: ItemId) -> Walk {
        Walk { stack: vec![(item, 0)], picked: Vec::new(), dead: HashSet::new(), awaiting: None }
    }

    fn advance(&mut self, source: ItemId, child: Option<NodeIndex>) {
        self.picked.push(child);
        self.stack.push((source, 0));
    }

    fn resume(&mut self, picked: bool) {
        if let Some((source, child)) = self.awaiting.take() {
            if picked {
                self.advance(source, Some(child));
            }
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
