use std::collections::{HashMap, HashSet};
use std::fmt;

/// Index of a compiled grammar node (a rule or an interned element)
pub(crate) type NodeId = usize;
/// Index of an Item in the chart
pub(crate) type ItemId = usize;

/// Identity of an Item within an ItemSet. The set index is the Item's end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ItemKey {
    pub node: NodeId,
    /// progress within the node: children/bytes matched or repetitions done
    pub dot: u32,
    /// input position where the item starts
    pub origin: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Trigger {
    /// the child item that completed
    Complete(ItemId),
    /// an input byte was matched
    Scan,
}

/// Back-pointer: the Item that was advanced and what advanced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Link {
    pub source: ItemId,
    pub trigger: Trigger,
}

/// An Item is a partially matched node. `dot` shows the match progress.
pub(crate) struct Item {
    pub key: ItemKey,
    /// input position where the item ends (its ItemSet)
    pub end: usize,
    // Only grows: merging a duplicate Item appends its links
    sources: Vec<Link>,
    links: HashSet<Link>,
}

impl Item {
    /// Build a new `Prediction` based Item.
    pub fn predict_new(node: NodeId, start: usize) -> Item {
        Item {
            key: ItemKey { node, dot: 0, origin: start },
            end: start,
            sources: Vec::new(),
            links: HashSet::new(),
        }
    }

    /// An item advanced by matching an input byte.
    pub fn scan_new(source: ItemId, key: ItemKey, end: usize) -> Item {
        Item::linked(key, end, Link { source, trigger: Trigger::Scan })
    }

    /// An item advanced because its expected child `trigger` completed.
    pub fn complete_new(source: ItemId, trigger: ItemId, key: ItemKey, end: usize) -> Item {
        Item::linked(key, end, Link { source, trigger: Trigger::Complete(trigger) })
    }

    fn linked(key: ItemKey, end: usize, link: Link) -> Item {
        Item { key, end, sources: vec![link], links: HashSet::from([link]) }
    }

    /// Scans or Completions that led to the creation of this Item, in the
    /// order they were found.
    pub fn sources(&self) -> &[Link] {
        &self.sources
    }

    /// Merge other Item into this one moving over its back-pointers
    pub fn merge_sources(&mut self, other: Item) {
        debug_assert_eq!((self.key, self.end), (other.key, other.end), "Items to merge should be Eq");
        for link in other.sources {
            if self.links.insert(link) {
                self.sources.push(link);
            }
        }
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({} - {}) node {} \u{00b7} {} #bp: {}",
               self.key.origin, self.end, self.key.node, self.key.dot, self.sources.len())
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Items ending at the same input position, deduped by `ItemKey`.
#[derive(Default)]
pub(crate) struct ItemSet {
    order: Vec<ItemId>,
    dedup: HashMap<ItemKey, ItemId>,
    // items of this set waiting on a node to complete from here
    waiting: HashMap<NodeId, Vec<ItemId>>,
}

impl ItemSet {
    pub fn len(&self) -> usize { self.order.len() }

    pub fn get(&self, idx: usize) -> Option<ItemId> { self.order.get(idx).copied() }

    pub fn find(&self, key: &ItemKey) -> Option<ItemId> { self.dedup.get(key).copied() }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ { self.order.iter().copied() }

    pub fn wait_for(&mut self, node: NodeId, item: ItemId) {
        self.waiting.entry(node).or_default().push(item);
    }

    pub fn waiting_on(&self, node: NodeId) -> &[ItemId] {
        self.waiting.get(&node).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Item arena plus one ItemSet per input position reached so far.
#[derive(Default)]
pub(crate) struct Chart {
    items: Vec<Item>,
    sets: Vec<ItemSet>,
}

impl Chart {
    pub fn item(&self, id: ItemId) -> &Item { &self.items[id] }

    pub fn set(&self, idx: usize) -> &ItemSet { &self.sets[idx] }

    pub fn set_mut(&mut self, idx: usize) -> &mut ItemSet { &mut self.sets[idx] }

    pub fn num_sets(&self) -> usize { self.sets.len() }

    pub fn num_items(&self) -> usize { self.items.len() }

    /// Add an item to the set of its end position, merging back-pointers
    /// into an existing equal item. Returns true when the item is new.
    pub fn push(&mut self, item: Item) -> bool {
        while self.sets.len() <= item.end {
            self.sets.push(ItemSet::default());
        }
        let set = &mut self.sets[item.end];
        if let Some(&existent) = set.dedup.get(&item.key) {
            self.items[existent].merge_sources(item);
            return false;
        }
        let id = self.items.len();
        set.order.push(id);
        set.dedup.insert(item.key, id);
        self.items.push(item);
        true
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }
}

impl fmt::Debug for ItemSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { self.order.fmt(f) }
}

///////////////////////////////////////////////////////////////////////////////
