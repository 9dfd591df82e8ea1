//! LRU Index Module
//!
//! Implements the recency-ordered index used for cache eviction.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

// == Node ==
/// One slot of the recency list. Links are arena indices, not pointers.
#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    /// Towards the head (more recently used)
    prev: Option<usize>,
    /// Towards the tail (less recently used)
    next: Option<usize>,
}

// == Eviction Index ==
/// Hash map plus doubly-linked recency list with O(1) get/insert/remove/touch.
///
/// Nodes live in a vector of slots with a free list and are addressed by
/// index:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// Every key in the map has exactly one node in the list and vice versa.
#[derive(Debug)]
pub struct EvictionIndex<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> EvictionIndex<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates an empty index holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    // == Get ==
    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).map(|value| &*value)
    }

    /// Mutable variant of [`EvictionIndex::get`]; also marks the key most recently used.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.node_mut(idx).map(|node| &mut node.value)
    }

    // == Peek ==
    /// Returns the value for `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.node(idx).map(|node| &node.value)
    }

    /// Least recently used key, without side effects.
    pub fn peek_lru(&self) -> Option<&K> {
        self.tail.and_then(|idx| self.node(idx)).map(|node| &node.key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    // == Insert ==
    /// Inserts or overwrites `key`, making it most recently used.
    ///
    /// When the key is new and the index is full, exactly one entry (the
    /// tail) is evicted first and returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.node_mut(idx) {
                node.value = value;
            }
            self.move_to_front(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let idx = self.alloc(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.map.insert(key, idx);

        evicted
    }

    // == Remove ==
    /// Removes `key`, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.release(idx).map(|node| node.value)
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.release(idx)?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Removes every entry for which `keep` returns false and hands them back.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<usize> = self
            .map
            .values()
            .copied()
            .filter(|&idx| {
                self.node(idx)
                    .map(|node| !keep(&node.key, &node.value))
                    .unwrap_or(false)
            })
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for idx in doomed {
            self.unlink(idx);
            if let Some(node) = self.release(idx) {
                self.map.remove(&node.key);
                removed.push((node.key, node.value));
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    // == Inspection ==
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            index: self,
            cursor: self.head,
        }
    }

    // == List Plumbing ==
    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.slots.get(idx).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, idx: usize) -> Option<Node<K, V>> {
        let node = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        Some(node)
    }

    /// Detaches `idx` from the list, leaving its own links cleared.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.node_mut(idx) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.node_mut(h) {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    /// Walks the list both ways and checks it against the map.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let forward: Vec<&K> = self.iter().map(|(k, _)| k).collect();
        assert_eq!(forward.len(), self.map.len(), "list and map sizes differ");
        for key in &forward {
            assert!(self.map.contains_key(*key), "list node missing from map");
        }

        let mut backward = 0;
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            backward += 1;
            cursor = self.node(idx).and_then(|node| node.prev);
        }
        assert_eq!(backward, forward.len(), "prev links disagree with next links");
        assert!(self.map.len() <= self.capacity);
        assert_eq!(
            self.slots.iter().filter(|slot| slot.is_some()).count(),
            self.map.len(),
            "orphaned arena slots"
        );
    }
}

// == Iterator ==
/// Recency-ordered iterator returned by [`EvictionIndex::iter`].
pub struct Iter<'a, K, V> {
    index: &'a EvictionIndex<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Hash + Eq + Clone,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.node(self.cursor?)?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
