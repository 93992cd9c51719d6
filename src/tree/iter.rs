//! Module that contains the iterator and the cursor implementations.

use crate::inner::{DeleteOutcome, NextStep, ROOT};
use crate::{Prefix, TagTree};

/// An iterator over all tag-bearing nodes of a [`TagTree`] in pre-order
/// (a node before its left subtree before its right subtree).
///
/// The yielded prefix is the full key, reconstructed by concatenating the
/// per-node segments down the path.
pub struct Iter<'a, P, T> {
    tree: &'a TagTree<P, T>,
    stack: Vec<(u32, P)>,
}

impl<P: Clone, T> Clone for Iter<'_, P, T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            stack: self.stack.clone(),
        }
    }
}

impl<'a, P, T> Iterator for Iter<'a, P, T>
where
    P: Prefix,
{
    type Item = (P, Vec<&'a T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((idx, above)) = self.stack.pop() {
            let node = &self.tree.table[idx];
            let full = above.merge(&node.prefix);
            if node.right != 0 {
                self.stack.push((node.right, full.clone()));
            }
            if node.left != 0 {
                self.stack.push((node.left, full.clone()));
            }
            if node.tag_count > 0 {
                let mut tags = Vec::with_capacity(node.tag_count as usize);
                self.tree.tags_for_node(&mut tags, idx, None);
                return Some((full, tags));
            }
        }
        None
    }
}

impl<'a, P, T> IntoIterator for &'a TagTree<P, T>
where
    P: Prefix,
{
    type Item = (P, Vec<&'a T>);

    type IntoIter = Iter<'a, P, T>;

    fn into_iter(self) -> Self::IntoIter {
        Iter {
            tree: self,
            stack: vec![(ROOT, P::zero())],
        }
    }
}

impl<P, T> TagTree<P, T>
where
    P: Prefix,
{
    /// Iterate over all tag-bearing nodes in pre-order. The iterator element
    /// type is `(P, Vec<&T>)`.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, "private");
    /// tree.add("10.1.0.0/16".parse()?, "site-1");
    /// tree.add("192.0.2.0/24".parse()?, "doc");
    /// let entries: Vec<_> = tree.iter().collect();
    /// assert_eq!(entries, vec![
    ///     ("10.0.0.0/8".parse()?, vec![&"private"]),
    ///     ("10.1.0.0/16".parse()?, vec![&"site-1"]),
    ///     ("192.0.2.0/24".parse()?, vec![&"doc"]),
    /// ]);
    /// # Ok(())
    /// # }
    /// ```
    #[inline(always)]
    pub fn iter(&self) -> Iter<'_, P, T> {
        self.into_iter()
    }

    /// Create a [`Cursor`] for a traversal that may delete tags along the
    /// way. The cursor borrows the tree mutably, so no other access can
    /// happen while it is alive.
    pub fn cursor(&mut self) -> Cursor<'_, P, T> {
        Cursor {
            tree: self,
            node_idx: ROOT,
            history: Vec::new(),
            next: NextStep::This,
        }
    }
}

/// A stateful pre-order walk over a [`TagTree`] that supports removing tags
/// at the current position.
///
/// Unlike [`Iter`] this is not a `std` iterator: call
/// [`move_next`](Cursor::move_next) to advance, then inspect the position
/// through [`address`](Cursor::address) and [`tags`](Cursor::tags). When
/// [`remove`](Cursor::remove) empties a node, the surrounding compaction is
/// applied and the walk continues in the repaired tree. The cursor holds the
/// unique mutable borrow of the tree, so any outside mutation during the
/// traversal is rejected at compile time.
///
/// ```
/// # use tag_trie::*;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut tree: TagTreeV4<u32> = TagTree::new();
/// tree.add("10.0.0.0/8".parse()?, 1);
/// tree.add("10.1.0.0/16".parse()?, 2);
/// tree.add("10.2.0.0/16".parse()?, 3);
///
/// let mut cursor = tree.cursor();
/// let mut removed = 0;
/// while cursor.move_next() {
///     removed += cursor.remove(&2, |tag, probe| tag == probe);
/// }
/// assert_eq!(removed, 1);
/// assert_eq!(tree.find_tags(&"10.1.2.3/32".parse()?), vec![&1]);
/// assert_eq!(tree.find_tags(&"10.2.2.3/32".parse()?), vec![&1, &3]);
/// # Ok(())
/// # }
/// ```
pub struct Cursor<'a, P, T> {
    tree: &'a mut TagTree<P, T>,
    node_idx: u32,
    history: Vec<u32>,
    next: NextStep,
}

impl<P, T> Cursor<'_, P, T>
where
    P: Prefix,
{
    /// Advance to the next tag-bearing node in pre-order. Returns `false`
    /// once the traversal is exhausted.
    pub fn move_next(&mut self) -> bool {
        loop {
            let node = &self.tree.table[self.node_idx];
            let (left, right, tag_count) = (node.left, node.right, node.tag_count);
            if self.next == NextStep::This {
                self.next = NextStep::Left;
                if tag_count != 0 {
                    return true;
                }
            }
            if self.next == NextStep::Left {
                if left != 0 {
                    self.history.push(self.node_idx);
                    self.node_idx = left;
                    self.next = NextStep::This;
                    continue;
                }
                self.next = NextStep::Right;
            }
            if self.next == NextStep::Right {
                if right != 0 {
                    self.history.push(self.node_idx);
                    self.node_idx = right;
                    self.next = NextStep::This;
                    continue;
                }
                self.next = NextStep::Up;
            }
            if self.next == NextStep::Up {
                let Some(parent_idx) = self.history.pop() else {
                    return false;
                };
                let parent = &self.tree.table[parent_idx];
                if parent.left == self.node_idx {
                    self.node_idx = parent_idx;
                    self.next = NextStep::Right;
                } else if parent.right == self.node_idx {
                    self.node_idx = parent_idx;
                    self.next = NextStep::Up;
                } else {
                    panic!("walked up to a node that does not link back down");
                }
            }
        }
    }

    /// The full prefix of the current node, concatenated from the path.
    pub fn address(&self) -> P {
        let mut full = P::zero();
        for &idx in &self.history {
            full = full.merge(&self.tree.table[idx].prefix);
        }
        full.merge(&self.tree.table[self.node_idx].prefix)
    }

    /// The tags of the current node, in slot order.
    pub fn tags(&self) -> Vec<&T> {
        let mut ret = Vec::new();
        self.tree.tags_for_node(&mut ret, self.node_idx, None);
        ret
    }

    /// Remove every tag of the current node for which `matches(stored,
    /// probe)` holds, returning how many were removed. If the node ends up
    /// empty it is compacted away and the cursor repositions itself so the
    /// traversal still visits every remaining node exactly once.
    pub fn remove<F>(&mut self, probe: &T, matches: F) -> usize
    where
        F: Fn(&T, &T) -> bool,
    {
        let matches: &dyn Fn(&T, &T) -> bool = &matches;
        let (removed, remaining) = self.tree.delete_tags(self.node_idx, probe, matches);
        if remaining > 0 || self.node_idx == ROOT {
            return removed;
        }

        let current_idx = self.node_idx;
        let parent_idx = *self.history.last().unwrap();
        let was_left = self.tree.table[parent_idx].left == current_idx;
        match self.tree.delete_node(current_idx, parent_idx) {
            DeleteOutcome::NotDeleted => {}
            DeleteOutcome::ReplacedByChild => {
                // continue with the replacement, which has not been visited
                self.node_idx = self.tree.table.child(parent_idx, !was_left);
                self.next = NextStep::This;
            }
            DeleteOutcome::ParentMergedSibling => {
                self.node_idx = parent_idx;
                self.history.pop();
                self.next = if was_left {
                    // the parent took over the right sibling, still to visit
                    NextStep::This
                } else {
                    // the parent took over the left sibling, already visited
                    NextStep::Up
                };
            }
            DeleteOutcome::Removed => {
                self.node_idx = parent_idx;
                self.history.pop();
                self.next = if was_left { NextStep::Right } else { NextStep::Up };
            }
        }
        removed
    }
}
