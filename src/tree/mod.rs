//! Implementation of the tag tree.

use std::collections::HashMap;

use crate::{
    inner::{DeleteOutcome, Table, ROOT},
    Prefix,
};

mod iter;

pub use iter::*;

/// Key of a tag in the side table: node index in the high half, slot number
/// in the low half. Slots of one node are dense in `[0, tag_count)`.
#[inline(always)]
fn tag_key(idx: u32, slot: u32) -> u64 {
    ((idx as u64) << 32) | slot as u64
}

/// A compressed binary (Patricia) trie that maps IP prefixes to any number
/// of tags.
///
/// Lookups walk the path from the root: [`TagTree::find_tags`] collects the
/// tags of every stored prefix covering the queried address, while
/// [`TagTree::find_deepest_tag`] keeps only the longest match. Tags attached
/// to the same prefix keep their insertion order.
///
/// Nodes live in an index-based arena with a free-list, so repeated insert
/// and delete cycles recycle slots instead of growing the backing array.
/// Cloning the tree copies the arena and the tag table; wrap tags in
/// [`std::sync::Arc`] if they should be shared rather than duplicated.
///
/// ```
/// # use tag_trie::*;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut tree: TagTreeV4<&str> = TagTree::new();
/// tree.add("0.0.0.0/0".parse()?, "default");
/// tree.add("10.0.0.0/8".parse()?, "private");
/// tree.add("10.1.0.0/16".parse()?, "site-1");
/// assert_eq!(
///     tree.find_tags(&"10.1.2.3/32".parse()?),
///     vec![&"default", &"private", &"site-1"],
/// );
/// assert_eq!(tree.find_deepest_tag(&"10.2.0.0/16".parse()?), Some(&"private"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TagTree<P, T> {
    pub(crate) table: Table<P>,
    tags: HashMap<u64, T>,
}

/// A tag tree keyed by IPv4 prefixes (32-bit keys).
pub type TagTreeV4<T> = TagTree<crate::Ipv4Prefix, T>;

/// A tag tree keyed by IPv6 prefixes (128-bit keys).
pub type TagTreeV6<T> = TagTree<crate::Ipv6Prefix, T>;

impl<P, T> Default for TagTree<P, T>
where
    P: Prefix,
{
    fn default() -> Self {
        Self {
            table: Table::default(),
            tags: HashMap::new(),
        }
    }
}

impl<P, T> TagTree<P, T>
where
    P: Prefix,
{
    /// Create an empty tag tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of tags over all nodes.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<u32> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, 1);
    /// tree.add("10.0.0.0/8".parse()?, 2);
    /// tree.add("192.0.2.0/24".parse()?, 3);
    /// assert_eq!(tree.tag_count(), 3);
    /// # Ok(())
    /// # }
    /// ```
    pub fn tag_count(&self) -> usize {
        // released slots always carry a zero count
        self.table.slots().iter().map(|n| n.tag_count as usize).sum()
    }

    /// Returns `true` if the tree holds no tags at all.
    pub fn is_empty(&self) -> bool {
        self.tag_count() == 0
    }

    /// Add a tag at the given prefix, next to whatever tags are already
    /// stored there. Returns whether the tag count at this prefix increased
    /// (always `true` here) and the resulting number of tags at the prefix.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// assert_eq!(tree.add("10.0.0.0/8".parse()?, "private"), (true, 1));
    /// assert_eq!(tree.add("10.0.0.0/8".parse()?, "rfc1918"), (true, 2));
    /// assert_eq!(
    ///     tree.find_tags(&"10.1.2.3/32".parse()?),
    ///     vec![&"private", &"rfc1918"],
    /// );
    /// # Ok(())
    /// # }
    /// ```
    pub fn add(&mut self, prefix: P, tag: T) -> (bool, usize) {
        self.add_with(prefix, tag, None, None)
    }

    /// Add a tag at the given prefix unless `matches` reports that an equal
    /// tag is already stored there.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<u32> = TagTree::new();
    /// assert_eq!(tree.add_unique("10.0.0.0/8".parse()?, 1, |a, b| a == b), (true, 1));
    /// assert_eq!(tree.add_unique("10.0.0.0/8".parse()?, 1, |a, b| a == b), (false, 1));
    /// assert_eq!(tree.add_unique("10.0.0.0/8".parse()?, 2, |a, b| a == b), (true, 2));
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_unique<F>(&mut self, prefix: P, tag: T, matches: F) -> (bool, usize)
    where
        F: Fn(&T, &T) -> bool,
    {
        let matches: &dyn Fn(&T, &T) -> bool = &matches;
        self.add_with(prefix, tag, Some(matches), None)
    }

    /// Add a tag at the given prefix, or run `update` on the first stored
    /// tag that `matches` the new one.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<(&str, u32)> = TagTree::new();
    /// let hit = |a: &(&str, u32), b: &(&str, u32)| a.0 == b.0;
    /// fn bump<'s>(t: &(&'s str, u32)) -> (&'s str, u32) { (t.0, t.1 + 1) }
    /// assert_eq!(tree.add_or_update("10.0.0.0/8".parse()?, ("hits", 1), hit, bump), (true, 1));
    /// assert_eq!(tree.add_or_update("10.0.0.0/8".parse()?, ("hits", 1), hit, bump), (false, 1));
    /// assert_eq!(tree.find_tags(&"10.0.0.0/8".parse()?), vec![&("hits", 2)]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_or_update<F, U>(&mut self, prefix: P, tag: T, matches: F, update: U) -> (bool, usize)
    where
        F: Fn(&T, &T) -> bool,
        U: Fn(&T) -> T,
    {
        let matches: &dyn Fn(&T, &T) -> bool = &matches;
        let update: &dyn Fn(&T) -> T = &update;
        self.add_with(prefix, tag, Some(matches), Some(update))
    }

    /// Write the single value for a prefix, overwriting slot 0. Any further
    /// tags at the prefix are left in place.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<u32> = TagTree::new();
    /// assert_eq!(tree.set("10.0.0.0/8".parse()?, 1), (true, 1));
    /// assert_eq!(tree.set("10.0.0.0/8".parse()?, 2), (false, 1));
    /// assert_eq!(tree.find_tags(&"10.0.0.0/8".parse()?), vec![&2]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn set(&mut self, prefix: P, tag: T) -> (bool, usize)
    where
        T: Clone,
    {
        let replacement = tag.clone();
        let matches: &dyn Fn(&T, &T) -> bool = &|_, _| true;
        let update = move |_: &T| replacement.clone();
        let update: &dyn Fn(&T) -> T = &update;
        self.add_with(prefix, tag, Some(matches), Some(update))
    }

    /// Write the single value for a prefix, running `update` on the previous
    /// slot-0 value if one exists.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<u32> = TagTree::new();
    /// assert_eq!(tree.set_or_update("10.0.0.0/8".parse()?, 1, |t| t + 1), (true, 1));
    /// assert_eq!(tree.set_or_update("10.0.0.0/8".parse()?, 1, |t| t + 1), (false, 1));
    /// assert_eq!(tree.find_tags(&"10.0.0.0/8".parse()?), vec![&2]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_or_update<U>(&mut self, prefix: P, tag: T, update: U) -> (bool, usize)
    where
        U: Fn(&T) -> T,
    {
        let matches: &dyn Fn(&T, &T) -> bool = &|_, _| true;
        let update: &dyn Fn(&T) -> T = &update;
        self.add_with(prefix, tag, Some(matches), Some(update))
    }

    /// Remove every tag at the prefix for which `matches(stored, probe)`
    /// holds, returning how many were removed. Nodes left without tags are
    /// compacted away.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, "a");
    /// tree.add("10.0.0.0/8".parse()?, "b");
    /// assert_eq!(tree.remove(&"10.0.0.0/8".parse()?, &"a", |t, probe| t == probe), 1);
    /// assert_eq!(tree.remove(&"10.0.0.0/8".parse()?, &"a", |t, probe| t == probe), 0);
    /// assert_eq!(tree.find_tags(&"10.0.0.0/8".parse()?), vec![&"b"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn remove<F>(&mut self, prefix: &P, probe: &T, matches: F) -> usize
    where
        F: Fn(&T, &T) -> bool,
    {
        let (target_idx, parent_idx) = if prefix.prefix_len() == 0 {
            (ROOT, ROOT)
        } else {
            let mut address = prefix.clone();
            let mut parent_idx = ROOT;
            let mut node_idx = self.table.child(ROOT, address.is_left_bit_set());
            loop {
                if node_idx == 0 {
                    return 0;
                }
                let node = &self.table[node_idx];
                let match_count = node.prefix.match_count(&address);
                if match_count < node.prefix.prefix_len() {
                    // the prefix is not stored in the tree
                    return 0;
                }
                if match_count == address.prefix_len() {
                    break (node_idx, parent_idx);
                }
                parent_idx = node_idx;
                address.shift_left(match_count);
                node_idx = self.table.child(node_idx, address.is_left_bit_set());
            }
        };

        if self.table[target_idx].tag_count == 0 {
            return 0;
        }
        let matches: &dyn Fn(&T, &T) -> bool = &matches;
        let (removed, remaining) = self.delete_tags(target_idx, probe, matches);
        if remaining > 0 {
            return removed;
        }
        self.delete_node(target_idx, parent_idx);
        removed
    }

    /// Collect the tags of every stored prefix on the path covering
    /// `prefix`, ordered from the root downwards.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("0.0.0.0/0".parse()?, "default");
    /// tree.add("10.0.0.0/8".parse()?, "private");
    /// tree.add("10.1.0.0/16".parse()?, "site-1");
    /// tree.add("10.1.2.0/24".parse()?, "rack-7");
    /// assert_eq!(
    ///     tree.find_tags(&"10.1.2.3/32".parse()?),
    ///     vec![&"default", &"private", &"site-1", &"rack-7"],
    /// );
    /// assert_eq!(tree.find_tags(&"192.0.2.1/32".parse()?), vec![&"default"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn find_tags(&self, prefix: &P) -> Vec<&T> {
        self.find_tags_inner(prefix, None)
    }

    /// Like [`TagTree::find_tags`], keeping only tags accepted by `filter`.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, "private");
    /// tree.add("10.1.0.0/16".parse()?, "site-1");
    /// assert_eq!(
    ///     tree.find_tags_with_filter(&"10.1.2.3/32".parse()?, |t| t.starts_with("site")),
    ///     vec![&"site-1"],
    /// );
    /// # Ok(())
    /// # }
    /// ```
    pub fn find_tags_with_filter<F>(&self, prefix: &P, filter: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        let filter: &dyn Fn(&T) -> bool = &filter;
        self.find_tags_inner(prefix, Some(filter))
    }

    /// The first tag of the deepest stored prefix covering `prefix`, i.e.
    /// the longest-prefix match.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, "private");
    /// tree.add("10.1.0.0/16".parse()?, "site-1");
    /// assert_eq!(tree.find_deepest_tag(&"10.1.2.3/32".parse()?), Some(&"site-1"));
    /// assert_eq!(tree.find_deepest_tag(&"10.2.0.0/16".parse()?), Some(&"private"));
    /// assert_eq!(tree.find_deepest_tag(&"192.0.2.1/32".parse()?), None);
    /// # Ok(())
    /// # }
    /// ```
    pub fn find_deepest_tag(&self, prefix: &P) -> Option<&T> {
        self.deepest_node(prefix).map(|idx| self.first_tag(idx))
    }

    /// All tags of the deepest stored prefix covering `prefix`.
    ///
    /// ```
    /// # use tag_trie::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut tree: TagTreeV4<&str> = TagTree::new();
    /// tree.add("10.0.0.0/8".parse()?, "private");
    /// tree.add("10.1.0.0/16".parse()?, "site-1");
    /// tree.add("10.1.0.0/16".parse()?, "as64500");
    /// assert_eq!(
    ///     tree.find_deepest_tags(&"10.1.2.3/32".parse()?),
    ///     Some(vec![&"site-1", &"as64500"]),
    /// );
    /// assert_eq!(tree.find_deepest_tags(&"192.0.2.1/32".parse()?), None);
    /// # Ok(())
    /// # }
    /// ```
    pub fn find_deepest_tags(&self, prefix: &P) -> Option<Vec<&T>> {
        self.find_deepest_tags_inner(prefix, None)
    }

    /// Like [`TagTree::find_deepest_tags`], keeping only tags accepted by
    /// `filter`. The result is `Some` whenever a tagged node was found, even
    /// if the filter rejects all of its tags.
    pub fn find_deepest_tags_with_filter<F>(&self, prefix: &P, filter: F) -> Option<Vec<&T>>
    where
        F: Fn(&T) -> bool,
    {
        let filter: &dyn Fn(&T) -> bool = &filter;
        self.find_deepest_tags_inner(prefix, Some(filter))
    }
}

/// Private traversal and tag-store implementations.
impl<P, T> TagTree<P, T>
where
    P: Prefix,
{
    /// Add a tag to the tree, creating nodes along the path as needed.
    ///
    /// With a `matches` function, the tags already stored at the target node
    /// are scanned first: on a hit the slot is either left alone or replaced
    /// through `update`, and the count does not increase.
    fn add_with(
        &mut self,
        prefix: P,
        tag: T,
        matches: Option<&dyn Fn(&T, &T) -> bool>,
        update: Option<&dyn Fn(&T) -> T>,
    ) -> (bool, usize) {
        self.table.ensure_spare();

        let mut address = prefix;

        // tags for the zero-length prefix live on the root
        if address.prefix_len() == 0 {
            let increased = self.add_tag(ROOT, tag, matches, update);
            return (increased, self.table[ROOT].tag_count as usize);
        }

        // the root carries no prefix bits, so pick the starting child by the
        // first bit of the address
        let start_right = address.is_left_bit_set();
        let mut node_idx = self.table.child(ROOT, start_right);
        if node_idx == 0 {
            let new_idx = self.table.alloc(address);
            let increased = self.add_tag(new_idx, tag, matches, update);
            self.table.set_child(ROOT, start_right, new_idx);
            return (increased, self.table[new_idx].tag_count as usize);
        }
        let mut parent_idx = ROOT;

        loop {
            if node_idx == 0 {
                panic!("descended into the null node");
            }
            let node_len = self.table[node_idx].prefix.prefix_len();
            if node_len == 0 {
                panic!("reached a non-root node with an empty prefix");
            }

            let match_count = self.table[node_idx].prefix.match_count(&address);
            if match_count == 0 {
                panic!("descended into a child sharing no prefix bits with the address");
            }

            if match_count == address.prefix_len() {
                // every remaining address bit matched
                if match_count == node_len {
                    // the node's whole prefix matched as well: this is the spot
                    let increased = self.add_tag(node_idx, tag, matches, update);
                    return (increased, self.table[node_idx].tag_count as usize);
                }

                // the address ends inside this node's prefix: insert an
                // intermediate node carrying the remaining address above it
                let new_idx = self.table.alloc(address);
                let increased = self.add_tag(new_idx, tag, matches, update);
                let node = &mut self.table[node_idx];
                node.prefix.shift_left(match_count);
                let node_right = node.prefix.is_left_bit_set();
                self.table.set_child(new_idx, node_right, node_idx);
                self.replace_child(parent_idx, node_idx, new_idx);
                return (increased, self.table[new_idx].tag_count as usize);
            }

            if match_count == node_len {
                // the node's whole prefix matched, keep descending
                address.shift_left(match_count);
                let right = address.is_left_bit_set();
                let child = self.table.child(node_idx, right);
                if child == 0 {
                    let new_idx = self.table.alloc(address);
                    let increased = self.add_tag(new_idx, tag, matches, update);
                    self.table.set_child(node_idx, right, new_idx);
                    return (increased, self.table[new_idx].tag_count as usize);
                }
                parent_idx = node_idx;
                node_idx = child;
                continue;
            }

            // partial match on both sides: split the node at the shared bits
            let branch_prefix = P::from_repr_len(address.repr(), match_count);
            let branch_idx = self.table.alloc(branch_prefix);
            address.shift_left(match_count);
            let leaf_idx = self.table.alloc(address);
            let increased = self.add_tag(leaf_idx, tag, matches, update);
            let node = &mut self.table[node_idx];
            node.prefix.shift_left(match_count);
            // the two siblings are guaranteed to differ in their first bit
            let node_right = node.prefix.is_left_bit_set();
            self.table.set_child(branch_idx, node_right, node_idx);
            self.table.set_child(branch_idx, !node_right, leaf_idx);
            self.replace_child(parent_idx, node_idx, branch_idx);
            return (increased, self.table[leaf_idx].tag_count as usize);
        }
    }

    /// Swap `old` for `new` in whichever child slot of `parent_idx` holds it.
    fn replace_child(&mut self, parent_idx: u32, old: u32, new: u32) {
        let parent = &mut self.table[parent_idx];
        if parent.left == old {
            parent.left = new;
        } else if parent.right == old {
            parent.right = new;
        } else {
            panic!("node is neither the left nor the right child of its parent");
        }
    }

    /// Compact the tree around the tagless node `target_idx`, releasing
    /// every node that gets unlinked.
    pub(crate) fn delete_node(&mut self, target_idx: u32, parent_idx: u32) -> DeleteOutcome {
        if target_idx == ROOT {
            // the root stays, even without tags
            return DeleteOutcome::NotDeleted;
        }

        let (target_left, target_right) = {
            let target = &self.table[target_idx];
            (target.left, target.right)
        };

        if target_left != 0 && target_right != 0 {
            // still a branch point
            return DeleteOutcome::NotDeleted;
        }

        if target_left != 0 || target_right != 0 {
            // a single child takes the target's place, with its prefix
            // extended by the target's
            let child_idx = if target_left != 0 { target_left } else { target_right };
            let merged = self.table[target_idx].prefix.merge(&self.table[child_idx].prefix);
            self.table[child_idx].prefix = merged;
            self.replace_child(parent_idx, target_idx, child_idx);
            self.table.release(target_idx);
            return DeleteOutcome::ReplacedByChild;
        }

        // the target is a leaf: unhook it from the parent
        let was_left = self.table[parent_idx].left == target_idx;
        if !was_left && self.table[parent_idx].right != target_idx {
            panic!("node is neither the left nor the right child of its parent");
        }
        self.table.set_child(parent_idx, !was_left, 0);
        self.table.release(target_idx);

        let sibling_idx = self.table.child(parent_idx, was_left);
        if parent_idx != ROOT && self.table[parent_idx].tag_count == 0 && sibling_idx != 0 {
            // the parent became a tagless pass-through: absorb the sibling
            let merged = self.table[parent_idx].prefix.merge(&self.table[sibling_idx].prefix);
            self.table[parent_idx].prefix = merged;
            self.move_tags(sibling_idx, parent_idx);
            let (sibling_left, sibling_right) = {
                let sibling = &self.table[sibling_idx];
                (sibling.left, sibling.right)
            };
            self.table[parent_idx].left = sibling_left;
            self.table[parent_idx].right = sibling_right;
            self.table.release(sibling_idx);
            return DeleteOutcome::ParentMergedSibling;
        }
        DeleteOutcome::Removed
    }

    /// Walk towards `prefix`, remembering the last tag-bearing node.
    fn deepest_node(&self, prefix: &P) -> Option<u32> {
        let mut address = prefix.clone();
        let mut deepest = (self.table[ROOT].tag_count > 0).then_some(ROOT);
        if address.prefix_len() == 0 {
            return deepest;
        }
        let mut node_idx = self.table.child(ROOT, address.is_left_bit_set());
        loop {
            if node_idx == 0 {
                return deepest;
            }
            let node = &self.table[node_idx];
            let match_count = node.prefix.match_count(&address);
            if match_count < node.prefix.prefix_len() {
                return deepest;
            }
            if node.tag_count > 0 {
                deepest = Some(node_idx);
            }
            if match_count == address.prefix_len() {
                return deepest;
            }
            address.shift_left(match_count);
            node_idx = self.table.child(node_idx, address.is_left_bit_set());
        }
    }

    fn find_tags_inner<'a>(&'a self, prefix: &P, filter: Option<&dyn Fn(&T) -> bool>) -> Vec<&'a T> {
        let mut ret = Vec::new();
        let mut address = prefix.clone();
        self.tags_for_node(&mut ret, ROOT, filter);
        if address.prefix_len() == 0 {
            return ret;
        }
        let mut node_idx = self.table.child(ROOT, address.is_left_bit_set());
        loop {
            if node_idx == 0 {
                return ret;
            }
            let node = &self.table[node_idx];
            let match_count = node.prefix.match_count(&address);
            if match_count < node.prefix.prefix_len() {
                // the node only partially matches, nothing below can match
                return ret;
            }
            self.tags_for_node(&mut ret, node_idx, filter);
            if match_count == address.prefix_len() {
                return ret;
            }
            address.shift_left(match_count);
            node_idx = self.table.child(node_idx, address.is_left_bit_set());
        }
    }

    fn find_deepest_tags_inner<'a>(
        &'a self,
        prefix: &P,
        filter: Option<&dyn Fn(&T) -> bool>,
    ) -> Option<Vec<&'a T>> {
        self.deepest_node(prefix).map(|idx| {
            let mut ret = Vec::new();
            self.tags_for_node(&mut ret, idx, filter);
            ret
        })
    }

    /// Append a tag at the node's next free slot, unless `matches` finds it
    /// already present. Returns whether the count increased.
    fn add_tag(
        &mut self,
        idx: u32,
        tag: T,
        matches: Option<&dyn Fn(&T, &T) -> bool>,
        update: Option<&dyn Fn(&T) -> T>,
    ) -> bool {
        let count = self.table[idx].tag_count;
        if let Some(matches) = matches {
            for slot in 0..count {
                let key = tag_key(idx, slot);
                if matches(&self.tags[&key], &tag) {
                    if let Some(update) = update {
                        let updated = update(&self.tags[&key]);
                        self.tags.insert(key, updated);
                    }
                    return false;
                }
            }
        }
        self.tags.insert(tag_key(idx, count), tag);
        self.table[idx].tag_count = count + 1;
        true
    }

    /// Append the node's tags to `ret`, in slot order.
    pub(crate) fn tags_for_node<'a>(
        &'a self,
        ret: &mut Vec<&'a T>,
        idx: u32,
        filter: Option<&dyn Fn(&T) -> bool>,
    ) {
        if idx == 0 {
            return;
        }
        for slot in 0..self.table[idx].tag_count {
            let tag = &self.tags[&tag_key(idx, slot)];
            if filter.map_or(true, |f| f(tag)) {
                ret.push(tag);
            }
        }
    }

    fn first_tag(&self, idx: u32) -> &T {
        &self.tags[&tag_key(idx, 0)]
    }

    /// Move every tag of `from` to the end of `to`'s slots, leaving `from`
    /// empty.
    fn move_tags(&mut self, from: u32, to: u32) {
        let from_count = self.table[from].tag_count;
        let to_count = self.table[to].tag_count;
        for slot in 0..from_count {
            let tag = self.tags.remove(&tag_key(from, slot)).unwrap();
            self.tags.insert(tag_key(to, to_count + slot), tag);
        }
        self.table[to].tag_count += from_count;
        self.table[from].tag_count = 0;
    }

    /// Remove every tag at `idx` matching the probe, renumbering the
    /// survivors so slots stay dense. Returns how many were removed and how
    /// many remain.
    pub(crate) fn delete_tags(
        &mut self,
        idx: u32,
        probe: &T,
        matches: &dyn Fn(&T, &T) -> bool,
    ) -> (usize, u32) {
        let count = self.table[idx].tag_count;
        let mut removed = 0;
        let mut kept = 0u32;
        for slot in 0..count {
            let tag = self.tags.remove(&tag_key(idx, slot)).unwrap();
            if matches(&tag, probe) {
                removed += 1;
            } else {
                self.tags.insert(tag_key(idx, kept), tag);
                kept += 1;
            }
        }
        self.table[idx].tag_count = kept;
        (removed, kept)
    }

    /// Number of live nodes reachable from the root, the root included.
    pub(crate) fn node_count(&self) -> usize {
        self.count_from(ROOT)
    }

    fn count_from(&self, idx: u32) -> usize {
        let node = &self.table[idx];
        let mut count = 1;
        if node.left != 0 {
            count += self.count_from(node.left);
        }
        if node.right != 0 {
            count += self.count_from(node.right);
        }
        count
    }
}

impl<P, T> PartialEq for TagTree<P, T>
where
    P: Prefix + PartialEq,
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        let mut lhs = self.iter();
        let mut rhs = other.iter();
        loop {
            match (lhs.next(), rhs.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b => {}
                _ => return false,
            }
        }
    }
}

impl<P, T> Eq for TagTree<P, T>
where
    P: Prefix + Eq,
    T: Eq,
{
}

impl<P, T> FromIterator<(P, T)> for TagTree<P, T>
where
    P: Prefix,
{
    fn from_iter<I: IntoIterator<Item = (P, T)>>(iter: I) -> Self {
        let mut tree = Self::new();
        iter.into_iter().for_each(|(p, t)| {
            tree.add(p, t);
        });
        tree
    }
}
