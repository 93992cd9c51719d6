//! Formatting implementation for the TagTree.

use std::fmt::{Debug, Formatter, Result};

use crate::inner::ROOT;
use crate::{Prefix, TagTree};

impl<P: Prefix + Debug, T: Debug> Debug for TagTree<P, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        DebugNode(self, ROOT, P::zero()).fmt(f)
    }
}

struct DebugNode<'a, P, T>(&'a TagTree<P, T>, u32, P);

impl<P: Prefix + Debug, T: Debug> Debug for DebugNode<'_, P, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let tree = self.0;
        let node = &tree.table[self.1];
        let full = self.2.merge(&node.prefix);
        let mut tags: Vec<&T> = Vec::new();
        tree.tags_for_node(&mut tags, self.1, None);
        match (tags.is_empty(), node.left, node.right) {
            (true, 0, 0) => full.fmt(f),
            (true, child, 0) | (true, 0, child) => f
                .debug_map()
                .entry(&full, &DebugNode(tree, child, full.clone()))
                .finish(),
            (true, left, right) => f
                .debug_map()
                .entry(
                    &full,
                    &(
                        DebugNode(tree, left, full.clone()),
                        DebugNode(tree, right, full.clone()),
                    ),
                )
                .finish(),
            (false, 0, 0) => f.debug_map().entry(&full, &tags).finish(),
            (false, child, 0) | (false, 0, child) => f
                .debug_map()
                .entry(&full, &(&tags, DebugNode(tree, child, full.clone())))
                .finish(),
            (false, left, right) => f
                .debug_map()
                .entry(
                    &full,
                    &(
                        &tags,
                        DebugNode(tree, left, full.clone()),
                        DebugNode(tree, right, full.clone()),
                    ),
                )
                .finish(),
        }
    }
}
