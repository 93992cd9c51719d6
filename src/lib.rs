//! This crate provides a compressed binary (Patricia) trie indexed by IP
//! prefixes, mapping each inserted prefix to one or more payload values
//! ("tags"). It is the building block of a routing / ACL / geo-IP tag
//! engine: given an address, return every tag whose CIDR contains it.
//!
//! # Description of the tree
//!
//! Every node carries the bits it contributes below its parent, so a lookup
//! consumes the address from the left as it descends and never compares a
//! bit twice. Non-branching paths are compressed into a single node. Nodes
//! live in an index-based arena with a free-list: deleting a prefix returns
//! its slots to the arena, and later insertions reuse them without moving
//! any other node.
//!
//! A prefix can hold any number of tags. Uniqueness is the caller's choice:
//! [`TagTree::add`] always appends, while [`TagTree::add_unique`] and
//! friends take a match function that decides whether an equal tag is
//! already present.
//!
//! # Operations on the tree
//!
//! - [`TagTree::find_tags`] collects the tags of every stored prefix on the
//!   path covering an address, root first.
//! - [`TagTree::find_deepest_tag`] and [`TagTree::find_deepest_tags`]
//!   perform longest-prefix match.
//! - [`TagTree::remove`] deletes tags selected by a match function and
//!   compacts the tree, merging pass-through nodes with their only child or
//!   their remaining sibling.
//! - [`TagTree::iter`] walks all tag-bearing nodes in pre-order, and
//!   [`TagTree::cursor`] does the same while allowing deletion at the
//!   current position.
//!
//! The two key widths share one implementation: [`TagTreeV4`] stores IPv4
//! prefixes ([`Ipv4Prefix`], 32-bit keys) and [`TagTreeV6`] stores IPv6
//! prefixes ([`Ipv6Prefix`], 128-bit keys).
//!
//! ```
//! use tag_trie::TagTreeV4;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = TagTreeV4::new();
//! tree.add("0.0.0.0/0".parse()?, "everywhere");
//! tree.add("203.0.113.0/24".parse()?, "test-net");
//!
//! assert_eq!(
//!     tree.find_tags(&"203.0.113.99/32".parse()?),
//!     vec![&"everywhere", &"test-net"],
//! );
//! assert_eq!(tree.find_deepest_tag(&"198.51.100.1/32".parse()?), Some(&"everywhere"));
//! # Ok(())
//! # }
//! ```

mod address;
mod fmt;
mod inner;
mod tree;

#[cfg(test)]
mod fuzzing;

pub use address::{parse_prefix, prefix_from_ip, Ipv4Prefix, Ipv6Prefix, Prefix, PrefixError};
pub use tree::{Cursor, Iter, TagTree, TagTreeV4, TagTreeV6};

// re-exported because `parse_prefix` returns an `either::Either`
pub use either;
