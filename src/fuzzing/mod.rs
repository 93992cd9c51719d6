//! Module for testing using fuzzing (quickcheck)
#![allow(clippy::type_complexity)]

use std::collections::HashMap;
use std::fmt::Debug;

use quickcheck::Arbitrary;

use crate::test::check_invariants;
use crate::*;

mod basic;
mod cursor;

/// A tree mutation, with tags drawn from a tiny domain so removals actually
/// hit stored values.
#[derive(Debug, PartialEq, Clone, Copy)]
enum Operation<P> {
    Add(P, i32),
    Remove(P, i32),
}

#[cfg(miri)]
const DEFAULT_NUM_TESTS: usize = 10;
#[cfg(not(miri))]
const DEFAULT_NUM_TESTS: usize = 1000;
const DEFAULT_GEN_SIZE: usize = 100;

fn proptest_runner<A: Arbitrary + Debug + PartialEq, F: Fn(A) -> bool>(f: F) {
    let num_tests: usize = std::env::var("QUICKCHECK_TESTS")
        .ok()
        .and_then(|x| x.parse::<usize>().ok())
        .unwrap_or(DEFAULT_NUM_TESTS);

    let gen_size: usize = std::env::var("QUICKCHECK_GENERATOR_SIZE")
        .ok()
        .and_then(|x| x.parse::<usize>().ok())
        .unwrap_or(DEFAULT_GEN_SIZE);

    let mut gen = quickcheck::Gen::new(gen_size);

    // sample all inputs
    for _ in 0..num_tests {
        let input = A::arbitrary(&mut gen);
        let input_c = input.clone();
        let success = f(input_c);
        if !success {
            shrink_failure(f, input)
        }
    }
}

fn shrink_failure<A: Arbitrary + Debug + PartialEq, F: Fn(A) -> bool>(f: F, input: A) -> ! {
    for i in input.shrink() {
        let i_c = i.clone();
        let success = f(i_c);
        if !success {
            shrink_failure(f, i)
        }
    }
    // if we reach this point, then all shrunken inputs work. Therefore, `inputs` is the minimal
    // input
    panic!(
        "[QUICKCHECK] Test case failed!\n  Minimal input:\n    {:?}",
        input
    );
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! qc {
    ($name:ident, $f:ident) => {
        #[test]
        fn $name() {
            proptest_runner($f)
        }
    };
}

/// Run a list of operations against both the tree and a plain map model.
/// The model keeps the tags of each prefix in slot order.
fn build<P>(ops: Vec<Operation<P>>) -> (TagTree<P, i32>, HashMap<P, Vec<i32>>)
where
    P: Prefix + Eq + std::hash::Hash,
{
    let mut tree = TagTree::new();
    let mut model: HashMap<P, Vec<i32>> = HashMap::new();
    for op in ops {
        match op {
            Operation::Add(p, t) => {
                tree.add(p.clone(), t);
                model.entry(p).or_default().push(t);
            }
            Operation::Remove(p, t) => {
                let removed = tree.remove(&p, &t, |a, b| a == b);
                let list = model.entry(p.clone()).or_default();
                let kept: Vec<i32> = list.iter().copied().filter(|x| *x != t).collect();
                assert_eq!(removed, list.len() - kept.len());
                if kept.is_empty() {
                    model.remove(&p);
                } else {
                    *list = kept;
                }
            }
        }
    }
    (tree, model)
}

impl Arbitrary for Ipv4Prefix {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        // short lengths dominate, so that prefixes overlap often
        #[rustfmt::skip]
        let len: u8 = *g
            .choose(&[
                0,
                1, 1,
                2, 2, 2,
                3, 3, 3, 3,
                4, 4, 4, 4, 4,
                5, 5, 5, 5, 5, 5,
                6, 6, 6, 6, 6, 6, 6,
                7, 7, 7, 7, 7, 7, 7, 7,
                8, 8, 8, 8, 8, 8, 8, 8, 8,
                9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
            ])
            .unwrap();
        Self::from_repr_len(u32::arbitrary(g), len)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        if self.prefix_len() == 0 {
            quickcheck::empty_shrinker()
        } else {
            quickcheck::single_shrinker(Self::from_repr_len(self.repr(), self.prefix_len() - 1))
        }
    }
}

impl Arbitrary for Ipv6Prefix {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        // besides short lengths, stress the 64-bit word boundary and the
        // full width
        #[rustfmt::skip]
        let len: u8 = *g
            .choose(&[
                0, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9,
                62, 63, 64, 65, 66,
                126, 127, 128,
            ])
            .unwrap();
        // keep the entropy low so long prefixes still collide
        let repr = ((u8::arbitrary(g) as u128) << 120)
            | (((u8::arbitrary(g) & 0x7) as u128) << 62)
            | ((u8::arbitrary(g) & 0x3) as u128);
        Self::from_repr_len(repr, len)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        if self.prefix_len() == 0 {
            quickcheck::empty_shrinker()
        } else {
            quickcheck::single_shrinker(Self::from_repr_len(self.repr(), self.prefix_len() - 1))
        }
    }
}

impl<P: Arbitrary> Arbitrary for Operation<P> {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let p = P::arbitrary(g);
        let t = i32::from(u8::arbitrary(g) & 0x3);
        if g.choose(&[
            true, true, true, true, true, true, true, false, false, false,
        ])
        .copied()
        .unwrap_or_default()
        {
            Self::Add(p, t)
        } else {
            Self::Remove(p, t)
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Operation::Add(p, t) => {
                let t = *t;
                Box::new(p.shrink().map(move |p| Operation::Add(p, t)))
            }
            Operation::Remove(p, t) => {
                let t = *t;
                Box::new(p.shrink().map(move |p| Operation::Remove(p, t)))
            }
        }
    }
}
