use std::collections::HashMap;

use super::*;

qc!(cursor_matches_iter, _cursor_matches_iter);
fn _cursor_matches_iter(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (mut tree, _) = build(ops);
    let want: Vec<(Ipv4Prefix, Vec<i32>)> = tree
        .iter()
        .map(|(p, tags)| (p, tags.into_iter().copied().collect()))
        .collect();

    let mut got = Vec::new();
    let mut cursor = tree.cursor();
    while cursor.move_next() {
        got.push((
            cursor.address(),
            cursor.tags().into_iter().copied().collect::<Vec<i32>>(),
        ));
    }
    got == want
}

qc!(cursor_delete_matches_model, _cursor_delete_matches_model);
fn _cursor_delete_matches_model((ops, victim): (Vec<Operation<Ipv4Prefix>>, u8)) -> bool {
    let victim = i32::from(victim & 0x3);
    let (mut tree, model) = build(ops);

    let mut removed = 0;
    let mut cursor = tree.cursor();
    while cursor.move_next() {
        removed += cursor.remove(&victim, |a, b| a == b);
    }
    check_invariants(&tree);

    let want_removed: usize = model
        .values()
        .flat_map(|tags| tags.iter())
        .filter(|t| **t == victim)
        .count();
    let want: HashMap<Ipv4Prefix, Vec<i32>> = model
        .into_iter()
        .map(|(p, tags)| (p, tags.into_iter().filter(|t| *t != victim).collect::<Vec<i32>>()))
        .filter(|(_, tags)| !tags.is_empty())
        .collect();
    let got: HashMap<Ipv4Prefix, Vec<i32>> = tree
        .iter()
        .map(|(p, tags)| (p, tags.into_iter().copied().collect()))
        .collect();

    removed == want_removed
        && tree.tag_count() == want.values().map(Vec::len).sum::<usize>()
        && got == want
}

qc!(cursor_delete_matches_model_v6, _cursor_delete_matches_model_v6);
fn _cursor_delete_matches_model_v6((ops, victim): (Vec<Operation<Ipv6Prefix>>, u8)) -> bool {
    let victim = i32::from(victim & 0x3);
    let (mut tree, model) = build(ops);

    let mut removed = 0;
    let mut cursor = tree.cursor();
    while cursor.move_next() {
        removed += cursor.remove(&victim, |a, b| a == b);
    }
    check_invariants(&tree);

    let want_removed: usize = model
        .values()
        .flat_map(|tags| tags.iter())
        .filter(|t| **t == victim)
        .count();
    let want: HashMap<Ipv6Prefix, Vec<i32>> = model
        .into_iter()
        .map(|(p, tags)| (p, tags.into_iter().filter(|t| *t != victim).collect::<Vec<i32>>()))
        .filter(|(_, tags)| !tags.is_empty())
        .collect();
    let got: HashMap<Ipv6Prefix, Vec<i32>> = tree
        .iter()
        .map(|(p, tags)| (p, tags.into_iter().copied().collect()))
        .collect();

    removed == want_removed
        && tree.tag_count() == want.values().map(Vec::len).sum::<usize>()
        && got == want
}

qc!(cursor_delete_everything, _cursor_delete_everything);
fn _cursor_delete_everything(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (mut tree, model) = build(ops);
    let total: usize = model.values().map(Vec::len).sum();

    let mut removed = 0;
    let mut cursor = tree.cursor();
    while cursor.move_next() {
        removed += cursor.remove(&0, |_, _| true);
    }
    check_invariants(&tree);

    removed == total && tree.is_empty() && tree.node_count() == 1
}
