use itertools::Itertools;

use super::*;

qc!(invariants_hold, _invariants_hold);
fn _invariants_hold(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, _) = build(ops);
    check_invariants(&tree);
    true
}

qc!(invariants_hold_v6, _invariants_hold_v6);
fn _invariants_hold_v6(ops: Vec<Operation<Ipv6Prefix>>) -> bool {
    let (tree, _) = build(ops);
    check_invariants(&tree);
    true
}

qc!(find_tags_matches_model, _find_tags_matches_model);
fn _find_tags_matches_model(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, model) = build(ops);
    model.keys().all(|probe| {
        let want: Vec<i32> = model
            .iter()
            .filter(|(p, _)| p.contains(probe))
            .flat_map(|(_, tags)| tags.iter().copied())
            .sorted()
            .collect();
        let got: Vec<i32> = tree.find_tags(probe).into_iter().copied().sorted().collect();
        got == want
    })
}

qc!(find_tags_matches_model_v6, _find_tags_matches_model_v6);
fn _find_tags_matches_model_v6(ops: Vec<Operation<Ipv6Prefix>>) -> bool {
    let (tree, model) = build(ops);
    model.keys().all(|probe| {
        let want: Vec<i32> = model
            .iter()
            .filter(|(p, _)| p.contains(probe))
            .flat_map(|(_, tags)| tags.iter().copied())
            .sorted()
            .collect();
        let got: Vec<i32> = tree.find_tags(probe).into_iter().copied().sorted().collect();
        got == want
    })
}

qc!(deepest_matches_model, _deepest_matches_model);
fn _deepest_matches_model(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, model) = build(ops);
    model.keys().all(|probe| {
        // the covering prefixes are totally ordered, so the longest is unique
        let want = model
            .iter()
            .filter(|(p, _)| p.contains(probe))
            .max_by_key(|(p, _)| p.prefix_len())
            .map(|(_, tags)| tags[0]);
        tree.find_deepest_tag(probe).copied() == want
    })
}

qc!(deepest_tags_match_model, _deepest_tags_match_model);
fn _deepest_tags_match_model(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, model) = build(ops);
    model.keys().all(|probe| {
        let want = model
            .iter()
            .filter(|(p, _)| p.contains(probe))
            .max_by_key(|(p, _)| p.prefix_len())
            .map(|(_, tags)| tags.clone());
        let got = tree
            .find_deepest_tags(probe)
            .map(|tags| tags.into_iter().copied().collect::<Vec<i32>>());
        got == want
    })
}

qc!(tag_count_matches_model, _tag_count_matches_model);
fn _tag_count_matches_model(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, model) = build(ops);
    tree.tag_count() == model.values().map(Vec::len).sum::<usize>()
}

qc!(iter_yields_everything, _iter_yields_everything);
fn _iter_yields_everything(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, model) = build(ops);
    let got: Vec<(Ipv4Prefix, Vec<i32>)> = tree
        .iter()
        .map(|(p, tags)| (p, tags.into_iter().copied().collect()))
        .collect();
    // every tag-bearing node shows up exactly once, with its tags in order
    got.iter().map(|(p, _)| p).all_unique()
        && got.len() == model.len()
        && got.into_iter().all(|(p, tags)| model.get(&p) == Some(&tags))
}

qc!(iter_is_preorder, _iter_is_preorder);
fn _iter_is_preorder(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, _) = build(ops);
    // in pre-order, a covering prefix is always yielded before the covered
    let prefixes: Vec<Ipv4Prefix> = tree.iter().map(|(p, _)| p).collect();
    prefixes.iter().enumerate().all(|(i, p)| {
        prefixes[i + 1..]
            .iter()
            .all(|later| !later.contains(p) || later == p)
    })
}

qc!(add_remove_roundtrip, _add_remove_roundtrip);
fn _add_remove_roundtrip((ops, extra): (Vec<Operation<Ipv4Prefix>>, Ipv4Prefix)) -> bool {
    let (mut tree, _) = build(ops);
    let reference = tree.clone();
    let nodes = tree.node_count();

    // 99 is outside the generated tag domain, so the removal is exact
    tree.add(extra, 99);
    tree.remove(&extra, &99, |a, b| a == b) == 1
        && tree == reference
        && tree.node_count() == nodes
}

qc!(clone_equals_rebuilt, _clone_equals_rebuilt);
fn _clone_equals_rebuilt(ops: Vec<Operation<Ipv4Prefix>>) -> bool {
    let (tree, _) = build(ops);
    let rebuilt: TagTree<Ipv4Prefix, i32> = tree
        .iter()
        .flat_map(|(p, tags)| tags.into_iter().map(move |t| (p, *t)).collect::<Vec<_>>())
        .collect();
    tree == tree.clone() && tree == rebuilt
}
