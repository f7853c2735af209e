use std::sync::Arc;

use block_index::{
    new_node, BooleanIndex, Decision, FullRangeIndex, IndexTreeNode, IndexType,
    IndexTypeRegistry, Predicate, RangeIndex, StatisticIndex, StringRangeIndex,
};
use proptest::prelude::*;
use test_helpers::maybe_start_logging;

/// One block's tree for rows `(id, city, ok)`.
fn block(rows: &[(i64, &str, Option<bool>)]) -> IndexTreeNode {
    let mut root = new_node();
    root.get_or_create_child("id").unwrap().set_statistic(
        RangeIndex::<i64>::from_values(rows.iter().map(|(id, _, _)| *id)).into(),
    );
    root.get_or_create_child("city").unwrap().set_statistic(
        StringRangeIndex::from_values(rows.iter().map(|(_, city, _)| *city)).into(),
    );
    root.get_or_create_child("ok").unwrap().set_statistic(
        BooleanIndex::from_values(rows.iter().map(|(_, _, ok)| *ok)).into(),
    );
    root
}

#[test]
fn reference_scenarios() {
    maybe_start_logging();

    let mut root = new_node();
    root.get_or_create_child("i")
        .unwrap()
        .set_statistic(RangeIndex::<i32>::new(10, 20).into());
    root.get_or_create_child("s")
        .unwrap()
        .set_statistic(StringRangeIndex::new("10", "20").into());
    root.get_or_create_child("b")
        .unwrap()
        .set_statistic(BooleanIndex::new(true, true, false).into());
    root.get_or_create_child("f")
        .unwrap()
        .set_statistic(BooleanIndex::new(false, true, false).into());
    let root = IndexTreeNode::deserialize(&root.serialize()).unwrap();

    use Decision::*;
    let cases = [
        (&["i"], Predicate::equal(21), Skip),
        (&["i"], Predicate::equal(15), MustRead),
        (&["i"], Predicate::lt(10), Skip),
        (&["i"], Predicate::le(10), MustRead),
        (&["i"], Predicate::gt(20), Skip),
        (&["i"], Predicate::ge(21), Skip),
        (&["i"], Predicate::number_range(10, true, 10, true), MustRead),
        (&["i"], Predicate::number_range(9, true, 9, true), Skip),
        (
            &["i"],
            Predicate::number_range(9, true, 9, true).inverted(),
            MustRead,
        ),
        (
            &["i"],
            Predicate::number_range(30, true, 40, false).inverted(),
            MustRead,
        ),
        (&["s"], Predicate::perfect("15"), MustRead),
        (&["s"], Predicate::perfect("09"), Skip),
        (&["b"], Predicate::Boolean(true), MustRead),
        (&["f"], Predicate::Boolean(true), Skip),
    ];
    for (path, predicate, expected) in cases {
        assert_eq!(root.evaluate(path, &predicate), expected, "{path:?} {predicate:?}");
    }
}

#[test]
fn long_into_int_disables_path() {
    let mut root = new_node();
    let column = root.get_or_create_child("v").unwrap();
    column.set_statistic(RangeIndex::<i32>::new(10, 20).into());
    column.set_statistic(RangeIndex::<i64>::new(10, 20).into());

    // terminal: a matching type no longer revives it
    root.get_or_create_child("v")
        .unwrap()
        .set_statistic(RangeIndex::<i32>::new(10, 20).into());

    for tree in [
        root.clone(),
        IndexTreeNode::deserialize(&root.serialize()).unwrap(),
    ] {
        assert_eq!(tree.evaluate(&["v"], &Predicate::equal(500)), Decision::MustRead);
        assert_eq!(tree.evaluate(&["v"], &Predicate::lt(-1)), Decision::MustRead);
    }
}

#[test]
fn compaction_merges_blocks() {
    let a = block(&[(1, "berlin", Some(true)), (5, "paris", None)]);
    let b = block(&[(9, "athens", Some(true)), (12, "rome", Some(true))]);

    let mut merged = IndexTreeNode::deserialize(&a.serialize()).unwrap();
    merged.merge(IndexTreeNode::deserialize(&b.serialize()).unwrap());

    assert_eq!(
        merged.find(&["id"]).unwrap().statistic(),
        &RangeIndex::<i64>::new(1, 12).into()
    );
    assert_eq!(
        merged.find(&["city"]).unwrap().statistic(),
        &StringRangeIndex::new("athens", "rome").into()
    );
    assert_eq!(
        merged.evaluate(&["ok"], &Predicate::Boolean(false)),
        Decision::Skip
    );
    assert_eq!(merged.evaluate(&["ok"], &Predicate::IsNull), Decision::MustRead);
    assert_eq!(
        merged.evaluate(&["city"], &Predicate::forward("z")),
        Decision::Skip
    );

    // order does not matter
    let mut reversed = b.clone();
    reversed.merge(a.clone());
    assert_eq!(reversed, merged);
}

#[test]
fn row_group_slots() {
    let groups = [(0, 0_i64, 99_i64), (1, 100, 199), (2, 200, 299), (3, 50, 250)];
    let mut spreads = FullRangeIndex::default();
    for (slot, min, max) in groups {
        spreads.push(slot, RangeIndex::new(min, max));
    }
    let mut root = new_node();
    root.get_or_create_child("ts")
        .unwrap()
        .set_statistic(spreads.into());
    let root = IndexTreeNode::deserialize(&root.serialize()).unwrap();

    assert_eq!(
        root.evaluate_slots(&["ts"], &Predicate::equal(150)),
        Some(vec![1, 3])
    );
    assert_eq!(
        root.evaluate_slots(&["ts"], &Predicate::number_range(260, true, 400, true)),
        Some(vec![2])
    );
    assert_eq!(
        root.evaluate_slots(&["ts"], &Predicate::gt(299)),
        Some(vec![])
    );
    assert_eq!(root.evaluate(&["ts"], &Predicate::gt(299)), Decision::Skip);
    assert_eq!(root.evaluate(&["ts"], &Predicate::gt(298)), Decision::MustRead);
}

#[test]
fn concurrent_registry_resolution() {
    let registry = Arc::new(IndexTypeRegistry::new());
    std::thread::scope(|s| {
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            s.spawn(move || {
                for index_type in IndexType::ALL {
                    let statistic = registry.resolve(index_type.identifier()).unwrap();
                    assert_eq!(statistic.index_type(), index_type);
                }
            });
        }
    });
}

#[test]
fn concurrent_decoding() {
    let bytes = block(&[(1, "berlin", Some(true)), (7, "oslo", Some(false))]).serialize();
    std::thread::scope(|s| {
        for _ in 0..8 {
            let bytes = &bytes;
            s.spawn(move || {
                let tree = IndexTreeNode::deserialize(bytes).unwrap();
                assert_eq!(tree.evaluate(&["id"], &Predicate::gt(7)), Decision::Skip);
            });
        }
    });
}

fn arb_values() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000_i64..1_000, 1..20)
}

proptest! {
    /// Whatever order blocks are merged in, a skip never hides a present value.
    #[test]
    fn merged_trees_never_skip_present_values(
        blocks in prop::collection::vec(arb_values(), 1..6),
        probe in -1_100_i64..1_100,
    ) {
        let mut trees = blocks.iter().map(|values| {
            let mut tree = new_node();
            tree.get_or_create_child("x")
                .unwrap()
                .set_statistic(RangeIndex::<i64>::from_values(values.iter().copied()).into());
            IndexTreeNode::deserialize(&tree.serialize()).unwrap()
        });
        let mut merged = trees.next().unwrap();
        for tree in trees {
            merged.merge(tree);
        }

        let present = blocks.iter().flatten().any(|v| *v == probe);
        let decision = merged.evaluate(&["x"], &Predicate::equal(probe));
        if present {
            prop_assert_eq!(decision, Decision::MustRead);
        }

        let below = blocks.iter().flatten().any(|v| *v < probe);
        if below {
            prop_assert_eq!(merged.evaluate(&["x"], &Predicate::lt(probe)), Decision::MustRead);
        }
    }

    /// A statistic of any other variant turns the path into "always read".
    #[test]
    fn any_mismatch_disables(first in 0..9_usize, second in 0..9_usize) {
        let registry = IndexTypeRegistry::global();
        let types: Vec<_> = IndexType::ALL
            .into_iter()
            .filter(|t| *t != IndexType::Unsupported)
            .collect();
        let mut node = new_node();
        node.set_statistic(registry.new_instance(types[first]));
        node.set_statistic(registry.new_instance(types[second]));
        prop_assert_eq!(node.is_disabled(), first != second);
        if node.is_disabled() {
            prop_assert_eq!(node.statistic(), &StatisticIndex::Unsupported);
        }
    }
}
