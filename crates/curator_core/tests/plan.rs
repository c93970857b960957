use curator_core::{plan_moves, MemoryTree, NodeId, TreeOp};
use pretty_assertions::assert_eq;

fn apply_all(tree: &mut MemoryTree, ops: &[TreeOp<NodeId>]) {
    for op in ops {
        op.apply(tree).expect("op applies");
    }
}

fn tree_with(n: usize) -> (MemoryTree, Vec<NodeId>) {
    let tree = MemoryTree::new();
    let nodes = (0..n)
        .map(|i| tree.push_item(&format!("/watch?v={i}"), "t"))
        .collect();
    (tree, nodes)
}

#[test]
fn identical_orders_need_no_ops() {
    let ops = plan_moves(&[1, 2, 3], &[1, 2, 3]);
    assert!(ops.is_empty());
}

#[test]
fn dropped_items_become_removals_only() {
    let ops = plan_moves(&["a", "b", "c", "d"], &["a", "c"]);
    assert_eq!(ops, vec![TreeOp::Remove("b"), TreeOp::Remove("d")]);
}

#[test]
fn single_move_keeps_the_longest_run() {
    let ops = plan_moves(&["a", "b", "c", "d"], &["b", "c", "d", "a"]);
    assert_eq!(
        ops,
        vec![TreeOp::InsertAfter {
            handle: "a",
            anchor: "d"
        }]
    );
}

#[test]
fn front_insertions_anchor_on_the_following_item() {
    let ops = plan_moves(&["c"], &["a", "b", "c"]);
    assert_eq!(
        ops,
        vec![
            TreeOp::InsertBefore {
                handle: "b",
                anchor: "c"
            },
            TreeOp::InsertBefore {
                handle: "a",
                anchor: "b"
            },
        ]
    );
}

#[test]
fn empty_live_appends_then_chains() {
    let ops = plan_moves(&[], &["a", "b"]);
    assert_eq!(
        ops,
        vec![
            TreeOp::Append("a"),
            TreeOp::InsertAfter {
                handle: "b",
                anchor: "a"
            },
        ]
    );
}

#[test]
fn planned_ops_produce_target_order_on_a_tree() {
    let (mut tree, n) = tree_with(6);
    let live = n.clone();
    let target = vec![n[4], n[0], n[2], n[5], n[1]];

    let ops = plan_moves(&live, &target);
    apply_all(&mut tree, &ops);
    assert_eq!(tree.child_ids(), target);
    assert!(plan_moves(&tree.child_ids(), &target).is_empty());
}

#[test]
fn reversal_of_a_tree_matches_target() {
    let (mut tree, n) = tree_with(5);
    let target: Vec<NodeId> = n.iter().rev().copied().collect();
    let ops = plan_moves(&n, &target);
    assert_eq!(ops.len(), 4);
    apply_all(&mut tree, &ops);
    assert_eq!(tree.child_ids(), target);
}
