use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::{HostError, HostTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp<H> {
    Remove(H),
    InsertBefore { handle: H, anchor: H },
    InsertAfter { handle: H, anchor: H },
    Append(H),
}

impl<H> TreeOp<H> {
    pub fn handle(&self) -> &H {
        match self {
            TreeOp::Remove(handle) | TreeOp::Append(handle) => handle,
            TreeOp::InsertBefore { handle, .. } | TreeOp::InsertAfter { handle, .. } => handle,
        }
    }

    pub fn apply<T>(&self, tree: &mut T) -> Result<(), HostError>
    where
        T: HostTree<Handle = H>,
    {
        match self {
            TreeOp::Remove(handle) => tree.remove(handle),
            TreeOp::InsertBefore { handle, anchor } => tree.insert_before(handle, anchor),
            TreeOp::InsertAfter { handle, anchor } => tree.insert_after(handle, anchor),
            TreeOp::Append(handle) => tree.append(handle),
        }
    }
}

/// Computes the fewest writes turning the `live` item order into `target`.
///
/// Live items absent from `target` are removed. Of the rest, the longest run
/// already in target order stays put; everything else, including handles not
/// currently live, is placed relative to a neighbour. Empty when the orders
/// already match.
pub fn plan_moves<H>(live: &[H], target: &[H]) -> Vec<TreeOp<H>>
where
    H: Clone + Eq + Hash,
{
    let target_pos: HashMap<&H, usize> = target
        .iter()
        .enumerate()
        .map(|(index, handle)| (handle, index))
        .collect();

    let mut ops = Vec::new();
    let mut kept = Vec::with_capacity(live.len());
    for handle in live {
        match target_pos.get(handle) {
            Some(&index) => kept.push(index),
            None => ops.push(TreeOp::Remove(handle.clone())),
        }
    }

    let stable: HashSet<usize> = longest_increasing(&kept).into_iter().collect();
    let Some(last_stable) = stable.iter().copied().max() else {
        if let Some((first, rest)) = target.split_first() {
            ops.push(TreeOp::Append(first.clone()));
            push_after_chain(&mut ops, target, 1..=rest.len());
        }
        return ops;
    };

    for index in (0..last_stable).rev() {
        if !stable.contains(&index) {
            ops.push(TreeOp::InsertBefore {
                handle: target[index].clone(),
                anchor: target[index + 1].clone(),
            });
        }
    }
    push_after_chain(&mut ops, target, last_stable + 1..=target.len().saturating_sub(1));
    ops
}

fn push_after_chain<H: Clone>(
    ops: &mut Vec<TreeOp<H>>,
    target: &[H],
    range: std::ops::RangeInclusive<usize>,
) {
    for index in range {
        if index == 0 || index >= target.len() {
            continue;
        }
        ops.push(TreeOp::InsertAfter {
            handle: target[index].clone(),
            anchor: target[index - 1].clone(),
        });
    }
}

/// Values of one longest strictly increasing subsequence of `seq`.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        prev[i] = pos.checked_sub(1).map(|p| tails[p]);
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(seq[i]);
        cursor = prev[i];
    }
    out.reverse();
    out
}
