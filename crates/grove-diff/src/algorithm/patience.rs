//! Patience diff: lines occurring exactly once on each side are matched,
//! the longest increasing run of those matches becomes a set of anchors,
//! and the gaps between anchors are diffed recursively. Gaps without
//! unique lines fall back to Myers.

use std::collections::HashMap;

use super::myers::shortest_edit;
use super::{common_ends, Edit};

const MAX_DEPTH: usize = 64;

pub fn diff(old: &[u32], new: &[u32]) -> Vec<Edit> {
    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    recurse(old, new, 0, 0, &mut edits, 0);
    edits
}

fn recurse(old: &[u32], new: &[u32], old_off: usize, new_off: usize, out: &mut Vec<Edit>, depth: usize) {
    let (prefix, suffix) = common_ends(old, new);
    out.extend((0..prefix).map(|i| Edit::equal(old_off + i, new_off + i)));

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    let mid_old = old_off + prefix;
    let mid_new = new_off + prefix;

    let anchors = if old_mid.is_empty() || new_mid.is_empty() || depth >= MAX_DEPTH {
        Vec::new()
    } else {
        longest_unique_run(old_mid, new_mid)
    };

    if anchors.is_empty() {
        shortest_edit(old_mid, new_mid, mid_old, mid_new, out);
    } else {
        let (mut prev_old, mut prev_new) = (0, 0);
        for (oi, ni) in anchors {
            recurse(
                &old_mid[prev_old..oi],
                &new_mid[prev_new..ni],
                mid_old + prev_old,
                mid_new + prev_new,
                out,
                depth + 1,
            );
            out.push(Edit::equal(mid_old + oi, mid_new + ni));
            prev_old = oi + 1;
            prev_new = ni + 1;
        }
        recurse(
            &old_mid[prev_old..],
            &new_mid[prev_new..],
            mid_old + prev_old,
            mid_new + prev_new,
            out,
            depth + 1,
        );
    }

    let old_tail = old_off + old.len() - suffix;
    let new_tail = new_off + new.len() - suffix;
    out.extend((0..suffix).map(|i| Edit::equal(old_tail + i, new_tail + i)));
}

/// Pairs `(old, new)` of lines unique on both sides, longest run increasing
/// in both coordinates.
fn longest_unique_run(old: &[u32], new: &[u32]) -> Vec<(usize, usize)> {
    // id -> (count in old, index in old, count in new, index in new)
    let mut counts: HashMap<u32, (u32, usize, u32, usize)> = HashMap::new();
    for (i, id) in old.iter().enumerate() {
        let entry = counts.entry(*id).or_insert((0, i, 0, 0));
        entry.0 += 1;
    }
    for (j, id) in new.iter().enumerate() {
        if let Some(entry) = counts.get_mut(id) {
            entry.2 += 1;
            entry.3 = j;
        }
    }
    let mut matches: Vec<(usize, usize)> = counts
        .values()
        .filter(|(oc, _, nc, _)| *oc == 1 && *nc == 1)
        .map(|&(_, oi, _, ni)| (oi, ni))
        .collect();
    matches.sort_unstable();

    // Patience sorting on the new indices, with back links.
    let mut piles: Vec<usize> = Vec::new();
    let mut back: Vec<Option<usize>> = vec![None; matches.len()];
    for (idx, &(_, ni)) in matches.iter().enumerate() {
        let pile = piles.partition_point(|&top| matches[top].1 < ni);
        if pile > 0 {
            back[idx] = Some(piles[pile - 1]);
        }
        if pile == piles.len() {
            piles.push(idx);
        } else {
            piles[pile] = idx;
        }
    }

    let mut run = Vec::with_capacity(piles.len());
    let mut cursor = piles.last().copied();
    while let Some(idx) = cursor {
        run.push(matches[idx]);
        cursor = back[idx];
    }
    run.reverse();
    run
}
