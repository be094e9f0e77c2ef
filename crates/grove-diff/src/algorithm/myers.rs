//! Myers' O(ND) shortest edit script ("An O(ND) Difference Algorithm and
//! Its Variations", 1986), run on the middle left after trimming the common
//! prefix and suffix.

use super::{common_ends, Edit};

pub fn diff(old: &[u32], new: &[u32]) -> Vec<Edit> {
    let (prefix, suffix) = common_ends(old, new);
    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    edits.extend((0..prefix).map(|i| Edit::equal(i, i)));
    shortest_edit(
        &old[prefix..old.len() - suffix],
        &new[prefix..new.len() - suffix],
        prefix,
        prefix,
        &mut edits,
    );
    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    edits.extend((0..suffix).map(|i| Edit::equal(old_tail + i, new_tail + i)));
    edits
}

/// Append the edits for `a` to `b`, with indices shifted by the offsets.
pub(crate) fn shortest_edit(a: &[u32], b: &[u32], a_off: usize, b_off: usize, out: &mut Vec<Edit>) {
    if a.is_empty() {
        out.extend((0..b.len()).map(|j| Edit::insert(a_off, b_off + j)));
        return;
    }
    if b.is_empty() {
        out.extend((0..a.len()).map(|i| Edit::delete(a_off + i, b_off)));
        return;
    }

    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    let offset = max;
    let mut v = vec![0isize; 2 * max as usize + 2];
    // trace[d] holds v[-d..=d] as it was before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v[(offset - d) as usize..=(offset + d) as usize].to_vec());
        let mut k = -d;
        while k <= d {
            let at = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[at - 1] < v[at + 1]) {
                v[at + 1]
            } else {
                v[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[at] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut script = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);
    for d in (0..trace.len() as isize).rev() {
        let snapshot = &trace[d as usize];
        let at = |k: isize| snapshot[(k + d) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) { k + 1 } else { k - 1 };
        let prev_x = if d == 0 { 0 } else { at(prev_k) };
        let prev_y = if d == 0 { 0 } else { prev_x - prev_k };
        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            script.push(Edit::equal(a_off + x as usize, b_off + y as usize));
        }
        if d > 0 {
            if x == prev_x {
                y -= 1;
                script.push(Edit::insert(a_off + x as usize, b_off + y as usize));
            } else {
                x -= 1;
                script.push(Edit::delete(a_off + x as usize, b_off + y as usize));
            }
        }
    }
    script.reverse();
    out.extend(script);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::tests::apply;
    use crate::algorithm::{intern, split_lines, EditOp, Whitespace};
    use proptest::prelude::*;

    fn run(old: &[u8], new: &[u8]) -> (usize, usize) {
        let (o, n) = (split_lines(old), split_lines(new));
        let (oi, ni) = intern(&o, &n, Whitespace::Exact);
        let edits = diff(&oi, &ni);
        assert_eq!(apply(&o, &n, &edits), n);
        let ins = edits.iter().filter(|e| e.op == EditOp::Insert).count();
        let del = edits.iter().filter(|e| e.op == EditOp::Delete).count();
        (ins, del)
    }

    #[test]
    fn identical_and_empty() {
        assert_eq!(run(b"a\nb\n", b"a\nb\n"), (0, 0));
        assert_eq!(run(b"", b"a\nb\n"), (2, 0));
        assert_eq!(run(b"a\nb\n", b""), (0, 2));
        assert_eq!(run(b"", b""), (0, 0));
    }

    #[test]
    fn single_change_is_minimal() {
        assert_eq!(run(b"a\nb\nc\n", b"a\nX\nc\n"), (1, 1));
        assert_eq!(run(b"a\nb\nc\nd\n", b"a\nc\nd\n"), (0, 1));
    }

    #[test]
    fn classic_example() {
        // ABCABBA -> CBABAC has an edit distance of 5.
        let (ins, del) = run(b"A\nB\nC\nA\nB\nB\nA\n", b"C\nB\nA\nB\nA\nC\n");
        assert_eq!(ins + del, 5);
    }

    #[test]
    fn insert_positions_point_at_next_old_line() {
        let edits = diff(&[1, 2], &[1, 9, 2]);
        assert_eq!(edits[1], Edit::insert(1, 1));
        let edits = diff(&[1, 9, 2], &[1, 2]);
        assert_eq!(edits[1], Edit::delete(1, 1));
    }

    proptest! {
        #[test]
        fn rebuilds_new_side(old in prop::collection::vec(0u32..6, 0..40), new in prop::collection::vec(0u32..6, 0..40)) {
            let edits = diff(&old, &new);
            let mut rebuilt = Vec::new();
            let mut pos = 0;
            for e in &edits {
                match e.op {
                    EditOp::Equal => { prop_assert_eq!(old[e.old_index], new[e.new_index]); rebuilt.push(new[e.new_index]); pos += 1; }
                    EditOp::Delete => pos += 1,
                    EditOp::Insert => rebuilt.push(new[e.new_index]),
                }
            }
            prop_assert_eq!(pos, old.len());
            prop_assert_eq!(rebuilt, new);
        }
    }
}
