use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use grove_diff::algorithm::{diff_lines, split_lines};
use grove_diff::{DiffAlgorithm, Whitespace};

/// A source file of `n` lines and a copy with every 50th line rewritten
/// and a block moved to the end.
fn inputs(n: usize) -> (Vec<u8>, Vec<u8>) {
    let old: Vec<String> = (0..n).map(|i| format!("    let value_{i} = compute({i});\n")).collect();
    let mut new = old.clone();
    for i in (0..n).step_by(50) {
        new[i] = format!("    let value_{i} = compute({i}) + 1;\n");
    }
    let moved: Vec<String> = new.drain(n / 4..n / 4 + n / 20).collect();
    new.extend(moved);
    (old.concat().into_bytes(), new.concat().into_bytes())
}

fn bench_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_diff");
    for n in [1_000, 10_000] {
        let (old, new) = inputs(n);
        let (old_lines, new_lines) = (split_lines(&old), split_lines(&new));
        for algorithm in [DiffAlgorithm::Myers, DiffAlgorithm::Patience] {
            group.bench_with_input(BenchmarkId::new(format!("{algorithm:?}"), n), &n, |b, _| {
                b.iter(|| diff_lines(&old_lines, &new_lines, algorithm, Whitespace::Exact));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_algorithms);
criterion_main!(benches);
