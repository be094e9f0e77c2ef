//! Rename and copy detection over a finished [`Diff`].
//!
//! Exact matches (same oid) are paired first and score 1.0. The remaining
//! candidates are scored by the share of lines both files have in common,
//! `2 * common / (lines_a + lines_b)`, computed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use rayon::prelude::*;
use tracing::debug;

use crate::algorithm::split_lines;
use crate::delta::{DeltaStatus, DiffDelta};
use crate::diff::{Diff, Side};
use crate::tree::sort_deltas;
use crate::{DiffError, FindOptions};

/// Sorted line hashes of one file.
#[derive(Debug, Default)]
struct Signature {
    lines: Vec<u64>,
}

impl Signature {
    fn new(content: &[u8]) -> Self {
        let mut lines: Vec<u64> = split_lines(content)
            .into_iter()
            .map(|line| {
                let mut hasher = DefaultHasher::new();
                line.hash(&mut hasher);
                hasher.finish()
            })
            .collect();
        lines.sort_unstable();
        Self { lines }
    }

    fn similarity(&self, other: &Self) -> f32 {
        let total = self.lines.len() + other.lines.len();
        if total == 0 {
            return 0.0;
        }
        let (mut i, mut j, mut common) = (0, 0, 0usize);
        while i < self.lines.len() && j < other.lines.len() {
            match self.lines[i].cmp(&other.lines[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    common += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        (2 * common) as f32 / total as f32
    }
}

#[derive(Debug, Clone, Copy)]
struct Pairing {
    target: usize,
    source: usize,
    score: f32,
    /// Renamed rather than copied; the source delta is dropped.
    rename: bool,
}

impl Diff<'_> {
    /// Turn matching deletions and additions into renames and, with
    /// `copies`, additions similar to an existing file into copies.
    pub fn find_similar(&mut self, options: &FindOptions) -> Result<(), DiffError> {
        if !options.renames && !options.copies {
            return Ok(());
        }

        let is_rename_source = |d: &DiffDelta| d.status == DeltaStatus::Deleted;
        let is_copy_source = |d: &DiffDelta| {
            matches!(
                d.status,
                DeltaStatus::Deleted | DeltaStatus::Modified | DeltaStatus::Unmodified
            )
        };
        let targets: Vec<usize> = (0..self.deltas.len())
            .filter(|&i| self.deltas[i].status == DeltaStatus::Added)
            .collect();
        let sources: Vec<usize> = (0..self.deltas.len())
            .filter(|&i| {
                let d = &self.deltas[i];
                (options.renames && is_rename_source(d)) || (options.copies && is_copy_source(d))
            })
            .collect();
        if targets.is_empty() || sources.is_empty() {
            return Ok(());
        }

        let mut target_match: HashMap<usize, Pairing> = HashMap::new();
        let mut renamed_sources = vec![false; self.deltas.len()];

        // Same content first.
        for &target in &targets {
            let oid = self.deltas[target].new_file.oid;
            if oid.is_null() {
                continue;
            }
            let exact = |pick: &dyn Fn(&DiffDelta) -> bool, taken: &[bool]| {
                sources.iter().copied().find(|&s| {
                    !taken.get(s).copied().unwrap_or(false)
                        && pick(&self.deltas[s])
                        && self.deltas[s].old_file.oid == oid
                })
            };
            let mut pairing = None;
            if options.renames {
                if let Some(source) = exact(&is_rename_source, &renamed_sources) {
                    renamed_sources[source] = true;
                    pairing = Some(Pairing { target, source, score: 1.0, rename: true });
                }
            }
            if pairing.is_none() && options.copies {
                pairing = exact(&is_copy_source, &[]).map(|source| Pairing {
                    target,
                    source,
                    score: 1.0,
                    rename: false,
                });
            }
            if let Some(pairing) = pairing {
                target_match.insert(target, pairing);
            }
        }

        let open_targets: Vec<usize> = targets.iter().copied().filter(|t| !target_match.contains_key(t)).collect();
        let exact = target_match.len();
        if !open_targets.is_empty() {
            let cells = open_targets.len().saturating_mul(sources.len());
            if cells > options.rename_limit.saturating_mul(options.rename_limit) {
                debug!(cells, limit = options.rename_limit, "too many rename candidates, skipping similarity scoring");
            } else {
                self.score_candidates(options, &open_targets, &sources, &mut renamed_sources, &mut target_match)?;
            }
        }
        debug!(exact, inexact = target_match.len() - exact, "rename detection done");

        self.apply_pairings(target_match);
        Ok(())
    }

    fn score_candidates(
        &self,
        options: &FindOptions,
        targets: &[usize],
        sources: &[usize],
        renamed_sources: &mut [bool],
        target_match: &mut HashMap<usize, Pairing>,
    ) -> Result<(), DiffError> {
        let signatures: HashMap<usize, Signature> = targets
            .par_iter()
            .map(|&t| Ok((t, Signature::new(&self.load(&self.deltas[t].new_file, Side::New)?))))
            .chain(
                sources
                    .par_iter()
                    .map(|&s| Ok((s, Signature::new(&self.load(&self.deltas[s].old_file, Side::Old)?)))),
            )
            .collect::<Result<_, DiffError>>()?;

        let mut pairings: Vec<Pairing> = targets
            .par_iter()
            .flat_map_iter(|&target| {
                let signatures = &signatures;
                sources.iter().map(move |&source| Pairing {
                    target,
                    source,
                    score: signatures[&target].similarity(&signatures[&source]),
                    rename: false,
                })
            })
            .collect();
        pairings.retain(|p| {
            let deleted = self.deltas[p.source].status == DeltaStatus::Deleted;
            let rename_ok = options.renames && deleted && p.score >= options.rename_threshold;
            let copy_ok = options.copies && p.score >= options.copy_threshold;
            p.score > 0.0 && (rename_ok || copy_ok)
        });
        pairings.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.target.cmp(&b.target))
                .then(a.source.cmp(&b.source))
        });

        for mut pairing in pairings {
            if target_match.contains_key(&pairing.target) {
                continue;
            }
            let deleted = self.deltas[pairing.source].status == DeltaStatus::Deleted;
            let as_rename = options.renames
                && deleted
                && !renamed_sources[pairing.source]
                && pairing.score >= options.rename_threshold;
            if as_rename {
                renamed_sources[pairing.source] = true;
                pairing.rename = true;
            } else if !(options.copies && pairing.score >= options.copy_threshold) {
                continue;
            }
            target_match.insert(pairing.target, pairing);
        }
        Ok(())
    }

    /// Rewrite paired targets as renames or copies and drop renamed
    /// sources.
    fn apply_pairings(&mut self, target_match: HashMap<usize, Pairing>) {
        let mut renamed = vec![false; self.deltas.len()];
        for pairing in target_match.into_values() {
            let old_file = self.deltas[pairing.source].old_file.clone();
            let target = &mut self.deltas[pairing.target];
            target.status = if pairing.rename {
                DeltaStatus::Renamed
            } else {
                DeltaStatus::Copied
            };
            target.old_file = old_file;
            target.similarity = pairing.score;
            renamed[pairing.source] |= pairing.rename;
        }

        let mut index = 0;
        self.deltas.retain(|_| {
            let keep = !renamed[index];
            index += 1;
            keep
        });
        sort_deltas(&mut self.deltas);
    }
}
