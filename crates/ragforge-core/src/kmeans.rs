//! K-means clustering over embedding vectors, used by the tree builder
//! to group sibling nodes before each summarization round.
//!
//! Centers are seeded with k-means++ (probability proportional to
//! squared cosine distance to the nearest existing center), nodes are
//! assigned by nearest cosine similarity, and centers are recomputed as
//! the L2-normalized mean of their assigned members.

use crate::embedding::{cosine_similarity, l2_normalize};
use crate::models::Chunk;

/// A clusterable item: anything with an embedding and an opaque payload
/// the caller wants grouped.
pub trait Clusterable {
    fn embedding(&self) -> &[f32];
}

impl Clusterable for Chunk {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

pub struct KMeansClusterer {
    pub max_iterations: usize,
    pub convergence_threshold: f32,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        KMeansClusterer {
            max_iterations: 10,
            convergence_threshold: 0.001,
        }
    }
}

impl KMeansClusterer {
    pub fn new(max_iterations: usize, convergence_threshold: f32) -> Self {
        KMeansClusterer {
            max_iterations,
            convergence_threshold,
        }
    }

    /// Cluster `items` into at most `k` groups, returning the index
    /// groups (indices into `items`). Every returned group is non-empty.
    ///
    /// Edge cases: `items.len() <= k` puts one item per cluster;
    /// `items.len() <= 5` collapses everything into a single cluster.
    pub fn cluster<T: Clusterable>(&self, items: &[T], k: usize) -> Vec<Vec<usize>> {
        let n = items.len();
        if n == 0 {
            return Vec::new();
        }
        if n <= k {
            return (0..n).map(|i| vec![i]).collect();
        }
        if n <= 5 {
            return vec![(0..n).collect()];
        }
        let k = k.max(1);

        let embeddings: Vec<&[f32]> = items.iter().map(|i| i.embedding()).collect();
        let mut centers = self.seed_plus_plus(&embeddings, k);
        let mut assignments = vec![usize::MAX; n];

        for _ in 0..self.max_iterations.max(1) {
            let mut changed = false;
            for (i, emb) in embeddings.iter().enumerate() {
                let best = argmax_similarity(emb, &centers);
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }

            let new_centers = recompute_centers(&embeddings, &assignments, centers.len());

            let converged = !changed || centers_converged(&centers, &new_centers, self.convergence_threshold);
            centers = new_centers;
            if converged {
                break;
            }
        }

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); centers.len()];
        for (i, &c) in assignments.iter().enumerate() {
            groups[c].push(i);
        }
        groups.retain(|g| !g.is_empty());
        groups
    }

    fn seed_plus_plus(&self, embeddings: &[&[f32]], k: usize) -> Vec<Vec<f32>> {
        let n = embeddings.len();
        let mut centers: Vec<Vec<f32>> = Vec::with_capacity(k);
        centers.push(embeddings[0].to_vec());

        while centers.len() < k {
            let mut dists = vec![0.0f32; n];
            let mut total = 0.0f32;
            for (i, emb) in embeddings.iter().enumerate() {
                let best_sim = centers
                    .iter()
                    .map(|c| cosine_similarity(emb, c))
                    .fold(f32::NEG_INFINITY, f32::max);
                let dist = (1.0 - best_sim).max(0.0);
                let sq = dist * dist;
                dists[i] = sq;
                total += sq;
            }

            let next_idx = if total <= f32::EPSILON {
                centers.len() % n
            } else {
                // Deterministic weighted pick: walk the cumulative
                // distribution at its midpoint rather than drawing a
                // random sample, so tree building stays reproducible.
                let target = total / 2.0;
                let mut cum = 0.0f32;
                let mut chosen = n - 1;
                for (i, &d) in dists.iter().enumerate() {
                    cum += d;
                    if cum >= target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            };
            centers.push(embeddings[next_idx].to_vec());
        }

        centers
    }
}

fn argmax_similarity(emb: &[f32], centers: &[Vec<f32>]) -> usize {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(emb, c)))
        .fold((0, f32::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc })
        .0
}

fn recompute_centers(embeddings: &[&[f32]], assignments: &[usize], k: usize) -> Vec<Vec<f32>> {
    let dim = embeddings.first().map(|e| e.len()).unwrap_or(0);
    let mut sums = vec![vec![0.0f32; dim]; k];
    let mut counts = vec![0usize; k];

    for (emb, &c) in embeddings.iter().zip(assignments.iter()) {
        if c == usize::MAX {
            continue;
        }
        counts[c] += 1;
        for (d, v) in sums[c].iter_mut().zip(emb.iter()) {
            *d += v;
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(mut sum, count)| {
            if count == 0 {
                return sum;
            }
            for v in sum.iter_mut() {
                *v /= count as f32;
            }
            l2_normalize(&mut sum);
            sum
        })
        .collect()
}

fn centers_converged(old: &[Vec<f32>], new: &[Vec<f32>], threshold: f32) -> bool {
    old.iter()
        .zip(new.iter())
        .all(|(a, b)| cosine_similarity(a, b) >= 1.0 - threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(Vec<f32>);
    impl Clusterable for Item {
        fn embedding(&self) -> &[f32] {
            &self.0
        }
    }

    fn items(vs: &[[f32; 2]]) -> Vec<Item> {
        vs.iter().map(|v| Item(v.to_vec())).collect()
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let c = KMeansClusterer::default();
        let result: Vec<Vec<usize>> = c.cluster::<Item>(&[], 3);
        assert!(result.is_empty());
    }

    #[test]
    fn small_input_collapses_to_one_cluster() {
        let c = KMeansClusterer::default();
        let data = items(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let result = c.cluster(&data, 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 3);
    }

    #[test]
    fn n_less_equal_k_wins_over_n_less_equal_five() {
        let c = KMeansClusterer::default();
        let data = items(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let result = c.cluster(&data, 5);
        assert_eq!(result.len(), 3);
        for g in &result {
            assert_eq!(g.len(), 1);
        }
    }

    #[test]
    fn n_less_equal_k_gives_singleton_clusters() {
        let c = KMeansClusterer::default();
        let data = items(&[
            [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.5], [0.2, 0.8], [0.9, 0.1],
        ]);
        let result = c.cluster(&data, 10);
        assert_eq!(result.len(), data.len());
        for g in &result {
            assert_eq!(g.len(), 1);
        }
    }

    #[test]
    fn clusters_partition_all_items() {
        let c = KMeansClusterer::default();
        let mut raw = Vec::new();
        for _ in 0..10 {
            raw.push([1.0, 0.0]);
        }
        for _ in 0..10 {
            raw.push([0.0, 1.0]);
        }
        let data = items(&raw);
        let result = c.cluster(&data, 2);
        let total: usize = result.iter().map(|g| g.len()).sum();
        assert_eq!(total, data.len());
        for g in &result {
            assert!(!g.is_empty());
        }
    }

    #[test]
    fn well_separated_points_cluster_correctly() {
        let c = KMeansClusterer::default();
        let data = items(&[
            [1.0, 0.0], [0.98, 0.02], [0.95, 0.05], [0.97, 0.03], [0.99, 0.01], [0.96, 0.04],
            [0.0, 1.0], [0.02, 0.98], [0.05, 0.95], [0.03, 0.97], [0.01, 0.99], [0.04, 0.96],
        ]);
        let result = c.cluster(&data, 2);
        assert_eq!(result.len(), 2);
        for g in &result {
            let first_half = g.iter().filter(|&&i| i < 6).count();
            let second_half = g.len() - first_half;
            assert!(first_half == 0 || second_half == 0, "cluster mixed both groups: {:?}", g);
        }
    }
}
