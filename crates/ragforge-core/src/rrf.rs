//! Reciprocal Rank Fusion and result repacking.
//!
//! Used by the enhancer to merge result lists produced from multiple
//! query embeddings (the original query plus any HyDE hypothetical
//! answer), and to reorder a final candidate list to counter the
//! "lost in the middle" effect before it is placed in the generation
//! prompt.

use std::collections::HashMap;

use crate::models::SearchResult;

const RRF_K: f64 = 60.0;

/// Anything rankable by reciprocal rank fusion: needs a stable identity
/// and is otherwise opaque to the fusion algorithm.
pub trait Ranked {
    fn rank_id(&self) -> &str;
}

impl Ranked for SearchResult {
    fn rank_id(&self) -> &str {
        &self.id
    }
}

/// Fuse multiple ranked lists into one id -> score map using
/// `score(id) = sum over lists containing id of 1 / (k + rank)`, where
/// `rank` is the 1-based position of `id` within that list.
pub fn reciprocal_rank_fusion<T: Ranked>(lists: &[Vec<T>]) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in lists {
        for (idx, item) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(item.rank_id().to_string()).or_insert(0.0) += 1.0 / (RRF_K + rank);
        }
    }
    scores
}

/// Deduplicate items by `rank_id`, keeping the first occurrence.
pub fn dedup_by_id<T: Ranked>(items: Vec<T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.rank_id().to_string()))
        .collect()
}

/// Reorder items already sorted by descending score into a
/// high-low-mid pattern: the highest-scored item goes first, the
/// second-highest goes last, the third goes second, the fourth goes
/// second-to-last, and so on, spreading top results to both ends of
/// the sequence instead of leaving them bunched at the front.
pub fn repack_high_low_mid<T>(items: Vec<T>) -> Vec<T> {
    let n = items.len();
    if n <= 2 {
        return items;
    }
    let mut out: Vec<Option<T>> = (0..n).map(|_| None).collect();
    let mut left = 0usize;
    let mut right = n - 1;
    for (i, item) in items.into_iter().enumerate() {
        if i % 2 == 0 {
            out[left] = Some(item);
            left += 1;
        } else {
            out[right] = Some(item);
            right = right.saturating_sub(1);
        }
    }
    out.into_iter().map(|x| x.unwrap()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct R(&'static str);
    impl Ranked for R {
        fn rank_id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn rrf_single_list_decreasing_scores() {
        let lists = vec![vec![R("a"), R("b"), R("c")]];
        let scores = reciprocal_rank_fusion(&lists);
        assert!(scores["a"] > scores["b"]);
        assert!(scores["b"] > scores["c"]);
    }

    #[test]
    fn rrf_merges_across_lists() {
        let lists = vec![vec![R("a"), R("b")], vec![R("b"), R("a")]];
        let scores = reciprocal_rank_fusion(&lists);
        assert!((scores["a"] - scores["b"]).abs() < 1e-9);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![R("a"), R("b"), R("a")];
        let out = dedup_by_id(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, "a");
        assert_eq!(out[1].0, "b");
    }

    #[test]
    fn repack_spreads_top_scores_to_both_ends() {
        let items = vec![1, 2, 3, 4, 5];
        let out = repack_high_low_mid(items);
        assert_eq!(out.first().copied(), Some(1));
        assert_eq!(out.last().copied(), Some(2));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn repack_short_lists_unchanged() {
        assert_eq!(repack_high_low_mid(vec![1]), vec![1]);
        assert_eq!(repack_high_low_mid(vec![1, 2]), vec![1, 2]);
        let empty: Vec<i32> = vec![];
        assert_eq!(repack_high_low_mid(empty.clone()), empty);
    }
}
