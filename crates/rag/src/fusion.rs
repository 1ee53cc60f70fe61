//! Reciprocal Rank Fusion
//!
//! A candidate at 0-based rank `r` in any list contributes `1 / (k + r + 1)`.
//! Contributions accumulate across lists, so a document found by several
//! query variants outranks one found by a single variant at the same rank.

use std::cmp::Ordering;
use std::collections::HashMap;

use parish_chat_core::RetrievalCandidate;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    /// `score` holds the best similarity any list reported for this id
    pub candidate: RetrievalCandidate,
    pub rrf_score: f32,
    /// Number of lists the candidate appeared in
    pub hits: usize,
}

/// Fuse ranked lists, best first. Ties keep first-seen order.
pub fn reciprocal_rank_fusion(lists: &[Vec<RetrievalCandidate>], k: f32) -> Vec<FusedCandidate> {
    let mut fused: Vec<FusedCandidate> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, candidate) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);

            match positions.get(&candidate.id) {
                Some(&i) => {
                    let entry = &mut fused[i];
                    entry.rrf_score += contribution;
                    entry.hits += 1;
                    if candidate.score > entry.candidate.score {
                        entry.candidate.score = candidate.score;
                    }
                },
                None => {
                    positions.insert(candidate.id.clone(), fused.len());
                    fused.push(FusedCandidate {
                        candidate: candidate.clone(),
                        rrf_score: contribution,
                        hits: 1,
                    });
                },
            }
        }
    }

    // stable: equal scores stay in insertion order
    fused.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str, score: f32) -> RetrievalCandidate {
        RetrievalCandidate {
            id: id.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_overlap_outranks_single_list() {
        let lists = vec![
            vec![c("a", 0.9), c("b", 0.8)],
            vec![c("c", 0.9), c("b", 0.7)],
        ];
        let fused = reciprocal_rank_fusion(&lists, 60.0);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].candidate.id, "b");
        assert_eq!(fused[0].hits, 2);
        assert!((fused[0].rrf_score - 2.0 / 62.0).abs() < 1e-6);
        // a and c tie at 1/61; a was seen first
        assert_eq!(fused[1].candidate.id, "a");
        assert_eq!(fused[2].candidate.id, "c");
    }

    #[test]
    fn test_keeps_best_similarity() {
        let lists = vec![vec![c("a", 0.4)], vec![c("a", 0.6)], vec![c("a", 0.5)]];
        let fused = reciprocal_rank_fusion(&lists, 60.0);
        assert_eq!(fused[0].candidate.score, 0.6);
        assert_eq!(fused[0].hits, 3);
    }

    #[test]
    fn test_rank_matters_within_list() {
        let lists = vec![vec![c("a", 0.5), c("b", 0.9)]];
        let fused = reciprocal_rank_fusion(&lists, 60.0);
        assert_eq!(fused[0].candidate.id, "a");
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty() {
        assert!(reciprocal_rank_fusion(&[], 60.0).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 60.0).is_empty());
    }
}
