//! Top-K fusion of per-sub-query result sets
//!
//! Result sets are concatenated in sub-query order. When at least one hit is
//! scored, hits are stably sorted descending by score so ties keep first-seen
//! order (first sub-query, then original rank). When no hit carries a score,
//! encounter order is the ranking. Both paths are deterministic.

use super::SearchHit;

/// Fixed fan-in cap for the fused result set.
pub const FUSED_TOP_K: usize = 5;

/// Fuse per-sub-query result sets into the top-k hits.
pub fn fuse_top_k(result_sets: Vec<Vec<SearchHit>>, k: usize) -> Vec<SearchHit> {
    let mut all: Vec<SearchHit> = result_sets.into_iter().flatten().collect();

    if all.iter().any(|hit| hit.score.is_some()) {
        // Stable sort: equal scores (and unscored stragglers) keep encounter order.
        all.sort_by(|a, b| {
            let sa = a.score.unwrap_or(f32::NEG_INFINITY);
            let sb = b.score.unwrap_or(f32::NEG_INFINITY);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    all.truncate(k);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::HitPayload;
    use serde_json::Map;

    fn hit(score: Option<f32>, text: &str) -> SearchHit {
        SearchHit {
            score,
            payload: HitPayload {
                text: text.to_string(),
                user_id: "alice".to_string(),
                extra: Map::new(),
            },
        }
    }

    #[test]
    fn test_scored_hits_sorted_descending() {
        let sets = vec![
            vec![hit(Some(0.2), "low"), hit(Some(0.9), "high")],
            vec![hit(Some(0.5), "mid")],
        ];
        let fused = fuse_top_k(sets, 5);
        let texts: Vec<&str> = fused.iter().map(|h| h.payload.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let sets = vec![
            vec![hit(Some(0.5), "first-query-a"), hit(Some(0.5), "first-query-b")],
            vec![hit(Some(0.5), "second-query-a")],
        ];
        let fused = fuse_top_k(sets, 5);
        let texts: Vec<&str> = fused.iter().map(|h| h.payload.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["first-query-a", "first-query-b", "second-query-a"]
        );
    }

    #[test]
    fn test_unscored_hits_keep_encounter_order() {
        let sets = vec![
            vec![hit(None, "a"), hit(None, "b")],
            vec![hit(None, "c"), hit(None, "d")],
        ];
        let fused = fuse_top_k(sets, 3);
        let texts: Vec<&str> = fused.iter().map(|h| h.payload.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_truncates_to_k() {
        let sets = vec![(0..8).map(|i| hit(Some(i as f32), "x")).collect()];
        let fused = fuse_top_k(sets, FUSED_TOP_K);
        assert_eq!(fused.len(), FUSED_TOP_K);
        assert_eq!(fused[0].score, Some(7.0));
    }

    #[test]
    fn test_empty_input_is_empty() {
        assert!(fuse_top_k(Vec::new(), FUSED_TOP_K).is_empty());
    }
}
