use std::collections::HashMap;

use super::ChunkHit;

/// RRF constant
const K: f32 = 60.0;
const TOP_RANK_BONUS: f32 = 0.05;

/// Reciprocal Rank Fusion of keyword and vector result lists.
///
/// Each list contributes `1 / (K + rank + 1)` per hit; hits ranked first in
/// any list get a small bonus. The fused score replaces the hit score.
pub fn rrf_fusion(keyword_hits: &[ChunkHit], vector_hits: &[ChunkHit], limit: usize) -> Vec<ChunkHit> {
    let mut score_map: HashMap<String, ChunkHit> = HashMap::new();

    for list in [keyword_hits, vector_hits] {
        for (rank, hit) in list.iter().enumerate() {
            let mut rrf_score = 1.0 / (K + rank as f32 + 1.0);
            if rank == 0 {
                rrf_score += TOP_RANK_BONUS;
            }

            score_map
                .entry(hit.chunk_id.clone())
                .or_insert_with(|| ChunkHit {
                    score: 0.0,
                    ..hit.clone()
                })
                .score += rrf_score;
        }
    }

    let mut results: Vec<ChunkHit> = score_map.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(limit);
    results
}
