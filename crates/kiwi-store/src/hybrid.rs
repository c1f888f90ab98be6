use std::collections::HashMap;

use pgvector::Vector;
use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{Entity, HybridResult, KeywordCandidate, SemanticCandidate};

/// Unions the semantic and keyword candidate sets and ranks primarily by
/// ascending semantic distance (entities/relationships the semantic leg
/// didn't surface sort after everything it did), ties broken by id (§4.3).
/// Pure and independent of the database so it is fully unit-testable.
pub fn hybrid_rank(
    semantic: Vec<SemanticCandidate>,
    keyword: Vec<KeywordCandidate>,
) -> Vec<HybridResult> {
    let mut by_id: HashMap<i64, HybridResult> = HashMap::new();
    for s in semantic {
        by_id.insert(
            s.id,
            HybridResult {
                id: s.id,
                distance: Some(s.distance),
                ts_rank: None,
                keyword_hits: 0,
            },
        );
    }
    for k in keyword {
        by_id
            .entry(k.id)
            .and_modify(|r| {
                r.ts_rank = Some(k.ts_rank);
                r.keyword_hits = k.hit_count;
            })
            .or_insert(HybridResult {
                id: k.id,
                distance: None,
                ts_rank: Some(k.ts_rank),
                keyword_hits: k.hit_count,
            });
    }
    let mut out: Vec<HybridResult> = by_id.into_values().collect();
    out.sort_by(|a, b| {
        let da = a.distance.unwrap_or(f64::MAX);
        let db = b.distance.unwrap_or(f64::MAX);
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    out
}

impl GraphStore {
    async fn semantic_entity_candidates(
        &self,
        project_id: i64,
        embedding: &[f32],
        k: i64,
    ) -> Result<Vec<SemanticCandidate>> {
        if embedding.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }
        let vec = Vector::from(embedding.to_vec());
        let rows = sqlx::query(
            "SELECT id, (embedding <=> $2) AS distance FROM entities
             WHERE project_id = $1 AND embedding IS NOT NULL
             ORDER BY distance ASC LIMIT $3",
        )
        .bind(project_id)
        .bind(vec)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SemanticCandidate {
                id: r.get("id"),
                distance: r.get("distance"),
            })
            .collect())
    }

    async fn keyword_entity_candidates(
        &self,
        project_id: i64,
        query: &str,
        k: i64,
    ) -> Result<Vec<KeywordCandidate>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, ts_rank(search_vec, websearch_to_tsquery('simple', $2)) AS rnk,
                   numnode(to_tsquery('simple', websearch_to_tsquery('simple', $2)::text)) AS hits
            FROM entities
            WHERE project_id = $1 AND search_vec @@ websearch_to_tsquery('simple', $2)
            ORDER BY rnk DESC LIMIT $3
            "#,
        )
        .bind(project_id)
        .bind(query)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| KeywordCandidate {
                id: r.get("id"),
                ts_rank: r.get("rnk"),
                hit_count: r.get::<i32, _>("hits").max(0) as u32,
            })
            .collect())
    }

    /// `search_entities` (C8) and the normal-mode retriever's entity leg:
    /// hybrid semantic+keyword search over entities (§4.3, §4.8).
    pub async fn hybrid_search_entities(
        &self,
        project_id: i64,
        query_embedding: &[f32],
        query_text: &str,
        k: i64,
    ) -> Result<Vec<(Entity, HybridResult)>> {
        let semantic = self
            .semantic_entity_candidates(project_id, query_embedding, k)
            .await?;
        let keyword = self
            .keyword_entity_candidates(project_id, query_text, k)
            .await?;
        let ranked = hybrid_rank(semantic, keyword);
        let mut out = Vec::with_capacity(ranked.len().min(k as usize));
        for r in ranked.into_iter().take(k as usize) {
            if let Some(entity) = self.get_entity(r.id).await? {
                out.push((entity, r));
            }
        }
        Ok(out)
    }

    /// Same as [`Self::hybrid_search_entities`] but restricted to a fixed id
    /// set (C8 `get_entity_neighbours`: rank one-hop neighbours instead of
    /// the whole project).
    pub async fn hybrid_search_entities_among(
        &self,
        project_id: i64,
        query_embedding: &[f32],
        query_text: &str,
        ids: &[i64],
        k: i64,
    ) -> Result<Vec<(Entity, HybridResult)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let semantic = if query_embedding.iter().all(|v| *v == 0.0) {
            Vec::new()
        } else {
            let vec = Vector::from(query_embedding.to_vec());
            let rows = sqlx::query(
                "SELECT id, (embedding <=> $2) AS distance FROM entities
                 WHERE project_id = $1 AND embedding IS NOT NULL AND id = ANY($3)
                 ORDER BY distance ASC",
            )
            .bind(project_id)
            .bind(vec)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|r| SemanticCandidate {
                    id: r.get("id"),
                    distance: r.get("distance"),
                })
                .collect()
        };
        let keyword = if query_text.trim().is_empty() {
            Vec::new()
        } else {
            let rows = sqlx::query(
                r#"
                SELECT id, ts_rank(search_vec, websearch_to_tsquery('simple', $2)) AS rnk,
                       numnode(to_tsquery('simple', websearch_to_tsquery('simple', $2)::text)) AS hits
                FROM entities
                WHERE project_id = $1 AND id = ANY($3) AND search_vec @@ websearch_to_tsquery('simple', $2)
                ORDER BY rnk DESC
                "#,
            )
            .bind(project_id)
            .bind(query_text)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|r| KeywordCandidate {
                    id: r.get("id"),
                    ts_rank: r.get("rnk"),
                    hit_count: r.get::<i32, _>("hits").max(0) as u32,
                })
                .collect()
        };
        let ranked = hybrid_rank(semantic, keyword);
        let mut out = Vec::with_capacity(ranked.len().min(k as usize));
        for r in ranked.into_iter().take(k as usize) {
            if let Some(entity) = self.get_entity(r.id).await? {
                out.push((entity, r));
            }
        }
        Ok(out)
    }

    /// Same as [`hybrid_search_entities`] restricted to one `entity_type` (C8
    /// `search_entities_by_type`).
    pub async fn hybrid_search_entities_by_type(
        &self,
        project_id: i64,
        query_embedding: &[f32],
        query_text: &str,
        entity_type: &str,
        k: i64,
    ) -> Result<Vec<(Entity, HybridResult)>> {
        let all = self
            .hybrid_search_entities(project_id, query_embedding, query_text, k * 4)
            .await?;
        Ok(all
            .into_iter()
            .filter(|(e, _)| e.entity_type == entity_type)
            .take(k as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_only_candidate_ranks_by_distance() {
        let semantic = vec![
            SemanticCandidate { id: 2, distance: 0.5 },
            SemanticCandidate { id: 1, distance: 0.1 },
        ];
        let ranked = hybrid_rank(semantic, Vec::new());
        assert_eq!(ranked[0].id, 1);
        assert_eq!(ranked[1].id, 2);
    }

    #[test]
    fn keyword_only_candidate_sorts_after_semantic_by_id_fallback() {
        let semantic = vec![SemanticCandidate { id: 1, distance: 0.2 }];
        let keyword = vec![KeywordCandidate {
            id: 5,
            ts_rank: 0.9,
            hit_count: 3,
        }];
        let ranked = hybrid_rank(semantic, keyword);
        // id 1 has a real distance, id 5 has none (treated as +inf) so it sorts after.
        assert_eq!(ranked[0].id, 1);
        assert_eq!(ranked[1].id, 5);
        assert_eq!(ranked[1].keyword_hits, 3);
    }

    #[test]
    fn union_merges_overlap() {
        let semantic = vec![SemanticCandidate { id: 1, distance: 0.2 }];
        let keyword = vec![KeywordCandidate {
            id: 1,
            ts_rank: 0.7,
            hit_count: 2,
        }];
        let ranked = hybrid_rank(semantic, keyword);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].distance, Some(0.2));
        assert_eq!(ranked[0].ts_rank, Some(0.7));
    }

    #[test]
    fn ties_broken_by_id() {
        let semantic = vec![
            SemanticCandidate { id: 9, distance: 0.3 },
            SemanticCandidate { id: 2, distance: 0.3 },
        ];
        let ranked = hybrid_rank(semantic, Vec::new());
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 9);
    }
}
