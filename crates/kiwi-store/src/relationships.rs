use std::collections::{BinaryHeap, HashMap};
use std::cmp::Ordering;

use pgvector::Vector;
use sqlx::Row;

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{Relationship, RelationshipInput};

/// Strength-to-weight conversion used throughout path search (§4.3, §4.8):
/// higher rank -> shorter effective edge.
pub const RANK_EPSILON: f32 = 0.01;

pub fn edge_weight(rank: f32) -> f64 {
    (1.0 / (rank + RANK_EPSILON)) as f64
}

impl GraphStore {
    /// Idempotent by `public_id` (§4.3). `rels` reference entities by
    /// already-resolved db id (caller resolves `source_public_id`/
    /// `target_public_id` via the entity id map from `upsert_entities`).
    pub async fn upsert_relationships(
        &self,
        project_id: i64,
        rels: &[(String, i64, i64, String, f32, Option<Vec<f32>>)],
    ) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(rels.len());
        let mut tx = self.pool.begin().await?;
        for (public_id, source_id, target_id, description, rank, embedding) in rels {
            let embedding = embedding.as_ref().map(|v| Vector::from(v.clone()));
            let row = sqlx::query(
                r#"
                INSERT INTO relationships (public_id, project_id, source_id, target_id, rank, description, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (public_id) DO UPDATE
                    SET description = EXCLUDED.description,
                        rank = GREATEST(relationships.rank, EXCLUDED.rank),
                        embedding = COALESCE(EXCLUDED.embedding, relationships.embedding)
                RETURNING id
                "#,
            )
            .bind(public_id)
            .bind(project_id)
            .bind(source_id)
            .bind(target_id)
            .bind(description)
            .bind(rank)
            .bind(embedding)
            .fetch_one(&mut *tx)
            .await?;
            out.insert(public_id.clone(), row.get::<i64, _>("id"));
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn get_relationship(&self, id: i64) -> Result<Option<Relationship>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, source_id, target_id, rank, description
             FROM relationships WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_relationship))
    }

    /// Used by C8 tools, which the model addresses by `public_id`.
    pub async fn get_relationship_by_public_id(
        &self,
        project_id: i64,
        public_id: &str,
    ) -> Result<Option<Relationship>> {
        let row = sqlx::query(
            "SELECT id, public_id, project_id, source_id, target_id, rank, description
             FROM relationships WHERE project_id = $1 AND public_id = $2",
        )
        .bind(project_id)
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_relationship))
    }

    /// Relationships with `entity_id` as either endpoint (C8
    /// `get_entity_neighbours`).
    pub async fn incident_relationships(&self, project_id: i64, entity_id: i64) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            "SELECT id, public_id, project_id, source_id, target_id, rank, description
             FROM relationships
             WHERE project_id = $1 AND (source_id = $2 OR target_id = $2)",
        )
        .bind(project_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_relationship).collect())
    }

    /// `FindDuplicateRelationships` (§4.3, §4.5 step 5): both `(a,b)` and
    /// `(b,a)` orderings, and pairs sharing identical endpoints.
    pub async fn find_duplicate_relationships(
        &self,
        project_id: i64,
    ) -> Result<Vec<(Relationship, Relationship)>> {
        let rows = sqlx::query(
            r#"
            SELECT
                a.id AS a_id, a.public_id AS a_public_id, a.project_id AS a_project_id,
                a.source_id AS a_source_id, a.target_id AS a_target_id, a.rank AS a_rank,
                a.description AS a_description,
                b.id AS b_id, b.public_id AS b_public_id, b.project_id AS b_project_id,
                b.source_id AS b_source_id, b.target_id AS b_target_id, b.rank AS b_rank,
                b.description AS b_description
            FROM relationships a
            JOIN relationships b
                ON a.project_id = b.project_id
               AND a.id < b.id
               AND (
                    (a.source_id = b.source_id AND a.target_id = b.target_id)
                 OR (a.source_id = b.target_id AND a.target_id = b.source_id)
               )
            WHERE a.project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let a = Relationship {
                    id: r.get("a_id"),
                    public_id: r.get("a_public_id"),
                    project_id: r.get("a_project_id"),
                    source_id: r.get("a_source_id"),
                    target_id: r.get("a_target_id"),
                    rank: r.get("a_rank"),
                    description: r.get("a_description"),
                };
                let b = Relationship {
                    id: r.get("b_id"),
                    public_id: r.get("b_public_id"),
                    project_id: r.get("b_project_id"),
                    source_id: r.get("b_source_id"),
                    target_id: r.get("b_target_id"),
                    rank: r.get("b_rank"),
                    description: r.get("b_description"),
                };
                (a, b)
            })
            .collect())
    }

    pub async fn set_relationship_rank(&self, id: i64, rank: f32) -> Result<()> {
        sqlx::query("UPDATE relationships SET rank = $2 WHERE id = $1")
            .bind(id)
            .bind(rank)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_relationship(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM relationships WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `DeleteRelationshipsWithoutSources` (§4.5 step 7). Returns deleted ids.
    pub async fn delete_relationships_without_sources(&self, project_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            DELETE FROM relationships
            WHERE project_id = $1
              AND id NOT IN (SELECT DISTINCT relationship_id FROM relationship_sources)
            RETURNING id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// All relationships touching `project_id`, as an adjacency list keyed by
    /// entity id, for in-memory path search (`shortest_path_between_entities`,
    /// C8 `path_between_entities`). Loaded once per call rather than via a
    /// recursive CTE, matching the teacher's fetch-then-compute style.
    pub async fn load_relationship_graph(
        &self,
        project_id: i64,
    ) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            "SELECT id, public_id, project_id, source_id, target_id, rank, description
             FROM relationships WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_relationship).collect())
    }

    /// Shortest weighted path between two entities (§4.3, §4.8); weight is
    /// `1/(rank+eps)` so stronger relationships are preferred. Returns the
    /// alternating `(entity_id, Option<relationship_id>)` path, or `None`
    /// if unreachable within `max_hops` edges.
    pub async fn shortest_path_between_entities(
        &self,
        project_id: i64,
        source_entity_id: i64,
        target_entity_id: i64,
        max_hops: usize,
    ) -> Result<Option<Vec<PathStep>>> {
        let edges = self.load_relationship_graph(project_id).await?;
        Ok(dijkstra_path(&edges, source_entity_id, target_entity_id, max_hops))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub entity_id: i64,
    pub via_relationship_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    cost: ordered_f64::NotNan,
    node: i64,
    hops: usize,
}

impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap via reversed comparison.
        other.cost.cmp(&self.cost)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tiny NaN-free float wrapper so `f64` edge weights can sit in a `BinaryHeap`
/// without pulling in a whole crate for it.
mod ordered_f64 {
    use std::cmp::Ordering;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct NotNan(f64);

    impl NotNan {
        pub fn new(v: f64) -> Self {
            debug_assert!(!v.is_nan());
            Self(v)
        }

        pub fn get(&self) -> f64 {
            self.0
        }
    }
    impl Eq for NotNan {}
    impl Ord for NotNan {
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
        }
    }
    impl PartialOrd for NotNan {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
}

fn dijkstra_path(
    edges: &[Relationship],
    source: i64,
    target: i64,
    max_hops: usize,
) -> Option<Vec<PathStep>> {
    if source == target {
        return Some(vec![PathStep {
            entity_id: source,
            via_relationship_id: None,
        }]);
    }
    let mut adjacency: HashMap<i64, Vec<(i64, i64, f32)>> = HashMap::new();
    for rel in edges {
        adjacency
            .entry(rel.source_id)
            .or_default()
            .push((rel.target_id, rel.id, rel.rank));
        adjacency
            .entry(rel.target_id)
            .or_default()
            .push((rel.source_id, rel.id, rel.rank));
    }

    let mut dist: HashMap<i64, f64> = HashMap::new();
    let mut prev: HashMap<i64, (i64, i64)> = HashMap::new(); // node -> (prev_node, via_rel)
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0.0);
    heap.push(HeapEntry {
        cost: ordered_f64::NotNan::new(0.0),
        node: source,
        hops: 0,
    });

    while let Some(HeapEntry { cost, node, hops }) = heap.pop() {
        if node == target {
            break;
        }
        if hops >= max_hops {
            continue;
        }
        let cost: f64 = cost.get();
        if let Some(&best) = dist.get(&node) {
            if cost > best {
                continue;
            }
        }
        if let Some(neighbours) = adjacency.get(&node) {
            for &(next, rel_id, rank) in neighbours {
                let next_cost = cost + edge_weight(rank);
                if dist.get(&next).map_or(true, |&d| next_cost < d) {
                    dist.insert(next, next_cost);
                    prev.insert(next, (node, rel_id));
                    heap.push(HeapEntry {
                        cost: ordered_f64::NotNan::new(next_cost),
                        node: next,
                        hops: hops + 1,
                    });
                }
            }
        }
    }

    if !dist.contains_key(&target) {
        return None;
    }

    let mut path = vec![PathStep {
        entity_id: target,
        via_relationship_id: None,
    }];
    let mut cur = target;
    while let Some(&(p, rel_id)) = prev.get(&cur) {
        path.last_mut().unwrap().via_relationship_id = Some(rel_id);
        path.push(PathStep {
            entity_id: p,
            via_relationship_id: None,
        });
        cur = p;
        if cur == source {
            break;
        }
    }
    path.reverse();
    Some(path)
}

fn row_to_relationship(row: sqlx::postgres::PgRow) -> Relationship {
    Relationship {
        id: row.get("id"),
        public_id: row.get("public_id"),
        project_id: row.get("project_id"),
        source_id: row.get("source_id"),
        target_id: row.get("target_id"),
        rank: row.get("rank"),
        description: row.get("description"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(id: i64, source: i64, target: i64, rank: f32) -> Relationship {
        Relationship {
            id,
            public_id: format!("rel{id}"),
            project_id: 1,
            source_id: source,
            target_id: target,
            rank,
            description: String::new(),
        }
    }

    #[test]
    fn finds_direct_edge() {
        let edges = vec![rel(1, 10, 20, 5.0)];
        let path = dijkstra_path(&edges, 10, 20, 5).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].entity_id, 10);
        assert_eq!(path[1].entity_id, 20);
        assert_eq!(path[1].via_relationship_id, Some(1));
    }

    #[test]
    fn prefers_higher_rank_path() {
        // 10 -> 20 -> 30 direct with low rank vs weak intermediate chain with high ranks
        let edges = vec![
            rel(1, 10, 30, 0.5),  // weak direct edge, big weight
            rel(2, 10, 20, 10.0), // strong edges via 20
            rel(3, 20, 30, 10.0),
        ];
        let path = dijkstra_path(&edges, 10, 30, 5).unwrap();
        assert_eq!(
            path.iter().map(|s| s.entity_id).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
    }

    #[test]
    fn respects_max_hops() {
        let edges = vec![rel(1, 10, 20, 5.0), rel(2, 20, 30, 5.0)];
        assert!(dijkstra_path(&edges, 10, 30, 1).is_none());
        assert!(dijkstra_path(&edges, 10, 30, 2).is_some());
    }

    #[test]
    fn unreachable_returns_none() {
        let edges = vec![rel(1, 10, 20, 5.0)];
        assert!(dijkstra_path(&edges, 10, 99, 5).is_none());
    }
}
