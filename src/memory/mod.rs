//! Memory Store (C3)
//! Mission: recall similar past situations/recommendations by embedding
//! similarity, with the embedding backend fully injectable.

use crate::error::AppError;
use crate::models::MemoryEntry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Embeds free text into a fixed-dimension vector. Injected so a real
/// embedding vendor can be swapped in without touching the store.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// Deterministic, dependency-free embedding: hash each token into one of
/// `dims` buckets and accumulate a signed count, then L2-normalize. This
/// is not semantically rich, but it is stable, fully offline, and gives
/// `Recall` a real (if crude) notion of lexical similarity to test against,
/// without fabricating a vendor dependency the crate has no credential for.
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dims];
        for token in text.split_whitespace().map(|t| t.to_ascii_lowercase()) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dims;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

/// One past `(situation, recommendation)` recall hit, with its distance.
#[derive(Debug, Clone)]
pub struct Recall {
    pub entry: MemoryEntry,
    pub distance: f32,
}

pub struct MemoryStore {
    db_path: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    pub fn new(db_path: &str, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            embedder,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("failed to open memory store")
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                situation TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Immutable after insert.
    pub async fn record(&self, situation: &str, recommendation: &str) -> Result<MemoryEntry, AppError> {
        let embedding = self.embedder.embed(situation).await.map_err(AppError::internal)?;
        let entry = MemoryEntry {
            id: 0,
            situation: situation.to_string(),
            recommendation: recommendation.to_string(),
            embedding,
            created_at: Utc::now(),
        };

        let conn = self.conn().map_err(AppError::internal)?;
        conn.execute(
            "INSERT INTO memory_entries (situation, recommendation, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.situation,
                entry.recommendation,
                serde_json::to_string(&entry.embedding).map_err(AppError::internal)?,
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(AppError::internal)?;

        let id = conn.last_insert_rowid();
        Ok(MemoryEntry { id, ..entry })
    }

    /// Nearest-neighbor recall by cosine distance, ascending (closest first).
    pub async fn recall(&self, situation: &str, top_k: usize) -> Result<Vec<Recall>, AppError> {
        let query_embedding = self.embedder.embed(situation).await.map_err(AppError::internal)?;

        let conn = self.conn().map_err(AppError::internal)?;
        let mut stmt = conn
            .prepare("SELECT id, situation, recommendation, embedding, created_at FROM memory_entries")
            .map_err(AppError::internal)?;

        let mut all: Vec<Recall> = stmt
            .query_map([], |row| {
                let embedding_str: String = row.get(3)?;
                let created_at_str: String = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    embedding_str,
                    created_at_str,
                ))
            })
            .map_err(AppError::internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::internal)?
            .into_iter()
            .filter_map(|(id, situation, recommendation, embedding_str, created_at_str)| {
                let embedding: Vec<f32> = serde_json::from_str(&embedding_str).ok()?;
                let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                let distance = cosine_distance(&query_embedding, &embedding);
                Some(Recall {
                    entry: MemoryEntry {
                        id,
                        situation,
                        recommendation,
                        embedding,
                        created_at,
                    },
                    distance,
                })
            })
            .collect();

        all.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(top_k);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (MemoryStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = MemoryStore::new(
            temp.path().to_str().unwrap(),
            Arc::new(HashingEmbeddingProvider::default()),
        )
        .unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn hashing_embedding_is_normalized() {
        let embedder = HashingEmbeddingProvider::new(64);
        let v = embedder.embed("buy buy sell the dip").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn recall_ranks_closer_situations_first() {
        let (store, _temp) = test_store();
        store
            .record("AAPL earnings beat, strong guidance raise", "BUY")
            .await
            .unwrap();
        store
            .record("unrelated macro commentary about shipping rates", "HOLD")
            .await
            .unwrap();

        let hits = store
            .recall("AAPL earnings beat expectations", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.recommendation, "BUY");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn recall_respects_top_k() {
        let (store, _temp) = test_store();
        for i in 0..5 {
            store.record(&format!("situation {i}"), "HOLD").await.unwrap();
        }
        let hits = store.recall("situation 0", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
