//! SQLite-backed vector store using `sqlite-vec` for cosine search.
//!
//! Row storage goes through rig-sqlite, which maintains the `repo` table
//! and its companion `repo_embeddings` vec0 virtual table. Nearest-neighbor
//! queries bypass rig's index and use `vec_distance_cosine` directly so the
//! caller can supply a precomputed query embedding. The vec0 table has no
//! `id` column; rows correlate with `repo` by rowid only.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::embeddings::{Embedding, EmbeddingModel};
use rig_sqlite::{Column, ColumnValue, SqliteVectorStore, SqliteVectorStoreTable};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, ffi};
use uuid::Uuid;

use super::{EmbeddingRecord, SearchHit, VectorStore};
use crate::types::PipelineError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoDocument {
    pub id: String,
    pub folder: String,
    pub content: String,
}

impl SqliteVectorStoreTable for RepoDocument {
    fn name() -> &'static str {
        "repo"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("folder", "TEXT").indexed(),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("folder", Box::new(self.folder.clone())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

/// Append-only [`VectorStore`] persisted to a SQLite file.
///
/// Each insert gets a fresh UUID, so reruns over the same corpus add rows
/// rather than replacing them.
#[derive(Clone)]
pub struct SqliteEmbeddingStore<E>
where
    E: EmbeddingModel + 'static,
{
    inner: SqliteVectorStore<E, RepoDocument>,
    /// Separate connection handle for raw queries not covered by rig-sqlite.
    conn: Connection,
}

impl<E> SqliteEmbeddingStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    pub async fn open(path: impl AsRef<Path>, model: &E) -> Result<Self, PipelineError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(|err| PipelineError::Storage(format!("sqlite-vec unavailable: {err}")))?;

        // Clone the connection for raw access before moving it into the store.
        let conn_for_queries = conn.clone();
        let inner = SqliteVectorStore::new(conn, model)
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        Ok(Self {
            inner,
            conn: conn_for_queries,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn register_sqlite_vec() -> Result<(), PipelineError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

    REGISTERED
        .get_or_init(|| unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        })
        .clone()
        .map_err(PipelineError::Storage)
}

#[async_trait]
impl<E> VectorStore for SqliteEmbeddingStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PipelineError> {
        let document = RepoDocument {
            id: Uuid::new_v4().to_string(),
            folder: record.folder,
            content: record.content.clone(),
        };
        let embedding = Embedding {
            document: record.content,
            vec: record.embedding.into_iter().map(f64::from).collect(),
        };
        self.inner
            .add_rows(vec![(document, OneOrMany::one(embedding))])
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        Ok(())
    }

    async fn query_nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let embedding_json = serde_json::to_string(embedding)
            .map_err(|err| PipelineError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT r.folder, r.content, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) AS distance \
                         FROM repo r \
                         JOIN repo_embeddings e ON r.rowid = e.rowid \
                         ORDER BY distance ASC \
                         LIMIT {limit}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        Ok(SearchHit {
                            folder: row.get(0)?,
                            content: row.get(1)?,
                            distance: row.get(2)?,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM repo", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| PipelineError::Storage(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hash-based rig model so the store can be exercised without network.
    #[derive(Clone)]
    struct HashEmbeddingModel;

    impl EmbeddingModel for HashEmbeddingModel {
        const MAX_DOCUMENTS: usize = 64;

        type Client = ();

        fn make(_client: &Self::Client, _model: impl Into<String>, _dims: Option<usize>) -> Self {
            HashEmbeddingModel
        }

        fn ndims(&self) -> usize {
            8
        }

        fn embed_texts(
            &self,
            texts: impl IntoIterator<Item = String> + Send,
        ) -> impl std::future::Future<
            Output = Result<Vec<Embedding>, rig::embeddings::embedding::EmbeddingError>,
        > + Send {
            let docs: Vec<String> = texts.into_iter().collect();
            async move {
                Ok(docs
                    .into_iter()
                    .map(|document| Embedding {
                        vec: hash_to_vec(&document),
                        document,
                    })
                    .collect())
            }
        }
    }

    fn hash_to_vec(text: &str) -> Vec<f64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..8)
            .map(|i| {
                let bits = seed.rotate_left((i * 8) as u32) ^ ((i as u64) << 24);
                (bits as f64) / u32::MAX as f64
            })
            .collect()
    }

    #[tokio::test]
    async fn upsert_count_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("repo.sqlite");
        let store = SqliteEmbeddingStore::open(&db_path, &HashEmbeddingModel)
            .await
            .unwrap();

        let query = vec![1.0_f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        store
            .upsert(EmbeddingRecord {
                folder: "src".into(),
                content: "first chunk".into(),
                embedding: query.clone(),
            })
            .await
            .unwrap();
        store
            .upsert(EmbeddingRecord {
                folder: "docs".into(),
                content: "second chunk".into(),
                embedding: vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            })
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.query_nearest(&query, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "first chunk");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn reruns_append_rather_than_replace() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("repo.sqlite");
        let store = SqliteEmbeddingStore::open(&db_path, &HashEmbeddingModel)
            .await
            .unwrap();

        let record = EmbeddingRecord {
            folder: "src".into(),
            content: "same text".into(),
            embedding: vec![0.5; 8],
        };
        store.upsert(record.clone()).await.unwrap();
        store.upsert(record).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
