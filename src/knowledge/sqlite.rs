//! SQLite 图存储：documents / chunks 两张表，chunks(doc_id, position) 即包含关系
//!
//! 向量以小端 f32 BLOB 存储；检索时全量取出后在内存中计算相似度。
//! rusqlite 为同步 API，调用放在 spawn_blocking 中执行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

use crate::knowledge::{
    CandidateChunk, Chunk, Document, DocumentSummary, GraphBackend, KnowledgeError,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    doc_id        TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id  TEXT PRIMARY KEY,
    doc_id    TEXT NOT NULL REFERENCES documents(doc_id),
    position  INTEGER NOT NULL,
    text      TEXT NOT NULL,
    embedding BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id, position);
";

/// f32 切片转为 BLOB
pub fn f32_slice_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// BLOB 还原为 f32 向量
pub fn blob_to_f32_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn storage_err(e: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Storage(e.to_string())
}

pub struct SqliteGraph {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraph {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }
        Self::init(Connection::open(path).map_err(storage_err)?)
    }

    pub fn open_in_memory() -> Result<Self, KnowledgeError> {
        Self::init(Connection::open_in_memory().map_err(storage_err)?)
    }

    fn init(conn: Connection) -> Result<Self, KnowledgeError> {
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, KnowledgeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, KnowledgeError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| storage_err("sqlite lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(storage_err)?
    }
}

fn parse_metadata(json: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl GraphBackend for SqliteGraph {
    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<(), KnowledgeError> {
        let document = document.clone();
        let chunks = chunks.to_vec();
        self.with_conn(move |conn| {
            let metadata_json = serde_json::to_string(&document.metadata).map_err(storage_err)?;
            let tx = conn.transaction().map_err(storage_err)?;
            tx.execute(
                "INSERT INTO documents (doc_id, title, metadata_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(doc_id) DO UPDATE SET title = excluded.title, metadata_json = excluded.metadata_json",
                params![document.doc_id, document.title, metadata_json, document.created_at],
            )
            .map_err(storage_err)?;
            for chunk in &chunks {
                tx.execute(
                    "INSERT INTO chunks (chunk_id, doc_id, position, text, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(chunk_id) DO UPDATE SET text = excluded.text, embedding = excluded.embedding, position = excluded.position",
                    params![
                        chunk.chunk_id,
                        document.doc_id,
                        chunk.position as i64,
                        chunk.text,
                        f32_slice_to_blob(&chunk.embedding)
                    ],
                )
                .map_err(storage_err)?;
            }
            let pruned = tx
                .execute(
                    "DELETE FROM chunks WHERE doc_id = ?1 AND position >= ?2",
                    params![document.doc_id, chunks.len() as i64],
                )
                .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            if pruned > 0 {
                tracing::info!(doc_id = %document.doc_id, pruned, "Pruned stale chunks on re-ingestion");
            }
            Ok(())
        })
        .await
    }

    async fn fetch_candidates(&self, limit: Option<usize>) -> Result<Vec<CandidateChunk>, KnowledgeError> {
        // LIMIT -1 表示不限
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.chunk_id, c.position, c.text, c.embedding,
                            d.doc_id, d.title, d.metadata_json, d.created_at
                     FROM documents d JOIN chunks c ON c.doc_id = d.doc_id
                     ORDER BY d.rowid, c.position
                     LIMIT ?1",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    let metadata_json: String = row.get(6)?;
                    Ok(CandidateChunk {
                        chunk: Chunk {
                            chunk_id: row.get(0)?,
                            position: row.get::<_, i64>(1)? as usize,
                            text: row.get(2)?,
                            embedding: blob_to_f32_vec(&blob),
                        },
                        document: Document {
                            doc_id: row.get(4)?,
                            title: row.get(5)?,
                            metadata: parse_metadata(&metadata_json),
                            created_at: row.get(7)?,
                        },
                    })
                })
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KnowledgeError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT d.doc_id, d.title, d.metadata_json, d.created_at,
                            (SELECT COUNT(*) FROM chunks c WHERE c.doc_id = d.doc_id)
                     FROM documents d ORDER BY d.rowid",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let metadata_json: String = row.get(2)?;
                    Ok(DocumentSummary {
                        document: Document {
                            doc_id: row.get(0)?,
                            title: row.get(1)?,
                            metadata: parse_metadata(&metadata_json),
                            created_at: row.get(3)?,
                        },
                        chunk_count: row.get::<_, i64>(4)? as usize,
                    })
                })
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }
}
