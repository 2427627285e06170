//! pgvector-backed similarity search over `document_chunks`

use super::{SearchOptions, VectorStore};
use crate::models::{Category, RetrievedChunk};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

const SEARCH_SQL: &str = r#"
    SELECT id::text AS id,
           content,
           document_id::text AS document_id,
           category,
           (1 - (embedding <=> $1::vector))::float8 AS similarity
    FROM document_chunks
    WHERE ($2::text IS NULL OR category = $2)
      AND ($3::text IS NULL OR document_id::text = $3)
      AND 1 - (embedding <=> $1::vector) >= $4
    ORDER BY embedding <=> $1::vector
    LIMIT $5
"#;

pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazily connecting pool; the first query opens the connection.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn search(&self, embedding: &[f32], options: &SearchOptions) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(SEARCH_SQL)
            .bind(vector_literal(embedding))
            .bind(options.filters.category.map(|c| c.as_str().to_string()))
            .bind(options.filters.document_id.clone())
            .bind(options.threshold as f64)
            .bind(options.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let category: String = row.try_get("category")?;
            let Ok(category) = category.parse::<Category>() else {
                warn!(category = %category, "Skipping chunk with unknown category");
                continue;
            };
            let similarity: f64 = row.try_get("similarity")?;

            hits.push(RetrievedChunk {
                id: row.try_get("id")?,
                content: row.try_get("content")?,
                document_id: row.try_get("document_id")?,
                similarity: similarity.clamp(0.0, 1.0) as f32,
                category,
            });
        }

        debug!(hits = hits.len(), "pgvector search completed");
        Ok(hits)
    }
}

/// pgvector text input format: `[x1,x2,...]`
fn vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}
