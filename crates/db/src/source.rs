//! PostgreSQL snapshot source.
//!
//! Runs one `SELECT` per cycle against the schema's view. Every column is
//! cast in SQL to the type its [`FieldKind`] decodes, so the decoder never
//! has to guess; NULLs become the empty default.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use rxwatch_core::error::CoreError;
use rxwatch_core::schema::{FieldKind, MonitorSchema};
use rxwatch_core::snapshot::{FieldValue, Snapshot};
use rxwatch_core::source::SnapshotSource;

use crate::DbPool;

/// Error type for snapshot fetch failures.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Connection or query failure.
    #[error("Snapshot query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A row did not match the schema.
    #[error("Snapshot row rejected: {0}")]
    Row(#[from] CoreError),
}

/// Fetches snapshots from the monitored view.
pub struct PgSnapshotSource {
    pool: DbPool,
    schema: MonitorSchema,
    query: String,
}

impl PgSnapshotSource {
    /// Build a source for `schema`. The query text is generated once.
    pub fn new(pool: DbPool, schema: MonitorSchema) -> Self {
        let query = build_query(&schema);
        Self {
            pool,
            schema,
            query,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Decode one row: column 0 is the identifier, the rest follow
    /// [`MonitorSchema::columns`]. Rows with a NULL identifier yield `None`.
    /// `NaN` and infinities are kept as text.
    fn decode_row(
        &self,
        row: &PgRow,
    ) -> Result<Option<(String, Vec<Option<FieldValue>>)>, sqlx::Error> {
        let id: Option<String> = row.try_get(0)?;
        let Some(id) = id else {
            return Ok(None);
        };

        let mut values = Vec::new();
        for (offset, column) in self.schema.columns().iter().enumerate() {
            let idx = offset + 1;
            let value = match column.kind {
                FieldKind::Text => row.try_get::<Option<String>, _>(idx)?.map(FieldValue::Text),
                FieldKind::Integer => row.try_get::<Option<i64>, _>(idx)?.map(FieldValue::Int),
                FieldKind::Decimal => row.try_get::<Option<f64>, _>(idx)?.map(FieldValue::from),
            };
            values.push(value);
        }
        Ok(Some((id, values)))
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    type Error = SourceError;

    async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let rows = sqlx::query(&self.query).fetch_all(&self.pool).await?;

        let mut snapshot = Snapshot::new();
        for row in &rows {
            let Some((id, values)) = self.decode_row(row)? else {
                tracing::warn!(source = %self.schema.source, "Skipping row with NULL identifier");
                continue;
            };
            let record = self.schema.record_from_row(values)?;
            if snapshot.insert(id.clone(), record).is_some() {
                tracing::warn!(
                    record_id = %id,
                    "Duplicate identifier in snapshot, keeping last row"
                );
            }
        }

        tracing::debug!(rows = rows.len(), records = snapshot.len(), "Snapshot fetched");
        Ok(snapshot)
    }
}

/// Generate the snapshot query for `schema`.
///
/// Identifiers are interpolated, so callers must pass a validated schema
/// (see [`MonitorSchema::validate`]).
pub fn build_query(schema: &MonitorSchema) -> String {
    let mut select = vec![format!("CAST({} AS TEXT)", schema.id_column)];
    select.extend(
        schema
            .columns()
            .iter()
            .map(|c| format!("CAST({} AS {})", c.name, c.kind.sql_type())),
    );
    format!("SELECT {} FROM {}", select.join(", "), schema.source)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
