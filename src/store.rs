//! DocumentStore - main entry point for indexed document storage
//!
//! Documents live in a main table as an encoded body plus reserved columns.
//! Each declared index is a separate table of typed columns maintained by
//! [`crate::maintainer`]. Reads are routed by [`crate::planner`], and every
//! backend call goes through the schema repair loop in [`crate::repair`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyConnection, AnyPool, Row, Transaction};

use crate::backend::Backend;
use crate::codec::{BodyCodec, CompressedJsonCodec};
use crate::config::StoreConfig;
use crate::criteria::{Bounds, Criteria};
use crate::document::{
    self, BODY_COLUMN, CREATED_FIELD, Document, ID_FIELD, ROWID_FIELD, RowMeta, UPDATED_FIELD,
};
use crate::error::{DocumentStoreError, Result};
use crate::maintainer::{self, IndexRows};
use crate::planner::{self, Plan, main_select_list};
use crate::sql::bind::{SqlParam, bind_all, placeholders};
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::quote_identifier;
use crate::table::Table;
use crate::types::IndexDefinition;

/// One page of results from [`DocumentStore::get_page`]
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub documents: Vec<Document>,
    /// Whether at least one more document matches past this page
    pub has_more: bool,
}

/// Document store over a relational backend
///
/// Each multi-statement write (insert, update, one batch of a delete) runs in
/// its own transaction. Nothing spans operations.
pub struct DocumentStore {
    /// Database connection pool
    pool: AnyPool,
    /// Engine behind the pool
    backend: Backend,
    /// Store configuration
    config: StoreConfig,
    /// Body encoder
    codec: Arc<dyn BodyCodec>,
}

impl DocumentStore {
    /// Connect using the configuration's database URL
    ///
    /// The URL scheme selects the backend.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let backend = Backend::from_url(&config.database_url)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                DocumentStoreError::Connection(format!("Database connection failed: {}", e))
            })?;

        tracing::info!(
            backend = backend.name(),
            max_connections = config.max_connections,
            "Connected document store"
        );
        Ok(Self::from_pool(pool, backend, config))
    }

    /// Create a DocumentStore from an existing pool
    ///
    /// Use this when you already have a connection pool and want to
    /// share it with the document store.
    pub fn from_pool(pool: AnyPool, backend: Backend, config: StoreConfig) -> Self {
        let codec = Arc::new(CompressedJsonCodec::new(config.compression_level));
        Self {
            pool,
            backend,
            config,
            codec,
        }
    }

    /// Replace the body codec
    pub fn with_codec(mut self, codec: impl BodyCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    // =========================================================================
    // Schema Operations
    // =========================================================================

    /// Create the main table and every declared index table that is missing
    ///
    /// Index tables created here are backfilled from existing documents.
    /// Indexes with a spatial field are skipped on relational backends.
    pub async fn ensure_table(&self, table: &Table) -> Result<()> {
        table.validate()?;
        let ddl = DdlGenerator::new(self.backend);

        let mut created = Vec::new();
        let main_existed = {
            let mut conn = self.pool.acquire().await?;
            let existed = maintainer::table_exists(&mut conn, self.backend, &table.name).await?;
            if !existed {
                sqlx::query(&ddl.generate_create_table(&table.name))
                    .execute(&mut *conn)
                    .await?;
                tracing::info!(table = %table.name, "Created main table");
            }

            for index in &table.indexes {
                if index.has_spatial_field() {
                    tracing::warn!(
                        table = %table.name,
                        fields = ?index.field_names(),
                        backend = self.backend.name(),
                        "Skipping spatial index on relational backend"
                    );
                    continue;
                }
                if maintainer::create_index_table(&mut conn, self.backend, table, index).await? {
                    created.push(index);
                }
            }
            existed
        };

        if main_existed {
            for index in created {
                self.backfill_or_discard(table, index).await?;
            }
        }
        Ok(())
    }

    /// Materialize one index, backfilling it if it did not exist yet
    pub async fn set_index(&self, table: &Table, index: &IndexDefinition) -> Result<()> {
        table.clone().with_index(index.clone()).validate()?;
        if index.has_spatial_field() {
            return Err(DocumentStoreError::unsupported(format!(
                "spatial index {:?} on {}",
                index.field_names(),
                self.backend.name()
            )));
        }

        self.with_repair(table, || self.set_index_once(table, index))
            .await
    }

    async fn set_index_once(&self, table: &Table, index: &IndexDefinition) -> Result<()> {
        let created = {
            let mut conn = self.pool.acquire().await?;
            maintainer::create_index_table(&mut conn, self.backend, table, index).await?
        };
        if created {
            self.backfill_or_discard(table, index).await?;
        }
        Ok(())
    }

    /// Drop the main table and every index table
    pub async fn drop_table(&self, table: &Table) -> Result<()> {
        let ddl = DdlGenerator::new(self.backend);
        let mut conn = self.pool.acquire().await?;
        for physical_name in table.index_table_names() {
            sqlx::query(&ddl.generate_drop_table(&physical_name))
                .execute(&mut *conn)
                .await?;
        }
        sqlx::query(&ddl.generate_drop_table(&table.name))
            .execute(&mut *conn)
            .await?;
        tracing::info!(table = %table.name, "Dropped table");
        Ok(())
    }

    /// Backfill a freshly created index table, dropping it again on failure
    /// so the next `ensure_table` or `set_index` recreates and refills it
    async fn backfill_or_discard(&self, table: &Table, index: &IndexDefinition) -> Result<()> {
        let Err(err) = self.backfill_index(table, index).await else {
            return Ok(());
        };

        let physical_name = index.physical_name(&table.name);
        tracing::warn!(
            table = %table.name,
            index_table = %physical_name,
            error = %err,
            "Backfill failed, dropping index table"
        );
        let drop_sql = DdlGenerator::new(self.backend).generate_drop_table(&physical_name);
        if let Err(drop_err) = sqlx::query(&drop_sql).execute(&self.pool).await {
            tracing::warn!(
                index_table = %physical_name,
                error = %drop_err,
                "Could not drop partially backfilled index table"
            );
        }
        Err(err)
    }

    /// Populate a freshly created index table from the main table, walking
    /// `_rowid` in batches
    async fn backfill_index(&self, table: &Table, index: &IndexDefinition) -> Result<u64> {
        let batch_size = self.config.batch_size;
        let select_sql = format!(
            "SELECT {}, {}, {} FROM {} WHERE {} > $1 ORDER BY {} ASC{}",
            quote_identifier(ROWID_FIELD),
            quote_identifier(ID_FIELD),
            quote_identifier(BODY_COLUMN),
            quote_identifier(&table.name),
            quote_identifier(ROWID_FIELD),
            quote_identifier(ROWID_FIELD),
            self.backend.limit_clause(Some(batch_size as u64), 0)
        );

        let mut after: i64 = 0;
        let mut written = 0;
        loop {
            let rows = sqlx::query(&select_sql)
                .bind(after)
                .fetch_all(&self.pool)
                .await?;
            let Some(last) = rows.last() else {
                break;
            };
            after = last.try_get(ROWID_FIELD)?;

            let mut tx = self.pool.begin().await?;
            let outcome = self.backfill_batch(&mut tx, table, index, &rows).await;
            written += settle(tx, outcome).await?;

            if rows.len() < batch_size {
                break;
            }
        }

        tracing::info!(
            table = %table.name,
            index_table = %index.physical_name(&table.name),
            rows = written,
            "Backfilled index table"
        );
        Ok(written)
    }

    async fn backfill_batch(
        &self,
        conn: &mut AnyConnection,
        table: &Table,
        index: &IndexDefinition,
        rows: &[AnyRow],
    ) -> Result<u64> {
        let mut written = 0;
        for row in rows {
            let id: String = row.try_get(ID_FIELD)?;
            let bytes: Vec<u8> = row.try_get(BODY_COLUMN)?;
            let body = self.codec.decode(&bytes)?;

            let planned = match maintainer::plan_rows_for(table, index, &body) {
                Ok(planned) => planned,
                Err(err) if err.is_input_error() => {
                    tracing::warn!(
                        table = %table.name,
                        id = %id,
                        error = %err,
                        "Document cannot be indexed, skipping"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            written += planned.rows.len() as u64;
            maintainer::insert_index_rows(conn, table, &id, std::slice::from_ref(&planned)).await?;
        }
        Ok(written)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Insert a document and return it with its reserved fields populated
    ///
    /// Reserved fields in the payload are ignored. The main row and every
    /// index row are written in one transaction.
    pub async fn insert(&self, table: &Table, payload: Value) -> Result<Document> {
        let body = table.prepare(into_document(payload)?)?;
        let planned = maintainer::plan_index_rows(table, &body)?;
        let encoded = self.codec.encode(&body)?;

        self.with_repair(table, || self.insert_once(table, &body, &encoded, &planned))
            .await
    }

    async fn insert_once(
        &self,
        table: &Table,
        body: &Document,
        encoded: &[u8],
        planned: &[IndexRows],
    ) -> Result<Document> {
        let id = document::generate_id();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        let outcome = self
            .insert_rows(&mut tx, table, &id, now, encoded, planned)
            .await;
        let rowid = settle(tx, outcome).await?;

        let meta = RowMeta {
            id,
            rowid,
            created: now,
            updated: now,
        };
        Ok(document::attach_reserved(&meta, body.clone()))
    }

    async fn insert_rows(
        &self,
        conn: &mut AnyConnection,
        table: &Table,
        id: &str,
        now: i64,
        encoded: &[u8],
        planned: &[IndexRows],
    ) -> Result<i64> {
        let insert_sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES ($1, $2, $3, $4) RETURNING {}",
            quote_identifier(&table.name),
            quote_identifier(ID_FIELD),
            quote_identifier(CREATED_FIELD),
            quote_identifier(UPDATED_FIELD),
            quote_identifier(BODY_COLUMN),
            quote_identifier(ROWID_FIELD)
        );

        let row = sqlx::query(&insert_sql)
            .bind(id.to_string())
            .bind(now)
            .bind(now)
            .bind(encoded.to_vec())
            .fetch_one(&mut *conn)
            .await?;
        let rowid: i64 = row.try_get(ROWID_FIELD)?;

        maintainer::insert_index_rows(conn, table, id, planned).await?;
        Ok(rowid)
    }

    /// Replace the body of a document and re-derive its index rows
    ///
    /// This is a full replace, not a patch. Index rows are deleted and then
    /// reinserted inside the transaction; concurrent writers to the same id
    /// can still interleave between the two steps under the backend's
    /// default isolation level.
    pub async fn update(&self, table: &Table, id: &str, payload: Value) -> Result<Document> {
        if id.is_empty() {
            return Err(DocumentStoreError::validation("Document id must not be empty"));
        }
        let body = table.prepare(into_document(payload)?)?;
        let planned = maintainer::plan_index_rows(table, &body)?;
        let encoded = self.codec.encode(&body)?;

        self.with_repair(table, || self.update_once(table, id, &body, &encoded, &planned))
            .await
    }

    async fn update_once(
        &self,
        table: &Table,
        id: &str,
        body: &Document,
        encoded: &[u8],
        planned: &[IndexRows],
    ) -> Result<Document> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        let outcome = self
            .update_rows(&mut tx, table, id, now, encoded, planned)
            .await;
        let meta = settle(tx, outcome).await?;

        Ok(document::attach_reserved(&meta, body.clone()))
    }

    async fn update_rows(
        &self,
        conn: &mut AnyConnection,
        table: &Table,
        id: &str,
        now: i64,
        encoded: &[u8],
        planned: &[IndexRows],
    ) -> Result<RowMeta> {
        let update_sql = format!(
            "UPDATE {} SET {} = $1, {} = $2 WHERE {} = $3 RETURNING {}, {}",
            quote_identifier(&table.name),
            quote_identifier(BODY_COLUMN),
            quote_identifier(UPDATED_FIELD),
            quote_identifier(ID_FIELD),
            quote_identifier(ROWID_FIELD),
            quote_identifier(CREATED_FIELD)
        );

        let row = sqlx::query(&update_sql)
            .bind(encoded.to_vec())
            .bind(now)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DocumentStoreError::document_not_found(id))?;

        let meta = RowMeta {
            id: id.to_string(),
            rowid: row.try_get(ROWID_FIELD)?,
            created: row.try_get(CREATED_FIELD)?,
            updated: now,
        };

        maintainer::delete_index_rows(conn, table, &[id.to_string()]).await?;
        maintainer::insert_index_rows(conn, table, id, planned).await?;
        Ok(meta)
    }

    /// Delete every document matching the criteria, in batches
    ///
    /// An empty where-clause is refused unless `force` is set. Each batch is
    /// its own transaction; batches committed before a failure stay deleted.
    /// Returns the number of documents deleted.
    pub async fn kill(&self, table: &Table, criteria: &Criteria, force: bool) -> Result<u64> {
        if !criteria.has_filters() && !force {
            return Err(DocumentStoreError::UnrestrictedDelete(table.name.clone()));
        }

        let criteria = criteria.clone().kill_sort();
        let plan = planner::resolve_target(table, &criteria, self.config.verbose_diagnostics)?;
        let bounds = criteria.bounds();

        self.with_repair(table, || self.kill_batches(table, &plan, bounds))
            .await
    }

    async fn kill_batches(&self, table: &Table, plan: &Plan, bounds: Bounds) -> Result<u64> {
        let batch_size = self.config.batch_size as u64;
        let mut remaining = bounds.limit;
        let mut deleted = 0;

        loop {
            let take = remaining.map_or(batch_size, |r| r.min(batch_size));
            if take == 0 {
                break;
            }

            let mut tx = self.pool.begin().await?;
            let outcome = self.kill_batch(&mut tx, table, plan, take, bounds.offset).await;
            let (selected, count) = settle(tx, outcome).await?;

            tracing::debug!(table = %table.name, batch = count, "Deleted batch");
            deleted += count;
            if let Some(r) = remaining.as_mut() {
                *r -= selected;
            }
            if selected < take {
                break;
            }
        }

        tracing::info!(table = %table.name, deleted, "Deleted documents");
        Ok(deleted)
    }

    /// Delete one batch; returns the ids selected and the documents deleted,
    /// which differ when some selected ids were orphans
    async fn kill_batch(
        &self,
        conn: &mut AnyConnection,
        table: &Table,
        plan: &Plan,
        take: u64,
        offset: u64,
    ) -> Result<(u64, u64)> {
        let select_sql = plan.select_ids_sql(self.backend, Some(take), offset);
        let ids = select_ids(conn, &select_sql, &plan.filter.params).await?;
        if ids.is_empty() {
            return Ok((0, 0));
        }

        maintainer::delete_index_rows(conn, table, &ids).await?;

        let mut param_offset = 1;
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_identifier(&table.name),
            quote_identifier(ID_FIELD),
            placeholders(ids.len(), &mut param_offset)
        );
        let params: Vec<SqlParam> = ids.iter().cloned().map(SqlParam::Text).collect();
        let deleted = bind_all(sqlx::query(&delete_sql), &params)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        Ok((ids.len() as u64, deleted))
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Documents matching the criteria, in criteria order
    pub async fn get(&self, table: &Table, criteria: &Criteria) -> Result<Vec<Document>> {
        let plan = planner::resolve_target(table, criteria, self.config.verbose_diagnostics)?;
        let bounds = criteria.bounds();

        self.with_repair(table, || self.fetch(table, &plan, bounds.limit, bounds.offset))
            .await
    }

    /// One page of documents plus whether more exist
    ///
    /// Fetches `limit + 1` rows and uses the extra one only to set
    /// [`Page::has_more`].
    pub async fn get_page(&self, table: &Table, criteria: &Criteria) -> Result<Page> {
        let plan = planner::resolve_target(table, criteria, self.config.verbose_diagnostics)?;
        let bounds = criteria.bounds();

        let mut documents = self
            .with_repair(table, || self.fetch(table, &plan, bounds.probe, bounds.offset))
            .await?;

        let has_more = match bounds.limit {
            Some(limit) if documents.len() as u64 > limit => {
                documents.truncate(limit as usize);
                true
            }
            _ => false,
        };
        Ok(Page {
            documents,
            has_more,
        })
    }

    /// Look up one document by `_id`
    pub async fn get_by_id(&self, table: &Table, id: &str) -> Result<Option<Document>> {
        let criteria = Criteria::new().is(ID_FIELD, id).limit(1);
        Ok(self.get(table, &criteria).await?.into_iter().next())
    }

    /// Number of distinct documents matching the criteria; bounds are ignored
    pub async fn get_count(&self, table: &Table, criteria: &Criteria) -> Result<u64> {
        let plan = planner::resolve_target(table, criteria, self.config.verbose_diagnostics)?;

        self.with_repair(table, || self.count_once(&plan)).await
    }

    async fn count_once(&self, plan: &Plan) -> Result<u64> {
        let row = bind_all(sqlx::query(&plan.count_sql()), &plan.filter.params)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn fetch(
        &self,
        table: &Table,
        plan: &Plan,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<Document>> {
        if !plan.uses_index() {
            let select_sql = plan.select_rows_sql(self.backend, limit, offset);
            let rows = bind_all(sqlx::query(&select_sql), &plan.filter.params)
                .fetch_all(&self.pool)
                .await?;
            return rows.iter().map(|row| self.decode_row(row)).collect();
        }

        let (ids, fetched) = {
            let mut conn = self.pool.acquire().await?;
            let select_sql = plan.select_ids_sql(self.backend, limit, offset);
            let ids = select_ids(&mut conn, &select_sql, &plan.filter.params).await?;
            let fetched = self.fetch_main_rows(&mut conn, table, &ids).await?;
            (ids, fetched)
        };

        // The main-table fetch is unordered; put documents back in index order
        let positions: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();
        let mut slots: Vec<Option<Document>> = vec![None; ids.len()];
        for document in fetched {
            let position = document
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .and_then(|id| positions.get(id));
            if let Some(&position) = position {
                slots[position] = Some(document);
            }
        }

        let orphans: Vec<String> = ids
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        if !orphans.is_empty() {
            self.clean_orphans(table, &orphans).await;
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn fetch_main_rows(
        &self,
        conn: &mut AnyConnection,
        table: &Table,
        ids: &[String],
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.batch_size) {
            let mut param_offset = 1;
            let select_sql = format!(
                "SELECT {} FROM {} WHERE {} IN ({})",
                main_select_list(),
                quote_identifier(&table.name),
                quote_identifier(ID_FIELD),
                placeholders(chunk.len(), &mut param_offset)
            );
            let params: Vec<SqlParam> = chunk.iter().cloned().map(SqlParam::Text).collect();
            let rows = bind_all(sqlx::query(&select_sql), &params)
                .fetch_all(&mut *conn)
                .await?;
            for row in &rows {
                documents.push(self.decode_row(row)?);
            }
        }
        Ok(documents)
    }

    /// Remove index rows whose document no longer exists. Failures are
    /// logged and otherwise ignored.
    async fn clean_orphans(&self, table: &Table, orphans: &[String]) {
        tracing::warn!(
            table = %table.name,
            count = orphans.len(),
            ids = ?orphans,
            "Dropping orphaned index entries"
        );

        let cleanup = async {
            let mut tx = self.pool.begin().await?;
            let outcome = maintainer::delete_index_rows(&mut tx, table, orphans).await;
            settle(tx, outcome).await
        };
        if let Err(err) = cleanup.await {
            tracing::warn!(
                table = %table.name,
                error = %err,
                "Orphan cleanup failed"
            );
        }
    }

    fn decode_row(&self, row: &AnyRow) -> Result<Document> {
        let meta = RowMeta {
            id: row.try_get(ID_FIELD)?,
            rowid: row.try_get(ROWID_FIELD)?,
            created: row.try_get(CREATED_FIELD)?,
            updated: row.try_get(UPDATED_FIELD)?,
        };
        let bytes: Vec<u8> = row.try_get(BODY_COLUMN)?;
        let body = self.codec.decode(&bytes)?;
        Ok(document::attach_reserved(&meta, body))
    }
}

/// Commit on success, roll back and pass the error through otherwise
async fn settle<T>(tx: Transaction<'static, Any>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(error = %err, "Rolling back transaction");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

async fn select_ids(
    conn: &mut AnyConnection,
    select_sql: &str,
    params: &[SqlParam],
) -> Result<Vec<String>> {
    let rows = bind_all(sqlx::query(select_sql), params)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>(ID_FIELD).map_err(Into::into))
        .collect()
}

fn into_document(payload: Value) -> Result<Document> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(DocumentStoreError::validation(
            "Document must be a JSON object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_document() {
        assert!(into_document(json!({"a": 1})).is_ok());
        assert!(matches!(
            into_document(json!([1, 2])),
            Err(DocumentStoreError::Validation(_))
        ));
        assert!(into_document(Value::Null).is_err());
    }
}
