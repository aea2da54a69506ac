//! Schema repair
//!
//! A missing main or index table is not fatal: the failed call is classified,
//! the table is (re)created with [`DocumentStore::ensure_table`], and the
//! call is replayed once. Repair itself runs outside this loop and is never
//! retried.

use std::future::Future;

use crate::backend::Backend;
use crate::error::{DocumentStoreError, Result};
use crate::store::DocumentStore;
use crate::table::Table;

/// Replays after a successful repair
const MAX_REPLAYS: usize = 1;

/// Outcome of one attempt at a backend call
#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Ok(T),
    /// A table the call needs does not exist
    SchemaMissing(DocumentStoreError),
    Failed(DocumentStoreError),
}

impl<T> Attempt<T> {
    pub(crate) fn classify(backend: Backend, result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Ok(value),
            Err(DocumentStoreError::Sql(err)) if backend.is_missing_schema(&err) => {
                Attempt::SchemaMissing(DocumentStoreError::Sql(err))
            }
            Err(err) => Attempt::Failed(err),
        }
    }
}

impl DocumentStore {
    /// Run `op`, repairing the table's schema and replaying at most once when
    /// it fails because a table is missing.
    ///
    /// If the repair fails the original error is returned. A failure after
    /// the replay is returned as is.
    pub(crate) async fn with_repair<T, F, Fut>(&self, table: &Table, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut replays = 0;
        loop {
            let err = match Attempt::classify(self.backend(), op().await) {
                Attempt::Ok(value) => return Ok(value),
                Attempt::Failed(err) => return Err(err),
                Attempt::SchemaMissing(err) if replays >= MAX_REPLAYS => return Err(err),
                Attempt::SchemaMissing(err) => err,
            };

            tracing::warn!(
                table = %table.name,
                error = %err,
                "Table missing, repairing schema"
            );
            if let Err(repair_err) = self.ensure_table(table).await {
                tracing::warn!(
                    table = %table.name,
                    error = %repair_err,
                    "Schema repair failed"
                );
                return Err(err);
            }
            replays += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    async fn memory_store() -> DocumentStore {
        let config = StoreConfig::builder("sqlite::memory:").max_connections(1).build();
        DocumentStore::connect(config).await.unwrap()
    }

    /// A call that always fails on a table nothing ever creates
    async fn query_missing_table(store: &DocumentStore) -> Result<()> {
        sqlx::query("SELECT * FROM \"never_created\"")
            .execute(store.pool())
            .await?;
        Ok(())
    }

    #[test]
    fn test_classify_ok() {
        assert!(matches!(
            Attempt::classify(Backend::Sqlite, Ok(3)),
            Attempt::Ok(3)
        ));
    }

    #[test]
    fn test_classify_other_errors() {
        let attempt: Attempt<()> = Attempt::classify(
            Backend::Postgres,
            Err(DocumentStoreError::validation("bad input")),
        );
        assert!(matches!(attempt, Attempt::Failed(DocumentStoreError::Validation(_))));

        let attempt: Attempt<()> =
            Attempt::classify(Backend::Sqlite, Err(sqlx::Error::RowNotFound.into()));
        assert!(matches!(attempt, Attempt::Failed(DocumentStoreError::Sql(_))));
    }

    #[tokio::test]
    async fn test_replays_once_then_surfaces_failure() {
        let store = memory_store().await;
        let table = Table::new("posts");
        let mut calls = 0;

        let err = store
            .with_repair(&table, || {
                calls += 1;
                query_missing_table(&store)
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 2);
        match err {
            DocumentStoreError::Sql(err) => assert!(Backend::Sqlite.is_missing_schema(&err)),
            other => panic!("unexpected error: {other}"),
        }
        // The repair itself ran
        let mut conn = store.pool().acquire().await.unwrap();
        assert!(
            crate::maintainer::table_exists(&mut conn, Backend::Sqlite, "posts")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_repair_returns_original_error() {
        let store = memory_store().await;
        let table = Table::new("Not A Valid Name");
        let mut calls = 0;

        let err = store
            .with_repair(&table, || {
                calls += 1;
                query_missing_table(&store)
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, DocumentStoreError::Sql(_)));
    }

    #[tokio::test]
    async fn test_success_is_not_replayed() {
        let store = memory_store().await;
        let table = Table::new("posts");
        let mut calls = 0;

        let value = store
            .with_repair(&table, || {
                calls += 1;
                async { Ok(5) }
            })
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert_eq!(calls, 1);
    }
}
