//! Configuration for DocumentStore
//!
//! Provides a builder pattern for configuring the document store.

/// Default number of ids processed per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Configuration for the document store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database URL; the scheme selects the backend
    pub database_url: String,
    /// Maximum pooled connections (default: 5)
    pub max_connections: u32,
    /// Ids per batch for deletes, main-table fetches and index backfill (default: 100)
    pub batch_size: usize,
    /// Include the declared index list in unanswerable-query errors (default: false)
    pub verbose_diagnostics: bool,
    /// zstd level used by the default body codec (default: 3)
    pub compression_level: i32,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    max_connections: u32,
    batch_size: usize,
    verbose_diagnostics: bool,
    compression_level: i32,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            batch_size: DEFAULT_BATCH_SIZE,
            verbose_diagnostics: false,
            compression_level: 3,
        }
    }

    /// Set the maximum number of pooled connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Set the batch size (clamped to at least 1)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Enable or disable verbose diagnostics
    pub fn verbose_diagnostics(mut self, enabled: bool) -> Self {
        self.verbose_diagnostics = enabled;
        self
    }

    /// Set the zstd compression level for document bodies
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            max_connections: self.max_connections,
            batch_size: self.batch_size,
            verbose_diagnostics: self.verbose_diagnostics,
            compression_level: self.compression_level,
        }
    }
}
