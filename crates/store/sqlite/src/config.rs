/// Configuration for the SQLite archive store.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g. `sqlite://dropgate.db`, or `sqlite::memory:` for
    /// throwaway instances).
    pub url: String,

    /// Maximum number of connections in the `sqlx` pool.
    ///
    /// Note that `sqlite::memory:` gives every connection its own database,
    /// so in-memory instances should keep this at 1.
    pub pool_size: u32,

    /// Prefix applied to table names to avoid collisions (e.g. `"dropgate_"`).
    pub table_prefix: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: String::from("sqlite://dropgate.db"),
            pool_size: 5,
            table_prefix: String::from("dropgate_"),
        }
    }
}

impl SqliteConfig {
    /// A single-connection in-memory configuration, for tests and dev runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: String::from("sqlite::memory:"),
            pool_size: 1,
            ..Self::default()
        }
    }

    /// Return the batch items table name (`{prefix}batches`).
    pub(crate) fn batches_table(&self) -> String {
        format!("{}batches", self.table_prefix)
    }

    /// Return the open-counter table name (`{prefix}stats`).
    pub(crate) fn stats_table(&self) -> String {
        format!("{}stats", self.table_prefix)
    }

    /// Return the unique-visitor table name (`{prefix}unique_users`).
    pub(crate) fn unique_users_table(&self) -> String {
        format!("{}unique_users", self.table_prefix)
    }

    /// Return the retraction jobs table name (`{prefix}retraction_jobs`).
    pub(crate) fn jobs_table(&self) -> String {
        format!("{}retraction_jobs", self.table_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = SqliteConfig::default();
        assert_eq!(cfg.url, "sqlite://dropgate.db");
        assert_eq!(cfg.pool_size, 5);
        assert_eq!(cfg.table_prefix, "dropgate_");
    }

    #[test]
    fn table_names() {
        let cfg = SqliteConfig::default();
        assert_eq!(cfg.batches_table(), "dropgate_batches");
        assert_eq!(cfg.stats_table(), "dropgate_stats");
        assert_eq!(cfg.unique_users_table(), "dropgate_unique_users");
        assert_eq!(cfg.jobs_table(), "dropgate_retraction_jobs");
    }

    #[test]
    fn custom_prefix() {
        let cfg = SqliteConfig {
            table_prefix: "app_".into(),
            ..SqliteConfig::default()
        };
        assert_eq!(cfg.batches_table(), "app_batches");
    }
}
