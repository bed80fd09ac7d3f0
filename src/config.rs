/// Configuration shared by every store level.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Use the indexed unit/tree stores. When false, every query runs a full
    /// scan of the data files; useful for debugging and for A/B correctness
    /// checks against the indexed read paths.
    pub use_indexed_store: bool,
}

/// Environment variable that disables the indexed stores process-wide.
/// Any value other than empty, "0", or "false" counts as set.
pub const NOINDEX_ENV: &str = "SRCSTORE_NOINDEX";

impl Default for StoreConfig {
    fn default() -> Self {
        let noindex = std::env::var(NOINDEX_ENV)
            .map(|v| !v.is_empty() && v != "0" && v != "false")
            .unwrap_or(false);
        Self {
            use_indexed_store: !noindex,
        }
    }
}

impl StoreConfig {
    /// Enable or disable the indexed stores.
    pub fn indexed(mut self, enabled: bool) -> Self {
        self.use_indexed_store = enabled;
        self
    }
}
