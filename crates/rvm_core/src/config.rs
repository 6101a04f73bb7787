//! RVM instance configuration.

/// Configuration for opening an RVM directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Whether to fsync backing files and the compacted log during checkpoint.
    pub sync_on_checkpoint: bool,

    /// Whether committing a transaction with no declared modifications is an
    /// error rather than a no-op.
    pub strict_empty_commit: bool,

    /// Whether every operation emits an `info` event under the `rvm` target.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            sync_on_checkpoint: true,
            strict_empty_commit: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the commit log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether checkpoint syncs what it writes.
    #[must_use]
    pub const fn sync_on_checkpoint(mut self, value: bool) -> Self {
        self.sync_on_checkpoint = value;
        self
    }

    /// Sets whether an empty commit fails with `CommitWithNoChanges`.
    #[must_use]
    pub const fn strict_empty_commit(mut self, value: bool) -> Self {
        self.strict_empty_commit = value;
        self
    }

    /// Sets the initial verbosity.
    #[must_use]
    pub const fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }
}
