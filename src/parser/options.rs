//! Read-side settings and the tree validation hook

use crate::block::{DEFAULT_SEARCH_LIMIT, StoreOptions};
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// Structural check run on a freshly read tree
///
/// Returns one message per violation, each prefixed with the offending path.
pub trait TreeValidator: Send + Sync {
    fn validate(&self, tree: &Value) -> Result<(), Vec<String>>;
}

impl<F> TreeValidator for F
where
    F: Fn(&Value) -> Result<(), Vec<String>> + Send + Sync,
{
    fn validate(&self, tree: &Value) -> Result<(), Vec<String>> {
        self(tree)
    }
}

/// How a file is opened
#[derive(Clone)]
pub struct ReadOptions {
    /// Fail on tags without a converter instead of keeping them raw
    pub strict_extensions: bool,
    /// Verify block digests when payloads are materialized
    pub validate_checksums: bool,
    /// Defer block reads until an array is accessed
    pub lazy_load: bool,
    /// Map files opened by path instead of reading through the file handle
    pub memory_map: bool,
    /// Fail when no valid block index is found instead of scanning
    pub require_index: bool,
    /// How far back from the end the index is searched for
    pub index_search_limit: usize,
    pub validator: Option<Arc<dyn TreeValidator>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            strict_extensions: false,
            validate_checksums: true,
            lazy_load: true,
            memory_map: cfg!(feature = "mmap"),
            require_index: false,
            index_search_limit: DEFAULT_SEARCH_LIMIT,
            validator: None,
        }
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("strict_extensions", &self.strict_extensions)
            .field("validate_checksums", &self.validate_checksums)
            .field("lazy_load", &self.lazy_load)
            .field("memory_map", &self.memory_map)
            .field("require_index", &self.require_index)
            .field("index_search_limit", &self.index_search_limit)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict_extensions(mut self, strict: bool) -> Self {
        self.strict_extensions = strict;
        self
    }

    pub fn validate_checksums(mut self, validate: bool) -> Self {
        self.validate_checksums = validate;
        self
    }

    pub fn lazy_load(mut self, lazy: bool) -> Self {
        self.lazy_load = lazy;
        self
    }

    pub fn memory_map(mut self, map: bool) -> Self {
        self.memory_map = map;
        self
    }

    pub fn require_index(mut self, require: bool) -> Self {
        self.require_index = require;
        self
    }

    pub fn index_search_limit(mut self, bytes: usize) -> Self {
        self.index_search_limit = bytes;
        self
    }

    pub fn validator(mut self, validator: impl TreeValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            validate_checksums: self.validate_checksums,
            require_index: self.require_index,
            index_search_limit: self.index_search_limit,
        }
    }
}
