//! Config tables.
//!
//! A [`ConfigSet`] is one table: the rows decoded from a single data-blocks
//! container file, plus the key-value and key-list indices and the filters
//! registered on it. A [`ConfigDirectory`] owns the shared registry and a
//! set of named tables.
//!
//! ```no_run
//! use xrescfg_core::{ConfigDirectory, DirectoryConfig, FsSource};
//!
//! let source = FsSource::with_root("SampleData");
//! let mut dir = ConfigDirectory::init(
//!     source,
//!     ["pb_header.pb", "kind.pb"],
//!     DirectoryConfig::new(),
//! )?;
//!
//! dir.add_config("arr_in_arr_cfg", None, "arr_in_arr_cfg.bin")?
//!     .add_kv_index_auto("id")?;
//! dir.reload_all()?;
//!
//! if let Some(row) = dir.get("arr_in_arr_cfg").and_then(|t| t.get_kv_auto(10001u32)) {
//!     println!("{}", row);
//! }
//! # Ok::<(), xrescfg_core::Error>(())
//! ```

mod directory;
mod key;
mod source;

use crate::error::{Error, ErrorList, Result};
use crate::message::{DynamicMessage, Value};
use crate::registry::Registry;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub use directory::{ConfigDirectory, DirectoryConfig};
pub use key::{Key, KeyPart};
pub use source::{DataSource, FsSource, MemorySource};

/// Default container message of table files
pub const DATABLOCKS_MESSAGE: &str = "com.owent.xresloader.pb.xresloader_datablocks";

/// Default repeated-bytes field holding one serialized row per element
pub const DATABLOCKS_FIELD: &str = "data_block";

/// Extracts an index key from a row
pub type KeyFn = Box<dyn Fn(&DynamicMessage) -> Key + Send + Sync>;
/// Decides whether a row is kept
pub type FilterFn = Box<dyn Fn(&DynamicMessage) -> bool + Send + Sync>;
/// Orders rows within a key-list bucket
pub type SortFn = Box<dyn Fn(&DynamicMessage, &DynamicMessage) -> Ordering + Send + Sync>;

/// How table files are laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Qualified name of the container message
    pub container_message: String,
    /// Repeated bytes field of the container holding the rows
    pub data_block_field: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            container_message: DATABLOCKS_MESSAGE.to_string(),
            data_block_field: DATABLOCKS_FIELD.to_string(),
        }
    }
}

impl LoaderConfig {
    /// Creates a loader config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the container message name
    pub fn container_message(mut self, name: impl Into<String>) -> Self {
        self.container_message = name.into();
        self
    }

    /// Sets the data-block field name
    pub fn data_block_field(mut self, name: impl Into<String>) -> Self {
        self.data_block_field = name.into();
        self
    }
}

/// Outcome of one [`ConfigSet::reload`]
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Rows kept
    pub loaded: usize,
    /// Rows dropped by a filter
    pub filtered: usize,
    /// Rows that failed to decode, each wrapped in [`Error::Row`]
    pub errors: ErrorList,
}

impl ReloadReport {
    /// True if no row failed to decode
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct KvIndex {
    key_fn: Option<KeyFn>,
    entries: HashMap<Key, Arc<DynamicMessage>>,
}

impl KvIndex {
    fn insert(&mut self, row: &Arc<DynamicMessage>) {
        if let Some(key_fn) = &self.key_fn {
            // later rows win
            self.entries.insert(key_fn(row), Arc::clone(row));
        }
    }
}

#[derive(Default)]
struct KlIndex {
    key_fn: Option<KeyFn>,
    sort: Option<SortFn>,
    entries: HashMap<Key, Vec<Arc<DynamicMessage>>>,
}

impl KlIndex {
    fn insert(&mut self, row: &Arc<DynamicMessage>) {
        if let Some(key_fn) = &self.key_fn {
            self.entries
                .entry(key_fn(row))
                .or_default()
                .push(Arc::clone(row));
        }
    }

    fn sort_buckets(&mut self) {
        if let Some(sort) = &self.sort {
            for bucket in self.entries.values_mut() {
                bucket.sort_by(|a, b| sort(a, b));
            }
        }
    }
}

/// One config table and its indices
pub struct ConfigSet {
    registry: Arc<Registry>,
    source: Arc<dyn DataSource>,
    config: LoaderConfig,
    file_name: String,
    message_name: String,
    rows: Vec<Arc<DynamicMessage>>,
    kv_indices: Vec<KvIndex>,
    kl_indices: Vec<KlIndex>,
    filters: Vec<FilterFn>,
}

impl fmt::Debug for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSet")
            .field("file_name", &self.file_name)
            .field("message_name", &self.message_name)
            .field("rows", &self.rows.len())
            .field("kv_indices", &self.kv_indices.len())
            .field("kl_indices", &self.kl_indices.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl ConfigSet {
    /// Creates an empty table of `message_name` rows read from `file_name`
    pub fn new(
        registry: Arc<Registry>,
        source: Arc<dyn DataSource>,
        file_name: impl Into<String>,
        message_name: impl Into<String>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            registry,
            source,
            config,
            file_name: file_name.into(),
            message_name: message_name.into(),
            rows: Vec::new(),
            kv_indices: Vec::new(),
            kl_indices: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Logical name of the table file
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Qualified name of the row message
    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    /// Loaded rows in file order
    pub fn rows(&self) -> &[Arc<DynamicMessage>] {
        &self.rows
    }

    /// Drops all rows and index entries; index definitions and filters stay
    pub fn clear(&mut self) {
        self.rows.clear();
        for index in &mut self.kv_indices {
            index.entries.clear();
        }
        for index in &mut self.kl_indices {
            index.entries.clear();
        }
    }

    /// Reads the table file again and rebuilds every index.
    ///
    /// A row that fails to decode is dropped and reported in the returned
    /// [`ReloadReport`]; the remaining rows are still loaded. The call
    /// itself fails only when the container cannot be read or decoded, or
    /// when the container or row type is not registered.
    pub fn reload(&mut self) -> Result<ReloadReport> {
        self.clear();

        let registry = Arc::clone(&self.registry);
        let container_desc = registry
            .get_message_descriptor(&self.config.container_message)
            .ok_or_else(|| Error::unknown_type(self.config.container_message.as_str()))?;
        let row_desc = registry
            .get_message_descriptor(&self.message_name)
            .ok_or_else(|| Error::unknown_type(self.message_name.as_str()))?;

        let data = self.source.read(&self.file_name)?;
        let container = registry.decode_with(container_desc, &data)?;
        let blocks = container.get_field_list(self.config.data_block_field.as_str())?;

        let mut report = ReloadReport::default();
        for (index, block) in blocks.iter().enumerate() {
            let decoded = match block.as_bytes() {
                Some(bytes) => registry.decode_with(row_desc, bytes),
                None => Err(Error::TypeMismatch {
                    field: self.config.data_block_field.clone(),
                    expected: "bytes",
                    got: block.kind_name(),
                }),
            };

            let row = match decoded {
                Ok(row) => row,
                Err(e) => {
                    warn!("Dropping row {} of {}: {}", index, self.file_name, e);
                    report.errors.push(Error::row(index, self.file_name.as_str(), e));
                    continue;
                }
            };

            if !self.filters.iter().all(|filter| filter(&row)) {
                report.filtered += 1;
                continue;
            }

            self.insert_row(Arc::new(row));
            report.loaded += 1;
        }

        for index in &mut self.kl_indices {
            index.sort_buckets();
        }

        debug!(
            "Reloaded {} from {}: {} rows, {} filtered, {} failed",
            self.message_name,
            self.file_name,
            report.loaded,
            report.filtered,
            report.errors.len()
        );
        Ok(report)
    }

    fn insert_row(&mut self, row: Arc<DynamicMessage>) {
        for index in &mut self.kv_indices {
            index.insert(&row);
        }
        for index in &mut self.kl_indices {
            index.insert(&row);
        }
        self.rows.push(row);
    }

    /// Installs a key-value index in `slot`, filled from the rows already
    /// loaded. Missing slots up to `slot` are created; an index already in
    /// `slot` is replaced.
    pub fn add_kv_index<F>(&mut self, slot: usize, key_fn: F) -> &mut Self
    where
        F: Fn(&DynamicMessage) -> Key + Send + Sync + 'static,
    {
        if self.kv_indices.len() <= slot {
            self.kv_indices.resize_with(slot + 1, KvIndex::default);
        }

        let index = &mut self.kv_indices[slot];
        index.key_fn = Some(Box::new(key_fn));
        index.entries.clear();
        for row in &self.rows {
            index.insert(row);
        }
        self
    }

    /// Installs a key-list index in `slot`, filled from the rows already
    /// loaded. A sort rule set earlier on the slot is kept and applied.
    pub fn add_kl_index<F>(&mut self, slot: usize, key_fn: F) -> &mut Self
    where
        F: Fn(&DynamicMessage) -> Key + Send + Sync + 'static,
    {
        if self.kl_indices.len() <= slot {
            self.kl_indices.resize_with(slot + 1, KlIndex::default);
        }

        let index = &mut self.kl_indices[slot];
        index.key_fn = Some(Box::new(key_fn));
        index.entries.clear();
        for row in &self.rows {
            index.insert(row);
        }
        index.sort_buckets();
        self
    }

    /// Key-value index in slot 0 keyed by one scalar field of the row
    pub fn add_kv_index_auto(&mut self, field: &str) -> Result<&mut Self> {
        let descriptor = self
            .registry
            .get_message_descriptor(&self.message_name)
            .ok_or_else(|| Error::unknown_type(self.message_name.as_str()))?;
        let field_desc = descriptor
            .field_by_name(field)
            .ok_or_else(|| Error::no_such_field(self.message_name.as_str(), field))?;
        if field_desc.is_repeated() {
            return Err(Error::FieldIsRepeated {
                field: field.to_string(),
            });
        }
        if Value::default_for(field_desc.kind()).is_none() {
            return Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: "scalar key",
                got: field_desc.kind().as_str(),
            });
        }

        let field = field.to_string();
        Ok(self.add_kv_index(0, move |row| {
            Key::from_field(row, &field).unwrap_or_default()
        }))
    }

    /// Sets the bucket order of the key-list index in `slot` and re-sorts
    /// the buckets already filled
    pub fn set_kl_sort_rule<F>(&mut self, slot: usize, sort: F) -> Result<&mut Self>
    where
        F: Fn(&DynamicMessage, &DynamicMessage) -> Ordering + Send + Sync + 'static,
    {
        let index = self
            .kl_indices
            .get_mut(slot)
            .ok_or(Error::IndexSlotNotFound {
                kind: "key-list",
                slot,
            })?;
        index.sort = Some(Box::new(sort));
        index.sort_buckets();
        Ok(self)
    }

    /// Appends a row filter, returning its position in the chain.
    ///
    /// Filters apply from the next [`reload`](Self::reload) on.
    pub fn add_filter<F>(&mut self, filter: F) -> usize
    where
        F: Fn(&DynamicMessage) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(filter));
        self.filters.len() - 1
    }

    /// Row stored under `key` in key-value slot `slot`
    pub fn get_kv(&self, slot: usize, key: &Key) -> Option<&Arc<DynamicMessage>> {
        self.kv_indices.get(slot)?.entries.get(key)
    }

    /// Rows stored under `key` in key-list slot `slot`; empty when absent
    pub fn get_kl(&self, slot: usize, key: &Key) -> &[Arc<DynamicMessage>] {
        self.kl_indices
            .get(slot)
            .and_then(|index| index.entries.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Slot-0 lookup with a single-component key
    pub fn get_kv_auto(&self, key: impl Into<KeyPart>) -> Option<&Arc<DynamicMessage>> {
        self.get_kv(0, &Key::single(key))
    }
}
