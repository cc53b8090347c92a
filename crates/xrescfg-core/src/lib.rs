//! # xrescfg-core
//!
//! Schema-less protocol buffers driven by descriptors loaded at runtime, and
//! indexed config tables built on top of them.
//!
//! This crate provides the core functionality for:
//! - Registering serialized `FileDescriptorSet`s and looking types up by name
//! - Reading and writing messages reflectively, with type-checked field access
//! - Encoding and decoding the protobuf wire format without generated code
//! - Loading xresloader-style data-block tables into key-value and key-list
//!   indices
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`registry`]: Descriptor registry and descriptor types
//! - [`message`]: Dynamic messages, field values and the wire codec
//! - [`config`]: Config tables, index keys, data sources
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xrescfg_core::{ConfigSet, FsSource, LoaderConfig, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register_file("pb_header.pb")?;
//! registry.register_file("kind.pb")?;
//! let registry = Arc::new(registry);
//!
//! let mut table = ConfigSet::new(
//!     Arc::clone(&registry),
//!     Arc::new(FsSource::new()),
//!     "arr_in_arr_cfg.bin",
//!     "arr_in_arr_cfg",
//!     LoaderConfig::default(),
//! );
//! table.add_kv_index_auto("id")?;
//! table.reload()?;
//!
//! if let Some(row) = table.get_kv_auto(10001u32) {
//!     for item in row.get_field_list("arr")? {
//!         if let Some(item) = item.as_message() {
//!             if let Some(name) = item.get_field_value("name")? {
//!                 println!("Name={}", name);
//!             }
//!         }
//!     }
//! }
//! # Ok::<(), xrescfg_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`DataSource`]: Customize where table and descriptor files are read from

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod message;
pub mod registry;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use config::{
    ConfigDirectory, ConfigSet, DataSource, DirectoryConfig, FsSource, Key, KeyPart, LoaderConfig,
    MemorySource, ReloadReport, DATABLOCKS_FIELD, DATABLOCKS_MESSAGE,
};
pub use error::{Error, ErrorList, Result};
pub use message::{DynamicMessage, FieldSelector, Value};
pub use registry::{
    Cardinality, EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldKind,
    MessageDescriptor, Registry,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
