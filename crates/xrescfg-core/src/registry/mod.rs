//! Descriptor registry.
//!
//! The [`Registry`] parses serialized `FileDescriptorSet`s into lookup tables
//! keyed by qualified name. It is filled once, wrapped in an [`Arc`] and then
//! shared read-only by every [`DynamicMessage`] and config table built from
//! it. Registration needs `&mut self`, so it cannot race with readers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use xrescfg_core::Registry;
//!
//! let mut registry = Registry::new();
//! registry.register_file("pb_header.pb")?;
//! registry.register_file("kind.pb")?;
//! let registry = Arc::new(registry);
//!
//! let mut item = registry.create("demo.Item")?;
//! item.set_field_value("id", 10001u32)?;
//! # Ok::<(), xrescfg_core::Error>(())
//! ```

mod descriptor;

use crate::error::{Error, ErrorList, Result};
use crate::message::DynamicMessage;
use prost::Message;
use prost_types::{DescriptorProto, EnumDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub use descriptor::{
    Cardinality, EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldKind,
    MessageDescriptor,
};

/// Lookup tables for every registered file, message, enum and enum value
#[derive(Debug, Default)]
pub struct Registry {
    files: BTreeMap<String, FileDescriptorProto>,
    messages: BTreeMap<String, Arc<MessageDescriptor>>,
    enums: BTreeMap<String, Arc<EnumDescriptor>>,
    enum_values: BTreeMap<String, EnumValueDescriptor>,
}

/// `package.name`, or bare `name` when the scope is empty
fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a serialized `FileDescriptorSet`.
    ///
    /// Files already known by name are skipped. Name collisions of messages
    /// or enums keep the first registration and are reported together once
    /// every file in the set has been processed.
    pub fn register(&mut self, data: &[u8]) -> Result<()> {
        let set = FileDescriptorSet::decode(data)?;
        self.register_set(set)
    }

    /// Reads and registers a `FileDescriptorSet` from disk
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        self.register(&data)
    }

    /// Registers an already decoded `FileDescriptorSet`
    pub fn register_set(&mut self, set: FileDescriptorSet) -> Result<()> {
        let mut errors = ErrorList::new();

        for file in set.file {
            if self.files.contains_key(file.name()) {
                debug!("Skipping already registered file {}", file.name());
                continue;
            }

            let package = file.package().to_string();
            for enum_type in &file.enum_type {
                self.register_enum(&package, enum_type, &mut errors);
            }
            for message in &file.message_type {
                self.register_message(&package, &package, message, &mut errors);
            }

            debug!(
                "Registered file {} ({} messages, {} enums)",
                file.name(),
                file.message_type.len(),
                file.enum_type.len()
            );
            self.files.insert(file.name().to_string(), file);
        }

        errors.into_result()
    }

    fn register_enum(&mut self, scope: &str, proto: &EnumDescriptorProto, errors: &mut ErrorList) {
        let full_name = qualify(scope, proto.name());
        if self.enums.contains_key(&full_name) {
            warn!("Enum descriptor {} already existed", full_name);
            errors.push(Error::DuplicateEnum { name: full_name });
            return;
        }

        let descriptor = EnumDescriptor::from_proto(full_name.clone(), proto);
        for value in descriptor.values() {
            self.enum_values
                .insert(value.full_name().to_string(), value.clone());
        }
        self.enums.insert(full_name, Arc::new(descriptor));
    }

    fn register_message(
        &mut self,
        package: &str,
        scope: &str,
        proto: &DescriptorProto,
        errors: &mut ErrorList,
    ) {
        let full_name = qualify(scope, proto.name());
        if self.messages.contains_key(&full_name) {
            warn!("Message descriptor {} already existed", full_name);
            errors.push(Error::DuplicateMessage { name: full_name });
            return;
        }

        for enum_type in &proto.enum_type {
            self.register_enum(&full_name, enum_type, errors);
        }
        for nested in &proto.nested_type {
            self.register_message(package, &full_name, nested, errors);
        }

        for field in &proto.field {
            if FieldDescriptor::from_proto(field).is_none() {
                warn!(
                    "Dropping field {}.{} with number {}",
                    full_name,
                    field.name(),
                    field.number()
                );
                errors.push(Error::InvalidFieldNumber {
                    message: full_name.clone(),
                    field: field.name().to_string(),
                    number: i64::from(field.number()),
                });
            }
        }

        let descriptor = MessageDescriptor::from_proto(package, full_name.clone(), proto);
        self.messages.insert(full_name, Arc::new(descriptor));
    }

    /// Looks a registered file up by name
    pub fn file(&self, name: &str) -> Option<&FileDescriptorProto> {
        self.files.get(name)
    }

    /// Registered files, ordered by name
    pub fn files(&self) -> impl Iterator<Item = &FileDescriptorProto> {
        self.files.values()
    }

    /// Looks a message type up by qualified name
    pub fn get_message_descriptor(&self, name: &str) -> Option<&Arc<MessageDescriptor>> {
        self.messages.get(name)
    }

    /// Mutable access to a message descriptor that is not shared yet
    pub fn get_message_descriptor_mut(&mut self, name: &str) -> Option<&mut MessageDescriptor> {
        self.messages.get_mut(name).and_then(Arc::get_mut)
    }

    /// Looks an enum type up by qualified name
    pub fn get_enum_descriptor(&self, name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.enums.get(name)
    }

    /// Looks an enum value up by qualified name (`EnumPath.VALUE_NAME`)
    pub fn get_enum_value_descriptor(&self, name: &str) -> Option<&EnumValueDescriptor> {
        self.enum_values.get(name)
    }

    /// Registered message types, ordered by name
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> {
        self.messages.values()
    }

    /// Creates an empty message of the named type
    pub fn create(self: &Arc<Self>, name: &str) -> Result<DynamicMessage> {
        let descriptor = self
            .get_message_descriptor(name)
            .ok_or_else(|| Error::unknown_type(name))?;
        Ok(self.create_with(descriptor))
    }

    /// Creates an empty message of the given type
    pub fn create_with(self: &Arc<Self>, descriptor: &Arc<MessageDescriptor>) -> DynamicMessage {
        DynamicMessage::new(Arc::clone(descriptor), Arc::clone(self))
    }

    /// Creates an empty message of the type a field references
    pub fn create_for_field(self: &Arc<Self>, field: &FieldDescriptor) -> Result<DynamicMessage> {
        self.create(field.type_name())
    }

    /// Decodes a message of the named type.
    ///
    /// Unlike [`DynamicMessage::parse`], a partially decoded message is not
    /// returned; any field failure fails the whole call.
    pub fn decode(self: &Arc<Self>, name: &str, data: &[u8]) -> Result<DynamicMessage> {
        let descriptor = self
            .get_message_descriptor(name)
            .ok_or_else(|| Error::unknown_type(name))?;
        self.decode_with(descriptor, data)
    }

    /// Decodes a message of the given type
    pub fn decode_with(
        self: &Arc<Self>,
        descriptor: &Arc<MessageDescriptor>,
        data: &[u8],
    ) -> Result<DynamicMessage> {
        let mut message = self.create_with(descriptor);
        message.parse(data)?;
        Ok(message)
    }

    /// Encodes a message, failing if any field could not be written
    pub fn encode(&self, message: &DynamicMessage) -> Result<Vec<u8>> {
        message.encode_to_vec()
    }

    /// Human-readable listing of everything registered
    pub fn summary(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_summary(&mut out);
        out
    }

    fn write_summary(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "File descriptors: {}", self.files.len())?;
        for name in self.files.keys() {
            writeln!(out, "  File: {}", name)?;
        }

        writeln!(out, "Message descriptors: {}", self.messages.len())?;
        for (name, message) in &self.messages {
            writeln!(out, "  Message: {} with {} fields", name, message.fields().len())?;
        }

        writeln!(out, "Enum descriptors: {}", self.enums.len())?;
        for (name, enum_type) in &self.enums {
            writeln!(out, "  Enum: {} with {} options", name, enum_type.values().len())?;
        }

        Ok(())
    }
}
