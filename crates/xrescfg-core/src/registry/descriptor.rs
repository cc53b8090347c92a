//! Runtime descriptor types.
//!
//! These are lightweight views over the `prost-types` descriptor protos,
//! keyed by qualified name and shared by reference between every message
//! built from one [`Registry`](super::Registry).

use prost::encoding::WireType;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Field numbers a wire tag can carry
pub(crate) const FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 1..=536_870_911;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int64`
    Int64,
    /// `uint64`
    Uint64,
    /// `int32`
    Int32,
    /// `fixed64`
    Fixed64,
    /// `fixed32`
    Fixed32,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `group` (deprecated, not supported by the codec)
    Group,
    /// Nested message
    Message,
    /// `bytes`
    Bytes,
    /// `uint32`
    Uint32,
    /// Enum, stored as its number
    Enum,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// A type tag this library does not know
    Unknown(i32),
}

impl FieldKind {
    /// Maps the raw `type` of a field descriptor proto
    pub fn from_raw(raw: Option<i32>) -> Self {
        let Some(raw) = raw else {
            return FieldKind::Unknown(0);
        };

        match Type::try_from(raw) {
            Ok(Type::Double) => FieldKind::Double,
            Ok(Type::Float) => FieldKind::Float,
            Ok(Type::Int64) => FieldKind::Int64,
            Ok(Type::Uint64) => FieldKind::Uint64,
            Ok(Type::Int32) => FieldKind::Int32,
            Ok(Type::Fixed64) => FieldKind::Fixed64,
            Ok(Type::Fixed32) => FieldKind::Fixed32,
            Ok(Type::Bool) => FieldKind::Bool,
            Ok(Type::String) => FieldKind::String,
            Ok(Type::Group) => FieldKind::Group,
            Ok(Type::Message) => FieldKind::Message,
            Ok(Type::Bytes) => FieldKind::Bytes,
            Ok(Type::Uint32) => FieldKind::Uint32,
            Ok(Type::Enum) => FieldKind::Enum,
            Ok(Type::Sfixed32) => FieldKind::Sfixed32,
            Ok(Type::Sfixed64) => FieldKind::Sfixed64,
            Ok(Type::Sint32) => FieldKind::Sint32,
            Ok(Type::Sint64) => FieldKind::Sint64,
            Err(_) => FieldKind::Unknown(raw),
        }
    }

    /// The `.proto` spelling of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Double => "double",
            FieldKind::Float => "float",
            FieldKind::Int64 => "int64",
            FieldKind::Uint64 => "uint64",
            FieldKind::Int32 => "int32",
            FieldKind::Fixed64 => "fixed64",
            FieldKind::Fixed32 => "fixed32",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Group => "group",
            FieldKind::Message => "message",
            FieldKind::Bytes => "bytes",
            FieldKind::Uint32 => "uint32",
            FieldKind::Enum => "enum",
            FieldKind::Sfixed32 => "sfixed32",
            FieldKind::Sfixed64 => "sfixed64",
            FieldKind::Sint32 => "sint32",
            FieldKind::Sint64 => "sint64",
            FieldKind::Unknown(_) => "unknown",
        }
    }

    /// Wire type used when encoding this kind, `None` if unsupported
    pub fn wire_type(&self) -> Option<WireType> {
        match self {
            FieldKind::Double | FieldKind::Fixed64 | FieldKind::Sfixed64 => {
                Some(WireType::SixtyFourBit)
            }
            FieldKind::Float | FieldKind::Fixed32 | FieldKind::Sfixed32 => {
                Some(WireType::ThirtyTwoBit)
            }
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum => Some(WireType::Varint),
            FieldKind::String | FieldKind::Bytes | FieldKind::Message => {
                Some(WireType::LengthDelimited)
            }
            FieldKind::Group | FieldKind::Unknown(_) => None,
        }
    }

    /// Scalar numeric kinds may arrive packed in one length-delimited record
    pub fn is_packable(&self) -> bool {
        matches!(
            self.wire_type(),
            Some(WireType::Varint | WireType::SixtyFourBit | WireType::ThirtyTwoBit)
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Unknown(raw) => write!(f, "unknown({})", raw),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Singular or repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one value (optional or required)
    Singular,
    /// Ordered list of values
    Repeated,
}

/// One field of a message
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    number: u32,
    kind: FieldKind,
    cardinality: Cardinality,
    type_name: String,
}

impl FieldDescriptor {
    /// Creates a field descriptor.
    ///
    /// `type_name` is the referenced message or enum for those kinds and is
    /// ignored by every other kind; a leading `.` is accepted.
    pub fn new(
        name: impl Into<String>,
        number: u32,
        kind: FieldKind,
        cardinality: Cardinality,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            cardinality,
            type_name: type_name.into(),
        }
    }

    /// `None` when the declared number cannot be carried by a wire tag
    pub(crate) fn from_proto(proto: &FieldDescriptorProto) -> Option<Self> {
        let number = u32::try_from(proto.number())
            .ok()
            .filter(|n| FIELD_NUMBERS.contains(n))?;
        let cardinality = if proto.label() == Label::Repeated {
            Cardinality::Repeated
        } else {
            Cardinality::Singular
        };

        Some(Self {
            name: proto.name().to_string(),
            number,
            kind: FieldKind::from_raw(proto.r#type),
            cardinality,
            type_name: proto.type_name().to_string(),
        })
    }

    /// True if the number fits a wire tag
    pub fn has_valid_number(&self) -> bool {
        FIELD_NUMBERS.contains(&self.number)
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Declared type
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Singular or repeated
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// True for repeated fields
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Qualified name of the referenced message or enum, without the leading `.`
    pub fn type_name(&self) -> &str {
        self.type_name.strip_prefix('.').unwrap_or(&self.type_name)
    }
}

#[derive(Debug, Default)]
struct FieldIndex {
    generation: Option<u64>,
    by_number: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl FieldIndex {
    fn rebuild(&mut self, fields: &[FieldDescriptor], generation: u64) {
        self.by_number.clear();
        self.by_name.clear();
        for (pos, field) in fields.iter().enumerate() {
            self.by_number.entry(field.number).or_insert(pos);
            self.by_name.entry(field.name.clone()).or_insert(pos);
        }
        self.generation = Some(generation);
    }
}

/// A message type and its fields.
///
/// The number and name lookup tables are built lazily on first use and
/// rebuilt whenever the field list has been edited since, tracked by a
/// generation counter bumped on every edit.
#[derive(Debug)]
pub struct MessageDescriptor {
    full_name: String,
    package: String,
    name: String,
    fields: Vec<FieldDescriptor>,
    generation: u64,
    index: RwLock<FieldIndex>,
}

impl MessageDescriptor {
    /// Creates a message descriptor
    pub fn new(
        package: impl Into<String>,
        full_name: impl Into<String>,
        name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            package: package.into(),
            name: name.into(),
            fields,
            generation: 0,
            index: RwLock::new(FieldIndex::default()),
        }
    }

    pub(crate) fn from_proto(package: &str, full_name: String, proto: &DescriptorProto) -> Self {
        let fields = proto
            .field
            .iter()
            .filter_map(FieldDescriptor::from_proto)
            .collect();
        Self::new(package, full_name, proto.name(), fields)
    }

    /// Qualified name, `package.Name` or bare `Name`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Package of the file that declared this message
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Unqualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Edit counter of the field list
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Looks a field up by number
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        let pos = self.with_index(|index| index.by_number.get(&number).copied())?;
        self.fields.get(pos)
    }

    /// Looks a field up by name
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        let pos = self.with_index(|index| index.by_name.get(name).copied())?;
        self.fields.get(pos)
    }

    /// Appends a field
    pub fn push_field(&mut self, field: FieldDescriptor) {
        self.fields.push(field);
        self.generation += 1;
    }

    /// Replaces the field with the given number, returning the old one
    pub fn replace_field(&mut self, number: u32, field: FieldDescriptor) -> Option<FieldDescriptor> {
        let slot = self.fields.iter_mut().find(|f| f.number == number)?;
        let old = std::mem::replace(slot, field);
        self.generation += 1;
        Some(old)
    }

    fn with_index<R>(&self, f: impl FnOnce(&FieldIndex) -> R) -> R {
        {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            if index.generation == Some(self.generation) {
                return f(&index);
            }
        }

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.generation != Some(self.generation) {
            trace!(
                "Rebuilding field index of {} ({} fields, generation {})",
                self.full_name,
                self.fields.len(),
                self.generation
            );
            index.rebuild(&self.fields, self.generation);
        }
        f(&index)
    }
}

/// One value of an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValueDescriptor {
    full_name: String,
    name: String,
    number: i32,
}

impl EnumValueDescriptor {
    /// Qualified name, `EnumPath.VALUE_NAME`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Unqualified value name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric value
    pub fn number(&self) -> i32 {
        self.number
    }
}

/// An enum type and its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    full_name: String,
    values: Vec<EnumValueDescriptor>,
}

impl EnumDescriptor {
    pub(crate) fn from_proto(full_name: String, proto: &EnumDescriptorProto) -> Self {
        let values = proto
            .value
            .iter()
            .map(|v| EnumValueDescriptor {
                full_name: format!("{}.{}", full_name, v.name()),
                name: v.name().to_string(),
                number: v.number(),
            })
            .collect();

        Self { full_name, values }
    }

    /// Qualified enum name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Values in declaration order
    pub fn values(&self) -> &[EnumValueDescriptor] {
        &self.values
    }

    /// Looks a value up by its unqualified name
    pub fn value_by_name(&self, name: &str) -> Option<&EnumValueDescriptor> {
        self.values.iter().find(|v| v.name == name)
    }

    /// First value declared with the given number
    pub fn value_by_number(&self, number: i32) -> Option<&EnumValueDescriptor> {
        self.values.iter().find(|v| v.number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, number: u32, kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor::new(name, number, kind, Cardinality::Singular, "")
    }

    #[test]
    fn test_field_kind_mapping() {
        assert_eq!(FieldKind::from_raw(Some(Type::Uint32 as i32)), FieldKind::Uint32);
        assert_eq!(FieldKind::from_raw(Some(Type::Sint64 as i32)), FieldKind::Sint64);
        assert_eq!(FieldKind::from_raw(Some(99)), FieldKind::Unknown(99));
        assert_eq!(FieldKind::from_raw(None), FieldKind::Unknown(0));
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(FieldKind::Double.wire_type(), Some(WireType::SixtyFourBit));
        assert_eq!(FieldKind::Sfixed32.wire_type(), Some(WireType::ThirtyTwoBit));
        assert_eq!(FieldKind::Enum.wire_type(), Some(WireType::Varint));
        assert_eq!(FieldKind::Message.wire_type(), Some(WireType::LengthDelimited));
        assert_eq!(FieldKind::Group.wire_type(), None);
        assert!(FieldKind::Sint32.is_packable());
        assert!(!FieldKind::String.is_packable());
    }

    #[test]
    fn test_type_name_strips_leading_dot() {
        let field = FieldDescriptor::new("p", 1, FieldKind::Message, Cardinality::Singular, ".demo.Point");
        assert_eq!(field.type_name(), "demo.Point");
    }

    #[test]
    fn test_lookup_by_number_and_name() {
        let desc = MessageDescriptor::new(
            "demo",
            "demo.T",
            "T",
            vec![scalar("id", 1, FieldKind::Uint32), scalar("name", 2, FieldKind::String)],
        );
        assert_eq!(desc.field_by_number(2).map(|f| f.name()), Some("name"));
        assert_eq!(desc.field_by_name("id").map(|f| f.number()), Some(1));
        assert!(desc.field_by_number(3).is_none());
        assert!(desc.field_by_name("missing").is_none());
    }

    #[test]
    fn test_index_rebuilt_after_replace_with_same_count() {
        let mut desc = MessageDescriptor::new("", "T", "T", vec![scalar("old", 1, FieldKind::Int32)]);
        assert!(desc.field_by_name("old").is_some());

        desc.replace_field(1, scalar("new", 1, FieldKind::Int64));
        assert_eq!(desc.fields().len(), 1);
        assert!(desc.field_by_name("old").is_none());
        assert_eq!(desc.field_by_name("new").map(|f| f.kind()), Some(FieldKind::Int64));
    }

    #[test]
    fn test_index_rebuilt_after_push() {
        let mut desc = MessageDescriptor::new("", "T", "T", Vec::new());
        assert!(desc.field_by_number(1).is_none());
        desc.push_field(scalar("id", 1, FieldKind::Uint32));
        assert_eq!(desc.generation(), 1);
        assert!(desc.field_by_number(1).is_some());
    }
}
