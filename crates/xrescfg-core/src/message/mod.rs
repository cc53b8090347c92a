//! Dynamic messages.
//!
//! A [`DynamicMessage`] is one protobuf message bound to a
//! [`MessageDescriptor`] and the [`Registry`] it came from. Fields are read
//! and written through a [`FieldSelector`] (number, name or descriptor);
//! values are checked against the declared field type before they are
//! stored, see [`DynamicMessage::set_field_value`].
//!
//! Nested messages are owned by their parent, so a message is always a tree.

mod codec;
mod value;

use crate::error::{Error, Result};
use crate::registry::{
    EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldKind, MessageDescriptor, Registry,
};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub(crate) use value::FieldValue;
pub use value::Value;

/// Identifies a field of a message
#[derive(Debug, Clone, Copy)]
pub enum FieldSelector<'a> {
    /// By field number
    Number(u32),
    /// By field name
    Name(&'a str),
    /// By descriptor; resolved through its number
    Field(&'a FieldDescriptor),
}

impl From<u32> for FieldSelector<'_> {
    fn from(number: u32) -> Self {
        FieldSelector::Number(number)
    }
}

impl<'a> From<&'a str> for FieldSelector<'a> {
    fn from(name: &'a str) -> Self {
        FieldSelector::Name(name)
    }
}

impl<'a> From<&'a String> for FieldSelector<'a> {
    fn from(name: &'a String) -> Self {
        FieldSelector::Name(name)
    }
}

impl<'a> From<&'a FieldDescriptor> for FieldSelector<'a> {
    fn from(field: &'a FieldDescriptor) -> Self {
        FieldSelector::Field(field)
    }
}

impl fmt::Display for FieldSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSelector::Number(n) => write!(f, "{}", n),
            FieldSelector::Name(name) => f.write_str(name),
            FieldSelector::Field(field) => f.write_str(field.name()),
        }
    }
}

fn resolve<'d>(
    descriptor: &'d MessageDescriptor,
    selector: FieldSelector<'_>,
) -> Result<&'d FieldDescriptor> {
    let found = match selector {
        FieldSelector::Number(n) => descriptor.field_by_number(n),
        FieldSelector::Name(name) => descriptor.field_by_name(name),
        FieldSelector::Field(field) => descriptor.field_by_number(field.number()),
    };
    found.ok_or_else(|| Error::no_such_field(descriptor.full_name(), selector))
}

/// A protobuf message whose shape is only known at runtime
#[derive(Clone)]
pub struct DynamicMessage {
    descriptor: Arc<MessageDescriptor>,
    registry: Arc<Registry>,
    fields: BTreeMap<u32, FieldValue>,
}

impl DynamicMessage {
    pub(crate) fn new(descriptor: Arc<MessageDescriptor>, registry: Arc<Registry>) -> Self {
        Self {
            descriptor,
            registry,
            fields: BTreeMap::new(),
        }
    }

    /// The message type
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// The registry this message resolves nested types through
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Qualified type name
    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// Package of the message type
    pub fn package(&self) -> &str {
        self.descriptor.package()
    }

    /// Creates an empty message of another type from the same registry
    pub fn create_message(&self, name: &str) -> Result<DynamicMessage> {
        self.registry.create(name)
    }

    /// Creates an empty message of the type a field references
    pub fn create_for_field(&self, field: &FieldDescriptor) -> Result<DynamicMessage> {
        self.registry.create_for_field(field)
    }

    /// Looks an enum type up in the shared registry
    pub fn get_enum_descriptor(&self, name: &str) -> Option<&Arc<EnumDescriptor>> {
        self.registry.get_enum_descriptor(name)
    }

    /// Looks an enum value up in the shared registry
    pub fn get_enum_value(&self, name: &str) -> Option<&EnumValueDescriptor> {
        self.registry.get_enum_value_descriptor(name)
    }

    /// Resolves a selector against this message's descriptor
    pub fn field<'a>(&self, selector: impl Into<FieldSelector<'a>>) -> Result<&FieldDescriptor> {
        resolve(&self.descriptor, selector.into())
    }

    /// Value of a singular field.
    ///
    /// Unset fields read as the zero value of their type; an unset message
    /// field reads as `None`.
    pub fn get_field_value<'a>(
        &self,
        selector: impl Into<FieldSelector<'a>>,
    ) -> Result<Option<Cow<'_, Value>>> {
        let field = resolve(&self.descriptor, selector.into())?;
        if field.is_repeated() {
            return Err(Error::FieldIsRepeated {
                field: field.name().to_string(),
            });
        }

        match self.fields.get(&field.number()) {
            Some(FieldValue::Single(value)) => Ok(Some(Cow::Borrowed(value))),
            Some(FieldValue::List(_)) => Err(Error::FieldIsRepeated {
                field: field.name().to_string(),
            }),
            None => Ok(Value::default_for(field.kind()).map(Cow::Owned)),
        }
    }

    /// Values of a repeated field in insertion order, empty when unset
    pub fn get_field_list<'a>(&self, selector: impl Into<FieldSelector<'a>>) -> Result<&[Value]> {
        let field = resolve(&self.descriptor, selector.into())?;
        if !field.is_repeated() {
            return Err(Error::FieldNotRepeated {
                field: field.name().to_string(),
            });
        }

        match self.fields.get(&field.number()) {
            Some(FieldValue::List(values)) => Ok(values.as_slice()),
            Some(FieldValue::Single(_)) => Err(Error::FieldNotRepeated {
                field: field.name().to_string(),
            }),
            None => Ok(&[]),
        }
    }

    /// Nested message of a singular message field, `None` when unset
    pub fn get_field_message<'a>(
        &self,
        selector: impl Into<FieldSelector<'a>>,
    ) -> Result<Option<&DynamicMessage>> {
        let field = resolve(&self.descriptor, selector.into())?;
        self.expect_message_field(field)?;
        if field.is_repeated() {
            return Err(Error::FieldIsRepeated {
                field: field.name().to_string(),
            });
        }

        Ok(match self.fields.get(&field.number()) {
            Some(FieldValue::Single(Value::Message(message))) => Some(&**message),
            _ => None,
        })
    }

    /// Nested message of a message field, created when missing.
    ///
    /// On a repeated field a new element is appended and returned.
    pub fn mutable_message<'a>(
        &mut self,
        selector: impl Into<FieldSelector<'a>>,
    ) -> Result<&mut DynamicMessage> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = resolve(&descriptor, selector.into())?;
        self.expect_message_field(field)?;

        let number = field.number();
        if field.is_repeated() {
            let child = self.create_for_field(field)?;
            let slot = self
                .fields
                .entry(number)
                .or_insert_with(|| FieldValue::List(Vec::new()));
            if let FieldValue::List(values) = slot {
                values.push(Value::Message(Box::new(child)));
                if let Some(Value::Message(message)) = values.last_mut() {
                    return Ok(&mut **message);
                }
            }
        } else {
            if !self.fields.contains_key(&number) {
                let child = self.create_for_field(field)?;
                self.fields
                    .insert(number, FieldValue::Single(Value::Message(Box::new(child))));
            }
            if let Some(FieldValue::Single(Value::Message(message))) = self.fields.get_mut(&number) {
                return Ok(&mut **message);
            }
        }

        Err(Error::NotAMessage {
            message: descriptor.full_name().to_string(),
            field: field.name().to_string(),
        })
    }

    fn expect_message_field(&self, field: &FieldDescriptor) -> Result<()> {
        if field.kind() == FieldKind::Message {
            Ok(())
        } else {
            Err(Error::NotAMessage {
                message: self.descriptor.full_name().to_string(),
                field: field.name().to_string(),
            })
        }
    }

    /// Descriptors of the fields that currently hold data, in storage order
    pub fn reflect_list_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields
            .keys()
            .filter_map(|number| self.descriptor.field_by_number(*number))
            .collect()
    }

    /// True if the field holds data
    pub fn has_field<'a>(&self, selector: impl Into<FieldSelector<'a>>) -> Result<bool> {
        let field = resolve(&self.descriptor, selector.into())?;
        Ok(self.fields.contains_key(&field.number()))
    }

    /// Stores a value in a singular field, replacing any previous value.
    ///
    /// The value is checked and converted first: floating kinds take any
    /// float; integer kinds take integers, floats and numeric strings; enum
    /// kinds take integers or a qualified value name such as
    /// `pkg.Color.BLUE`; message kinds take a message of exactly the
    /// declared type; bool, string and bytes must match exactly.
    pub fn set_field_value<'a>(
        &mut self,
        selector: impl Into<FieldSelector<'a>>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = resolve(&descriptor, selector.into())?;
        if field.is_repeated() {
            return Err(Error::FieldIsRepeated {
                field: field.name().to_string(),
            });
        }

        let value = value::coerce(descriptor.full_name(), field, value.into(), &self.registry)?;
        self.fields.insert(field.number(), FieldValue::Single(value));
        Ok(())
    }

    /// Appends a value to a repeated field, applying the same checks as
    /// [`set_field_value`](Self::set_field_value)
    pub fn add_field_list<'a>(
        &mut self,
        selector: impl Into<FieldSelector<'a>>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = resolve(&descriptor, selector.into())?;
        if !field.is_repeated() {
            return Err(Error::FieldNotRepeated {
                field: field.name().to_string(),
            });
        }

        let value = value::coerce(descriptor.full_name(), field, value.into(), &self.registry)?;
        self.push_value(field, value);
        Ok(())
    }

    /// Appends to repeated fields, overwrites singular ones
    pub fn add_field<'a>(
        &mut self,
        selector: impl Into<FieldSelector<'a>>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = resolve(&descriptor, selector.into())?;
        if field.is_repeated() {
            self.add_field_list(field, value)
        } else {
            self.set_field_value(field, value)
        }
    }

    /// Removes a field's data, returning whether there was any
    pub fn remove_field<'a>(&mut self, selector: impl Into<FieldSelector<'a>>) -> Result<bool> {
        let descriptor = Arc::clone(&self.descriptor);
        let field = resolve(&descriptor, selector.into())?;
        Ok(self.fields.remove(&field.number()).is_some())
    }

    /// Removes all field data
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Stores an already validated value
    fn push_value(&mut self, field: &FieldDescriptor, value: Value) {
        let number = field.number();
        if !field.is_repeated() {
            self.fields.insert(number, FieldValue::Single(value));
            return;
        }

        match self.fields.get_mut(&number) {
            Some(FieldValue::List(values)) => values.push(value),
            _ => {
                self.fields.insert(number, FieldValue::List(vec![value]));
            }
        }
    }

    pub(crate) fn write_body(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        writeln!(f, "{{")?;
        for (number, stored) in &self.fields {
            write!(f, "{:indent$}  ", "", indent = indent)?;
            match self.descriptor.field_by_number(*number) {
                Some(field) => write!(f, "{} = ", field.name())?,
                None => write!(f, "{} = ", number)?,
            }

            match stored {
                FieldValue::Single(value) => value.write_indented(f, indent + 2)?,
                FieldValue::List(values) => {
                    write!(f, "[")?;
                    for value in values {
                        write!(f, " ")?;
                        value.write_indented(f, indent + 2)?;
                        write!(f, ",")?;
                    }
                    write!(f, " ]")?;
                }
            }
            writeln!(f, ",")?;
        }
        write!(f, "{:indent$}}}", "", indent = indent)
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name() && self.fields == other.fields
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMessage")
            .field("type", &self.descriptor.full_name())
            .field("fields", &self.fields)
            .finish()
    }
}

impl fmt::Display for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_body(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use pretty_assertions::assert_eq;

    fn item() -> DynamicMessage {
        test_support::registry().create("demo.Item").unwrap()
    }

    #[test]
    fn test_unset_fields_read_as_zero() {
        let item = item();
        assert_eq!(item.get_field_value("name").unwrap().unwrap().as_str(), Some(""));
        assert_eq!(item.get_field_value("big").unwrap().unwrap().as_i64(), Some(0));
        assert_eq!(item.get_field_value("id").unwrap().unwrap().as_u32(), Some(0));
        assert_eq!(item.get_field_value("weight").unwrap().unwrap().as_f64(), Some(0.0));
        assert_eq!(item.get_field_value("ratio").unwrap().unwrap().as_f32(), Some(0.0));
        assert_eq!(item.get_field_value("active").unwrap().unwrap().as_bool(), Some(false));
        assert_eq!(item.get_field_value("color").unwrap().unwrap().as_enum_number(), Some(0));
        assert!(item.get_field_value("blob").unwrap().unwrap().as_bytes().unwrap().is_empty());
        assert!(item.get_field_value("pos").unwrap().is_none());
        assert!(item.get_field_message("pos").unwrap().is_none());
    }

    #[test]
    fn test_selectors_resolve_alike() {
        let mut item = item();
        item.set_field_value(1u32, 5u32).unwrap();

        let by_name = item.get_field_value("id").unwrap().unwrap().into_owned();
        let by_number = item.get_field_value(1u32).unwrap().unwrap().into_owned();
        let field = item.field("id").unwrap().clone();
        let by_field = item.get_field_value(&field).unwrap().unwrap().into_owned();

        assert_eq!(by_name, Value::U32(5));
        assert_eq!(by_number, by_name);
        assert_eq!(by_field, by_name);
    }

    #[test]
    fn test_unknown_selector() {
        let mut item = item();
        let err = item.get_field_value("nope").unwrap_err();
        assert_eq!(err.to_string(), "message demo.Item has no field nope");
        assert!(item.get_field_list(999u32).is_err());
        assert!(item.set_field_value("nope", 1).is_err());
        assert!(item.remove_field("nope").is_err());
    }

    #[test]
    fn test_cardinality_is_enforced() {
        let mut item = item();

        let err = item.get_field_value("tag").unwrap_err();
        assert!(matches!(err, Error::FieldIsRepeated { .. }));
        let err = item.get_field_list("name").unwrap_err();
        assert!(matches!(err, Error::FieldNotRepeated { .. }));
        let err = item.add_field_list("name", "x").unwrap_err();
        assert!(matches!(err, Error::FieldNotRepeated { .. }));
    }

    #[test]
    fn test_set_on_repeated_leaves_message_unchanged() {
        let mut item = item();
        item.add_field_list("tag", "a").unwrap();
        let before = item.clone();

        let err = item.set_field_value("tag", "b").unwrap_err();
        assert!(matches!(err, Error::FieldIsRepeated { .. }));
        assert_eq!(item, before);
        assert_eq!(item.get_field_list("tag").unwrap(), &[Value::String("a".into())]);
    }

    #[test]
    fn test_rejected_value_keeps_previous() {
        let mut item = item();
        item.set_field_value("name", "first").unwrap();
        assert!(item.set_field_value("name", 3).is_err());
        assert_eq!(item.get_field_value("name").unwrap().unwrap().as_str(), Some("first"));
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let mut item = item();
        assert!(item.get_field_list("tag").unwrap().is_empty());

        for tag in ["c", "a", "b"] {
            item.add_field("tag", tag).unwrap();
        }
        let tags: Vec<_> = item
            .get_field_list("tag")
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(tags, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_add_field_overwrites_singular() {
        let mut item = item();
        item.add_field("name", "one").unwrap();
        item.add_field("name", "two").unwrap();
        assert_eq!(item.get_field_value("name").unwrap().unwrap().as_str(), Some("two"));
    }

    #[test]
    fn test_enum_by_name() {
        let mut item = item();
        item.set_field_value("color", "demo.Color.GREEN").unwrap();
        assert_eq!(item.get_field_value("color").unwrap().unwrap().as_enum_number(), Some(1));
        item.add_field_list("palette", "demo.Color.BLUE").unwrap();
        item.add_field_list("palette", 0).unwrap();
        assert_eq!(
            item.get_field_list("palette").unwrap(),
            &[Value::EnumNumber(2), Value::EnumNumber(0)]
        );
        assert!(item.get_enum_value("demo.Color.GREEN").is_some());
        assert!(item.get_enum_descriptor("demo.Color").is_some());
    }

    #[test]
    fn test_mutable_message_creates_once() {
        let mut item = item();
        item.mutable_message("pos").unwrap().set_field_value("x", 3).unwrap();
        item.mutable_message("pos").unwrap().set_field_value("y", 4).unwrap();

        let pos = item.get_field_message("pos").unwrap().unwrap();
        assert_eq!(pos.full_name(), "demo.Point");
        assert_eq!(pos.get_field_value("x").unwrap().unwrap().as_i32(), Some(3));
        assert_eq!(pos.get_field_value("y").unwrap().unwrap().as_i32(), Some(4));
    }

    #[test]
    fn test_mutable_message_appends_on_repeated() {
        let mut item = item();
        item.mutable_message("path").unwrap().set_field_value("x", 1).unwrap();
        item.mutable_message("path").unwrap().set_field_value("x", 2).unwrap();

        let xs: Vec<_> = item
            .get_field_list("path")
            .unwrap()
            .iter()
            .filter_map(Value::as_message)
            .map(|p| p.get_field_value("x").unwrap().unwrap().into_owned())
            .collect();
        assert_eq!(xs, vec![Value::I32(1), Value::I32(2)]);
    }

    #[test]
    fn test_message_accessors_reject_scalars() {
        let mut item = item();
        assert!(matches!(item.mutable_message("id"), Err(Error::NotAMessage { .. })));
        assert!(matches!(item.get_field_message("name"), Err(Error::NotAMessage { .. })));
    }

    #[test]
    fn test_set_nested_message_by_value() {
        let mut item = item();
        let mut point = item.create_message("demo.Point").unwrap();
        point.set_field_value("x", 9).unwrap();
        item.set_field_value("pos", point).unwrap();

        let wrong = item.create_message("T").unwrap();
        assert!(matches!(
            item.set_field_value("pos", wrong),
            Err(Error::MessageTypeMismatch { .. })
        ));
        let pos = item.get_field_message("pos").unwrap().unwrap();
        assert_eq!(pos.get_field_value("x").unwrap().unwrap().as_i32(), Some(9));
    }

    #[test]
    fn test_reflect_and_remove() {
        let mut item = item();
        assert!(item.reflect_list_fields().is_empty());

        item.set_field_value("name", "n").unwrap();
        item.add_field_list("tag", "t").unwrap();
        item.set_field_value("id", 1u32).unwrap();

        let names: Vec<_> = item.reflect_list_fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["id", "tag", "name"]);

        assert!(item.remove_field("tag").unwrap());
        assert!(!item.remove_field("tag").unwrap());
        assert!(!item.has_field("tag").unwrap());
        assert_eq!(item.reflect_list_fields().len(), 2);
    }

    #[test]
    fn test_display_dump() {
        let mut item = item();
        item.set_field_value("id", 7u32).unwrap();
        item.add_field_list("tag", "a").unwrap();
        item.set_field_value("blob", vec![0xABu8, 0x01]).unwrap();
        item.mutable_message("pos").unwrap().set_field_value("x", 1).unwrap();

        let text = item.to_string();
        assert!(text.starts_with("{\n"));
        assert!(text.contains("  id = 7,\n"));
        assert!(text.contains("  tag = [ \"a\", ],\n"));
        assert!(text.contains("  blob = AB01,\n"));
        assert!(text.contains("  pos = {\n    x = 1,\n  },\n"));
        assert!(text.ends_with('}'));
    }
}
