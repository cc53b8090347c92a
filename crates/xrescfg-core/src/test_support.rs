//! Schemas shared by the unit tests, built from `prost-types` descriptors.

use crate::registry::Registry;
use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};
use std::sync::Arc;

pub(crate) const DATABLOCKS: &str = crate::config::DATABLOCKS_MESSAGE;

pub(crate) fn field(name: &str, number: i32, ty: Type, label: Label) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub(crate) fn typed_field(
    name: &str,
    number: i32,
    ty: Type,
    label: Label,
    type_name: &str,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty, label)
    }
}

pub(crate) fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub(crate) fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(n, v)| EnumValueDescriptorProto {
                name: Some(n.to_string()),
                number: Some(*v),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

pub(crate) fn file(
    name: &str,
    package: &str,
    messages: Vec<DescriptorProto>,
    enums: Vec<EnumDescriptorProto>,
) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: (!package.is_empty()).then(|| package.to_string()),
        message_type: messages,
        enum_type: enums,
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub(crate) fn encode_set(files: Vec<FileDescriptorProto>) -> Vec<u8> {
    FileDescriptorSet { file: files }.encode_to_vec()
}

/// `demo.proto`: every scalar kind, an enum and nested messages.
/// `plain.proto`: `T { uint32 id = 1; repeated string tag = 2; }` without a package.
/// `pb_header.proto`: the data-blocks container.
pub(crate) fn files() -> Vec<FileDescriptorProto> {
    use Label::{Optional, Repeated};

    let point = message(
        "Point",
        vec![
            field("x", 1, Type::Int32, Optional),
            field("y", 2, Type::Int32, Optional),
        ],
    );

    let item = message(
        "Item",
        vec![
            field("id", 1, Type::Uint32, Optional),
            field("tag", 2, Type::String, Repeated),
            field("name", 3, Type::String, Optional),
            field("weight", 4, Type::Double, Optional),
            field("ratio", 5, Type::Float, Optional),
            field("big", 6, Type::Int64, Optional),
            field("delta", 7, Type::Sint32, Optional),
            field("offset", 8, Type::Sint64, Optional),
            field("f32", 9, Type::Fixed32, Optional),
            field("f64", 10, Type::Fixed64, Optional),
            field("sf32", 11, Type::Sfixed32, Optional),
            field("sf64", 12, Type::Sfixed64, Optional),
            field("active", 13, Type::Bool, Optional),
            field("blob", 14, Type::Bytes, Optional),
            typed_field("color", 15, Type::Enum, Optional, ".demo.Color"),
            typed_field("pos", 16, Type::Message, Optional, ".demo.Point"),
            typed_field("path", 17, Type::Message, Repeated, ".demo.Point"),
            field("scores", 18, Type::Int32, Repeated),
            field("huge", 19, Type::Uint64, Optional),
            typed_field("palette", 20, Type::Enum, Repeated, ".demo.Color"),
        ],
    );

    let demo = file(
        "demo.proto",
        "demo",
        vec![point, item],
        vec![enumeration("Color", &[("RED", 0), ("GREEN", 1), ("BLUE", 2)])],
    );

    let plain = file(
        "plain.proto",
        "",
        vec![message(
            "T",
            vec![
                field("id", 1, Type::Uint32, Optional),
                field("tag", 2, Type::String, Repeated),
            ],
        )],
        vec![],
    );

    let header = file(
        "pb_header.proto",
        "com.owent.xresloader.pb",
        vec![message(
            "xresloader_datablocks",
            vec![field("data_block", 2, Type::Bytes, Repeated)],
        )],
        vec![],
    );

    vec![demo, plain, header]
}

pub(crate) fn descriptor_set() -> Vec<u8> {
    encode_set(files())
}

pub(crate) fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry
        .register(&descriptor_set())
        .expect("test schema registers cleanly");
    Arc::new(registry)
}
