//! Error types for the xrescfg-core library.
//!
//! Every fallible operation returns [`Result`]. Operations that keep going
//! after a local failure (descriptor registration, message parsing and
//! serialization) collect their failures into an [`ErrorList`] and report it
//! as [`Error::Multiple`] once the whole input has been processed.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for xrescfg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all xrescfg operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode a `FileDescriptorSet`
    #[error("failed to parse FileDescriptorSet: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Two enum types share one qualified name
    #[error("enum descriptor {name} already existed")]
    DuplicateEnum {
        /// Qualified enum name
        name: String,
    },

    /// Two message types share one qualified name
    #[error("message descriptor {name} already existed")]
    DuplicateMessage {
        /// Qualified message name
        name: String,
    },

    /// A message type name is not registered
    #[error("invalid message path {name}")]
    UnknownType {
        /// The name that failed to resolve
        name: String,
    },

    /// A field selector did not resolve against the message descriptor
    #[error("message {message} has no field {field}")]
    NoSuchField {
        /// Qualified message name
        message: String,
        /// Number or name used as selector
        field: String,
    },

    /// A singular accessor was used on a repeated field
    #[error("field {field} is repeated, use the list accessor")]
    FieldIsRepeated {
        /// Field name
        field: String,
    },

    /// A list accessor was used on a singular field
    #[error("field {field} is not repeated, use the value accessor")]
    FieldNotRepeated {
        /// Field name
        field: String,
    },

    /// A message accessor was used on a non-message field
    #[error("field {message}.{field} is not a message")]
    NotAMessage {
        /// Qualified message name
        message: String,
        /// Field name
        field: String,
    },

    /// A value is incompatible with the declared field type
    #[error("field {field} type error, must match {expected} (got {got})")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared field type
        expected: &'static str,
        /// Kind of the rejected value
        got: &'static str,
    },

    /// A numeric value does not fit the declared field type
    #[error("field {field} value {value} out of range for {expected}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Rendered value
        value: String,
        /// Declared field type
        expected: &'static str,
    },

    /// A symbolic enum value is not registered
    #[error("enum value path {path} not found")]
    EnumValueNotFound {
        /// Qualified enum value name
        path: String,
    },

    /// A nested message has a different type than the field declares
    #[error("field {field} expects message {expected}, got {got}")]
    MessageTypeMismatch {
        /// Field name
        field: String,
        /// Declared message type
        expected: String,
        /// Actual message type
        got: String,
    },

    /// The field type is not supported by the codec
    #[error("field type {kind} in {message}.{field} unsupported")]
    UnsupportedFieldType {
        /// Qualified message name
        message: String,
        /// Field name
        field: String,
        /// Declared field type
        kind: String,
    },

    /// A field number outside the range a wire tag can carry
    #[error("field {message}.{field} has invalid number {number}")]
    InvalidFieldNumber {
        /// Qualified message name
        message: String,
        /// Field name
        field: String,
        /// Declared number
        number: i64,
    },

    /// Malformed or truncated wire data
    #[error("invalid protobuf wire format in {context}: {details}")]
    InvalidWireFormat {
        /// Message or field being decoded
        context: String,
        /// Detailed description of the issue
        details: String,
    },

    /// A single config row could not be used
    #[error("row {index} of {file}: {source}")]
    Row {
        /// Position of the row in the data blocks
        index: usize,
        /// Config file the row came from
        file: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A whole config table failed to reload
    #[error("load configure {name} failed: {source}")]
    Table {
        /// Config name
        name: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// An index slot that was never created
    #[error("{kind} index slot {slot} does not exist")]
    IndexSlotNotFound {
        /// `"key-value"` or `"key-list"`
        kind: &'static str,
        /// Requested slot
        slot: usize,
    },

    /// A config name is already registered in the directory
    #[error("configure name {name} already registered, can not register again")]
    DuplicateConfig {
        /// Config name
        name: String,
    },

    /// Several independent failures from one operation
    #[error("{0}")]
    Multiple(ErrorList),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new unknown type error
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a new unresolved field selector error
    pub fn no_such_field(message: impl Into<String>, field: impl fmt::Display) -> Self {
        Self::NoSuchField {
            message: message.into(),
            field: field.to_string(),
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            context: context.into(),
            details: details.into(),
        }
    }

    /// Wraps a failure of one config row
    pub fn row(index: usize, file: impl Into<String>, source: Error) -> Self {
        Self::Row {
            index,
            file: file.into(),
            source: Box::new(source),
        }
    }

    /// Wraps a failure of a whole config table
    pub fn table(name: impl Into<String>, source: Error) -> Self {
        Self::Table {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Returns true for data errors the caller may skip and continue past.
    ///
    /// I/O failures, index misuse and directory misuse are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::FileRead { .. } | Self::IndexSlotNotFound { .. } | Self::DuplicateConfig { .. }
        )
    }
}

/// Accumulated errors of one operation, rendered comma-joined.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    /// Creates an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error; nested lists are flattened
    pub fn push(&mut self, error: Error) {
        match error {
            Error::Multiple(list) => self.0.extend(list.0),
            other => self.0.push(other),
        }
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the recorded errors in order
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise [`Error::Multiple`]
    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Multiple(self))
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl IntoIterator for ErrorList {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
