//! Publishable values and their canonical JSON encoding.
//!
//! Messages and metadata are modelled as a closed set of shapes:
//!
//! - primitives: string, number, boolean (and `null` inside containers)
//! - ordered sequences, encoded as JSON arrays
//! - string-keyed maps, encoded as JSON objects with keys in sorted order
//! - records, encoded as JSON objects with fields in declaration order
//!
//! Types that already implement [`serde::Serialize`] can be adapted with
//! [`Value::from_serialize`]; this is the only place where a value can turn
//! out to be unrepresentable. Structs adapted this way become records and
//! drop fields whose value is `None`.
//!
//! # Example
//!
//! ```rust
//! use pubwire_core::{Record, Value, to_json};
//!
//! let message = Value::from(vec!["a", "b", "c"]);
//! assert_eq!(to_json(&message).unwrap(), r#"["a","b","c"]"#);
//!
//! let record = Record::new().field("field1", "10").field("field2", "20");
//! assert_eq!(
//!     to_json(&Value::from(record)).unwrap(),
//!     r#"{"field1":"10","field2":"20"}"#
//! );
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;
use thiserror::Error;

mod ser;

/// Result type for serialization.
pub type SerializationResult<T> = Result<T, SerializationError>;

/// A value could not be turned into JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// The value has no supported shape.
    #[error("unserializable value")]
    Unserializable,

    /// Floats must be finite to have a JSON form.
    #[error("unserializable value: non-finite number {0}")]
    NonFiniteNumber(String),

    /// The value's `Serialize` implementation refused to encode it.
    #[error("unserializable value: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Rejected(err.to_string())
    }
}

/// A message or metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// JSON `null`. Only meaningful inside containers; a top-level null
    /// message counts as absent.
    Null,
    /// A boolean.
    Bool(bool),
    /// A finite number.
    Number(Number),
    /// A string.
    String(String),
    /// An ordered sequence.
    Array(Vec<Value>),
    /// A string-keyed map, encoded with sorted keys.
    Map(BTreeMap<String, Value>),
    /// A structured record, encoded with fields in declaration order.
    Record(Record),
}

impl Value {
    /// Adapts any `Serialize` type into a [`Value`].
    ///
    /// Structs become [`Value::Record`] with fields in declaration order;
    /// maps become [`Value::Map`] with sorted keys. In both, members that
    /// serialize to null are left out. Enum variants with data encode as
    /// `{"Variant": ...}`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Rejected`] when the serializer fails,
    /// e.g. for maps whose keys are not strings, and
    /// [`SerializationError::NonFiniteNumber`] for NaN or infinite floats.
    pub fn from_serialize<T>(value: &T) -> SerializationResult<Self>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(ser::ValueSerializer)
    }

    /// Builds a record value from a type with an explicit field encoding.
    pub fn record<T: ToRecord + ?Sized>(value: &T) -> Self {
        Self::Record(value.to_record())
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encodes this value as compact JSON text.
    pub fn to_json(&self) -> SerializationResult<String> {
        to_json(self)
    }
}

/// Encodes a value as compact JSON text.
///
/// # Errors
///
/// Returns [`SerializationError`] if the encoder fails.
pub fn to_json(value: &Value) -> SerializationResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// An ordered list of named fields.
///
/// Setting a field name twice replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name.into(), value.into());
        self
    }

    /// Builder: set a field only when it has a value. `None` is omitted from
    /// the encoding entirely.
    #[must_use]
    pub fn optional_field<V: Into<Value>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.field(name, value),
            None => self,
        }
    }

    /// Iterates over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn insert(&mut self, name: String, value: Value) {
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }
}

/// Types that encode themselves as an ordered set of named fields.
///
/// ```rust
/// use pubwire_core::{Record, ToRecord, Value};
///
/// struct Reading {
///     sensor: String,
///     celsius: i64,
///     note: Option<String>,
/// }
///
/// impl ToRecord for Reading {
///     fn to_record(&self) -> Record {
///         Record::new()
///             .field("sensor", self.sensor.as_str())
///             .field("celsius", self.celsius)
///             .optional_field("note", self.note.clone())
///     }
/// }
///
/// let reading = Reading { sensor: "t1".into(), celsius: 21, note: None };
/// assert_eq!(
///     Value::record(&reading).to_json().unwrap(),
///     r#"{"sensor":"t1","celsius":21}"#
/// );
/// ```
pub trait ToRecord {
    /// Returns the fields of this value in encoding order.
    fn to_record(&self) -> Record;
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Record(record) => record.serialize(serializer),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(Number::from(n))
                }
            }
        )*
    };
}

value_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl TryFrom<f64> for Value {
    type Error = SerializationError;

    fn try_from(n: f64) -> Result<Self, Self::Error> {
        Number::from_f64(n)
            .map(Self::Number)
            .ok_or_else(|| SerializationError::NonFiniteNumber(n.to_string()))
    }
}

impl TryFrom<f32> for Value {
    type Error = SerializationError;

    fn try_from(n: f32) -> Result<Self, Self::Error> {
        Self::try_from(f64::from(n))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(entries: BTreeMap<K, V>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>, S> From<HashMap<K, V, S>> for Value {
    fn from(entries: HashMap<K, V, S>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
