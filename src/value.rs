//! Dynamic record values: the loosely-typed field data stored in documents, with
//! tolerant path lookup and per-accessor coercion rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical mapping container for document fields.
pub type M = BTreeMap<String, Value>;

/// Canonical sequence of mappings.
pub type A = Vec<M>;

/// Field holding the record identifier.
pub const ID_FIELD: &str = "_id";

/// 12-byte record identifier, rendered as 24 lowercase hex characters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, thiserror::Error)]
#[error("invalid object id: {0}")]
pub struct ObjectIdError(String);

impl ObjectId {
    pub const NIL: ObjectId = ObjectId([0; 12]);

    /// Seconds timestamp followed by 8 random bytes.
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let secs = Utc::now().timestamp() as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ObjectIdError(s.to_string()))?;
        Ok(ObjectId(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
    }
}

/// A single field value. Numbers keep their integer/float distinction so that
/// coercions can widen them explicitly.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ObjectId(ObjectId),
    DateTime(DateTime<Utc>),
    Map(M),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&M> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<M> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Strings as-is; numbers and booleans stringified; anything else is empty.
    pub fn coerce_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Float(f) => f.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Numeric widening, booleans as 0/1, numeric strings parsed; otherwise 0.
    pub fn coerce_f64(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Numeric narrowing (floats truncate), booleans as 0/1; otherwise 0.
    pub fn coerce_i64(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            _ => 0,
        }
    }

    /// Exact booleans only.
    pub fn coerce_bool(&self, default: bool) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => default,
        }
    }

    /// Typed ids or parseable hex strings; otherwise [`ObjectId::NIL`].
    pub fn coerce_object_id(&self) -> ObjectId {
        match self {
            Value::ObjectId(id) => *id,
            Value::String(s) => ObjectId::parse_str(s).unwrap_or(ObjectId::NIL),
            _ => ObjectId::NIL,
        }
    }

    /// Returns a copy of the mapping, or `None` when this is not a container.
    pub fn coerce_mapping(&self) -> Option<M> {
        match self {
            Value::Map(m) => Some(m.clone()),
            _ => None,
        }
    }

    /// Sequence of mappings. Elements that are not mappings become empty mappings.
    pub fn coerce_sequence(&self) -> Option<A> {
        match self {
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| v.coerce_mapping().unwrap_or_default())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Equality that treats integer and float representations of the same number as equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    /// String form of an identifier: hex for typed ids, strings as-is, JSON text otherwise.
    pub fn id_string(&self) -> String {
        match self {
            Value::ObjectId(id) => id.to_hex(),
            Value::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Plain JSON: ids as hex strings, dates as RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::ObjectId(id) => J::String(id.to_hex()),
            Value::DateTime(d) => J::String(d.to_rfc3339()),
            Value::Map(m) => J::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Storage JSON: ids as `{"$oid": ..}` and dates as `{"$date": ..}` so that they
    /// read back typed.
    pub fn to_extended_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::ObjectId(id) => serde_json::json!({ "$oid": id.to_hex() }),
            Value::DateTime(d) => serde_json::json!({ "$date": d.to_rfc3339() }),
            Value::Map(m) => J::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_extended_json()))
                    .collect(),
            ),
            Value::Array(items) => J::Array(items.iter().map(Value::to_extended_json).collect()),
            other => other.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            J::String(s) => Value::String(s),
            J::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            J::Object(mut obj) => {
                if obj.len() == 1 {
                    if let Some(J::String(hex)) = obj.get("$oid") {
                        if let Ok(id) = ObjectId::parse_str(hex) {
                            return Value::ObjectId(id);
                        }
                    }
                    if let Some(J::String(date)) = obj.get("$date") {
                        if let Ok(d) = DateTime::parse_from_rfc3339(date) {
                            return Value::DateTime(d.with_timezone(&Utc));
                        }
                    }
                }
                let keys: Vec<String> = obj.keys().cloned().collect();
                let mut m = M::new();
                for k in keys {
                    if let Some(v) = obj.remove(&k) {
                        m.insert(k, Value::from(v));
                    }
                }
                Value::Map(m)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::ObjectId(id) => serializer.serialize_str(&id.to_hex()),
            Value::DateTime(d) => serializer.serialize_str(&d.to_rfc3339()),
            Value::Map(m) => m.serialize(serializer),
            Value::Array(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl From<M> for Value {
    fn from(m: M) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Build a mapping from a JSON object literal. Non-objects yield an empty mapping.
pub fn doc(json: serde_json::Value) -> M {
    Value::from(json).into_map().unwrap_or_default()
}

/// Plain JSON object for a mapping.
pub fn m_to_json(m: &M) -> serde_json::Value {
    serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        } else if rest.is_empty() {
            return None;
        }
        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            segments.push(Segment::Index(stripped[..end].trim().parse().ok()?));
            rest = &stripped[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(segments)
}

/// Dotted/indexed lookup, e.g. `profile.address.city` or `tags[0]` or `items.1.name`.
pub fn lookup<'a>(data: &'a M, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    let (first, rest) = segments.split_first()?;
    let mut current = match first {
        Segment::Key(k) => data.get(*k)?,
        Segment::Index(_) => return None,
    };
    for segment in rest {
        current = match (segment, current) {
            (Segment::Key(k), Value::Map(m)) => m.get(*k)?,
            (Segment::Key(k), Value::Array(items)) => items.get(k.parse::<usize>().ok()?)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// True for field names that carry external-reference identifiers.
pub fn is_id_field(key: &str) -> bool {
    key == ID_FIELD || key == "id" || (key.len() > 2 && key.ends_with("Id"))
}

/// Converts hex strings held by id-like fields into [`ObjectId`], recursing into
/// nested mappings and sequences (so `where` clauses with `$or`/`$in` are covered).
pub fn replace_object_ids(data: &mut M) {
    for (key, value) in data.iter_mut() {
        replace_in_value(is_id_field(key), value);
    }
}

fn replace_in_value(id_context: bool, value: &mut Value) {
    match value {
        Value::String(s) if id_context => {
            if let Ok(id) = ObjectId::parse_str(s) {
                *value = Value::ObjectId(id);
            }
        }
        Value::Map(m) => {
            for (k, v) in m.iter_mut() {
                replace_in_value(id_context && k.starts_with('$') || is_id_field(k), v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                replace_in_value(id_context, v);
            }
        }
        _ => {}
    }
}
