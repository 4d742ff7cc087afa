//! Value types for the keyspace

use super::error::StoreError;
use super::set::{Set, SetEncoding};
use super::zset::SortedSet;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Parse `bytes` as an i64 only if they are its canonical decimal form.
///
/// Rejects a leading `+`, leading zeros, `-0`, whitespace and overflow, so
/// that formatting the result gives back the exact input bytes.
pub fn parse_canonical_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > 20 {
        return None;
    }
    let s = std::str::from_utf8(bytes).ok()?;
    let value: i64 = s.parse().ok()?;
    if value.to_string().as_bytes() == bytes {
        Some(value)
    } else {
        None
    }
}

/// Parse a float the way scores and increments are given on the wire
pub fn parse_f64(bytes: &[u8]) -> Result<f64, StoreError> {
    let s = std::str::from_utf8(bytes).map_err(|_| StoreError::NotFloat)?;
    let value = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| StoreError::NotFloat)?,
    };
    if value.is_nan() {
        return Err(StoreError::NotFloat);
    }
    Ok(value)
}

/// Render a float for replies: integral values without a fraction
pub fn format_f64(value: f64) -> String {
    if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e17 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// String payload: raw bytes, or an integer kept in native form
#[derive(Debug, Clone, PartialEq)]
pub enum StringValue {
    Raw(Bytes),
    Int(i64),
}

impl StringValue {
    /// Store `bytes`, using the integer form when they are canonical
    pub fn from_bytes(bytes: Bytes) -> Self {
        match parse_canonical_i64(&bytes) {
            Some(i) => StringValue::Int(i),
            None => StringValue::Raw(bytes),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            StringValue::Raw(b) => b.clone(),
            StringValue::Int(i) => Bytes::from(i.to_string()),
        }
    }

    /// Integer view used by INCR and friends
    pub fn as_i64(&self) -> Result<i64, StoreError> {
        match self {
            StringValue::Int(i) => Ok(*i),
            StringValue::Raw(b) => parse_canonical_i64(b).ok_or(StoreError::NotInteger),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StringValue::Raw(b) => b.len(),
            StringValue::Int(i) => i.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kind of value stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Hash,
    Set,
    SortedSet,
}

impl ValueKind {
    /// Name reported by TYPE
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Hash => "hash",
            ValueKind::Set => "set",
            ValueKind::SortedSet => "zset",
        }
    }
}

/// A value owned by the keyspace
#[derive(Debug, Clone)]
pub enum Value {
    String(StringValue),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(Set),
    SortedSet(SortedSet),
}

impl Value {
    /// Create a string value, integer-encoded when possible
    pub fn string(bytes: impl Into<Bytes>) -> Self {
        Value::String(StringValue::from_bytes(bytes.into()))
    }

    pub fn integer(i: i64) -> Self {
        Value::String(StringValue::Int(i))
    }

    pub fn empty_list() -> Self {
        Value::List(VecDeque::new())
    }

    pub fn empty_hash() -> Self {
        Value::Hash(HashMap::new())
    }

    pub fn empty_zset() -> Self {
        Value::SortedSet(SortedSet::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Hash(_) => ValueKind::Hash,
            Value::Set(_) => ValueKind::Set,
            Value::SortedSet(_) => ValueKind::SortedSet,
        }
    }

    /// Internal encoding name reported by OBJECT ENCODING
    pub fn encoding(&self) -> &'static str {
        match self {
            Value::String(StringValue::Int(_)) => "int",
            Value::String(StringValue::Raw(_)) => "raw",
            Value::List(_) => "linkedlist",
            Value::Hash(_) => "hashtable",
            Value::Set(set) => match set.encoding() {
                SetEncoding::Compact => "intset",
                SetEncoding::General => "hashtable",
            },
            Value::SortedSet(_) => "skiplist",
        }
    }

    /// Whether a collection value has no elements left
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::SortedSet(zset) => zset.is_empty(),
        }
    }

    pub fn as_string(&self) -> Result<&StringValue, StoreError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, StoreError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, StoreError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, StoreError> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, StoreError> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&Set, StoreError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut Set, StoreError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, StoreError> {
        match self {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, StoreError> {
        match self {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(StoreError::WrongType),
        }
    }

    /// Calculate approximate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::List(list) => {
                list.iter().map(|b| b.len()).sum::<usize>() + std::mem::size_of::<VecDeque<Bytes>>()
            }
            Value::Hash(hash) => {
                hash.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
                    + std::mem::size_of::<HashMap<Bytes, Bytes>>()
            }
            Value::Set(set) => set.memory_usage(),
            Value::SortedSet(zset) => zset.memory_usage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_integers() {
        assert_eq!(parse_canonical_i64(b"0"), Some(0));
        assert_eq!(parse_canonical_i64(b"-12"), Some(-12));
        assert_eq!(parse_canonical_i64(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_canonical_i64(b"9223372036854775808"), None);
        assert_eq!(parse_canonical_i64(b"+1"), None);
        assert_eq!(parse_canonical_i64(b"01"), None);
        assert_eq!(parse_canonical_i64(b"-0"), None);
        assert_eq!(parse_canonical_i64(b" 1"), None);
        assert_eq!(parse_canonical_i64(b""), None);
    }

    #[test]
    fn test_string_encoding() {
        assert_eq!(Value::string("123").encoding(), "int");
        assert_eq!(Value::string("abc").encoding(), "raw");
        assert_eq!(Value::string("0123").encoding(), "raw");
        assert_eq!(Value::string("123").as_string().unwrap().to_bytes(), Bytes::from("123"));
        assert_eq!(
            Value::string("+5").as_string().unwrap().as_i64(),
            Err(StoreError::NotInteger)
        );
    }

    #[test]
    fn test_typed_access() {
        let mut value = Value::empty_list();
        assert!(value.as_list_mut().is_ok());
        assert_eq!(value.as_hash().unwrap_err(), StoreError::WrongType);
        assert_eq!(value.kind().name(), "list");
        assert!(value.is_empty_collection());
        assert!(!Value::string("x").is_empty_collection());
    }

    #[test]
    fn test_float_parsing() {
        assert_eq!(parse_f64(b"1.5").unwrap(), 1.5);
        assert_eq!(parse_f64(b"-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_f64(b"+inf").unwrap(), f64::INFINITY);
        assert!(parse_f64(b"nan").is_err());
        assert!(parse_f64(b"abc").is_err());
        assert_eq!(format_f64(3.0), "3");
        assert_eq!(format_f64(1.5), "1.5");
        assert_eq!(format_f64(f64::INFINITY), "inf");
    }
}
