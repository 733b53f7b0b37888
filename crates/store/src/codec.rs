//! Value codecs: a [`Serializer`] turns typed values into bytes and a
//! [`Compression`] codec optionally shrinks those bytes before they reach a
//! backend.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zstd::{decode_all, encode_all};

use crate::StoreError;

fn default_delimiter() -> char {
    '|'
}

/// Value serialization format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Serializer {
    #[default]
    Json,
    Bincode,
    /// Joins a sequence of strings with `delimiter`. Only string sequences
    /// (or a single string) can be encoded.
    Delimited {
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
}

impl Serializer {
    pub fn delimited() -> Self {
        Serializer::Delimited {
            delimiter: default_delimiter(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Serializer::Json => "json",
            Serializer::Bincode => "bincode",
            Serializer::Delimited { .. } => "delimited",
        }
    }

    /// Whether this format can encode arbitrary structs, not just string lists.
    pub fn supports_records(&self) -> bool {
        !matches!(self, Serializer::Delimited { .. })
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        match self {
            Serializer::Json => serde_json::to_vec(value).map_err(StoreError::codec),
            Serializer::Bincode => encode_to_vec(value, standard()).map_err(StoreError::codec),
            Serializer::Delimited { delimiter } => {
                let value = serde_json::to_value(value).map_err(StoreError::codec)?;
                encode_delimited(value, *delimiter)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        match self {
            Serializer::Json => serde_json::from_slice(bytes).map_err(StoreError::codec),
            Serializer::Bincode => decode_from_slice(bytes, standard())
                .map(|(value, _)| value)
                .map_err(StoreError::codec),
            Serializer::Delimited { delimiter } => {
                let text = std::str::from_utf8(bytes).map_err(StoreError::codec)?;
                let items: Vec<Value> = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split(*delimiter)
                        .map(|item| Value::String(item.to_string()))
                        .collect()
                };
                serde_json::from_value(Value::Array(items)).map_err(StoreError::codec)
            }
        }
    }
}

fn encode_delimited(value: Value, delimiter: char) -> Result<Vec<u8>, StoreError> {
    let items = match value {
        Value::Array(items) => items,
        Value::String(item) => vec![Value::String(item)],
        other => {
            return Err(StoreError::Codec(format!(
                "delimited serializer only encodes string sequences, got {other}"
            )))
        }
    };
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        let Value::String(item) = item else {
            return Err(StoreError::Codec(
                "delimited serializer only encodes string sequences".into(),
            ));
        };
        if item.contains(delimiter) {
            return Err(StoreError::Codec(format!(
                "value {item:?} contains the delimiter {delimiter:?}"
            )));
        }
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(&item);
    }
    Ok(out.into_bytes())
}

/// Compression applied to encoded values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    /// Zstd with the given level (1-22, higher is smaller but slower).
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
    },
}

fn default_zstd_level() -> i32 {
    3
}

impl Compression {
    pub fn zstd() -> Self {
        Compression::Zstd {
            level: default_zstd_level(),
        }
    }

    pub fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        match self {
            Compression::None => Ok(data),
            Compression::Zstd { level } => {
                encode_all(data.as_slice(), *level).map_err(StoreError::codec)
            }
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Zstd { .. } => decode_all(data).map_err(StoreError::codec),
        }
    }
}
