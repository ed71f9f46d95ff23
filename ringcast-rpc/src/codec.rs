use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::RpcError;

pub const CBOR_PROTOCOL: &str = "cbor";
pub const JSON_PROTOCOL: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// The self-describing encoding used for call arguments and replies.
///
/// Both sides of a connection must agree on the codec out of band.
pub enum Codec {
    #[default]
    /// Compact binary CBOR.
    Cbor,
    /// Plain JSON, mostly useful when debugging traffic.
    Json,
}

impl Codec {
    /// The protocol name the codec is registered under by default.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cbor => CBOR_PROTOCOL,
            Self::Json => JSON_PROTOCOL,
        }
    }

    /// Encodes a value into a payload blob.
    pub fn encode<T>(&self, value: &T) -> Result<Vec<u8>, RpcError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Cbor => {
                serde_cbor::to_vec(&value).map_err(|e| RpcError::Codec(e.to_string()))
            },
            Self::Json => {
                serde_json::to_vec(value).map_err(|e| RpcError::Codec(e.to_string()))
            },
        }
    }

    /// Decodes a value from a payload blob.
    pub fn decode<T>(&self, buf: &[u8]) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Cbor => {
                serde_cbor::from_slice(buf).map_err(|e| RpcError::Codec(e.to_string()))
            },
            Self::Json => {
                serde_json::from_slice(buf).map_err(|e| RpcError::Codec(e.to_string()))
            },
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a codec for a registered protocol name.
pub type CodecConstructor = fn() -> Codec;

#[derive(Clone)]
/// Maps protocol names onto codecs.
///
/// The registry is populated once at start up and then used to resolve the
/// configured protocol name.
pub struct CodecRegistry {
    constructors: BTreeMap<String, CodecConstructor>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CBOR_PROTOCOL, || Codec::Cbor);
        registry.register(JSON_PROTOCOL, || Codec::Json);
        registry
    }
}

impl CodecRegistry {
    /// Creates a registry with no protocols.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers a protocol name, replacing any existing entry.
    pub fn register(&mut self, name: impl Into<String>, constructor: CodecConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Resolves a protocol name into its codec.
    pub fn get(&self, name: &str) -> Result<Codec, RpcError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| RpcError::UnknownProtocol(name.to_string()))
    }

    /// The registered protocol names.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|name| name.as_str())
    }
}
