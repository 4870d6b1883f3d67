//! Interface descriptors (ABI JSON) and the typed handles derived from them.
//!
//! A unit never calls a contract method by late string lookup: the method or
//! event is resolved against the descriptor first, producing a [`Method`] or
//! [`EventRule`] whose argument types and field layout are known before any
//! transaction is submitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha3::{Digest, Keccak256};

use crate::abi::{self, ParamType, Token};
use crate::error::AbiError;
use crate::types::{Fingerprint, H256};

/// Keccak-256 digest (selectors and event topics).
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h.finalize());
    out
}

/// One parameter of an ABI entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of an ABI descriptor (function, event, constructor, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type", default = "default_entry_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_entry_type() -> String {
    "function".to_owned()
}

impl AbiEntry {
    fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name.as_deref().unwrap_or_default(), types.join(","))
    }

    fn param_types(&self) -> Vec<ParamType> {
        self.inputs.iter().map(|p| ParamType::parse(&p.ty)).collect()
    }
}

/// A contract's interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interface {
    pub entries: Vec<AbiEntry>,
}

impl Interface {
    /// Parse an ABI JSON array.
    pub fn from_json(value: Value) -> Result<Self, AbiError> {
        serde_json::from_value(value).map_err(|e| AbiError::Descriptor(e.to_string()))
    }

    /// Fingerprint of the canonical JSON form.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&serde_json::to_vec(self).unwrap_or_default())
    }

    /// Constructor parameter types; empty when the contract has no constructor.
    pub fn constructor(&self) -> Vec<ParamType> {
        self.entries
            .iter()
            .find(|e| e.kind == "constructor")
            .map(AbiEntry::param_types)
            .unwrap_or_default()
    }

    /// Resolve a method by bare name (`initialize`) or full signature
    /// (`createERC20Wrapper(address,uint8,string,string)`).
    pub fn method(&self, contract: &str, selector: &str) -> Result<Method, AbiError> {
        let by_signature = selector.contains('(');
        let mut matches = self.entries.iter().filter(|e| {
            e.kind == "function"
                && if by_signature {
                    e.signature() == selector
                } else {
                    e.name.as_deref() == Some(selector)
                }
        });
        let entry = matches.next().ok_or_else(|| AbiError::UnknownMethod {
            contract: contract.to_owned(),
            method: selector.to_owned(),
        })?;
        if matches.next().is_some() {
            return Err(AbiError::AmbiguousMethod {
                contract: contract.to_owned(),
                method: selector.to_owned(),
            });
        }
        let signature = entry.signature();
        let digest = keccak256(signature.as_bytes());
        Ok(Method {
            name: entry.name.clone().unwrap_or_default(),
            inputs: entry.param_types(),
            selector: [digest[0], digest[1], digest[2], digest[3]],
            signature,
        })
    }

    /// Build the decoding rule for an address-typed field of an event.
    ///
    /// `event` may be a bare name or a full signature.
    pub fn event_rule(
        &self,
        contract: &str,
        event: &str,
        field: &str,
    ) -> Result<EventRule, AbiError> {
        let by_signature = event.contains('(');
        let entry = self
            .entries
            .iter()
            .find(|e| {
                e.kind == "event"
                    && if by_signature {
                        e.signature() == event
                    } else {
                        e.name.as_deref() == Some(event)
                    }
            })
            .ok_or_else(|| AbiError::UnknownEvent {
                contract: contract.to_owned(),
                event: event.to_owned(),
            })?;
        if entry.anonymous == Some(true) {
            return Err(AbiError::Descriptor(format!(
                "event '{event}' is anonymous and has no signature topic"
            )));
        }

        let signature = entry.signature();
        let unknown_field = || AbiError::UnknownEventField {
            event: signature.clone(),
            field: field.to_owned(),
        };
        let position = entry
            .inputs
            .iter()
            .position(|p| p.name == field)
            .ok_or_else(unknown_field)?;
        if ParamType::parse(&entry.inputs[position].ty) != ParamType::Address {
            return Err(unknown_field());
        }

        let is_indexed = |p: &AbiParam| p.indexed == Some(true);
        let indexed_count = entry.inputs.iter().filter(|p| is_indexed(p)).count();
        let location = if is_indexed(&entry.inputs[position]) {
            let before = entry.inputs[..position].iter().filter(|p| is_indexed(p)).count();
            FieldLocation::Topic(1 + before)
        } else {
            let before = entry.inputs[..position].iter().filter(|p| !is_indexed(p)).count();
            FieldLocation::Data(before)
        };
        let data_words = entry.inputs.len() - indexed_count;

        Ok(EventRule {
            topic: H256(keccak256(signature.as_bytes())),
            event: signature,
            location,
            indexed_count,
            data_words,
        })
    }
}

/// A method resolved against an interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<ParamType>,
}

impl Method {
    /// Selector followed by the ABI-encoded, type-checked arguments.
    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        let mut data = self.selector.to_vec();
        data.extend(abi::encode(&self.inputs, args, &self.signature)?);
        Ok(data)
    }
}

/// Where an address field lives inside a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    /// Index into `topics` (topic 0 is the signature).
    Topic(usize),
    /// Index of a 32-byte word in `data`.
    Data(usize),
}

/// Declared decoding rule for one address field of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRule {
    pub event: String,
    pub topic: H256,
    pub location: FieldLocation,
    /// Number of indexed parameters; a matching log must carry exactly
    /// `1 + indexed_count` topics.
    pub indexed_count: usize,
    /// Number of non-indexed parameters (minimum data words).
    pub data_words: usize,
}

impl EventRule {
    /// Rule for a raw signature topic whose address sits in an indexed slot.
    pub fn indexed(
        event: impl Into<String>,
        topic: H256,
        topic_index: usize,
        indexed_count: usize,
    ) -> Self {
        Self {
            event: event.into(),
            topic,
            location: FieldLocation::Topic(topic_index),
            indexed_count,
            data_words: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
