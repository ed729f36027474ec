//! Wire envelopes and the binary envelope codec
//!
//! Every unit of data crossing the link is an [`Envelope`]: a kind tag, a
//! per-direction sequence id, an optional reply correlation id, and a typed
//! body. Bodies are either a schema-constrained key-value map or a raw byte
//! blob; the allowed value types are decided here, at the codec boundary.
//!
//! Wire layout (big-endian throughout):
//!
//! ```text
//! magic(2) version(1) kind(1) flags(1) sequence(8)
//! [reply_to(8)] body_len(4) body(..) checksum(4)
//! ```

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::errors::CodecError;
use crate::types::SequenceId;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Magic bytes prefixing every wire frame ("WL")
pub const ENVELOPE_MAGIC: u16 = 0x574C;

/// Current wire format version
pub const WIRE_VERSION: u8 = 1;

/// Size of the fixed header portion: magic + version + kind + flags + sequence
pub const FIXED_HEADER_SIZE: usize = 2 + 1 + 1 + 1 + 8;

/// Size of the crc32 checksum trailer
pub const CHECKSUM_SIZE: usize = 4;

// ----------------------------------------------------------------------------
// Payload Values
// ----------------------------------------------------------------------------

/// A single payload value with an explicit allowed type
///
/// Replaces untyped key-value maps: anything not expressible here is
/// rejected before it reaches the wire, not silently mangled during
/// serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Blob(Vec<u8>),
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Str(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Str(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Int(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Float(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(value: Vec<u8>) -> Self {
        PayloadValue::Blob(value)
    }
}

impl PayloadValue {
    /// Get the string value, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PayloadValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the blob bytes, if this is a blob
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            PayloadValue::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// Key-value payload carried by map-bodied envelopes
pub type PayloadMap = HashMap<String, PayloadValue>;

// ----------------------------------------------------------------------------
// Envelope Kind
// ----------------------------------------------------------------------------

/// Typed tag identifying what an envelope carries
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    Context = 0x01,
    Message = 0x02,
    MessageData = 0x03,
    UserInfo = 0x04,
    File = 0x05,
    ComplicationUserInfo = 0x06,
}

impl EnvelopeKind {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0x01 => Ok(EnvelopeKind::Context),
            0x02 => Ok(EnvelopeKind::Message),
            0x03 => Ok(EnvelopeKind::MessageData),
            0x04 => Ok(EnvelopeKind::UserInfo),
            0x05 => Ok(EnvelopeKind::File),
            0x06 => Ok(EnvelopeKind::ComplicationUserInfo),
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    /// Kind name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EnvelopeKind::Context => "Context",
            EnvelopeKind::Message => "Message",
            EnvelopeKind::MessageData => "MessageData",
            EnvelopeKind::UserInfo => "UserInfo",
            EnvelopeKind::File => "File",
            EnvelopeKind::ComplicationUserInfo => "ComplicationUserInfo",
        }
    }
}

// ----------------------------------------------------------------------------
// Envelope Flags
// ----------------------------------------------------------------------------

/// Bit flags in the envelope header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeFlags(u8);

impl EnvelopeFlags {
    pub const HAS_REPLY_TO: u8 = 0b0000_0001;
    pub const BODY_BLOB: u8 = 0b0000_0010;
    pub const WANTS_REPLY: u8 = 0b0000_0100;

    const KNOWN_BITS: u8 = Self::HAS_REPLY_TO | Self::BODY_BLOB | Self::WANTS_REPLY;

    /// Parse flags, rejecting unknown bits
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        if value & !Self::KNOWN_BITS != 0 {
            return Err(CodecError::UnknownFlags(value));
        }
        Ok(Self(value))
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn has_reply_to(&self) -> bool {
        self.0 & Self::HAS_REPLY_TO != 0
    }

    pub fn body_is_blob(&self) -> bool {
        self.0 & Self::BODY_BLOB != 0
    }

    pub fn wants_reply(&self) -> bool {
        self.0 & Self::WANTS_REPLY != 0
    }
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// Typed envelope body: a key-value map or raw bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvelopeBody {
    Map(PayloadMap),
    Blob(Vec<u8>),
}

impl EnvelopeBody {
    /// Get the map, if this body is a map
    pub fn as_map(&self) -> Option<&PayloadMap> {
        match self {
            EnvelopeBody::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get the bytes, if this body is a blob
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            EnvelopeBody::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// A single typed, sequenced unit of wire data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What this envelope carries
    pub kind: EnvelopeKind,
    /// Strictly increasing per-direction sequence id
    pub sequence: SequenceId,
    /// Correlates a reply with the sequence id it answers
    pub reply_to: Option<SequenceId>,
    /// Sender expects a one-shot reply to this sequence id
    pub wants_reply: bool,
    /// Typed payload
    pub body: EnvelopeBody,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(kind: EnvelopeKind, sequence: SequenceId, body: EnvelopeBody) -> Self {
        Self {
            kind,
            sequence,
            reply_to: None,
            wants_reply: false,
            body,
        }
    }

    /// Create a live message envelope with a key-value payload
    pub fn message(sequence: SequenceId, payload: PayloadMap) -> Self {
        Self::new(EnvelopeKind::Message, sequence, EnvelopeBody::Map(payload))
    }

    /// Create a live message envelope with a raw byte payload
    pub fn message_data(sequence: SequenceId, data: Vec<u8>) -> Self {
        Self::new(EnvelopeKind::MessageData, sequence, EnvelopeBody::Blob(data))
    }

    /// Mark this envelope as a reply to an earlier sequence id
    pub fn in_reply_to(mut self, sequence: SequenceId) -> Self {
        self.reply_to = Some(sequence);
        self
    }

    /// Mark this envelope as expecting a one-shot reply
    pub fn requesting_reply(mut self) -> Self {
        self.wants_reply = true;
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.reply_to.is_some() {
            flags |= EnvelopeFlags::HAS_REPLY_TO;
        }
        if matches!(self.body, EnvelopeBody::Blob(_)) {
            flags |= EnvelopeFlags::BODY_BLOB;
        }
        if self.wants_reply {
            flags |= EnvelopeFlags::WANTS_REPLY;
        }
        flags
    }
}

// ----------------------------------------------------------------------------
// Envelope Codec
// ----------------------------------------------------------------------------

/// Binary wire format encoder/decoder for [`Envelope`]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Encode an envelope to binary wire format
    pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        let body_bytes = match &envelope.body {
            EnvelopeBody::Map(map) => bincode::serialize(map)?,
            EnvelopeBody::Blob(bytes) => bytes.clone(),
        };

        let mut bytes = Vec::with_capacity(FIXED_HEADER_SIZE + 12 + body_bytes.len() + CHECKSUM_SIZE);

        // 1. Fixed header
        bytes.extend_from_slice(&ENVELOPE_MAGIC.to_be_bytes());
        bytes.push(WIRE_VERSION);
        bytes.push(envelope.kind as u8);
        bytes.push(envelope.flags());
        bytes.extend_from_slice(&envelope.sequence.as_u64().to_be_bytes());

        // 2. Optional reply correlation id
        if let Some(reply_to) = envelope.reply_to {
            bytes.extend_from_slice(&reply_to.as_u64().to_be_bytes());
        }

        // 3. Body, length-prefixed
        bytes.extend_from_slice(&(body_bytes.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body_bytes);

        // 4. Checksum over everything before it
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_be_bytes());

        Ok(bytes)
    }

    /// Decode an envelope from binary wire format
    pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
        if bytes.len() < FIXED_HEADER_SIZE + 4 + CHECKSUM_SIZE {
            return Err(CodecError::Truncated {
                needed: FIXED_HEADER_SIZE + 4 + CHECKSUM_SIZE,
                available: bytes.len(),
            });
        }

        // Checksum first: everything after this point trusts the frame
        let body_end = bytes.len() - CHECKSUM_SIZE;
        let checksum_bytes: [u8; 4] = bytes[body_end..]
            .try_into()
            .map_err(|_| CodecError::Truncated {
                needed: CHECKSUM_SIZE,
                available: bytes.len() - body_end,
            })?;
        let expected = u32::from_be_bytes(checksum_bytes);
        let computed = crc32fast::hash(&bytes[..body_end]);
        if expected != computed {
            return Err(CodecError::ChecksumMismatch { expected, computed });
        }

        let mut offset = 0;

        // 1. Fixed header
        let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
        if magic != ENVELOPE_MAGIC {
            return Err(CodecError::BadMagic(magic));
        }
        let version = bytes[2];
        if version != WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let kind = EnvelopeKind::from_u8(bytes[3])?;
        let flags = EnvelopeFlags::from_u8(bytes[4])?;
        let sequence_bytes: [u8; 8] = bytes[5..13]
            .try_into()
            .map_err(|_| CodecError::Truncated {
                needed: FIXED_HEADER_SIZE,
                available: bytes.len(),
            })?;
        let sequence = SequenceId::new(u64::from_be_bytes(sequence_bytes));
        offset += FIXED_HEADER_SIZE;

        // 2. Optional reply correlation id
        let reply_to = if flags.has_reply_to() {
            if body_end < offset + 8 {
                return Err(CodecError::Truncated {
                    needed: offset + 8,
                    available: body_end,
                });
            }
            let reply_bytes: [u8; 8] = bytes[offset..offset + 8]
                .try_into()
                .map_err(|_| CodecError::Truncated {
                    needed: offset + 8,
                    available: body_end,
                })?;
            offset += 8;
            Some(SequenceId::new(u64::from_be_bytes(reply_bytes)))
        } else {
            None
        };

        // 3. Body
        if body_end < offset + 4 {
            return Err(CodecError::Truncated {
                needed: offset + 4,
                available: body_end,
            });
        }
        let len_bytes: [u8; 4] = bytes[offset..offset + 4]
            .try_into()
            .map_err(|_| CodecError::Truncated {
                needed: offset + 4,
                available: body_end,
            })?;
        let body_len = u32::from_be_bytes(len_bytes) as usize;
        offset += 4;

        if body_end < offset + body_len {
            return Err(CodecError::Truncated {
                needed: offset + body_len,
                available: body_end,
            });
        }
        let body_bytes = &bytes[offset..offset + body_len];
        offset += body_len;

        if offset != body_end {
            return Err(CodecError::TrailingBytes(body_end - offset));
        }

        let body = if flags.body_is_blob() {
            EnvelopeBody::Blob(body_bytes.to_vec())
        } else {
            EnvelopeBody::Map(bincode::deserialize(body_bytes)?)
        };

        Ok(Envelope {
            kind,
            sequence,
            reply_to,
            wants_reply: flags.wants_reply(),
            body,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
