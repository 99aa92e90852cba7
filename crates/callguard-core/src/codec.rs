//! Conversion between serialized class bytes and [`ClassArtifact`].
//!
//! The serialized format belongs to the host platform; [`ClassCodec`] is the
//! seam where a host plugs in its own. Two codecs ship with the crate:
//!
//! - [`BinaryCodec`]: magic + version header followed by a bincode payload
//! - [`JsonCodec`]: pretty JSON, for inspection and hand-written fixtures
//!
//! Both verify every method body before encoding, so a structurally broken
//! class is reported instead of written.

use crate::bytecode::ClassArtifact;
use crate::errors::CodecError;

/// Decodes and encodes class artifacts.
pub trait ClassCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<ClassArtifact, CodecError>;
    fn encode(&self, artifact: &ClassArtifact) -> Result<Vec<u8>, CodecError>;
}

impl<T: ClassCodec + ?Sized> ClassCodec for Box<T> {
    fn decode(&self, bytes: &[u8]) -> Result<ClassArtifact, CodecError> {
        (**self).decode(bytes)
    }

    fn encode(&self, artifact: &ClassArtifact) -> Result<Vec<u8>, CodecError> {
        (**self).encode(artifact)
    }
}

/// Leading bytes of every [`BinaryCodec`] artifact.
pub const MAGIC: [u8; 4] = *b"CGCA";
/// Current [`BinaryCodec`] format version.
pub const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Compact binary encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl ClassCodec for BinaryCodec {
    fn decode(&self, bytes: &[u8]) -> Result<ClassArtifact, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated { len: bytes.len() });
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        let mut found = [0u8; 4];
        found.copy_from_slice(&header[..4]);
        if found != MAGIC {
            return Err(CodecError::BadMagic { found });
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }
        bincode::deserialize(payload).map_err(|e| CodecError::Malformed {
            message: e.to_string(),
        })
    }

    fn encode(&self, artifact: &ClassArtifact) -> Result<Vec<u8>, CodecError> {
        verify(artifact)?;
        let payload = bincode::serialize(artifact).map_err(|e| CodecError::Serialize {
            message: e.to_string(),
        })?;
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Human-readable JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ClassCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<ClassArtifact, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
            message: e.to_string(),
        })
    }

    fn encode(&self, artifact: &ClassArtifact) -> Result<Vec<u8>, CodecError> {
        verify(artifact)?;
        serde_json::to_vec_pretty(artifact).map_err(|e| CodecError::Serialize {
            message: e.to_string(),
        })
    }
}

fn verify(artifact: &ClassArtifact) -> Result<(), CodecError> {
    artifact
        .verify()
        .map_err(|(method, source)| CodecError::Verify { method, source })
}
