//! Error types for decoding, rewriting and re-encoding classes.
//!
//! All of these are fatal for the class being transformed: a class that cannot
//! be rewritten correctly must not be handed back to the host, because an
//! unguarded sensitive call is worse than a failed load.

use std::fmt;

use crate::bytecode::Label;

/// A method body that is not structurally well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The same label is defined twice.
    DuplicateLabel { label: Label },
    /// A branch, handler or frame refers to a label that is never defined.
    UndefinedLabel {
        label: Label,
        /// Where the reference was found, e.g. "instruction 12".
        site: String,
    },
    /// An exception handler whose end precedes its start.
    InvertedHandlerRange { start: Label, end: Label },
    /// A stack map frame records more operand-stack entries than `max_stack`.
    FrameExceedsMaxStack {
        label: Label,
        depth: usize,
        max_stack: u16,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::DuplicateLabel { label } => {
                write!(f, "label {} is defined more than once", label)
            }
            VerifyError::UndefinedLabel { label, site } => {
                write!(f, "{} refers to undefined label {}", site, label)
            }
            VerifyError::InvertedHandlerRange { start, end } => {
                write!(f, "exception range {}..{} ends before it starts", start, end)
            }
            VerifyError::FrameExceedsMaxStack {
                label,
                depth,
                max_stack,
            } => write!(
                f,
                "stack map frame at {} has {} stack entries but max_stack is {}",
                label, depth, max_stack
            ),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Failure converting between class bytes and a [`ClassArtifact`](crate::bytecode::ClassArtifact).
#[derive(Debug)]
pub enum CodecError {
    /// Input shorter than the fixed header.
    Truncated { len: usize },
    /// Input does not start with the expected magic number.
    BadMagic { found: [u8; 4] },
    /// Header carries a format version this codec does not read.
    UnsupportedVersion { version: u16 },
    /// Payload could not be decoded.
    Malformed { message: String },
    /// The artifact could not be serialized.
    Serialize { message: String },
    /// A method body failed verification, so it was not encoded.
    Verify { method: String, source: VerifyError },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated { len } => {
                write!(f, "class bytes truncated: {} bytes is shorter than the header", len)
            }
            CodecError::BadMagic { found } => {
                write!(f, "bad magic number {:02x?}", found)
            }
            CodecError::UnsupportedVersion { version } => {
                write!(f, "unsupported class format version {}", version)
            }
            CodecError::Malformed { message } => write!(f, "malformed class: {}", message),
            CodecError::Serialize { message } => {
                write!(f, "failed to serialize class: {}", message)
            }
            CodecError::Verify { method, source } => {
                write!(f, "method {} failed verification: {}", method, source)
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Verify { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Guard injection that cannot produce a valid method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// Growing `max_stack` for the injected guard would overflow.
    StackOverflow { max_stack: u16 },
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteError::StackOverflow { max_stack } => write!(
                f,
                "no operand-stack room for the guard call (max_stack is {})",
                max_stack
            ),
        }
    }
}

impl std::error::Error for RewriteError {}

/// Failure transforming one class.
#[derive(Debug)]
pub enum TransformError {
    /// The incoming bytes could not be decoded.
    Decode(CodecError),
    /// A method could not be rewritten.
    Rewrite {
        class: String,
        method: String,
        source: RewriteError,
    },
    /// The rewritten class could not be re-encoded.
    Encode { class: String, source: CodecError },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Decode(e) => write!(f, "cannot decode class: {}", e),
            TransformError::Rewrite {
                class,
                method,
                source,
            } => write!(f, "cannot rewrite {}.{}: {}", class, method, source),
            TransformError::Encode { class, source } => {
                write!(f, "cannot re-encode {}: {}", class, source)
            }
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransformError::Decode(e) => Some(e),
            TransformError::Rewrite { source, .. } => Some(source),
            TransformError::Encode { source, .. } => Some(source),
        }
    }
}
