//! The closed catalog of guarded operations.
//!
//! Extending the catalog is a code change: add a variant, and the compiler
//! points at every `match` that needs a key, a configuration key and a
//! call-site signature for it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::well_known::keys;

/// How a call instruction dispatches to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    /// No receiver, resolved at link time.
    Static,
    /// Receiver-based dispatch through the class hierarchy.
    Virtual,
    /// Constructors, private methods and super calls.
    Special,
    /// Receiver-based dispatch through an interface.
    Interface,
}

impl InvokeKind {
    pub fn is_static(&self) -> bool {
        matches!(self, InvokeKind::Static)
    }
}

impl fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvokeKind::Static => "invokestatic",
            InvokeKind::Virtual => "invokevirtual",
            InvokeKind::Special => "invokespecial",
            InvokeKind::Interface => "invokeinterface",
        };
        f.write_str(s)
    }
}

/// Declarative pattern identifying a sensitive call site.
///
/// Matching is exact equality on all four fields; there is no overload
/// resolution and no partial match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationSignature {
    /// Internal name of the owning type, e.g. `java/lang/Runtime`.
    pub owner: &'static str,
    /// Member name, e.g. `exit`.
    pub name: &'static str,
    /// Parameter/return descriptor, e.g. `(I)V`.
    pub descriptor: &'static str,
    /// Dispatch kind of the call instruction.
    pub kind: InvokeKind,
}

impl fmt::Display for OperationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}{}",
            self.kind, self.owner, self.name, self.descriptor
        )
    }
}

/// A guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Terminating the process.
    RuntimeExit,
    /// Spawning an external process.
    ProcessStart,
    /// Opening an outbound network connection.
    SocketConnect,
}

impl Operation {
    /// Every guarded operation, in catalog order.
    pub const ALL: [Operation; 3] = [
        Operation::RuntimeExit,
        Operation::ProcessStart,
        Operation::SocketConnect,
    ];

    /// The literal the rewriter injects in front of the guard call.
    pub const fn key(self) -> &'static str {
        match self {
            Operation::RuntimeExit => "Runtime.exit",
            Operation::ProcessStart => "ProcessBuilder.start",
            Operation::SocketConnect => "Socket.connect",
        }
    }

    /// Name used in denial messages.
    pub const fn display_name(self) -> &'static str {
        match self {
            Operation::RuntimeExit => "Runtime.exit",
            Operation::ProcessStart => "ProcessBuilder.start(...)",
            Operation::SocketConnect => "Socket.connect",
        }
    }

    /// Configuration key holding this operation's allow-list.
    pub const fn config_key(self) -> &'static str {
        match self {
            Operation::RuntimeExit => keys::RUNTIME_EXIT_ALLOW,
            Operation::ProcessStart => keys::SYSTEM_EXEC_ALLOW,
            Operation::SocketConnect => keys::NETWORK_CONNECT_ALLOW,
        }
    }

    /// Call-site signature the rewriter matches for this operation.
    pub const fn signature(self) -> OperationSignature {
        match self {
            // System.exit delegates to Runtime.exit, so guarding the runtime
            // call site inside java/lang/System covers both entry points.
            Operation::RuntimeExit => OperationSignature {
                owner: "java/lang/Runtime",
                name: "exit",
                descriptor: "(I)V",
                kind: InvokeKind::Virtual,
            },
            Operation::ProcessStart => OperationSignature {
                owner: "java/lang/ProcessBuilder",
                name: "start",
                descriptor: "([Ljava/lang/ProcessBuilder$Redirect;)Ljava/lang/Process;",
                kind: InvokeKind::Virtual,
            },
            Operation::SocketConnect => OperationSignature {
                owner: "java/net/Socket",
                name: "connect",
                descriptor: "(Ljava/net/SocketAddress;)V",
                kind: InvokeKind::Virtual,
            },
        }
    }

    /// Runtime types whose own methods hold this operation's call site.
    ///
    /// These are loaded before any agent can run, so the host has to
    /// retransform them for their call sites to be guarded. `System.exit`
    /// reaches `Runtime.exit` from inside `java/lang/System`; `Runtime`
    /// itself never makes the call.
    pub const fn runtime_callers(self) -> &'static [&'static str] {
        match self {
            Operation::RuntimeExit => &["java/lang/System"],
            Operation::ProcessStart => &["java/lang/ProcessBuilder"],
            Operation::SocketConnect => &["java/net/Socket"],
        }
    }

    /// Resolve an injected key back to its operation.
    pub fn from_key(key: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.key() == key)
    }

    /// Resolve an allow-list configuration key to its operation.
    pub fn from_config_key(key: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.config_key() == key)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_key(op.key()), Some(op));
            assert_eq!(Operation::from_config_key(op.config_key()), Some(op));
        }
        assert_eq!(Operation::from_key("System.exit"), None);
        assert_eq!(Operation::from_config_key("callguard.system.foo.allow"), None);
    }

    #[test]
    fn test_keys_are_distinct() {
        let mut keys: Vec<_> = Operation::ALL.iter().map(|op| op.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Operation::ALL.len());
    }

    #[test]
    fn test_signatures_are_distinct() {
        let sigs: Vec<_> = Operation::ALL.iter().map(|op| op.signature()).collect();
        for (i, a) in sigs.iter().enumerate() {
            for b in &sigs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(
            Operation::RuntimeExit.signature().to_string(),
            "invokevirtual java/lang/Runtime.exit(I)V"
        );
    }

    #[test]
    fn test_exit_call_site_lives_in_system() {
        assert_eq!(Operation::RuntimeExit.runtime_callers(), &["java/lang/System"]);
        for op in Operation::ALL {
            assert!(!op.runtime_callers().is_empty());
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Operation::ProcessStart.to_string(), "ProcessBuilder.start(...)");
        assert_eq!(Operation::SocketConnect.to_string(), "Socket.connect");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Operation::ProcessStart).unwrap();
        assert_eq!(json, "\"process_start\"");
        let kind: InvokeKind = serde_json::from_str("\"interface\"").unwrap();
        assert_eq!(kind, InvokeKind::Interface);
    }
}
