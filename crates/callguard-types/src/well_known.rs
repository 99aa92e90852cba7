//! Well-known names shared by the rewriter, the policy engine and the agent.
//!
//! # Usage
//!
//! ```
//! use callguard_types::well_known::{guard, keys};
//!
//! assert_eq!(guard::METHOD, "checkPermission");
//! assert!(keys::ALL.contains(&keys::BOOTSTRAP_ARTIFACT));
//! ```

/// Reserved prefix of every configuration key callguard owns.
pub const CONFIG_PREFIX: &str = "callguard.";

/// Recognized configuration keys.
pub mod keys {
    pub const RUNTIME_EXIT_ALLOW: &str = "callguard.runtime.exit.allow";
    pub const SYSTEM_EXEC_ALLOW: &str = "callguard.system.exec.allow";
    pub const NETWORK_CONNECT_ALLOW: &str = "callguard.network.connect.allow";
    pub const BOOTSTRAP_ARTIFACT: &str = "callguard.bootstrap.artifact";

    /// Every recognized key, in the order they are reported in errors.
    pub const ALL: [&str; 4] = [
        RUNTIME_EXIT_ALLOW,
        SYSTEM_EXEC_ALLOW,
        NETWORK_CONNECT_ALLOW,
        BOOTSTRAP_ARTIFACT,
    ];
}

/// Coordinates of the guard entry point the rewriter calls.
///
/// The guard lives in the bootstrap support artifact, which is visible to
/// every class loader, so rewritten system classes can link against it.
pub mod guard {
    /// Internal name of the type declaring the guard entry.
    pub const OWNER: &str = "callguard/bootstrap/AccessControl";
    pub const METHOD: &str = "checkPermission";
    /// Takes the operation key, returns nothing.
    pub const DESCRIPTOR: &str = "(Ljava/lang/String;)V";
    /// Extra operand-stack slots the injected sequence needs at its peak.
    pub const STACK_PEAK: u16 = 1;
}

/// Principal names with a fixed role in caller attribution.
pub mod modules {
    /// The runtime that owns the guarded operations themselves.
    pub const RUNTIME: &str = "java.base";
    /// The guard support code: guard entry, policy engine, resolver.
    pub const GUARD: &str = "callguard.bootstrap";
}
