//! callguard core
//!
//! Finds calls to guarded operations in compiled method bodies and injects a
//! call to the guard entry ahead of them.
//!
//! # Pipeline
//!
//! 1. A [`ClassCodec`] decodes host bytes into a [`ClassArtifact`].
//! 2. For every method, the [`matcher`] locates calls matching each
//!    [`TransformRule`]'s signature.
//! 3. The [`rewriter`] injects the operation key and the guard call once per
//!    rule per method.
//! 4. The [`Transformer`] re-encodes the class, or reports that nothing changed.
//!
//! # Core Modules
//!
//! - [`bytecode`]: class, method and instruction model
//! - [`codec`]: byte formats for [`ClassArtifact`]
//! - [`matcher`]: exact call-site matching
//! - [`rules`]: transform rules and rule sets
//! - [`rewriter`]: guard injection into one method body
//! - [`orchestrator`]: whole-class transform with dispatch strategies
//! - [`errors`]: error types
//!
//! # Example
//!
//! ```
//! use callguard_core::{
//!     BinaryCodec, ClassArtifact, ClassCodec, Instruction, Method, MethodBody, RuleSet,
//!     Transformer,
//! };
//! use callguard_types::Operation;
//!
//! let class = ClassArtifact::new("app/Main").with_method(Method::new(
//!     "main",
//!     "([Ljava/lang/String;)V",
//!     MethodBody::new(2, 1, vec![
//!         Instruction::op(0x04),
//!         Instruction::call(Operation::RuntimeExit.signature()),
//!     ]),
//! ));
//! let bytes = BinaryCodec.encode(&class).unwrap();
//!
//! let rewritten = Transformer::new(RuleSet::standard())
//!     .transform(&bytes)
//!     .unwrap()
//!     .expect("exit call is guarded");
//! let class = BinaryCodec.decode(&rewritten).unwrap();
//! assert_eq!(class.methods[0].body.as_ref().unwrap().instructions.len(), 4);
//! ```

pub mod bytecode;
pub mod codec;
pub mod errors;
pub mod matcher;
pub mod orchestrator;
pub mod rewriter;
pub mod rules;

pub use bytecode::{
    Attribute, ClassArtifact, Constant, ExceptionHandler, Instruction, Invocation, Label, Method,
    MethodBody, StackMapFrame,
};
pub use codec::{BinaryCodec, ClassCodec, JsonCodec};
pub use errors::{CodecError, RewriteError, TransformError, VerifyError};
pub use matcher::matches;
pub use orchestrator::{transform, Dispatch, GuardedSite, TransformReport, Transformer};
pub use rewriter::{rewrite_method, RewriteContext, Rewritten};
pub use rules::{Placement, RuleSet, TransformRule};
