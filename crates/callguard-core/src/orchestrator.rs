//! Per-class transform entry point.
//!
//! A [`Transformer`] holds only read-only state (rules, codec, dispatch
//! strategy), so one instance can serve any number of threads. Each call
//! decodes its own [`ClassArtifact`], rewrites it, and re-encodes it.
//!
//! # Usage
//!
//! ```
//! use callguard_core::{BinaryCodec, ClassArtifact, ClassCodec, RuleSet, Transformer};
//!
//! let transformer = Transformer::new(RuleSet::standard());
//! let bytes = BinaryCodec.encode(&ClassArtifact::new("app/Empty")).unwrap();
//! // Nothing to guard: the host keeps its original bytes.
//! assert!(transformer.transform(&bytes).unwrap().is_none());
//! ```

use serde::Serialize;
use tracing::debug;

use callguard_types::Operation;

use crate::bytecode::ClassArtifact;
use crate::codec::{BinaryCodec, ClassCodec};
use crate::errors::TransformError;
use crate::rewriter::{rewrite_body, RewriteContext};
use crate::rules::{RuleSet, TransformRule};

/// How the transformer picks the rules to run on a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Every rule on every class.
    #[default]
    AllRules,
    /// Skip rules whose owner type the class never calls into.
    ReferencedOwners,
}

/// A method that received a guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardedSite {
    pub method: String,
    pub operation: Operation,
}

/// What one transform did to one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub class: String,
    pub guarded: Vec<GuardedSite>,
}

impl TransformReport {
    pub fn is_modified(&self) -> bool {
        !self.guarded.is_empty()
    }
}

/// Decodes, rewrites and re-encodes classes.
#[derive(Debug, Clone)]
pub struct Transformer<C: ClassCodec = BinaryCodec> {
    rules: RuleSet,
    codec: C,
    dispatch: Dispatch,
}

impl Transformer<BinaryCodec> {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            codec: BinaryCodec,
            dispatch: Dispatch::default(),
        }
    }
}

impl<C: ClassCodec> Transformer<C> {
    /// Replace the codec, keeping rules and dispatch.
    pub fn with_codec<D: ClassCodec>(self, codec: D) -> Transformer<D> {
        Transformer {
            rules: self.rules,
            codec,
            dispatch: self.dispatch,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Transform serialized class bytes.
    ///
    /// Returns `Ok(None)` when no rule changed anything, in which case the
    /// host should keep the bytes it already has.
    pub fn transform(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, TransformError> {
        self.transform_with_report(bytes).map(|(_, encoded)| encoded)
    }

    /// Like [`Transformer::transform`], also returning what was guarded.
    pub fn transform_with_report(
        &self,
        bytes: &[u8],
    ) -> Result<(TransformReport, Option<Vec<u8>>), TransformError> {
        let mut artifact = self.codec.decode(bytes).map_err(TransformError::Decode)?;
        let report = self.transform_artifact(&mut artifact)?;
        if !report.is_modified() {
            return Ok((report, None));
        }
        let encoded = self
            .codec
            .encode(&artifact)
            .map_err(|source| TransformError::Encode {
                class: artifact.name.clone(),
                source,
            })?;
        Ok((report, Some(encoded)))
    }

    /// Rewrite an already decoded class in place.
    pub fn transform_artifact(
        &self,
        artifact: &mut ClassArtifact,
    ) -> Result<TransformReport, TransformError> {
        let rules = self.applicable_rules(artifact);
        let mut report = TransformReport {
            class: artifact.name.clone(),
            guarded: Vec::new(),
        };
        if rules.is_empty() {
            return Ok(report);
        }

        let mut ctx = RewriteContext::new(rules.len());
        for method in &mut artifact.methods {
            let qualified = method.qualified_name();
            let Some(body) = method.body.as_mut() else {
                continue;
            };
            let guarded =
                rewrite_body(body, &rules, &mut ctx).map_err(|source| TransformError::Rewrite {
                    class: artifact.name.clone(),
                    method: qualified.clone(),
                    source,
                })?;
            if guarded.is_empty() {
                continue;
            }
            for rule in guarded {
                debug!(
                    class = %artifact.name,
                    method = %qualified,
                    operation = %rule.operation,
                    "guard injected"
                );
                report.guarded.push(GuardedSite {
                    method: qualified.clone(),
                    operation: rule.operation,
                });
            }
        }
        Ok(report)
    }

    fn applicable_rules(&self, artifact: &ClassArtifact) -> Vec<TransformRule> {
        match self.dispatch {
            Dispatch::AllRules => self.rules.rules().to_vec(),
            Dispatch::ReferencedOwners => {
                let owners = artifact.referenced_owners();
                self.rules
                    .rules()
                    .iter()
                    .filter(|rule| owners.contains(rule.signature.owner))
                    .copied()
                    .collect()
            }
        }
    }
}

/// Transform `bytes` with `rules` using the default codec and dispatch.
pub fn transform(bytes: &[u8], rules: &RuleSet) -> Result<Option<Vec<u8>>, TransformError> {
    Transformer::new(rules.clone()).transform(bytes)
}
