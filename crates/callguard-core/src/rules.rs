//! Transform rules: which call sites to guard and where the guard goes.

use callguard_types::{Operation, OperationSignature};
use serde::{Deserialize, Serialize};

/// Where a rule places its single guard within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Immediately before the first matching call site, provided that site
    /// lies on every path to the later ones; otherwise at method entry.
    ///
    /// With the entry fallback the check runs on every invocation of the
    /// method, so a denied caller fails even on paths that never reach the
    /// guarded call.
    #[default]
    BeforeCall,
    /// Always at method entry.
    MethodEntry,
}

/// Pairs a call-site signature with the guard to inject for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformRule {
    pub operation: Operation,
    pub signature: OperationSignature,
    pub placement: Placement,
}

impl TransformRule {
    pub fn for_operation(operation: Operation) -> Self {
        Self {
            operation,
            signature: operation.signature(),
            placement: Placement::default(),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Ordered, read-only set of rules shared by all transforms.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    rules: Vec<TransformRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// One rule per guarded operation, in catalog order.
    pub fn standard() -> Self {
        Self::new(
            Operation::ALL
                .into_iter()
                .map(TransformRule::for_operation)
                .collect(),
        )
    }

    /// The standard rules, all using `placement`.
    pub fn with_placement(placement: Placement) -> Self {
        Self::new(
            Operation::ALL
                .into_iter()
                .map(|op| TransformRule::for_operation(op).with_placement(placement))
                .collect(),
        )
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Already loaded runtime types holding a call site of some rule.
    pub fn runtime_callers(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self
            .rules
            .iter()
            .flat_map(|r| r.operation.runtime_callers().iter().copied())
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}
