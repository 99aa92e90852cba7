//! Method-body rewriting.
//!
//! Each rule injects at most one guard per method. The per-rule "already
//! applied" state lives in a [`RewriteContext`] that the caller creates per
//! transform and resets per method, never in the rule itself, so a
//! [`RuleSet`] can be shared across threads.
//!
//! ## Placement
//!
//! A single guard has to run on every path that reaches a matched call. The
//! rewriter puts it right before the first match when that match dominates
//! all later ones in straight-line order: no label (the only place a jump or
//! handler can land) sits after the first match and at or before the last.
//! When that does not hold, or the rule asks for it, the guard goes at method
//! entry instead.

use std::borrow::Cow;

use callguard_types::well_known::guard;
use tracing::trace;

use crate::bytecode::{Instruction, MethodBody};
use crate::errors::RewriteError;
use crate::matcher::{guard_protects, match_positions};
use crate::rules::{Placement, RuleSet, TransformRule};

/// Per-transform record of which rules have fired in the current method.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    applied: Vec<bool>,
}

impl RewriteContext {
    /// A context tracking `rule_count` rules, none applied.
    pub fn new(rule_count: usize) -> Self {
        Self {
            applied: vec![false; rule_count],
        }
    }

    /// Forget every applied flag. Call before each method.
    pub fn reset(&mut self) {
        self.applied.iter_mut().for_each(|flag| *flag = false);
    }

    pub fn is_applied(&self, rule_index: usize) -> bool {
        self.applied.get(rule_index).copied().unwrap_or(false)
    }

    fn flag_mut(&mut self, rule_index: usize) -> &mut bool {
        if rule_index >= self.applied.len() {
            self.applied.resize(rule_index + 1, false);
        }
        &mut self.applied[rule_index]
    }
}

/// Output of rewriting one instruction stream with one rule.
#[derive(Debug, Clone)]
pub struct Rewritten<'a> {
    pub instructions: Cow<'a, [Instruction]>,
    pub modified: bool,
}

impl Rewritten<'_> {
    fn unchanged(stream: &[Instruction]) -> Rewritten<'_> {
        Rewritten {
            instructions: Cow::Borrowed(stream),
            modified: false,
        }
    }
}

/// Rewrite `stream` with `rule`.
///
/// `applied` is the rule's flag for this method. If it is already set, or the
/// stream already carries this rule's guard at method entry or right before
/// a dominating first match, nothing is injected. A guard pair anywhere else
/// is ordinary code and does not count. Otherwise,
/// when the stream contains a matching call, the guard is injected once and
/// the flag is set. Non-matching elements are never altered.
pub fn rewrite_stream<'a>(
    stream: &'a [Instruction],
    rule: &TransformRule,
    applied: &mut bool,
) -> Rewritten<'a> {
    if *applied {
        return Rewritten::unchanged(stream);
    }
    let positions = match_positions(stream, &rule.signature);
    let (first, last) = match (positions.first(), positions.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Rewritten::unchanged(stream),
    };

    let first_dominates = dominates(stream, first, last);
    if guard_protects(stream, rule.operation, first, first_dominates) {
        trace!(operation = %rule.operation, "guard already present");
        *applied = true;
        return Rewritten::unchanged(stream);
    }

    let at = match rule.placement {
        Placement::BeforeCall if first_dominates => first,
        _ => 0,
    };

    let mut out = Vec::with_capacity(stream.len() + 2);
    for (idx, element) in stream.iter().enumerate() {
        if idx == at {
            out.extend(Instruction::guard_sequence(rule.operation));
        }
        out.push(element.clone());
    }
    *applied = true;

    trace!(
        operation = %rule.operation,
        sites = positions.len(),
        at,
        "injected guard"
    );
    Rewritten {
        instructions: Cow::Owned(out),
        modified: true,
    }
}

/// Apply every rule in `rules` to `body`, returning the operations that were
/// newly guarded.
///
/// Resets `ctx` first. On success `max_stack` has grown by the guard's peak
/// stack use if anything was injected.
pub fn rewrite_body(
    body: &mut MethodBody,
    rules: &[TransformRule],
    ctx: &mut RewriteContext,
) -> Result<Vec<TransformRule>, RewriteError> {
    ctx.reset();
    let mut guarded = Vec::new();
    for (idx, rule) in rules.iter().enumerate() {
        let rewritten = rewrite_stream(&body.instructions, rule, ctx.flag_mut(idx));
        if rewritten.modified {
            let instructions = rewritten.instructions.into_owned();
            body.instructions = instructions;
            guarded.push(*rule);
        }
    }
    if !guarded.is_empty() {
        body.max_stack = body
            .max_stack
            .checked_add(guard::STACK_PEAK)
            .ok_or(RewriteError::StackOverflow {
                max_stack: body.max_stack,
            })?;
    }
    Ok(guarded)
}

/// Convenience wrapper over [`rewrite_body`] for a whole [`RuleSet`].
pub fn rewrite_method(
    body: &mut MethodBody,
    rules: &RuleSet,
) -> Result<Vec<TransformRule>, RewriteError> {
    let mut ctx = RewriteContext::new(rules.len());
    rewrite_body(body, rules.rules(), &mut ctx)
}

/// Whether every path reaching `last` passes through `first`.
fn dominates(stream: &[Instruction], first: usize, last: usize) -> bool {
    !stream[first + 1..=last]
        .iter()
        .any(|i| matches!(i, Instruction::Label(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Label;
    use callguard_types::Operation;

    fn exit_call() -> Instruction {
        Instruction::call(Operation::RuntimeExit.signature())
    }

    fn exit_rule() -> TransformRule {
        TransformRule::for_operation(Operation::RuntimeExit)
    }

    #[test]
    fn test_guard_inserted_before_call() {
        let stream = vec![Instruction::op(0x2a), Instruction::op(0x03), exit_call()];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert!(out.modified);
        assert!(applied);
        let [ldc, call] = Instruction::guard_sequence(Operation::RuntimeExit);
        assert_eq!(
            out.instructions.as_ref(),
            &[Instruction::op(0x2a), Instruction::op(0x03), ldc, call, exit_call()]
        );
    }

    #[test]
    fn test_applied_flag_blocks_injection() {
        let stream = vec![exit_call()];
        let mut applied = true;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert!(!out.modified);
        assert!(matches!(out.instructions, Cow::Borrowed(_)));
    }

    #[test]
    fn test_existing_guard_sets_flag() {
        let [ldc, call] = Instruction::guard_sequence(Operation::RuntimeExit);
        let stream = vec![ldc, call, exit_call()];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert!(!out.modified);
        assert!(applied);
    }

    #[test]
    fn test_straight_line_repeats_share_one_guard() {
        let stream = vec![exit_call(), Instruction::op(0x57), exit_call()];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert_eq!(out.instructions.len(), 5);
        assert!(out.instructions[1].as_invocation().unwrap().is_guard_entry());
        assert_eq!(out.instructions[2], exit_call());
    }

    #[test]
    fn test_label_between_sites_moves_guard_to_entry() {
        // if (c) exit(1); else exit(2);
        let stream = vec![
            Instruction::op(0x1b),
            Instruction::Branch {
                opcode: 0x99,
                target: Label(1),
            },
            exit_call(),
            Instruction::Branch {
                opcode: 0xa7,
                target: Label(2),
            },
            Instruction::Label(Label(1)),
            exit_call(),
            Instruction::Label(Label(2)),
            Instruction::op(0xb1),
        ];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert!(out.modified);
        assert_eq!(out.instructions[0], Instruction::ldc_str("Runtime.exit"));
        assert!(out.instructions[1].as_invocation().unwrap().is_guard_entry());
        assert_eq!(&out.instructions[2..], stream.as_slice());
    }

    #[test]
    fn test_label_before_first_site_keeps_guard_at_call() {
        let stream = vec![
            Instruction::Label(Label(0)),
            Instruction::op(0x04),
            exit_call(),
        ];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert_eq!(out.instructions[0], Instruction::Label(Label(0)));
        assert_eq!(out.instructions[2], Instruction::ldc_str("Runtime.exit"));
    }

    #[test]
    fn test_method_entry_placement() {
        let stream = vec![Instruction::op(0x04), exit_call()];
        let rule = exit_rule().with_placement(Placement::MethodEntry);
        let mut applied = false;
        let out = rewrite_stream(&stream, &rule, &mut applied);
        assert_eq!(out.instructions[0], Instruction::ldc_str("Runtime.exit"));
        assert_eq!(out.instructions[3], exit_call());
    }

    #[test]
    fn test_rewrite_body_grows_max_stack_once() {
        let mut body = MethodBody::new(
            3,
            1,
            vec![
                exit_call(),
                Instruction::call(Operation::SocketConnect.signature()),
            ],
        );
        let guarded = rewrite_method(&mut body, &RuleSet::standard()).unwrap();
        let ops: Vec<Operation> = guarded.iter().map(|r| r.operation).collect();
        assert_eq!(ops, vec![Operation::RuntimeExit, Operation::SocketConnect]);
        assert_eq!(body.max_stack, 4);
        assert_eq!(body.instructions.len(), 6);
    }

    #[test]
    fn test_rewrite_body_stack_overflow() {
        let mut body = MethodBody::new(u16::MAX, 1, vec![exit_call()]);
        assert_eq!(
            rewrite_method(&mut body, &RuleSet::standard()),
            Err(RewriteError::StackOverflow {
                max_stack: u16::MAX
            })
        );
    }

    #[test]
    fn test_context_reset() {
        let mut ctx = RewriteContext::new(2);
        *ctx.flag_mut(1) = true;
        assert!(ctx.is_applied(1));
        ctx.reset();
        assert!(!ctx.is_applied(1));
        assert!(!ctx.is_applied(5));
    }

    #[test]
    fn test_guard_after_call_does_not_count() {
        let [ldc, call] = Instruction::guard_sequence(Operation::RuntimeExit);
        let stream = vec![
            Instruction::op(0x04),
            exit_call(),
            ldc.clone(),
            call.clone(),
            Instruction::op(0xb1),
        ];
        let mut applied = false;
        let out = rewrite_stream(&stream, &exit_rule(), &mut applied);
        assert!(out.modified);
        assert_eq!(
            out.instructions.as_ref(),
            &[
                Instruction::op(0x04),
                ldc.clone(),
                call.clone(),
                exit_call(),
                ldc,
                call,
                Instruction::op(0xb1)
            ]
        );
    }
}
