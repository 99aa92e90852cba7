//! Call-site pattern matching.
//!
//! Pure functions over borrowed instructions; safe to call from any number of
//! concurrent transforms.

use callguard_types::{Operation, OperationSignature};

use crate::bytecode::{Constant, Instruction};

/// Whether `instruction` is a call to exactly `signature`.
///
/// Owner, member name, descriptor and dispatch kind must all be equal.
pub fn matches(instruction: &Instruction, signature: &OperationSignature) -> bool {
    match instruction {
        Instruction::Invoke(inv) => {
            inv.kind == signature.kind
                && inv.owner == signature.owner
                && inv.name == signature.name
                && inv.descriptor == signature.descriptor
        }
        _ => false,
    }
}

/// Indices of every instruction matching `signature`.
pub fn match_positions(stream: &[Instruction], signature: &OperationSignature) -> Vec<usize> {
    stream
        .iter()
        .enumerate()
        .filter(|(_, instruction)| matches(instruction, signature))
        .map(|(idx, _)| idx)
        .collect()
}

/// Index of the first guard pair for `operation` anywhere in `stream`.
///
/// A guard is the operation key pushed as a string literal immediately
/// followed by the static call to the guard entry. Presence alone says
/// nothing about whether the guard runs before a call site; use
/// [`guard_protects`] for that.
pub fn find_guard(stream: &[Instruction], operation: Operation) -> Option<usize> {
    stream
        .windows(2)
        .position(|pair| guard_pair_operation(pair) == Some(operation.key()))
}

/// The operation key of a guard pair, if `pair` is one.
fn guard_pair_operation(pair: &[Instruction]) -> Option<&str> {
    match pair {
        [Instruction::LoadConst(Constant::String(key)), Instruction::Invoke(inv)]
            if inv.is_guard_entry() =>
        {
            Some(key.as_str())
        }
        _ => None,
    }
}

/// Whether a guard for `operation` sits in the run of guard pairs that
/// starts at `start` and extends forward.
fn in_run_after(stream: &[Instruction], start: usize, operation: Operation) -> bool {
    stream
        .get(start..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map_while(guard_pair_operation)
        .any(|key| key == operation.key())
}

/// Whether a guard for `operation` sits in the run of guard pairs that ends
/// immediately before `end`.
fn in_run_before(stream: &[Instruction], end: usize, operation: Operation) -> bool {
    let mut at = end.min(stream.len());
    while at >= 2 {
        match guard_pair_operation(&stream[at - 2..at]) {
            Some(key) if key == operation.key() => return true,
            Some(_) => at -= 2,
            None => return false,
        }
    }
    false
}

/// Whether an existing guard for `operation` runs before the call at
/// `first` on every path.
///
/// Only the two spots the rewriter itself uses count: the run of guards at
/// method entry, and the run of guards immediately before `first` when
/// `first_dominates` holds. A guard pair anywhere else, after the call or in
/// code the call can be reached around, protects nothing.
pub fn guard_protects(
    stream: &[Instruction],
    operation: Operation,
    first: usize,
    first_dominates: bool,
) -> bool {
    in_run_after(stream, 0, operation)
        || (first_dominates && in_run_before(stream, first, operation))
}
