//! Structured class model handed over by the host platform.
//!
//! The rewriter only understands call instructions and string literals. Every
//! other instruction is carried as an opaque [`Instruction::Op`] and copied
//! through untouched. Control flow uses symbolic [`Label`]s instead of byte
//! offsets, so inserting instructions never invalidates a jump.

use callguard_types::{well_known::guard, InvokeKind, Operation, OperationSignature};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::errors::VerifyError;

/// Symbolic position inside a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Inline literal pushed by [`Instruction::LoadConst`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A type reference, by internal name.
    Class(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}F", v),
            Constant::Double(v) => write!(f, "{}D", v),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Class(name) => write!(f, "class {}", name),
        }
    }
}

/// A call instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    pub kind: InvokeKind,
    /// Internal name of the declaring type.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl Invocation {
    pub fn new(
        kind: InvokeKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// The guard entry call the rewriter injects.
    pub fn guard_entry() -> Self {
        Self::new(
            InvokeKind::Static,
            guard::OWNER,
            guard::METHOD,
            guard::DESCRIPTOR,
        )
    }

    /// Whether this is a call to the guard entry.
    pub fn is_guard_entry(&self) -> bool {
        self.kind == InvokeKind::Static
            && self.owner == guard::OWNER
            && self.name == guard::METHOD
            && self.descriptor == guard::DESCRIPTOR
    }
}

impl From<OperationSignature> for Invocation {
    fn from(sig: OperationSignature) -> Self {
        Self::new(sig.kind, sig.owner, sig.name, sig.descriptor)
    }
}

/// One element of a method's instruction stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    /// Method call.
    Invoke(Invocation),
    /// Push an inline literal.
    LoadConst(Constant),
    /// Pseudo-instruction marking a jump target.
    Label(Label),
    /// Conditional or unconditional jump.
    Branch { opcode: u8, target: Label },
    /// Table or lookup switch.
    Switch {
        opcode: u8,
        default: Label,
        targets: Vec<Label>,
    },
    /// Any other instruction, kept verbatim.
    Op { opcode: u8, operands: Vec<u8> },
}

impl Instruction {
    /// A call instruction that matches `sig` exactly.
    pub fn call(sig: OperationSignature) -> Self {
        Instruction::Invoke(sig.into())
    }

    pub fn invoke(
        kind: InvokeKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Instruction::Invoke(Invocation::new(kind, owner, name, descriptor))
    }

    pub fn ldc_str(value: impl Into<String>) -> Self {
        Instruction::LoadConst(Constant::String(value.into()))
    }

    /// An operand-less opaque instruction.
    pub fn op(opcode: u8) -> Self {
        Instruction::Op {
            opcode,
            operands: Vec::new(),
        }
    }

    /// The two-element sequence that guards `operation`.
    ///
    /// The key travels as an inline literal so the rewritten class never
    /// references a constant it may be unable to resolve at verification.
    pub fn guard_sequence(operation: Operation) -> [Instruction; 2] {
        [
            Instruction::ldc_str(operation.key()),
            Instruction::Invoke(Invocation::guard_entry()),
        ]
    }

    pub fn as_invocation(&self) -> Option<&Invocation> {
        match self {
            Instruction::Invoke(inv) => Some(inv),
            _ => None,
        }
    }

    /// Labels this instruction may transfer control to.
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::Switch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Invoke(inv) => write!(
                f,
                "{} {}.{}{}",
                inv.kind, inv.owner, inv.name, inv.descriptor
            ),
            Instruction::LoadConst(c) => write!(f, "ldc {}", c),
            Instruction::Label(label) => write!(f, "{}:", label),
            Instruction::Branch { opcode, target } => {
                write!(f, "branch 0x{:02x} -> {}", opcode, target)
            }
            Instruction::Switch {
                opcode,
                default,
                targets,
            } => {
                let targets: Vec<String> = targets.iter().map(|l| l.to_string()).collect();
                write!(
                    f,
                    "switch 0x{:02x} [{}] default {}",
                    opcode,
                    targets.join(", "),
                    default
                )
            }
            Instruction::Op { opcode, operands } => {
                write!(f, "op 0x{:02x}", opcode)?;
                for b in operands {
                    write!(f, " {:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Exception table entry. The protected range is `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// `None` catches everything.
    pub catch_type: Option<String>,
}

/// Stack map frame recorded at a label. Verification types are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMapFrame {
    pub label: Label,
    pub locals: Vec<String>,
    pub stack: Vec<String>,
}

/// The code of one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub handlers: Vec<ExceptionHandler>,
    pub frames: Vec<StackMapFrame>,
}

impl MethodBody {
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            max_stack,
            max_locals,
            instructions,
            handlers: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Check that the body is structurally well formed.
    ///
    /// Every label is defined once, every branch, handler and frame points at
    /// a defined label, handler ranges are not inverted, and no frame records
    /// more operand-stack entries than `max_stack`.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let mut positions: HashMap<Label, usize> = HashMap::new();
        for (idx, instruction) in self.instructions.iter().enumerate() {
            if let Instruction::Label(label) = instruction {
                if positions.insert(*label, idx).is_some() {
                    return Err(VerifyError::DuplicateLabel { label: *label });
                }
            }
        }

        let lookup = |label: Label, site: String| {
            positions
                .get(&label)
                .copied()
                .ok_or(VerifyError::UndefinedLabel { label, site })
        };

        for (idx, instruction) in self.instructions.iter().enumerate() {
            for target in instruction.branch_targets() {
                lookup(target, format!("instruction {}", idx))?;
            }
        }

        for (idx, handler) in self.handlers.iter().enumerate() {
            let site = || format!("exception handler {}", idx);
            let start = lookup(handler.start, site())?;
            let end = lookup(handler.end, site())?;
            lookup(handler.handler, site())?;
            if start >= end {
                return Err(VerifyError::InvertedHandlerRange {
                    start: handler.start,
                    end: handler.end,
                });
            }
        }

        for frame in &self.frames {
            lookup(frame.label, "stack map frame".to_string())?;
            if frame.stack.len() > self.max_stack as usize {
                return Err(VerifyError::FrameExceedsMaxStack {
                    label: frame.label,
                    depth: frame.stack.len(),
                    max_stack: self.max_stack,
                });
            }
        }

        Ok(())
    }
}

/// A method declaration. Abstract and native methods carry no body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub body: Option<MethodBody>,
}

impl Method {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, body: MethodBody) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access_flags: 0,
            body: Some(body),
        }
    }

    /// `name` followed by the descriptor, e.g. `main([Ljava/lang/String;)V`.
    pub fn qualified_name(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// Class-level attribute carried through the transform without inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub data: Vec<u8>,
}

/// One class, decoded for the duration of a single transform request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassArtifact {
    /// Internal name, e.g. `org/example/Main`.
    pub name: String,
    pub super_name: Option<String>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassArtifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: Some("java/lang/Object".to_string()),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Owner types of every call instruction in the class.
    pub fn referenced_owners(&self) -> BTreeSet<&str> {
        self.methods
            .iter()
            .filter_map(|m| m.body.as_ref())
            .flat_map(|body| body.instructions.iter())
            .filter_map(Instruction::as_invocation)
            .map(|inv| inv.owner.as_str())
            .collect()
    }

    /// Verify every method body.
    pub fn verify(&self) -> Result<(), (String, VerifyError)> {
        for method in &self.methods {
            if let Some(body) = &method.body {
                body.verify().map_err(|e| (method.qualified_name(), e))?;
            }
        }
        Ok(())
    }
}
