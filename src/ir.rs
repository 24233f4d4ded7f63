#![allow(dead_code)]

/// Identity of a JVM method: owning class, name, descriptor, and dispatch kind.
///
/// This is the unit stored in the resolver's result set. Equality, hashing
/// and ordering cover all four fields.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct MethodRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) is_static: bool,
}

/// Structural facts about one decoded class, as served by a metadata source.
#[derive(Clone, Debug)]
pub(crate) struct ClassMetadata {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) is_interface: bool,
    pub(crate) fields: Vec<FieldMetadata>,
    pub(crate) methods: Vec<MethodMetadata>,
}

/// Declared field of a class. The generic signature is absent for
/// non-generic field types, which is the common case.
#[derive(Clone, Debug)]
pub(crate) struct FieldMetadata {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) signature: Option<String>,
}

/// Declared method of a class, signature handling as for fields.
#[derive(Clone, Debug)]
pub(crate) struct MethodMetadata {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) signature: Option<String>,
}

/// Bytecode instruction captured for call-surface analysis.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) offset: u32,
    pub(crate) kind: InstructionKind,
}

/// Instruction kinds the resolver distinguishes. Field reads and method
/// invocations drive the analysis; everything else is consumed but ignored.
#[derive(Clone, Debug)]
pub(crate) enum InstructionKind {
    FieldRead(FieldRef),
    FieldWrite(FieldRef),
    Invoke(CallSite),
    Other(u8),
}

/// Field access operand resolved from the constant pool.
#[derive(Clone, Debug)]
pub(crate) struct FieldRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

/// Call site extracted from bytecode.
#[derive(Clone, Debug)]
pub(crate) struct CallSite {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: CallKind,
}

/// Call opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}
