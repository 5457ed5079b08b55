//! Load-time error taxonomy.
//!
//! Everything that can stop a program from being built — header/magic
//! checks, field-section parsing, and the verifier — surfaces as a
//! [`LoadError`]. Runtime (decode-time) errors live in `pbf-vm`, which
//! depends on this crate but not vice versa.

/// Failure to turn a byte slice into a usable [`crate::program::Program`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("unexpected end of bytecode")]
    UnexpectedEof,

    #[error("unknown bytecode format")]
    UnknownFormat,

    #[error("bytecode too long")]
    TooLong,

    #[error("bytecode invalid: {0}")]
    Invalid(#[from] InvalidBytecode),
}

/// The structural and verifier-level ways a bytecode buffer can be
/// rejected, once its header and length have already checked out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBytecode {
    #[error("field section is truncated")]
    TruncatedFieldSection,

    #[error("unknown field modifier byte {0}")]
    UnknownFieldMod(u8),

    #[error("invalid packed element subtype byte {0}")]
    InvalidPackedSubtype(u8),

    #[error("field {0} redefined with an incompatible modifier")]
    ConflictingFieldDefinition(i32),

    #[error("field section declares more than 256 indexed fields")]
    TooManyFields,

    #[error("unknown opcode {0:#04x} at instruction offset {1}")]
    UnknownOpcode(u8, usize),

    #[error("instruction section is truncated at offset {0}")]
    TruncatedInstruction(usize),

    #[error("field index {0} out of bounds (fieldcount = {1})")]
    FieldIndexOutOfBounds(u8, u16),

    #[error("bytes reference (offset {0}, length {1}) exceeds bytecode length {2}")]
    InvalidBytesReference(u32, u32, usize),

    #[error("field {0} accessed through inconsistent modes")]
    InconsistentFieldAccess(u8),

    #[error("register operand type mismatch at instruction offset {0}")]
    RegisterTypeMismatch(usize),
}
