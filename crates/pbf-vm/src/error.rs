//! Runtime (decode-time) error taxonomy.
//!
//! These surface out of [`crate::machine::Machine::filter`]. Decoding
//! stops at the first error, but whatever fields were already captured
//! remain valid and the interpreter still runs to a verdict — the error
//! is advisory, not fatal to the call.

/// A failure encountered while decoding a protobuf message against a
/// program's field-spec tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("protobuf message uses deprecated group wire types")]
    DeprecatedEncoding,

    #[error("protobuf field type does not match the program's field spec")]
    FieldTypeMismatch,

    #[error("protobuf encoding is invalid: {0}")]
    EncodingInvalid(#[from] pbf_bytecode::WireError),

    #[error("protobuf message exceeds the maximum supported length")]
    TooLong,
}
