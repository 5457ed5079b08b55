//! Bytecode format, loader, and verifier for the Protocol Buffers
//! Filter virtual machine.
//!
//! This crate owns everything about a PBF program that doesn't depend
//! on an actual protobuf message: the wire-format primitives shared by
//! loader and decoder, the opcode taxonomy, the field-spec tree and its
//! parser, the header check, the load-time verifier, and the resulting
//! [`Program`]. `pbf-vm` depends on this crate to build a `Machine` and
//! run it against messages.

pub mod bytes_ref;
pub mod dump;
pub mod error;
pub mod field_mod;
pub mod field_spec;
pub mod header;
pub mod op;
pub mod program;
pub mod verify;
pub mod wire;

pub use error::{InvalidBytecode, LoadError};
pub use field_mod::FieldMod;
pub use field_spec::{FieldSection, FieldSpecNode, Structural};
pub use op::{ArgClass, Cmp, Opcode, Reg};
pub use program::Program;
pub use wire::{WireError, WireType};
