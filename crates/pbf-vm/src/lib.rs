//! Runtime virtual machine for the Protocol Buffers Filter.
//!
//! Depends on `pbf-bytecode` for the validated [`pbf_bytecode::Program`];
//! this crate adds everything that needs an actual protobuf message: the
//! selective decoder, the repeated-index pool, the interpreter, and the
//! per-caller [`Machine`] that ties them together.

pub mod decode;
pub mod error;
pub mod interpret;
pub mod machine;
pub mod pool;
pub mod trace;

pub use error::RuntimeError;
pub use machine::{FilterResult, Machine, NewMachine};
pub use trace::{NoopTracer, PrintTracer, Tracer};
