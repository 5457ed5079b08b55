//! Per-caller machine state bound to a shared, immutable [`Program`].
//!
//! A `Program` is built once and may be shared across threads; each
//! concurrent caller owns its own `Machine`, built cheaply from the
//! same program, and calls `filter` once per message. Resetting a
//! machine zeros its registers and field tables but keeps the
//! repeated-index pool, so steady-state filtering allocates nothing
//! once the pool has grown to cover the shapes of messages seen so far.

use std::sync::Arc;

use pbf_bytecode::Program;

use crate::decode::decode;
use crate::error::RuntimeError;
use crate::interpret::evaluate;
use crate::pool::IndexMapPool;

#[cfg(feature = "trace")]
use crate::trace::Tracer;

/// Outcome of a single [`Machine::filter`] call. The verdict is always
/// meaningful, even when `error` is `Some` — decoding stopped at the
/// first error, but evaluation still ran on whatever was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub verdict: bool,
    pub error: Option<RuntimeError>,
}

pub struct Machine {
    program: Arc<Program>,
    status: bool,
    reg: [u64; 2],
    fielddata: Vec<u64>,
    fieldmask: [u64; 4],
    pool: IndexMapPool,
    #[cfg(feature = "trace")]
    tracer: Box<dyn Tracer>,
}

/// Extends [`pbf_bytecode::Program`] with the `new_machine` constructor
/// named in its public surface. Defined here, not on `Program` itself:
/// `Program` lives in `pbf-bytecode`, which `Machine` (this crate) depends
/// on, so an inherent `Program::new_machine() -> Machine` would need the
/// dependency to run the other way. An extension trait gets the same
/// call-site ergonomics (`program.new_machine()`, after importing the
/// trait) without inverting the crate graph.
pub trait NewMachine {
    /// Build a lightweight [`Machine`] bound to this program. May be
    /// called many times; each call produces an independent machine
    /// sharing the same underlying program.
    fn new_machine(self: &Arc<Self>) -> Machine;
}

impl NewMachine for Program {
    fn new_machine(self: &Arc<Self>) -> Machine {
        Machine::new(Arc::clone(self))
    }
}

impl Machine {
    pub fn new(program: Arc<Program>) -> Self {
        let fieldcount = program.fieldcount() as usize;
        Machine {
            program,
            status: false,
            reg: [0, 0],
            fielddata: vec![0u64; fieldcount],
            fieldmask: [0u64; 4],
            pool: IndexMapPool::new(),
            #[cfg(feature = "trace")]
            tracer: Box::new(crate::trace::NoopTracer),
        }
    }

    #[cfg(feature = "trace")]
    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    fn reset(&mut self) {
        self.status = false;
        self.reg = [0, 0];
        self.fielddata.iter_mut().for_each(|v| *v = 0);
        self.fieldmask = [0u64; 4];
    }

    /// Decode `message` against this machine's program, then evaluate
    /// the program's instructions to a verdict. The verdict is produced
    /// even if decoding fails partway through.
    pub fn filter(&mut self, message: &[u8]) -> FilterResult {
        self.reset();
        let decode_error = decode(
            self.program.root(),
            message,
            &mut self.fielddata,
            &mut self.fieldmask,
            &mut self.pool,
        )
        .err();

        #[cfg(feature = "trace")]
        if let Some(err) = &decode_error {
            self.tracer.trace(&format!("decode error: {err}"));
        }

        let verdict = evaluate(
            self.program.bytecode(),
            self.program.instructions(),
            message,
            &mut self.status,
            &mut self.reg,
            &self.fielddata,
            &self.fieldmask,
            #[cfg(feature = "trace")]
            self.tracer.as_ref(),
        );

        FilterResult { verdict, error: decode_error }
    }

    /// The raw value captured at `idx`, or `None` if that slot wasn't
    /// populated by the most recent `filter` call (or `idx` is out of
    /// range). Never panics on an out-of-range index.
    pub fn get_raw_value(&self, idx: u8) -> Option<u64> {
        if (idx as usize) >= self.fielddata.len() {
            return None;
        }
        let present = self.fieldmask[(idx >> 6) as usize] & (1u64 << (idx & 63)) != 0;
        present.then(|| self.fielddata[idx as usize])
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_bytecode::Opcode;

    fn trivial_program() -> Arc<Program> {
        let mut buf = pbf_bytecode::header::MAGIC.to_vec();
        buf.push(0);
        buf.push(Opcode::ReturnTrue.0);
        Arc::new(Program::load(&buf).unwrap())
    }

    #[test]
    fn filters_with_no_fields() {
        let mut machine = Machine::new(trivial_program());
        let result = machine.filter(b"");
        assert_eq!(result, FilterResult { verdict: true, error: None });
    }

    #[test]
    fn new_machine_extension_builds_a_working_machine() {
        let mut machine = trivial_program().new_machine();
        let result = machine.filter(b"");
        assert_eq!(result, FilterResult { verdict: true, error: None });
    }

    #[test]
    fn get_raw_value_out_of_range_is_none_not_panic() {
        let machine = Machine::new(trivial_program());
        assert_eq!(machine.get_raw_value(255), None);
    }

    #[test]
    fn reset_clears_state_between_calls() {
        let mut buf = pbf_bytecode::header::MAGIC.to_vec();
        buf.push(1);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.push(0); // field 1, untyped leaf -> index 0
        buf.push(Opcode::ReturnTrue.0);
        let program = Arc::new(Program::load(&buf).unwrap());
        let mut machine = Machine::new(program);

        machine.filter(&[0x08, 9]); // field 1 present, value 9
        assert_eq!(machine.get_raw_value(0), Some(9));

        machine.filter(b""); // no fields this time
        assert_eq!(machine.get_raw_value(0), None);
    }
}
