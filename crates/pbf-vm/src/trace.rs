//! Optional execution tracing, gated behind the `trace` feature.
//!
//! A `Tracer` is called at a handful of points in [`crate::interpret`]
//! and [`crate::machine`]. `NoopTracer` compiles away entirely since its
//! method body is empty; reach for `PrintTracer` (or your own impl)
//! only when you're actually debugging a program.

pub trait Tracer {
    fn trace(&self, message: &str);
}

pub struct NoopTracer;

impl Tracer for NoopTracer {
    #[inline]
    fn trace(&self, _message: &str) {}
}

pub struct PrintTracer;

impl Tracer for PrintTracer {
    fn trace(&self, message: &str) {
        eprintln!("[pbf-vm] {message}");
    }
}
