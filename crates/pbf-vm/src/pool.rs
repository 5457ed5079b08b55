//! Repeated-index map pool.
//!
//! Decoding a nested message rents a small `field_number -> next
//! occurrence index` map for the duration of that one frame and returns
//! it when done. Reusing maps across filter calls (and across sibling
//! frames within one call) keeps steady-state decoding allocation-free
//! once a message's nesting shape has been seen once — the same
//! amortised-arena idea as an append-only frame stack, just applied to a
//! free list instead of a single growing buffer.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct IndexMapPool {
    free: Vec<HashMap<i32, i32>>,
}

impl IndexMapPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rent(&mut self) -> HashMap<i32, i32> {
        self.free.pop().unwrap_or_default()
    }

    pub fn give_back(&mut self, mut map: HashMap<i32, i32>) {
        map.clear();
        self.free.push(map);
    }
}
