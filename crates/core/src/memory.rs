//! Global variable memory of one loaded script.
//!
//! Four pools hold integers, reals, strings and the unit-factor slot of
//! every numeric variable or array element. All pool sizes are computed at
//! parse time; the pools are allocated once at load and never grow.
//!
//! Slots use `Cell`/`RefCell` so the executor can write through a shared
//! `&` handle; the owning script object is consequently not `Sync` and is
//! driven from one thread at a time.

use crate::units::NO_FACTOR;
use crate::{vmfloat, vmint};
use std::cell::{Cell, RefCell};

/// The global pools of one loaded script. Shared by all voices (exec
/// contexts) of that script.
#[derive(Debug)]
pub struct GlobalMemory {
    ints: Box<[Cell<vmint>]>,
    reals: Box<[Cell<vmfloat>]>,
    factors: Box<[Cell<vmfloat>]>,
    strings: Box<[RefCell<String>]>,
}

impl GlobalMemory {
    /// Allocate zero-initialized pools; unit factors default to 1.0.
    pub fn new(int_count: usize, real_count: usize, factor_count: usize, str_count: usize) -> Self {
        GlobalMemory {
            ints: (0..int_count).map(|_| Cell::new(0)).collect(),
            reals: (0..real_count).map(|_| Cell::new(0.0)).collect(),
            factors: (0..factor_count).map(|_| Cell::new(NO_FACTOR)).collect(),
            strings: (0..str_count).map(|_| RefCell::new(String::new())).collect(),
        }
    }

    pub fn int_count(&self) -> usize {
        self.ints.len()
    }

    pub fn real_count(&self) -> usize {
        self.reals.len()
    }

    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }

    pub fn str_count(&self) -> usize {
        self.strings.len()
    }

    pub fn int(&self, slot: usize) -> vmint {
        self.ints[slot].get()
    }

    pub fn set_int(&self, slot: usize, value: vmint) {
        self.ints[slot].set(value);
    }

    pub fn real(&self, slot: usize) -> vmfloat {
        self.reals[slot].get()
    }

    pub fn set_real(&self, slot: usize, value: vmfloat) {
        self.reals[slot].set(value);
    }

    pub fn factor(&self, slot: usize) -> vmfloat {
        self.factors[slot].get()
    }

    pub fn set_factor(&self, slot: usize, value: vmfloat) {
        self.factors[slot].set(value);
    }

    pub fn string(&self, slot: usize) -> String {
        self.strings[slot].borrow().clone()
    }

    pub fn set_string(&self, slot: usize, value: String) {
        *self.strings[slot].borrow_mut() = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_initialized() {
        let mem = GlobalMemory::new(2, 2, 4, 1);
        assert_eq!(mem.int(0), 0);
        assert_eq!(mem.real(1), 0.0);
        assert_eq!(mem.factor(3), NO_FACTOR);
        assert_eq!(mem.string(0), "");
    }

    #[test]
    fn test_writes_through_shared_handle() {
        let mem = GlobalMemory::new(1, 1, 2, 1);
        let shared: &GlobalMemory = &mem;
        shared.set_int(0, 42);
        shared.set_factor(0, 1e-3);
        shared.set_string(0, "x".to_string());
        assert_eq!(mem.int(0), 42);
        assert_eq!(mem.factor(0), 1e-3);
        assert_eq!(mem.string(0), "x");
    }
}
