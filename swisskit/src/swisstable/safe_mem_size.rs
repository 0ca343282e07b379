/*
 * Created on Wed Jun 02 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! A byte-size quantity that remembers whether it is still meaningful.
//!
//! Capacity and layout arithmetic (`buckets * load_factor`, `size_of::<T>() *
//! buckets`, ...) is one multiply away from silently wrapping on a 32-bit
//! target or on an adversarial `hcreate(nel)` argument. `SafeMemSize` carries
//! a poison bit instead of trusting every call site to check `checked_mul`
//! itself.

use std::{
    cmp::Ordering,
    ops::{Add, Mul},
};

/// A `usize` that is either a valid byte size or poisoned by a prior overflow.
///
/// Once poisoned, every subsequent `+`/`*` stays poisoned: the invalid state
/// propagates rather than being silently overwritten by whatever arithmetic
/// ran next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeMemSize {
    value: usize,
    valid: bool,
}

impl SafeMemSize {
    pub const fn new(value: usize) -> Self {
        Self { value, valid: true }
    }
    pub const fn invalid() -> Self {
        Self {
            value: 0,
            valid: false,
        }
    }
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
    /// Returns the size if valid, panicking otherwise. Callers that reach
    /// here are expected to have already checked `is_valid`.
    pub const fn get(&self) -> usize {
        debug_assert!(self.valid);
        self.value
    }
    pub const fn checked(&self) -> Option<usize> {
        if self.valid {
            Some(self.value)
        } else {
            None
        }
    }
}

impl From<usize> for SafeMemSize {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl Add for SafeMemSize {
    type Output = Self;
    /// Propagates invalidity instead of falling through to a plain add:
    /// if either operand already overflowed, or this add itself would
    /// overflow, the result stays poisoned.
    fn add(self, rhs: Self) -> Self::Output {
        if !self.valid || !rhs.valid {
            return Self::invalid();
        }
        match self.value.checked_add(rhs.value) {
            Some(value) => Self { value, valid: true },
            None => Self::invalid(),
        }
    }
}

impl Mul for SafeMemSize {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        if !self.valid || !rhs.valid {
            return Self::invalid();
        }
        match self.value.checked_mul(rhs.value) {
            Some(value) => Self { value, valid: true },
            None => Self::invalid(),
        }
    }
}

impl PartialOrd for SafeMemSize {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.valid && other.valid {
            self.value.partial_cmp(&other.value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SafeMemSize;

    #[test]
    fn valid_add_and_mul() {
        let a = SafeMemSize::new(4);
        let b = SafeMemSize::new(8);
        assert_eq!((a + b).checked(), Some(12));
        assert_eq!((a * b).checked(), Some(32));
    }

    #[test]
    fn overflow_poisons_add() {
        let a = SafeMemSize::new(usize::MAX);
        let b = SafeMemSize::new(1);
        let sum = a + b;
        assert!(!sum.is_valid());
        assert_eq!(sum.checked(), None);
    }

    #[test]
    fn overflow_poisons_mul() {
        let a = SafeMemSize::new(usize::MAX);
        let b = SafeMemSize::new(2);
        assert_eq!((a * b).checked(), None);
    }

    #[test]
    fn invalid_propagates_through_add_not_overwritten() {
        // the upstream bug this guards against: computing `result = -1` to
        // mark invalid and then unconditionally overwriting it with
        // `value + other.value` right after. here the poisoned operand must
        // win regardless of what the "new" sum would have been.
        let poisoned = SafeMemSize::invalid();
        let fine = SafeMemSize::new(1);
        assert_eq!((poisoned + fine).checked(), None);
        assert_eq!((fine + poisoned).checked(), None);
    }
}
