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

use std::fmt;

pub type SkResult<T> = Result<T, Error>;

/// Every failure mode that can surface out of the swistable/sync cores.
///
/// None of these are panics: every fallible operation in this crate returns
/// one of these through a `Result` rather than aborting the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The global allocator refused a request
    AllocFailure,
    /// A fixed-capacity table is full and neither rehash-in-place nor resize
    /// is permitted for it
    CapacityExceeded,
    /// A lookup found no matching entry
    Miss,
    /// An arithmetic computation (size, capacity, reader count, ...) would
    /// have wrapped
    Overflow,
    /// The calling thread already owns the lock it is attempting to acquire
    /// in a mode that would deadlock
    DeadLock,
    /// A timed wait expired before the lock could be acquired
    Timeout,
    /// An argument failed validation (for example a `timespec` with
    /// `tv_nsec` outside `[0, 1_000_000_000)`)
    Invalid,
    /// A timepoint-kind `Timeout` named an instant before the Unix epoch
    BeforeEpoch,
}

impl Error {
    /// The `errno` value a POSIX shim should set when surfacing this error,
    /// mirroring glibc/llvm-libc conventions for the corresponding calls.
    pub const fn as_errno(&self) -> libc::c_int {
        match self {
            Self::AllocFailure => libc::ENOMEM,
            Self::CapacityExceeded => libc::ENOMEM,
            Self::Miss => libc::ESRCH,
            Self::Overflow => libc::EAGAIN,
            Self::DeadLock => libc::EDEADLK,
            Self::Timeout => libc::ETIMEDOUT,
            Self::Invalid => libc::EINVAL,
            Self::BeforeEpoch => libc::EINVAL,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocFailure => write!(f, "memory allocation failed"),
            Self::CapacityExceeded => write!(f, "table is at fixed capacity"),
            Self::Miss => write!(f, "no matching entry"),
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::DeadLock => write!(f, "operation would deadlock"),
            Self::Timeout => write!(f, "timed wait expired"),
            Self::Invalid => write!(f, "invalid argument"),
            Self::BeforeEpoch => write!(f, "timepoint precedes the Unix epoch"),
        }
    }
}

impl std::error::Error for Error {}
