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

//! `pthread_rwlock_timedrdlock`/`timedwrlock`/`clockrdlock`/`clockwrlock`,
//! reinterpreting the caller's `pthread_rwlock_t` storage directly as a
//! [`RwLock`].
//!
//! A zero-initialized `pthread_rwlock_t` (what `PTHREAD_RWLOCK_INITIALIZER`
//! and BSS/static storage both give you) is bit-for-bit a fresh
//! `RwLock::new(false, false)`, since every field of `RwLock` is zero in its
//! default state. We rely on that rather than requiring a separate init
//! entry point.

use crate::error::Error;
use crate::sync::{RwLock, Timeout};
use libc::{c_int, clockid_t, pthread_rwlock_t, timespec};

// `pthread_rwlock_t` reserves enough storage for the platform's native
// rwlock; our own `RwLock` must fit inside whatever that reservation is, on
// every target this crate builds for. This can't be `==` the way the
// original's static_assert has it: `pthread_rwlock_t`'s reserved size is an
// ABI detail of whichever libc the `libc` crate was generated against, and
// is free to be larger than the one native implementation needs.
const _: () = assert!(
    std::mem::size_of::<RwLock>() <= std::mem::size_of::<pthread_rwlock_t>(),
    "RwLock must fit inside the storage pthread_rwlock_t reserves for it"
);
const _: () = assert!(
    std::mem::align_of::<RwLock>() <= std::mem::align_of::<pthread_rwlock_t>(),
    "RwLock's alignment must not exceed pthread_rwlock_t's"
);

fn map_result(r: Result<bool, Error>) -> c_int {
    match r {
        Ok(_) => 0,
        Err(Error::Timeout) => libc::ETIMEDOUT,
        Err(Error::Overflow) => libc::EAGAIN,
        Err(Error::DeadLock) => libc::EDEADLK,
        Err(Error::Invalid) => libc::EINVAL,
        Err(Error::BeforeEpoch) => libc::ETIMEDOUT,
        Err(_) => libc::EINVAL,
    }
}

unsafe fn as_rwlock<'a>(rwlock: *mut pthread_rwlock_t) -> &'a RwLock {
    &*(rwlock as *mut RwLock)
}

fn build_timeout(base: clockid_t, ts: timespec) -> Result<Timeout, c_int> {
    match Timeout::timepoint(base, ts) {
        Ok(t) => Ok(t),
        Err(Error::BeforeEpoch) => Err(libc::ETIMEDOUT),
        Err(_) => Err(libc::EINVAL),
    }
}

/// # Safety
/// `rwlock` must point to valid, zero-initialized (or previously
/// rwlock-FFI-used) storage at least as large as `pthread_rwlock_t`, and
/// `abstime` must be non-null.
pub unsafe fn pthread_rwlock_timedrdlock(
    rwlock: *mut pthread_rwlock_t,
    abstime: *const timespec,
) -> c_int {
    if rwlock.is_null() {
        return libc::EINVAL;
    }
    debug_assert!(!abstime.is_null(), "timedrdlock called with a null timeout");
    let timeout = match build_timeout(libc::CLOCK_REALTIME, *abstime) {
        Ok(t) => t,
        Err(errno) => return errno,
    };
    map_result(as_rwlock(rwlock).read(Some(timeout)))
}

/// # Safety
/// Same obligations as [`pthread_rwlock_timedrdlock`].
pub unsafe fn pthread_rwlock_timedwrlock(
    rwlock: *mut pthread_rwlock_t,
    abstime: *const timespec,
) -> c_int {
    if rwlock.is_null() {
        return libc::EINVAL;
    }
    debug_assert!(!abstime.is_null(), "timedwrlock called with a null timeout");
    let timeout = match build_timeout(libc::CLOCK_REALTIME, *abstime) {
        Ok(t) => t,
        Err(errno) => return errno,
    };
    map_result(as_rwlock(rwlock).write(Some(timeout)))
}

fn check_clock(clockid: clockid_t) -> Result<(), c_int> {
    if clockid == libc::CLOCK_MONOTONIC || clockid == libc::CLOCK_REALTIME {
        Ok(())
    } else {
        Err(libc::EINVAL)
    }
}

/// # Safety
/// Same obligations as [`pthread_rwlock_timedrdlock`].
pub unsafe fn pthread_rwlock_clockrdlock(
    rwlock: *mut pthread_rwlock_t,
    clockid: clockid_t,
    abstime: *const timespec,
) -> c_int {
    if rwlock.is_null() {
        return libc::EINVAL;
    }
    if let Err(errno) = check_clock(clockid) {
        return errno;
    }
    debug_assert!(!abstime.is_null(), "clockrdlock called with a null timeout");
    let timeout = match build_timeout(clockid, *abstime) {
        Ok(t) => t,
        Err(errno) => return errno,
    };
    map_result(as_rwlock(rwlock).read(Some(timeout)))
}

/// # Safety
/// Same obligations as [`pthread_rwlock_timedrdlock`].
pub unsafe fn pthread_rwlock_clockwrlock(
    rwlock: *mut pthread_rwlock_t,
    clockid: clockid_t,
    abstime: *const timespec,
) -> c_int {
    if rwlock.is_null() {
        return libc::EINVAL;
    }
    if let Err(errno) = check_clock(clockid) {
        return errno;
    }
    debug_assert!(!abstime.is_null(), "clockwrlock called with a null timeout");
    let timeout = match build_timeout(clockid, *abstime) {
        Ok(t) => t,
        Err(errno) => return errno,
    };
    map_result(as_rwlock(rwlock).write(Some(timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    fn zeroed_rwlock() -> MaybeUninit<pthread_rwlock_t> {
        MaybeUninit::zeroed()
    }

    fn far_future() -> timespec {
        let mut ts = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
        ts.tv_sec += 3600;
        ts
    }

    #[test]
    fn null_pointer_is_rejected() {
        unsafe {
            assert_eq!(
                pthread_rwlock_timedrdlock(std::ptr::null_mut(), &far_future()),
                libc::EINVAL
            );
        }
    }

    #[test]
    fn unsupported_clock_is_rejected() {
        let mut storage = zeroed_rwlock();
        unsafe {
            let rc = pthread_rwlock_clockrdlock(
                storage.as_mut_ptr(),
                libc::CLOCK_PROCESS_CPUTIME_ID,
                &far_future(),
            );
            assert_eq!(rc, libc::EINVAL);
        }
    }

    #[test]
    fn fresh_zeroed_storage_locks_for_reading_then_writing() {
        let mut storage = zeroed_rwlock();
        unsafe {
            assert_eq!(pthread_rwlock_timedrdlock(storage.as_mut_ptr(), &far_future()), 0);
            as_rwlock(storage.as_mut_ptr()).unlock_read();
            assert_eq!(pthread_rwlock_timedwrlock(storage.as_mut_ptr(), &far_future()), 0);
            as_rwlock(storage.as_mut_ptr()).unlock_write();
        }
    }

    #[test]
    fn timed_rdlock_against_held_writer_times_out() {
        let mut storage = zeroed_rwlock();
        unsafe {
            let rw = as_rwlock(storage.as_mut_ptr());
            assert!(rw.try_write().unwrap());
            let mut ts = timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            ts.tv_nsec += 5_000_000;
            let rc = pthread_rwlock_clockrdlock(storage.as_mut_ptr(), libc::CLOCK_MONOTONIC, &ts);
            assert_eq!(rc, libc::ETIMEDOUT);
            rw.unlock_write();
        }
    }
}
