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

//! A thin wrapper around a Linux futex word: an `AtomicU32` plus the
//! `FUTEX_WAIT`/`FUTEX_WAKE` syscalls. [`Lock`](super::lock::Lock) and
//! [`RwLock`](super::rwlock::RwLock) build their blocking paths on top of
//! this; the fast paths never reach the syscall at all.

use super::timeout::Timeout;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct Futex {
    word: AtomicU32,
}

impl Futex {
    pub const fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
        }
    }

    pub fn load(&self, order: Ordering) -> u32 {
        self.word.load(order)
    }

    pub fn store(&self, value: u32, order: Ordering) {
        self.word.store(value, order)
    }

    pub fn exchange(&self, value: u32, order: Ordering) -> u32 {
        self.word.swap(value, order)
    }

    pub fn compare_exchange(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.word.compare_exchange(current, new, success, failure)
    }

    pub fn compare_exchange_weak(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.word.compare_exchange_weak(current, new, success, failure)
    }

    pub fn fetch_or(&self, value: u32, order: Ordering) -> u32 {
        self.word.fetch_or(value, order)
    }

    /// Blocks while the word still reads `expected`, waking on a matching
    /// `FUTEX_WAKE` or once `deadline` (already anchored to a clock this
    /// syscall understands) elapses.
    ///
    /// Returns `false` on timeout, `true` otherwise (woken, spurious wake
    /// and "value already changed" are all folded into `true` since every
    /// caller re-checks the word itself right after).
    pub fn wait(&self, expected: u32, deadline: Option<&Timeout>, is_shared: bool) -> bool {
        let ts = deadline.map(Timeout::timespec);
        let ts_ptr = ts
            .as_ref()
            .map_or(std::ptr::null(), |ts| ts as *const libc::timespec);
        let op = if is_shared {
            libc::FUTEX_WAIT_BITSET
        } else {
            libc::FUTEX_WAIT_BITSET | libc::FUTEX_PRIVATE_FLAG
        };
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.word.as_ptr(),
                op,
                expected,
                ts_ptr,
                std::ptr::null::<u32>(),
                u32::MAX,
            )
        };
        if rc == -1 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return errno != libc::ETIMEDOUT;
        }
        true
    }

    pub fn notify_one(&self, is_shared: bool) {
        self.wake(1, is_shared);
    }

    pub fn notify_all(&self, is_shared: bool) {
        self.wake(i32::MAX, is_shared);
    }

    fn wake(&self, count: i32, is_shared: bool) {
        let op = if is_shared {
            libc::FUTEX_WAKE
        } else {
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG
        };
        unsafe {
            libc::syscall(libc::SYS_futex, self.word.as_ptr(), op, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_returns_immediately_if_value_already_changed() {
        let f = Futex::new(5);
        // expected != current value, so the kernel returns EAGAIN right away
        assert!(f.wait(999, None, false));
    }

    #[test]
    fn wait_times_out_on_unchanged_value() {
        let f = Futex::new(0);
        let deadline = Timeout::duration(libc::timespec {
            tv_sec: 0,
            tv_nsec: 1_000_000,
        })
        .unwrap()
        .to_timepoint(libc::CLOCK_MONOTONIC);
        assert!(!f.wait(0, Some(&deadline), false));
    }

    #[test]
    fn notify_one_wakes_a_waiting_thread() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;
        let f = Arc::new(Futex::new(0));
        let about_to_wait = Arc::new(AtomicBool::new(false));
        let waiter = {
            let f = Arc::clone(&f);
            let about_to_wait = Arc::clone(&about_to_wait);
            std::thread::spawn(move || {
                about_to_wait.store(true, Ordering::Relaxed);
                // a generous fallback deadline: this only fires if the
                // notify below is somehow lost to the race, not on the
                // happy path
                let deadline = Timeout::duration(libc::timespec {
                    tv_sec: 5,
                    tv_nsec: 0,
                })
                .unwrap()
                .to_timepoint(libc::CLOCK_MONOTONIC);
                f.wait(0, Some(&deadline), false)
            })
        };
        while !about_to_wait.load(Ordering::Relaxed) {
            std::hint::spin_loop();
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        f.notify_one(false);
        assert!(waiter.join().unwrap());
    }
}
