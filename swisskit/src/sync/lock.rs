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

//! A simple timable futex lock for internal use.
//!
//! This is deliberately not [`RwLock`](super::rwlock::RwLock) or a
//! general-purpose mutex: no robustness, no reentrancy, just a spin-then-park
//! critical section short enough that the spin phase usually wins.

use super::futex::Futex;
use super::timeout::Timeout;
use std::sync::atomic::Ordering;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;
const SPIN_COUNT: u32 = 100;

pub struct Lock {
    word: Futex,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            word: Futex::new(UNLOCKED),
        }
    }

    pub fn try_lock(&self) -> bool {
        self.word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires the lock, blocking until it is free or `timeout` elapses.
    /// Returns `false` only when a timeout was given and it expired.
    pub fn lock(&self, timeout: Option<Timeout>, is_shared: bool) -> bool {
        self.try_lock() || self.lock_contended(timeout, is_shared)
    }

    pub fn unlock(&self, is_shared: bool) {
        if self.word.exchange(UNLOCKED, Ordering::Release) == CONTENDED {
            self.word.notify_one(is_shared);
        }
    }

    fn spin(&self) -> u32 {
        let mut remaining = SPIN_COUNT;
        loop {
            let state = self.word.load(Ordering::Relaxed);
            if state != LOCKED || remaining == 0 {
                return state;
            }
            std::hint::spin_loop();
            remaining -= 1;
        }
    }

    #[cold]
    fn lock_contended(&self, mut timeout: Option<Timeout>, is_shared: bool) -> bool {
        let mut state = self.spin();
        if state == UNLOCKED
            && self
                .word
                .compare_exchange(state, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            return true;
        }

        // do the clock conversion once, before entering the contention loop
        if let Some(t) = timeout {
            if t.is_realtime() {
                timeout = Some(t.to_timepoint(libc::CLOCK_MONOTONIC));
            }
        }

        loop {
            if state != CONTENDED && self.word.exchange(CONTENDED, Ordering::Acquire) == UNLOCKED {
                return true;
            }
            if !self.word.wait(CONTENDED, timeout.as_ref(), is_shared) {
                return false;
            }
            state = self.spin();
        }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn try_lock_then_unlock_round_trips() {
        let lock = Lock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock(false);
        assert!(lock.try_lock());
    }

    #[test]
    fn lock_without_timeout_succeeds_immediately_when_free() {
        let lock = Lock::new();
        assert!(lock.lock(None, false));
    }

    #[test]
    fn lock_with_timeout_on_held_lock_eventually_gives_up() {
        let lock = Lock::new();
        assert!(lock.try_lock());
        let deadline = Timeout::duration(libc::timespec {
            tv_sec: 0,
            tv_nsec: 5_000_000,
        })
        .unwrap()
        .to_timepoint(libc::CLOCK_MONOTONIC);
        assert!(!lock.lock(Some(deadline), false));
    }

    #[test]
    fn contended_lock_is_acquired_by_exactly_one_thread_at_a_time() {
        let lock = Arc::new(Lock::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    assert!(lock.lock(None, false));
                    let occupants = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    assert_eq!(occupants, 1, "two threads entered the critical section");
                    counter.fetch_sub(1, Ordering::Relaxed);
                    lock.unlock(false);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
