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

//! A futex-backed reader/writer lock.
//!
//! The fast path never leaves a single `i32` atomic: bit 31 marks writer
//! ownership, the middle bits count active readers in units of 4, and the
//! bottom two bits record whether anyone is parked waiting. The slow path
//! (actually parking on a futex) is guarded by its own small [`Lock`] so that
//! bumping a pending-waiter count and deciding who to wake never races with
//! another waiter doing the same.

use super::futex::Futex;
use super::lock::Lock;
use super::timeout::Timeout;
use crate::error::Error;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

const PENDING_READERS_BIT: i32 = 1 << 0;
const PENDING_WRITERS_BIT: i32 = 1 << 1;
const PENDING_MASK: i32 = PENDING_READERS_BIT | PENDING_WRITERS_BIT;
const READER_COUNT_SHIFT: i32 = 2;
const READER_UNIT: i32 = 1 << READER_COUNT_SHIFT;
const WRITER_BIT: i32 = i32::MIN;
const SPIN_LIMIT: u32 = 100;

fn owned_by_writer(state: i32) -> bool {
    state < 0
}
fn owned_by_reader(state: i32) -> bool {
    state >= READER_UNIT
}
fn owned_by_anyone(state: i32) -> bool {
    owned_by_writer(state) || owned_by_reader(state)
}
fn has_pending_writer(state: i32) -> bool {
    state & PENDING_WRITERS_BIT != 0
}
fn has_pending(state: i32) -> bool {
    state & PENDING_MASK != 0
}
fn add_writer_flag(state: i32) -> i32 {
    state | WRITER_BIT
}

fn get_tid() -> i64 {
    // cached per-thread: the gettid syscall is cheap but there is no reason
    // to repeat it on every lock attempt
    thread_local! {
        static TID: i64 = unsafe { libc::syscall(libc::SYS_gettid) };
    }
    TID.with(|t| *t)
}

/// Bookkeeping for parked waiters, serialized by `lock` rather than made
/// atomic: only the thread holding `lock` ever touches `pending_reader_count`
/// / `pending_writer_count`.
struct Queue {
    lock: Lock,
    pending_reader_count: UnsafeCell<u32>,
    pending_writer_count: UnsafeCell<u32>,
    reader_futex: Futex,
    writer_futex: Futex,
}

// Safety: every access to the `UnsafeCell` fields happens while `lock` is
// held, which serializes them the same way a `Mutex<u32>` would.
unsafe impl Sync for Queue {}

impl Queue {
    const fn new() -> Self {
        Self {
            lock: Lock::new(),
            pending_reader_count: UnsafeCell::new(0),
            pending_writer_count: UnsafeCell::new(0),
            reader_futex: Futex::new(0),
            writer_futex: Futex::new(0),
        }
    }
}

pub struct RwLock {
    state: AtomicI32,
    writer_tid: AtomicI64,
    queue: Queue,
    is_shared: bool,
    prefer_writer: bool,
}

impl RwLock {
    pub const fn new(is_shared: bool, prefer_writer: bool) -> Self {
        Self {
            state: AtomicI32::new(0),
            writer_tid: AtomicI64::new(0),
            queue: Queue::new(),
            is_shared,
            prefer_writer,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.state.load(Ordering::Relaxed) == 0
    }

    fn is_read_lockable(&self, state: i32) -> bool {
        !owned_by_writer(state) && !(self.prefer_writer && has_pending_writer(state))
    }

    fn is_write_lockable(&self, state: i32) -> bool {
        !owned_by_anyone(state)
    }

    pub fn try_read(&self) -> Result<bool, Error> {
        let mut old = self.state.load(Ordering::Relaxed);
        while self.is_read_lockable(old) {
            let new = old
                .checked_add(READER_UNIT)
                .ok_or(Error::Overflow)?;
            match self
                .state
                .compare_exchange_weak(old, new, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return Ok(true),
                Err(observed) => old = observed,
            }
        }
        Ok(false)
    }

    pub fn try_write(&self) -> Result<bool, Error> {
        let mut old = self.state.load(Ordering::Relaxed);
        while self.is_write_lockable(old) {
            match self.state.compare_exchange_weak(
                old,
                add_writer_flag(old),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.writer_tid.store(get_tid(), Ordering::Relaxed);
                    return Ok(true);
                }
                Err(observed) => old = observed,
            }
        }
        Ok(false)
    }

    pub fn read(&self, timeout: Option<Timeout>) -> Result<bool, Error> {
        match self.try_read() {
            Ok(true) => Ok(true),
            Ok(false) => self.read_contended(timeout),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, timeout: Option<Timeout>) -> Result<bool, Error> {
        match self.try_write() {
            Ok(true) => Ok(true),
            Ok(false) => self.write_contended(timeout),
            Err(e) => Err(e),
        }
    }

    /// Subtracts one reader unit; if this was the last reader and a writer
    /// is pending, wakes exactly one of them.
    pub fn unlock_read(&self) {
        let old = self.state.fetch_sub(READER_UNIT, Ordering::Release);
        if old - READER_UNIT < READER_UNIT && has_pending_writer(old) {
            self.queue.writer_futex.notify_one(self.is_shared);
        }
    }

    /// Clears writer ownership and wakes the next waiter(s): pending writers
    /// first when `prefer_writer`, else all pending readers, else one writer.
    pub fn unlock_write(&self) {
        self.writer_tid.store(0, Ordering::Relaxed);
        let old = self.state.fetch_and(!WRITER_BIT, Ordering::Release);
        let state_after = old & !WRITER_BIT;
        if self.prefer_writer && has_pending_writer(state_after) {
            self.queue.writer_futex.notify_one(self.is_shared);
        } else if state_after & PENDING_READERS_BIT != 0 {
            self.queue.reader_futex.notify_all(self.is_shared);
        } else if has_pending_writer(state_after) {
            self.queue.writer_futex.notify_one(self.is_shared);
        }
    }

    fn check_timeout(&self, timeout: &mut Option<Timeout>) -> Result<(), Error> {
        let Some(t) = timeout.as_mut() else {
            return Ok(());
        };
        if t.is_realtime() {
            *t = t.to_timepoint(libc::CLOCK_MONOTONIC);
        }
        Ok(())
    }

    fn spin_until(&self, mut lockable: impl FnMut(i32) -> bool) -> i32 {
        let mut remaining = SPIN_LIMIT;
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if lockable(state) || remaining == 0 {
                return state;
            }
            std::hint::spin_loop();
            remaining -= 1;
        }
    }

    #[cold]
    fn read_contended(&self, mut timeout: Option<Timeout>) -> Result<bool, Error> {
        if self.writer_tid.load(Ordering::Relaxed) == get_tid() && get_tid() != 0 {
            return Err(Error::DeadLock);
        }
        self.check_timeout(&mut timeout)?;
        let mut state = self.spin_until(|s| self.is_read_lockable(s) || has_pending(s));
        loop {
            if self.is_read_lockable(state) {
                let new = match state.checked_add(READER_UNIT) {
                    Some(n) => n,
                    None => return Err(Error::Overflow),
                };
                match self.state.compare_exchange_weak(
                    state,
                    new,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Ok(true),
                    Err(observed) => {
                        state = observed;
                        continue;
                    }
                }
            }
            // not lockable right now: register as a pending reader and park
            self.queue.lock.lock(None, self.is_shared);
            let count = unsafe { &mut *self.queue.pending_reader_count.get() };
            *count += 1;
            if *count == 1 {
                self.state.fetch_or(PENDING_READERS_BIT, Ordering::Relaxed);
            }
            self.queue.lock.unlock(self.is_shared);

            let woken = self
                .queue
                .reader_futex
                .wait(0, timeout.as_ref(), self.is_shared);

            self.queue.lock.lock(None, self.is_shared);
            let count = unsafe { &mut *self.queue.pending_reader_count.get() };
            *count -= 1;
            if *count == 0 {
                self.state.fetch_and(!PENDING_READERS_BIT, Ordering::Relaxed);
            }
            self.queue.lock.unlock(self.is_shared);

            if !woken {
                return Err(Error::Timeout);
            }
            state = self.spin_until(|s| self.is_read_lockable(s) || has_pending(s));
        }
    }

    #[cold]
    fn write_contended(&self, mut timeout: Option<Timeout>) -> Result<bool, Error> {
        if self.writer_tid.load(Ordering::Relaxed) == get_tid() && get_tid() != 0 {
            return Err(Error::DeadLock);
        }
        self.check_timeout(&mut timeout)?;
        let mut state = self.spin_until(|s| self.is_write_lockable(s) || has_pending(s));
        loop {
            if self.is_write_lockable(state) {
                match self.state.compare_exchange_weak(
                    state,
                    add_writer_flag(state),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        self.writer_tid.store(get_tid(), Ordering::Relaxed);
                        return Ok(true);
                    }
                    Err(observed) => {
                        state = observed;
                        continue;
                    }
                }
            }
            self.queue.lock.lock(None, self.is_shared);
            let count = unsafe { &mut *self.queue.pending_writer_count.get() };
            *count += 1;
            if *count == 1 {
                self.state.fetch_or(PENDING_WRITERS_BIT, Ordering::Relaxed);
            }
            self.queue.lock.unlock(self.is_shared);

            let woken = self
                .queue
                .writer_futex
                .wait(0, timeout.as_ref(), self.is_shared);

            self.queue.lock.lock(None, self.is_shared);
            let count = unsafe { &mut *self.queue.pending_writer_count.get() };
            *count -= 1;
            if *count == 0 {
                self.state.fetch_and(!PENDING_WRITERS_BIT, Ordering::Relaxed);
            }
            self.queue.lock.unlock(self.is_shared);

            if !woken {
                return Err(Error::Timeout);
            }
            state = self.spin_until(|s| self.is_write_lockable(s) || has_pending(s));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontended_read_then_unlock() {
        let lock = RwLock::new(false, false);
        assert!(lock.is_cleared());
        assert!(lock.try_read().unwrap());
        assert!(!lock.is_cleared());
        lock.unlock_read();
        assert!(lock.is_cleared());
    }

    #[test]
    fn multiple_readers_can_hold_concurrently() {
        let lock = RwLock::new(false, false);
        assert!(lock.try_read().unwrap());
        assert!(lock.try_read().unwrap());
        assert!(!lock.try_write().unwrap());
        lock.unlock_read();
        lock.unlock_read();
        assert!(lock.is_cleared());
    }

    #[test]
    fn writer_excludes_readers_and_writers() {
        let lock = RwLock::new(false, false);
        assert!(lock.try_write().unwrap());
        assert!(!lock.try_read().unwrap());
        assert!(!lock.try_write().unwrap());
        lock.unlock_write();
        assert!(lock.is_cleared());
    }

    #[test]
    fn recursive_read_from_writer_thread_deadlocks() {
        let lock = RwLock::new(false, false);
        assert!(lock.try_write().unwrap());
        let err = lock.read(None).unwrap_err();
        assert_eq!(err, Error::DeadLock);
        lock.unlock_write();
    }

    #[test]
    fn write_after_timed_out_read_request_eventually_succeeds() {
        let lock = RwLock::new(false, false);
        assert!(lock.try_write().unwrap());
        let deadline = Timeout::duration(libc::timespec {
            tv_sec: 0,
            tv_nsec: 5_000_000,
        })
        .unwrap()
        .to_timepoint(libc::CLOCK_MONOTONIC);
        let err = lock.read(Some(deadline)).unwrap_err();
        assert_eq!(err, Error::Timeout);
        lock.unlock_write();
        // the timed-out reader must have cleaned up its pending registration
        assert!(lock.try_write().unwrap());
    }

    #[test]
    fn contended_readers_and_writers_never_overlap() {
        use std::sync::atomic::AtomicIsize;
        use std::sync::Arc;
        let lock = Arc::new(RwLock::new(false, true));
        let readers_active = Arc::new(AtomicIsize::new(0));
        let writer_active = Arc::new(AtomicIsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let readers_active = Arc::clone(&readers_active);
            let writer_active = Arc::clone(&writer_active);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    assert!(lock.read(None).unwrap());
                    readers_active.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(writer_active.load(Ordering::SeqCst), 0);
                    readers_active.fetch_sub(1, Ordering::SeqCst);
                    lock.unlock_read();
                }
            }));
        }
        for _ in 0..2 {
            let lock = Arc::clone(&lock);
            let readers_active = Arc::clone(&readers_active);
            let writer_active = Arc::clone(&writer_active);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    assert!(lock.write(None).unwrap());
                    writer_active.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(readers_active.load(Ordering::SeqCst), 0);
                    writer_active.fetch_sub(1, Ordering::SeqCst);
                    lock.unlock_write();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(lock.is_cleared());
    }
}
