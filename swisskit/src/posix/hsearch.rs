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

//! `hcreate`/`hsearch` and friends, the POSIX `<search.h>` hashtable API,
//! backed directly by [`crate::swisstable::RawTable`] keyed with
//! [`crate::wyhash::DefaultHash`].
//!
//! `hcreate`/`hdestroy`/`hsearch` operate on one process-wide table behind
//! [`GLOBAL_TABLE`], matching the POSIX contract that this trio is not
//! reentrant. The `_r` variants take a caller-owned [`HsearchData`] instead
//! and may be called concurrently on independent tables.

use crate::error::Error;
use crate::swisstable::{Global, RawTable};
use crate::wyhash::DefaultHash;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// The number Knuth used to seed his multiplicative PRNG; xor'd with a
/// table's own address so two tables in the same process don't collide.
const DEFAULT_SEED: u64 = 6364136223846793005;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Entry {
    pub key: *mut c_char,
    pub data: *mut c_void,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Find = 0,
    Enter = 1,
}

/// Opaque handle matching the layout POSIX's `struct hsearch_data` promises
/// nothing more than; we only ever need one pointer-sized slot in it.
#[repr(C)]
pub struct HsearchData {
    table: *mut SeededTable,
}

impl HsearchData {
    pub const fn new() -> Self {
        Self {
            table: ptr::null_mut(),
        }
    }
}

impl Default for HsearchData {
    fn default() -> Self {
        Self::new()
    }
}

type Table = RawTable<Entry, Global, false, false>;

struct SeededTable {
    raw: Table,
    seed: u64,
}

impl SeededTable {
    fn with_capacity(nel: usize) -> Box<Self> {
        let nel = if nel == 0 {
            crate::config::default_table_capacity()
        } else {
            nel
        };
        let mut table = Box::new(Self {
            raw: Table::with_capacity(nel),
            seed: 0,
        });
        let addr = table.as_ref() as *const Self as u64;
        table.seed = DEFAULT_SEED ^ addr;
        table
    }
}

static GLOBAL_TABLE: AtomicPtr<SeededTable> = AtomicPtr::new(ptr::null_mut());

fn set_errno(e: Error) {
    unsafe {
        *libc::__errno_location() = e.as_errno();
    }
}

unsafe fn entry_key<'a>(key: *const c_char) -> &'a CStr {
    CStr::from_ptr(key)
}

fn hash_entry(entry: &Entry, seed: u64) -> u64 {
    let key = unsafe { entry_key(entry.key) };
    DefaultHash::hash(key.to_bytes(), seed)
}

fn entries_equal(a: &Entry, item: &Entry) -> bool {
    unsafe { libc::strcmp(a.key, item.key) == 0 }
}

unsafe fn search_impl(
    item: Entry,
    action: Action,
    retval: *mut *mut Entry,
    table: &mut SeededTable,
) -> bool {
    let seed = table.seed;
    let hash = hash_entry(&item, seed);
    let found = match action {
        Action::Enter => table.raw.find_or_insert(
            hash,
            |e| entries_equal(e, &item),
            || item,
            |e| hash_entry(e, seed),
        ),
        Action::Find => table.raw.find(hash, |e| entries_equal(e, &item)).ok_or(Error::Miss),
    };
    match found {
        Ok(bucket) => {
            *retval = bucket.as_ref() as *const Entry as *mut Entry;
            true
        }
        Err(e) => {
            *retval = ptr::null_mut();
            set_errno(e);
            false
        }
    }
}

/// # Safety
/// `nel` is just a capacity hint; no pointers are involved.
pub unsafe fn hcreate(nel: usize) -> c_int {
    let table = SeededTable::with_capacity(nel);
    let old = GLOBAL_TABLE.swap(Box::into_raw(table), Ordering::AcqRel);
    if !old.is_null() {
        drop(Box::from_raw(old));
    }
    1
}

/// # Safety
/// `hdata` must be a valid, exclusively-owned pointer (or null).
pub unsafe fn hcreate_r(nel: usize, hdata: *mut HsearchData) -> c_int {
    if hdata.is_null() {
        set_errno(Error::Invalid);
        return 0;
    }
    let table = SeededTable::with_capacity(nel);
    (*hdata).table = Box::into_raw(table);
    1
}

pub fn hdestroy() {
    let old = GLOBAL_TABLE.swap(ptr::null_mut(), Ordering::AcqRel);
    if !old.is_null() {
        unsafe { drop(Box::from_raw(old)) };
    }
}

/// # Safety
/// `hdata` must have been initialized by [`hcreate_r`] and not already
/// destroyed.
pub unsafe fn hdestroy_r(hdata: *mut HsearchData) {
    if hdata.is_null() {
        return;
    }
    let table = std::mem::replace(&mut (*hdata).table, ptr::null_mut());
    if !table.is_null() {
        drop(Box::from_raw(table));
    }
}

/// # Safety
/// `item.key` must be a valid, nul-terminated C string for the duration of
/// the call (and, on a successful `ENTER`, for as long as the table keeps
/// the entry, since the table stores the pointer rather than the bytes).
pub unsafe fn hsearch(item: Entry, action: Action) -> *mut Entry {
    let table = GLOBAL_TABLE.load(Ordering::Acquire);
    if table.is_null() {
        set_errno(Error::Invalid);
        return ptr::null_mut();
    }
    let mut retval = ptr::null_mut();
    search_impl(item, action, &mut retval, &mut *table);
    retval
}

/// # Safety
/// Same obligations as [`hsearch`], plus `hdata` must have been initialized
/// by [`hcreate_r`] and `retval` must be a valid out-pointer.
pub unsafe fn hsearch_r(
    item: Entry,
    action: Action,
    retval: *mut *mut Entry,
    hdata: *mut HsearchData,
) -> c_int {
    if hdata.is_null() || retval.is_null() || (*hdata).table.is_null() {
        set_errno(Error::Invalid);
        return 0;
    }
    search_impl(item, action, retval, &mut *(*hdata).table) as c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn entry(key: &CString, data: *mut c_void) -> Entry {
        Entry {
            key: key.as_ptr() as *mut c_char,
            data,
        }
    }

    #[test]
    fn reentrant_enter_then_find_round_trips() {
        let mut hdata = HsearchData::new();
        unsafe {
            assert_eq!(hcreate_r(16, &mut hdata), 1);
            let key = CString::new("alpha").unwrap();
            let mut payload = 42i32;
            let e = entry(&key, &mut payload as *mut i32 as *mut c_void);
            let mut retval: *mut Entry = ptr::null_mut();
            assert_eq!(hsearch_r(e, Action::Enter, &mut retval, &mut hdata), 1);
            assert!(!retval.is_null());

            let lookup = entry(&key, ptr::null_mut());
            let mut found: *mut Entry = ptr::null_mut();
            assert_eq!(hsearch_r(lookup, Action::Find, &mut found, &mut hdata), 1);
            assert!(!found.is_null());
            assert_eq!((*found).data, &mut payload as *mut i32 as *mut c_void);

            hdestroy_r(&mut hdata);
        }
    }

    #[test]
    fn find_miss_sets_esrch_and_returns_null() {
        let mut hdata = HsearchData::new();
        unsafe {
            assert_eq!(hcreate_r(16, &mut hdata), 1);
            let key = CString::new("missing").unwrap();
            let lookup = entry(&key, ptr::null_mut());
            let mut found: *mut Entry = ptr::null_mut();
            assert_eq!(hsearch_r(lookup, Action::Find, &mut found, &mut hdata), 0);
            assert!(found.is_null());
            assert_eq!(*libc::__errno_location(), libc::ESRCH);
            hdestroy_r(&mut hdata);
        }
    }

    #[test]
    fn full_table_enter_sets_enomem() {
        let mut hdata = HsearchData::new();
        unsafe {
            assert_eq!(hcreate_r(1, &mut hdata), 1);
            let keys: Vec<CString> = (0..64).map(|i| CString::new(format!("k{i}")).unwrap()).collect();
            let mut saw_failure = false;
            for key in &keys {
                let e = entry(key, ptr::null_mut());
                let mut retval: *mut Entry = ptr::null_mut();
                if hsearch_r(e, Action::Enter, &mut retval, &mut hdata) == 0 {
                    saw_failure = true;
                    assert_eq!(*libc::__errno_location(), libc::ENOMEM);
                    break;
                }
            }
            assert!(saw_failure, "a fixed-capacity table must eventually refuse inserts");
            hdestroy_r(&mut hdata);
        }
    }

    #[test]
    fn null_handle_is_rejected_with_einval() {
        unsafe {
            assert_eq!(hcreate_r(4, ptr::null_mut()), 0);
            assert_eq!(*libc::__errno_location(), libc::EINVAL);
        }
    }

    #[test]
    fn non_reentrant_api_round_trips_through_the_global_table() {
        unsafe {
            assert_eq!(hcreate(16), 1);
            let key = CString::new("global-key").unwrap();
            let mut payload = 7i32;
            let e = entry(&key, &mut payload as *mut i32 as *mut c_void);
            let inserted = hsearch(e, Action::Enter);
            assert!(!inserted.is_null());

            let lookup = entry(&key, ptr::null_mut());
            let found = hsearch(lookup, Action::Find);
            assert!(!found.is_null());
            assert_eq!((*found).data, &mut payload as *mut i32 as *mut c_void);

            hdestroy();
        }
    }
}
