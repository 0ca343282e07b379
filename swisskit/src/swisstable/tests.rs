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

use super::*;

/// A deliberately bad hash that keeps every key in the same bucket, for
/// exercising the probe sequence instead of trusting a good hash to spread
/// things out.
fn identity_hash(x: &u64) -> u64 {
    *x
}

fn fixed_table() -> RawTable<u64, Global, false, false> {
    RawTable::with_capacity(16)
}

fn growable_table() -> RawTable<u64, Global, true, true> {
    RawTable::with_capacity(4)
}

#[test]
fn fresh_table_is_empty() {
    let table: RawTable<u64> = RawTable::new();
    assert_eq!(table.len(), 0);
    assert!(table.table.is_empty_singleton());
}

#[test]
fn insert_then_find() {
    let mut table = fixed_table();
    for i in 0..10u64 {
        table.insert(identity_hash(&i), i, identity_hash).unwrap();
    }
    assert_eq!(table.len(), 10);
    for i in 0..10u64 {
        let found = table.get(identity_hash(&i), |v| *v == i);
        assert_eq!(found, Some(&i));
    }
    assert_eq!(table.get(identity_hash(&999), |v| *v == 999), None);
}

#[test]
fn find_or_insert_does_not_duplicate() {
    let mut table = fixed_table();
    let hash = identity_hash(&42);
    let b1 = table
        .find_or_insert(hash, |v| *v == 42, || 42, identity_hash)
        .unwrap();
    let b2 = table
        .find_or_insert(hash, |v| *v == 42, || 42, identity_hash)
        .unwrap();
    assert_eq!(table.len(), 1);
    unsafe {
        assert_eq!(table.index_of_bucket(&b1), table.index_of_bucket(&b2));
    }
}

#[test]
fn fixed_capacity_table_rejects_overflow() {
    // with_capacity(16) rounds up to a load capacity of 14 (16 buckets * 7/8)
    let mut table = fixed_table();
    let cap = bucket_mask_to_capacity(table.table.bucket_mask);
    for i in 0..cap as u64 {
        table.insert(identity_hash(&i), i, identity_hash).unwrap();
    }
    let overflow = table.insert(identity_hash(&(cap as u64)), cap as u64, identity_hash);
    assert_eq!(overflow, Err(Error::CapacityExceeded));
}

#[test]
#[should_panic(expected = "DELETE = false")]
fn erase_panics_without_delete_flag() {
    let mut table = fixed_table();
    let bucket = table.insert(identity_hash(&1), 1, identity_hash).unwrap();
    unsafe {
        table.erase(bucket);
    }
}

#[test]
fn erase_and_entry_count_with_delete_enabled() {
    let mut table: RawTable<u64, Global, true, false> = RawTable::with_capacity(16);
    let bucket = table.insert(identity_hash(&7), 7, identity_hash).unwrap();
    assert_eq!(table.len(), 1);
    unsafe {
        table.erase(bucket);
    }
    assert_eq!(table.len(), 0);
    assert!(table.get(identity_hash(&7), |v| *v == 7).is_none());
}

#[test]
fn rehash_in_place_reclaims_tombstones_without_growing() {
    let mut table: RawTable<u64, Global, true, false> = RawTable::with_capacity(16);
    let cap = bucket_mask_to_capacity(table.table.bucket_mask);
    let buckets_before = table.buckets();
    // repeatedly fill to capacity and erase everything; the table should
    // keep reusing the same allocation via in-place rehashing rather than
    // reporting capacity exceeded or growing
    for round in 0..4u64 {
        let base = round * cap as u64;
        let mut inserted = Vec::new();
        for i in 0..cap as u64 {
            let key = base + i;
            inserted.push(table.insert(identity_hash(&key), key, identity_hash).unwrap());
        }
        assert_eq!(table.len(), cap);
        for bucket in inserted {
            unsafe {
                table.erase(bucket);
            }
        }
        assert_eq!(table.len(), 0);
    }
    assert_eq!(table.buckets(), buckets_before);
}

#[test]
fn resize_grows_past_initial_capacity() {
    let mut table = growable_table();
    let initial_buckets = table.buckets();
    for i in 0..64u64 {
        table.insert(identity_hash(&i), i, identity_hash).unwrap();
    }
    assert_eq!(table.len(), 64);
    assert!(table.buckets() > initial_buckets);
    for i in 0..64u64 {
        assert_eq!(table.get(identity_hash(&i), |v| *v == i), Some(&i));
    }
}

#[test]
fn capacity_to_buckets_matches_load_factor() {
    assert_eq!(capacity_to_buckets(0), Some(4));
    assert_eq!(capacity_to_buckets(3), Some(4));
    assert_eq!(capacity_to_buckets(4), Some(8));
    assert_eq!(capacity_to_buckets(7), Some(8));
    assert_eq!(capacity_to_buckets(8), Some(16));
}

#[test]
fn bucket_mask_to_capacity_round_trips() {
    for &buckets in &[4usize, 8, 16, 32, 128] {
        let cap = bucket_mask_to_capacity(buckets - 1);
        assert!(capacity_to_buckets(cap).unwrap() <= buckets);
    }
}

#[test]
fn h2_only_uses_seven_bits() {
    for hash in [0u64, 1, u64::MAX, 0xdead_beef_1234_5678] {
        assert!(h2(hash) & 0x80 == 0);
    }
}

#[test]
fn control_byte_predicates() {
    assert!(is_control_byte_full(0x00));
    assert!(is_control_byte_full(0x7f));
    assert!(!is_control_byte_full(control_bytes::EMPTY));
    assert!(!is_control_byte_full(control_bytes::DELETED));
    assert!(is_control_byte_special(control_bytes::EMPTY));
    assert!(is_control_byte_special(control_bytes::DELETED));
    assert!(is_special_empty(control_bytes::EMPTY));
    assert!(!is_special_empty(control_bytes::DELETED));
}

#[test]
fn clear_drops_everything_and_keeps_allocation() {
    let mut table = growable_table();
    for i in 0..10u64 {
        table.insert(identity_hash(&i), i, identity_hash).unwrap();
    }
    let buckets_before = table.buckets();
    table.clear();
    assert_eq!(table.len(), 0);
    assert_eq!(table.buckets(), buckets_before);
}
