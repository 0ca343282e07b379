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

//! # swisskit
//!
//! A SwissTable-style hash table, the WyHash string hash it's built on, and
//! a futex-backed `Lock`/`RwLock` pair, together with the POSIX `hsearch`
//! and `pthread_rwlock_*` shims built on top of them. See the `swisstable`,
//! `wyhash`, `sync` and `posix` modules for their respective documentation.

pub mod config;
pub mod error;
pub mod posix;
pub mod swisstable;
pub mod sync;
pub mod wyhash;

pub use error::{Error, SkResult};
