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

//! The handful of tunables this crate reads from the environment.
//!
//! None of the hot-path constants (spin counts, growth factor, ...) live
//! here: those are load-bearing for the algorithms themselves and are kept
//! as `const`s next to the code they tune. This module only covers the one
//! knob a caller plausibly wants to override without recompiling: the
//! capacity `hcreate(0)` falls back to, since POSIX leaves that unspecified.

use std::env;
use std::sync::OnceLock;

const DEFAULT_TABLE_CAPACITY: usize = 16;
const CAPACITY_VAR: &str = "SWISSKIT_DEFAULT_CAPACITY";

static DEFAULT_CAPACITY: OnceLock<usize> = OnceLock::new();

/// The capacity a zero-sized `hcreate`/`hcreate_r` request falls back to.
///
/// Reads `SWISSKIT_DEFAULT_CAPACITY` once and caches it; an unset or
/// unparseable value falls back to [`DEFAULT_TABLE_CAPACITY`] and is logged
/// at `debug` rather than treated as an error, since this is a convenience
/// default, not a required setting.
pub fn default_table_capacity() -> usize {
    *DEFAULT_CAPACITY.get_or_init(|| match env::var(CAPACITY_VAR) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(0) => {
                log::debug!("{CAPACITY_VAR}=0 is not usable, falling back to {DEFAULT_TABLE_CAPACITY}");
                DEFAULT_TABLE_CAPACITY
            }
            Ok(n) => {
                log::debug!("using {CAPACITY_VAR}={n}");
                n
            }
            Err(_) => {
                log::debug!("{CAPACITY_VAR}={raw:?} is not a valid usize, falling back to {DEFAULT_TABLE_CAPACITY}");
                DEFAULT_TABLE_CAPACITY
            }
        },
        Err(_) => DEFAULT_TABLE_CAPACITY,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_env_var_is_unset() {
        env::remove_var(CAPACITY_VAR);
        // can't exercise the cached-override path in a shared test binary
        // (OnceLock is process-wide), so this only checks the fallback
        // constant is sane
        assert!(DEFAULT_TABLE_CAPACITY > 0);
    }
}
