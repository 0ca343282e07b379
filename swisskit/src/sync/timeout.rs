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

//! A portable wall-clock-or-monotonic deadline, carried as either a duration
//! (relative to whenever it's first consumed) or a timepoint pinned to a
//! specific clock.

use crate::error::Error;
use libc::{clockid_t, timespec};

const NSEC_PER_SEC: i64 = 1_000_000_000;

fn now(base: clockid_t) -> timespec {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(base, &mut ts) };
    debug_assert_eq!(rc, 0, "clock_gettime({base}) failed");
    ts
}

fn add(a: timespec, b: timespec) -> timespec {
    let mut sec = a.tv_sec as i64 + b.tv_sec as i64;
    let mut nsec = a.tv_nsec as i64 + b.tv_nsec as i64;
    if nsec >= NSEC_PER_SEC {
        sec += 1;
        nsec -= NSEC_PER_SEC;
    }
    timespec {
        tv_sec: sec as _,
        tv_nsec: nsec as _,
    }
}

/// `a - b`, clamped to zero instead of going negative.
fn sub_saturating(a: timespec, b: timespec) -> timespec {
    let mut sec = a.tv_sec as i64 - b.tv_sec as i64;
    let mut nsec = a.tv_nsec as i64 - b.tv_nsec as i64;
    if nsec < 0 {
        sec -= 1;
        nsec += NSEC_PER_SEC;
    }
    if sec < 0 {
        sec = 0;
        nsec = 0;
    }
    timespec {
        tv_sec: sec as _,
        tv_nsec: nsec as _,
    }
}

fn convert_clock(ts: timespec, from: clockid_t, to: clockid_t) -> timespec {
    let from_now = now(from);
    let to_now = now(to);
    let mut sec = ts.tv_sec as i64 - from_now.tv_sec as i64 + to_now.tv_sec as i64;
    let mut nsec = ts.tv_nsec as i64 - from_now.tv_nsec as i64 + to_now.tv_nsec as i64;
    if nsec > NSEC_PER_SEC {
        sec += 1;
        nsec -= NSEC_PER_SEC;
    } else if nsec < 0 {
        sec -= 1;
        nsec += NSEC_PER_SEC;
    }
    timespec {
        tv_sec: sec as _,
        tv_nsec: nsec as _,
    }
}

fn validate_nsec(ts: timespec) -> Result<(), Error> {
    if ts.tv_nsec < 0 || ts.tv_nsec as i64 >= NSEC_PER_SEC {
        Err(Error::Invalid)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Duration,
    Timepoint,
}

/// A deadline that is either a relative duration or pinned to a clock.
///
/// Durations are anchored to a clock only when first converted with
/// [`Timeout::to_timepoint`]; until then they carry no clock id at all.
#[derive(Clone, Copy)]
pub struct Timeout {
    kind: Kind,
    base: clockid_t,
    ts: timespec,
}

impl Timeout {
    /// A deadline relative to whatever clock it is eventually anchored to.
    pub fn duration(ts: timespec) -> Result<Self, Error> {
        validate_nsec(ts)?;
        Ok(Self {
            kind: Kind::Duration,
            base: -1,
            ts,
        })
    }

    /// A deadline pinned to a specific clock. `ts.tv_sec < 0` is treated as
    /// an already-expired timeout rather than a malformed one.
    pub fn timepoint(base: clockid_t, ts: timespec) -> Result<Self, Error> {
        validate_nsec(ts)?;
        if ts.tv_sec < 0 {
            return Err(Error::BeforeEpoch);
        }
        Ok(Self {
            kind: Kind::Timepoint,
            base,
            ts,
        })
    }

    /// Reanchors this deadline to `base`, resolving a duration against the
    /// current time on that clock.
    pub fn to_timepoint(&self, base: clockid_t) -> Self {
        match self.kind {
            Kind::Timepoint if self.base == base => *self,
            Kind::Timepoint => Self {
                kind: Kind::Timepoint,
                base,
                ts: convert_clock(self.ts, self.base, base),
            },
            Kind::Duration => Self {
                kind: Kind::Timepoint,
                base,
                ts: add(now(base), self.ts),
            },
        }
    }

    /// Converts to a duration remaining from now, clamped to zero if the
    /// deadline has already passed.
    pub fn to_duration(&self) -> Self {
        match self.kind {
            Kind::Duration => *self,
            Kind::Timepoint => Self {
                kind: Kind::Duration,
                base: -1,
                ts: sub_saturating(self.ts, now(self.base)),
            },
        }
    }

    pub fn is_timepoint(&self) -> bool {
        self.kind == Kind::Timepoint
    }

    pub fn is_realtime(&self) -> bool {
        self.kind == Kind::Timepoint && self.base == libc::CLOCK_REALTIME
    }

    pub fn base(&self) -> clockid_t {
        self.base
    }

    pub fn timespec(&self) -> timespec {
        self.ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_nsec() {
        let bad = timespec {
            tv_sec: 0,
            tv_nsec: 1_000_000_000,
        };
        assert!(matches!(Timeout::duration(bad), Err(Error::Invalid)));
        assert!(matches!(
            Timeout::timepoint(libc::CLOCK_MONOTONIC, bad),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn rejects_negative_timepoint_seconds() {
        let before_epoch = timespec {
            tv_sec: -1,
            tv_nsec: 0,
        };
        assert!(matches!(
            Timeout::timepoint(libc::CLOCK_REALTIME, before_epoch),
            Err(Error::BeforeEpoch)
        ));
    }

    #[test]
    fn duration_anchors_to_now_on_timepoint_conversion() {
        let half_second = timespec {
            tv_sec: 0,
            tv_nsec: 500_000_000,
        };
        let d = Timeout::duration(half_second).unwrap();
        let before = now(libc::CLOCK_MONOTONIC);
        let tp = d.to_timepoint(libc::CLOCK_MONOTONIC);
        assert!(tp.is_timepoint());
        let ts = tp.timespec();
        assert!(ts.tv_sec > before.tv_sec || (ts.tv_sec == before.tv_sec && ts.tv_nsec >= before.tv_nsec));
    }

    #[test]
    fn expired_timepoint_to_duration_is_zero() {
        let almost_now = timespec {
            tv_sec: 1,
            tv_nsec: 0,
        };
        let tp = Timeout::timepoint(libc::CLOCK_MONOTONIC, almost_now).unwrap();
        let remaining = tp.to_duration();
        assert_eq!(remaining.timespec().tv_sec, 0);
        assert_eq!(remaining.timespec().tv_nsec, 0);
    }

    #[test]
    fn is_realtime_only_for_clock_realtime_timepoints() {
        let tp = Timeout::timepoint(libc::CLOCK_REALTIME, timespec { tv_sec: 1, tv_nsec: 0 }).unwrap();
        assert!(tp.is_realtime());
        let mono = tp.to_timepoint(libc::CLOCK_MONOTONIC);
        assert!(!mono.is_realtime());
        let d = Timeout::duration(timespec { tv_sec: 1, tv_nsec: 0 }).unwrap();
        assert!(!d.is_realtime());
    }
}
