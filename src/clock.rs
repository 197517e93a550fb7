// domed — adaptive dome tracking control core
// Copyright (C) 2024 Filip Szczerek <ga.software@yahoo.com>
//
// This file is part of domed
//
// domed is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3
// as published by the Free Software Foundation.
//
// domed is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with domed.  If not, see <http://www.gnu.org/licenses/>.

// Dome tracking control core
//
// §9 redesign note: "process-wide singletons... replace with explicit
// owning-handle values... tests substitute alternative implementations via
// a trait/interface capability boundary (`ClockSource`)."

use std::time::{Duration, Instant};

pub trait ClockSource: Send {
    fn now(&self) -> Instant;

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose `now()` is advanced manually, used by tests that exercise
/// timing-dependent logic (staleness, cadence, watchdogs) deterministically.
pub struct FakeClock {
    base: Instant,
    offset: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            base: Instant::now(),
            offset: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn advance(&self, dur: Duration) {
        self.offset
            .fetch_add(dur.as_micros() as u64, std::sync::atomic::Ordering::SeqCst);
    }
}

impl ClockSource for FakeClock {
    fn now(&self) -> Instant {
        let micros = self.offset.load(std::sync::atomic::Ordering::SeqCst);
        self.base + Duration::from_micros(micros)
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }
}
