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

// Measured-parallax lookup table: bilinear interpolation over a sparse
// `(altitude, az_obj) -> az_dome` scatter. Grouped into altitude slices, each
// internally sorted and linearly interpolated by azimuth; slices are then
// linearly interpolated by altitude. Outside the measured envelope the query
// clamps to the nearest boundary slice/sample and logs a warning (the
// correctness of that clamp near the zenith is uncertain, see DESIGN.md).

use crate::config::AbaqueSample;
use std::collections::HashMap;
use std::sync::Mutex;

struct AltSlice {
    altitude: f32,
    /// `(az_obj, az_dome)`, sorted ascending by `az_obj`.
    points: Vec<(f32, f32)>,
}

pub struct Abaque {
    slices: Vec<AltSlice>,
    cache: Mutex<HashMap<(i32, i32), f32>>,
}

impl Abaque {
    /// Builds the table from a (possibly unsorted, possibly empty) scatter
    /// of measured samples. An empty table is a valid, degenerate case: the
    /// query then returns the object azimuth unchanged.
    pub fn build(samples: &[AbaqueSample]) -> Abaque {
        let mut by_altitude: HashMap<i64, Vec<(f32, f32)>> = HashMap::new();
        for s in samples {
            let key = (s.altitude as f64 * 1000.0).round() as i64;
            by_altitude.entry(key).or_default().push((s.az_obj, s.az_dome));
        }

        let mut slices: Vec<AltSlice> = by_altitude
            .into_iter()
            .map(|(key, mut points)| {
                points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                AltSlice {
                    altitude: key as f32 / 1000.0,
                    points,
                }
            })
            .collect();
        slices.sort_by(|a, b| a.altitude.partial_cmp(&b.altitude).unwrap());

        Abaque {
            slices,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn query(&self, altitude: f32, az_obj: f32) -> f32 {
        let key = (round_key(altitude), round_key(az_obj));
        if let Some(v) = self.cache.lock().unwrap().get(&key) {
            return *v;
        }
        let result = self.compute(altitude, az_obj);
        self.cache.lock().unwrap().insert(key, result);
        result
    }

    fn compute(&self, altitude: f32, az_obj: f32) -> f32 {
        let Some(first) = self.slices.first() else {
            return az_obj;
        };
        let last = self.slices.last().unwrap();

        if altitude <= first.altitude {
            if altitude < first.altitude {
                log::warn!(
                    "abaque query at altitude {altitude:.2} below measured envelope ({:.2}); clamping",
                    first.altitude
                );
            }
            return interp_within_slice(first, az_obj);
        }
        if altitude >= last.altitude {
            if altitude > last.altitude {
                log::warn!(
                    "abaque query at altitude {altitude:.2} above measured envelope ({:.2}); clamping",
                    last.altitude
                );
            }
            return interp_within_slice(last, az_obj);
        }

        for pair in self.slices.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if altitude >= lo.altitude && altitude <= hi.altitude {
                let v_lo = interp_within_slice(lo, az_obj);
                let v_hi = interp_within_slice(hi, az_obj);
                let span = hi.altitude - lo.altitude;
                let t = if span.abs() < f32::EPSILON {
                    0.0
                } else {
                    (altitude - lo.altitude) / span
                };
                return v_lo + t * (v_hi - v_lo);
            }
        }
        unreachable!("altitude bracket not found despite being within envelope bounds")
    }
}

fn interp_within_slice(slice: &AltSlice, az_obj: f32) -> f32 {
    let Some(first) = slice.points.first() else {
        return az_obj;
    };
    let last = slice.points.last().unwrap();

    if az_obj <= first.0 {
        if az_obj < first.0 {
            log::warn!(
                "abaque query at az {az_obj:.2} below slice {:.2} envelope; clamping",
                slice.altitude
            );
        }
        return first.1;
    }
    if az_obj >= last.0 {
        if az_obj > last.0 {
            log::warn!(
                "abaque query at az {az_obj:.2} above slice {:.2} envelope; clamping",
                slice.altitude
            );
        }
        return last.1;
    }

    for pair in slice.points.windows(2) {
        let (az0, v0) = pair[0];
        let (az1, v1) = pair[1];
        if az_obj >= az0 && az_obj <= az1 {
            let span = az1 - az0;
            let t = if span.abs() < f32::EPSILON {
                0.0
            } else {
                (az_obj - az0) / span
            };
            return v0 + t * (v1 - v0);
        }
    }
    unreachable!("az bracket not found despite being within slice envelope bounds")
}

fn round_key(v: f32) -> i32 {
    (v * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(altitude: f32, az_obj: f32, az_dome: f32) -> AbaqueSample {
        AbaqueSample {
            altitude,
            az_obj,
            az_dome,
        }
    }

    fn grid() -> Vec<AbaqueSample> {
        vec![
            sample(30.0, 0.0, 1.0),
            sample(30.0, 90.0, 92.0),
            sample(30.0, 180.0, 183.0),
            sample(60.0, 0.0, 2.0),
            sample(60.0, 90.0, 95.0),
            sample(60.0, 180.0, 188.0),
        ]
    }

    #[test]
    fn reproduces_measured_samples_exactly() {
        let ab = Abaque::build(&grid());
        for s in grid() {
            let v = ab.query(s.altitude, s.az_obj);
            assert!((v - s.az_dome).abs() < 1e-4, "{:?} -> {}", s, v);
        }
    }

    #[test]
    fn bilinear_interpolates_between_grid_points() {
        let ab = Abaque::build(&grid());
        // Halfway in both alt and az: average of the four corners.
        let v = ab.query(45.0, 45.0);
        let expected = (1.0 + 92.0 + 2.0 + 95.0) / 4.0;
        assert!((v - expected).abs() < 1e-3, "got {v}, expected {expected}");
    }

    #[test]
    fn clamps_outside_envelope() {
        let ab = Abaque::build(&grid());
        assert_eq!(ab.query(90.0, 0.0), ab.query(60.0, 0.0));
        assert_eq!(ab.query(0.0, 0.0), ab.query(30.0, 0.0));
        assert_eq!(ab.query(45.0, -10.0), ab.query(45.0, 0.0));
    }

    #[test]
    fn query_is_cached_for_rounded_inputs() {
        let ab = Abaque::build(&grid());
        let v1 = ab.query(45.001, 45.001);
        let v2 = ab.query(45.004, 45.002);
        assert_eq!(v1, v2);
    }

    #[test]
    fn empty_table_is_identity() {
        let ab = Abaque::build(&[]);
        assert_eq!(ab.query(45.0, 123.0), 123.0);
    }
}
