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

// External astronomy/catalog boundary. Live SIMBAD lookup and a real
// RA/Dec→Alt/Az ephemeris are out of scope; this module defines only the
// narrow trait boundary the Tracking Engine consumes, as an explicit
// owning-handle / trait value rather than a process-wide singleton.

use crate::config::SiteConfig;
use crate::error::TrackingFault;
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedObject {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub is_planet: bool,
    pub object_type: Option<String>,
}

/// Horizontal coordinates: azimuth and altitude, both in degrees.
pub type Horizontal = (f32, f32);

pub trait CatalogProvider: Send + Sync {
    fn resolve_object(&self, name: &str) -> Result<ResolvedObject, TrackingFault>;

    fn horizontal_from_equatorial(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        site: &SiteConfig,
        time: DateTime<Utc>,
    ) -> Horizontal;

    fn planet_horizontal(&self, planet_name: &str, site: &SiteConfig, time: DateTime<Utc>) -> Horizontal;
}

/// Minimal built-in catalog using a GMST-based equatorial-to-horizontal
/// conversion: objects are a fixed name/RA/Dec table loaded from
/// configuration (`[[catalog.objects]]`) rather than a live SIMBAD lookup,
/// and planets use the same fixed coordinates as stars instead of a real
/// ephemeris, both accepted simplifications of the external-astronomy
/// boundary; see DESIGN.md.
pub struct StaticCatalog {
    objects: std::collections::HashMap<String, ResolvedObject>,
}

impl StaticCatalog {
    pub fn new(objects: &[crate::config::CatalogObject]) -> StaticCatalog {
        let objects = objects
            .iter()
            .map(|o| {
                (
                    o.name.clone(),
                    ResolvedObject {
                        ra_deg: o.ra_deg,
                        dec_deg: o.dec_deg,
                        is_planet: o.is_planet,
                        object_type: None,
                    },
                )
            })
            .collect();
        StaticCatalog { objects }
    }

    fn convert(&self, ra_deg: f64, dec_deg: f64, site: &SiteConfig, time: DateTime<Utc>) -> Horizontal {
        gmst_horizontal(site.latitude.to_radians(), site.longitude.to_radians(), ra_deg.to_radians(), dec_deg.to_radians(), time)
    }
}

impl CatalogProvider for StaticCatalog {
    fn resolve_object(&self, name: &str) -> Result<ResolvedObject, TrackingFault> {
        self.objects.get(name).cloned().ok_or_else(|| TrackingFault::ObjectNotFound(name.to_string()))
    }

    fn horizontal_from_equatorial(&self, ra_deg: f64, dec_deg: f64, site: &SiteConfig, time: DateTime<Utc>) -> Horizontal {
        self.convert(ra_deg, dec_deg, site, time)
    }

    fn planet_horizontal(&self, planet_name: &str, site: &SiteConfig, time: DateTime<Utc>) -> Horizontal {
        match self.objects.get(planet_name) {
            Some(obj) => self.convert(obj.ra_deg, obj.dec_deg, site, time),
            None => (0.0, 0.0),
        }
    }
}

/// Julian day for `when`, reckoned from J2000.0.
fn julian_day(when: DateTime<Utc>) -> f64 {
    let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
    let diff = when.signed_duration_since(j2000);
    2451545.0 + (diff.num_milliseconds() as f64 / 86_400_000.0)
}

/// Greenwich Mean Sidereal Time, in radians.
fn gmst(when: DateTime<Utc>) -> f64 {
    use std::f64::consts::PI;
    let jd = julian_day(when);
    let jd0 = jd.floor() + 0.5;
    let h = (jd - jd0) * 24.0;
    let dtt = jd - 2451545.0;
    let dut = jd0 - 2451545.0;
    let t = dtt / 36525.0;
    let gmst = (6.697375 + 0.065709824279 * dut + 1.0027379 * h + 0.0000258 * t * t) % 24.0;
    gmst * PI / 12.0
}

/// Equatorial (ra, dec, radians) to horizontal (az, alt, degrees) at
/// `(lat, lon)` radians and `time`.
fn gmst_horizontal(lat: f64, lon: f64, ra: f64, dec: f64, time: DateTime<Utc>) -> Horizontal {
    use std::f64::consts::PI;
    let lha = (gmst(time) - ra).to_radians() * (15.0 * 12.0 / PI) + lon;
    let alt = (lha.cos() * dec.cos() * lat.cos() + dec.sin() * lat.sin()).asin();
    let az = (-lha.sin()).atan2(dec.tan() * lat.cos() - lat.sin() * lha.cos());
    let az = ((az % (2.0 * PI)) + 2.0 * PI) % (2.0 * PI);
    (az.to_degrees() as f32, alt.to_degrees() as f32)
}

/// Computes current horizontal coordinates for an already-resolved object:
/// planets recompute RA/Dec each step, stars use fixed J2000 values supplied
/// at session start.
pub fn current_horizontal(
    catalog: &dyn CatalogProvider,
    object: &ResolvedObject,
    object_name: &str,
    site: &SiteConfig,
    now: DateTime<Utc>,
) -> Horizontal {
    if object.is_planet {
        catalog.planet_horizontal(object_name, site, now)
    } else {
        catalog.horizontal_from_equatorial(object.ra_deg, object.dec_deg, site, now)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A deterministic stand-in catalog for tests: objects resolve to fixed
    /// coordinates, and horizontal conversion is a caller-supplied function
    /// rather than real spherical astronomy.
    pub struct StubCatalog {
        objects: HashMap<String, ResolvedObject>,
        horizontal: Mutex<Box<dyn FnMut(f64, f64, DateTime<Utc>) -> Horizontal + Send>>,
    }

    impl StubCatalog {
        pub fn new() -> Self {
            StubCatalog {
                objects: HashMap::new(),
                horizontal: Mutex::new(Box::new(|_, _, _| (0.0, 45.0))),
            }
        }

        pub fn with_object(mut self, name: &str, obj: ResolvedObject) -> Self {
            self.objects.insert(name.to_string(), obj);
            self
        }

        pub fn with_horizontal(self, f: impl FnMut(f64, f64, DateTime<Utc>) -> Horizontal + Send + 'static) -> Self {
            *self.horizontal.lock().unwrap() = Box::new(f);
            self
        }
    }

    impl CatalogProvider for StubCatalog {
        fn resolve_object(&self, name: &str) -> Result<ResolvedObject, TrackingFault> {
            self.objects
                .get(name)
                .cloned()
                .ok_or_else(|| TrackingFault::ObjectNotFound(name.to_string()))
        }

        fn horizontal_from_equatorial(
            &self,
            ra_deg: f64,
            dec_deg: f64,
            _site: &SiteConfig,
            time: DateTime<Utc>,
        ) -> Horizontal {
            (self.horizontal.lock().unwrap())(ra_deg, dec_deg, time)
        }

        fn planet_horizontal(&self, _planet_name: &str, _site: &SiteConfig, time: DateTime<Utc>) -> Horizontal {
            (self.horizontal.lock().unwrap())(0.0, 0.0, time)
        }
    }
}

#[cfg(test)]
mod static_catalog_tests {
    use super::*;
    use crate::config::CatalogObject;

    fn site() -> SiteConfig {
        SiteConfig {
            latitude: 44.0,
            longitude: 5.0,
            altitude: 600.0,
            tz_offset: 0.0,
        }
    }

    #[test]
    fn resolves_configured_objects() {
        let catalog = StaticCatalog::new(&[CatalogObject {
            name: "M13".into(),
            ra_deg: 250.4,
            dec_deg: 36.5,
            is_planet: false,
        }]);
        let resolved = catalog.resolve_object("M13").unwrap();
        assert_eq!(resolved.ra_deg, 250.4);
        assert!(!resolved.is_planet);
    }

    #[test]
    fn unknown_object_is_rejected() {
        let catalog = StaticCatalog::new(&[]);
        assert!(catalog.resolve_object("nope").is_err());
    }

    #[test]
    fn horizontal_conversion_produces_finite_coordinates() {
        let catalog = StaticCatalog::new(&[]);
        let (az, alt) = catalog.horizontal_from_equatorial(250.4, 36.5, &site(), Utc::now());
        assert!(az.is_finite() && (0.0..360.0).contains(&az));
        assert!(alt.is_finite() && (-90.0..=90.0).contains(&alt));
    }
}
