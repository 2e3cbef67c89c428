//! Coordinate reference systems understood by the pipeline.
//!
//! Everything downstream works in EPSG:2285 (NAD83 / Washington North, US
//! survey feet). Payloads in geographic or web-mercator coordinates are
//! projected into it once, at the client boundary.
use anyhow::{anyhow, Result};
use geo::{Coord, Geometry, MapCoords};

/// EPSG code of the canonical planar CRS.
pub const CANONICAL_EPSG: u32 = 2285;

const US_SURVEY_FOOT_M: f64 = 1200.0 / 3937.0;
const GRS80_A: f64 = 6_378_137.0;
const GRS80_INV_F: f64 = 298.257_222_101;
const WEB_MERCATOR_R: f64 = 6_378_137.0;

// EPSG:2285 Lambert conformal conic (2SP) parameters.
const LAT_1: f64 = 48.0 + 44.0 / 60.0;
const LAT_2: f64 = 47.5;
const LAT_0: f64 = 47.0;
const LON_0: f64 = -(120.0 + 50.0 / 60.0);
const FALSE_EASTING_M: f64 = 500_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    WashingtonNorthFt,
    Geographic,
    WebMercator,
}

impl Crs {
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            2285 => Some(Crs::WashingtonNorthFt),
            4326 | 4269 => Some(Crs::Geographic),
            3857 | 102100 | 102113 => Some(Crs::WebMercator),
            _ => None,
        }
    }
}

struct Lcc {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
}

impl Lcc {
    fn washington_north() -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e = (2.0 * f - f * f).sqrt();
        let m1 = lcc_m(LAT_1.to_radians(), e);
        let m2 = lcc_m(LAT_2.to_radians(), e);
        let t1 = lcc_t(LAT_1.to_radians(), e);
        let t2 = lcc_t(LAT_2.to_radians(), e);
        let t0 = lcc_t(LAT_0.to_radians(), e);
        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let af = GRS80_A * m1 / (n * t1.powf(n));
        let rho0 = af * t0.powf(n);
        Self { e, n, af, rho0 }
    }

    /// Longitude/latitude in degrees to easting/northing in US feet.
    fn forward(&self, lon: f64, lat: f64) -> Coord<f64> {
        let rho = self.af * lcc_t(lat.to_radians(), self.e).powf(self.n);
        let theta = self.n * (lon - LON_0).to_radians();
        let x_m = rho * theta.sin() + FALSE_EASTING_M;
        let y_m = self.rho0 - rho * theta.cos();
        Coord {
            x: x_m / US_SURVEY_FOOT_M,
            y: y_m / US_SURVEY_FOOT_M,
        }
    }

    /// Easting/northing in US feet to longitude/latitude in degrees.
    fn inverse(&self, x_ft: f64, y_ft: f64) -> Coord<f64> {
        let x = x_ft * US_SURVEY_FOOT_M - FALSE_EASTING_M;
        let y = self.rho0 - y_ft * US_SURVEY_FOOT_M;
        let rho = self.n.signum() * (x * x + y * y).sqrt();
        let theta = x.atan2(y);
        let t = (rho / self.af).powf(1.0 / self.n);
        let mut phi = std::f64::consts::FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = self.e * phi.sin();
            let next = std::f64::consts::FRAC_PI_2
                - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            if (next - phi).abs() < 1e-12 {
                phi = next;
                break;
            }
            phi = next;
        }
        Coord {
            x: (theta / self.n).to_degrees() + LON_0,
            y: phi.to_degrees(),
        }
    }
}

fn lcc_m(phi: f64, e: f64) -> f64 {
    phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
}

fn lcc_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

fn web_mercator_to_lonlat(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / WEB_MERCATOR_R).to_degrees(),
        y: (2.0 * (c.y / WEB_MERCATOR_R).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    }
}

/// Project a geometry from `source_epsg` into the canonical CRS.
pub fn to_canonical(geometry: &Geometry<f64>, source_epsg: u32) -> Result<Geometry<f64>> {
    let crs = Crs::from_epsg(source_epsg)
        .ok_or_else(|| anyhow!("unsupported source CRS EPSG:{source_epsg}"))?;
    Ok(match crs {
        Crs::WashingtonNorthFt => geometry.clone(),
        Crs::Geographic => {
            let lcc = Lcc::washington_north();
            geometry.map_coords(|c| lcc.forward(c.x, c.y))
        }
        Crs::WebMercator => {
            let lcc = Lcc::washington_north();
            geometry.map_coords(|c| {
                let ll = web_mercator_to_lonlat(c);
                lcc.forward(ll.x, ll.y)
            })
        }
    })
}

/// Canonical coordinates back to WGS84 longitude/latitude.
pub fn canonical_to_lonlat(c: Coord<f64>) -> Coord<f64> {
    Lcc::washington_north().inverse(c.x, c.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn projection_origin_maps_to_false_easting() {
        let projected = to_canonical(&Geometry::Point(Point::new(LON_0, LAT_0)), 4326).unwrap();
        let Geometry::Point(p) = projected else {
            panic!("expected point");
        };
        assert!((p.x() - 1_640_416.667).abs() < 0.01, "x = {}", p.x());
        assert!(p.y().abs() < 1e-6, "y = {}", p.y());
    }

    #[test]
    fn inverse_recovers_everett_coordinates() {
        let lcc = Lcc::washington_north();
        let projected = lcc.forward(-122.2021, 47.9790);
        let back = canonical_to_lonlat(projected);
        assert!((back.x + 122.2021).abs() < 1e-8);
        assert!((back.y - 47.9790).abs() < 1e-8);
    }

    #[test]
    fn web_mercator_goes_through_geographic() {
        let lcc = Lcc::washington_north();
        let lon: f64 = -122.0;
        let lat: f64 = 48.0;
        let merc = Coord {
            x: WEB_MERCATOR_R * lon.to_radians(),
            y: WEB_MERCATOR_R * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
        };
        let projected = to_canonical(&Geometry::Point(Point::from(merc)), 3857).unwrap();
        let expected = lcc.forward(lon, lat);
        let Geometry::Point(p) = projected else {
            panic!("expected point");
        };
        assert!((p.x() - expected.x).abs() < 1e-4);
        assert!((p.y() - expected.y).abs() < 1e-4);
    }

    #[test]
    fn unknown_crs_is_rejected() {
        let point = Geometry::Point(Point::new(1.0, 2.0));
        assert!(to_canonical(&point, 32610).is_err());
        assert_eq!(to_canonical(&point, 2285).unwrap(), point);
    }
}
