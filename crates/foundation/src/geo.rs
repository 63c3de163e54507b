//! Geographic primitives shared by the map host and layer components.
//!
//! Coordinates are WGS84 longitude/latitude in degrees. Screen space follows
//! the web-mercator convention used by slippy maps: a 512 px world tile at
//! zoom 0, doubling per zoom level, y growing downward.

use serde::{Deserialize, Serialize};

/// Kilometers per degree of arc on the equator, used for planar offsets.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Size in pixels of the whole world at zoom 0.
pub const WORLD_TILE_SIZE: f64 = 512.0;

/// Web-mercator latitude limit.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Planar distance in degrees. Only meaningful for small separations.
    pub fn degree_distance(&self, other: LngLat) -> f64 {
        let dx = self.lng - other.lng;
        let dy = self.lat - other.lat;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(v: LngLat) -> Self {
        [v.lng, v.lat]
    }
}

/// Pixel position, either in screen space (relative to the viewport's top
/// left corner) or in mercator world space.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: ScreenPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Size of the mercator world in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    WORLD_TILE_SIZE * zoom.exp2()
}

/// Projects a coordinate into mercator world pixels at `zoom`.
pub fn project(p: LngLat, zoom: f64) -> ScreenPoint {
    let ws = world_size(zoom);
    let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (p.lng + 180.0) / 360.0 * ws;
    let y = (1.0 - (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln() / std::f64::consts::PI)
        / 2.0
        * ws;
    ScreenPoint::new(x, y)
}

/// Inverse of [`project`].
pub fn unproject(p: ScreenPoint, zoom: f64) -> LngLat {
    let ws = world_size(zoom);
    let lng = p.x / ws * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * p.y / ws);
    let lat = n.sinh().atan().to_degrees();
    LngLat::new(lng, lat)
}

/// Camera over a fixed-size viewport.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LngLat,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(center: LngLat, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    pub fn to_screen(&self, p: LngLat) -> ScreenPoint {
        let c = project(self.center, self.zoom);
        let w = project(p, self.zoom);
        ScreenPoint::new(
            w.x - c.x + self.width / 2.0,
            w.y - c.y + self.height / 2.0,
        )
    }

    pub fn to_lnglat(&self, p: ScreenPoint) -> LngLat {
        let c = project(self.center, self.zoom);
        unproject(
            ScreenPoint::new(
                p.x + c.x - self.width / 2.0,
                p.y + c.y - self.height / 2.0,
            ),
            self.zoom,
        )
    }
}

/// Axis-aligned geographic bounds.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub min: LngLat,
    pub max: LngLat,
}

impl LngLatBounds {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LngLat>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = *it.next()?;
        let mut b = Self {
            min: first,
            max: first,
        };
        for p in it {
            b.min.lng = b.min.lng.min(p.lng);
            b.min.lat = b.min.lat.min(p.lat);
            b.max.lng = b.max.lng.max(p.lng);
            b.max.lat = b.max.lat.max(p.lat);
        }
        Some(b)
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.min.lng && p.lng <= self.max.lng && p.lat >= self.min.lat && p.lat <= self.max.lat
    }
}

/// Even-odd point-in-ring test. The ring may or may not repeat its first
/// vertex at the end.
pub fn ring_contains(ring: &[LngLat], p: LngLat) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x = (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng;
            if p.lng < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Polygon test: inside the outer ring and outside every hole.
pub fn polygon_contains(rings: &[Vec<LngLat>], p: LngLat) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if !ring_contains(outer, p) {
        return false;
    }
    !rings[1..].iter().any(|hole| ring_contains(hole, p))
}
