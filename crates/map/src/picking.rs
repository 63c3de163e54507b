use foundation::geo::{LngLat, ScreenPoint, Viewport, polygon_contains};

use crate::feature::Geometry;
use crate::style::LayerKind;

/// Hit radius for symbol layers, in screen pixels.
pub const SYMBOL_HIT_PX: f64 = 10.0;
/// Extra slack around line layers, in screen pixels.
pub const LINE_HIT_PX: f64 = 3.0;
pub const DEFAULT_CIRCLE_RADIUS_PX: f64 = 5.0;

/// Whether a feature of `kind` rendered with `geometry` is under `point`.
///
/// - Fill layers hit when the point is inside a polygon, holes excluded.
/// - Circle and symbol layers hit within `radius_px` of a point geometry.
/// - Line layers hit within `radius_px` of any line or polygon ring.
/// - Raster layers are never hit through a feature.
pub fn hits(
    kind: LayerKind,
    geometry: &Geometry,
    viewport: &Viewport,
    point: ScreenPoint,
    radius_px: f64,
) -> bool {
    match kind {
        LayerKind::Fill => {
            let at = viewport.to_lnglat(point);
            geometry
                .polygons()
                .iter()
                .any(|rings| polygon_contains(rings, at))
        }
        LayerKind::Circle | LayerKind::Symbol => geometry
            .points()
            .into_iter()
            .any(|p| viewport.to_screen(p).distance(point) <= radius_px),
        LayerKind::Line => {
            let mut paths = geometry.lines();
            for poly in geometry.polygons() {
                paths.extend(poly);
            }
            paths
                .iter()
                .any(|path| path_distance(viewport, path, point) <= radius_px)
        }
        LayerKind::Raster => false,
    }
}

fn path_distance(viewport: &Viewport, path: &[LngLat], point: ScreenPoint) -> f64 {
    let screen: Vec<ScreenPoint> = path.iter().map(|p| viewport.to_screen(*p)).collect();
    match screen.as_slice() {
        [] => f64::INFINITY,
        [only] => only.distance(point),
        _ => screen
            .windows(2)
            .map(|w| segment_distance(w[0], w[1], point))
            .fold(f64::INFINITY, f64::min),
    }
}

fn segment_distance(a: ScreenPoint, b: ScreenPoint, p: ScreenPoint) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return a.distance(p);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    ScreenPoint::new(a.x + t * dx, a.y + t * dy).distance(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_with_hole() -> Geometry {
        let ring = |lo: f64, hi: f64| {
            vec![
                LngLat::new(lo, lo),
                LngLat::new(hi, lo),
                LngLat::new(hi, hi),
                LngLat::new(lo, hi),
                LngLat::new(lo, lo),
            ]
        };
        Geometry::polygon(vec![ring(-1.0, 1.0), ring(-0.2, 0.2)])
    }

    #[test]
    fn fill_hits_exclude_holes() {
        let vp = Viewport::new(LngLat::new(0.0, 0.0), 6.0, 800.0, 600.0);
        let geom = square_with_hole();
        let inside = vp.to_screen(LngLat::new(0.5, 0.5));
        let in_hole = vp.to_screen(LngLat::new(0.0, 0.0));
        let outside = vp.to_screen(LngLat::new(2.0, 2.0));
        assert!(hits(LayerKind::Fill, &geom, &vp, inside, 0.0));
        assert!(!hits(LayerKind::Fill, &geom, &vp, in_hole, 0.0));
        assert!(!hits(LayerKind::Fill, &geom, &vp, outside, 0.0));
    }

    #[test]
    fn circles_hit_within_pixel_radius() {
        let vp = Viewport::new(LngLat::new(0.0, 0.0), 10.0, 800.0, 600.0);
        let geom = Geometry::point(LngLat::new(0.0, 0.0));
        let center = vp.to_screen(LngLat::new(0.0, 0.0));
        let near = ScreenPoint::new(center.x + 4.0, center.y);
        let far = ScreenPoint::new(center.x + 12.0, center.y);
        assert!(hits(LayerKind::Circle, &geom, &vp, near, 5.0));
        assert!(!hits(LayerKind::Circle, &geom, &vp, far, 5.0));
        assert!(hits(LayerKind::Symbol, &geom, &vp, far, 12.0));
    }

    #[test]
    fn outlines_hit_near_the_ring_only() {
        let vp = Viewport::new(LngLat::new(0.0, 0.0), 6.0, 800.0, 600.0);
        let geom = square_with_hole();
        let edge = vp.to_screen(LngLat::new(1.0, 0.5));
        let interior = vp.to_screen(LngLat::new(0.5, 0.5));
        assert!(hits(LayerKind::Line, &geom, &vp, edge, LINE_HIT_PX));
        assert!(!hits(LayerKind::Line, &geom, &vp, interior, LINE_HIT_PX));
    }

    #[test]
    fn raster_has_no_feature_hits() {
        let vp = Viewport::new(LngLat::new(0.0, 0.0), 6.0, 800.0, 600.0);
        let geom = Geometry::point(LngLat::new(0.0, 0.0));
        assert!(!hits(LayerKind::Raster, &geom, &vp, ScreenPoint::new(400.0, 300.0), 100.0));
    }
}
