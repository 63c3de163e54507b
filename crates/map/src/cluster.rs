//! Screen-space point clustering for GeoJSON sources.
//!
//! Points are projected into mercator world pixels at the integer zoom and
//! merged greedily: each unassigned point, in input order, absorbs every
//! other unassigned point within `radius_px`. Above `max_zoom` nothing is
//! clustered.

use foundation::geo::{LngLat, ScreenPoint, project, unproject};
use serde::Serialize;

pub const DEFAULT_CLUSTER_RADIUS_PX: f64 = 50.0;
pub const DEFAULT_CLUSTER_MAX_ZOOM: u8 = 12;

const ZOOM_BITS: u32 = 5;

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct ClusterOptions {
    pub radius_px: f64,
    pub max_zoom: u8,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_CLUSTER_RADIUS_PX,
            max_zoom: DEFAULT_CLUSTER_MAX_ZOOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Encodes the zoom it was formed at and its seed point.
    pub id: u64,
    pub center: LngLat,
    /// Indices into the clustered input, seed first.
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn point_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode {
    Cluster(Cluster),
    Point(usize),
}

pub fn cluster_id(zoom: u8, seed: usize) -> u64 {
    ((seed as u64) << ZOOM_BITS) | u64::from(zoom)
}

pub fn decode_cluster_id(id: u64) -> (u8, usize) {
    ((id & ((1 << ZOOM_BITS) - 1)) as u8, (id >> ZOOM_BITS) as usize)
}

/// Clusters `points` for display at `zoom`.
pub fn cluster_points(points: &[LngLat], zoom: f64, opts: &ClusterOptions) -> Vec<ClusterNode> {
    let z = zoom.floor().max(0.0) as u8;
    if z > opts.max_zoom {
        return (0..points.len()).map(ClusterNode::Point).collect();
    }

    let projected: Vec<ScreenPoint> = points.iter().map(|p| project(*p, f64::from(z))).collect();
    let mut assigned = vec![false; points.len()];
    let mut out = Vec::new();

    for seed in 0..points.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];
        for other in (seed + 1)..points.len() {
            if !assigned[other] && projected[seed].distance(projected[other]) <= opts.radius_px {
                assigned[other] = true;
                members.push(other);
            }
        }

        if members.len() == 1 {
            out.push(ClusterNode::Point(seed));
            continue;
        }

        let n = members.len() as f64;
        let (sx, sy) = members.iter().fold((0.0, 0.0), |(sx, sy), &i| {
            (sx + projected[i].x, sy + projected[i].y)
        });
        out.push(ClusterNode::Cluster(Cluster {
            id: cluster_id(z, seed),
            center: unproject(ScreenPoint::new(sx / n, sy / n), f64::from(z)),
            members,
        }));
    }
    out
}

/// Finds the cluster with `id` among `points`, re-clustering at its zoom.
pub fn find_cluster(points: &[LngLat], id: u64, opts: &ClusterOptions) -> Option<Cluster> {
    let (z, _) = decode_cluster_id(id);
    cluster_points(points, f64::from(z), opts)
        .into_iter()
        .find_map(|n| match n {
            ClusterNode::Cluster(c) if c.id == id => Some(c),
            _ => None,
        })
}

/// Smallest zoom at which the cluster `id` no longer holds all of its
/// members together. Capped at `max_zoom + 1`, where clustering stops.
pub fn expansion_zoom(points: &[LngLat], id: u64, opts: &ClusterOptions) -> Option<u8> {
    let cluster = find_cluster(points, id, opts)?;
    let (z, _) = decode_cluster_id(id);
    let subset: Vec<LngLat> = cluster.members.iter().map(|&i| points[i]).collect();

    for next in (z + 1)..=opts.max_zoom {
        let nodes = cluster_points(&subset, f64::from(next), opts);
        let still_whole = nodes.iter().any(|n| match n {
            ClusterNode::Cluster(c) => c.point_count() == subset.len(),
            ClusterNode::Point(_) => false,
        });
        if !still_whole {
            return Some(next);
        }
    }
    Some(opts.max_zoom.saturating_add(1))
}
