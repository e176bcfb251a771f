use std::f64::consts::FRAC_PI_2;

use rstar::{RTree, RTreeObject, AABB};

use crate::matcher::proximity::EARTH_RADIUS_M;
use crate::types::{ClusterId, Coordinate};

// Widens search envelopes so anchors sitting exactly on the radius survive float rounding
const ENVELOPE_SLACK_DEG: f64 = 1e-9;

/// Cluster anchor placed in (longitude, latitude) degree space for R-tree indexing
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorPoint {
    pub cluster_id: ClusterId,
    pub longitude: f64,
    pub latitude: f64,
}

impl RTreeObject for AnchorPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.longitude, self.latitude])
    }
}

/// R-tree over cluster anchors. Only narrows candidates; exact distance checks stay with the caller.
pub struct AnchorIndex {
    tree: RTree<AnchorPoint>,
}

impl std::fmt::Debug for AnchorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorIndex")
            .field("anchors", &self.tree.size())
            .finish()
    }
}

impl Default for AnchorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Builds the index in one pass; bulk loading gives a better balanced tree than repeated inserts
    pub fn bulk_load<I>(anchors: I) -> Self
    where
        I: IntoIterator<Item = (ClusterId, Coordinate)>,
    {
        let points: Vec<AnchorPoint> = anchors
            .into_iter()
            .map(|(cluster_id, c)| AnchorPoint {
                cluster_id,
                longitude: c.longitude,
                latitude: c.latitude,
            })
            .collect();
        Self { tree: RTree::bulk_load(points) }
    }

    pub fn insert(&mut self, cluster_id: ClusterId, anchor: Coordinate) {
        self.tree.insert(AnchorPoint {
            cluster_id,
            longitude: anchor.longitude,
            latitude: anchor.latitude,
        });
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Ids of anchors inside the bounding box of the spherical cap around `center`.
    ///
    /// Returns `None` when the cap touches a pole or wraps the antimeridian; the box
    /// cannot be expressed as a single envelope there and the caller has to scan.
    pub fn candidates(&self, center: Coordinate, radius_m: f64) -> Option<Vec<ClusterId>> {
        let envelope = search_envelope(center, radius_m)?;
        Some(
            self.tree
                .locate_in_envelope_intersecting(&envelope)
                .map(|p| p.cluster_id)
                .collect(),
        )
    }
}

/// Degree-space box enclosing every point within `radius_m` of `center`
pub fn search_envelope(center: Coordinate, radius_m: f64) -> Option<AABB<[f64; 2]>> {
    let angular = radius_m / EARTH_RADIUS_M;
    let lat = center.latitude.to_radians();
    let lon = center.longitude.to_radians();

    let min_lat = lat - angular;
    let max_lat = lat + angular;
    if min_lat <= -FRAC_PI_2 || max_lat >= FRAC_PI_2 {
        return None;
    }

    let ratio = angular.sin() / lat.cos();
    if !ratio.is_finite() || ratio >= 1.0 {
        return None;
    }
    let delta_lon = ratio.asin();
    let min_lon = (lon - delta_lon).to_degrees() - ENVELOPE_SLACK_DEG;
    let max_lon = (lon + delta_lon).to_degrees() + ENVELOPE_SLACK_DEG;
    if min_lon < -180.0 || max_lon > 180.0 {
        return None;
    }

    Some(AABB::from_corners(
        [min_lon, min_lat.to_degrees() - ENVELOPE_SLACK_DEG],
        [max_lon, max_lat.to_degrees() + ENVELOPE_SLACK_DEG],
    ))
}
