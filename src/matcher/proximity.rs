use std::collections::BTreeMap;

use log::trace;

use crate::config::subsystems::MatcherConfig;
use crate::matcher::spatial::AnchorIndex;
use crate::types::{Cluster, ClusterId, Coordinate};

/// Mean earth radius (IUGG) in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two coordinates in meters
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Outcome of matching a sample location against the known clusters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchDecision {
    Existing { cluster_id: ClusterId, distance_m: f64 },
    CreateNew,
}

/// Assigns sample locations to the nearest cluster anchor within the proximity radius
#[derive(Debug)]
pub struct ProximityMatcher {
    radius_m: f64,
    index: Option<AnchorIndex>,
}

impl ProximityMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            radius_m: config.proximity_radius_m,
            index: config.use_spatial_index.then(AnchorIndex::new),
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn uses_spatial_index(&self) -> bool {
        self.index.is_some()
    }

    /// Reindex every anchor, used after the cluster set is replaced wholesale
    pub fn rebuild(&mut self, clusters: &BTreeMap<ClusterId, Cluster>) {
        if let Some(index) = self.index.as_mut() {
            *index = AnchorIndex::bulk_load(clusters.iter().map(|(id, c)| (*id, c.anchor())));
        }
    }

    pub fn register(&mut self, cluster_id: ClusterId, anchor: Coordinate) {
        if let Some(index) = self.index.as_mut() {
            index.insert(cluster_id, anchor);
        }
    }

    /// Nearest cluster whose anchor lies within the radius. Equal distances go to the lower id.
    pub fn locate(&self, clusters: &BTreeMap<ClusterId, Cluster>, location: Coordinate) -> MatchDecision {
        let candidates = self
            .index
            .as_ref()
            .and_then(|index| index.candidates(location, self.radius_m));

        let best = match candidates {
            Some(ids) => {
                trace!("Spatial index returned {} candidate(s) for {}", ids.len(), location);
                self.nearest(
                    ids.into_iter()
                        .filter_map(|id| clusters.get(&id).map(|c| (id, c.anchor()))),
                    location,
                )
            }
            None => self.nearest(clusters.iter().map(|(id, c)| (*id, c.anchor())), location),
        };

        match best {
            Some((cluster_id, distance_m)) => MatchDecision::Existing { cluster_id, distance_m },
            None => MatchDecision::CreateNew,
        }
    }

    fn nearest<I>(&self, anchors: I, location: Coordinate) -> Option<(ClusterId, f64)>
    where
        I: Iterator<Item = (ClusterId, Coordinate)>,
    {
        let mut best: Option<(ClusterId, f64)> = None;
        for (id, anchor) in anchors {
            let distance = haversine_distance(anchor, location);
            if distance > self.radius_m {
                continue;
            }
            best = match best {
                Some((best_id, best_distance))
                    if best_distance < distance || (best_distance == distance && best_id < id) =>
                {
                    Some((best_id, best_distance))
                }
                _ => Some((id, distance)),
            };
        }
        best
    }
}
