pub mod proximity;
pub mod spatial;

// Re-export the main types
pub use self::proximity::{haversine_distance, MatchDecision, ProximityMatcher, EARTH_RADIUS_M};
pub use self::spatial::AnchorIndex;
