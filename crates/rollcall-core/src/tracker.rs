//! Three-tier face track registry with spatial identity merging.
//!
//! A track is the time-bounded record of one physical face. Recognized
//! detections are keyed by student ID (identity takes precedence over
//! position); below-threshold and unrecognized detections are merged
//! spatially across frames via a pluggable [`TrackMatcher`]. Tiers never
//! cross-match: the same face may briefly exist as a stale unrecognized
//! track and a fresh recognized one until the sweep removes the former.

use crate::types::{BoundingBox, Tier};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One live track: estimated position and identity confidence for a face.
///
/// Invariant: `tier == Recognized` implies `student_id` is `Some` and
/// non-empty.
#[derive(Debug, Clone)]
pub struct Track {
    pub tier: Tier,
    pub label: String,
    pub student_id: Option<String>,
    pub similarity: Option<f32>,
    pub bbox: BoundingBox,
    pub last_seen: Instant,
}

/// A single inbound detection, already classified into a tier.
#[derive(Debug, Clone)]
pub enum Observation {
    Recognized {
        student_id: String,
        label: String,
        similarity: f32,
        bbox: BoundingBox,
    },
    BelowThreshold {
        label: String,
        similarity: f32,
        bbox: BoundingBox,
    },
    Unrecognized {
        bbox: BoundingBox,
    },
}

/// Strategy for deciding whether a new detection denotes an existing track.
pub trait TrackMatcher: Send {
    fn same_track(&self, a: &BoundingBox, b: &BoundingBox) -> bool;
}

/// Default matcher: centers within a fixed radius are the same face.
pub struct CentroidMatcher {
    pub radius_px: f32,
}

impl Default for CentroidMatcher {
    fn default() -> Self {
        Self { radius_px: 30.0 }
    }
}

impl TrackMatcher for CentroidMatcher {
    fn same_track(&self, a: &BoundingBox, b: &BoundingBox) -> bool {
        a.center_distance(b) < self.radius_px
    }
}

/// Keyed, time-windowed registry of observed faces.
///
/// Mutated only by the event-handling path; the render path reads cloned
/// snapshots, so no internal locking is needed.
pub struct Tracker {
    matcher: Box<dyn TrackMatcher>,
    ttl: Duration,
    recognized: HashMap<String, Track>,
    below_threshold: HashMap<u64, Track>,
    unrecognized: HashMap<u64, Track>,
    next_spatial_id: u64,
}

impl Tracker {
    pub fn new(matcher: Box<dyn TrackMatcher>, ttl: Duration) -> Self {
        Self {
            matcher,
            ttl,
            recognized: HashMap::new(),
            below_threshold: HashMap::new(),
            unrecognized: HashMap::new(),
            next_spatial_id: 0,
        }
    }

    /// Fold one detection into the registry, creating or updating a track.
    pub fn observe(&mut self, obs: Observation, now: Instant) {
        match obs {
            Observation::Recognized {
                student_id,
                label,
                similarity,
                bbox,
            } => {
                // Recognized identity takes precedence over position:
                // the key is the student ID, not a spatial ID.
                let entry = self
                    .recognized
                    .entry(student_id.clone())
                    .or_insert_with(|| Track {
                        tier: Tier::Recognized,
                        label: label.clone(),
                        student_id: Some(student_id),
                        similarity: None,
                        bbox,
                        last_seen: now,
                    });
                entry.label = label;
                entry.similarity = Some(similarity);
                entry.bbox = bbox;
                entry.last_seen = now;
            }
            Observation::BelowThreshold {
                label,
                similarity,
                bbox,
            } => {
                match Self::match_spatial(&mut self.below_threshold, self.matcher.as_ref(), &bbox)
                {
                    Some(t) => {
                        t.label = label;
                        t.similarity = Some(similarity);
                        t.bbox = bbox;
                        t.last_seen = now;
                    }
                    None => {
                        let id = self.next_spatial_id;
                        self.next_spatial_id += 1;
                        self.below_threshold.insert(
                            id,
                            Track {
                                tier: Tier::BelowThreshold,
                                label,
                                student_id: None,
                                similarity: Some(similarity),
                                bbox,
                                last_seen: now,
                            },
                        );
                    }
                }
            }
            Observation::Unrecognized { bbox } => {
                match Self::match_spatial(&mut self.unrecognized, self.matcher.as_ref(), &bbox) {
                    Some(t) => {
                        t.bbox = bbox;
                        t.last_seen = now;
                    }
                    None => {
                        let id = self.next_spatial_id;
                        self.next_spatial_id += 1;
                        self.unrecognized.insert(
                            id,
                            Track {
                                tier: Tier::Unrecognized,
                                label: "Unknown".to_string(),
                                student_id: None,
                                similarity: None,
                                bbox,
                                last_seen: now,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Find the closest live track accepted by the matcher within one tier.
    fn match_spatial<'a>(
        tier: &'a mut HashMap<u64, Track>,
        matcher: &dyn TrackMatcher,
        bbox: &BoundingBox,
    ) -> Option<&'a mut Track> {
        let key = tier
            .iter()
            .filter(|(_, t)| matcher.same_track(bbox, &t.bbox))
            .min_by(|(_, a), (_, b)| {
                let da = bbox.center_distance(&a.bbox);
                let db = bbox.center_distance(&b.bbox);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(k, _)| *k)?;
        tier.get_mut(&key)
    }

    /// Remove every track not seen for at least the liveness window.
    ///
    /// No resurrection: a detection arriving after expiry creates a fresh
    /// track instance, even when it reuses the same student ID.
    pub fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        let stale = |t: &Track| now.duration_since(t.last_seen) >= ttl;
        self.recognized.retain(|_, t| !stale(t));
        self.below_threshold.retain(|_, t| !stale(t));
        self.unrecognized.retain(|_, t| !stale(t));
    }

    /// Clone of every live track, across all tiers.
    pub fn snapshot(&self) -> Vec<Track> {
        self.recognized
            .values()
            .chain(self.below_threshold.values())
            .chain(self.unrecognized.values())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recognized.len() + self.below_threshold.len() + self.unrecognized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all tracks (session stop).
    pub fn clear(&mut self) {
        self.recognized.clear();
        self.below_threshold.clear();
        self.unrecognized.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Tracker {
        Tracker::new(Box::<CentroidMatcher>::default(), Duration::from_millis(2000))
    }

    fn bbox(x: f32, y: f32) -> BoundingBox {
        BoundingBox::new(x, y, 40.0, 40.0)
    }

    #[test]
    fn test_recognized_keyed_by_student_id() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(
            Observation::Recognized {
                student_id: "S2001".into(),
                label: "John".into(),
                similarity: 0.9,
                bbox: bbox(10.0, 10.0),
            },
            t0,
        );
        // Same student far away in frame: identity wins, box moves.
        tr.observe(
            Observation::Recognized {
                student_id: "S2001".into(),
                label: "John".into(),
                similarity: 0.85,
                bbox: bbox(120.0, 90.0),
            },
            t0 + Duration::from_millis(100),
        );
        assert_eq!(tr.len(), 1);
        let snap = tr.snapshot();
        assert_eq!(snap[0].bbox, bbox(120.0, 90.0));
        assert_eq!(snap[0].similarity, Some(0.85));
    }

    #[test]
    fn test_spatial_merge_within_radius() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(Observation::Unrecognized { bbox: bbox(10.0, 10.0) }, t0);
        // Center moved ~14px: same track.
        tr.observe(Observation::Unrecognized { bbox: bbox(20.0, 20.0) }, t0);
        assert_eq!(tr.len(), 1);
        // Center moved 100px: new track.
        tr.observe(Observation::Unrecognized { bbox: bbox(110.0, 10.0) }, t0);
        assert_eq!(tr.len(), 2);
    }

    #[test]
    fn test_closest_track_wins() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(Observation::Unrecognized { bbox: bbox(0.0, 0.0) }, t0);
        tr.observe(Observation::Unrecognized { bbox: bbox(40.0, 0.0) }, t0);
        assert_eq!(tr.len(), 2);
        // Within radius of both; must merge into the nearer one at x=40.
        tr.observe(Observation::Unrecognized { bbox: bbox(25.0, 0.0) }, t0);
        assert_eq!(tr.len(), 2);
        let snap = tr.snapshot();
        assert!(snap.iter().any(|t| t.bbox == bbox(25.0, 0.0)));
        assert!(snap.iter().any(|t| t.bbox == bbox(0.0, 0.0)));
    }

    #[test]
    fn test_tier_isolation() {
        let mut tr = tracker();
        let t0 = Instant::now();
        // Overlapping boxes in different tiers never merge.
        tr.observe(
            Observation::Recognized {
                student_id: "S1".into(),
                label: "A".into(),
                similarity: 0.9,
                bbox: bbox(10.0, 10.0),
            },
            t0,
        );
        tr.observe(
            Observation::BelowThreshold {
                label: "A".into(),
                similarity: 0.5,
                bbox: bbox(10.0, 10.0),
            },
            t0,
        );
        tr.observe(Observation::Unrecognized { bbox: bbox(10.0, 10.0) }, t0);
        assert_eq!(tr.len(), 3);
    }

    #[test]
    fn test_expiry_boundary() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(Observation::Unrecognized { bbox: bbox(0.0, 0.0) }, t0);
        tr.observe(Observation::Unrecognized { bbox: bbox(200.0, 0.0) }, t0 + Duration::from_millis(1));

        // 1999ms after the first observation: both persist.
        tr.sweep(t0 + Duration::from_millis(1999));
        assert_eq!(tr.len(), 2);

        // 2000ms: the first is stale, the second (seen at t0+1) survives.
        tr.sweep(t0 + Duration::from_millis(2000));
        assert_eq!(tr.len(), 1);

        tr.sweep(t0 + Duration::from_millis(2001));
        assert_eq!(tr.len(), 0);
    }

    #[test]
    fn test_match_resets_liveness() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(Observation::Unrecognized { bbox: bbox(0.0, 0.0) }, t0);
        tr.observe(Observation::Unrecognized { bbox: bbox(2.0, 0.0) }, t0 + Duration::from_millis(1500));
        // Would have expired at t0+2000 without the refresh.
        tr.sweep(t0 + Duration::from_millis(3000));
        assert_eq!(tr.len(), 1);
    }

    #[test]
    fn test_no_resurrection() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(
            Observation::Recognized {
                student_id: "S1".into(),
                label: "A".into(),
                similarity: 0.9,
                bbox: bbox(0.0, 0.0),
            },
            t0,
        );
        tr.sweep(t0 + Duration::from_millis(2000));
        assert!(tr.is_empty());
        // Re-entry creates a fresh track, not a revived one.
        tr.observe(
            Observation::Recognized {
                student_id: "S1".into(),
                label: "A".into(),
                similarity: 0.8,
                bbox: bbox(50.0, 50.0),
            },
            t0 + Duration::from_millis(5000),
        );
        assert_eq!(tr.len(), 1);
        assert_eq!(tr.snapshot()[0].similarity, Some(0.8));
    }

    #[test]
    fn test_clear() {
        let mut tr = tracker();
        let t0 = Instant::now();
        tr.observe(Observation::Unrecognized { bbox: bbox(0.0, 0.0) }, t0);
        tr.clear();
        assert!(tr.is_empty());
        assert!(tr.snapshot().is_empty());
    }
}
