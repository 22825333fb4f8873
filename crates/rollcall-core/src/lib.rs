//! rollcall-core — Domain logic for live attendance tracking.
//!
//! Holds the three-tier face track registry, the deduplicated attendance
//! ledger, and the overlay coordinate pipeline. Everything here is pure
//! state + geometry: no I/O, no async, no clocks of its own (callers pass
//! explicit timestamps).

pub mod ledger;
pub mod overlay;
pub mod tracker;
pub mod types;

pub use ledger::{AttendanceEntry, AttendanceLedger, EligibilityFilter, RecordOutcome};
pub use tracker::{CentroidMatcher, Observation, Track, TrackMatcher, Tracker};
pub use types::{parse_label, BoundingBox, Tier};
