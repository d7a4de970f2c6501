//! Parameters structure for ConvPub

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the convergence publisher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {

    /// Frame the initial pose estimate is expressed in.
    pub frame_id: String,

    /// Time between two publications of the initial pose.
    ///
    /// Units: seconds
    pub cadence_s: f64,

    /// Maximum difference between the live and cached position, on each of the X and Y axes, for
    /// the localisation to be considered converged.
    ///
    /// Units: meters
    pub tolerance_m: f64,

    /// Maximum number of times the initial pose is published before giving up. When not set the
    /// pose is published until convergence or shutdown.
    pub max_attempts: Option<u64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            frame_id: comms_if::pose::MAP_FRAME_ID.into(),
            cadence_s: 1.0,
            tolerance_m: 0.002,
            max_attempts: None,
        }
    }
}
