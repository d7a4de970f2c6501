//! # Convergence Publisher
//!
//! Publishes a pose recovered from the cache as the robot's initial pose estimate, and keeps
//! publishing it until the live robot pose agrees with it.
//!
//! The publisher is a small state machine:
//!
//! ```text
//!   Off --init--> Publishing --live pose within tolerance--> Converged
//!                     |
//!                     +--stop requested / attempt limit--> Abandoned
//! ```

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use std::sync::atomic::AtomicBool;

// Internal
pub use params::*;
pub use state::*;
use crate::{init_pose_server::InitPoseSink, latest_pose::LatestPose, pose_cache::PoseRecord};
use util::module::State;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ConvPub operation.
#[derive(Debug, thiserror::Error)]
pub enum ConvPubError {
    #[error("The publish cadence must be a positive number of seconds, found {0}")]
    InvalidCadence(f64),

    #[error("The convergence tolerance must be a non-negative number, found {0}")]
    InvalidTolerance(f64),

    #[error("The cached pose contains non-finite values: {0:?}")]
    InvalidPose(crate::pose_cache::PoseRecord),

    #[error("The publisher has not been initialised")]
    NotInit,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Publish the pose recovered from the cache to `sink` until the live pose converges on it.
///
/// Nothing is published if there is no cached pose, or if the publisher can't be started with it.
/// Returns the state publishing ended in, or `None` if nothing was published.
pub fn publish_cached_pose<S: InitPoseSink>(
    cached: Option<PoseRecord>,
    params: Params,
    sink: &mut S,
    latest: &LatestPose,
    run: &AtomicBool,
) -> Option<PubState> {
    let pose = match cached {
        Some(p) => p,
        None => {
            info!("No cached pose, skipping initial pose publication");
            return None;
        }
    };

    let mut conv_pub = ConvPub::new(params);

    if let Err(e) = conv_pub.init(pose) {
        error!("Could not start initial pose publication: {}", e);
        return None;
    }

    match conv_pub.run(sink, latest, run) {
        Ok(PubState::Converged) => info!("Initial pose published successfully"),
        Ok(PubState::Abandoned(AbandonCause::AttemptLimit)) => warn!(
            "Initial pose not accepted after {} publication(s)",
            conv_pub.num_published()
        ),
        Ok(s) => info!("Initial pose publication ended in {:?}", s),
        Err(e) => {
            error!("Initial pose publication failed: {}", e);
            return None;
        }
    }

    Some(conv_pub.state())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
