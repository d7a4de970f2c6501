//! # Pose library.
//!
//! Persists the last known robot pose and, on startup, republishes it as the initial pose estimate
//! until the localisation system agrees with it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Convergence publisher - republishes the cached pose until the live pose matches it
pub mod conv_pub;

/// Initial pose server - publishes initial pose estimates to the localisation system
pub mod init_pose_server;

/// Latest pose - the most recent live pose, shared between the client and the publisher
pub mod latest_pose;

/// Executable parameters
pub mod params;

/// Pose cache - on-disk record of the last observed pose
pub mod pose_cache;

/// Pose client - receives the live robot pose from the localisation system
pub mod pose_client;
