//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Pose messages exchanged with the localisation system
pub mod pose;

/// Network module
pub mod net;
