//! Utility library for the Pose Persistence Software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod host;
pub mod logger;
pub mod module;
pub mod params;
pub mod session;
pub mod time;
