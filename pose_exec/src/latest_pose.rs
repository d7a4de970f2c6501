//! # Latest Pose
//!
//! Single slot holding the most recent pose observation. The pose client writes it from its
//! background thread and the convergence publisher reads it on the main thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::pose_cache::PoseRecord;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cloneable handle to the most recent pose observation.
///
/// All clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct LatestPose {
    slot: Arc<Mutex<Option<PoseRecord>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LatestPose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored observation.
    pub fn set(&self, record: PoseRecord) {
        *self.lock() = Some(record);
    }

    /// Get a copy of the stored observation, or `None` if nothing has been observed yet.
    pub fn get(&self) -> Option<PoseRecord> {
        *self.lock()
    }

    // A panic while holding the lock can't leave a half-written record behind since the value is
    // replaced whole, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<PoseRecord>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
