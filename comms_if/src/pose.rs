//! # Pose Messages
//!
//! Messages exchanged between the pose persistence exec and the localisation system. The layout
//! mirrors the usual `geometry_msgs` structures, trimmed down to the planar components this
//! software uses. Additional fields sent by the localisation system (e.g. `position.z`) are
//! ignored on deserialisation.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic on which the localisation system publishes the live robot pose.
pub const ROBOT_POSE_TOPIC: &str = "/robot_pose";

/// Topic on which initial pose estimates are published.
pub const INITIAL_POSE_TOPIC: &str = "/initialpose";

/// Frame in which initial pose estimates are expressed.
pub const MAP_FRAME_ID: &str = "map";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Planar position of the robot.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// The z and w components of the robot's attitude quaternion, which is enough to describe the
/// heading of a planar robot.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub z: f64,
    pub w: f64,
}

/// A planar pose, as published on [`ROBOT_POSE_TOPIC`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

/// Header attached to stamped messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Header {
    /// Frame the message's data is expressed in
    pub frame_id: String,

    /// UTC time at which the message was built
    #[serde(with = "ts_milliseconds")]
    pub stamp: DateTime<Utc>,
}

/// An initial pose estimate, as published on [`INITIAL_POSE_TOPIC`].
///
/// Tells the localisation system to assume the robot starts at `pose`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InitialPose {
    pub header: Header,
    pub pose: Pose,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Orientation {
    /// Identity rotation
    fn default() -> Self {
        Self { z: 0.0, w: 1.0 }
    }
}

impl InitialPose {
    /// Build a new initial pose estimate in the given frame, stamped with the current time.
    pub fn new(frame_id: &str, pose: Pose) -> Self {
        Self {
            header: Header {
                frame_id: frame_id.into(),
                stamp: Utc::now(),
            },
            pose,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pose_ignores_extra_fields() {
        let json = r#"{
            "position": {"x": 1.5, "y": -2.25, "z": 0.0},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.7071, "w": 0.7071}
        }"#;

        let pose: Pose = serde_json::from_str(json).unwrap();

        assert_eq!(pose.position, Position { x: 1.5, y: -2.25 });
        assert_eq!(pose.orientation, Orientation { z: 0.7071, w: 0.7071 });
    }

    #[test]
    fn test_pose_missing_orientation_rejected() {
        let json = r#"{"position": {"x": 1.5, "y": -2.25}}"#;

        assert!(serde_json::from_str::<Pose>(json).is_err());
    }

    #[test]
    fn test_initial_pose_json_layout() {
        let init = InitialPose::new(MAP_FRAME_ID, Pose {
            position: Position { x: 1.0, y: 2.0 },
            orientation: Orientation::default(),
        });

        let value = serde_json::to_value(&init).unwrap();

        assert_eq!(value["header"]["frame_id"], "map");
        assert_eq!(
            value["header"]["stamp"].as_i64(),
            Some(init.header.stamp.timestamp_millis())
        );
        assert_eq!(value["pose"]["position"]["x"], 1.0);
        assert_eq!(value["pose"]["orientation"]["w"], 1.0);
    }
}
