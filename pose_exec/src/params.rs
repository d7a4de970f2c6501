//! # Pose Executable Parameters
//!
//! This module provide parameters for the pose persistence executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use comms_if::pose::{INITIAL_POSE_TOPIC, ROBOT_POSE_TOPIC};
use serde::Deserialize;

use crate::{conv_pub, pose_cache::DEFAULT_FILE_NAME};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PoseExecParams {

    /// Directory holding the pose cache. Relative paths are relative to the software root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Name of the pose record file within `cache_dir`
    #[serde(default = "default_cache_file_name")]
    pub cache_file_name: String,

    /// Network endpoint the live robot pose is published on
    pub robot_pose_endpoint: String,

    /// Topic of the live robot pose messages
    #[serde(default = "default_robot_pose_topic")]
    pub robot_pose_topic: String,

    /// Network endpoint to publish initial pose estimates on
    pub initial_pose_endpoint: String,

    /// Topic of the initial pose estimate messages
    #[serde(default = "default_initial_pose_topic")]
    pub initial_pose_topic: String,

    /// Convergence publisher parameters
    #[serde(default)]
    pub conv_pub: conv_pub::Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PoseExecParams {
    /// Get the cache directory, resolving relative paths against `sw_root`.
    pub fn cache_dir_in(&self, sw_root: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        }
        else {
            sw_root.join(&self.cache_dir)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_cache_file_name() -> String {
    DEFAULT_FILE_NAME.into()
}

fn default_robot_pose_topic() -> String {
    ROBOT_POSE_TOPIC.into()
}

fn default_initial_pose_topic() -> String {
    INITIAL_POSE_TOPIC.into()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let params: PoseExecParams = util::params::from_str(
            "robot_pose_endpoint = \"tcp://localhost:5100\"\n\
             initial_pose_endpoint = \"tcp://*:5101\"\n"
        ).unwrap();

        assert_eq!(params.cache_dir, PathBuf::from("cache"));
        assert_eq!(params.cache_file_name, "pose.txt");
        assert_eq!(params.robot_pose_topic, "/robot_pose");
        assert_eq!(params.initial_pose_topic, "/initialpose");
        assert_eq!(params.conv_pub.frame_id, "map");
        assert_eq!(params.conv_pub.cadence_s, 1.0);
        assert_eq!(params.conv_pub.tolerance_m, 0.002);
        assert_eq!(params.conv_pub.max_attempts, None);
    }

    #[test]
    fn test_overrides() {
        let params: PoseExecParams = util::params::from_str(r#"
            cache_dir = "/var/lib/amr/cache"
            robot_pose_endpoint = "tcp://localhost:5100"
            initial_pose_endpoint = "tcp://*:5101"

            [conv_pub]
            cadence_s = 0.5
            max_attempts = 30
        "#).unwrap();

        assert_eq!(
            params.cache_dir_in(Path::new("/opt/pose_sw")),
            PathBuf::from("/var/lib/amr/cache")
        );
        assert_eq!(params.conv_pub.cadence_s, 0.5);
        assert_eq!(params.conv_pub.tolerance_m, 0.002);
        assert_eq!(params.conv_pub.max_attempts, Some(30));
    }

    #[test]
    fn test_relative_cache_dir() {
        let params: PoseExecParams = util::params::from_str(
            "robot_pose_endpoint = \"a\"\ninitial_pose_endpoint = \"b\"\n"
        ).unwrap();

        assert_eq!(
            params.cache_dir_in(Path::new("/opt/pose_sw")),
            PathBuf::from("/opt/pose_sw/cache")
        );
    }

    #[test]
    fn test_missing_endpoint() {
        let res: Result<PoseExecParams, _> = util::params::from_str("robot_pose_endpoint = \"a\"");
        assert!(res.is_err());
    }
}
