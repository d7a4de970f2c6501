//! Pose record stored in the cache

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{fmt, str::FromStr};

use comms_if::pose::{Orientation, Pose, Position};
use log::warn;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of values in a serialised record.
pub const NUM_RECORD_FIELDS: usize = 4;

/// Names of the record fields, in the order they appear in the file.
const FIELD_NAMES: [&str; NUM_RECORD_FIELDS] = ["x", "y", "orient_z", "orient_w"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The last observed planar pose of the robot.
///
/// Serialised as a single line of four whitespace separated decimals: `x y orient_z orient_w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    /// Position along the map X axis
    ///
    /// Units: meters
    pub x: f64,

    /// Position along the map Y axis
    ///
    /// Units: meters
    pub y: f64,

    /// Z component of the attitude quaternion
    pub orient_z: f64,

    /// W (scalar) component of the attitude quaternion
    pub orient_w: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur when parsing a serialised record.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordParseError {
    #[error("Expected {} values in the record, found {0}", NUM_RECORD_FIELDS)]
    TooFewValues(usize),

    #[error("Value for {0} is not a number: {1:?}")]
    InvalidNumber(&'static str, String),

    #[error("Value for {0} is not finite: {1}")]
    NotFinite(&'static str, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseRecord {
    pub fn new(x: f64, y: f64, orient_z: f64, orient_w: f64) -> Self {
        Self { x, y, orient_z, orient_w }
    }

    /// Return the heading (angle to the positive map X axis) of the robot in radians.
    pub fn heading(&self) -> f64 {
        2.0 * self.orient_z.atan2(self.orient_w)
    }

    /// Absolute position difference from `other` along each axis, as `(dx, dy)`.
    pub fn position_error(&self, other: &PoseRecord) -> (f64, f64) {
        ((self.x - other.x).abs(), (self.y - other.y).abs())
    }

    /// True if `other`'s position is within `tolerance_m` of this record's on both axes.
    ///
    /// Orientation is not compared.
    pub fn position_within(&self, other: &PoseRecord, tolerance_m: f64) -> bool {
        let (dx, dy) = self.position_error(other);
        dx <= tolerance_m && dy <= tolerance_m
    }

    /// True if all values in the record are finite.
    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }

    fn values(&self) -> [f64; NUM_RECORD_FIELDS] {
        [self.x, self.y, self.orient_z, self.orient_w]
    }
}

impl fmt::Display for PoseRecord {
    /// Formats the record in its on-disk form.
    ///
    /// `f64`'s `Display` produces the shortest string which parses back to the same value, so a
    /// saved record loads back exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.orient_z, self.orient_w)
    }
}

impl FromStr for PoseRecord {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();

        if tokens.len() < NUM_RECORD_FIELDS {
            return Err(RecordParseError::TooFewValues(tokens.len()));
        }
        if tokens.len() > NUM_RECORD_FIELDS {
            warn!(
                "Pose record contains {} values, ignoring all but the first {}",
                tokens.len(),
                NUM_RECORD_FIELDS
            );
        }

        let mut values = [0f64; NUM_RECORD_FIELDS];
        for (i, (token, name)) in tokens.iter().zip(FIELD_NAMES.iter()).enumerate() {
            let value: f64 = token
                .parse()
                .map_err(|_| RecordParseError::InvalidNumber(*name, token.to_string()))?;

            if !value.is_finite() {
                return Err(RecordParseError::NotFinite(*name, value));
            }

            values[i] = value;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }
}

impl From<Pose> for PoseRecord {
    fn from(pose: Pose) -> Self {
        Self {
            x: pose.position.x,
            y: pose.position.y,
            orient_z: pose.orientation.z,
            orient_w: pose.orientation.w,
        }
    }
}

impl From<PoseRecord> for Pose {
    fn from(record: PoseRecord) -> Self {
        Pose {
            position: Position {
                x: record.x,
                y: record.y,
            },
            orientation: Orientation {
                z: record.orient_z,
                w: record.orient_w,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
