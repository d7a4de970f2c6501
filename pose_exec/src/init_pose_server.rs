//! # Initial Pose Server
//!
//! Publishes initial pose estimates to the localisation system.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{encode_topic_msg, zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    pose::InitialPose,
};

use crate::params::PoseExecParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something initial pose estimates can be sent to.
pub trait InitPoseSink {
    type Error: std::fmt::Display;

    /// Send an initial pose estimate.
    fn send_init_pose(&mut self, init_pose: &InitialPose) -> Result<(), Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Initial pose server
pub struct InitPoseServer {
    socket: MonitoredSocket,
    topic: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InitPoseServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the initial pose: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the initial pose: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InitPoseServer {
    /// Create a new instance of the initial pose server.
    ///
    /// This function will not block until a subscriber connects.
    pub fn new(ctx: &zmq::Context, params: &PoseExecParams) -> Result<Self, InitPoseServerError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            bind: true,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1000,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            socket_options,
            &params.initial_pose_endpoint
        ).map_err(InitPoseServerError::SocketError)?;

        Ok(Self {
            socket,
            topic: params.initial_pose_topic.clone(),
        })
    }
}

impl InitPoseSink for InitPoseServer {
    type Error = InitPoseServerError;

    fn send_init_pose(&mut self, init_pose: &InitialPose) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(init_pose)
            .map_err(InitPoseServerError::SerializationError)?;

        self.socket
            .send(encode_topic_msg(&self.topic, &payload).as_bytes(), 0)
            .map_err(InitPoseServerError::SendError)
    }
}
