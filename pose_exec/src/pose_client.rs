//! # Pose Client
//!
//! The pose client subscribes to the live robot pose published by the localisation system. Every
//! pose received is stored as the latest observation and written to the pose cache.
//!
//! Poses are received on a background thread, so that observations keep flowing while the main
//! thread is busy (e.g. waiting between initial pose publications).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use comms_if::{
    net::{split_topic_msg, zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    pose::Pose,
};
use log::{debug, error, info, trace, warn};

use crate::{
    latest_pose::LatestPose,
    params::PoseExecParams,
    pose_cache::{PoseCache, PoseRecord},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handles pose observations: records them as the latest pose and persists them.
#[derive(Debug, Clone)]
pub struct PoseObserver {
    cache: PoseCache,
    latest: LatestPose,
}

/// The pose client
pub struct PoseClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PoseClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe to the {0} topic: {1}")]
    SubscribeError(String, zmq::Error),

    #[error("Could not start the pose client thread: {0}")]
    ThreadError(std::io::Error),

    #[error("Message has no topic or no payload")]
    MalformedMessage,

    #[error("Expected a message on the {0} topic, got one on {1}")]
    UnexpectedTopic(String, String),

    #[error("Could not deserialize the pose: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The pose contains non-finite values: {0:?}")]
    NonFinitePose(PoseRecord),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PoseObserver {
    pub fn new(cache: PoseCache, latest: LatestPose) -> Self {
        Self { cache, latest }
    }

    /// Handle a single pose observation.
    ///
    /// Failing to persist the pose is logged and otherwise ignored, the observation is still
    /// recorded as the latest pose.
    pub fn observe(&self, record: PoseRecord) {
        self.latest.set(record);

        match self.cache.save(record) {
            Ok(_) => trace!("Robot pose saved to the cache"),
            Err(e) => warn!("Could not save the robot pose: {}", e),
        }
    }

    /// Parse a raw `"<topic> <json>"` message and observe the pose it contains.
    pub fn handle_msg(&self, topic: &str, msg: &str) -> Result<PoseRecord, PoseClientError> {
        let (msg_topic, payload) = split_topic_msg(msg).ok_or(PoseClientError::MalformedMessage)?;

        if msg_topic != topic {
            return Err(PoseClientError::UnexpectedTopic(topic.into(), msg_topic.into()));
        }

        let pose: Pose = serde_json::from_str(payload).map_err(PoseClientError::DeserializeError)?;
        let record = PoseRecord::from(pose);

        // A non-finite pose would leave an unloadable record in the cache
        if !record.is_finite() {
            return Err(PoseClientError::NonFinitePose(record));
        }

        self.observe(record);

        Ok(record)
    }
}

impl PoseClient {
    /// Create a new instance of the pose client and start receiving poses.
    ///
    /// This function does not wait for the localisation system to be available.
    pub fn new(
        ctx: &zmq::Context,
        params: &PoseExecParams,
        observer: PoseObserver,
    ) -> Result<Self, PoseClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            socket_options,
            &params.robot_pose_endpoint
        ).map_err(PoseClientError::SocketError)?;

        socket
            .set_subscribe(params.robot_pose_topic.as_bytes())
            .map_err(|e| PoseClientError::SubscribeError(params.robot_pose_topic.clone(), e))?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();
        let topic = params.robot_pose_topic.clone();

        let bg_jh = thread::Builder::new()
            .name("pose_client".into())
            .spawn(move || bg_thread(socket, topic, bg_run_clone, observer))
            .map_err(PoseClientError::ThreadError)?;

        info!(
            "Subscribed to {} at {}",
            params.robot_pose_topic, params.robot_pose_endpoint
        );

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run,
        })
    }

    /// Stop receiving poses and wait for the background thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("PoseClient background thread panicked");
            }
        }
    }
}

impl Drop for PoseClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, observes each pose published by the localisation system.
fn bg_thread(
    socket: MonitoredSocket,
    topic: String,
    run: Arc<AtomicBool>,
    observer: PoseObserver,
) {
    let mut was_connected = false;

    // While instructed to run
    while run.load(Ordering::Relaxed) {
        // Report changes in the link to the localisation system
        let connected = socket.connected();
        if connected != was_connected {
            match connected {
                true => info!("Connected to the robot pose publisher"),
                false => warn!("Connection to the robot pose publisher lost"),
            }
            was_connected = connected;
        }

        // Read string from the socket
        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message on the robot pose topic");
                continue
            },
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Error receiving robot pose: {:?}", e);
                break
            }
        };

        match observer.handle_msg(&topic, &msg) {
            Ok(r) => trace!("Observed robot pose {}", r),
            // Topic filtering is by prefix, so other topics sharing the prefix end up here
            Err(PoseClientError::UnexpectedTopic(_, t)) => debug!("Ignoring message on {}", t),
            Err(e) => warn!("Could not handle robot pose message: {}", e),
        }
    }

    debug!("PoseClient background thread exiting");
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::pose_cache::{test::test_dir, DEFAULT_FILE_NAME};

    const TOPIC: &str = "/robot_pose";

    fn observer(name: &str) -> (PoseObserver, PoseCache, LatestPose) {
        let cache = PoseCache::new(test_dir(name), DEFAULT_FILE_NAME);
        cache.ensure_storage_ready().unwrap();
        let latest = LatestPose::new();

        (PoseObserver::new(cache.clone(), latest.clone()), cache, latest)
    }

    #[test]
    fn test_observe_saves_and_records() {
        let (obs, cache, latest) = observer("observe");

        obs.observe(PoseRecord::new(1.0, 2.0, 0.0, 1.0));
        obs.observe(PoseRecord::new(1.5, 2.5, 0.1, 0.99));

        assert_eq!(latest.get(), Some(PoseRecord::new(1.5, 2.5, 0.1, 0.99)));
        assert_eq!(cache.load().unwrap(), PoseRecord::new(1.5, 2.5, 0.1, 0.99));
    }

    #[test]
    fn test_observe_without_storage() {
        // Cache directory never created, so every save fails
        let cache = PoseCache::new(test_dir("observe_no_storage"), DEFAULT_FILE_NAME);
        let latest = LatestPose::new();
        let obs = PoseObserver::new(cache.clone(), latest.clone());

        obs.observe(PoseRecord::new(1.0, 2.0, 0.0, 1.0));

        assert_eq!(latest.get(), Some(PoseRecord::new(1.0, 2.0, 0.0, 1.0)));
        assert!(!cache.exists());
    }

    #[test]
    fn test_handle_msg() {
        let (obs, cache, latest) = observer("handle_msg");

        let msg = r#"/robot_pose {"position": {"x": 4.0, "y": -1.0, "z": 0.0}, "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}}"#;
        let rec = obs.handle_msg(TOPIC, msg).unwrap();

        assert_eq!(rec, PoseRecord::new(4.0, -1.0, 0.0, 1.0));
        assert_eq!(latest.get(), Some(rec));
        assert_eq!(cache.load().unwrap(), rec);
    }

    #[test]
    fn test_handle_msg_rejected() {
        let (obs, cache, latest) = observer("handle_msg_rejected");

        assert!(matches!(
            obs.handle_msg(TOPIC, "/robot_pose"),
            Err(PoseClientError::MalformedMessage)
        ));
        assert!(matches!(
            obs.handle_msg(TOPIC, r#"/robot_pose_raw {"position": {"x": 4.0, "y": -1.0}, "orientation": {"z": 0.0, "w": 1.0}}"#),
            Err(PoseClientError::UnexpectedTopic(_, _))
        ));
        assert!(matches!(
            obs.handle_msg(TOPIC, "/robot_pose {\"position\": 3}"),
            Err(PoseClientError::DeserializeError(_))
        ));

        assert_eq!(latest.get(), None);
        assert!(!cache.exists());
    }
}
