//! Implementations for the ConvPub state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use comms_if::pose::InitialPose;
use log::{debug, info, warn};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

// Internal
use super::{ConvPubError, Params};
use crate::{init_pose_server::InitPoseSink, latest_pose::LatestPose, pose_cache::PoseRecord};
use util::{module::State, time::period_from_seconds};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest time the publisher sleeps without checking the run flag.
const WAIT_SLICE: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Convergence publisher module state
pub struct ConvPub {
    params: Params,

    cadence: Duration,

    state: PubState,

    /// The pose read from the cache
    target: Option<PoseRecord>,

    /// The message published on every cycle, stamped once on init
    init_pose: Option<InitialPose>,

    num_published: u64,
}

/// Input data to the convergence publisher.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// The most recent live pose, or `None` if no pose has been received yet.
    pub latest: Option<PoseRecord>,

    /// Set when the executable is shutting down.
    pub stop_requested: bool,
}

/// Status report for ConvPub processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub state: PubState,

    /// Number of times the initial pose has been published so far.
    pub num_published: u64,

    /// Absolute X and Y difference between the cached and latest live positions.
    ///
    /// Units: meters
    pub position_error_m: Option<(f64, f64)>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// States of the convergence publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubState {
    /// Not initialised, nothing to publish
    Off,

    /// Publishing the cached pose once per cycle
    Publishing,

    /// The live pose matches the cached pose, publishing has finished
    Converged,

    /// Publishing stopped before convergence
    Abandoned(AbandonCause),
}

/// Reasons publishing can stop without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonCause {
    /// The executable is shutting down
    Stopped,

    /// The configured maximum number of publications was reached
    AttemptLimit,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PubState {
    /// True once the publisher will never publish again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PubState::Converged | PubState::Abandoned(_))
    }
}

impl ConvPub {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            cadence: Duration::from_secs(1),
            state: PubState::Off,
            target: None,
            init_pose: None,
            num_published: 0,
        }
    }

    pub fn state(&self) -> PubState {
        self.state
    }

    pub fn num_published(&self) -> u64 {
        self.num_published
    }

    /// Publish the initial pose to `sink` once per cadence until the publisher reaches a terminal
    /// state, which is returned.
    ///
    /// `run` is polled at least every [`WAIT_SLICE`], once it's cleared publishing is abandoned
    /// within one cadence.
    pub fn run<S: InitPoseSink>(
        &mut self,
        sink: &mut S,
        latest: &LatestPose,
        run: &AtomicBool,
    ) -> Result<PubState, ConvPubError> {
        loop {
            let input = InputData {
                latest: latest.get(),
                stop_requested: !run.load(Ordering::Relaxed),
            };

            let (output, report) = self.proc(&input)?;

            if let Some(init_pose) = output {
                match sink.send_init_pose(&init_pose) {
                    Ok(_) => debug!("Initial pose published ({})", report.num_published),
                    Err(e) => warn!("Could not publish the initial pose: {}", e),
                }
            }

            if report.state.is_terminal() {
                return Ok(report.state);
            }

            self.wait_cadence(run);
        }
    }

    fn wait_cadence(&self, run: &AtomicBool) {
        let deadline = Instant::now() + self.cadence;

        while run.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            thread::sleep(std::cmp::min(deadline - now, WAIT_SLICE));
        }
    }
}

impl State for ConvPub {
    type InitData = PoseRecord;
    type InitError = ConvPubError;

    type InputData = InputData;
    type OutputData = Option<InitialPose>;
    type StatusReport = StatusReport;
    type ProcError = ConvPubError;

    /// Initialise the publisher with the pose loaded from the cache.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.cadence = period_from_seconds(self.params.cadence_s)
            .ok_or(ConvPubError::InvalidCadence(self.params.cadence_s))?;

        if !(self.params.tolerance_m >= 0.0 && self.params.tolerance_m.is_finite()) {
            return Err(ConvPubError::InvalidTolerance(self.params.tolerance_m));
        }

        if !init_data.is_finite() {
            return Err(ConvPubError::InvalidPose(init_data));
        }

        self.target = Some(init_data);
        self.init_pose = Some(InitialPose::new(&self.params.frame_id, init_data.into()));
        self.num_published = 0;
        self.state = PubState::Publishing;

        info!(
            "Publishing initial pose (x: {}, y: {}, heading: {:.3} rad) in the {} frame every {} s",
            init_data.x,
            init_data.y,
            init_data.heading(),
            self.params.frame_id,
            self.params.cadence_s
        );

        Ok(())
    }

    /// Perform one publication cycle.
    ///
    /// Returns the message to publish on this cycle, if any.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let target = match (self.state, self.target) {
            (PubState::Off, _) | (_, None) => return Err(ConvPubError::NotInit),
            (_, Some(t)) => t,
        };

        let position_error_m = input_data.latest.map(|l| target.position_error(&l));

        if self.state == PubState::Publishing {
            // Convergence is only checked once the initial pose has been published
            let converged = self.num_published > 0
                && input_data
                    .latest
                    .map_or(false, |l| target.position_within(&l, self.params.tolerance_m));

            if converged {
                info!(
                    "Live pose converged on the initial pose after {} publication(s)",
                    self.num_published
                );
                self.state = PubState::Converged;
            }
            else if input_data.stop_requested {
                info!("Stop requested, abandoning initial pose publication");
                self.state = PubState::Abandoned(AbandonCause::Stopped);
            }
            else if self.params.max_attempts.map_or(false, |m| self.num_published >= m) {
                warn!(
                    "Live pose did not converge after {} publication(s), giving up",
                    self.num_published
                );
                self.state = PubState::Abandoned(AbandonCause::AttemptLimit);
            }
            else if let Some((dx, dy)) = position_error_m {
                debug!("Not converged yet, position error: ({:.4}, {:.4}) m", dx, dy);
            }
        }

        let output = match self.state {
            PubState::Publishing => {
                self.num_published += 1;
                self.init_pose.clone()
            }
            _ => None,
        };

        Ok((
            output,
            StatusReport {
                state: self.state,
                num_published: self.num_published,
                position_error_m,
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(super) mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink which records everything it's sent, and optionally plays the role of the localisation
    /// system by setting the live pose when an initial pose arrives.
    #[derive(Default, Clone)]
    pub(in crate::conv_pub) struct RecordingSink {
        pub sent: Arc<Mutex<Vec<InitialPose>>>,
        pub respond: Option<(LatestPose, PoseRecord)>,
    }

    impl RecordingSink {
        pub fn num_sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl InitPoseSink for RecordingSink {
        type Error = String;

        fn send_init_pose(&mut self, init_pose: &InitialPose) -> Result<(), Self::Error> {
            self.sent.lock().unwrap().push(init_pose.clone());
            if let Some((ref latest, pose)) = self.respond {
                latest.set(pose);
            }
            Ok(())
        }
    }

    struct FailingSink(usize);

    impl InitPoseSink for FailingSink {
        type Error = String;

        fn send_init_pose(&mut self, _: &InitialPose) -> Result<(), Self::Error> {
            self.0 += 1;
            Err("no route to subscriber".into())
        }
    }

    fn fast_params() -> Params {
        Params {
            cadence_s: 0.01,
            ..Default::default()
        }
    }

    fn cached() -> PoseRecord {
        PoseRecord::new(1.0, 2.0, 0.0, 1.0)
    }

    #[test]
    fn test_proc_before_init() {
        let mut conv_pub = ConvPub::new(Params::default());

        assert_eq!(conv_pub.state(), PubState::Off);
        assert!(matches!(
            conv_pub.proc(&InputData::default()),
            Err(ConvPubError::NotInit)
        ));
    }

    #[test]
    fn test_init_rejects_bad_params() {
        let mut conv_pub = ConvPub::new(Params { cadence_s: 0.0, ..Default::default() });
        assert!(matches!(conv_pub.init(cached()), Err(ConvPubError::InvalidCadence(_))));

        let mut conv_pub = ConvPub::new(Params { tolerance_m: -0.1, ..Default::default() });
        assert!(matches!(conv_pub.init(cached()), Err(ConvPubError::InvalidTolerance(_))));

        let mut conv_pub = ConvPub::new(Params::default());
        assert!(matches!(
            conv_pub.init(PoseRecord::new(std::f64::NAN, 0.0, 0.0, 1.0)),
            Err(ConvPubError::InvalidPose(_))
        ));
        assert_eq!(conv_pub.state(), PubState::Off);
    }

    #[test]
    fn test_proc_state_machine() {
        let mut conv_pub = ConvPub::new(Params::default());
        conv_pub.init(cached()).unwrap();

        // First cycle always publishes, even if the live pose already matches
        let (out, rpt) = conv_pub.proc(&InputData {
            latest: Some(cached()),
            stop_requested: false,
        }).unwrap();
        assert!(out.is_some());
        assert_eq!(rpt.state, PubState::Publishing);
        assert_eq!(rpt.num_published, 1);

        // Live pose too far away
        let (out, rpt) = conv_pub.proc(&InputData {
            latest: Some(PoseRecord::new(1.01, 2.0, 0.0, 1.0)),
            stop_requested: false,
        }).unwrap();
        assert!(out.is_some());
        assert_eq!(rpt.state, PubState::Publishing);
        let (dx, dy) = rpt.position_error_m.unwrap();
        assert!((dx - 0.01).abs() < 1e-9 && dy == 0.0);

        // Within tolerance, orientation ignored
        let (out, rpt) = conv_pub.proc(&InputData {
            latest: Some(PoseRecord::new(1.001, 1.999, 0.7071, 0.7071)),
            stop_requested: false,
        }).unwrap();
        assert!(out.is_none());
        assert_eq!(rpt.state, PubState::Converged);
        assert_eq!(rpt.num_published, 2);

        // Nothing more once converged
        let (out, rpt) = conv_pub.proc(&InputData::default()).unwrap();
        assert!(out.is_none());
        assert_eq!(rpt.state, PubState::Converged);
    }

    #[test]
    fn test_published_message() {
        let mut conv_pub = ConvPub::new(Params::default());
        conv_pub.init(PoseRecord::new(3.5, -1.25, 0.38, 0.92)).unwrap();

        let (out, _) = conv_pub.proc(&InputData::default()).unwrap();
        let msg = out.unwrap();

        assert_eq!(msg.header.frame_id, "map");
        assert_eq!(msg.pose.position.x, 3.5);
        assert_eq!(msg.pose.position.y, -1.25);
        assert_eq!(msg.pose.orientation.z, 0.38);
        assert_eq!(msg.pose.orientation.w, 0.92);

        // Same message every cycle
        let (again, _) = conv_pub.proc(&InputData::default()).unwrap();
        assert_eq!(again, Some(msg));
    }

    #[test]
    fn test_run_converges() {
        let latest = LatestPose::new();
        let mut sink = RecordingSink {
            respond: Some((latest.clone(), PoseRecord::new(1.001, 2.001, 0.0, 1.0))),
            ..Default::default()
        };
        let run = AtomicBool::new(true);

        let mut conv_pub = ConvPub::new(fast_params());
        conv_pub.init(cached()).unwrap();

        let start = Instant::now();
        let state = conv_pub.run(&mut sink, &latest, &run).unwrap();

        assert_eq!(state, PubState::Converged);
        assert_eq!(sink.num_sent(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_run_until_stopped() {
        let latest = LatestPose::new();
        latest.set(PoseRecord::new(5.0, 5.0, 0.0, 1.0));
        let sink = RecordingSink::default();
        let run = Arc::new(AtomicBool::new(true));

        let jh = {
            let latest = latest.clone();
            let mut sink = sink.clone();
            let run = run.clone();
            thread::spawn(move || {
                let mut conv_pub = ConvPub::new(fast_params());
                conv_pub.init(cached()).unwrap();
                conv_pub.run(&mut sink, &latest, &run).unwrap()
            })
        };

        thread::sleep(Duration::from_millis(200));
        let sent_before_stop = sink.num_sent();
        run.store(false, Ordering::Relaxed);

        let state = jh.join().unwrap();

        assert_eq!(state, PubState::Abandoned(AbandonCause::Stopped));
        assert!(sent_before_stop >= 3, "only {} publications", sent_before_stop);
        assert!(sink.num_sent() <= sent_before_stop + 2);
    }

    #[test]
    fn test_run_stops_within_one_cadence() {
        let latest = LatestPose::new();
        let mut sink = RecordingSink::default();
        let run = Arc::new(AtomicBool::new(true));

        // Long cadence, the stop must cut the wait short
        let mut conv_pub = ConvPub::new(Params { cadence_s: 10.0, ..Default::default() });
        conv_pub.init(cached()).unwrap();

        let stopper = {
            let run = run.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                run.store(false, Ordering::Relaxed);
            })
        };

        let start = Instant::now();
        let state = conv_pub.run(&mut sink, &latest, &run).unwrap();
        stopper.join().unwrap();

        assert_eq!(state, PubState::Abandoned(AbandonCause::Stopped));
        assert_eq!(sink.num_sent(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_run_attempt_limit() {
        let latest = LatestPose::new();
        let mut sink = RecordingSink::default();
        let run = AtomicBool::new(true);

        let mut conv_pub = ConvPub::new(Params {
            max_attempts: Some(3),
            ..fast_params()
        });
        conv_pub.init(cached()).unwrap();

        let state = conv_pub.run(&mut sink, &latest, &run).unwrap();

        assert_eq!(state, PubState::Abandoned(AbandonCause::AttemptLimit));
        assert_eq!(sink.num_sent(), 3);
        assert_eq!(conv_pub.num_published(), 3);
    }

    #[test]
    fn test_run_survives_sink_errors() {
        let latest = LatestPose::new();
        let mut sink = FailingSink(0);
        let run = AtomicBool::new(true);

        let mut conv_pub = ConvPub::new(Params {
            max_attempts: Some(2),
            ..fast_params()
        });
        conv_pub.init(cached()).unwrap();

        let state = conv_pub.run(&mut sink, &latest, &run).unwrap();

        assert_eq!(state, PubState::Abandoned(AbandonCause::AttemptLimit));
        assert_eq!(sink.0, 2);
    }
}
