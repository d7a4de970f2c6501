//! # Pose Persistence Executable
//!
//! Keeps the last known robot pose on disk so the robot can pick up where it left off after a
//! restart.
//!
//! # Architecture
//!
//! - Load the pose cached by the previous execution, if there is one
//! - Start the pose client, which saves every live pose to the cache in the background
//! - If a pose was loaded, publish it as the initial pose estimate once per cadence until the live
//!   pose converges on it
//! - Keep caching live poses until shutdown (SIGINT/SIGTERM)

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{Result, eyre::WrapErr};
use log::{error, info};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

// Internal
use comms_if::net::zmq;
use pose_lib::{
    conv_pub,
    init_pose_server::InitPoseServer,
    latest_pose::LatestPose,
    params::PoseExecParams,
    pose_cache::PoseCache,
    pose_client::{PoseClient, PoseObserver},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the main thread checks for shutdown once publishing is over.
const IDLE_PERIOD: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "pose_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Pose Persistence Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: PoseExecParams = util::params::load("pose_exec.toml")
        .wrap_err("Could not load pose_exec params")?;

    info!("Parameters loaded");

    // ---- SHUTDOWN HANDLING ----

    let run = Arc::new(AtomicBool::new(true));
    {
        let run = run.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            run.store(false, Ordering::Relaxed);
        }).wrap_err("Failed to set the shutdown handler")?;
    }

    // ---- POSE CACHE ----

    let sw_root = host::get_pose_sw_root()
        .wrap_err("Failed to get the software root")?;
    let cache = PoseCache::new(params.cache_dir_in(&sw_root), &params.cache_file_name);

    // Not fatal, saves will fail and be reported
    if let Err(e) = cache.ensure_storage_ready() {
        error!("Cache directory not created: {}", e);
    }

    // Must happen before the pose client starts overwriting the record
    let cached_pose = cache.load_if_present();

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();

    let latest = LatestPose::new();

    let pose_client = {
        let c = PoseClient::new(
            &zmq_ctx,
            &params,
            PoseObserver::new(cache.clone(), latest.clone())
        ).wrap_err("Failed to initialise PoseClient")?;
        info!("PoseClient initialised");
        c
    };

    let mut init_pose_server = {
        let s = InitPoseServer::new(&zmq_ctx, &params)
            .wrap_err("Failed to initialise InitPoseServer")?;
        info!("InitPoseServer initialised");
        s
    };

    info!("Network initialisation complete");

    // ---- INITIAL POSE PUBLICATION ----

    conv_pub::publish_cached_pose(
        cached_pose,
        params.conv_pub.clone(),
        &mut init_pose_server,
        &latest,
        &run
    );

    // ---- MAIN LOOP ----

    info!("Caching live robot poses until shutdown");

    while run.load(Ordering::Relaxed) {
        thread::sleep(IDLE_PERIOD);
    }

    // ---- SHUTDOWN ----

    pose_client.stop();

    if let Some(pose) = latest.get() {
        info!("Last observed pose: {}", pose);
    }

    info!("End of execution");

    Ok(())
}
