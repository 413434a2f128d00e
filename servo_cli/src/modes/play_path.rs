//! `play-path` (§6, §10.5): stream a joint-space move across the 6
//! joints selected by `active-move-mask`, at `playback-speed` of real
//! time, printing each cycle's telemetry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Args;
use tracing::info;

use servo_common::config::RobotConfig;
use servo_common::trajectory::TrajectoryItem;
use servo_common::{Result, DOF};
use servo_host::dynamics::IdentityDynamics;
use servo_host::sampler::{PlaybackSpeedProducer, TrajectorySampler};
use servo_host::scheduler::JointsView;
use servo_kinematics::VelocityLimiter;

use crate::modes::run_until;
use crate::path::LinearJointPath;
use crate::robot;

#[derive(Debug, Args)]
pub struct PlayPathArgs {
    /// Fraction of real-time speed to play the move back at, in (0, 1.0].
    #[arg(long)]
    pub playback_speed: f64,
    /// Bitmask (bit `i` = joint `i+1`) selecting which joints move; the
    /// rest hold their starting position.
    #[arg(long)]
    pub active_move_mask: u8,
    /// How far each active joint moves from its starting position [rad].
    #[arg(long, default_value_t = 0.3)]
    pub move_amplitude_rad: f64,
    /// Per-joint speed cap used to size the move [rad/s].
    #[arg(long, default_value_t = 0.2)]
    pub max_joint_speed: f64,
}

type Sampler = TrajectorySampler<PlaybackSpeedProducer<LinearJointPath, IdentityDynamics>>;

pub fn run(config: &RobotConfig, args: &PlayPathArgs, sigint: Arc<AtomicBool>) -> Result<()> {
    let scheduler = robot::build_scheduler(config)?;
    let cycle_time_s = config.cycle_time_ms as f64 / 1000.0;

    let start = [0.0; DOF];
    let mut end = start;
    for i in 0..DOF {
        if args.active_move_mask & (1 << i) != 0 {
            end[i] = start[i] + args.move_amplitude_rad;
        }
    }

    let mut limiter = VelocityLimiter::new();
    for i in 0..DOF {
        let mut basis = [0.0; DOF];
        basis[i] = 1.0;
        limiter.add(args.max_joint_speed, basis);
    }

    let path = LinearJointPath::new(vec![start, end], limiter, cycle_time_s);
    let producer = PlaybackSpeedProducer::new(path, IdentityDynamics, args.playback_speed)?;
    let sampler: Sampler = TrajectorySampler::new(producer, cycle_time_s)?;
    let sampler = Arc::new(Mutex::new(sampler));

    info!(
        playback_speed = args.playback_speed,
        active_move_mask = args.active_move_mask,
        "starting path playback"
    );

    let done = Arc::new(AtomicBool::new(false));
    let done_send = done.clone();
    let sampler_send = sampler.clone();

    let send = Box::new(move |_dt: Duration, view: &mut JointsView| {
        let mut sampler = sampler_send.lock().unwrap();
        sampler.increment(cycle_time_s);
        let sample: TrajectoryItem = sampler.get_sample();
        for (i, joint) in view.joints.iter_mut().enumerate() {
            joint.set_reference(sample.p[i], sample.v[i], sample.u[i]);
        }
        if sampler.reached_end_of_trajectory() {
            done_send.store(true, Ordering::SeqCst);
        }
    });

    let recv = Box::new(move |_dt: Duration, view: &mut JointsView| {
        print!("t:{:.4} ", view.cycle_count as f64 * cycle_time_s);
        for (i, joint) in view.joints.iter().enumerate() {
            print!(
                "p{i}:{:.5} v{i}:{:.5} e{i}:{:.5} u{i}:{} ",
                joint.get_position(),
                joint.get_velocity(),
                joint.get_control_error(),
                joint.get_control_signal()
            );
        }
        println!();
    });

    run_until(scheduler, send, recv, done, sigint);
    info!("path playback complete");
    Ok(())
}
