//! `record-moment-of-inertia` (§6, §10.5): drive one joint open-loop
//! with a sinusoidal PWM of given amplitude/frequency and print
//! position/velocity/current per cycle — the offline excitation used to
//! fit a joint's moment of inertia, out of scope for this crate to
//! compute itself (§1 Non-goals: inverse dynamics modelling).

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use servo_common::config::RobotConfig;
use servo_common::Result;
use servo_host::scheduler::JointsView;

use crate::modes::run_until;
use crate::robot;

#[derive(Debug, Args)]
pub struct RecordInertiaArgs {
    /// 1-based joint node id (1..=6).
    #[arg(long)]
    pub joint: u8,
    /// Peak open-loop PWM/control signal of the excitation sine wave.
    #[arg(long)]
    pub amplitude: i16,
    /// Excitation frequency in Hz.
    #[arg(long = "freq-hz")]
    pub freq_hz: f64,
    /// Recording duration in seconds.
    #[arg(long, default_value_t = 5.0)]
    pub seconds: f64,
}

pub fn run(config: &RobotConfig, args: &RecordInertiaArgs, sigint: Arc<AtomicBool>) -> Result<()> {
    let index = robot::joint_index(config, args.joint)?;
    let scheduler = robot::build_scheduler(config)?;
    let cycle_time_s = config.cycle_time_ms as f64 / 1000.0;
    let target_cycles = (args.seconds / cycle_time_s).ceil() as u64;
    let amplitude = args.amplitude as f64;
    let freq_hz = args.freq_hz;

    info!(
        joint = args.joint,
        amplitude = args.amplitude,
        freq_hz,
        "starting moment-of-inertia recording"
    );

    let done = Arc::new(AtomicBool::new(false));
    let done_recv = done.clone();

    let send = Box::new(move |_dt: Duration, view: &mut JointsView| {
        let t = view.cycle_count as f64 * cycle_time_s;
        let pwm = (amplitude * (TAU * freq_hz * t).sin()).round() as i16;
        view.joints[index].set_open_loop_control_signal(pwm, true);
    });

    let recv = Box::new(move |_dt: Duration, view: &mut JointsView| {
        let joint = &view.joints[index];
        println!(
            "t:{:.4} p:{:.5} v:{:.5} i:{} u:{}",
            view.cycle_count as f64 * cycle_time_s,
            joint.get_position(),
            joint.get_velocity(),
            joint.get_current(),
            joint.get_control_signal()
        );
        if view.cycle_count + 1 >= target_cycles {
            done_recv.store(true, Ordering::SeqCst);
        }
    });

    run_until(scheduler, send, recv, done, sigint);
    info!("moment-of-inertia recording complete");
    Ok(())
}
