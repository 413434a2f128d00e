//! `record-current-and-pwm-behaviour` (§6, §10.5): hold one joint at a
//! fixed open-loop PWM and print its measured current alongside the
//! dispatched PWM per cycle — the offline data used to characterise the
//! current-loop/PWM relationship, a black box this crate never models
//! (§1 Non-goals).

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
pub struct RecordCurrentPwmArgs {
    /// 1-based joint node id (1..=6).
    #[arg(long)]
    pub joint: u8,
    /// Open-loop PWM/control signal to hold.
    #[arg(long)]
    pub pwm: i16,
    /// Recording duration in seconds.
    #[arg(long, default_value_t = 3.0)]
    pub seconds: f64,
}

pub fn run(config: &RobotConfig, args: &RecordCurrentPwmArgs, sigint: Arc<AtomicBool>) -> Result<()> {
    let index = robot::joint_index(config, args.joint)?;
    let scheduler = robot::build_scheduler(config)?;
    let cycle_time_s = config.cycle_time_ms as f64 / 1000.0;
    let target_cycles = (args.seconds / cycle_time_s).ceil() as u64;
    let pwm = args.pwm;

    info!(joint = args.joint, pwm, "starting current/PWM recording");

    let done = Arc::new(AtomicBool::new(false));
    let done_recv = done.clone();

    let send = Box::new(move |_dt: Duration, view: &mut JointsView| {
        view.joints[index].set_open_loop_control_signal(pwm, true);
    });

    let recv = Box::new(move |_dt: Duration, view: &mut JointsView| {
        let joint = &view.joints[index];
        println!(
            "t:{:.4} pwm:{} current:{} u:{}",
            view.cycle_count as f64 * cycle_time_s,
            pwm,
            joint.get_current(),
            joint.get_control_signal()
        );
        if view.cycle_count + 1 >= target_cycles {
            done_recv.store(true, Ordering::SeqCst);
        }
    });

    run_until(scheduler, send, recv, done, sigint);
    info!("current/PWM recording complete");
    Ok(())
}
