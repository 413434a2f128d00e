//! `record-optical-encoder-data` (§6, §10.5): hold one joint at a fixed
//! open-loop PWM for `seconds` and print its optical-encoder diagnostic
//! channel once per cycle — the offline data used to fit the
//! two-channel quadrature lookup table (§4.2, explicitly a black box
//! this crate never builds itself).

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
pub struct RecordOpticalArgs {
    /// 1-based joint node id (1..=6).
    #[arg(long)]
    pub joint: u8,
    /// Open-loop PWM/control signal to hold for the whole recording.
    #[arg(long)]
    pub pwm: i16,
    /// Recording duration in seconds.
    #[arg(long)]
    pub seconds: f64,
}

pub fn run(config: &RobotConfig, args: &RecordOpticalArgs, sigint: Arc<AtomicBool>) -> Result<()> {
    let index = robot::joint_index(config, args.joint)?;
    let scheduler = robot::build_scheduler(config)?;
    let cycle_time_s = config.cycle_time_ms as f64 / 1000.0;
    let target_cycles = (args.seconds / cycle_time_s).ceil() as u64;
    let pwm = args.pwm;

    info!(
        joint = args.joint,
        pwm, seconds = args.seconds, "starting optical encoder recording"
    );

    let done = Arc::new(AtomicBool::new(false));
    let done_recv = done.clone();

    let send = Box::new(move |_dt: Duration, view: &mut JointsView| {
        view.joints[index].set_open_loop_control_signal(pwm, true);
    });

    let recv = Box::new(move |_dt: Duration, view: &mut JointsView| {
        let joint = &view.joints[index];
        match joint.get_optical_encoder_channel_data() {
            Some(d) => println!(
                "t:{:.4} a:{} b:{} min_idx:{} min_cost:{}",
                view.cycle_count as f64 * cycle_time_s,
                d.a,
                d.b,
                d.min_cost_index,
                d.min_cost
            ),
            None => println!(
                "t:{:.4} a: b: min_idx: min_cost:",
                view.cycle_count as f64 * cycle_time_s
            ),
        }
        if view.cycle_count + 1 >= target_cycles {
            done_recv.store(true, Ordering::SeqCst);
        }
    });

    run_until(scheduler, send, recv, done, sigint);
    info!("optical encoder recording complete");
    Ok(())
}
