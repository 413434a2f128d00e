//! The four playback/diagnostic subcommands (§10.5), one module each:
//! `recordeOpticalEncoderData`, `recordeMomentOfInertia`,
//! `recordeCurrentAndPwmBehaviour`, and `playPath` — as runtime-selected
//! `clap` subcommands instead of a compile-time mode `#define` (§11
//! REDESIGN FLAGS).

mod play_path;
mod record_current_pwm;
mod record_inertia;
mod record_optical;

pub use play_path::{run as run_play_path, PlayPathArgs};
pub use record_current_pwm::{run as run_record_current_pwm, RecordCurrentPwmArgs};
pub use record_inertia::{run as run_record_inertia, RecordInertiaArgs};
pub use record_optical::{run as run_record_optical, RecordOpticalArgs};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use servo_host::scheduler::{RecvHandler, SendHandler};
use servo_host::RobotScheduler;

/// Run `scheduler` with `send`/`recv` installed until either `done` is
/// set (normally by the recv handler itself, on completion) or `sigint`
/// is observed, then shut down cleanly so no half-written frame is left
/// on the wire.
pub(crate) fn run_until(
    scheduler: RobotScheduler,
    send: SendHandler,
    recv: RecvHandler,
    done: Arc<AtomicBool>,
    sigint: Arc<AtomicBool>,
) {
    scheduler.set_handler_functions(send, recv);
    let mut running = scheduler.run();
    while !done.load(Ordering::SeqCst) && !sigint.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));
    }
    running.shutdown();
}
