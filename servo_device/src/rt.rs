//! Hard-real-time cycle runner for [`crate::ServoControlLoop`] (§5
//! Concurrency & Resource Model: "single-threaded, cooperative,
//! deterministic per tick").
//!
//! Every RT syscall (`mlockall`, `sched_setaffinity`, `SCHED_FIFO`) is
//! behind the `rt` feature with a no-op fallback, so the same binary
//! runs (at approximate timing) on a development machine and (at hard
//! real-time guarantees) on an isolated core in production.

use std::time::Duration;

use crate::ServoControlLoop;

/// Errors from RT setup or the cycle loop itself.
#[derive(Debug, thiserror::Error)]
pub enum RtError {
    /// An RT syscall (`mlockall`, `sched_setaffinity`,
    /// `sched_setscheduler`) failed.
    #[error("RT setup failed: {0}")]
    Setup(String),
}

/// Lock all current and future memory pages. No-op without the `rt`
/// feature.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::Setup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtError> {
    Ok(())
}

/// Pin the current thread to `cpu`. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RtError::Setup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RtError::Setup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(())
}

/// Set `SCHED_FIFO` with `priority`. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RtError::Setup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(())
}

/// Full RT setup sequence. Must run once, before entering
/// [`DeviceRuntime::run`]. A no-op sequence entirely when the `rt`
/// feature is disabled.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

/// Drives one [`ServoControlLoop`] at a fixed cadence, forever.
///
/// Off the `rt` feature this uses `std::thread::sleep` for
/// approximate pacing (development, the CLI's simulated drivers);
/// with `rt` enabled it uses `clock_nanosleep(TIMER_ABSTIME)` against
/// `CLOCK_MONOTONIC` for drift-free pacing, matching the original
/// firmware's fixed-rate timer ISR.
pub struct DeviceRuntime {
    servo: ServoControlLoop,
    tick_period_us: u64,
    cycle_count: u64,
}

impl DeviceRuntime {
    /// Wrap a configured, not-yet-enabled control loop. `tick_period_us`
    /// should match the loop's own `dt_s` configuration.
    pub fn new(servo: ServoControlLoop, tick_period_us: u64) -> Self {
        Self {
            servo,
            tick_period_us,
            cycle_count: 0,
        }
    }

    /// Number of ticks executed so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Borrow the underlying control loop (e.g. for a serial
    /// command-handler thread to call `enable`/`load_new_reference`).
    pub fn servo_mut(&mut self) -> &mut ServoControlLoop {
        &mut self.servo
    }

    /// Enter the cycle loop. Never returns under normal operation.
    pub fn run(&mut self) -> Result<(), RtError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop()
        }
        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop()
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), RtError> {
        use nix::sys::time::TimeSpec;
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = self.tick_period_us as i64 * 1_000;
        let mut next_wake =
            clock_gettime(clock).map_err(|e| RtError::Setup(format!("clock_gettime: {e}")))?;

        loop {
            next_wake = timespec_add_ns(next_wake, period_ns);

            let now =
                clock_gettime(clock).map_err(|e| RtError::Setup(format!("clock_gettime: {e}")))?;
            let now_us = (now.tv_sec() as u64) * 1_000_000 + (now.tv_nsec() as u64) / 1_000;

            self.servo.tick(now_us);
            self.cycle_count += 1;

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self) -> Result<(), RtError> {
        use std::time::Instant;

        let period = Duration::from_micros(self.tick_period_us);
        let start = Instant::now();

        loop {
            let cycle_start = Instant::now();
            let now_us = cycle_start.duration_since(start).as_micros() as u64;

            self.servo.tick(now_us);
            self.cycle_count += 1;

            if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
    }
}

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rt_setup_is_noop_without_rt_feature() {
        assert!(rt_setup(0, 80).is_ok());
    }
}
