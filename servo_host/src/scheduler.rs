//! Fixed-cycle dispatcher fanning trajectory samples out to N joints
//! and reading telemetry back (§4.6, §5 "Host" concurrency model).
//!
//! A synchronous handshake loop at construction time, then one worker
//! thread running `sleep_until` → send handler → per-joint `run()` →
//! recv handler, forever, until `shutdown()`.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use servo_transport::Channel;

use crate::communicator::JointCommunicator;

/// A cycle-bound view into scheduler state, handed to the send/recv
/// handlers (§9 "Handlers as closures with shared mutable state").
pub struct JointsView<'a> {
    pub joints: &'a mut [JointCommunicator],
    /// Positions materialised at the end of the *previous* cycle's
    /// dispatch (§9 Open Question: recv handler sees post-dispatch
    /// values, so by the time the *next* cycle's send handler runs,
    /// this reflects the prior cycle).
    pub current_position: &'a [f64],
    pub cycle_count: u64,
    pub control: SchedulerControl,
}

pub type SendHandler = Box<dyn FnMut(Duration, &mut JointsView) + Send>;
pub type RecvHandler = Box<dyn FnMut(Duration, &mut JointsView) + Send>;

struct HandlerPair {
    send: SendHandler,
    recv: RecvHandler,
}

impl HandlerPair {
    fn noop() -> Self {
        Self {
            send: Box::new(|_, _| {}),
            recv: Box::new(|_, _| {}),
        }
    }
}

/// A cheap, cloneable handle a handler can use to call back into the
/// scheduler (e.g. tearing itself down on communication loss, §8
/// scenario 4) without holding a borrow of the scheduler itself.
///
/// The worker never calls a handler while holding `handlers` locked —
/// it snapshots the pair out under the lock, runs it with the lock
/// released, and only reinstalls its snapshot afterwards if `changed`
/// shows nothing wrote a new pair in the meantime. That's what lets a
/// handler call back into `remove_handler_functions`/
/// `set_handler_functions` on its own thread without deadlocking on
/// this same, non-reentrant mutex.
#[derive(Clone)]
pub struct SchedulerControl {
    handlers: Arc<Mutex<HandlerPair>>,
    changed: Arc<AtomicBool>,
}

impl SchedulerControl {
    /// Install no-op handlers (§4.6 `removeHandlerFunctions`).
    pub fn remove_handler_functions(&self) {
        let mut guard = self.handlers.lock().unwrap();
        *guard = HandlerPair::noop();
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Atomically replace both handlers (§4.6 `setHandlerFunctions`).
    pub fn set_handler_functions(&self, send: SendHandler, recv: RecvHandler) {
        let mut guard = self.handlers.lock().unwrap();
        guard.send = send;
        guard.recv = recv;
        self.changed.store(true, Ordering::SeqCst);
    }
}

/// A constructed, handshake-complete scheduler not yet running its
/// worker thread.
pub struct RobotScheduler {
    joints: Vec<JointCommunicator>,
    channel: Box<dyn Channel>,
    cycle_time: Duration,
    current_position: Vec<f64>,
    control: SchedulerControl,
}

impl RobotScheduler {
    /// Build a scheduler, blocking synchronously until every joint's
    /// handshake reaches `Ready` (§8 scenario 3) before the worker
    /// thread is ever spawned.
    pub fn new(mut joints: Vec<JointCommunicator>, mut channel: Box<dyn Channel>, cycle_time: Duration) -> Self {
        while !joints.iter().all(|j| j.is_init_complete()) {
            for joint in joints.iter_mut() {
                joint.run(channel.as_mut());
            }
        }
        info!(joint_count = joints.len(), "all joints ready");

        let current_position = joints.iter().map(|j| j.get_position()).collect();
        Self {
            joints,
            channel,
            cycle_time,
            current_position,
            control: SchedulerControl {
                handlers: Arc::new(Mutex::new(HandlerPair::noop())),
                changed: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// A cloneable handle for installing/removing handlers, usable
    /// before or after [`Self::run`] is called.
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    pub fn set_handler_functions(&self, send: SendHandler, recv: RecvHandler) {
        self.control.set_handler_functions(send, recv);
    }

    pub fn remove_handler_functions(&self) {
        self.control.remove_handler_functions();
    }

    /// Spawn the worker thread and start the periodic cycle. Consumes
    /// `self`; the returned [`RunningScheduler`] is the only way to
    /// stop it again.
    pub fn run(self) -> RunningScheduler {
        let RobotScheduler {
            mut joints,
            mut channel,
            cycle_time,
            mut current_position,
            control,
        } = self;

        let shutting_down = Arc::new(AtomicBool::new(false));
        let worker_shutting_down = shutting_down.clone();
        let worker_control = control.clone();

        let worker = thread::spawn(move || {
            let mut deadline = Instant::now() + cycle_time;
            let mut cycle_count: u64 = 0;

            while !worker_shutting_down.load(Ordering::SeqCst) {
                advance_deadline(&mut deadline, cycle_time);

                worker_control.changed.store(false, Ordering::SeqCst);
                let mut pair = {
                    let mut guard = worker_control.handlers.lock().unwrap();
                    mem::replace(&mut *guard, HandlerPair::noop())
                };

                {
                    let mut view = JointsView {
                        joints: &mut joints,
                        current_position: &current_position,
                        cycle_count,
                        control: worker_control.clone(),
                    };
                    (pair.send)(cycle_time, &mut view);
                }

                for joint in joints.iter_mut() {
                    joint.run(channel.as_mut());
                }
                for (i, joint) in joints.iter().enumerate() {
                    current_position[i] = joint.get_position();
                }

                {
                    let mut view = JointsView {
                        joints: &mut joints,
                        current_position: &current_position,
                        cycle_count,
                        control: worker_control.clone(),
                    };
                    (pair.recv)(cycle_time, &mut view);
                }

                if !worker_control.changed.load(Ordering::SeqCst) {
                    let mut guard = worker_control.handlers.lock().unwrap();
                    *guard = pair;
                }

                cycle_count += 1;
            }
        });

        RunningScheduler {
            shutting_down,
            worker: Some(worker),
            control,
        }
    }
}

/// Advance `deadline` by one `cycle_time`, sleeping if we're ahead of
/// it and logging (not aborting) if we've fallen more than one cycle
/// behind (§4.6 "Missed deadlines do not abort").
fn advance_deadline(deadline: &mut Instant, cycle_time: Duration) {
    let now = Instant::now();
    if *deadline > now {
        thread::sleep(*deadline - now);
    } else {
        let behind = now.duration_since(*deadline);
        if behind > cycle_time {
            warn!(behind_us = behind.as_micros(), "scheduler cycle overrun, catching up");
        }
    }
    *deadline += cycle_time;
}

/// A running scheduler. Dropping this without calling [`Self::shutdown`]
/// leaves the worker thread running detached — always call `shutdown`.
pub struct RunningScheduler {
    shutting_down: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    control: SchedulerControl,
}

impl RunningScheduler {
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    pub fn set_handler_functions(&self, send: SendHandler, recv: RecvHandler) {
        self.control.set_handler_functions(send, recv);
    }

    pub fn remove_handler_functions(&self) {
        self.control.remove_handler_functions();
    }

    /// Request shutdown and join the worker thread. Idempotent: a
    /// second call is a no-op (§4.6 `shutdown()`).
    pub fn shutdown(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for RunningScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::encode_telemetry;
    use servo_common::reference::JointScaling;
    use servo_transport::{opcode, SimulatedChannel};
    use std::sync::atomic::AtomicU64;

    fn scaling() -> JointScaling {
        JointScaling {
            scale: 1.0,
            offset: 0.0,
            position_reference_offset: 0.0,
            u_scale: 1.0,
        }
    }

    fn spawn_stub_device(mut device_end: SimulatedChannel) {
        thread::spawn(move || loop {
            match device_end.receive(Duration::from_millis(200)) {
                Ok(Some(_)) => {
                    let payload = encode_telemetry(0.0, 0, 0.0, 0, 0, None);
                    if device_end.send_to(1, opcode::TELEMETRY, &payload).is_err() {
                        break;
                    }
                }
                Ok(None) => continue,
                Err(_) => break,
            }
        });
    }

    #[test]
    fn cycles_drive_send_then_recv_handlers() {
        let (host_end, device_end) = SimulatedChannel::pair();
        spawn_stub_device(device_end);

        let joint = JointCommunicator::new(1, scaling());
        let scheduler = RobotScheduler::new(vec![joint], Box::new(host_end), Duration::from_millis(5));

        let send_count = Arc::new(AtomicU64::new(0));
        let recv_count = Arc::new(AtomicU64::new(0));
        let sc = send_count.clone();
        let rc = recv_count.clone();

        scheduler.set_handler_functions(
            Box::new(move |_dt, _view| {
                sc.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(move |_dt, _view| {
                rc.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut running = scheduler.run();
        thread::sleep(Duration::from_millis(60));
        running.shutdown();

        assert!(send_count.load(Ordering::SeqCst) >= 5);
        assert!(recv_count.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn remove_handler_functions_installs_noops() {
        let (host_end, device_end) = SimulatedChannel::pair();
        spawn_stub_device(device_end);

        let joint = JointCommunicator::new(1, scaling());
        let scheduler = RobotScheduler::new(vec![joint], Box::new(host_end), Duration::from_millis(5));

        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        scheduler.set_handler_functions(
            Box::new(move |_dt, view: &mut JointsView| {
                c.fetch_add(1, Ordering::SeqCst);
                view.control.remove_handler_functions();
            }),
            Box::new(|_, _| {}),
        );

        let mut running = scheduler.run();
        thread::sleep(Duration::from_millis(60));
        running.shutdown();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
