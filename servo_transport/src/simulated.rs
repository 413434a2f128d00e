//! In-process simulated transport (§6, §1: "this crate supplies a
//! reference serial and simulated implementation so the whole system
//! is runnable end to end without external hardware").
//!
//! Two [`SimulatedChannel`] endpoints, created together with
//! [`SimulatedChannel::pair`], hand frames directly to one another
//! through a pair of crossed queues — no wire encoding involved, since
//! there is no wire.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelError, Frame};

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Frame>>,
    arrived: Condvar,
}

impl Mailbox {
    fn push(&self, frame: Frame) {
        self.queue.lock().unwrap().push_back(frame);
        self.arrived.notify_one();
    }

    fn pop_wait(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(frame) = queue.pop_front() {
                return Some(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self.arrived.wait_timeout(queue, remaining).unwrap();
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
    }
}

/// One end of an in-process loopback pair. Sending on one end delivers
/// directly (synchronously enqueued, asynchronously drained) to the
/// peer's `receive`.
pub struct SimulatedChannel {
    outbox: Arc<Mailbox>,
    inbox: Arc<Mailbox>,
}

impl SimulatedChannel {
    /// Create two connected endpoints: frames sent on one arrive on
    /// the other's `receive`, and vice versa.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mailbox::default());
        let b_to_a = Arc::new(Mailbox::default());
        (
            Self {
                outbox: a_to_b.clone(),
                inbox: b_to_a.clone(),
            },
            Self {
                outbox: b_to_a,
                inbox: a_to_b,
            },
        )
    }
}

impl Channel for SimulatedChannel {
    fn send_to(&mut self, node_id: u8, opcode: u8, payload: &[u8]) -> Result<(), ChannelError> {
        self.outbox
            .push(Frame::new(node_id, opcode, payload.to_vec()));
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ChannelError> {
        Ok(self.inbox.pop_wait(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_sent_on_one_end_arrive_on_the_other() {
        let (mut a, mut b) = SimulatedChannel::pair();
        a.send_to(2, 0x01, &[9, 9]).unwrap();
        let frame = b.receive(Duration::from_millis(50)).unwrap().unwrap();
        assert_eq!(frame.node_id, 2);
        assert_eq!(frame.opcode, 0x01);
        assert_eq!(frame.payload, vec![9, 9]);
    }

    #[test]
    fn receive_times_out_when_nothing_sent() {
        let (_a, mut b) = SimulatedChannel::pair();
        assert_eq!(b.receive(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn is_bidirectional() {
        let (mut a, mut b) = SimulatedChannel::pair();
        b.send_to(5, 0x02, &[1]).unwrap();
        let frame = a.receive(Duration::from_millis(50)).unwrap().unwrap();
        assert_eq!(frame.node_id, 5);
    }
}
