//! Serial transport: a real microcontroller over a physical serial
//! port (§6: "a serial transport — fixed device path, 115200+ baud").

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelError, Frame};
use crate::framing::{decode_frame, encode_frame};

/// A [`Channel`] backed by an OS serial port, framed with
/// [`crate::framing`].
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
    read_buf: Vec<u8>,
}

impl SerialChannel {
    /// Open `device` at `baud` with a short read timeout (polled in a
    /// loop by [`Self::receive`] rather than relied on directly, so
    /// the configured value only bounds individual `read()` calls).
    pub fn open(device: &str, baud: u32) -> Result<Self, ChannelError> {
        let port = serialport::new(device, baud)
            .timeout(Duration::from_millis(5))
            .open()?;
        Ok(Self {
            port,
            read_buf: Vec::with_capacity(256),
        })
    }
}

impl Channel for SerialChannel {
    fn send_to(&mut self, node_id: u8, opcode: u8, payload: &[u8]) -> Result<(), ChannelError> {
        let bytes = encode_frame(&Frame::new(node_id, opcode, payload.to_vec()));
        self.port.write_all(&bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut scratch = [0u8; 256];

        loop {
            if let Some((frame, consumed)) = decode_frame(&self.read_buf)? {
                self.read_buf.drain(..consumed);
                return Ok(Some(frame));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            match self.port.read(&mut scratch) {
                Ok(0) => {}
                Ok(n) => self.read_buf.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
