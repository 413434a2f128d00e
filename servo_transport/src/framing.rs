//! Length-prefixed frame encoding with a CRC-16 trailer (§6: "serial
//! transport... length-prefixed framing with CRC"), shared by the
//! serial and simulated (wire-exercising) transports.
//!
//! Wire layout: `[SYNC, node_id, opcode, len_lo, len_hi, payload...,
//! crc_lo, crc_hi]`. `crc` covers everything from `node_id` through
//! the end of `payload`.

use crc::{Crc, CRC_16_XMODEM};

use crate::channel::{ChannelError, Frame};

const SYNC: u8 = 0x7E;
const HEADER_LEN: usize = 5; // sync + node_id + opcode + len(u16 LE)
const CRC_LEN: usize = 2;
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Encode `frame` as a complete wire-ready byte sequence.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + frame.payload.len());
    body.push(frame.node_id);
    body.push(frame.opcode);
    body.extend_from_slice(&(frame.payload.len() as u16).to_le_bytes());
    body.extend_from_slice(&frame.payload);

    let crc = CRC16.checksum(&body);

    let mut out = Vec::with_capacity(1 + body.len() + CRC_LEN);
    out.push(SYNC);
    out.extend_from_slice(&body);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Attempt to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet contain a complete frame
/// (the caller should read more bytes and retry) — this is not a CRC
/// failure, just an incomplete read. Returns `Ok(Some((frame,
/// consumed)))` on success, where `consumed` is the number of leading
/// bytes of `buf` the frame occupied (including any skipped noise
/// before the sync byte), or `Err` on a genuine CRC mismatch.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ChannelError> {
    let Some(start) = buf.iter().position(|&b| b == SYNC) else {
        return Ok(None);
    };
    let rest = &buf[start..];

    if rest.len() < HEADER_LEN {
        return Ok(None);
    }

    let node_id = rest[1];
    let opcode = rest[2];
    let len = u16::from_le_bytes([rest[3], rest[4]]) as usize;
    let total = HEADER_LEN + len + CRC_LEN;

    if rest.len() < total {
        return Ok(None);
    }

    let body = &rest[1..HEADER_LEN + len];
    let crc_received = u16::from_le_bytes([rest[HEADER_LEN + len], rest[HEADER_LEN + len + 1]]);
    let crc_computed = CRC16.checksum(body);
    if crc_received != crc_computed {
        return Err(ChannelError::CrcMismatch { node_id });
    }

    let payload = rest[HEADER_LEN..HEADER_LEN + len].to_vec();
    Ok(Some((
        Frame {
            node_id,
            opcode,
            payload,
        },
        start + total,
    )))
}
