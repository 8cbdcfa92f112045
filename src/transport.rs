//! Pluggable wire framing.
//!
//! Two policies share one interface: [`RawPolicy`] sends a payload as a single
//! frame and trusts the transport to deliver exactly those bytes;
//! [`SizePrefixedPolicy`] sends an explicit length frame ahead of the payload
//! and verifies the `MORE` flag on receipt, catching a framing mismatch as a
//! protocol error instead of silently misreading a stream.

use crate::error::FrameworkError;
use crate::serialize::ByteArray;
use crate::socket::has_more;

/// How a logical payload maps onto one or more zmq frames.
pub trait TransmissionPolicy: Send + Sync {
    fn send_buffer(&self, socket: &zmq::Socket, payload: &[u8]) -> Result<(), FrameworkError>;
    fn receive_buffer(&self, socket: &zmq::Socket) -> Result<ByteArray, FrameworkError>;
}

/// Single frame, implicit size — the payload is exactly what the transport
/// delivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPolicy;

impl TransmissionPolicy for RawPolicy {
    fn send_buffer(&self, socket: &zmq::Socket, payload: &[u8]) -> Result<(), FrameworkError> {
        socket.send(payload, 0)?;
        Ok(())
    }

    fn receive_buffer(&self, socket: &zmq::Socket) -> Result<ByteArray, FrameworkError> {
        Ok(socket.recv_bytes(0)?)
    }
}

/// Two frames: an explicit `u64` size (host-endian, `MORE` set) followed by
/// the payload. Guards against a corrupt declared size with a configurable
/// ceiling.
#[derive(Debug, Clone, Copy)]
pub struct SizePrefixedPolicy {
    pub max_len: u64,
}

impl Default for SizePrefixedPolicy {
    fn default() -> Self {
        SizePrefixedPolicy {
            max_len: crate::serialize::MAX_SEQUENCE_LEN,
        }
    }
}

impl TransmissionPolicy for SizePrefixedPolicy {
    fn send_buffer(&self, socket: &zmq::Socket, payload: &[u8]) -> Result<(), FrameworkError> {
        let size = payload.len() as u64;
        socket.send(&size.to_ne_bytes(), zmq::SNDMORE)?;
        socket.send(payload, 0)?;
        Ok(())
    }

    fn receive_buffer(&self, socket: &zmq::Socket) -> Result<ByteArray, FrameworkError> {
        let size_frame = socket.recv_bytes(0)?;
        if size_frame.len() != 8 {
            return Err(FrameworkError::protocol(format!(
                "expected an 8-byte size frame, got {} bytes",
                size_frame.len()
            )));
        }
        if !has_more(socket)? {
            return Err(FrameworkError::protocol(
                "size-prefixed receiver expected a MORE frame after the size prefix",
            ));
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&size_frame);
        let declared = u64::from_ne_bytes(arr);
        if declared > self.max_len {
            return Err(FrameworkError::protocol(format!(
                "declared payload size {} exceeds maximum {}",
                declared, self.max_len
            )));
        }
        let payload = socket.recv_bytes(0)?;
        if payload.len() as u64 != declared {
            return Err(FrameworkError::protocol(format!(
                "declared payload size {} does not match received {} bytes",
                declared,
                payload.len()
            )));
        }
        Ok(payload)
    }
}
