//! Length-prefixed bincode framing.
//!
//! A frame is a 4-byte big-endian payload length followed by the bincode
//! encoding of one [`Command`].

use std::io::{self, Read, Write};

use super::protocol::Command;
use crate::error::{ClientError, Result};

/// Largest payload accepted from a peer.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

pub fn encode(cmd: &Command) -> Result<Vec<u8>> {
    let payload = bincode::serialize(cmd)?;
    if payload.len() > MAX_FRAME {
        return Err(ClientError::Protocol(format!(
            "outgoing {} frame is {} bytes",
            cmd.name(),
            payload.len()
        )));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| ClientError::Protocol("frame length overflow".into()))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn write_frame<W: Write>(w: &mut W, cmd: &Command) -> Result<()> {
    let frame = encode(cmd)?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Read one frame. A clean end of stream before the header surfaces as
/// `io::ErrorKind::UnexpectedEof`.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Command> {
    let mut header = [0u8; 4];
    r.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME {
        return Err(ClientError::Protocol(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

/// True for errors that just mean the peer went away.
pub fn is_disconnect(e: &ClientError) -> bool {
    matches!(
        e,
        ClientError::Io(io) if matches!(
            io.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{BasicKind, ObjectPayload};
    use std::io::Cursor;

    #[test]
    fn frames_are_length_prefixed() {
        let cmd = Command::basic(BasicKind::Ok, "hi");
        let frame = encode(&cmd).expect("encode");
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }

    #[test]
    fn reads_consecutive_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Command::client_handshake()).expect("write");
        write_frame(
            &mut buf,
            &Command::Object {
                id: 42,
                payload: ObjectPayload::Squeeze(true),
            },
        )
        .expect("write");
        let mut cursor = Cursor::new(buf);
        assert_eq!(
            read_frame(&mut cursor).expect("first"),
            Command::client_handshake()
        );
        assert!(matches!(
            read_frame(&mut cursor).expect("second"),
            Command::Object { id: 42, .. }
        ));
        let err = read_frame(&mut cursor).expect_err("eof");
        assert!(is_disconnect(&err));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let mut data = ((MAX_FRAME as u32) + 1).to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 8]);
        let err = read_frame(&mut Cursor::new(data)).expect_err("too big");
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn garbage_payload_is_a_codec_error() {
        let mut data = 2u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0xff, 0xff]);
        let err = read_frame(&mut Cursor::new(data)).expect_err("garbage");
        assert!(matches!(err, ClientError::Codec(_)));
    }
}
