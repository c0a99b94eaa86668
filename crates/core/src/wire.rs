//! Length-prefixed message framing used on every socket in the system.
//!
//! A frame is the decimal byte length of the payload, a single space, then
//! exactly that many payload bytes. Payloads are arbitrary bytes; piece
//! transfers ride the same framing as text commands.

use std::io::{self, Read, Write};

use crate::error::{ShareError, ShareResult};

// A length header longer than this cannot describe a real payload.
const MAX_HEADER_DIGITS: u32 = 10;

/// Write one frame to `writer`.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let header = format!("{} ", payload.len());
    writer.write_all(header.as_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames. EOF inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len: usize = 0;
    let mut digits = 0u32;
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            if digits == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a frame header",
            ));
        }
        match byte[0] {
            b'0'..=b'9' => {
                if digits == MAX_HEADER_DIGITS {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "frame length header too long",
                    ));
                }
                len = len * 10 + (byte[0] - b'0') as usize;
                digits += 1;
            }
            b' ' if digits > 0 => break,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed frame length header",
                ));
            }
        }
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

pub const SUCCESS_PREFIX: &[u8] = b"Success: ";
pub const ERROR_PREFIX: &[u8] = b"Error: ";

/// Render a handler result as a response payload.
pub fn render_reply(result: ShareResult<Vec<u8>>) -> Vec<u8> {
    let (prefix, body) = match result {
        Ok(body) => (SUCCESS_PREFIX, body),
        Err(e) => (ERROR_PREFIX, e.to_string().into_bytes()),
    };
    let mut reply = Vec::with_capacity(prefix.len() + body.len());
    reply.extend_from_slice(prefix);
    reply.extend_from_slice(&body);
    reply
}

/// Split a response payload back into the success body or the remote error.
pub fn split_reply(frame: Vec<u8>) -> ShareResult<Vec<u8>> {
    if let Some(body) = frame.strip_prefix(SUCCESS_PREFIX) {
        return Ok(body.to_vec());
    }
    if let Some(body) = frame.strip_prefix(ERROR_PREFIX) {
        return Err(ShareError::Remote(
            String::from_utf8_lossy(body).into_owned(),
        ));
    }
    Err(ShareError::Remote(
        "response is missing the Success/Error prefix".to_string(),
    ))
}

/// `split_reply` for text responses.
pub fn split_text_reply(frame: Vec<u8>) -> ShareResult<String> {
    let body = split_reply(frame)?;
    String::from_utf8(body)
        .map_err(|_| ShareError::Remote("response is not valid UTF-8".to_string()))
}
