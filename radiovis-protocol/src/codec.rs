//! STOMP 1.0 frame codec.
//!
//! Frame format:
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! The body ends at the NUL octet, or after exactly `content-length` bytes
//! when that header is present. Blank lines between frames are heart-beats.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::types::*;

const CONTENT_LENGTH: &str = "content-length";

/// Encode a frame into bytes.
pub fn encode_frame(frame: &Frame) -> Bytes {
    let headers_len: usize = frame
        .headers
        .iter()
        .map(|(k, v)| k.len() + v.len() + 2)
        .sum();
    let mut buf = BytesMut::with_capacity(frame.command.as_str().len() + headers_len + frame.body.len() + 3);

    buf.put_slice(frame.command.as_str().as_bytes());
    buf.put_u8(b'\n');
    for (key, value) in &frame.headers {
        buf.put_slice(key.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(value.as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');
    buf.put_slice(&frame.body);
    buf.put_u8(0);

    buf.freeze()
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more data is needed; consumed bytes are removed
/// from `buf` only when a complete frame is returned. Leading heart-beat
/// line ends are always dropped.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let heartbeat = buf
        .iter()
        .take_while(|b| **b == b'\n' || **b == b'\r')
        .count();
    buf.advance(heartbeat);

    if buf.is_empty() {
        return Ok(None);
    }

    let Some((header_end, body_start)) = find_header_end(buf) else {
        return incomplete(buf.len());
    };

    let (command, headers) = parse_head(&buf[..header_end])?;

    let content_length = headers
        .iter()
        .find(|(k, _)| k == CONTENT_LENGTH)
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            if len > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge(len, MAX_FRAME_SIZE));
            }
            let end = body_start + len;
            if buf.len() <= end {
                return Ok(None);
            }
            if buf[end] != 0 {
                return Err(ProtocolError::MissingTerminator);
            }
            end
        }
        None => match buf[body_start..].iter().position(|b| *b == 0) {
            Some(pos) => body_start + pos,
            None => return incomplete(buf.len()),
        },
    };

    let raw = buf.split_to(body_end + 1).freeze();
    let body = raw.slice(body_start..body_end);

    Ok(Some(Frame {
        command,
        headers,
        body,
    }))
}

/// Locate the blank line ending the header block.
///
/// Returns the end of the header block and the start of the body.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    while let Some(offset) = buf[line_start..].iter().position(|b| *b == b'\n') {
        let newline = line_start + offset;
        let line = &buf[line_start..newline];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && line_start > 0 {
            return Some((line_start, newline + 1));
        }
        line_start = newline + 1;
    }
    None
}

fn parse_head(head: &[u8]) -> Result<(Command, Vec<(String, String)>), ProtocolError> {
    let text =
        std::str::from_utf8(head).map_err(|e| ProtocolError::DecodeError(e.to_string()))?;
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty());

    let command_line = lines.next().unwrap_or_default();
    let command = Command::try_from(command_line).map_err(ProtocolError::UnknownCommand)?;

    let mut headers = Vec::new();
    for line in lines {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
        headers.push((key.to_string(), value.to_string()));
    }

    Ok((command, headers))
}

fn incomplete(buffered: usize) -> Result<Option<Frame>, ProtocolError> {
    if buffered > MAX_FRAME_SIZE {
        Err(ProtocolError::FrameTooLarge(buffered, MAX_FRAME_SIZE))
    } else {
        Ok(None)
    }
}

/// `CONNECT` frame, with credentials when given.
pub fn connect_frame(login: Option<&str>, passcode: Option<&str>) -> Frame {
    let mut frame = Frame::new(Command::Connect);
    if let Some(login) = login {
        frame = frame.header("login", login);
    }
    if let Some(passcode) = passcode {
        frame = frame.header("passcode", passcode);
    }
    frame
}

/// `SUBSCRIBE` frame with automatic acknowledgement.
pub fn subscribe_frame(destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("destination", destination)
        .header("ack", "auto")
}

/// `SEND` frame. Extra headers follow `destination` and precede
/// `content-length`.
pub fn send_frame(destination: &str, headers: &[(&str, &str)], body: impl Into<Bytes>) -> Frame {
    let body = body.into();
    let mut frame = Frame::new(Command::Send).header("destination", destination);
    for (key, value) in headers {
        frame = frame.header(*key, *value);
    }
    frame
        .header(CONTENT_LENGTH, body.len().to_string())
        .body(body)
}

/// `DISCONNECT` frame.
pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe() {
        let encoded = encode_frame(&subscribe_frame("/topic/drm/abcdef/text"));
        assert_eq!(
            &encoded[..],
            b"SUBSCRIBE\ndestination:/topic/drm/abcdef/text\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_encode_send_has_content_length() {
        let frame = send_frame("/topic/x/image", &[("link", "http://example.com")], "SHOW a.png");
        let encoded = encode_frame(&frame);
        assert_eq!(
            &encoded[..],
            &b"SEND\ndestination:/topic/x/image\nlink:http://example.com\ncontent-length:10\n\nSHOW a.png\0"[..]
        );
    }

    #[test]
    fn test_decode_message() {
        let mut buf = BytesMut::from(
            &b"MESSAGE\ndestination:/topic/x/text\nmessage-id:1\n\nTEXT hello\0"[..],
        );
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get_header("destination"), Some("/topic/x/text"));
        assert_eq!(frame.get_header("message-id"), Some("1"));
        assert_eq!(&frame.body[..], b"TEXT hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_then_complete() {
        let wire = b"CONNECTED\nsession:abc\n\n\0";
        let mut buf = BytesMut::new();
        for chunk in wire.chunks(5) {
            assert!(buf.is_empty() || decode_frame(&mut buf).unwrap().is_none());
            buf.extend_from_slice(chunk);
        }
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get_header("session"), Some("abc"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_decode_consecutive_frames_and_heartbeats() {
        let mut buf = BytesMut::from(
            &b"\n\nRECEIPT\nreceipt-id:7\n\n\0\r\nERROR\nmessage:bad\n\noops\0\n"[..],
        );
        let first = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(first.command, Command::Receipt);
        let second = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(second.command, Command::Error);
        assert_eq!(&second.body[..], b"oops");
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_content_length_body_with_nul() {
        let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:3\n\na\0b\0"[..]);
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.body[..], b"a\0b");
    }

    #[test]
    fn test_decode_crlf_headers() {
        let mut buf = BytesMut::from(&b"MESSAGE\r\nlink:http://example.com\r\n\r\nSHOW x\0"[..]);
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.get_header("link"), Some("http://example.com"));
        assert_eq!(&frame.body[..], b"SHOW x");
    }

    #[test]
    fn test_decode_errors() {
        let mut unknown = BytesMut::from(&b"BOGUS\n\n\0"[..]);
        assert_eq!(
            decode_frame(&mut unknown),
            Err(ProtocolError::UnknownCommand("BOGUS".to_string()))
        );

        let mut malformed = BytesMut::from(&b"MESSAGE\nnocolon\n\n\0"[..]);
        assert!(matches!(
            decode_frame(&mut malformed),
            Err(ProtocolError::MalformedHeader(_))
        ));

        let mut unterminated = BytesMut::from(&b"MESSAGE\ncontent-length:1\n\nab"[..]);
        assert_eq!(
            decode_frame(&mut unterminated),
            Err(ProtocolError::MissingTerminator)
        );
    }
}
