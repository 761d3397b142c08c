//! gRPC-Web <-> gRPC translation (spec.md §4.10). Request content-type is
//! rewritten between `application/grpc-web+proto` and `application/grpc
//! +proto`; messages pass through unchanged in the length-prefixed
//! message (LPM) format: 1 byte flags, 4 bytes big-endian length,
//! payload. A trailing gRPC-Web "trailer frame" carries what HTTP/2
//! would otherwise send as a trailers frame, length-prefixed with the
//! MSB of its flag byte set (`0x80`).

use bytes::{BufMut, Bytes, BytesMut};

pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";
pub const GRPC_CONTENT_TYPE: &str = "application/grpc+proto";

/// MSB of the LPM flag byte marking a frame as a trailer block rather
/// than a data message (spec.md §4.10).
const TRAILER_FLAG: u8 = 0x80;

pub fn web_content_type_to_grpc(content_type: &str) -> Option<&'static str> {
    if content_type.starts_with("application/grpc-web") {
        Some(GRPC_CONTENT_TYPE)
    } else {
        None
    }
}

pub fn grpc_content_type_to_web(content_type: &str) -> Option<&'static str> {
    if content_type.starts_with("application/grpc") && !content_type.starts_with("application/grpc-web") {
        Some(GRPC_WEB_CONTENT_TYPE)
    } else {
        None
    }
}

/// Encodes gRPC trailer metadata (`grpc-status`, `grpc-message`, and any
/// extra metadata entries) as a single trailer-LPM frame appended after
/// the response's DATA frames, per spec.md §4.10's ordering rule.
pub fn encode_trailer_frame(grpc_status: i32, grpc_message: &str, extra: &[(&str, &str)]) -> Bytes {
    let mut block = String::new();
    block.push_str(&format!("grpc-status: {grpc_status}\r\n"));
    if !grpc_message.is_empty() {
        block.push_str(&format!("grpc-message: {grpc_message}\r\n"));
    }
    for (k, v) in extra {
        block.push_str(&format!("{k}: {v}\r\n"));
    }
    let payload = block.into_bytes();

    let mut out = BytesMut::with_capacity(5 + payload.len());
    out.put_u8(TRAILER_FLAG);
    out.put_u32(payload.len() as u32);
    out.extend_from_slice(&payload);
    out.freeze()
}

/// Splits a byte stream into individual LPM frames, returning
/// `(is_trailer, payload)` pairs. Used to re-stitch a gRPC-Web body into
/// its DATA frames plus an optional trailer frame.
pub fn split_lpm_frames(mut buf: &[u8]) -> Vec<(bool, Bytes)> {
    let mut frames = Vec::new();
    while buf.len() >= 5 {
        let flags = buf[0];
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if buf.len() < 5 + len {
            break;
        }
        let payload = Bytes::copy_from_slice(&buf[5..5 + len]);
        frames.push((flags & TRAILER_FLAG != 0, payload));
        buf = &buf[5 + len..];
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_request_content_type_web_to_grpc() {
        assert_eq!(web_content_type_to_grpc("application/grpc-web+proto"), Some(GRPC_CONTENT_TYPE));
        assert_eq!(web_content_type_to_grpc("application/grpc-web-text"), Some(GRPC_CONTENT_TYPE));
        assert_eq!(web_content_type_to_grpc("application/json"), None);
    }

    #[test]
    fn rewrites_response_content_type_grpc_to_web() {
        assert_eq!(grpc_content_type_to_web("application/grpc+proto"), Some(GRPC_WEB_CONTENT_TYPE));
        assert_eq!(grpc_content_type_to_web("application/grpc-web+proto"), None);
    }

    #[test]
    fn trailer_frame_has_msb_set_and_round_trips_through_split() {
        let frame = encode_trailer_frame(0, "", &[]);
        assert_eq!(frame[0] & TRAILER_FLAG, TRAILER_FLAG);

        let data_frame = {
            let mut b = BytesMut::new();
            b.put_u8(0);
            b.put_u32(3);
            b.extend_from_slice(b"abc");
            b.freeze()
        };

        let mut combined = BytesMut::new();
        combined.extend_from_slice(&data_frame);
        combined.extend_from_slice(&frame);

        let parsed = split_lpm_frames(&combined);
        assert_eq!(parsed.len(), 2);
        assert!(!parsed[0].0);
        assert_eq!(parsed[0].1, Bytes::from_static(b"abc"));
        assert!(parsed[1].0);
    }

    #[test]
    fn trailer_frame_carries_status_and_message() {
        let frame = encode_trailer_frame(5, "not found", &[("x-extra", "1")]);
        let parsed = split_lpm_frames(&frame);
        let body = String::from_utf8(parsed[0].1.to_vec()).unwrap();
        assert!(body.contains("grpc-status: 5"));
        assert!(body.contains("grpc-message: not found"));
        assert!(body.contains("x-extra: 1"));
    }

    #[test]
    fn split_lpm_ignores_trailing_partial_frame() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u32(2);
        buf.extend_from_slice(&[1, 2]);
        // partial next frame: declares 10 bytes, only 2 present.
        buf.put_u8(0);
        buf.put_u32(10);
        buf.extend_from_slice(&[9, 9]);

        let frames = split_lpm_frames(&buf);
        assert_eq!(frames.len(), 1);
    }
}
