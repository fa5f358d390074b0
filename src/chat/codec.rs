/// Chat line codec: frames a TCP byte stream into newline-delimited lines.
///
/// Splits on `\n` (tolerating a preceding `\r`), yields each line as a
/// `String`, and serializes outgoing lines with `\n` termination.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum buffered line length. Matches the 1024-byte read buffer of the
/// wire protocol; longer unterminated input is rejected, not reassembled.
const MAX_LINE_LENGTH: usize = 1024;

/// Codec error: an over-long line or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec that frames chat lines on `\n` boundaries.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Look for \n in the buffer.
        let newline_pos = src.iter().position(|&b| b == b'\n');

        match newline_pos {
            Some(pos) => {
                // Extract the line (without \n), advance the buffer.
                let line_bytes = src.split_to(pos);
                src.advance(1); // skip \n

                let line = std::str::from_utf8(&line_bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

                Ok(Some(line.trim_end_matches('\r').to_owned()))
            }
            None => {
                // No complete line yet. Check if buffer is getting too large.
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong);
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    // ── Decoder ──────────────────────────────────────────────────

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("alice\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "alice");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_strips_carriage_return() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("alice\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "alice");
    }

    #[test]
    fn decode_partial_line_then_complete() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("ali");

        // Not enough data yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // More data arrives.
        buf.extend_from_slice(b"ce\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "alice");
    }

    #[test]
    fn decode_two_lines_in_one_read() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("alice: hi\n/quit\n");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "alice: hi");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "/quit");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_empty_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from("\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "");
    }

    #[test]
    fn decode_rejects_oversized_unterminated_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LENGTH + 1].as_slice());
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::LineTooLong));
    }

    #[test]
    fn decode_empty_buffer() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    // ── Encoder ──────────────────────────────────────────────────

    #[test]
    fn encode_appends_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        codec.encode("Bem-vindo, alice!".to_owned(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"Bem-vindo, alice!\n");
    }

    // ── Roundtrip through codec ──────────────────────────────────

    #[test]
    fn roundtrip_through_codec() {
        let mut codec = LineCodec;

        let original = "[12:34:56] alice: hi".to_owned();
        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
    }
}
