use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Line terminator.
pub const NEWLINE: u8 = b'\n';

/// Default maximum line length: 16 MiB.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Configuration for the line codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes, terminator excluded. Default: 16 MiB.
    pub max_line_length: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE,
        }
    }
}

/// Encode one payload as a newline-terminated line.
///
/// Wire format:
/// ```text
/// {"jsonrpc":"2.0","id":1,"method":"ping","params":{}}\n
/// ```
pub fn encode_line(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.contains(&NEWLINE) {
        return Err(FrameError::EmbeddedNewline);
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(NEWLINE);
    Ok(())
}

/// Decode the next line from a buffer.
///
/// Stateless: every call scans `src` from the start. Streams go through
/// [`LineCodec`], which keeps its scan position between reads.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line and its terminator; a trailing `\r` is
/// stripped. An oversized line is reported without being consumed.
pub fn decode_line(src: &mut BytesMut, max_line: usize) -> Result<Option<Bytes>> {
    let Some(pos) = src.iter().position(|b| *b == NEWLINE) else {
        if src.len() > max_line {
            return Err(FrameError::LineTooLarge {
                size: src.len(),
                max: max_line,
            });
        }
        return Ok(None); // Need more data
    };

    if pos > max_line {
        return Err(FrameError::LineTooLarge {
            size: pos,
            max: max_line,
        });
    }

    let mut line = src.split_to(pos);
    src.advance(1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Ok(Some(line.freeze()))
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn splitter(max_line_length: usize) -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(vec![NEWLINE], vec![NEWLINE], max_line_length)
}

/// Splits a byte stream into non-blank lines.
///
/// Built on [`AnyDelimiterCodec`], which remembers how far it has scanned, so
/// a long line arriving in many reads is searched once. Oversized lines are
/// dropped up to their terminator instead of failing the stream, and an
/// unterminated fragment at EOF is dropped.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
    inner: AnyDelimiterCodec,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_line_length: config.max_line_length,
            inner: splitter(config.max_line_length),
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let mut line = match self.inner.decode(src) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    // The inner codec now skips to the next terminator.
                    tracing::trace!(max = self.max_line_length, "discarding oversized line");
                    continue;
                }
                Err(AnyDelimiterCodecError::Io(err)) => return Err(err.into()),
            };

            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if !is_blank(&line) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            tracing::trace!(len = src.len(), "discarding unterminated trailing data");
            src.clear();
        }
        self.inner = splitter(self.max_line_length);
        Ok(None)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_line_length {
            return Err(FrameError::LineTooLarge {
                size: item.len(),
                max: self.max_line_length,
            });
        }
        encode_line(&item, dst)
    }
}

/// Decodes lines into [`Message`]s, silently skipping malformed lines.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    lines: LineCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            lines: LineCodec::with_config(config),
        }
    }

    fn classify(line: Option<Bytes>) -> Option<std::result::Result<Message, ()>> {
        let line = line?;
        match Message::decode(&line) {
            Ok(message) => Some(Ok(message)),
            Err(reason) => {
                tracing::trace!(%reason, len = line.len(), "discarding malformed line");
                Some(Err(()))
            }
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            match Self::classify(self.lines.decode(src)?) {
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(())) => continue,
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            match Self::classify(self.lines.decode_eof(src)?) {
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(())) => continue,
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<()> {
        let payload = item.encode()?;
        self.lines.encode(Bytes::from(payload), dst)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::{Notification, Request};

    #[test]
    fn encode_appends_single_newline() {
        let mut buf = BytesMut::new();
        encode_line(br#"{"id":1}"#, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"{\"id\":1}\n");
    }

    #[test]
    fn encode_rejects_embedded_newline() {
        let mut buf = BytesMut::new();
        let err = encode_line(b"a\nb", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedNewline));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_line() {
        let mut buf = BytesMut::from(&b"{\"id\":"[..]);
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn decode_multiple_lines_and_crlf() {
        let mut buf = BytesMut::from(&b"one\r\ntwo\nthr"[..]);

        let first = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        let second = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        assert_eq!(first.as_ref(), b"one");
        assert_eq!(second.as_ref(), b"two");
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().is_none());
        assert_eq!(buf.as_ref(), b"thr");
    }

    #[test]
    fn decode_reports_oversized_line() {
        let mut buf = BytesMut::from(&b"0123456789\n"[..]);
        let err = decode_line(&mut buf, 4).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLarge { size: 10, max: 4 }));
    }

    #[test]
    fn line_codec_skips_blank_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n   \nhello\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn line_codec_discards_oversized_line_and_recovers() {
        let mut codec = LineCodec::with_config(&FrameConfig { max_line_length: 8 });
        let mut buf = BytesMut::from(&b"this line is far too long"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b" still the same line\nok\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"ok");
    }

    #[test]
    fn long_line_in_small_chunks_is_scanned_once() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        let payload = vec![b'x'; 4 * 1024 * 1024];
        let started = std::time::Instant::now();

        for chunk in payload.chunks(8 * 1024) {
            buf.extend_from_slice(chunk);
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(b"\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(line.len(), payload.len());
        assert!(buf.is_empty());
        // Rescanning from the start on every read takes tens of seconds here.
        assert!(started.elapsed() < std::time::Duration::from_secs(5), "{:?}", started.elapsed());
    }

    #[test]
    fn line_at_exact_limit_is_kept() {
        let mut codec = LineCodec::with_config(&FrameConfig { max_line_length: 4 });
        let mut buf = BytesMut::from(&b"abcd\nabcde\nok\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"abcd");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn line_codec_strips_carriage_return() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\r\none\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"one");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn line_codec_drops_unterminated_tail_at_eof() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"done\npartial"[..]);

        let line = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"done");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn message_codec_skips_malformed_between_valid_lines() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"id\":1,\"result\":\"a\"}\nnot json at all\n{\"id\":2,\"result\":\"b\"}\n"[..],
        );

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Message::Response(ref r) if r.id == 1));
        assert!(matches!(second, Message::Response(ref r) if r.id == 2));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn message_codec_encodes_one_line_per_message() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(&Message::Request(Request::new(1, "ping", json!({}))), &mut buf)
            .unwrap();
        codec
            .encode(
                &Message::Notification(Notification::new("window.closed", json!({}))),
                &mut buf,
            )
            .unwrap();

        let text = std::str::from_utf8(&buf).unwrap();
        assert_eq!(text.matches('\n').count(), 2);
        assert!(text.ends_with('\n'));
    }
}
