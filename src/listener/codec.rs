//! Event framing for byte streams without length prefixes
//!
//! A frame is one span from an `<event` open tag through the next
//! `</event>`. Bytes before the open tag (auth preambles, XML declarations,
//! keep-alive noise) are discarded along with the frame.

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use std::io;
use tokio_util::codec::Decoder;

pub const EVENT_OPEN: &[u8] = b"<event";
pub const EVENT_CLOSE: &[u8] = b"</event>";

/// Buffer limit per stream connection
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

/// Offset of the first `<event` tag followed by whitespace or `>`.
///
/// A tag at the very end of `buf` is reported too: the byte that decides it
/// has not arrived yet, and the close-tag search will wait for more data.
pub fn find_open_tag(buf: &[u8]) -> Option<usize> {
    memmem::find_iter(buf, EVENT_OPEN).find(|&pos| match buf.get(pos + EVENT_OPEN.len()) {
        Some(b) => b.is_ascii_whitespace() || *b == b'>',
        None => true,
    })
}

/// Byte range of the first complete event span in `buf`.
pub fn next_span(buf: &[u8]) -> Option<(usize, usize)> {
    let start = find_open_tag(buf)?;
    let close = memmem::find(&buf[start..], EVENT_CLOSE)?;
    Some((start, start + close + EVENT_CLOSE.len()))
}

/// Every complete span in `buf`, in order.
pub fn extract_spans(buf: &[u8]) -> Vec<&[u8]> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some((start, end)) = next_span(&buf[offset..]) {
        spans.push(&buf[offset + start..offset + end]);
        offset += end;
    }
    spans
}

/// Frames to dispatch from one datagram.
///
/// Complete spans win. A datagram without any span is still passed on whole
/// when it looks like it starts an event; this accepts truncated and
/// otherwise malformed payloads and leaves rejection to the decoder.
pub fn datagram_frames(datagram: &[u8]) -> Vec<&[u8]> {
    let spans = extract_spans(datagram);
    if !spans.is_empty() {
        return spans;
    }

    let trimmed = datagram.trim_ascii();
    if trimmed.starts_with(EVENT_OPEN) || memmem::find(trimmed, b"<event ").is_some() {
        vec![datagram]
    } else {
        Vec::new()
    }
}

/// Output of [`CotFrameCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(Bytes),
    /// The buffer passed its limit without yielding a frame and was cleared
    Overflow { discarded: usize },
}

/// `Decoder` that splits a byte stream into event spans.
#[derive(Debug, Clone)]
pub struct CotFrameCodec {
    max_buffer: usize,
}

impl CotFrameCodec {
    pub fn new(max_buffer: usize) -> Self {
        Self { max_buffer }
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }
}

impl Default for CotFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl Decoder for CotFrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some((start, end)) = next_span(src) {
            let mut frame = src.split_to(end);
            frame.advance(start);
            return Ok(Some(Frame::Event(frame.freeze())));
        }

        if src.len() > self.max_buffer {
            let discarded = src.len();
            src.clear();
            return Ok(Some(Frame::Overflow { discarded }));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Trailing partial frame
                src.clear();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EV1: &[u8] = br#"<event version="2.0" uid="a" type="a-f-G" how="m-g"><point lat="1" lon="2"/></event>"#;
    const EV2: &[u8] = br#"<event version="2.0" uid="b" type="a-h-G" how="m-g"><point lat="3" lon="4"/></event>"#;

    fn decode_all(codec: &mut CotFrameCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_open_tag_requires_delimiter() {
        assert_eq!(find_open_tag(b"<events><event>"), Some(8));
        assert_eq!(find_open_tag(b"xx<event\n uid"), Some(2));
        assert_eq!(find_open_tag(b"<eventual"), None);
        assert_eq!(find_open_tag(b"abc<event"), Some(3));
    }

    #[test]
    fn test_two_events_split_at_every_offset() {
        let stream = [EV1, EV2].concat();

        for split in 0..=stream.len() {
            let mut codec = CotFrameCodec::default();
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();

            buf.extend_from_slice(&stream[..split]);
            frames.extend(decode_all(&mut codec, &mut buf));
            buf.extend_from_slice(&stream[split..]);
            frames.extend(decode_all(&mut codec, &mut buf));

            assert_eq!(
                frames,
                vec![
                    Frame::Event(Bytes::from_static(EV1)),
                    Frame::Event(Bytes::from_static(EV2))
                ],
                "split at {split}"
            );
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_preamble_and_trailing_bytes() {
        let mut codec = CotFrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(br#"<?xml version="1.0"?><auth><cot/></auth>"#);
        buf.extend_from_slice(EV1);
        buf.extend_from_slice(b"<event version=");

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![Frame::Event(Bytes::from_static(EV1))]);
        // The partial second event stays buffered.
        assert_eq!(&buf[..], b"<event version=");
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut codec = CotFrameCodec::new(1024);
        let mut buf = BytesMut::from(&vec![b'x'; 2000][..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Overflow { discarded: 2000 })
        );
        assert!(buf.is_empty());

        buf.extend_from_slice(EV1);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Event(Bytes::from_static(EV1)))
        );
    }

    #[test]
    fn test_eof_drops_partial_frame() {
        let mut codec = CotFrameCodec::default();
        let mut buf = BytesMut::from(&b"<event uid=\"x\">"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_datagram_spans() {
        let datagram = [EV1, b"\n".as_slice(), EV2].concat();
        assert_eq!(datagram_frames(&datagram), vec![EV1, EV2]);
    }

    // The fallback is deliberately loose: anything that merely looks like the
    // start of an event is passed through for the decoder to judge.
    #[test]
    fn test_datagram_loose_fallback() {
        let truncated = br#"  <event version="2.0" uid="t""#;
        assert_eq!(datagram_frames(truncated), vec![&truncated[..]]);

        let embedded = b"junk <event uid=\"e\"> more junk";
        assert_eq!(datagram_frames(embedded), vec![&embedded[..]]);

        let bare = b"<eventually>";
        assert_eq!(datagram_frames(bare), vec![&bare[..]]);

        assert!(datagram_frames(b"hello world").is_empty());
        assert!(datagram_frames(b"").is_empty());
    }
}
