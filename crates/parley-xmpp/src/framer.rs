//! Splits an inbound XML stream into top-level frames.
//!
//! The stream header `<stream:stream ...>` never closes until the session
//! ends, so it is reported on its own. Everything below it is returned one
//! complete child element at a time. Only the tag structure is tracked;
//! element contents are inspected later by [`crate::stanza`].

use thiserror::Error;

/// Upper bound on buffered, not yet framed bytes.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

const STREAM_TAG: &[u8] = b"stream:stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A (re)opened stream header, e.g. after SASL success.
    StreamOpen(String),
    /// One complete top-level element.
    Element(String),
    /// `</stream:stream>`
    StreamClose,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("buffered stream data exceeds {0} bytes")]
    TooLarge(usize),

    #[error("character data at stream level")]
    StrayText,

    #[error("stanza is not valid UTF-8")]
    InvalidUtf8,

    #[error("closing tag without matching open tag")]
    Unbalanced,
}

#[derive(Debug, Default)]
pub struct XmlFramer {
    buf: Vec<u8>,
}

impl XmlFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) -> Result<(), FrameError> {
        if self.buf.len() + data.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(MAX_FRAME_SIZE));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            // Whitespace between stanzas is a keepalive.
            let Some(start) = self.buf.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.buf.clear();
                return Ok(None);
            };
            if self.buf[start] != b'<' {
                return Err(FrameError::StrayText);
            }
            let Some(first_end) = find_tag_end(&self.buf, start) else {
                return Ok(None);
            };

            let first = &self.buf[start..=first_end];
            if first.starts_with(b"<?") || first.starts_with(b"<!") {
                self.buf.drain(..=first_end);
                continue;
            }
            if first.starts_with(b"</") {
                if is_named(first, 2, STREAM_TAG) {
                    self.buf.drain(..=first_end);
                    return Ok(Some(Frame::StreamClose));
                }
                return Err(FrameError::Unbalanced);
            }
            if is_named(first, 1, STREAM_TAG) {
                let header = self.take(start, first_end + 1)?;
                return Ok(Some(Frame::StreamOpen(header)));
            }

            return match self.element_end(start)? {
                Some(end) => Ok(Some(Frame::Element(self.take(start, end)?))),
                None => Ok(None),
            };
        }
    }

    /// Exclusive end of the element opening at `start`, if fully buffered.
    fn element_end(&self, start: usize) -> Result<Option<usize>, FrameError> {
        let mut depth = 0usize;
        let mut pos = start;
        loop {
            let Some(lt) = self.buf[pos..].iter().position(|&b| b == b'<').map(|i| i + pos) else {
                return Ok(None);
            };
            let Some(gt) = find_tag_end(&self.buf, lt) else {
                return Ok(None);
            };
            let tag = &self.buf[lt..=gt];
            if tag.starts_with(b"</") {
                depth = depth.checked_sub(1).ok_or(FrameError::Unbalanced)?;
            } else if !(tag.starts_with(b"<?") || tag.starts_with(b"<!") || tag.ends_with(b"/>")) {
                depth += 1;
            }
            pos = gt + 1;
            if depth == 0 {
                return Ok(Some(pos));
            }
        }
    }

    fn take(&mut self, start: usize, end: usize) -> Result<String, FrameError> {
        let bytes: Vec<u8> = self.buf.drain(..end).skip(start).collect();
        String::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)
    }
}

/// Index of the `>` closing the tag that opens at `lt`, skipping quoted
/// attribute values.
fn find_tag_end(buf: &[u8], lt: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(lt + 1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

fn is_named(tag: &[u8], offset: usize, name: &[u8]) -> bool {
    let rest = &tag[offset..];
    rest.starts_with(name)
        && rest
            .get(name.len())
            .is_some_and(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
}
