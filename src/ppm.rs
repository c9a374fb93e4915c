//! Raw-pixel (binary PPM) stream decoding.
//!
//! FFmpeg's `image2pipe` muxer with the `ppm` codec writes one self-contained
//! `P6` image per video frame, back to back, with no frame count and no outer
//! length field. [`FrameDecoder`] turns such a byte stream into a lazy,
//! forward-only sequence of [`VideoFrame`]s. The end of the stream is found by
//! peeking one byte ahead before each frame: no byte means a clean end, any
//! other failure is an error.
//!
//! # Wire format
//!
//! ```text
//! "P6" <ws> width <ws> height <ws> max_sample_value <one ws byte> <width*height*3 bytes>
//! ```
//!
//! `#` starts a comment that runs to the end of the line and may appear
//! between header tokens.
//!
//! # Example
//!
//! ```
//! use cutscore::{FrameDecoder, VideoFrame, ppm};
//!
//! let mut bytes = Vec::new();
//! ppm::write_frame(&mut bytes, &VideoFrame::new(4, 2))?;
//! ppm::write_frame(&mut bytes, &VideoFrame::new(4, 2))?;
//!
//! let frames: Vec<VideoFrame> = FrameDecoder::new(bytes.as_slice())
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(frames.len(), 2);
//! # Ok::<(), cutscore::CutScoreError>(())
//! ```

use std::io::{BufReader, ErrorKind, Read, Result as IoResult, Write};
use std::iter::FusedIterator;

use crate::error::CutScoreError;
use crate::frame::VideoFrame;

/// Magic token opening every binary PPM frame.
pub const MAGIC: [u8; 2] = *b"P6";

/// Largest `max_sample_value` this decoder accepts (one byte per sample).
pub const MAX_SUPPORTED_SAMPLE_VALUE: u32 = 255;

/// Payload bytes reserved before reading. Covers a 4K frame.
const PAYLOAD_PREALLOCATION_LIMIT: usize = 3840 * 2160 * 3;

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Largest value a channel sample may take.
    pub max_sample_value: u32,
}

impl PpmHeader {
    /// Size of the pixel payload following this header, or `None` if it does
    /// not fit in memory addressing.
    pub fn payload_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
    }
}

/// One byte of lookahead over a reader.
///
/// `peek` fetches a byte without consuming it; the next `read` or
/// `next_byte` hands it out first.
pub(crate) struct PeekReader<R> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> PeekReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    /// Look at the next byte. `None` at end of stream.
    pub(crate) fn peek(&mut self) -> IoResult<Option<u8>> {
        if let Some(byte) = self.peeked {
            return Ok(Some(byte));
        }

        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.peeked = Some(byte[0]);
                    return Ok(Some(byte[0]));
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Consume and return the next byte. `None` at end of stream.
    pub(crate) fn next_byte(&mut self) -> IoResult<Option<u8>> {
        let byte = self.peek()?;
        self.peeked = None;
        Ok(byte)
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.peeked.take() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => self.inner.read(buf),
        }
    }
}

/// A lazy decoder over a concatenated PPM byte stream.
///
/// Frames are decoded one at a time as [`next()`](Iterator::next) is called;
/// no readahead beyond the current frame happens. After the stream ends or
/// the first error is returned the decoder is finished for good and yields
/// `None` forever.
pub struct FrameDecoder<R> {
    reader: PeekReader<BufReader<R>>,
    next_index: u32,
    last_header: Option<PpmHeader>,
    done: bool,
}

impl<R: Read> FrameDecoder<R> {
    /// Wrap a byte source. The source is buffered internally.
    pub fn new(source: R) -> Self {
        Self {
            reader: PeekReader::new(BufReader::new(source)),
            next_index: 0,
            last_header: None,
            done: false,
        }
    }

    /// Number of frames successfully decoded so far.
    pub fn frames_decoded(&self) -> u32 {
        self.next_index
    }

    /// Header of the most recently decoded frame.
    pub fn last_header(&self) -> Option<PpmHeader> {
        self.last_header
    }

    /// `true` once the stream has ended or an error was returned.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// - [`CutScoreError::MalformedHeader`] for a bad magic token, a missing,
    ///   non-numeric or zero dimension, or a zero max sample value.
    /// - [`CutScoreError::UnsupportedSampleDepth`] if the max sample value
    ///   exceeds 255.
    /// - [`CutScoreError::TruncatedFrame`] if the payload is cut short.
    /// - [`CutScoreError::StreamRead`] if the source fails.
    pub fn decode_next(&mut self) -> Result<Option<VideoFrame>, CutScoreError> {
        if self.done {
            return Ok(None);
        }

        let result = self.read_frame().map_err(|error| match error {
            CutScoreError::IoError(source) => CutScoreError::StreamRead {
                frame_index: self.next_index,
                source,
            },
            other => other,
        });
        match &result {
            Ok(Some(frame)) => {
                log::trace!(
                    "Decoded frame {} ({}x{})",
                    self.next_index,
                    frame.width(),
                    frame.height()
                );
                self.next_index += 1;
            }
            Ok(None) => {
                log::debug!("End of stream after {} frame(s)", self.next_index);
                self.done = true;
            }
            Err(error) => {
                log::debug!("Decoding stopped at frame {}: {error}", self.next_index);
                self.done = true;
            }
        }
        result
    }

    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CutScoreError> {
        if self.reader.peek()?.is_none() {
            return Ok(None);
        }

        let header = self.read_header()?;
        let expected = header
            .payload_len()
            .ok_or_else(|| self.malformed("frame dimensions overflow the address space"))?;

        // A lying header must not force a huge allocation up front; beyond the
        // cap the buffer grows with the data actually received.
        let mut samples = Vec::with_capacity(expected.min(PAYLOAD_PREALLOCATION_LIMIT));
        (&mut self.reader)
            .take(expected as u64)
            .read_to_end(&mut samples)?;

        if samples.len() < expected {
            return Err(CutScoreError::TruncatedFrame {
                frame_index: self.next_index,
                expected,
                actual: samples.len(),
            });
        }

        self.last_header = Some(header);
        VideoFrame::from_raw(header.width, header.height, samples).map(Some)
    }

    fn read_header(&mut self) -> Result<PpmHeader, CutScoreError> {
        let mut magic = Vec::with_capacity(MAGIC.len());
        while magic.len() < MAGIC.len() {
            match self.reader.next_byte()? {
                Some(byte) => magic.push(byte),
                None => break,
            }
        }
        if magic != MAGIC {
            let ending = if magic.len() < MAGIC.len() {
                " before end of stream"
            } else {
                ""
            };
            return Err(self.malformed(format!(
                "expected magic {:?}, found {:?}{ending}",
                String::from_utf8_lossy(&MAGIC),
                String::from_utf8_lossy(&magic)
            )));
        }

        let width = self.read_number("width")?;
        if width == 0 {
            return Err(self.malformed("width is zero"));
        }
        let height = self.read_number("height")?;
        if height == 0 {
            return Err(self.malformed("height is zero"));
        }
        let max_sample_value = self.read_number("max sample value")?;
        if max_sample_value == 0 {
            return Err(self.malformed("max sample value is zero"));
        }
        if max_sample_value > MAX_SUPPORTED_SAMPLE_VALUE {
            return Err(CutScoreError::UnsupportedSampleDepth {
                frame_index: self.next_index,
                max_sample_value,
            });
        }

        match self.reader.next_byte()? {
            Some(byte) if is_whitespace(byte) => {}
            Some(byte) => {
                return Err(self.malformed(format!(
                    "expected whitespace before the pixel payload, found byte {byte:#04x}"
                )));
            }
            None => return Err(self.malformed("stream ended before the pixel payload")),
        }

        Ok(PpmHeader {
            width,
            height,
            max_sample_value,
        })
    }

    /// Skip separators, then read one decimal token. The byte after the last
    /// digit is left unconsumed.
    fn read_number(&mut self, name: &str) -> Result<u32, CutScoreError> {
        self.skip_separators()?;

        let mut value: u32 = 0;
        let mut digits = 0;
        while let Some(byte) = self.reader.peek()? {
            if !byte.is_ascii_digit() {
                break;
            }
            self.reader.next_byte()?;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u32::from(byte - b'0')))
                .ok_or_else(|| self.malformed(format!("{name} does not fit in 32 bits")))?;
            digits += 1;
        }

        if digits == 0 {
            return Err(match self.reader.peek()? {
                Some(byte) => self.malformed(format!("expected {name}, found byte {byte:#04x}")),
                None => self.malformed(format!("stream ended before {name}")),
            });
        }
        Ok(value)
    }

    fn skip_separators(&mut self) -> Result<(), CutScoreError> {
        loop {
            match self.reader.peek()? {
                Some(byte) if is_whitespace(byte) => {
                    self.reader.next_byte()?;
                }
                Some(b'#') => {
                    while let Some(byte) = self.reader.next_byte()? {
                        if byte == b'\n' || byte == b'\r' {
                            break;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> CutScoreError {
        CutScoreError::MalformedHeader {
            frame_index: self.next_index,
            reason: reason.into(),
        }
    }
}

impl<R: Read> Iterator for FrameDecoder<R> {
    type Item = Result<VideoFrame, CutScoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next().transpose()
    }
}

impl<R: Read> FusedIterator for FrameDecoder<R> {}

/// Write `frame` in the wire format [`FrameDecoder`] reads.
pub fn write_frame<W: Write>(writer: &mut W, frame: &VideoFrame) -> Result<(), CutScoreError> {
    write!(
        writer,
        "P6\n{} {}\n{}\n",
        frame.width(),
        frame.height(),
        MAX_SUPPORTED_SAMPLE_VALUE
    )?;
    writer.write_all(frame.samples())?;
    Ok(())
}

/// PNM whitespace: space, tab, LF, VT, FF, CR.
fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}
