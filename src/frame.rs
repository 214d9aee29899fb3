//! Fixed-size frame input.
//!
//! The input length must be an exact multiple of the frame size; this is checked once, before
//! any frame is handed out.

use crate::error::InputError;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Fails with [`InputError::NotFrameAligned`] unless `len` is a multiple of `frame_size`.
pub fn check_alignment(len: u64, frame_size: usize) -> Result<u64, InputError> {
    let size = frame_size as u64;
    if size == 0 || len % size != 0 {
        return Err(InputError::NotFrameAligned { len, frame_size });
    }
    Ok(len / size)
}

/// Reads frames one at a time into a single reused buffer.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    next_index: usize,
    frame_count: u64,
}

impl FrameReader<BufReader<File>> {
    /// Open a file and check its size against `frame_size`.
    pub fn open(path: impl AsRef<Path>, frame_size: usize) -> Result<Self, InputError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        FrameReader::new(BufReader::new(file), len, frame_size)
    }
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader whose total length is `len` bytes.
    pub fn new(inner: R, len: u64, frame_size: usize) -> Result<Self, InputError> {
        let frame_count = check_alignment(len, frame_size)?;
        Ok(FrameReader {
            inner,
            buf: vec![0u8; frame_size],
            next_index: 0,
            frame_count,
        })
    }

    /// Number of frames the input holds.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_size(&self) -> usize {
        self.buf.len()
    }

    /// Next frame and its 0-based index, or `None` once `frame_count` frames have been read.
    ///
    /// Bytes past the declared length are never read.
    pub fn next_frame(&mut self) -> Result<Option<(usize, &[u8])>, InputError> {
        if self.next_index as u64 >= self.frame_count {
            return Ok(None);
        }
        let expected = self.buf.len();
        let mut filled = 0;
        while filled < expected {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let frame_index = self.next_index;
        if filled < expected {
            return Err(InputError::Truncated {
                frame_index,
                read: filled,
                expected,
            });
        }
        self.next_index += 1;
        Ok(Some((frame_index, self.buf.as_slice())))
    }
}

/// Split an in-memory input into frames, after checking alignment.
pub fn split_frames(data: &[u8], frame_size: usize) -> Result<std::slice::ChunksExact<'_, u8>, InputError> {
    check_alignment(data.len() as u64, frame_size)?;
    Ok(data.chunks_exact(frame_size))
}
