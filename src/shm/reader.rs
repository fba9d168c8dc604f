// shm/reader.rs - Frame Reader (seqlock reader)
//
// Reference implementation of the consumer side of the protocol. Downstream
// processes (OCR, automation) follow the same steps in their own language.

use std::sync::atomic::{fence, Ordering};

use log::debug;

use super::segment::Segment;
use super::{seq_cell, FrameHeader, ShmResult, HEADER_SIZE};
use crate::constants::shm::{MAGIC, READER_MAX_SPIN};

/// A consistent frame copied out of the segment
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    /// Tightly packed BGRA8 rows, `header.data_bytes` long
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.header.width as u32
    }

    pub fn height(&self) -> u32 {
        self.header.height as u32
    }

    /// Capture origin in desktop coordinates
    pub fn origin(&self) -> (i32, i32) {
        (self.header.region_left, self.header.region_top)
    }

    /// One packed row
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let stride = self.header.stride as usize;
        let start = (y as usize).checked_mul(stride)?;
        self.pixels.get(start..start + stride)
    }
}

/// Result of one read attempt
#[derive(Debug)]
pub enum ReadOutcome {
    /// A consistent snapshot
    Frame(Frame),
    /// Segment exists but holds no valid frame yet
    NotReady,
    /// The writer kept the sequence moving for the whole spin budget
    Busy,
}

/// Reader side of the shared-memory frame transport
#[derive(Debug)]
pub struct FrameReader {
    name: String,
    segment: Option<Segment>,
    max_spin: u32,
}

impl FrameReader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segment: None,
            max_spin: READER_MAX_SPIN,
        }
    }

    /// Override how many seqlock retries a single read may take
    pub fn with_max_spin(mut self, max_spin: u32) -> Self {
        self.max_spin = max_spin.max(1);
        self
    }

    fn segment(&mut self) -> ShmResult<&Segment> {
        let segment = match self.segment.take() {
            Some(segment) => segment,
            None => Segment::open_read_only(&self.name)?,
        };
        Ok(&*self.segment.insert(segment))
    }

    /// Drop the mapping; the next read maps the segment again
    pub fn close(&mut self) {
        self.segment = None;
    }

    /// Try to copy out one consistent frame.
    ///
    /// Errors only when the segment cannot be opened at all.
    pub fn try_read(&mut self) -> ShmResult<ReadOutcome> {
        let mut remapped = false;

        for _ in 0..self.max_spin {
            let segment = self.segment()?;
            let base = segment.as_ptr();
            let mapped = segment.len();
            if mapped < HEADER_SIZE {
                return Ok(ReadOutcome::NotReady);
            }
            let seq = unsafe { seq_cell(base) };

            let before = seq.load(Ordering::Acquire);
            if before & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }

            let header: FrameHeader = unsafe { std::ptr::read_unaligned(base as *const FrameHeader) };
            if !header.is_consistent() {
                fence(Ordering::Acquire);
                if seq.load(Ordering::Relaxed) != before {
                    continue;
                }
                if header.magic == MAGIC {
                    debug!("Stable but inconsistent header on {}: {:?}", self.name, header);
                }
                return Ok(ReadOutcome::NotReady);
            }

            let total = header.total_bytes();
            if total > mapped {
                // The writer grew the segment since it was mapped
                if remapped {
                    continue;
                }
                self.close();
                remapped = true;
                continue;
            }

            let mut pixels = vec![0u8; header.data_bytes as usize];
            unsafe {
                std::ptr::copy_nonoverlapping(base.add(HEADER_SIZE), pixels.as_mut_ptr(), pixels.len());
            }

            fence(Ordering::Acquire);
            let after = seq.load(Ordering::Relaxed);
            if after == before {
                return Ok(ReadOutcome::Frame(Frame {
                    header: FrameHeader { seq: before, ..header },
                    pixels,
                }));
            }
        }

        Ok(ReadOutcome::Busy)
    }
}
