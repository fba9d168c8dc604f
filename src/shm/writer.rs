// shm/writer.rs - Frame Channel (seqlock writer)
//
// Owns the writable mapping. The segment is kept open for the life of the
// process and only recreated when the total frame size changes.

use std::sync::atomic::{fence, Ordering};

use log::{debug, info, warn};

use super::segment::Segment;
use super::{seq_cell, FrameHeader, PixelRows, ShmError, ShmResult, HEADER_SIZE};
use crate::constants::shm::{MAGIC, SEQ_OFFSET};

/// Writer side of the shared-memory frame transport
#[derive(Debug)]
pub struct FrameChannel {
    name: String,
    segment: Option<Segment>,
    /// Size of the last failed open, so a persistent failure warns only once
    failed_size: Option<usize>,
}

impl FrameChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segment: None,
            failed_size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.segment.is_some()
    }

    /// Length of the current mapping, if any
    pub fn mapped_len(&self) -> Option<usize> {
        self.segment.as_ref().map(Segment::len)
    }

    /// Ensure a mapping of exactly `bytes` is open.
    ///
    /// No-op when the current mapping already has that size. Otherwise the
    /// old mapping is closed and the named segment is created or attached,
    /// then validated: the view must cover `bytes` and the header must be
    /// either blank or ours.
    pub fn open_or_create(&mut self, bytes: usize) -> ShmResult<()> {
        if self.mapped_len() == Some(bytes) {
            return Ok(());
        }
        if bytes < HEADER_SIZE {
            return Err(ShmError::BelowHeader { bytes, header: HEADER_SIZE });
        }
        self.close();

        match self.attach(bytes) {
            Ok(segment) => {
                info!(
                    "Frame channel {} mapped: {} bytes ({})",
                    self.name,
                    bytes,
                    if segment.is_new() { "created" } else { "attached" }
                );
                self.segment = Some(segment);
                self.failed_size = None;
                Ok(())
            }
            Err(e) => {
                if self.failed_size != Some(bytes) {
                    warn!("Frame channel {} unavailable for {} bytes: {}", self.name, bytes, e);
                    self.failed_size = Some(bytes);
                } else {
                    debug!("Frame channel {} still unavailable: {}", self.name, e);
                }
                Err(e)
            }
        }
    }

    fn attach(&self, bytes: usize) -> ShmResult<Segment> {
        let segment = Segment::create(&self.name, bytes)?;
        if segment.len() < bytes {
            return Err(ShmError::Undersized { requested: bytes, actual: segment.len() });
        }

        let base = segment.as_ptr();
        let magic = unsafe { std::ptr::read_unaligned(base as *const u32) };
        if magic != 0 && magic != MAGIC {
            return Err(ShmError::ForeignSegment { magic });
        }

        // A writer that died mid-frame leaves seq odd; restore even parity
        let seq = unsafe { seq_cell(base) };
        let current = seq.load(Ordering::Acquire);
        if current & 1 != 0 {
            debug!("Repairing odd sequence counter {} on {}", current, self.name);
            seq.fetch_add(1, Ordering::AcqRel);
        }

        Ok(segment)
    }

    /// Drop the current mapping
    pub fn close(&mut self) {
        if self.segment.take().is_some() {
            debug!("Frame channel {} closed", self.name);
        }
    }

    /// Publish one frame under the seqlock.
    ///
    /// The segment is sized to `HEADER_SIZE + width * 4 * height`. Rows are
    /// copied one at a time because the source pitch can exceed the packed
    /// destination stride. Returns the (even) sequence value after the write.
    pub fn publish(&mut self, rows: &PixelRows<'_>, origin: (i32, i32)) -> ShmResult<i32> {
        let header = FrameHeader::bgra8(rows.width, rows.height, origin)?;
        rows.check()?;
        self.open_or_create(header.total_bytes())?;

        let segment = match &self.segment {
            Some(segment) => segment,
            None => return Err(ShmError::EmptySegment),
        };
        let base = segment.as_ptr();
        let seq = unsafe { seq_cell(base) };
        let header_bytes = bytemuck::bytes_of(&header);
        let stride = header.stride as usize;

        // Odd: contents unstable
        seq.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);

        unsafe {
            std::ptr::copy_nonoverlapping(header_bytes.as_ptr(), base, SEQ_OFFSET);
            std::ptr::copy_nonoverlapping(
                header_bytes.as_ptr().add(SEQ_OFFSET + 4),
                base.add(SEQ_OFFSET + 4),
                HEADER_SIZE - SEQ_OFFSET - 4,
            );

            let payload = base.add(HEADER_SIZE);
            for row in 0..rows.height as usize {
                let src = rows.data.as_ptr().add(row * rows.row_pitch);
                let dst = payload.add(row * stride);
                std::ptr::copy_nonoverlapping(src, dst, stride);
            }
        }

        // Even: frame complete
        let after = seq.fetch_add(1, Ordering::Release).wrapping_add(1);
        Ok(after)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::shm::segment;
    use crate::shm::test_support::unique_name;

    fn rows_with_padding(width: u32, height: u32, pitch: usize, fill: u8) -> Vec<u8> {
        let mut data = vec![0xEE; pitch * height as usize];
        for row in 0..height as usize {
            for b in 0..width as usize * 4 {
                data[row * pitch + b] = fill.wrapping_add(row as u8);
            }
        }
        data
    }

    #[test]
    fn same_size_reopen_is_noop() {
        let name = unique_name("noop");
        let mut channel = FrameChannel::new(&name);

        channel.open_or_create(HEADER_SIZE + 64).unwrap();
        let first = channel.segment.as_ref().unwrap().as_ptr();
        unsafe { *first.add(HEADER_SIZE) = 0x5A };

        channel.open_or_create(HEADER_SIZE + 64).unwrap();
        let second = channel.segment.as_ref().unwrap().as_ptr();
        assert_eq!(first, second);
        assert_eq!(unsafe { *second.add(HEADER_SIZE) }, 0x5A);

        channel.close();
        segment::remove(&name).unwrap();
    }

    #[test]
    fn size_below_header_is_refused() {
        let name = unique_name("tiny");
        let mut channel = FrameChannel::new(&name);

        let err = channel.open_or_create(HEADER_SIZE - 1).unwrap_err();
        assert!(matches!(
            err,
            ShmError::BelowHeader { bytes, header } if bytes == HEADER_SIZE - 1 && header == HEADER_SIZE
        ));
        assert!(err.to_string().starts_with(&format!("Segment of {} bytes", HEADER_SIZE - 1)));
        assert!(!channel.is_open());
        assert!(Segment::open_read_only(&name).is_err());

        // An existing mapping is left alone
        channel.open_or_create(HEADER_SIZE + 16).unwrap();
        assert!(channel.open_or_create(0).is_err());
        assert_eq!(channel.mapped_len(), Some(HEADER_SIZE + 16));

        channel.close();
        segment::remove(&name).unwrap();
    }

    #[test]
    fn size_change_remaps_to_requested_size() {
        let name = unique_name("resize");
        let mut channel = FrameChannel::new(&name);

        channel.open_or_create(HEADER_SIZE + 64).unwrap();
        assert_eq!(channel.mapped_len(), Some(HEADER_SIZE + 64));

        channel.open_or_create(HEADER_SIZE + 4096).unwrap();
        assert_eq!(channel.mapped_len(), Some(HEADER_SIZE + 4096));

        channel.close();
        assert!(!channel.is_open());
        segment::remove(&name).unwrap();
    }

    #[test]
    fn publish_packs_padded_rows_and_leaves_seq_even() {
        let name = unique_name("publish");
        let mut channel = FrameChannel::new(&name);

        let data = rows_with_padding(3, 4, 32, 10);
        let rows = PixelRows { data: &data, row_pitch: 32, width: 3, height: 4 };

        let seq = channel.publish(&rows, (5, 6)).unwrap();
        assert_eq!(seq, 2);
        let seq = channel.publish(&rows, (5, 6)).unwrap();
        assert_eq!(seq, 4);

        let base = channel.segment.as_ref().unwrap().as_ptr();
        let header: FrameHeader = unsafe { std::ptr::read_unaligned(base as *const FrameHeader) };
        assert!(header.is_consistent());
        assert_eq!((header.width, header.height, header.stride), (3, 4, 12));
        assert_eq!((header.region_left, header.region_top), (5, 6));
        assert_eq!(header.seq, 4);

        let payload = unsafe { std::slice::from_raw_parts(base.add(HEADER_SIZE), 48) };
        for row in 0..4 {
            assert!(payload[row * 12..row * 12 + 12].iter().all(|b| *b == 10 + row as u8));
        }

        channel.close();
        segment::remove(&name).unwrap();
    }

    #[test]
    fn short_source_publishes_nothing() {
        let name = unique_name("short");
        let mut channel = FrameChannel::new(&name);

        let data = vec![0u8; 10];
        let rows = PixelRows { data: &data, row_pitch: 16, width: 4, height: 2 };
        assert!(channel.publish(&rows, (0, 0)).is_err());
        assert!(!channel.is_open());

        let _ = segment::remove(&name);
    }

    #[test]
    fn odd_sequence_from_dead_writer_is_repaired() {
        let name = unique_name("repair");
        {
            let seg = Segment::create(&name, HEADER_SIZE + 16).unwrap();
            unsafe { seq_cell(seg.as_ptr()) }.store(7, Ordering::SeqCst);
        }

        let mut channel = FrameChannel::new(&name);
        channel.open_or_create(HEADER_SIZE + 16).unwrap();
        let seq = unsafe { seq_cell(channel.segment.as_ref().unwrap().as_ptr()) };
        assert_eq!(seq.load(Ordering::SeqCst), 8);

        channel.close();
        segment::remove(&name).unwrap();
    }

    #[test]
    fn foreign_segment_is_rejected() {
        let name = unique_name("foreign");
        {
            let seg = Segment::create(&name, HEADER_SIZE + 16).unwrap();
            unsafe { std::ptr::write_unaligned(seg.as_ptr() as *mut u32, 0xDEAD_BEEF) };
        }

        let mut channel = FrameChannel::new(&name);
        let err = channel.open_or_create(HEADER_SIZE + 16).unwrap_err();
        assert!(matches!(err, ShmError::ForeignSegment { magic: 0xDEAD_BEEF }));
        assert!(!channel.is_open());

        segment::remove(&name).unwrap();
    }
}
