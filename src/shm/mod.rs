//! Shared-memory frame transport
//!
//! The segment starts with a fixed 40-byte [`FrameHeader`] followed by
//! `data_bytes` of tightly packed BGRA8 rows. The header's `seq` field is
//! the only synchronization between the writer and out-of-process readers:
//!
//! * Writer: bump `seq` (now odd), write header and rows, bump `seq` again
//!   (now even).
//! * Reader: load `seq`; if odd, retry. Otherwise copy header and payload,
//!   then load `seq` again. If it changed, discard the copy and retry;
//!   otherwise the copy is a consistent frame.
//!
//! Readers that skip the second load can observe torn frames. This contract
//! is part of the protocol; no OS lock protects the data path.

mod error;
mod reader;
pub mod segment;
mod writer;

pub use error::*;
pub use reader::*;
pub use writer::*;

use std::mem::size_of;
use std::sync::atomic::AtomicI32;

use bytemuck::{Pod, Zeroable};

use crate::constants::shm::{BYTES_PER_PIXEL, FORMAT_BGRA8, MAGIC, SEQ_OFFSET, VERSION};

/// Fixed layout written at the start of the segment
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u32,
    /// Seqlock counter: odd while a write is in progress
    pub seq: i32,
    pub width: i32,
    pub height: i32,
    /// Bytes per payload row, always `width * 4`
    pub stride: i32,
    pub format: i32,
    pub region_left: i32,
    pub region_top: i32,
    pub data_bytes: u32,
}

pub const HEADER_SIZE: usize = size_of::<FrameHeader>();

const _: () = assert!(HEADER_SIZE == 40);
const _: () = assert!(std::mem::offset_of!(FrameHeader, seq) == SEQ_OFFSET);

impl FrameHeader {
    /// Header for a BGRA8 frame of the given size captured at `origin`.
    ///
    /// `seq` is left at zero; the writer owns it.
    pub fn bgra8(width: u32, height: u32, origin: (i32, i32)) -> ShmResult<Self> {
        let too_large = || ShmError::FrameTooLarge { width, height };
        let stride = (width as usize)
            .checked_mul(BYTES_PER_PIXEL)
            .filter(|s| *s <= i32::MAX as usize)
            .ok_or_else(too_large)?;
        let data_bytes = stride
            .checked_mul(height as usize)
            .filter(|b| *b <= u32::MAX as usize)
            .ok_or_else(too_large)?;
        if height > i32::MAX as u32 {
            return Err(too_large());
        }

        Ok(Self {
            magic: MAGIC,
            version: VERSION,
            seq: 0,
            width: width as i32,
            height: height as i32,
            stride: stride as i32,
            format: FORMAT_BGRA8,
            region_left: origin.0,
            region_top: origin.1,
            data_bytes: data_bytes as u32,
        })
    }

    /// Segment size needed to hold this header and its payload
    pub fn total_bytes(&self) -> usize {
        HEADER_SIZE + self.data_bytes as usize
    }

    /// Whether the geometry fields agree with each other and the format
    pub fn is_consistent(&self) -> bool {
        self.magic == MAGIC
            && self.version == VERSION
            && self.format == FORMAT_BGRA8
            && self.width > 0
            && self.height > 0
            && self.stride as i64 == self.width as i64 * BYTES_PER_PIXEL as i64
            && self.data_bytes as i64 == self.stride as i64 * self.height as i64
    }
}

/// Borrowed view of CPU-readable pixel rows, e.g. a mapped staging texture.
///
/// `row_pitch` is the source distance between rows and may exceed
/// `width * 4`; the last row only needs `width * 4` bytes.
#[derive(Debug, Clone, Copy)]
pub struct PixelRows<'a> {
    pub data: &'a [u8],
    pub row_pitch: usize,
    pub width: u32,
    pub height: u32,
}

impl PixelRows<'_> {
    /// Bytes a tightly packed row needs
    pub fn packed_row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Verify every row is addressable before anything is written
    fn check(&self) -> ShmResult<()> {
        let row = self.packed_row_bytes();
        let needed = match self.height {
            0 => 0,
            h => self.row_pitch.saturating_mul(h as usize - 1).saturating_add(row),
        };
        if self.row_pitch < row || self.data.len() < needed {
            return Err(ShmError::SourceTooShort {
                available: self.data.len(),
                row_pitch: self.row_pitch,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// The header's sequence counter as an atomic in mapped memory.
///
/// # Safety
/// `base` must point at a live mapping of at least `HEADER_SIZE` bytes that
/// is 4-byte aligned (mappings are page aligned).
unsafe fn seq_cell<'a>(base: *mut u8) -> &'a AtomicI32 {
    &*(base.add(SEQ_OFFSET) as *const AtomicI32)
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT: AtomicU32 = AtomicU32::new(0);

    /// A segment name no other test (or test process) uses
    pub fn unique_name(tag: &str) -> String {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        format!("/sjt_{}_{}_{}", tag, std::process::id(), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_wire_format() {
        let header = FrameHeader::bgra8(3, 2, (7, -9)).unwrap();
        let bytes = bytemuck::bytes_of(&header);
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &2i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &12i32.to_le_bytes());
        assert_eq!(&bytes[24..28], &1i32.to_le_bytes());
        assert_eq!(&bytes[28..32], &7i32.to_le_bytes());
        assert_eq!(&bytes[32..36], &(-9i32).to_le_bytes());
        assert_eq!(&bytes[36..40], &24u32.to_le_bytes());
    }

    #[test]
    fn header_geometry_is_consistent() {
        let header = FrameHeader::bgra8(640, 480, (0, 0)).unwrap();
        assert!(header.is_consistent());
        assert_eq!(header.total_bytes(), 40 + 640 * 480 * 4);

        let torn = FrameHeader { height: 479, ..header };
        assert!(!torn.is_consistent());
    }

    #[test]
    fn oversized_frames_are_rejected() {
        assert!(matches!(
            FrameHeader::bgra8(u32::MAX, 2, (0, 0)),
            Err(ShmError::FrameTooLarge { .. })
        ));
        assert!(FrameHeader::bgra8(65_536, 65_536, (0, 0)).is_err());
    }

    #[test]
    fn short_sources_are_rejected() {
        let data = vec![0u8; 100];
        // 8 pixels = 32 bytes per packed row; two rows at pitch 64 need 96
        let rows = PixelRows { data: &data, row_pitch: 64, width: 8, height: 2 };
        assert!(rows.check().is_ok());

        let rows = PixelRows { data: &data, row_pitch: 64, width: 8, height: 3 };
        assert!(rows.check().is_err());

        let rows = PixelRows { data: &data, row_pitch: 16, width: 8, height: 1 };
        assert!(rows.check().is_err());
    }
}
