// shm/segment/windows.rs - Pagefile-backed file mapping
//
// CreateFileMappingW on an existing name returns the existing section and
// ignores the requested size. The view length is therefore re-checked with
// VirtualQuery before the mapping is trusted.

use std::mem::size_of;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
    FILE_MAP_ALL_ACCESS, FILE_MAP_READ, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
    PAGE_READWRITE,
};

use crate::shm::{ShmError, ShmResult};
use crate::utils::wide_string;

/// A mapped view of a named file-mapping object
#[derive(Debug)]
pub struct Segment {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
    is_new: bool,
}

// SAFETY: the handle and view are process-wide; access discipline is the seqlock
unsafe impl Send for Segment {}

fn check_name(name: &str) -> ShmResult<Vec<u16>> {
    if name.is_empty() || name.contains('\0') {
        return Err(ShmError::InvalidName(name.to_string()));
    }
    Ok(wide_string(name))
}

fn last_error() -> windows::core::Error {
    windows::core::Error::from(unsafe { GetLastError() }.to_hresult())
}

/// Size of the committed view starting at `view`
fn view_len(view: MEMORY_MAPPED_VIEW_ADDRESS) -> usize {
    let mut info = MEMORY_BASIC_INFORMATION::default();
    let written = unsafe {
        VirtualQuery(
            Some(view.Value as *const _),
            &mut info,
            size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 {
        0
    } else {
        info.RegionSize
    }
}

impl Segment {
    /// Create (or attach to) the named section and map `bytes` read-write
    pub fn create(name: &str, bytes: usize) -> ShmResult<Self> {
        if bytes == 0 {
            return Err(ShmError::EmptySegment);
        }
        let wide = check_name(name)?;
        let size = bytes as u64;

        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                (size >> 32) as u32,
                (size & 0xFFFF_FFFF) as u32,
                PCWSTR(wide.as_ptr()),
            )
        }
        .map_err(|source| ShmError::Windows { op: "CreateFileMappingW", source })?;
        let is_new = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, bytes) };
        if view.Value.is_null() {
            let source = last_error();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(ShmError::Windows { op: "MapViewOfFile", source });
        }

        let segment = Self { handle, view, len: bytes, is_new };

        let actual = view_len(view);
        if actual < bytes {
            // Drop unmaps and closes
            drop(segment);
            return Err(ShmError::Undersized { requested: bytes, actual });
        }

        if is_new {
            unsafe { std::ptr::write_bytes(segment.as_ptr(), 0, bytes) };
        }

        Ok(segment)
    }

    /// Map the whole existing section read-only
    pub fn open_read_only(name: &str) -> ShmResult<Self> {
        let wide = check_name(name)?;

        let handle = unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR(wide.as_ptr())) }
            .map_err(|source| ShmError::Windows { op: "OpenFileMappingW", source })?;

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, 0) };
        if view.Value.is_null() {
            let source = last_error();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(ShmError::Windows { op: "MapViewOfFile", source });
        }

        let len = view_len(view);
        let segment = Self { handle, view, len, is_new: false };
        if len == 0 {
            return Err(ShmError::EmptySegment);
        }
        Ok(segment)
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.view.Value as *mut u8
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this open created the section
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
            let _ = CloseHandle(self.handle);
        }
    }
}

/// Sections vanish with their last handle; nothing to unlink
pub fn remove(_name: &str) -> ShmResult<()> {
    Ok(())
}
