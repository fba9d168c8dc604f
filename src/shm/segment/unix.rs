// shm/segment/unix.rs - POSIX shared memory (shm_open + mmap)

use std::ffi::CString;
use std::ptr::NonNull;

use log::debug;

use crate::shm::{ShmError, ShmResult};

#[cfg(target_os = "macos")]
const MODE: libc::c_uint = 0o600;
#[cfg(not(target_os = "macos"))]
const MODE: libc::mode_t = 0o600;

/// A mapped view of a named POSIX shared-memory object
#[derive(Debug)]
pub struct Segment {
    ptr: NonNull<u8>,
    len: usize,
    is_new: bool,
}

// SAFETY: the mapping is process-wide memory; access discipline is the seqlock
unsafe impl Send for Segment {}

/// Closes the descriptor once the mapping no longer needs it
struct Fd(libc::c_int);

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

fn c_name(name: &str) -> ShmResult<CString> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(ShmError::InvalidName(name.to_string()));
    }
    CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))
}

fn object_size(fd: &Fd) -> ShmResult<usize> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd.0, &mut st) } != 0 {
        return Err(ShmError::last_os("fstat"));
    }
    Ok(st.st_size.max(0) as usize)
}

fn map(fd: &Fd, len: usize, prot: libc::c_int) -> ShmResult<NonNull<u8>> {
    let addr = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, libc::MAP_SHARED, fd.0, 0) };
    if addr == libc::MAP_FAILED {
        return Err(ShmError::last_os("mmap"));
    }
    NonNull::new(addr as *mut u8).ok_or_else(|| ShmError::last_os("mmap"))
}

impl Segment {
    /// Create (or attach to) the named object and map `bytes` read-write.
    ///
    /// An existing smaller object is grown; if the OS refuses, the mapping is
    /// rejected as undersized instead of being trusted.
    pub fn create(name: &str, bytes: usize) -> ShmResult<Self> {
        if bytes == 0 {
            return Err(ShmError::EmptySegment);
        }
        let c_name = c_name(name)?;

        let mut is_new = true;
        let mut raw = unsafe {
            libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, MODE)
        };
        if raw < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EEXIST) {
            is_new = false;
            raw = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, MODE) };
        }
        if raw < 0 {
            return Err(ShmError::last_os("shm_open"));
        }
        let fd = Fd(raw);

        let current = object_size(&fd)?;
        if current < bytes && unsafe { libc::ftruncate(fd.0, bytes as libc::off_t) } != 0 {
            debug!("ftruncate({name}, {bytes}) refused: {}", std::io::Error::last_os_error());
        }

        let actual = object_size(&fd)?;
        if actual < bytes {
            return Err(ShmError::Undersized { requested: bytes, actual });
        }

        let ptr = map(&fd, bytes, libc::PROT_READ | libc::PROT_WRITE)?;
        if is_new {
            unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, bytes) };
        }

        Ok(Self { ptr, len: bytes, is_new })
    }

    /// Map the whole existing object read-only
    pub fn open_read_only(name: &str) -> ShmResult<Self> {
        let c_name = c_name(name)?;
        let raw = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, MODE) };
        if raw < 0 {
            return Err(ShmError::last_os("shm_open"));
        }
        let fd = Fd(raw);

        let len = object_size(&fd)?;
        if len == 0 {
            return Err(ShmError::EmptySegment);
        }
        let ptr = map(&fd, len, libc::PROT_READ)?;

        Ok(Self { ptr, len, is_new: false })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this open created the object
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// Unlink the named object so the next create starts fresh
pub fn remove(name: &str) -> ShmResult<()> {
    let c_name = c_name(name)?;
    if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
        return Err(ShmError::last_os("shm_unlink"));
    }
    Ok(())
}
