// shm/segment/mod.rs - Named Shared-Memory Segments
//
// One mapping type per platform with the same surface:
// `create`, `open_read_only`, `as_ptr`, `len`, `is_new`, plus `remove`.

#[cfg(windows)]
mod windows;

#[cfg(unix)]
mod unix;

#[cfg(windows)]
pub use self::windows::{remove, Segment};

#[cfg(unix)]
pub use self::unix::{remove, Segment};
