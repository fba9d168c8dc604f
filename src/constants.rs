// constants.rs - Application-wide Constants
//
// Centralized constants for the shared-memory wire format, timing defaults,
// and well-known names. The wire values are shared with out-of-process
// readers and must not change without bumping the protocol version.

/// Shared-memory frame transport
pub mod shm {
    /// Segment name on Windows (session-local namespace)
    #[cfg(windows)]
    pub const DEFAULT_NAME: &str = "Local\\SETJA_OCR_FRAME_V1";
    /// Segment name for POSIX `shm_open`
    #[cfg(not(windows))]
    pub const DEFAULT_NAME: &str = "/setja_ocr_frame_v1";
    /// "SJFM" in little-endian byte order
    pub const MAGIC: u32 = 0x4D46_4A53;
    /// Layout version written into every header
    pub const VERSION: u32 = 1;
    /// Pixel format tag for tightly packed BGRA8 rows
    pub const FORMAT_BGRA8: i32 = 1;
    /// Bytes per BGRA8 pixel
    pub const BYTES_PER_PIXEL: usize = 4;
    /// Byte offset of the sequence counter inside the header
    pub const SEQ_OFFSET: usize = 8;
    /// How many times a reader retries before giving up on a busy writer
    pub const READER_MAX_SPIN: u32 = 200;
}

/// Capture loop timing
pub mod capture {
    /// Default publish rate
    pub const DEFAULT_TARGET_FPS: f64 = 15.0;
    /// Lower bound for the per-frame acquire timeout
    pub const MIN_ACQUIRE_TIMEOUT_MS: u32 = 1;
}

/// Region descriptor polling
pub mod region {
    /// Descriptor file name inside the temp directory
    pub const DEFAULT_FILE_NAME: &str = "setja_region.json";
    /// Descriptor path override
    pub const FILE_ENV: &str = "SETJA_REGION_FILE";
    /// Default watcher poll interval
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
}

/// Runtime settings
pub mod settings {
    /// Settings file override
    pub const FILE_ENV: &str = "SETJA_CAPTURE_SETTINGS";
    /// Segment name override
    pub const SHM_NAME_ENV: &str = "SETJA_SHM_NAME";
    /// Frame rate override
    pub const TARGET_FPS_ENV: &str = "SETJA_TARGET_FPS";
    /// Directory under the user config dir
    pub const APP_DIR: &str = "SETJA";
    /// Subdirectory for this component
    pub const COMPONENT_DIR: &str = "capture";
    /// Settings file name
    pub const FILE_NAME: &str = "capture_settings.json";
}

/// Software backend used where no GPU duplication API exists
pub mod synthetic {
    /// Default desktop width
    pub const DESKTOP_WIDTH: u32 = 1920;
    /// Default desktop height
    pub const DESKTOP_HEIGHT: u32 = 1080;
    /// Row pitch alignment, mirrors what GPU staging textures report
    pub const ROW_ALIGN: usize = 256;
}

/// Process exit codes
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const INIT_FAILED: i32 = 2;
    pub const REINIT_FAILED: i32 = 3;
}
