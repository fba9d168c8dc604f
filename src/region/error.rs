//! Region descriptor error types

use std::path::PathBuf;

use thiserror::Error;

use crate::app::Region;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Failed to access region descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Region descriptor matches neither edge nor origin/size shape: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Region descriptor has no area: {0}")]
    Empty(Region),
}

pub type RegionResult<T> = Result<T, RegionError>;
