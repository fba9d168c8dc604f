// region/mod.rs - Region Descriptor and Hot Reload
//
// The capture region comes from a small JSON file written by an external
// selector. `descriptor` parses and writes that file; `watcher` polls its
// modification time and pushes new regions into the shared state.

mod descriptor;
mod error;
mod watcher;

pub use descriptor::*;
pub use error::*;
pub use watcher::*;
