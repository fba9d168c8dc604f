// app/mod.rs - Shared Application State
//
// State that is owned by the coordinator and handed to both long-lived
// threads at spawn time. Nothing in here touches the GPU or the filesystem.

mod state;

pub use state::*;
