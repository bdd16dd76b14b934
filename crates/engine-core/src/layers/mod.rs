//! Layer implementations shipped with the engine.

mod progress;

pub use progress::{progress_layer_factory, ProgressLayer, PROGRESS_LAYER_TYPE};
