pub mod catalog;
pub mod registry;
pub mod template;

pub use registry::{StylePreset, StyleRegistry};
