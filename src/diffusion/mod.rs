pub mod client;
pub mod control;
pub mod request;

pub use client::{DataUri, DiffusionClient};
