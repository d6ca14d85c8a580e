pub mod aggregator;
pub mod client;
pub mod wire;

pub use client::{SttClient, SttClientState};
