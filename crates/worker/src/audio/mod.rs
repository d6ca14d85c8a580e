pub mod source;

pub use source::{AudioFrame, AudioSource};
