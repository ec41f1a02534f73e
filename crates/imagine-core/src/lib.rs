pub mod pipeline;
pub mod record;
pub mod request;
mod sampler;

pub use sampler::{Sampler, UnknownSampler};
