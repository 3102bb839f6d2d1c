//! Video decoding: frame sampling and thumbnails.

pub mod sampler;
pub mod thumbnails;

#[cfg(test)]
pub(crate) mod testing;
