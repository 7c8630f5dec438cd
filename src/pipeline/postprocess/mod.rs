//! Post-processing effects

mod bloom;
mod tonemapping;

pub use bloom::{blur_reference, BloomPass, GAUSSIAN_WEIGHTS};
pub use tonemapping::{tonemap, PostPass};
