//! Encoder-level pass implementations for the SSR command stream.

pub mod compute;
pub mod copy;
pub mod fullscreen;
pub mod ray_march;
