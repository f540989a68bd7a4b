//! Shader compilation and raster pipeline creation

pub mod manager;

pub use manager::*;
