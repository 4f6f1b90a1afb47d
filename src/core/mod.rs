// src/core/mod.rs

pub mod buffer;
pub mod cancellation;
pub mod config_loader;
pub mod paths;
pub mod pump;
