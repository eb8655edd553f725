//! Model module for the plume segmentation network using the Burn framework
//!
//! This module provides:
//! - The nested U-Net (UNet++) architecture
//! - Run configuration (architecture, training, scheduler, data, output)
//!
//! ## Architecture
//!
//! Four encoder stages (base, 2x, 4x, 8x channels), three nested decoder
//! levels with dense skip pathways and a 1x1 projection to class logits at the
//! input resolution.

pub mod config;
pub mod nested_unet;

// Re-export main types for convenience
pub use config::RunConfig;
pub use nested_unet::{ForwardMode, NestedConvBlock, NestedUNet, NestedUNetConfig};
