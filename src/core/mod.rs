//! Core signal processing for the MindBalance agent.
//!
//! This module contains:
//! - Window management for collecting samples into fixed-size windows
//! - Welch PSD estimation per window
//! - Band-power aggregation over named frequency bands
//! - Feature record building for export

pub mod bands;
pub mod record;
pub mod spectral;
pub mod windowing;

// Re-export commonly used types
pub use bands::{aggregate, band_mean, Band, BandError, BandPower, BandTable};
pub use record::{ChannelFeatures, FeatureEmitter, FeatureRecord};
pub use spectral::{Psd, WelchEstimator};
pub use windowing::{Window, WindowBuffer, WindowError};
