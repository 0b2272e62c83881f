//! Band-power aggregation.
//!
//! A band's power is the arithmetic mean of the PSD densities whose bin
//! frequency lies inside the band's inclusive `[low, high]` range. A band that
//! contains no bin at the current resolution has power `NaN`; it serializes as
//! `null` in JSON and `NaN` in CSV.

use crate::core::spectral::Psd;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use thiserror::Error;

/// A named inclusive frequency range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub low_hz: f64,
    pub high_hz: f64,
}

impl Band {
    pub fn new(name: impl Into<String>, low_hz: f64, high_hz: f64) -> Self {
        Self {
            name: name.into(),
            low_hz,
            high_hz,
        }
    }

    /// Check if `freq` lies inside the band, edges included.
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low_hz && freq <= self.high_hz
    }

    /// Number of bins at `resolution` Hz spacing (0..=`nyquist`) inside the band.
    pub fn bin_count(&self, resolution: f64, nyquist: f64) -> usize {
        if !(resolution > 0.0) || self.low_hz > nyquist {
            return 0;
        }
        let first = (self.low_hz / resolution).ceil();
        let last = (self.high_hz.min(nyquist) / resolution).floor();
        if last < first {
            0
        } else {
            (last - first) as usize + 1
        }
    }
}

/// Invalid band definitions.
#[derive(Debug, Error, PartialEq)]
pub enum BandError {
    #[error("band table is empty")]
    Empty,

    #[error("band has an empty name")]
    Unnamed,

    #[error("band '{name}' has invalid range [{low_hz}, {high_hz}]")]
    InvalidRange {
        name: String,
        low_hz: f64,
        high_hz: f64,
    },

    #[error("band '{0}' is defined twice")]
    Duplicate(String),
}

/// Ordered set of bands to aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandTable {
    bands: Vec<Band>,
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            bands: vec![
                Band::new("theta", 4.0, 8.0),
                Band::new("alpha", 8.0, 13.0),
                Band::new("beta", 13.0, 30.0),
            ],
        }
    }
}

impl BandTable {
    /// Build a validated table.
    pub fn new(bands: Vec<Band>) -> Result<Self, BandError> {
        let table = Self { bands };
        table.validate()?;
        Ok(table)
    }

    /// Check names are unique and non-empty and ranges satisfy `0 ≤ low ≤ high`.
    pub fn validate(&self) -> Result<(), BandError> {
        if self.bands.is_empty() {
            return Err(BandError::Empty);
        }

        let mut seen = HashSet::new();
        for band in &self.bands {
            if band.name.trim().is_empty() {
                return Err(BandError::Unnamed);
            }
            let valid = band.low_hz.is_finite()
                && band.high_hz.is_finite()
                && band.low_hz >= 0.0
                && band.low_hz <= band.high_hz;
            if !valid {
                return Err(BandError::InvalidRange {
                    name: band.name.clone(),
                    low_hz: band.low_hz,
                    high_hz: band.high_hz,
                });
            }
            if !seen.insert(band.name.as_str()) {
                return Err(BandError::Duplicate(band.name.clone()));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Bands that would receive no bin at the given resolution.
    pub fn degenerate_bands(&self, resolution: f64, nyquist: f64) -> Vec<&Band> {
        self.bands
            .iter()
            .filter(|b| b.bin_count(resolution, nyquist) == 0)
            .collect()
    }
}

/// Band powers of one channel, in band-table order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandPower {
    entries: Vec<(String, f64)>,
}

impl BandPower {
    /// Power of `band`, if the band exists.
    pub fn get(&self, band: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == band)
            .map(|(_, power)| *power)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, power)| (name.as_str(), *power))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for BandPower {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, power) in &self.entries {
            map.serialize_entry(name, power)?;
        }
        map.end()
    }
}

/// Aggregate every channel of `psd` over `bands`.
pub fn aggregate(psd: &Psd, bands: &BandTable) -> Vec<BandPower> {
    for band in bands.iter() {
        if !psd.frequencies.iter().any(|&f| band.contains(f)) {
            tracing::warn!(
                "Band '{}' [{}, {}] Hz has no PSD bin at {:.3} Hz resolution; reporting NaN",
                band.name,
                band.low_hz,
                band.high_hz,
                psd.resolution()
            );
        }
    }

    psd.densities
        .iter()
        .map(|density| BandPower {
            entries: bands
                .iter()
                .map(|band| (band.name.clone(), band_mean(&psd.frequencies, density, band)))
                .collect(),
        })
        .collect()
}

/// Mean density of the bins inside `band`, or `NaN` when there are none.
pub fn band_mean(frequencies: &[f64], density: &[f64], band: &Band) -> f64 {
    let (sum, count) = frequencies
        .iter()
        .zip(density)
        .filter(|(&f, _)| band.contains(f))
        .fold((0.0, 0usize), |(sum, count), (_, &d)| (sum + d, count + 1));

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
