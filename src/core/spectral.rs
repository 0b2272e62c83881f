//! Welch power spectral density estimation.
//!
//! Each channel of a window is split into segments of `2 × sample_rate`
//! samples overlapping by half. Every segment is mean-detrended, tapered with
//! a periodic Hann window and transformed; the one-sided periodograms are
//! averaged and scaled to a density (units²/Hz).
//!
//! Windows shorter than one segment are estimated from a single segment
//! spanning all available samples, at a correspondingly coarser resolution.

use crate::core::windowing::Window;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Power spectral density of every channel of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    /// Bin centres in Hz, ascending from 0 to Nyquist
    pub frequencies: Vec<f64>,
    /// Density per channel, aligned with `frequencies`
    pub densities: Vec<Vec<f64>>,
    /// Samples per segment actually used
    pub segment_len: usize,
    /// Number of periodograms averaged
    pub segments: usize,
}

impl Psd {
    /// Check if the estimate has no frequency bins.
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.densities.len()
    }

    /// Spacing between bins in Hz, or 0 when fewer than two bins exist.
    pub fn resolution(&self) -> f64 {
        match self.frequencies.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }
}

/// Welch estimator configured for one session.
#[derive(Debug, Clone)]
pub struct WelchEstimator {
    sample_rate: u32,
    segment_len: usize,
}

impl WelchEstimator {
    /// Two-second segments at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_segment_len(sample_rate, 2 * sample_rate as usize)
    }

    pub fn with_segment_len(sample_rate: u32, segment_len: usize) -> Self {
        Self {
            sample_rate,
            segment_len: segment_len.max(1),
        }
    }

    /// Nominal samples per segment.
    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Nominal bin spacing in Hz.
    pub fn resolution(&self) -> f64 {
        f64::from(self.sample_rate) / self.segment_len as f64
    }

    /// Segment length used for a window of `available` samples.
    pub fn effective_segment_len(&self, available: usize) -> usize {
        self.segment_len.min(available)
    }

    /// Estimate the PSD of every channel in `window`.
    ///
    /// Pure function of the window: the same input always yields the same
    /// bits. An empty window yields an estimate without bins.
    pub fn estimate(&self, window: &Window) -> Psd {
        let len = self.effective_segment_len(window.len());
        if len == 0 || self.sample_rate == 0 {
            return Psd {
                frequencies: Vec::new(),
                densities: vec![Vec::new(); window.channel_count],
                segment_len: 0,
                segments: 0,
            };
        }

        if len < self.segment_len {
            tracing::debug!(
                "Window {} has {} samples, shorter than a {}-sample segment",
                window.index,
                window.len(),
                self.segment_len
            );
        }

        let plan = SegmentPlan::new(len, f64::from(self.sample_rate));
        let densities = (0..window.channel_count)
            .map(|c| plan.average(&window.channel(c)))
            .collect();

        Psd {
            frequencies: plan.frequencies(),
            densities,
            segment_len: len,
            segments: plan.segment_count(window.len()),
        }
    }
}

/// Taper, scaling and FFT shared by all channels of one estimate.
struct SegmentPlan {
    len: usize,
    hop: usize,
    sample_rate: f64,
    taper: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl SegmentPlan {
    fn new(len: usize, sample_rate: f64) -> Self {
        let taper = hann_periodic(len);
        let power: f64 = taper.iter().map(|w| w * w).sum();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(len);

        Self {
            len,
            hop: len - len / 2,
            sample_rate,
            taper,
            scale: 1.0 / (sample_rate * power),
            fft,
        }
    }

    fn bins(&self) -> usize {
        self.len / 2 + 1
    }

    fn frequencies(&self) -> Vec<f64> {
        (0..self.bins())
            .map(|k| k as f64 * self.sample_rate / self.len as f64)
            .collect()
    }

    fn segment_count(&self, available: usize) -> usize {
        if available < self.len {
            return 0;
        }
        (available - self.len) / self.hop + 1
    }

    /// Average one-sided periodogram of `data`.
    fn average(&self, data: &[f64]) -> Vec<f64> {
        let bins = self.bins();
        let segments = self.segment_count(data.len());
        let mut accum = vec![0.0; bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.len];

        for seg in 0..segments {
            let start = seg * self.hop;
            let segment = &data[start..start + self.len];
            let mean = segment.iter().sum::<f64>() / self.len as f64;

            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.taper) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            self.fft.process(&mut buffer);

            for (k, (acc, c)) in accum.iter_mut().zip(&buffer).enumerate() {
                let mut power = c.norm_sqr() * self.scale;
                // Fold negative frequencies; DC and an even-length Nyquist bin have no mirror.
                let mirrored = k != 0 && !(self.len % 2 == 0 && k == self.len / 2);
                if mirrored {
                    power *= 2.0;
                }
                *acc += power;
            }
        }

        if segments > 0 {
            let inv = 1.0 / segments as f64;
            accum.iter_mut().for_each(|v| *v *= inv);
        }
        accum
    }
}

/// Periodic Hann window of length `n`.
fn hann_periodic(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::synthetic::{seeded_rng, SyntheticSource};
    use crate::acquisition::types::Sample;

    fn window_from(sample_rate: u32, channels: Vec<Vec<f64>>) -> Window {
        let n = channels.first().map(|c| c.len()).unwrap_or(0);
        let samples = (0..n)
            .map(|i| {
                Sample::new(
                    channels.iter().map(|c| c[i]).collect(),
                    i as f64 / f64::from(sample_rate),
                )
            })
            .collect();
        Window {
            index: 0,
            channel_count: channels.len(),
            sample_rate,
            capacity: n,
            samples,
        }
    }

    fn noise_window(channels: usize, sample_rate: u32, n: usize) -> Window {
        let mut source = SyntheticSource::with_anchor(channels, sample_rate, seeded_rng(42), 0.0);
        Window {
            index: 0,
            channel_count: channels,
            sample_rate,
            capacity: n,
            samples: (0..n).map(|_| source.next_sample()).collect(),
        }
    }

    fn sine(freq: f64, sample_rate: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / f64::from(sample_rate)).sin())
            .collect()
    }

    #[test]
    fn test_hann_periodic() {
        let w = hann_periodic(4);
        assert_eq!(w.len(), 4);
        assert!(w[0].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
        assert_eq!(hann_periodic(1), vec![1.0]);
    }

    #[test]
    fn test_bins_and_resolution() {
        let estimator = WelchEstimator::new(256);
        assert_eq!(estimator.segment_len(), 512);
        assert!((estimator.resolution() - 0.5).abs() < 1e-12);

        let psd = estimator.estimate(&noise_window(8, 256, 1280));
        assert_eq!(psd.frequencies.len(), 257);
        assert_eq!(psd.channel_count(), 8);
        assert_eq!(psd.segments, 4);
        assert!((psd.resolution() - 0.5).abs() < 1e-12);
        assert!((psd.frequencies[256] - 128.0).abs() < 1e-12);
    }

    #[test]
    fn test_bins_ascending_and_non_negative() {
        let psd = WelchEstimator::new(256).estimate(&noise_window(4, 256, 1000));

        assert!(psd.frequencies.windows(2).all(|p| p[1] > p[0]));
        for channel in &psd.densities {
            assert_eq!(channel.len(), psd.frequencies.len());
            assert!(channel.iter().all(|&d| d >= 0.0));
        }
    }

    #[test]
    fn test_white_noise_density_level() {
        // Unit-variance white noise has a one-sided density of 2 / fs.
        let psd = WelchEstimator::new(256).estimate(&noise_window(1, 256, 256 * 20));
        let interior = &psd.densities[0][1..psd.frequencies.len() - 1];
        let mean = interior.iter().sum::<f64>() / interior.len() as f64;
        let expected = 2.0 / 256.0;
        assert!(
            (mean - expected).abs() < expected * 0.1,
            "mean density {mean}, expected {expected}"
        );
    }

    #[test]
    fn test_sine_peak_location() {
        let window = window_from(256, vec![sine(10.0, 256, 1280)]);
        let psd = WelchEstimator::new(256).estimate(&window);

        let (peak, _) = psd.densities[0]
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (k, &d)| if d > best.1 { (k, d) } else { best });
        assert!((psd.frequencies[peak] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_shorter_than_segment() {
        // 4 Hz for 2 seconds: exactly one 8-sample segment.
        let psd = WelchEstimator::new(4).estimate(&noise_window(2, 4, 8));
        assert!(!psd.is_empty());
        assert_eq!(psd.frequencies, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(psd.segments, 1);

        // Fewer samples than a segment still yields a best-effort estimate.
        let psd = WelchEstimator::new(256).estimate(&noise_window(1, 256, 3));
        assert_eq!(psd.segment_len, 3);
        assert_eq!(psd.frequencies.len(), 2);
        assert_eq!(psd.segments, 1);
    }

    #[test]
    fn test_empty_window() {
        let psd = WelchEstimator::new(256).estimate(&noise_window(3, 256, 0));
        assert!(psd.is_empty());
        assert_eq!(psd.channel_count(), 3);
        assert_eq!(psd.resolution(), 0.0);
    }

    #[test]
    fn test_constant_signal_is_detrended() {
        let window = window_from(8, vec![vec![5.0; 32]]);
        let psd = WelchEstimator::new(8).estimate(&window);
        assert!(psd.densities[0].iter().all(|&d| d.abs() < 1e-20));
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let window = noise_window(8, 256, 1280);
        let estimator = WelchEstimator::new(256);
        let a = estimator.estimate(&window);
        let b = estimator.estimate(&window);

        for (x, y) in a.densities.iter().flatten().zip(b.densities.iter().flatten()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}
