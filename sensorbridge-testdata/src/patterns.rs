// SensorBridge Testdata - Signal patterns
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shapes of the physical quantities a simulated node reports.
//!
//! A pattern maps the time elapsed since the start of a run to a value.
//! Patterns are deterministic; measurement noise is added by the generator.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// How one quantity evolves over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalPattern {
    /// Fixed value.
    Constant { value: f64 },

    /// `offset + amplitude * sin(TAU * t / period_ms + phase)`
    Sine {
        amplitude: f64,
        period_ms: u64,
        phase: f64,
        offset: f64,
    },

    /// `start + slope_per_ms * t`
    Linear { start: f64, slope_per_ms: f64 },

    /// Daily cycle: `max` at `peak_hour`, falling towards `min` with a
    /// gaussian profile of width `spread` hours.
    Diurnal {
        min: f64,
        max: f64,
        peak_hour: f64,
        spread: f64,
    },
}

impl SignalPattern {
    /// Value at `elapsed_ms` into the run.
    pub fn evaluate(&self, elapsed_ms: u64) -> f64 {
        let t = elapsed_ms as f64;
        match *self {
            SignalPattern::Constant { value } => value,
            SignalPattern::Sine {
                amplitude,
                period_ms,
                phase,
                offset,
            } => offset + amplitude * (TAU * t / period_ms.max(1) as f64 + phase).sin(),
            SignalPattern::Linear {
                start,
                slope_per_ms,
            } => start + slope_per_ms * t,
            SignalPattern::Diurnal {
                min,
                max,
                peak_hour,
                spread,
            } => {
                let hours_from_peak = hour_distance(t / MS_PER_HOUR, peak_hour);
                let weight = (-hours_from_peak.powi(2) / (2.0 * spread.powi(2))).exp();
                min + (max - min) * weight
            }
        }
    }

    /// Room temperature peaking mid-afternoon.
    pub fn indoor_temperature(min: f64, max: f64) -> Self {
        SignalPattern::Diurnal {
            min,
            max,
            peak_hour: 15.0,
            spread: 4.0,
        }
    }

    /// Temperature climbing by `per_sample` every `interval_ms`.
    pub fn heating(start: f64, per_sample: f64, interval_ms: u64) -> Self {
        SignalPattern::Linear {
            start,
            slope_per_ms: per_sample / interval_ms.max(1) as f64,
        }
    }
}

/// Distance in hours between two times of day, wrapping at midnight.
fn hour_distance(hours: f64, peak_hour: f64) -> f64 {
    let d = (hours.rem_euclid(24.0) - peak_hour).abs();
    d.min(24.0 - d)
}

/// Zero-mean normal sample; zero for a non-positive or invalid deviation.
pub(crate) fn gaussian(std_dev: f64, rng: &mut (impl Rng + ?Sized)) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, std_dev)
        .map(|dist| dist.sample(rng))
        .unwrap_or(0.0)
}
