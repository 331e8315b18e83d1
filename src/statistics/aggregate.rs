//! Hourly relative-frequency aggregation.
//!
//! Each step is a separate function over ordered numeric sequences so it can
//! be checked in isolation. Bucket-level sequences are aligned to the sorted
//! label order produced by [`assign_buckets`].

use serde::Serialize;

use super::buckets::{assign_buckets, bucket_label};
use super::AggregationSettings;
use crate::models::Reading;

/// The four greenhouse station channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Illumination,
    Temperature,
    Pressure,
    Moisture,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Illumination,
        Channel::Temperature,
        Channel::Pressure,
        Channel::Moisture,
    ];

    pub fn value(self, reading: &Reading) -> f64 {
        match self {
            Channel::Illumination => reading.illumination,
            Channel::Temperature => reading.temperature,
            Channel::Pressure => reading.pressure,
            Channel::Moisture => reading.moisture,
        }
    }
}

/// Per-bucket series for one channel, aligned to [`HourlySummary::labels`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub relative_frequency: Vec<f64>,
    pub positive_band: Vec<f64>,
    pub negative_band: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySummary {
    /// Ascending `"HH:MM"` bucket labels
    pub labels: Vec<String>,
    pub illumination: ChannelSummary,
    pub temperature: ChannelSummary,
    pub pressure: ChannelSummary,
    pub moisture: ChannelSummary,
}

/// One bucket of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourBucket<'a> {
    pub label: &'a str,
    pub relative_frequency: f64,
    pub positive_band: f64,
    pub negative_band: f64,
}

impl HourlySummary {
    pub fn channel(&self, channel: Channel) -> &ChannelSummary {
        match channel {
            Channel::Illumination => &self.illumination,
            Channel::Temperature => &self.temperature,
            Channel::Pressure => &self.pressure,
            Channel::Moisture => &self.moisture,
        }
    }

    /// Buckets of one channel in label order
    pub fn buckets(&self, channel: Channel) -> impl Iterator<Item = HourBucket<'_>> + '_ {
        let series = self.channel(channel);
        self.labels.iter().enumerate().map(move |(i, label)| HourBucket {
            label,
            relative_frequency: series.relative_frequency[i],
            positive_band: series.positive_band[i],
            negative_band: series.negative_band[i],
        })
    }
}

/// Result of an aggregation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "summary", rename_all = "snake_case")]
pub enum Aggregation {
    /// No readings: render as "no data", not as zero activity
    Empty,
    Summary(HourlySummary),
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        matches!(self, Aggregation::Empty)
    }

    pub fn summary(&self) -> Option<&HourlySummary> {
        match self {
            Aggregation::Empty => None,
            Aggregation::Summary(summary) => Some(summary),
        }
    }
}

/// Bucket readings by hour of day and compute relative frequencies and bands
///
/// Readings are used in the order given (arrival order); only the bucket
/// output is sorted. Pure function of its inputs.
///
/// # Arguments
/// * `readings` - Readings of one device, in arrival order
/// * `settings` - Time zone and bucket period used for labelling
///
/// # Returns
/// `Aggregation::Empty` for no readings, otherwise the per-channel summary
pub fn aggregate(readings: &[Reading], settings: &AggregationSettings) -> Aggregation {
    if readings.is_empty() {
        return Aggregation::Empty;
    }

    let labels: Vec<String> = readings
        .iter()
        .map(|r| bucket_label(r.timestamp_origin, settings))
        .collect();
    let index = assign_buckets(&labels);
    let weights = occurrence_weights(&index.assignment, index.len());

    let summarize = |channel: Channel| {
        let values: Vec<f64> = readings.iter().map(|r| channel.value(r)).collect();
        let diffs = first_differences(&values);
        let deltas = bucket_sums(&index.assignment, index.len(), &diffs);
        let relative = relative_frequencies(&deltas);
        let (positive, negative) = dispersion_bands(&relative, &weights);

        ChannelSummary {
            relative_frequency: finalize_series(&relative),
            positive_band: finalize_series(&positive),
            negative_band: finalize_series(&negative),
        }
    };

    let illumination = summarize(Channel::Illumination);
    let temperature = summarize(Channel::Temperature);
    let pressure = summarize(Channel::Pressure);
    let moisture = summarize(Channel::Moisture);

    Aggregation::Summary(HourlySummary {
        labels: index.labels,
        illumination,
        temperature,
        pressure,
        moisture,
    })
}

/// `diff[i] = v[i] - v[i-1]`, with `diff[0] = 0`
pub fn first_differences(values: &[f64]) -> Vec<f64> {
    let mut diffs = Vec::with_capacity(values.len());
    if let Some(&first) = values.first() {
        diffs.push(0.0);
        let mut previous = first;
        for &value in &values[1..] {
            diffs.push(value - previous);
            previous = value;
        }
    }
    diffs
}

/// Sum per-reading values into their buckets
pub fn bucket_sums(assignment: &[usize], buckets: usize, values: &[f64]) -> Vec<f64> {
    let mut sums = vec![0.0; buckets];
    for (&bucket, &value) in assignment.iter().zip(values) {
        sums[bucket] += value;
    }
    sums
}

/// Share of all readings that fall in each bucket
pub fn occurrence_weights(assignment: &[usize], buckets: usize) -> Vec<f64> {
    let mut counts = vec![0usize; buckets];
    for &bucket in assignment {
        counts[bucket] += 1;
    }

    let total = assignment.len() as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// Each bucket's signed delta over the sum of all deltas
///
/// Negative for buckets moving against the overall trend; non-finite when the
/// deltas sum to zero (resolved later by [`finalize_series`]).
pub fn relative_frequencies(deltas: &[f64]) -> Vec<f64> {
    let total: f64 = deltas.iter().sum();
    deltas.iter().map(|d| d / total).collect()
}

/// Sample variance and standard deviation of the two-element sample `{a, b}`
pub fn paired_dispersion(a: f64, b: f64) -> (f64, f64) {
    let mean = (a + b) / 2.0;
    // n - 1 = 1
    let variance = (a - mean).powi(2) + (b - mean).powi(2);
    (variance, variance.sqrt())
}

/// Upper and lower bands: `var + (rf ± std)` of the `{rf, weight}` pair
pub fn dispersion_bands(relative: &[f64], weights: &[f64]) -> (Vec<f64>, Vec<f64>) {
    relative
        .iter()
        .zip(weights)
        .map(|(&rf, &weight)| {
            let (variance, std_dev) = paired_dispersion(rf, weight);
            (variance + (rf + std_dev), variance + (rf - std_dev))
        })
        .unzip()
}

/// Clip to non-negative, scale to percent and round to 2 decimals.
/// Non-finite values become 0.
pub fn finalize_series(series: &[f64]) -> Vec<f64> {
    series
        .iter()
        .map(|&v| {
            if v.is_finite() && v > 0.0 {
                (v * 100.0 * 100.0).round() / 100.0
            } else {
                0.0
            }
        })
        .collect()
}
