//! Audio-feature preferences sent along with recommendation requests.

use super::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDimension {
    Acousticness,
    Danceability,
    DurationMs,
    Energy,
    Instrumentalness,
    Key,
    Liveness,
    Loudness,
    Mode,
    Popularity,
    Speechiness,
    Tempo,
    TimeSignature,
    Valence,
}

/// Closed value range of a dimension as accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionRange {
    pub lo: f64,
    pub hi: f64,
    pub integer: bool,
}

impl DimensionRange {
    const UNIT: DimensionRange = DimensionRange {
        lo: 0.0,
        hi: 1.0,
        integer: false,
    };

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    /// `[min, max)`, or `[min, max]` when `max` is the top of the range.
    pub fn bucket(&self, min: f64, max: f64) -> ValueBucket {
        ValueBucket {
            min,
            max,
            inclusive_max: max >= self.hi,
        }
    }

    /// Consecutive buckets split at the quartiles. Quartiles of integer
    /// ranges are rounded and buckets left empty by the rounding are dropped.
    pub fn quartile_buckets(&self) -> Vec<ValueBucket> {
        let at = |fraction: f64| {
            let v = self.lo + (self.hi - self.lo) * fraction;
            if self.integer {
                v.round()
            } else {
                v
            }
        };
        let (q1, q2, q3) = (at(0.25), at(0.5), at(0.75));
        let bounds = [(self.lo, q1), (q1, q2), (q2, q3), (q3, self.hi)];
        let last = bounds.len() - 1;
        bounds
            .into_iter()
            .enumerate()
            .map(|(i, (min, max))| ValueBucket {
                min,
                max,
                inclusive_max: i == last,
            })
            .filter(|bucket| !bucket.is_empty())
            .collect()
    }
}

/// Slice of a dimension's values; the upper bound is excluded unless
/// `inclusive_max` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueBucket {
    pub min: f64,
    pub max: f64,
    pub inclusive_max: bool,
}

impl ValueBucket {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min
            && (value < self.max || (self.inclusive_max && value == self.max))
    }

    pub fn is_empty(&self) -> bool {
        if self.inclusive_max {
            self.min > self.max
        } else {
            self.min >= self.max
        }
    }
}

impl AudioDimension {
    pub const ALL: [AudioDimension; 14] = [
        AudioDimension::Acousticness,
        AudioDimension::Danceability,
        AudioDimension::DurationMs,
        AudioDimension::Energy,
        AudioDimension::Instrumentalness,
        AudioDimension::Key,
        AudioDimension::Liveness,
        AudioDimension::Loudness,
        AudioDimension::Mode,
        AudioDimension::Popularity,
        AudioDimension::Speechiness,
        AudioDimension::Tempo,
        AudioDimension::TimeSignature,
        AudioDimension::Valence,
    ];

    /// Name used in `target_`/`min_`/`max_` query parameters and store columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioDimension::Acousticness => "acousticness",
            AudioDimension::Danceability => "danceability",
            AudioDimension::DurationMs => "duration_ms",
            AudioDimension::Energy => "energy",
            AudioDimension::Instrumentalness => "instrumentalness",
            AudioDimension::Key => "key",
            AudioDimension::Liveness => "liveness",
            AudioDimension::Loudness => "loudness",
            AudioDimension::Mode => "mode",
            AudioDimension::Popularity => "popularity",
            AudioDimension::Speechiness => "speechiness",
            AudioDimension::Tempo => "tempo",
            AudioDimension::TimeSignature => "time_signature",
            AudioDimension::Valence => "valence",
        }
    }

    pub fn range(&self) -> DimensionRange {
        match self {
            AudioDimension::DurationMs => DimensionRange {
                lo: 0.0,
                hi: 3_600_000.0,
                integer: true,
            },
            AudioDimension::Key => DimensionRange {
                lo: 0.0,
                hi: 11.0,
                integer: true,
            },
            AudioDimension::Loudness => DimensionRange {
                lo: -60.0,
                hi: 0.0,
                integer: false,
            },
            AudioDimension::Mode => DimensionRange {
                lo: 0.0,
                hi: 1.0,
                integer: true,
            },
            AudioDimension::Popularity => DimensionRange {
                lo: 0.0,
                hi: 100.0,
                integer: true,
            },
            AudioDimension::Tempo => DimensionRange {
                lo: 0.0,
                hi: 250.0,
                integer: false,
            },
            AudioDimension::TimeSignature => DimensionRange {
                lo: 3.0,
                hi: 7.0,
                integer: true,
            },
            _ => DimensionRange::UNIT,
        }
    }
}

impl fmt::Display for AudioDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioDimension {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioDimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ApiError::Validation(format!("unknown audio feature '{}'", s)))
    }
}

/// Preference on a single dimension: a target, or an optionally open range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionFilter {
    Target(f64),
    Range { min: Option<f64>, max: Option<f64> },
}

impl DimensionFilter {
    /// An "exact" preference is sent as a target; no range is synthesised around it.
    pub fn exact(value: f64) -> Self {
        DimensionFilter::Target(value)
    }

    pub fn between(min: f64, max: f64) -> Self {
        DimensionFilter::Range {
            min: Some(min),
            max: Some(max),
        }
    }

    fn validate(&self, dimension: AudioDimension) -> Result<(), ApiError> {
        let range = dimension.range();
        let check = |value: f64, what: &str| {
            if !value.is_finite() || !range.contains(value) {
                return Err(ApiError::Validation(format!(
                    "{}_{} = {} is outside [{}, {}]",
                    what, dimension, value, range.lo, range.hi
                )));
            }
            if range.integer && value.fract() != 0.0 {
                return Err(ApiError::Validation(format!(
                    "{}_{} must be a whole number, got {}",
                    what, dimension, value
                )));
            }
            Ok(())
        };
        match *self {
            DimensionFilter::Target(v) => check(v, "target"),
            DimensionFilter::Range { min, max } => {
                if min.is_none() && max.is_none() {
                    return Err(ApiError::Validation(format!(
                        "range on {} has neither min nor max",
                        dimension
                    )));
                }
                if let Some(v) = min {
                    check(v, "min")?;
                }
                if let Some(v) = max {
                    check(v, "max")?;
                }
                match (min, max) {
                    (Some(lo), Some(hi)) if lo > hi => Err(ApiError::Validation(format!(
                        "min_{} = {} is greater than max_{} = {}",
                        dimension, lo, dimension, hi
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// The full set of per-dimension preferences for one generation run.
///
/// Values are immutable; the `with_*` builders return an updated copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    dimensions: BTreeMap<AudioDimension, DimensionFilter>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(&self, dimension: AudioDimension, filter: DimensionFilter) -> Self {
        let mut dimensions = self.dimensions.clone();
        dimensions.insert(dimension, filter);
        Self { dimensions }
    }

    pub fn with_target(&self, dimension: AudioDimension, value: f64) -> Self {
        self.with(dimension, DimensionFilter::Target(value))
    }

    pub fn with_range(&self, dimension: AudioDimension, min: Option<f64>, max: Option<f64>) -> Self {
        self.with(dimension, DimensionFilter::Range { min, max })
    }

    pub fn without(&self, dimension: AudioDimension) -> Self {
        let mut dimensions = self.dimensions.clone();
        dimensions.remove(&dimension);
        Self { dimensions }
    }

    pub fn get(&self, dimension: AudioDimension) -> Option<&DimensionFilter> {
        self.dimensions.get(&dimension)
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AudioDimension, &DimensionFilter)> {
        self.dimensions.iter().map(|(d, f)| (*d, f))
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        for (dimension, filter) in &self.dimensions {
            filter.validate(*dimension)?;
        }
        Ok(())
    }

    /// Parses `target_<dim>`, `min_<dim>`, `max_<dim>` pairs.
    ///
    /// A dimension given both a target and a bound is rejected, as is any
    /// value that fails [`FilterSpec::validate`].
    pub fn from_params<'a, I>(params: I) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut dimensions: BTreeMap<AudioDimension, DimensionFilter> = BTreeMap::new();
        for (name, value) in params {
            let (prefix, dimension) = name
                .split_once('_')
                .ok_or_else(|| ApiError::Validation(format!("unknown filter '{}'", name)))?;
            let dimension: AudioDimension = dimension.parse()?;
            let entry = dimensions.get(&dimension).copied();
            let updated = match (prefix, entry) {
                ("target", None) => DimensionFilter::Target(value),
                ("min", None) => DimensionFilter::Range {
                    min: Some(value),
                    max: None,
                },
                ("max", None) => DimensionFilter::Range {
                    min: None,
                    max: Some(value),
                },
                ("min", Some(DimensionFilter::Range { min: None, max })) => {
                    DimensionFilter::Range {
                        min: Some(value),
                        max,
                    }
                }
                ("max", Some(DimensionFilter::Range { min, max: None })) => {
                    DimensionFilter::Range {
                        min,
                        max: Some(value),
                    }
                }
                ("target" | "min" | "max", Some(_)) => {
                    return Err(ApiError::Validation(format!(
                        "conflicting filters on {}: target and range are mutually exclusive",
                        dimension
                    )))
                }
                _ => return Err(ApiError::Validation(format!("unknown filter '{}'", name))),
            };
            dimensions.insert(dimension, updated);
        }
        let spec = Self { dimensions };
        spec.validate()?;
        Ok(spec)
    }

    /// Query parameters for the recommendation endpoint.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let format_value = |dimension: AudioDimension, value: f64| {
            if dimension.range().integer {
                format!("{}", value as i64)
            } else {
                format!("{}", value)
            }
        };
        let mut params = Vec::new();
        for (dimension, filter) in &self.dimensions {
            match *filter {
                DimensionFilter::Target(v) => {
                    params.push((format!("target_{}", dimension), format_value(*dimension, v)))
                }
                DimensionFilter::Range { min, max } => {
                    if let Some(v) = min {
                        params.push((format!("min_{}", dimension), format_value(*dimension, v)));
                    }
                    if let Some(v) = max {
                        params.push((format!("max_{}", dimension), format_value(*dimension, v)));
                    }
                }
            }
        }
        params
    }
}
