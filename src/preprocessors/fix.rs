use chrono::{DateTime, Utc};
use std::fmt;

/// Receiver network a position report most likely came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixSource {
    Terrestrial,
    Satellite,
}

impl FixSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixSource::Terrestrial => "terrestrial",
            FixSource::Satellite => "satellite",
        }
    }
}

impl fmt::Display for FixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, normalized vessel position report.
///
/// Every instance has passed the full normalization pipeline: coordinates are
/// in range, `sog` (when set) is within `[0, cap]`, and `vessel_uid` is
/// non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFix {
    pub observed_at: DateTime<Utc>,
    pub source: FixSource,
    pub vessel_uid: String,
    pub lat: f64,
    pub lon: f64,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<i32>,
    pub elapsed_minutes: Option<i32>,
    pub destination: Option<String>,
    pub flag: Option<String>,
    pub shipname: Option<String>,
    pub length_m: Option<f64>,
    pub width_m: Option<f64>,
    pub dwt: Option<i32>,
    pub shiptype: Option<i32>,
    pub ship_id: Option<String>,
    pub rot: Option<f64>,
}

/// Orders fixes by `(vessel_uid, observed_at)` for stable downstream batches.
pub fn sort_for_persistence(fixes: &mut [CanonicalFix]) {
    fixes.sort_by(|left, right| {
        left.vessel_uid
            .cmp(&right.vessel_uid)
            .then(left.observed_at.cmp(&right.observed_at))
    });
}

#[cfg(test)]
pub(crate) fn sample_fix(vessel_uid: &str, observed_at: DateTime<Utc>) -> CanonicalFix {
    CanonicalFix {
        observed_at,
        source: FixSource::Terrestrial,
        vessel_uid: vessel_uid.to_owned(),
        lat: 25.0,
        lon: 55.0,
        sog: Some(10.0),
        cog: None,
        heading: None,
        elapsed_minutes: None,
        destination: None,
        flag: None,
        shipname: None,
        length_m: None,
        width_m: None,
        dwt: None,
        shiptype: None,
        ship_id: None,
        rot: None,
    }
}
