//! Fixed-order filter/transform pipeline turning raw tile rows into
//! [`CanonicalFix`] records.
//!
//! Stages run in order and the first failing stage drops the row:
//! vessel class, observation age, coordinates, spatial prefilter, source
//! classification, kinematics, identity. Survivors are projected into the
//! canonical shape with unavailable optional fields left unset.

use super::fix::{sort_for_persistence, CanonicalFix, FixSource};
use super::identity::{
    is_ascii_digits, VesselIdentityResolver, SATELLITE_PLACEHOLDER_NAME, SHIP_ID_KEY,
};
use super::prefilter::SpatialPrefilter;
use super::row::RawRow;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Provider speed fields are reported in tenths of a knot.
const SPEED_UNITS_PER_KNOT: f64 = 10.0;

/// Why a row was rejected by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    VesselClass,
    Stale,
    Coordinates,
    OutsideRegions,
    Satellite,
    Kinematics,
    Identity,
}

impl DropReason {
    pub const ALL: [DropReason; 7] = [
        DropReason::VesselClass,
        DropReason::Stale,
        DropReason::Coordinates,
        DropReason::OutsideRegions,
        DropReason::Satellite,
        DropReason::Kinematics,
        DropReason::Identity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::VesselClass => "vessel_class",
            DropReason::Stale => "stale",
            DropReason::Coordinates => "coordinates",
            DropReason::OutsideRegions => "outside_regions",
            DropReason::Satellite => "satellite",
            DropReason::Kinematics => "kinematics",
            DropReason::Identity => "identity",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-reason drop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    counts: [u64; DropReason::ALL.len()],
}

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        self.counts[reason.index()] += 1;
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        self.counts[reason.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn merge(&mut self, other: &DropCounts) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += theirs;
        }
    }
}

impl fmt::Display for DropCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for reason in DropReason::ALL {
            let count = self.get(reason);
            if count == 0 {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{reason}={count}")?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Predicate selecting the target vessel class.
///
/// The primary signal is the type-family code (`SHIPTYPE` starting with the
/// family digit); the readable type name, the icon hint and the provider's
/// alternate numeric type are consulted when the code does not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselClassFilter {
    pub family_prefix: String,
    pub type_name: String,
    pub type_icon: String,
    pub alternate_codes: Vec<String>,
}

impl Default for VesselClassFilter {
    fn default() -> Self {
        Self {
            family_prefix: "8".into(),
            type_name: "tanker".into(),
            type_icon: "8".into(),
            alternate_codes: vec!["17".into()],
        }
    }
}

impl VesselClassFilter {
    pub fn matches(&self, row: &RawRow) -> bool {
        if row
            .text("SHIPTYPE")
            .is_some_and(|code| code.starts_with(self.family_prefix.as_str()))
        {
            return true;
        }
        if row
            .text("TYPE_NAME")
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.type_name))
        {
            return true;
        }
        if row.text("TYPE_IMG").as_deref() == Some(self.type_icon.as_str()) {
            return true;
        }
        row.text("GT_SHIPTYPE")
            .is_some_and(|code| self.alternate_codes.iter().any(|alt| *alt == code))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerSettings {
    pub max_observation_age_minutes: i64,
    pub max_sog_knots: f64,
    pub prefilter_enabled: bool,
    pub keep_satellite: bool,
    pub vessel_class: VesselClassFilter,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            max_observation_age_minutes: 720,
            max_sog_knots: 35.0,
            prefilter_enabled: true,
            keep_satellite: false,
            vessel_class: VesselClassFilter::default(),
        }
    }
}

/// Result of normalizing one tile's rows.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub fixes: Vec<CanonicalFix>,
    pub drops: DropCounts,
}

#[derive(Debug, Clone)]
pub struct RowNormalizer {
    settings: NormalizerSettings,
    resolver: VesselIdentityResolver,
}

struct Kinematics {
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<i32>,
    rot: Option<f64>,
}

impl RowNormalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self {
            settings,
            resolver: VesselIdentityResolver::new(),
        }
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.settings
    }

    /// Normalizes every row and returns survivors sorted by
    /// `(vessel_uid, observed_at)`.
    pub fn normalize_batch(
        &self,
        rows: &[RawRow],
        fetched_at: DateTime<Utc>,
        prefilter: &SpatialPrefilter,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for row in rows {
            match self.normalize(row, fetched_at, prefilter) {
                Ok(fix) => batch.fixes.push(fix),
                Err(reason) => batch.drops.record(reason),
            }
        }
        sort_for_persistence(&mut batch.fixes);
        batch
    }

    pub fn normalize(
        &self,
        row: &RawRow,
        fetched_at: DateTime<Utc>,
        prefilter: &SpatialPrefilter,
    ) -> Result<CanonicalFix, DropReason> {
        if !self.settings.vessel_class.matches(row) {
            return Err(DropReason::VesselClass);
        }

        let observed_at = self.observed_at(row, fetched_at)?;
        let (lat, lon) = coordinates(row)?;

        if self.settings.prefilter_enabled && !prefilter.admits(lon, lat) {
            return Err(DropReason::OutsideRegions);
        }

        let source = classify_source(row);
        if source == FixSource::Satellite && !self.settings.keep_satellite {
            return Err(DropReason::Satellite);
        }

        let kinematics = self.kinematics(row)?;

        let vessel_uid = self.resolver.resolve(row).into_string();
        if vessel_uid.is_empty() {
            return Err(DropReason::Identity);
        }

        Ok(CanonicalFix {
            observed_at,
            source,
            vessel_uid,
            lat,
            lon,
            sog: kinematics.sog,
            cog: kinematics.cog,
            heading: kinematics.heading,
            elapsed_minutes: int_field(row, "ELAPSED"),
            destination: row.text("DESTINATION"),
            flag: row.text("FLAG"),
            shipname: row.text("SHIPNAME"),
            length_m: finite_field(row, "LENGTH"),
            width_m: finite_field(row, "WIDTH"),
            dwt: int_field(row, "DWT"),
            shiptype: int_field(row, "SHIPTYPE"),
            ship_id: row.text(SHIP_ID_KEY),
            rot: finite_field(row, "ROT"),
        })
    }

    /// Absent or unparseable ages fall back to the fetch time; ages outside
    /// `[0, max]` mark the row stale.
    fn observed_at(
        &self,
        row: &RawRow,
        fetched_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DropReason> {
        let Some(age_minutes) = row.strict_int("ELAPSED") else {
            return Ok(fetched_at);
        };
        if age_minutes < 0 || age_minutes > self.settings.max_observation_age_minutes {
            return Err(DropReason::Stale);
        }
        Duration::try_minutes(age_minutes)
            .and_then(|age| fetched_at.checked_sub_signed(age))
            .ok_or(DropReason::Stale)
    }

    fn kinematics(&self, row: &RawRow) -> Result<Kinematics, DropReason> {
        let sog = finite_field(row, "SPEED").map(|raw| raw / SPEED_UNITS_PER_KNOT);
        if let Some(knots) = sog {
            if knots < 0.0 || knots > self.settings.max_sog_knots {
                return Err(DropReason::Kinematics);
            }
        }

        Ok(Kinematics {
            sog,
            cog: finite_field(row, "COURSE"),
            heading: int_field(row, "HEADING"),
            rot: finite_field(row, "ROT"),
        })
    }
}

fn coordinates(row: &RawRow) -> Result<(f64, f64), DropReason> {
    let lat = finite_field(row, "LAT").ok_or(DropReason::Coordinates)?;
    let lon = finite_field(row, "LON").ok_or(DropReason::Coordinates)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(DropReason::Coordinates);
    }
    Ok((lat, lon))
}

/// Satellite-relayed rows carry a placeholder name or an opaque, non-numeric
/// provider id (a missing id counts as opaque).
pub fn classify_source(row: &RawRow) -> FixSource {
    let placeholder_name = row
        .text("SHIPNAME")
        .is_some_and(|name| name.eq_ignore_ascii_case(SATELLITE_PLACEHOLDER_NAME));
    let numeric_id = row
        .text(SHIP_ID_KEY)
        .is_some_and(|ship_id| is_ascii_digits(&ship_id));

    if placeholder_name || !numeric_id {
        FixSource::Satellite
    } else {
        FixSource::Terrestrial
    }
}

fn finite_field(row: &RawRow, key: &str) -> Option<f64> {
    row.float(key).filter(|value| value.is_finite())
}

fn int_field(row: &RawRow, key: &str) -> Option<i32> {
    row.lenient_int(key)
        .and_then(|value| i32::try_from(value).ok())
}
