//! Deterministic vessel identity derivation.
//!
//! Identities are pure functions of row content: the same field values always
//! produce the same string, within a run and across restarts. Downstream
//! deduplication and track continuity key on this value.

use super::row::RawRow;
use sha2::{Digest, Sha256};

pub(crate) const MMSI_KEYS: [&str; 2] = ["MMSI", "mmsi"];
pub(crate) const IMO_KEYS: [&str; 2] = ["IMO", "imo"];
pub(crate) const SHIP_ID_KEY: &str = "SHIP_ID";
pub(crate) const SATELLITE_PLACEHOLDER_NAME: &str = "[SAT-AIS]";

const HASH_PREFIX_LEN: usize = 16;
const SURROGATE_DELIMITER: &str = "||";
const BLANK_NAMES: [&str; 2] = [SATELLITE_PLACEHOLDER_NAME, "UNKNOWN"];
const BLANK_MARKERS: [&str; 3] = ["nan", "none", "null"];

/// Which rung of the priority chain produced an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    RegistryA,
    RegistryB,
    ProviderNumeric,
    ProviderOpaque,
    Surrogate,
}

impl IdentityKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IdentityKind::RegistryA => "a",
            IdentityKind::RegistryB => "b",
            IdentityKind::ProviderNumeric => "provider-id",
            IdentityKind::ProviderOpaque => "opaque",
            IdentityKind::Surrogate => "h",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselIdentity {
    kind: IdentityKind,
    uid: String,
}

impl VesselIdentity {
    fn new(kind: IdentityKind, value: impl std::fmt::Display) -> Self {
        Self {
            kind,
            uid: format!("{}:{}", kind.prefix(), value),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.uid
    }

    pub fn into_string(self) -> String {
        self.uid
    }
}

/// Priority chain, first match wins:
/// registry id A (MMSI) > registry id B (IMO) > numeric provider id >
/// opaque provider id > content hash of `(name, flag, length, width, type)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct VesselIdentityResolver;

impl VesselIdentityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, row: &RawRow) -> VesselIdentity {
        if let Some(mmsi) = registry_id(row, &MMSI_KEYS) {
            return VesselIdentity::new(IdentityKind::RegistryA, mmsi);
        }
        if let Some(imo) = registry_id(row, &IMO_KEYS) {
            return VesselIdentity::new(IdentityKind::RegistryB, imo);
        }

        if let Some(ship_id) = row.text(SHIP_ID_KEY) {
            let kind = if is_ascii_digits(&ship_id) {
                IdentityKind::ProviderNumeric
            } else {
                IdentityKind::ProviderOpaque
            };
            return VesselIdentity::new(kind, ship_id);
        }

        VesselIdentity::new(IdentityKind::Surrogate, surrogate_hash(row))
    }
}

pub(crate) fn is_ascii_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

/// Blank keys are skipped in favour of the next spelling. A zero identifier
/// is treated as absent; the provider emits it for unset ids.
fn registry_id(row: &RawRow, keys: &[&str]) -> Option<i64> {
    row.first_filled(keys)
        .and_then(|key| row.identifier(key))
        .filter(|id| *id != 0)
}

fn surrogate_hash(row: &RawRow) -> String {
    let mut name = normalize_component(row, "SHIPNAME");
    if BLANK_NAMES.contains(&name.as_str()) {
        name.clear();
    }
    let type_key = row.first_filled(&["SHIPTYPE", "TYPE_NAME"]).unwrap_or("SHIPTYPE");
    let parts = [
        name,
        normalize_component(row, "FLAG"),
        normalize_component(row, "LENGTH"),
        normalize_component(row, "WIDTH"),
        normalize_component(row, type_key),
    ];

    let digest = Sha256::digest(parts.join(SURROGATE_DELIMITER).as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(HASH_PREFIX_LEN);
    encoded
}

fn normalize_component(row: &RawRow, key: &str) -> String {
    match row.text(key) {
        Some(text) if BLANK_MARKERS.contains(&text.to_ascii_lowercase().as_str()) => String::new(),
        Some(text) => text.to_uppercase(),
        None => String::new(),
    }
}
