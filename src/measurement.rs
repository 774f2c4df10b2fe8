// src/measurement.rs - Measurements keyed by the body model's field names

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{BodyMeasureError, FailureKind, MeasurementFailure, Result};

/// Photograph a measurement is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Frontal T-pose.
    Front,
    /// Standing profile.
    Side,
    /// Seated profile with the legs stretched forward.
    Pike,
    /// Profile with the hands visible edge-on.
    Tuck,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [ViewKind::Front, ViewKind::Side, ViewKind::Pike, ViewKind::Tuck];

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Front => "front",
            ViewKind::Side => "side",
            ViewKind::Pike => "pike",
            ViewKind::Tuck => "tuck",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Length,
    Width,
    Perimeter,
    Depth,
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MeasurementKind::Length => "length",
            MeasurementKind::Width => "width",
            MeasurementKind::Perimeter => "perimeter",
            MeasurementKind::Depth => "depth",
        };
        f.write_str(label)
    }
}

/// A value in real-world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub key: String,
    pub value: f64,
    pub kind: MeasurementKind,
    /// View the value was measured in; perimeters report the view of their width.
    pub view: ViewKind,
}

/// Diagnostic attached to a present value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum Flag {
    /// Above the anatomical plausibility ceiling; emitted anyway.
    OutOfRange { ceiling: f64 },
    /// Width moved to satisfy the perimeter / width bounds.
    Repaired { from: f64 },
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::OutOfRange { ceiling } => write!(f, "out of range (max {:.1})", ceiling),
            Flag::Repaired { from } => write!(f, "repaired (was {:.2})", from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MeasurementEntry {
    Present {
        measurement: Measurement,
        flags: Vec<Flag>,
    },
    Missing {
        key: String,
        kind: MeasurementKind,
        view: ViewKind,
        failure: MeasurementFailure,
    },
}

impl MeasurementEntry {
    pub fn key(&self) -> &str {
        match self {
            MeasurementEntry::Present { measurement, .. } => &measurement.key,
            MeasurementEntry::Missing { key, .. } => key,
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        match self {
            MeasurementEntry::Present { measurement, .. } => measurement.kind,
            MeasurementEntry::Missing { kind, .. } => *kind,
        }
    }

    pub fn view(&self) -> ViewKind {
        match self {
            MeasurementEntry::Present { measurement, .. } => measurement.view,
            MeasurementEntry::Missing { view, .. } => *view,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MeasurementEntry::Present { measurement, .. } => Some(measurement.value),
            MeasurementEntry::Missing { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, MeasurementEntry::Present { .. })
    }
}

/// Ordered map from schema key to measured value or the reason it is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementSet {
    entries: BTreeMap<String, MeasurementEntry>,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a computed value. Zero, negative and non-finite values are
    /// extraction failures and are recorded as missing.
    pub fn insert_value(&mut self, key: &str, value: f64, kind: MeasurementKind, view: ViewKind) {
        let entry = if value.is_finite() && value > 0.0 {
            MeasurementEntry::Present {
                measurement: Measurement {
                    key: key.to_string(),
                    value,
                    kind,
                    view,
                },
                flags: Vec::new(),
            }
        } else {
            MeasurementEntry::Missing {
                key: key.to_string(),
                kind,
                view,
                failure: MeasurementFailure::new(
                    FailureKind::NonPositiveValue,
                    format!("computed value {}", value),
                ),
            }
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn insert_missing(
        &mut self,
        key: &str,
        kind: MeasurementKind,
        view: ViewKind,
        failure: MeasurementFailure,
    ) {
        self.entries.insert(
            key.to_string(),
            MeasurementEntry::Missing {
                key: key.to_string(),
                kind,
                view,
                failure,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&MeasurementEntry> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(|e| e.value())
    }

    /// Value of `key`, or a `MissingDependency` failure naming why it is absent.
    pub fn require(&self, key: &str) -> std::result::Result<f64, MeasurementFailure> {
        match self.entries.get(key) {
            Some(MeasurementEntry::Present { measurement, .. }) => Ok(measurement.value),
            Some(MeasurementEntry::Missing { failure, .. }) => Err(MeasurementFailure::new(
                FailureKind::MissingDependency,
                format!("{} is missing ({})", key, failure),
            )),
            None => Err(MeasurementFailure::new(
                FailureKind::MissingDependency,
                format!("{} was not measured", key),
            )),
        }
    }

    /// Replace a present value, keeping its flags.
    pub fn update_value(&mut self, key: &str, value: f64) -> bool {
        match self.entries.get_mut(key) {
            Some(MeasurementEntry::Present { measurement, .. }) => {
                measurement.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn add_flag(&mut self, key: &str, flag: Flag) -> bool {
        match self.entries.get_mut(key) {
            Some(MeasurementEntry::Present { flags, .. }) => {
                flags.push(flag);
                true
            }
            _ => false,
        }
    }

    pub fn flags(&self, key: &str) -> &[Flag] {
        match self.entries.get(key) {
            Some(MeasurementEntry::Present { flags, .. }) => flags,
            _ => &[],
        }
    }

    /// Key-disjoint union. A key produced twice means two views claim the
    /// same schema key, which the schema forbids.
    pub fn merge(&mut self, other: MeasurementSet) -> Result<()> {
        if let Some(key) = other.entries.keys().find(|k| self.entries.contains_key(*k)) {
            return Err(BodyMeasureError::SchemaConflict(format!(
                "measurement {} produced twice",
                key
            )));
        }
        self.entries.extend(other.entries);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementEntry> {
        self.entries.values()
    }

    pub fn present(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.values().filter_map(|e| match e {
            MeasurementEntry::Present { measurement, .. } => Some(measurement),
            MeasurementEntry::Missing { .. } => None,
        })
    }

    pub fn missing(&self) -> impl Iterator<Item = (&str, &MeasurementFailure)> {
        self.entries.values().filter_map(|e| match e {
            MeasurementEntry::Missing { key, failure, .. } => Some((key.as_str(), failure)),
            MeasurementEntry::Present { .. } => None,
        })
    }

    pub fn flagged(&self) -> impl Iterator<Item = (&str, &[Flag])> {
        self.entries.values().filter_map(|e| match e {
            MeasurementEntry::Present { measurement, flags } if !flags.is_empty() => {
                Some((measurement.key.as_str(), flags.as_slice()))
            }
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
