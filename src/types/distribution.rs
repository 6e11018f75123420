//! Level distribution: integer percentages over A1..C1
//!
//! Serialized as a map `{"A1": 20, "A2": 20, ...}`. Missing keys read as 0,
//! negative values clamp to 0 and fractional values round to the nearest
//! integer, so evidence from a remote model can be ingested as-is.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::types::{Level, SelfReportedLevel};

/// Percentages per CEFR level, canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelDistribution([u32; 5]);

impl Default for LevelDistribution {
    fn default() -> Self {
        Self::uniform()
    }
}

impl LevelDistribution {
    /// Build from raw values in canonical order
    pub const fn new(values: [u32; 5]) -> Self {
        Self(values)
    }

    /// 20 each
    pub const fn uniform() -> Self {
        Self([20, 20, 20, 20, 20])
    }

    /// Seed distribution for a self-reported level
    pub fn seed(level: SelfReportedLevel) -> Self {
        match level {
            SelfReportedLevel::Low => Self([40, 30, 20, 5, 5]),
            SelfReportedLevel::Medium => Self([10, 20, 40, 20, 10]),
            SelfReportedLevel::High => Self([5, 10, 25, 35, 25]),
            SelfReportedLevel::Unspecified => Self::uniform(),
        }
    }

    pub fn get(&self, level: Level) -> u32 {
        self.0[level.index()]
    }

    pub fn set(&mut self, level: Level, value: u32) {
        self.0[level.index()] = value;
    }

    pub fn values(&self) -> [u32; 5] {
        self.0
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Sums to exactly 100
    pub fn is_valid(&self) -> bool {
        self.total() == 100
    }

    /// Fractions summing to 1; an all-zero distribution reads as uniform
    pub fn fractions(&self) -> [f64; 5] {
        let total = self.total();
        if total == 0 {
            return [0.2; 5];
        }
        let mut out = [0.0; 5];
        for (o, v) in out.iter_mut().zip(self.0.iter()) {
            *o = *v as f64 / total as f64;
        }
        out
    }

    /// Strictly greatest category; ties go to the first in canonical order
    pub fn dominant(&self) -> Level {
        let mut best = Level::A1;
        let mut best_value = 0;
        for level in Level::ALL {
            if self.get(level) > best_value {
                best = level;
                best_value = self.get(level);
            }
        }
        best
    }

    /// Percentage held by the dominant level
    pub fn confidence(&self) -> u32 {
        self.get(self.dominant())
    }

    /// Combined A1 + A2 mass
    pub fn low_mass(&self) -> u32 {
        self.get(Level::A1) + self.get(Level::A2)
    }

    /// Compact `A1=20 A2=20 ...` form for terminal output
    pub fn to_compact_string(&self) -> String {
        Level::ALL
            .iter()
            .map(|l| format!("{}={}", l, self.get(*l)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Serialize for LevelDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        for level in Level::ALL {
            map.serialize_entry(level.as_str(), &self.get(level))?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawDistribution {
    #[serde(rename = "A1", default)]
    a1: f64,
    #[serde(rename = "A2", default)]
    a2: f64,
    #[serde(rename = "B1", default)]
    b1: f64,
    #[serde(rename = "B2", default)]
    b2: f64,
    #[serde(rename = "C1", default)]
    c1: f64,
}

impl<'de> Deserialize<'de> for LevelDistribution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDistribution::deserialize(deserializer)?;
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v.round() as u32 } else { 0 };
        Ok(Self([
            clean(raw.a1),
            clean(raw.a2),
            clean(raw.b1),
            clean(raw.b2),
            clean(raw.c1),
        ]))
    }
}
