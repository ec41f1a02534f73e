use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generation seed.
///
/// Serialized as a decimal string: JSON numbers go through f64 in too
/// many clients, which silently drops the high bits of a u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed(pub u64);

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct SeedVisitor;

impl<'de> Visitor<'de> for SeedVisitor {
    type Value = Seed;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a u64 seed as a string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Seed, E> {
        v.parse::<u64>().map(Seed).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Seed, E> {
        Ok(Seed(v))
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SeedVisitor)
    }
}

/// Body of `POST /generate`, before validation.
///
/// Defaults mirror the server's historical behavior; `sampler` stays a
/// plain string here so the boundary can reject unknown keys with the
/// full list instead of a generic deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Required; an absent or empty prompt is rejected at validation,
    /// not at deserialization, so the error names the field.
    #[serde(default)]
    pub prompt: String,
    /// Required; same validation treatment as `prompt`.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub neg: String,
    #[serde(default = "default_dim")]
    pub width: u32,
    #[serde(default = "default_dim")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_guidance")]
    pub guidance: f32,
    #[serde(default = "default_sampler")]
    pub sampler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    /// Base64-encoded PNG source image; presence selects img2img mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default = "default_clip")]
    pub clip: u32,
    /// Emit an intermediate record every N steps; absent = buffered response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<u32>,
}

fn default_dim() -> u32 {
    512
}

fn default_steps() -> u32 {
    25
}

fn default_guidance() -> f32 {
    7.0
}

fn default_sampler() -> String {
    "dpm++ 2m".to_string()
}

fn default_strength() -> f32 {
    0.8
}

fn default_clip() -> u32 {
    1
}
