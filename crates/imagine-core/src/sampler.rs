use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Closed set of scheduler keys accepted by the server.
///
/// The wire format carries the lowercase key (`"dpm++ 2m"` etc.);
/// anything outside this set is rejected at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    Ddim,
    Euler,
    EulerAncestral,
    Heun,
    Lms,
    DpmPP2M,
    DpmPP2S,
    DpmPPSde,
    Dpm2,
    Dpm2Ancestral,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid sampler '{name}'. Available samplers: {available}",
    name = .0,
    available = Sampler::keys().join(", "))]
pub struct UnknownSampler(pub String);

impl Sampler {
    /// Wire key for this sampler
    pub fn key(&self) -> &'static str {
        match self {
            Self::Ddim => "ddim",
            Self::Euler => "euler",
            Self::EulerAncestral => "euler a",
            Self::Heun => "heun",
            Self::Lms => "lms",
            Self::DpmPP2M => "dpm++ 2m",
            Self::DpmPP2S => "dpm++ 2s",
            Self::DpmPPSde => "dpm++ sde",
            Self::Dpm2 => "dpm2",
            Self::Dpm2Ancestral => "dpm2 a",
        }
    }

    /// All recognized samplers
    pub fn all() -> [Sampler; 10] {
        [
            Self::Ddim,
            Self::Euler,
            Self::EulerAncestral,
            Self::Heun,
            Self::Lms,
            Self::DpmPP2M,
            Self::DpmPP2S,
            Self::DpmPPSde,
            Self::Dpm2,
            Self::Dpm2Ancestral,
        ]
    }

    pub fn keys() -> Vec<&'static str> {
        Self::all().iter().map(|s| s.key()).collect()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::DpmPP2M
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Sampler {
    type Err = UnknownSampler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|v| v.key() == s)
            .ok_or_else(|| UnknownSampler(s.to_string()))
    }
}

impl Serialize for Sampler {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Sampler {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
