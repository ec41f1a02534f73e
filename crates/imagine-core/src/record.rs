use serde::{Deserialize, Serialize};

/// Terminal vs. intermediate marker on a wire record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Intermediate,
    Final,
}

/// One generation output on the wire, streamed as a newline-terminated
/// JSON line or returned as a single buffered body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRecord {
    /// Base64-encoded PNG bytes
    pub img: String,
    /// Seed as a decimal string
    pub seed: String,
    pub status: RecordStatus,
}

impl ImageRecord {
    pub fn intermediate(img: String, seed: u64) -> Self {
        Self {
            img,
            seed: seed.to_string(),
            status: RecordStatus::Intermediate,
        }
    }

    pub fn finished(img: String, seed: u64) -> Self {
        Self {
            img,
            seed: seed.to_string(),
            status: RecordStatus::Final,
        }
    }
}

/// In-band error record, also used as the body of 400/500 responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Anything a client can receive on the generate stream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StreamRecord {
    Image(ImageRecord),
    Error(ErrorRecord),
}
