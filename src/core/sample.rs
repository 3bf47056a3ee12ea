//! Sample type and payload decoding.
//!
//! A sample is one fixed-length vector of channel readings taken at a single
//! instant. Samples are transient: they are decoded from a message payload,
//! copied into buffer slots, and never retained elsewhere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One reading per channel at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Channel readings, always exactly the configured channel count
    pub channels: Vec<f64>,
    /// Sequence number assigned by the source, if any
    pub sample_number: Option<i64>,
    /// Source timestamp, if any
    pub timestamp: Option<f64>,
}

/// Wire shape of a sample payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SamplePayload {
    channel_data: Option<Vec<f64>>,
    #[serde(default)]
    sample_number: Option<i64>,
    #[serde(default)]
    time_stamp: Option<f64>,
}

impl Sample {
    /// Create a sample from raw channel readings.
    pub fn new(channels: Vec<f64>) -> Self {
        Self {
            channels,
            sample_number: None,
            timestamp: None,
        }
    }

    /// Decode a sample from the `message` field of a sample message.
    ///
    /// Fails unless the payload is an object carrying `channelData` with
    /// exactly `channel_count` numbers.
    pub fn from_payload(payload: Value, channel_count: usize) -> Result<Self, SampleError> {
        if !payload.is_object() {
            return Err(SampleError::NotAnObject);
        }

        let payload: SamplePayload =
            serde_json::from_value(payload).map_err(|e| SampleError::Invalid(e.to_string()))?;

        let channels = payload.channel_data.ok_or(SampleError::MissingChannelData)?;
        if channels.len() != channel_count {
            return Err(SampleError::ChannelCount {
                expected: channel_count,
                actual: channels.len(),
            });
        }

        Ok(Self {
            channels,
            sample_number: payload.sample_number,
            timestamp: payload.time_stamp,
        })
    }

    /// Number of channels in this sample.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Reasons a sample payload is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    NotAnObject,
    MissingChannelData,
    ChannelCount { expected: usize, actual: usize },
    Invalid(String),
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::NotAnObject => write!(f, "sample payload is not an object"),
            SampleError::MissingChannelData => write!(f, "sample payload has no channelData"),
            SampleError::ChannelCount { expected, actual } => {
                write!(f, "expected {expected} channels, got {actual}")
            }
            SampleError::Invalid(e) => write!(f, "invalid sample payload: {e}"),
        }
    }
}

impl std::error::Error for SampleError {}
