//! Chapter metadata structures and frame rate parsing

use crate::{ClipCoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Technical parameters of a clip's first media stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    /// Coded width in pixels
    pub width: u32,

    /// Coded height in pixels
    pub height: u32,

    /// Codec name as reported by the prober (e.g. "h264")
    pub codec: String,

    /// Average frame rate derived from an "N/D" ratio
    pub frame_rate: f64,
}

impl Resolution {
    pub fn new(width: u32, height: u32, codec: impl Into<String>, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            codec: codec.into(),
            frame_rate,
        }
    }

    /// Whether two streams can be joined by the concat demuxer without re-encoding.
    /// Frame rate does not take part in the comparison.
    pub fn is_concat_compatible(&self, other: &Resolution) -> bool {
        self.width == other.width && self.height == other.height && self.codec == other.codec
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {:06.2}", self.width, self.height, self.frame_rate)
    }
}

/// Raw metadata returned by a media prober for a single clip file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeRecord {
    /// Container duration
    pub duration: Duration,

    /// Recording start time
    pub created_at: DateTime<Utc>,

    pub width: u32,
    pub height: u32,
    pub codec: String,

    /// Frame rate ratio string such as "60000/1001"
    pub frame_rate: String,
}

/// One raw clip file plus its extracted technical metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// File name, unique within its directory
    pub file_name: String,

    /// Recording start time
    pub created_at: DateTime<Utc>,

    /// Clip duration
    pub duration: Duration,

    /// First stream resolution, codec and frame rate
    pub resolution: Resolution,
}

impl Chapter {
    pub fn new(
        file_name: impl Into<String>,
        created_at: DateTime<Utc>,
        duration: Duration,
        resolution: Resolution,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            created_at,
            duration,
            resolution,
        }
    }

    /// Build a chapter from probe output, rejecting malformed frame rates
    pub fn from_probe(file_name: impl Into<String>, record: ProbeRecord) -> Result<Self> {
        let frame_rate = parse_frame_rate(&record.frame_rate)?;
        Ok(Self {
            file_name: file_name.into(),
            created_at: record.created_at,
            duration: record.duration,
            resolution: Resolution::new(record.width, record.height, record.codec, frame_rate),
        })
    }
}

/// Parses a ratio like "60/1" or "15360/256" into frames per second.
///
/// The input must contain exactly two integer fields. A zero denominator is
/// how ffprobe reports an unknown rate ("0/0") and yields 0.0.
pub fn parse_frame_rate(ratio: &str) -> Result<f64> {
    let parts: Vec<&str> = ratio.split('/').collect();
    if parts.len() != 2 {
        return Err(ClipCoreError::InvalidFrameRate(ratio.to_string()));
    }

    let numerator: i64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| ClipCoreError::InvalidFrameRate(ratio.to_string()))?;
    let denominator: i64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| ClipCoreError::InvalidFrameRate(ratio.to_string()))?;

    if denominator == 0 {
        return Ok(0.0);
    }

    Ok(numerator as f64 / denominator as f64)
}
