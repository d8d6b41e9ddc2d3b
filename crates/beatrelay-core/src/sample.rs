//! Audio feature samples as produced by the analysis daemon.
//!
//! One sample covers one analysis window. The relay never smooths, clamps or
//! validates values: a frame either decodes into all six fields or is dropped.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Audio features for a single analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSample {
    /// Low band intensity (0-255)
    pub bass: f64,
    /// Mid band intensity (0-255)
    pub mids: f64,
    /// High band intensity (0-255)
    pub treble: f64,
    /// Beat detected in this window
    pub beat: bool,
    /// Aggregate signal energy, non-negative
    pub total_energy: f64,
    /// Producer capture time in epoch milliseconds
    pub timestamp: f64,
}

impl AudioSample {
    /// Decode a sample from one upstream text frame.
    ///
    /// Unknown keys are ignored; missing keys or mistyped values are errors.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the sample into the JSON text sent to subscribers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{"bass":120,"mids":64.5,"treble":3,"beat":true,"total_energy":1843.25,"timestamp":1718000000123}"#;

    #[test]
    fn test_decode_valid_frame() {
        let sample = AudioSample::decode(FRAME).unwrap();
        assert_eq!(sample.bass, 120.0);
        assert_eq!(sample.mids, 64.5);
        assert_eq!(sample.treble, 3.0);
        assert!(sample.beat);
        assert_eq!(sample.total_energy, 1843.25);
        assert_eq!(sample.timestamp, 1_718_000_000_123.0);
    }

    #[test]
    fn test_decode_ignores_extra_keys() {
        let text = r#"{"bass":1,"mids":2,"treble":3,"beat":false,"total_energy":4,"timestamp":5,"bpm":128}"#;
        let sample = AudioSample::decode(text).unwrap();
        assert_eq!(sample.total_energy, 4.0);
    }

    #[test]
    fn test_decode_passes_out_of_range_values_through() {
        let text = r#"{"bass":300,"mids":-1,"treble":0,"beat":false,"total_energy":0,"timestamp":0}"#;
        let sample = AudioSample::decode(text).unwrap();
        assert_eq!(sample.bass, 300.0);
        assert_eq!(sample.mids, -1.0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(AudioSample::decode("not json").is_err());
        assert!(AudioSample::decode(r#"{"bass":"#).is_err());
        assert!(AudioSample::decode("").is_err());
        assert!(AudioSample::decode("[1,2,3]").is_err());
    }

    #[test]
    fn test_decode_rejects_missing_or_mistyped_fields() {
        let missing = r#"{"bass":1,"mids":2,"treble":3,"beat":false,"timestamp":5}"#;
        assert!(AudioSample::decode(missing).is_err());

        let mistyped = r#"{"bass":1,"mids":2,"treble":3,"beat":"yes","total_energy":4,"timestamp":5}"#;
        assert!(AudioSample::decode(mistyped).is_err());
    }

    #[test]
    fn test_to_json_uses_wire_keys() {
        let json = AudioSample::decode(FRAME).unwrap().to_json().unwrap();
        for key in ["bass", "mids", "treble", "beat", "total_energy", "timestamp"] {
            assert!(json.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
    }
}
