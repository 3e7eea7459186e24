//! Control-channel messages.
//!
//! The channel carries plain text. A message starting with `#freq` followed
//! by a JSON object is a cadence update; anything else is a program
//! submission (which may itself be a directive token). Telemetry goes the
//! other way with the same prefix.

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Prefix of cadence requests and telemetry.
pub const FREQUENCY_PREFIX: &str = "#freq";

/// A frequency as sent by the browser: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrequencyValue {
    Number(f64),
    Text(String),
}

impl FrequencyValue {
    /// The value in Hz.
    pub fn hz(&self) -> ServerResult<f64> {
        match self {
            Self::Number(hz) => Ok(*hz),
            Self::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| ServerError::InvalidFrequency(text.clone())),
        }
    }
}

/// Requested frequencies for the executor ("brain") and renderer ("gui").
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CadenceUpdate {
    pub brain: FrequencyValue,
    pub gui: FrequencyValue,
}

impl CadenceUpdate {
    /// Build an update from numeric frequencies.
    pub fn hz(brain: f64, gui: f64) -> Self {
        Self {
            brain: FrequencyValue::Number(brain),
            gui: FrequencyValue::Number(gui),
        }
    }
}

/// An inbound control-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `#freq{...}`: change target cadences.
    Cadence(CadenceUpdate),
    /// Anything else: a program or directive.
    Submission(String),
}

impl ClientMessage {
    /// Classify a text frame.
    ///
    /// Fails only for a `#freq` message whose body is not a valid update.
    pub fn parse(text: &str) -> ServerResult<Self> {
        match text.strip_prefix(FREQUENCY_PREFIX) {
            Some(body) => Ok(Self::Cadence(serde_json::from_str(body)?)),
            None => Ok(Self::Submission(text.to_string())),
        }
    }
}

/// Realized frequencies reported to the client, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub brain: f64,
    pub gui: f64,
}

impl Telemetry {
    /// Telemetry from realized cycle times in milliseconds (0 = unknown).
    pub fn from_cycles(brain_cycle_ms: f64, gui_cycle_ms: f64) -> Self {
        Self {
            brain: pacer_core::frequency_hz(brain_cycle_ms),
            gui: pacer_core::frequency_hz(gui_cycle_ms),
        }
    }

    /// Wire form: `#freq{"brain":..,"gui":..}`.
    pub fn encode(&self) -> String {
        format!(
            "{}{}",
            FREQUENCY_PREFIX,
            serde_json::json!({ "brain": self.brain, "gui": self.gui })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cadence_numbers_and_strings() {
        let msg = ClientMessage::parse(r##"#freq{"brain": 12.5, "gui": "10"}"##).unwrap();
        let ClientMessage::Cadence(update) = msg else {
            panic!("expected cadence update");
        };
        assert_eq!(update.brain.hz().unwrap(), 12.5);
        assert_eq!(update.gui.hz().unwrap(), 10.0);
    }

    #[test]
    fn test_anything_else_is_a_submission() {
        for text in ["#paus", "#code1#debugprint(1)", "", "freq"] {
            assert_eq!(
                ClientMessage::parse(text).unwrap(),
                ClientMessage::Submission(text.to_string())
            );
        }
    }

    #[test]
    fn test_malformed_cadence_is_an_error() {
        assert!(ClientMessage::parse("#freq{not json").is_err());
        assert!(ClientMessage::parse(r##"#freq{"brain": 1}"##).is_err());
    }

    #[test]
    fn test_non_numeric_string_frequency() {
        let value = FrequencyValue::Text("fast".into());
        assert!(matches!(value.hz(), Err(ServerError::InvalidFrequency(_))));
    }

    #[test]
    fn test_telemetry_rounding_and_unknown() {
        let telemetry = Telemetry::from_cycles(80.0, 0.0);
        assert_eq!(telemetry.brain, 12.5);
        assert_eq!(telemetry.gui, 0.0);

        assert_eq!(Telemetry::from_cycles(30.0, 7.0).brain, 33.3);
    }

    #[test]
    fn test_telemetry_encoding() {
        let text = Telemetry { brain: 12.5, gui: 0.0 }.encode();
        assert_eq!(text, r##"#freq{"brain":12.5,"gui":0.0}"##);
    }
}
