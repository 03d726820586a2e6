//! Enumerated settings: response correlation, topic capture, and log format.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How inbound responses are matched against requests this process sent.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CorrelationMode {
    /// Every well-formed response reaches its handler.
    #[default]
    Unchecked,
    /// Only responses whose id matches an outstanding request are delivered.
    Strict,
}

/// Capture reported to handlers when the matching pattern has no `+` level.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CaptureMode {
    /// The entire concrete topic.
    #[default]
    WholeTopic,
    /// An empty string.
    Empty,
}

/// Shape of the log lines written to stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line text for terminals.
    Compact,
}

/// Error returned when a mode name is not recognised.
pub type LogFormatParseError = strum::ParseError;
