use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::{DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT};

/// Address of the publish/subscribe broker.
///
/// Serialised as a URL string (`mqtt://host:port`) so the same text works in
/// configuration files, `CLOCKWIRE_BROKER` and `--broker`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct BrokerEndpoint {
    host: String,
    port: u16,
}

impl BrokerEndpoint {
    /// Builds an endpoint from a host name and TCP port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port of the broker.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "mqtt://{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerEndpoint {
    type Err = BrokerParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "mqtt" | "tcp" => {
                let host = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| BrokerParseError::MissingHost(input.to_owned()))?;
                let port = url.port().unwrap_or(DEFAULT_BROKER_PORT);
                Ok(Self::new(host, port))
            }
            other => Err(BrokerParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl TryFrom<String> for BrokerEndpoint {
    type Error = BrokerParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BrokerEndpoint> for String {
    fn from(value: BrokerEndpoint) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing a [`BrokerEndpoint`] from text.
#[derive(Debug, Error)]
pub enum BrokerParseError {
    /// Scheme was neither `mqtt` nor `tcp`.
    #[error("unsupported broker scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing broker host in '{0}'")]
    MissingHost(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
