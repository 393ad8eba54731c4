//! Blocking HTTP client for the sensor nodes.
//!
//! - One `ureq` agent shared by every fetch, with a global per-call timeout.
//! - No retries: the collector's polling interval is the retry mechanism.
//! - Entries that do not match `DeviceReading` are skipped individually; only a
//!   body that is not a JSON array fails the whole fetch.

use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;

use crate::models::device::DeviceReading;

#[derive(Debug)]
pub enum DeviceClientError {
    /// Host unreachable, refused, or the connection dropped.
    Connect(String),
    Timeout(String),
    Http { status: u16 },
    Payload(String),
}

impl DeviceClientError {
    /// Failures of the network path rather than of the node's answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, DeviceClientError::Connect(_) | DeviceClientError::Timeout(_))
    }
}

impl core::fmt::Display for DeviceClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceClientError::Connect(s) => write!(f, "connection failed: {}", s),
            DeviceClientError::Timeout(s) => write!(f, "read timeout: {}", s),
            DeviceClientError::Http { status } => write!(f, "http {}", status),
            DeviceClientError::Payload(s) => write!(f, "malformed payload: {}", s),
        }
    }
}

impl std::error::Error for DeviceClientError {}

impl From<ureq::Error> for DeviceClientError {
    fn from(value: ureq::Error) -> Self {
        match value {
            ureq::Error::StatusCode(status) => DeviceClientError::Http { status },
            ureq::Error::Timeout(t) => DeviceClientError::Timeout(format!("{:?}", t)),
            ureq::Error::Io(e)
                if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) =>
            {
                DeviceClientError::Timeout(e.to_string())
            }
            ureq::Error::Io(e) => DeviceClientError::Connect(e.to_string()),
            other => DeviceClientError::Connect(other.to_string()),
        }
    }
}

pub struct DeviceClient {
    agent: ureq::Agent,
}

impl DeviceClient {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        DeviceClient { agent: config.into() }
    }

    fn url(address: &str) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}/", address.trim_end_matches('/'))
        }
    }

    /// Fetch the current reading batch from the node at `address` (`host[:port]`).
    pub fn fetch(&self, address: &str) -> Result<Vec<DeviceReading>, DeviceClientError> {
        let url = Self::url(address);
        let response = self.agent.get(&url).header("Accept", "application/json").call()?;
        let body = read_body(response)?;
        debug!("Device {} answered with {} byte(s)", address, body.len());
        parse_batch(address, &body)
    }
}

fn read_body(mut response: http::Response<ureq::Body>) -> Result<String, DeviceClientError> {
    response.body_mut().read_to_string().map_err(DeviceClientError::from)
}

/// Decode a reading batch, dropping (and logging) entries with the wrong shape.
pub fn parse_batch(address: &str, body: &str) -> Result<Vec<DeviceReading>, DeviceClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    let entries: Vec<Value> =
        serde_path_to_error::deserialize(de).map_err(|e| DeviceClientError::Payload(e.to_string()))?;

    let mut readings = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_path_to_error::deserialize::<_, DeviceReading>(entry) {
            Ok(r) => readings.push(r),
            Err(e) => warn!("Device {}: skipping malformed entry {}: {}", address, index, e),
        }
    }
    Ok(readings)
}
