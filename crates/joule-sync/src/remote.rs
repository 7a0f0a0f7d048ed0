//! # Remote System of Record
//!
//! HTTP client for the remote telemetry API. All remote traffic in the
//! engine goes through the [`RemoteApi`] trait so that reconciliation, the
//! delivery pipeline, and the connectivity monitor can be exercised against
//! scripted remotes in tests.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  api/health            reachability probe (any 2xx = reachable)   │
//! │  GET  api/meters            meter catalog (remote shape)               │
//! │  GET  api/registers         register catalog                            │
//! │  GET  api/device-registers  meter-to-register mappings by natural key  │
//! │  POST api/readings          reading upload (idempotent by reading id)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote entities carry natural keys only (meter numbers, register codes);
//! local UUIDs never cross this boundary except as reading identifiers,
//! which the remote uses for upload deduplication.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use joule_core::Reading;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Wire Types
// =============================================================================

/// A meter as the remote system of record describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeter {
    /// Natural key, as printed on the device.
    pub meter_number: String,

    /// Display name.
    pub name: String,

    /// Optional physical location.
    #[serde(default)]
    pub location: Option<String>,

    /// Whether the meter is active.
    pub is_active: bool,
}

/// A register definition as the remote describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRegister {
    /// Natural key (e.g. OBIS code).
    pub register_code: String,

    /// Display name.
    pub name: String,

    /// Identifier of the measured quantity as carried on readings.
    pub data_point: String,

    /// Unit symbol.
    pub unit: String,

    /// Whether the register is active.
    pub is_active: bool,
}

/// A meter-to-register mapping, identified by natural keys on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDeviceRegister {
    /// Meter side of the mapping.
    pub meter_number: String,

    /// Register side of the mapping.
    pub register_code: String,

    /// Multiplier applied to raw device values.
    pub scale_factor: f64,

    /// Whether the mapping is active.
    pub is_active: bool,
}

/// One reading in an upload payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReading {
    /// Reading UUID. The remote deduplicates redelivered readings on it.
    pub reading_id: String,

    /// Meter the reading belongs to.
    pub meter_id: String,

    /// Identifier of the measured quantity.
    pub data_point: String,

    /// Measured value, already scaled.
    pub value: f64,

    /// Unit symbol.
    pub unit: String,

    /// Collection instant.
    pub timestamp: DateTime<Utc>,
}

impl From<&Reading> for UploadReading {
    fn from(reading: &Reading) -> Self {
        UploadReading {
            reading_id: reading.id.clone(),
            meter_id: reading.meter_id.clone(),
            data_point: reading.data_point.clone(),
            value: reading.value,
            unit: reading.unit.clone(),
            timestamp: reading.timestamp,
        }
    }
}

/// Acknowledgement for a reading upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAck {
    /// Readings newly accepted by this upload. Redelivered readings the
    /// remote already holds are absorbed and not counted.
    #[serde(default)]
    pub accepted: usize,
}

// =============================================================================
// Remote API Trait
// =============================================================================

/// Remote system-of-record operations.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Lightweight reachability probe. Success means the remote answered.
    async fn probe(&self) -> SyncResult<()>;

    /// Fetches the full meter catalog.
    async fn fetch_meters(&self) -> SyncResult<Vec<RemoteMeter>>;

    /// Fetches the full register catalog.
    async fn fetch_registers(&self) -> SyncResult<Vec<RemoteRegister>>;

    /// Fetches all meter-to-register mappings.
    async fn fetch_device_registers(&self) -> SyncResult<Vec<RemoteDeviceRegister>>;

    /// Uploads one batch of readings. Idempotent per reading id.
    async fn upload_readings(&self, readings: &[UploadReading]) -> SyncResult<UploadAck>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`RemoteApi`] over plain HTTP with JSON bodies.
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpRemote {
    /// Builds the client from remote settings.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        // Url::join treats a base without a trailing slash as a file and
        // would drop its last path segment.
        let mut base = settings.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()?;

        Ok(HttpRemote {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");

        let response = self.with_auth(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn probe(&self) -> SyncResult<()> {
        let url = self.endpoint("api/health")?;
        let response = self.with_auth(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn fetch_meters(&self) -> SyncResult<Vec<RemoteMeter>> {
        self.get_json("api/meters").await
    }

    async fn fetch_registers(&self) -> SyncResult<Vec<RemoteRegister>> {
        self.get_json("api/registers").await
    }

    async fn fetch_device_registers(&self) -> SyncResult<Vec<RemoteDeviceRegister>> {
        self.get_json("api/device-registers").await
    }

    async fn upload_readings(&self, readings: &[UploadReading]) -> SyncResult<UploadAck> {
        let url = self.endpoint("api/readings")?;
        debug!(%url, count = readings.len(), "POST readings");

        let response = self
            .with_auth(self.client.post(url))
            .json(readings)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}
