use crate::error::{Result, TvError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device description served at `GET /api/v2/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub version: Option<String>,
    pub device: DeviceDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    #[serde(default, rename = "modelName")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "PowerState")]
    pub power_state: Option<String>,
    #[serde(default, rename = "FrameTVSupport")]
    pub frame_tv_support: Option<String>,
    #[serde(default, rename = "TokenAuthSupport")]
    pub token_auth_support: Option<String>,
    #[serde(default, rename = "wifiMac")]
    pub wifi_mac: Option<String>,
}

impl DeviceInfo {
    /// Whether the TV reports itself powered on
    ///
    /// Older models omit `PowerState`; answering at all means on.
    pub fn is_on(&self) -> bool {
        self.device
            .power_state
            .as_deref()
            .map_or(true, |state| state.eq_ignore_ascii_case("on"))
    }

    /// Whether the TV advertises Frame art support
    pub fn frame_tv(&self) -> bool {
        self.device
            .frame_tv_support
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// HTTP side of the TV's API on the plaintext port
#[derive(Clone)]
pub(crate) struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub(crate) fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}/api/v2", host, port),
        })
    }

    pub(crate) async fn device_info(&self) -> Result<DeviceInfo> {
        let url = format!("{}/", self.base_url);
        tracing::debug!("Fetching device info from {}", url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        response
            .json::<DeviceInfo>()
            .await
            .map_err(|e| TvError::InvalidResponse(format!("device info: {}", e)))
    }

    /// Launch an application through the REST endpoint
    pub(crate) async fn run_app(&self, app_id: &str) -> Result<()> {
        let url = format!("{}/applications/{}", self.base_url, app_id);
        tracing::debug!("Launching {} via {}", app_id, url);
        self.client.post(&url).send().await?.error_for_status()?;
        Ok(())
    }

    /// Close an application with `DELETE /api/v2/applications/{id}`
    pub(crate) async fn close_app(&self, app_id: &str) -> Result<()> {
        let url = format!("{}/applications/{}", self.base_url, app_id);
        tracing::debug!("Closing {} via {}", app_id, url);
        self.client.delete(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
