//! Particle Cloud Sensor Driver
//!
//! Reads the inverter boards' own measurements through the Particle device
//! cloud. Each capability is one HTTPS call:
//!
//! `GET {base_url}/{device_id}/{capability}?access_token={token}`
//!
//! and the JSON response carries the readings as a comma-space-delimited
//! list in its `result` field. Capabilities used: `getVoltages`,
//! `getCurrents`, `getInverterCount`.

use crate::config::SensorSettings;
use crate::error::CalError;
use crate::hardware::capabilities::InverterSensor;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Driver for the Particle cloud measurement API.
pub struct ParticleSensor {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
    access_token: String,
}

impl ParticleSensor {
    /// Build a sensor client with the configured timeouts.
    pub fn new(settings: &SensorSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.response_timeout)
            .build()
            .context("build sensor HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            device_id: settings.device_id.clone(),
            access_token: settings.access_token.clone(),
        })
    }

    /// Call one cloud capability and split its `result` payload.
    async fn fetch_values(&self, capability: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}/{}", self.base_url, self.device_id, capability);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| CalError::Sensor(format!("{capability} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalError::Sensor(format!("{capability} returned HTTP {status}")).into());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CalError::Sensor(format!("{capability} body is not JSON: {e}")))?;

        let result = body.get("result").and_then(|v| v.as_str()).ok_or_else(|| {
            CalError::Sensor(format!("{capability} response has no string 'result' field"))
        })?;

        let values = parse_result_list(result)
            .map_err(|e| CalError::Sensor(format!("{capability} payload: {e}")))?;
        debug!(capability, count = values.len(), "sensor snapshot fetched");
        Ok(values)
    }
}

#[async_trait]
impl InverterSensor for ParticleSensor {
    async fn measured_voltages(&self) -> Result<Vec<String>> {
        self.fetch_values("getVoltages").await
    }

    async fn measured_currents(&self) -> Result<Vec<String>> {
        self.fetch_values("getCurrents").await
    }

    async fn inverter_count(&self) -> Result<usize> {
        let values = self.fetch_values("getInverterCount").await?;
        let first = values
            .first()
            .ok_or_else(|| CalError::Sensor("empty inverter count response".to_string()))?;

        let count = first
            .parse::<f64>()
            .map_err(|e| CalError::Sensor(format!("malformed inverter count '{first}': {e}")))?;
        if count < 0.0 || count.fract() != 0.0 {
            return Err(CalError::Sensor(format!("invalid inverter count '{first}'")).into());
        }
        Ok(count as usize)
    }
}

/// Split a comma-space-delimited numeric payload into its raw tokens.
///
/// Every token must parse as a number, but the original text is kept so
/// exported values match the firmware's own formatting.
fn parse_result_list(payload: &str) -> Result<Vec<String>> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty result payload"));
    }

    let mut values = Vec::new();
    for token in trimmed.split(", ") {
        let token = token.trim();
        token
            .parse::<f64>()
            .with_context(|| format!("non-numeric value '{token}' in result payload"))?;
        values.push(token.to_string());
    }
    Ok(values)
}
