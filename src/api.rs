//! ==============================================================================
//! api.rs - typed client for the dashboard backend
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     one method per backend resource. each builds a url under the protected
//!     base, sends it through the request pipeline, turns non-2xx into
//!     `Error::Http { status, body }` and decodes 2xx bodies into the records
//!     from domain.rs.
//!
//! endpoints:
//!     GET  /tuya/devices                        -> plugs
//!     GET  /qingping/devices?user_id=           -> sensors
//!     GET  /mapping/sensor-plug?user_id=        -> mappings
//!     POST /mapping/sensor-plug {..., enabled}  -> upsert
//!     POST /mapping/sensor-plug {sensor_mac, delete: true} -> delete
//!     GET  /download/csv?sensor_mac=&start_time=&end_time= -> csv bytes
//!
//! relationships:
//!     - uses: pipeline.rs (credential injection, 401 handling)
//!     - uses: domain.rs (records, bodies)
//!     - used by: main.rs (cli commands)
//! ```
//!
//! ==============================================================================

use reqwest::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::domain::{
    default_export_filename, filename_from_disposition, CsvExport, Device, DeviceList, Mapping, MappingDelete,
    MappingList, MappingUpsert, PlugDevice, PlugList, UpsertResponse,
};
use crate::error::{Error, Result};
use crate::pipeline::RequestPipeline;

const PLUGS_PATH: &str = "/tuya/devices";
const SENSORS_PATH: &str = "/qingping/devices";
const MAPPINGS_PATH: &str = "/mapping/sensor-plug";
const CSV_PATH: &str = "/download/csv";

#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<RequestPipeline>,
}

impl ApiClient {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    // ==========================================================================
    // devices
    // ==========================================================================

    /// smart plugs available in the tuya space
    pub async fn list_plugs(&self) -> Result<Vec<PlugDevice>> {
        let url = self.endpoint(PLUGS_PATH, &[])?;
        let list: PlugList = self.get_json(url).await?;
        Ok(list.devices)
    }

    /// sensors bound to `user_id`
    pub async fn list_sensors(&self, user_id: &str) -> Result<Vec<Device>> {
        let url = self.endpoint(SENSORS_PATH, &[("user_id", user_id)])?;
        let list: DeviceList = self.get_json(url).await?;
        Ok(list.devices)
    }

    // ==========================================================================
    // mappings
    // ==========================================================================

    pub async fn list_mappings(&self, user_id: &str) -> Result<Vec<Mapping>> {
        let url = self.endpoint(MAPPINGS_PATH, &[("user_id", user_id)])?;
        let list: MappingList = self.get_json(url).await?;
        Ok(list.mappings)
    }

    /// create or update the mapping for `sensor_mac`. returns the saved record
    /// when the backend echoes it.
    pub async fn upsert_mapping(
        &self,
        user_id: &str,
        sensor_mac: &str,
        tuya_device_id: &str,
        enabled: bool,
    ) -> Result<Option<Mapping>> {
        let body = MappingUpsert {
            user_id: user_id.to_string(),
            sensor_mac: sensor_mac.to_string(),
            tuya_device_id: tuya_device_id.to_string(),
            enabled,
        };
        let url = self.endpoint(MAPPINGS_PATH, &[])?;
        let response = self.post_json(url, &body).await?;
        let saved: UpsertResponse = decode(response).await?;

        tracing::info!(sensor = sensor_mac, plug = tuya_device_id, enabled, "mapping saved");
        Ok(saved.mapping)
    }

    /// remove the mapping for `sensor_mac`. the backend takes deletes as a
    /// POST to the same endpoint with `delete: true`.
    pub async fn delete_mapping(&self, sensor_mac: &str) -> Result<()> {
        let url = self.endpoint(MAPPINGS_PATH, &[])?;
        self.post_json(url, &MappingDelete::new(sensor_mac)).await?;

        tracing::info!(sensor = sensor_mac, "mapping deleted");
        Ok(())
    }

    /// flip `enabled` on an existing mapping, everything else unchanged
    pub async fn toggle_mapping(&self, user_id: &str, mapping: &Mapping) -> Result<Option<Mapping>> {
        self.upsert_mapping(user_id, &mapping.sensor_mac, &mapping.tuya_device_id, !mapping.enabled)
            .await
    }

    // ==========================================================================
    // exports
    // ==========================================================================

    /// sensor readings (and plug switch logs when mapped) between `start` and
    /// `end`. both are passed through untouched; the backend accepts epoch
    /// seconds, YYYY-MM-DD or iso-8601.
    pub async fn download_csv(&self, sensor_mac: &str, start: &str, end: &str) -> Result<CsvExport> {
        let url = self.endpoint(
            CSV_PATH,
            &[("sensor_mac", sensor_mac), ("start_time", start), ("end_time", end)],
        )?;
        let response = self.send(Request::new(Method::GET, url)).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| default_export_filename(sensor_mac, start, end));
        let content = response.bytes().await?;

        tracing::info!(sensor = sensor_mac, file = %filename, bytes = content.len(), "csv downloaded");
        Ok(CsvExport { filename, content })
    }

    // ==========================================================================
    // plumbing
    // ==========================================================================

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.pipeline.base_url(), path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// send through the pipeline; non-2xx becomes Error::Http
    async fn send(&self, request: Request) -> Result<Response> {
        let response = self.pipeline.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Http { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(Request::new(Method::GET, url)).await?;
        decode(response).await
    }

    async fn post_json<B: Serialize>(&self, url: Url, body: &B) -> Result<Response> {
        let mut request = Request::new(Method::POST, url);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(serde_json::to_vec(body)?.into());
        self.send(request).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
