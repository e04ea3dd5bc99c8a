//! Generic HTTP adapter driven by an installed manifest.
//!
//! POSTs credentials to the declared endpoint and expects a JSON array of
//! records back. Any transport or decode problem is a fetch failure —
//! only a successful response carrying a (possibly empty) array counts as
//! data. Each instance is built from its own manifest, so adapters for
//! different institution codes share nothing.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::SchoolAdapter;
use gradewatch_core::types::{GradeRecord, ScheduleEntry};

use crate::manifest::AdapterManifest;

pub struct HttpAdapter {
    manifest: AdapterManifest,
    client: reqwest::Client,
}

impl HttpAdapter {
    /// Build from a validated manifest.
    pub fn new(manifest: AdapterManifest) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            manifest,
            client: reqwest::Client::builder()
                .user_agent("gradewatch")
                .build()
                .map_err(|e| GradewatchError::Load(format!("http client: {e}")))?,
        })
    }

    pub fn manifest(&self) -> &AdapterManifest {
        &self.manifest
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        username: &str,
        password: &str,
        force_update: bool,
    ) -> Result<Vec<T>> {
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "force_update": force_update,
            }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| GradewatchError::FetchFailed(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(GradewatchError::FetchFailed(format!(
                "{url}: http status {}",
                resp.status()
            )));
        }
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| GradewatchError::FetchFailed(format!("{url}: decode: {e}")))
    }
}

#[async_trait]
impl SchoolAdapter for HttpAdapter {
    fn school_code(&self) -> &str {
        &self.manifest.school_code
    }

    fn school_name(&self) -> &str {
        &self.manifest.school_name
    }

    async fn fetch_grades(
        &self,
        username: &str,
        password: &str,
        force_update: bool,
    ) -> Result<Vec<GradeRecord>> {
        // validate() guarantees the endpoint is present
        let url = self
            .manifest
            .endpoints
            .grades_url
            .clone()
            .ok_or_else(|| GradewatchError::Load("grades_url missing".into()))?;
        self.fetch(&url, username, password, force_update).await
    }

    async fn fetch_schedule(
        &self,
        username: &str,
        password: &str,
        force_update: bool,
    ) -> Result<Vec<ScheduleEntry>> {
        let url = self
            .manifest
            .endpoints
            .schedule_url
            .clone()
            .ok_or_else(|| GradewatchError::Load("schedule_url missing".into()))?;
        self.fetch(&url, username, password, force_update).await
    }
}
