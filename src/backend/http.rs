//! Blocking HTTP client for the dispatch backend.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::model::{OnlineStatus, Route};

use super::{BackendError, CompletionRequest, DispatchBackend, Result, StopAck};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct StatusBody {
    status: OnlineStatus,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl DispatchBackend for HttpBackend {
    fn fetch_assigned_routes(&mut self, driver_id: Uuid) -> Result<Vec<Route>> {
        let url = self.url(&format!("/drivers/{driver_id}/routes"));
        debug!(%url, "fetching assigned routes");
        let response = check(self.client.get(&url).send()?)?;
        Ok(response.json()?)
    }

    fn confirm_stop(&mut self, request: &CompletionRequest) -> Result<StopAck> {
        let url = self.url(&format!("/stops/{}/completion", request.stop_id));
        debug!(%url, outcome = ?request.outcome, "confirming stop");
        let response = check(self.client.post(&url).json(request).send()?)?;
        Ok(response.json()?)
    }

    fn set_online(&mut self, driver_id: Uuid, status: OnlineStatus) -> Result<()> {
        let url = self.url(&format!("/drivers/{driver_id}/status"));
        debug!(%url, status = status.as_str(), "reporting driver status");
        check(self.client.post(&url).json(&StatusBody { status }).send()?)?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`BackendError::Status`].
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "https://dispatch.example.com/api/".into(),
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            backend.url("/drivers/x/routes"),
            "https://dispatch.example.com/api/drivers/x/routes"
        );
    }
}
