//! HTTP client for the relay API.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::frame::FrameDecoder;
use super::timeline::{ClientEvent, ExecutionTimeline};
use crate::models::resource::Resource;
use crate::orchestrator::ExecuteRequest;
use crate::{AppError, Result};

/// Request budget for one execution stream.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(60);

/// Authenticated client for one relay server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
    token: String,
    budget: Duration,
}

#[derive(Deserialize)]
struct ResourceList {
    resources: Vec<Resource>,
}

impl RelayClient {
    /// Client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            budget: DEFAULT_BUDGET,
        })
    }

    /// Override the execution request budget.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Run an execution and follow its stream to the end.
    ///
    /// `on_change` sees the timeline after every applied event. A stream
    /// that ends early, breaks, or exceeds the budget is closed with a
    /// cancelled terminal rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the request is rejected before streaming
    /// starts.
    pub async fn execute<F>(&self, request: &ExecuteRequest, mut on_change: F) -> Result<ExecutionTimeline>
    where
        F: FnMut(&ExecutionTimeline),
    {
        let mut timeline = ExecutionTimeline::new();
        let url = format!("{}/api/agent/execute", self.base_url);

        let follow = async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .json(request)
                .send()
                .await?;
            let response = check_status(response).await?;

            let mut decoder = FrameDecoder::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(%err, "execution stream broke");
                        break;
                    }
                };
                for frame in decoder.push(&chunk) {
                    if let Some(event) = ClientEvent::from_frame(&frame) {
                        timeline.apply(event);
                        on_change(&timeline);
                    }
                }
            }
            if let Some(event) = decoder.finish().as_ref().and_then(ClientEvent::from_frame) {
                timeline.apply(event);
                on_change(&timeline);
            }
            Ok::<(), AppError>(())
        };

        match tokio::time::timeout(self.budget, follow).await {
            Ok(result) => result?,
            Err(_) => warn!(budget_secs = self.budget.as_secs(), "execution request budget exceeded"),
        }

        if !timeline.is_finished() {
            debug!("stream ended without a terminal update");
            timeline.close();
            on_change(&timeline);
        }
        Ok(timeline)
    }

    /// List the caller's resources.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport errors or a non-success status.
    pub async fn list_resources(&self, search: Option<&str>) -> Result<Vec<Resource>> {
        let mut request = self
            .http
            .get(format!("{}/api/resources", self.base_url))
            .bearer_auth(&self.token);
        if let Some(search) = search {
            request = request.query(&[("search", search)]);
        }
        let response = check_status(request.send().await?).await?;
        let list: ResourceList = response.json().await?;
        Ok(list.resources)
    }
}

/// Turn a non-success response into `AppError::Http` with the server's
/// `error` message.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| status.to_string());
    Err(AppError::Http(format!("{status}: {message}")))
}
