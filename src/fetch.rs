// crabtriage - GPL-3.0-or-later
// This file is part of crabtriage.
//
// Copyright (C) 2025 Daniel Freiermuth
//
// crabtriage is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// crabtriage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with crabtriage.  If not, see <https://www.gnu.org/licenses/>.

//! GitHub Actions client used to obtain job metadata and raw job logs.
//!
//! This is the only module that talks to the network. Failures here are
//! reported as [`FetchError`] and never reach the analysis pipeline.

use crate::core::TimeWindow;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use std::time::Duration;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not set up HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error! status: {status} ({url})")]
    Status { status: u16, url: String },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A workflow job as returned by `GET /repos/{owner}/{repo}/actions/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub html_url: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub name: String,
    pub number: u32,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// First step that concluded with `failure`.
    #[must_use]
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.conclusion.as_deref() == Some("failure"))
    }

    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }
}

impl Step {
    /// Window spanning this step, if both bounds were reported.
    #[must_use]
    pub fn window(&self) -> Option<TimeWindow> {
        Some(TimeWindow::new(self.started_at?, self.completed_at?))
    }
}

/// Blocking client for the handful of Actions endpoints we need.
pub struct GithubClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .user_agent(concat!("crabtriage/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetch job metadata including its steps.
    pub fn job(&self, owner: &str, repo: &str, job_id: u64) -> Result<Job, FetchError> {
        let url = job_url(&self.base_url, owner, repo, job_id);
        self.get(&url)?
            .json()
            .map_err(|source| FetchError::Decode { url, source })
    }

    /// Download the plain-text log of a job.
    ///
    /// GitHub answers with a redirect to short-lived blob storage; reqwest
    /// follows it and drops the `Authorization` header on the way.
    pub fn job_logs(&self, owner: &str, repo: &str, job_id: u64) -> Result<String, FetchError> {
        let url = job_logs_url(&self.base_url, owner, repo, job_id);
        let logs = self
            .get(&url)?
            .text()
            .map_err(|source| FetchError::Decode { url, source })?;
        tracing::info!(job_id, bytes = logs.len(), "Downloaded job log");
        Ok(logs)
    }

    fn get(&self, url: &str) -> Result<Response, FetchError> {
        tracing::debug!(url, "GET");
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

fn job_url(base_url: &str, owner: &str, repo: &str, job_id: u64) -> String {
    format!("{base_url}/repos/{owner}/{repo}/actions/jobs/{job_id}")
}

fn job_logs_url(base_url: &str, owner: &str, repo: &str, job_id: u64) -> String {
    format!("{}/logs", job_url(base_url, owner, repo, job_id))
}
