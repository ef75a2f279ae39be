//! Meilisearch REST client.
//!
//! Every write is an asynchronous task on the server; `enqueue` submits it
//! and polls `/tasks/{uid}` until it settles so callers see a completed
//! write when the call returns.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use reposearch_core::Availability;
use reposearch_types::{CodeIndexerSettings, IssueIndexerSettings};

use crate::error::MeiliError;

const BACKEND: &str = "meilisearch";

#[derive(Debug, Clone)]
pub struct MeiliConfig {
    pub url: String,
    /// Base index name; the physical index is `<index_name>_v<version>`
    pub index_name: String,
    pub api_key: Option<SecretString>,
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
    /// Upper bound on waiting for one write task
    pub task_timeout: Duration,
    pub batch_size: usize,
}

impl MeiliConfig {
    pub fn new(url: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index_name: index_name.into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(30),
            task_timeout: Duration::from_secs(60),
            batch_size: 16,
        }
    }

    pub fn from_code_settings(settings: &CodeIndexerSettings) -> Self {
        Self {
            api_key: settings.api_key.clone().map(SecretString::from),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            startup_timeout: Duration::from_secs(settings.startup_timeout_secs),
            batch_size: settings.batch_size,
            ..Self::new(settings.url.clone(), settings.index_name.clone())
        }
    }

    pub fn from_issue_settings(settings: &IssueIndexerSettings) -> Self {
        Self {
            api_key: settings.api_key.clone().map(SecretString::from),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            startup_timeout: Duration::from_secs(settings.startup_timeout_secs),
            ..Self::new(settings.url.clone(), settings.index_name.clone())
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

/// Uid of the index holding schema `version`.
pub fn versioned_uid(name: &str, version: u32) -> String {
    format!("{}_v{}", name, version)
}

pub struct MeiliClient {
    http: Client,
    base: String,
    api_key: Option<SecretString>,
    task_timeout: Duration,
    availability: Availability,
}

impl MeiliClient {
    pub fn new(config: &MeiliConfig) -> Result<Self, MeiliError> {
        let url = Url::parse(&config.url)
            .map_err(|e| MeiliError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base: url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            task_timeout: config.task_timeout,
            availability: Availability::new(),
        })
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, MeiliError> {
        let result = match builder.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v["message"].as_str().map(str::to_string))
                    .unwrap_or(body);
                Err(MeiliError::Status { status, message })
            }
            Err(e) => Err(MeiliError::Http(e)),
        };
        if let Err(e) = &result {
            if e.is_connection() {
                self.availability.mark_unavailable(BACKEND, &e.to_string());
            }
        }
        result
    }

    pub async fn json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, MeiliError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let bytes = self.execute(builder).await?.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Submit a write and wait for its task to succeed.
    pub async fn enqueue(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(), MeiliError> {
        let summary = self.json(method, path, body).await?;
        let uid = summary["taskUid"]
            .as_u64()
            .or_else(|| summary["uid"].as_u64())
            .ok_or_else(|| MeiliError::Response(format!("no task uid in {}", summary)))?;
        self.wait_task(uid).await
    }

    pub async fn wait_task(&self, uid: u64) -> Result<(), MeiliError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(20),
            max_interval: Duration::from_secs(1),
            max_elapsed_time: Some(self.task_timeout),
            ..Default::default()
        };
        loop {
            let task = self.json(Method::GET, &format!("tasks/{}", uid), None).await?;
            match task["status"].as_str() {
                Some("succeeded") => return Ok(()),
                Some("failed") | Some("canceled") => {
                    let message = task["error"]["message"]
                        .as_str()
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(MeiliError::Task { uid, message });
                }
                _ => match backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(MeiliError::TaskTimeout(uid)),
                },
            }
        }
    }

    pub async fn health(&self) -> Result<(), MeiliError> {
        let health = self.json(Method::GET, "health", None).await?;
        match health["status"].as_str() {
            Some("available") => Ok(()),
            other => Err(MeiliError::Unhealthy(format!(
                "status {}",
                other.unwrap_or("unknown")
            ))),
        }
    }

    /// Liveness check; a success restores availability.
    ///
    /// Returns whether this ping brought the backend back.
    pub async fn ping(&self) -> Result<bool, MeiliError> {
        match self.health().await {
            Ok(()) => {
                let recovered = self.availability.mark_available();
                if recovered {
                    info!(backend = BACKEND, "Search backend is available again");
                }
                Ok(recovered)
            }
            Err(e) => {
                self.availability.mark_unavailable(BACKEND, &e.to_string());
                Err(e)
            }
        }
    }

    pub async fn wait_healthy(&self, timeout: Duration) -> Result<(), MeiliError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(timeout),
            ..Default::default()
        };
        loop {
            match self.ping().await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_connection() => match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(error = %e, retry_in_ms = delay.as_millis(), "Meilisearch not ready, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(MeiliError::Unhealthy(e.to_string())),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn index_exists(&self, uid: &str) -> Result<bool, MeiliError> {
        match self.json(Method::GET, &format!("indexes/{}", uid), None).await {
            Ok(_) => Ok(true),
            Err(MeiliError::Status { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make sure `<name>_v<version>` exists with `settings` applied.
    ///
    /// Indexes of other versions are deleted. Returns whether the current
    /// version already existed.
    pub async fn ensure_index(
        &self,
        name: &str,
        version: u32,
        settings: &Value,
    ) -> Result<bool, MeiliError> {
        let uid = versioned_uid(name, version);
        let existed = self.index_exists(&uid).await?;
        if !existed {
            self.enqueue(
                Method::POST,
                "indexes",
                Some(&json!({ "uid": uid, "primaryKey": "id" })),
            )
            .await?;
            info!(index = %uid, "Created Meilisearch index");
        }
        self.enqueue(Method::PATCH, &format!("indexes/{}/settings", uid), Some(settings))
            .await?;

        let listed = self.json(Method::GET, "indexes?limit=1000", None).await?;
        let prefix = format!("{}_v", name);
        for other in listed["results"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|index| index["uid"].as_str())
        {
            let is_version = other
                .strip_prefix(&prefix)
                .is_some_and(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()));
            if is_version && other != uid {
                self.enqueue(Method::DELETE, &format!("indexes/{}", other), None)
                    .await?;
                info!(index = other, "Deleted outdated Meilisearch index");
            }
        }
        debug!(index = %uid, existed, "Meilisearch index ready");
        Ok(existed)
    }
}
