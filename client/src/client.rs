use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::{DistributionSnapshot, MetricKind, MetricSnapshot, SampleSet};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("metric not found: {0}")]
    NotFound(String),
    #[error("unexpected response for {name}: {reason}")]
    UnexpectedResponse { name: String, reason: String },
}

/// Read-only client for the metrics server's dashboard API
/// (`/list`, `/all`, `/metric`). Clones share the underlying
/// connection pool.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    base: Url,
    http: reqwest::Client,
}

impl MetricsClient {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        Ok(MetricsClient {
            base: Url::parse(base)?,
            http: reqwest::Client::new(),
        })
    }

    /// Registered metrics as `(name, kind)` pairs.
    pub async fn list(&self) -> Result<Vec<(String, MetricKind)>, ClientError> {
        let url = self.base.join("/list")?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Snapshots of every registered metric, keyed by name.
    pub async fn all(&self) -> Result<HashMap<String, MetricSnapshot>, ClientError> {
        let url = self.base.join("/all")?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Snapshot of a single metric.
    pub async fn metric(&self, name: &str) -> Result<MetricSnapshot, ClientError> {
        let mut url = self.base.join("/metric")?;
        url.query_pairs_mut().append_pair("name", name);

        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(name.to_string()));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    /// Distribution snapshot, rejecting other metric kinds.
    pub async fn distribution(&self, name: &str) -> Result<DistributionSnapshot, ClientError> {
        match self.metric(name).await? {
            MetricSnapshot::Distribution(d) => Ok(d),
            other => Err(ClientError::UnexpectedResponse {
                name: name.to_string(),
                reason: format!("expected a distribution, got {other:?}"),
            }),
        }
    }

    /// Up to `limit` samples of a distribution, optionally restricted to
    /// a `[begin, end]` interval (RFC3339 on the wire). The returned
    /// count is the true population of the interval; negative means the
    /// interval was invalid and the caller should skip this refresh.
    pub async fn samples(
        &self,
        name: &str,
        limit: u64,
        bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<SampleSet, ClientError> {
        let mut url = self.base.join("/metric")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("name", name)
                .append_pair("samples", "true")
                .append_pair("limit", &limit.to_string());

            if let Some((begin, end)) = bounds {
                query
                    .append_pair("begin", &begin.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Millis, true));
            }
        }

        log::trace!("GET {url}");
        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(name.to_string()));
        }

        match response.error_for_status()?.json().await? {
            MetricSnapshot::Samples(s) => Ok(s),
            other => Err(ClientError::UnexpectedResponse {
                name: name.to_string(),
                reason: format!("expected samples, got {other:?}"),
            }),
        }
    }
}
