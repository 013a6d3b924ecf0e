// src/probe/mod.rs

//! Asynchronous existence probes for the probing firing policy.
//!
//! A probe answers "does the resource behind this match exist?" before the
//! watcher's action runs. The runtime spawns the returned future and never
//! lets its result, error or not, change the watcher's lifecycle.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::watcher::Payload;

/// Future returned by [`ExistenceProbe::probe`].
pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'static>>;

pub trait ExistenceProbe: Send + Sync {
    /// Check whether the resource identified by `payload` exists.
    ///
    /// The future must not borrow `self` or the payload; the runtime spawns it
    /// after the watcher has already released its feed.
    fn probe(&self, payload: &Payload) -> ProbeFuture;
}

/// Resource identifier carried by a payload: the value itself, or the `href`
/// / `src` attribute of the first matched element.
pub fn resource_of(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Value(v) => Some(v.clone()),
        Payload::Elements(_) => payload
            .first()
            .and_then(|el| el.attr("href").or_else(|| el.attr("src")))
            .map(str::to_string),
    }
}

/// Issues a `HEAD` request for the payload's resource; any 2xx counts as
/// existing.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

impl ExistenceProbe for HttpProbe {
    fn probe(&self, payload: &Payload) -> ProbeFuture {
        let client = self.client.clone();
        let resource = resource_of(payload);

        Box::pin(async move {
            let Some(url) = resource else {
                return Err(anyhow!("payload carries no resource URL"));
            };
            let response = client
                .head(&url)
                .send()
                .await
                .map_err(|e| anyhow!("HEAD {url} failed: {e}"))?;
            let status = response.status();
            debug!(%url, %status, "probe response");
            Ok(status.is_success())
        })
    }
}
