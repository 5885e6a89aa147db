//! Executes relayed requests over HTTP and drives lookups to completion.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bindays_core::{
    Address, BinDay, BinDaysService, ClientSideRequest, ClientSideResponse, CollectorId,
    CollectorMeta, Method, RelayConfig, Step,
};
use reqwest::{Client, header::HeaderMap, redirect};

/// Performs one HTTP exchange on behalf of a collector.
#[async_trait]
pub(crate) trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &ClientSideRequest) -> Result<ClientSideResponse>;
}

/// `reqwest` backed executor with one client per redirect policy.
pub(crate) struct ReqwestExecutor {
    following: Client,
    manual: Client,
}

impl ReqwestExecutor {
    pub(crate) fn new(config: &RelayConfig) -> Result<Self> {
        let builder = || {
            Client::builder()
                .user_agent(config.user_agent.as_str())
                .timeout(config.timeout())
        };
        Ok(Self {
            following: builder().build()?,
            manual: builder().redirect(redirect::Policy::none()).build()?,
        })
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, request: &ClientSideRequest) -> Result<ClientSideResponse> {
        let client = if request.options.follow_redirects {
            &self.following
        } else {
            &self.manual
        };
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", request.method, request.url))?;
        let status = response.status();
        let headers = join_headers(response.headers());
        let content = response.text().await?;

        tracing::debug!(
            request_id = request.request_id,
            status = status.as_u16(),
            url = %request.url,
            "relayed request"
        );

        Ok(ClientSideResponse {
            request_id: request.request_id,
            status_code: status.as_u16(),
            headers,
            content,
            reason_phrase: status.canonical_reason().unwrap_or_default().to_owned(),
            options: request.options.clone(),
        })
    }
}

/// Flatten a header map, putting repeated values (notably `Set-Cookie`) on
/// separate lines.
fn join_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut joined = BTreeMap::<String, String>::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        joined
            .entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }
    joined
}

/// Trusted client side of the relay: feeds every response back into the service.
pub(crate) struct Relay<E> {
    service: Arc<BinDaysService>,
    executor: E,
    max_steps: usize,
}

impl<E: RequestExecutor> Relay<E> {
    pub(crate) fn new(service: Arc<BinDaysService>, executor: E, max_steps: usize) -> Self {
        Self {
            service,
            executor,
            max_steps,
        }
    }

    pub(crate) fn service(&self) -> &BinDaysService {
        &self.service
    }

    pub(crate) async fn collector(&self, postcode: &str) -> Result<CollectorMeta> {
        self.drive("collector", |response| {
            Ok(self.service.get_collector(postcode, response)?.into_step())
        })
        .await
    }

    pub(crate) async fn addresses(&self, id: &CollectorId, postcode: &str) -> Result<Vec<Address>> {
        self.drive("addresses", |response| {
            Ok(self.service.get_addresses(id, postcode, response)?.into_step())
        })
        .await
    }

    pub(crate) async fn bin_days(&self, id: &CollectorId, address: &Address) -> Result<Vec<BinDay>> {
        self.drive("bin_days", |response| {
            Ok(self.service.get_bin_days(id, address, response)?.into_step())
        })
        .await
    }

    /// Call `step` with the previous response until it yields a result or the
    /// step cap is reached.
    async fn drive<T, F>(&self, lookup: &str, mut step: F) -> Result<T>
    where
        F: FnMut(Option<&ClientSideResponse>) -> Result<Step<T>>,
    {
        let mut response: Option<ClientSideResponse> = None;

        for round in 0..=self.max_steps {
            match step(response.as_ref())? {
                Step::Done(value) => {
                    tracing::info!(lookup, rounds = round, "lookup finished");
                    return Ok(value);
                }
                Step::Next(request) if round < self.max_steps => {
                    response = Some(self.executor.execute(&request).await?);
                }
                Step::Next(_) => break,
            }
        }

        tracing::warn!(lookup, max_steps = self.max_steps, "lookup abandoned");
        bail!("{lookup} lookup gave up after {} requests", self.max_steps)
    }
}
