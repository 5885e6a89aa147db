//! Postcode to authority resolution through the GOV.UK "find your local council" service.
//!
//! Request 1 posts the postcode with redirects disabled. GOV.UK either redirects
//! to the authority page, lists candidate addresses when a postcode straddles
//! authorities, or renders the result inline. Request 2 fetches the authority
//! page when it was not already returned, carrying the slug from request 1 in
//! its metadata.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CollectorError, Result};
use crate::model::{ClientSideRequest, ClientSideResponse, CollectorId, GetCollectorResponse};
use crate::plugin::CollectorRegistry;
use crate::scrape;

/// GOV.UK lookup endpoint.
pub const FIND_LOCAL_COUNCIL_URL: &str = "https://www.gov.uk/find-local-council";

const LOOKUP_REQUEST: u32 = 1;
const AUTHORITY_PAGE_REQUEST: u32 = 2;
const AUTHORITY_KEY: &str = "authority";

static INVALID_POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:valid (?:uk )?postcode|couldn(?:'|&#39;|’)t find (?:this|that) postcode)")
        .expect("valid rejection regex")
});

static AUTHORITY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/find-local-council/([a-z0-9][a-z0-9-]*)").expect("valid authority link regex")
});

static AUTHORITY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:local authority|council) is\s*(?:<[^>]*>\s*)*<strong>\s*([^<]+?)\s*</strong>")
        .expect("valid authority name regex")
});

static CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<option\b[^>]*>|<input\b[^>]*type\s*=\s*["']radio["'][^>]*>"#)
        .expect("valid candidate regex")
});

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid slug regex"));

const DISTRICT_MARKER: &str = "district-result";

/// State machine resolving a postcode to a registered collector.
#[derive(Debug, Clone)]
pub struct ResolutionMachine {
    lookup_url: String,
}

impl Default for ResolutionMachine {
    fn default() -> Self {
        Self::new(FIND_LOCAL_COUNCIL_URL)
    }
}

impl ResolutionMachine {
    /// Resolve against a lookup service at `lookup_url`.
    pub fn new(lookup_url: impl Into<String>) -> Self {
        Self {
            lookup_url: lookup_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Advance the resolution for `postcode`. Pass `None` to start.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::InvalidPostcode`] when GOV.UK rejects the postcode,
    /// [`CollectorError::AuthorityIdentifierNotFound`] when no authority can be
    /// extracted, [`CollectorError::UnsupportedAuthority`] when the authority has
    /// no collector, and [`CollectorError::ProtocolViolation`] for foreign request ids.
    pub fn step(
        &self,
        registry: &CollectorRegistry,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetCollectorResponse> {
        let Some(response) = response else {
            let request = ClientSideRequest::post_form(
                LOOKUP_REQUEST,
                self.lookup_url.clone(),
                &[("postcode", postcode)],
            )
            .without_redirects();
            return Ok(request.into());
        };

        tracing::debug!(
            collector = "gov-uk",
            request_id = response.request_id,
            status = response.status_code,
            "resolution step"
        );

        match response.request_id {
            LOOKUP_REQUEST => self.handle_lookup(registry, postcode, response),
            AUTHORITY_PAGE_REQUEST => resolve_from_page(registry, postcode, response),
            other => Err(CollectorError::protocol_violation(
                &CollectorId::from("gov-uk"),
                other,
            )),
        }
    }

    fn handle_lookup(
        &self,
        registry: &CollectorRegistry,
        postcode: &str,
        response: &ClientSideResponse,
    ) -> Result<GetCollectorResponse> {
        if INVALID_POSTCODE.is_match(&response.content) {
            return Err(CollectorError::InvalidPostcode(postcode.to_owned()));
        }
        if response.status_code >= 500 {
            return Err(CollectorError::UnexpectedStatus {
                request_id: response.request_id,
                status: response.status_code,
            });
        }

        let slug = location_slug(response).or_else(|| first_candidate(&response.content));
        if let Some(slug) = slug {
            let request = ClientSideRequest::get(
                AUTHORITY_PAGE_REQUEST,
                format!("{}/{slug}", self.lookup_url),
            )
            .with_metadata(AUTHORITY_KEY, slug)
            .without_redirects();
            return Ok(request.into());
        }

        if AUTHORITY_NAME.is_match(&response.content) {
            return resolve_from_page(registry, postcode, response);
        }

        Err(CollectorError::AuthorityIdentifierNotFound(
            postcode.to_owned(),
        ))
    }
}

fn resolve_from_page(
    registry: &CollectorRegistry,
    postcode: &str,
    response: &ClientSideResponse,
) -> Result<GetCollectorResponse> {
    let content = response.content.as_str();
    // Districts collect waste in two-tier areas.
    let district = content
        .find(DISTRICT_MARKER)
        .and_then(|index| content.get(index..));

    let slug = location_slug(response)
        .or_else(|| district.and_then(link_slug))
        .or_else(|| response.metadata(AUTHORITY_KEY).map(str::to_owned))
        .or_else(|| link_slug(content))
        .ok_or_else(|| CollectorError::AuthorityIdentifierNotFound(postcode.to_owned()))?;

    let name = district
        .and_then(authority_name)
        .or_else(|| authority_name(content))
        .unwrap_or_else(|| slug.clone());

    let id = CollectorId(slug);
    match registry.collector(&id) {
        Some(collector) => Ok(GetCollectorResponse::Collector(collector.meta().clone())),
        None => {
            tracing::info!(authority = %id, %name, "no collector registered for authority");
            Err(CollectorError::UnsupportedAuthority { id: id.0, name })
        }
    }
}

fn location_slug(response: &ClientSideResponse) -> Option<String> {
    response.header("location").and_then(link_slug)
}

fn link_slug(text: &str) -> Option<String> {
    AUTHORITY_LINK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|slug| slug.as_str().to_owned())
}

fn authority_name(text: &str) -> Option<String> {
    AUTHORITY_NAME
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|name| scrape::clean_text(name.as_str()))
        .filter(|name| !name.is_empty())
}

/// Authority slug embedded in the first non-empty candidate value. Values may
/// carry extra data after a `|` or `,`.
fn first_candidate(html: &str) -> Option<String> {
    CANDIDATE.find_iter(html).find_map(|tag| {
        let attrs = scrape::attributes(tag.as_str());
        let value = attrs.get("value")?;
        let slug = value
            .split(['|', ','])
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .to_lowercase();
        SLUG.is_match(&slug).then_some(slug)
    })
}
