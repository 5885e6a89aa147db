//! Collector for council portals that issue a session token on a landing page,
//! answer address searches with JSON, and render the schedule as HTML.

use std::sync::{Arc, LazyLock};

use bindays_core::{
    Address, Bin, BinColour, BinDay, BinType, ClientSideRequest, ClientSideResponse, Collector,
    CollectorError, CollectorId, CollectorKind, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse, Result,
    normalize::{self, DEFAULT_YEAR_GRACE_MONTHS},
    scrape,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

const SESSION_REQUEST: u32 = 1;
const DATA_REQUEST: u32 = 2;

const TOKEN_FIELD: &str = "_token";
const TOKEN_COOKIE: &str = "XSRF-TOKEN";
const COOKIE_KEY: &str = "cookie";
const TOKEN_KEY: &str = "token";

const DATE_FORMAT: &str = "%A %d %B";

static COLLECTION_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<li[^>]*class="[^"]*\bcollection\b[^"]*"[^>]*>(.*?)</li>"#)
        .expect("valid collection regex")
});

static COLLECTION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class="collection__type"[^>]*>(.*?)</"#).expect("valid type regex")
});

static COLLECTION_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class="collection__date"[^>]*>(.*?)</"#).expect("valid date regex")
});

/// Per-authority configuration for a session-cookie portal.
#[derive(Debug, Clone, Copy)]
pub struct PortalAuthority {
    /// GOV.UK authority slug.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Public website.
    pub website_url: &'static str,
    /// Root of the bin collection portal.
    pub portal_url: &'static str,
    /// Months a year-less date may lie in the past before next year is assumed.
    pub year_grace_months: u32,
}

/// Wealden District Council.
///
/// Illustrative configuration: the portal URLs are placeholders, not checked
/// against the live site.
pub const WEALDEN: PortalAuthority = PortalAuthority {
    id: "wealden",
    name: "Wealden District Council",
    website_url: "https://www.wealden.gov.uk",
    portal_url: "https://www.wealden.gov.uk/bin-collections",
    year_grace_months: DEFAULT_YEAR_GRACE_MONTHS,
};

/// Address as returned by `{portal}/addresses`.
#[derive(Debug, Deserialize)]
struct PortalAddress {
    uprn: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    postcode: Option<String>,
}

/// Session-cookie portal collector.
pub struct PortalCollector {
    meta: CollectorMeta,
    authority: PortalAuthority,
    bins: Vec<Bin>,
}

impl PortalCollector {
    /// Create a collector for the given authority.
    #[must_use]
    pub fn new(authority: PortalAuthority) -> Self {
        Self {
            meta: CollectorMeta {
                id: CollectorId::from(authority.id),
                name: authority.name.to_owned(),
                website_url: authority.website_url.to_owned(),
                kind: CollectorKind::GovernmentPortal,
            },
            authority,
            bins: bins(),
        }
    }

    fn session_request(&self) -> ClientSideRequest {
        ClientSideRequest::get(SESSION_REQUEST, self.authority.portal_url)
    }

    /// Build the data request for `path` from the landing page response.
    fn data_request(
        &self,
        response: &ClientSideResponse,
        path: &str,
        field: (&str, &str),
    ) -> Result<ClientSideRequest> {
        let session = Session::from_response(response)?;
        let url = format!("{}/{path}", self.authority.portal_url);

        let request = ClientSideRequest::post_form(
            DATA_REQUEST,
            url,
            &[(TOKEN_FIELD, session.token.as_str()), field],
        );

        Ok(request
            .with_header("cookie", session.cookie.clone())
            .with_header("x-requested-with", "XMLHttpRequest")
            .with_metadata(COOKIE_KEY, session.cookie)
            .with_metadata(TOKEN_KEY, session.token))
    }

    fn parse_bin_days(
        &self,
        html: &str,
        address: &Address,
        today: NaiveDate,
    ) -> Result<Vec<BinDay>> {
        let mut bin_days = Vec::new();

        for item in COLLECTION_ITEM.captures_iter(html) {
            let Some(body) = item.get(1).map(|body| body.as_str()) else {
                continue;
            };
            let service = capture_text(&COLLECTION_TYPE, body)
                .ok_or(CollectorError::MissingField("collection__type"))?;
            let date_text = capture_text(&COLLECTION_DATE, body)
                .ok_or(CollectorError::MissingField("collection__date"))?;

            let date = normalize::infer_year(
                &normalize::strip_ordinals(&date_text),
                DATE_FORMAT,
                today,
                self.authority.year_grace_months,
            )?;

            bin_days.push(BinDay {
                date,
                address: address.clone(),
                bins: normalize::match_bins(&self.bins, &service),
            });
        }

        Ok(bin_days)
    }
}

impl Collector for PortalCollector {
    fn meta(&self) -> &CollectorMeta {
        &self.meta
    }

    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse> {
        let Some(response) = response else {
            return Ok(self.session_request().into());
        };
        tracing::debug!(collector = %self.meta.id, request_id = response.request_id, "address step");

        match response.request_id {
            SESSION_REQUEST => Ok(self
                .data_request(response, "addresses", ("postcode", postcode))?
                .into()),
            DATA_REQUEST => {
                response.ensure_success()?;
                let found: Vec<PortalAddress> = serde_json::from_str(&response.content)?;
                Ok(GetAddressesResponse::Addresses(
                    found
                        .into_iter()
                        .map(|entry| to_address(entry, postcode))
                        .collect(),
                ))
            }
            other => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }

    fn get_bin_days(
        &self,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse> {
        let Some(response) = response else {
            return Ok(self.session_request().into());
        };
        tracing::debug!(collector = %self.meta.id, request_id = response.request_id, "bin day step");

        match response.request_id {
            SESSION_REQUEST => {
                let uprn = address.uid.as_deref().ok_or(CollectorError::MissingField("uid"))?;
                Ok(self.data_request(response, "schedule", ("uprn", uprn))?.into())
            }
            DATA_REQUEST => {
                response.ensure_success()?;
                Ok(GetBinDaysResponse::BinDays(self.parse_bin_days(
                    &response.content,
                    address,
                    normalize::today(),
                )?))
            }
            other => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }
}

/// Session token and cookies scraped from the landing page.
struct Session {
    token: String,
    cookie: String,
}

impl Session {
    fn from_response(response: &ClientSideResponse) -> Result<Self> {
        response.ensure_success()?;
        let set_cookie = response.header("set-cookie").unwrap_or_default();

        let token = match scrape::input_value(&response.content, TOKEN_FIELD)
            .filter(|token| !token.is_empty())
        {
            Some(token) => token,
            None => {
                tracing::warn!("session token missing from form, falling back to cookie");
                scrape::decoded_cookie_value(set_cookie, TOKEN_COOKIE)
                    .ok_or(CollectorError::MissingField(TOKEN_FIELD))?
            }
        };

        Ok(Self {
            token,
            cookie: scrape::cookie_header(&scrape::set_cookies(set_cookie)),
        })
    }
}

fn capture_text(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|text| scrape::clean_text(text.as_str()))
        .filter(|text| !text.is_empty())
}

/// Split "1 High Street, Uckfield" style lines into property and town.
fn to_address(entry: PortalAddress, postcode: &str) -> Address {
    let parts: Vec<&str> = entry
        .address
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let (property, street, town) = match parts.as_slice() {
        [] => (None, None, None),
        [only] => (Some(*only), None, None),
        [first, last] => (Some(*first), None, Some(*last)),
        [first, middle @ .., last] => (Some(*first), Some(middle.join(", ")), Some(*last)),
    };

    Address {
        property: property.map(str::to_owned),
        street,
        town: town.map(str::to_owned),
        postcode: Some(entry.postcode.unwrap_or_else(|| postcode.to_owned())),
        uid: Some(entry.uprn),
    }
}

fn bins() -> Vec<Bin> {
    vec![
        Bin::new("Rubbish", BinColour::Green, Some(BinType::Bin), &["refuse", "rubbish"]),
        Bin::new("Recycling", BinColour::Black, Some(BinType::Bin), &["recycl"]),
        Bin::new("Garden Waste", BinColour::Brown, Some(BinType::Bin), &["garden"]),
        Bin::new("Food Waste", BinColour::Grey, Some(BinType::Caddy), &["food"]),
    ]
}

/// Build the collector for the built-in portal authority.
#[must_use]
pub fn plugin() -> Arc<dyn Collector> {
    Arc::new(PortalCollector::new(WEALDEN))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bindays_core::{ClientSideOptions, Method};
    use pretty_assertions::assert_eq;

    use super::*;

    const LANDING: &str = r#"<form method="post"><input type="hidden" name="_token" value="tok-123"></form>"#;

    fn respond(request: &ClientSideRequest, content: &str, headers: &[(&str, &str)]) -> ClientSideResponse {
        ClientSideResponse {
            request_id: request.request_id,
            status_code: 200,
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect::<BTreeMap<_, _>>(),
            content: content.to_owned(),
            reason_phrase: "OK".to_owned(),
            options: ClientSideOptions {
                follow_redirects: request.options.follow_redirects,
                metadata: request.options.metadata.clone(),
            },
        }
    }

    fn next_address_request(response: GetAddressesResponse) -> ClientSideRequest {
        match response {
            GetAddressesResponse::NextClientSideRequest(request) => request,
            GetAddressesResponse::Addresses(found) => panic!("unexpected addresses: {found:?}"),
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    #[test]
    fn address_lookup_relays_session_token_and_cookie() {
        let collector = PortalCollector::new(WEALDEN);

        let landing = next_address_request(collector.get_addresses("TN22 1AA", None).expect("start"));
        assert_eq!(landing.method, Method::Get);
        assert_eq!(landing.url, WEALDEN.portal_url);

        let search = next_address_request(
            collector
                .get_addresses(
                    "TN22 1AA",
                    Some(&respond(
                        &landing,
                        LANDING,
                        &[("Set-Cookie", "laravel_session=s1; path=/\nXSRF-TOKEN=x1; path=/")],
                    )),
                )
                .expect("session step"),
        );
        assert_eq!(search.request_id, DATA_REQUEST);
        assert_eq!(search.url, "https://www.wealden.gov.uk/bin-collections/addresses");
        assert_eq!(search.body.as_deref(), Some("_token=tok-123&postcode=TN22+1AA"));
        assert_eq!(
            search.headers.get("cookie").map(String::as_str),
            Some("laravel_session=s1; XSRF-TOKEN=x1")
        );
        assert_eq!(search.options.metadata.get(TOKEN_KEY).map(String::as_str), Some("tok-123"));

        let json = r#"[
            {"uprn": "100060085791", "address": "1 High Street, Uckfield"},
            {"uprn": "100060085792", "address": "Hill Farm, Station Road, Uckfield", "postcode": "TN22 1AB"}
        ]"#;
        let done = collector
            .get_addresses("TN22 1AA", Some(&respond(&search, json, &[])))
            .expect("terminal step");

        let GetAddressesResponse::Addresses(found) = done else {
            panic!("expected addresses");
        };
        assert_eq!(
            found,
            vec![
                Address {
                    property: Some("1 High Street".to_owned()),
                    street: None,
                    town: Some("Uckfield".to_owned()),
                    postcode: Some("TN22 1AA".to_owned()),
                    uid: Some("100060085791".to_owned()),
                },
                Address {
                    property: Some("Hill Farm".to_owned()),
                    street: Some("Station Road".to_owned()),
                    town: Some("Uckfield".to_owned()),
                    postcode: Some("TN22 1AB".to_owned()),
                    uid: Some("100060085792".to_owned()),
                },
            ]
        );
    }

    #[test]
    fn token_falls_back_to_cookie() {
        let collector = PortalCollector::new(WEALDEN);
        let landing = collector.session_request();

        let search = next_address_request(
            collector
                .get_addresses(
                    "TN22 1AA",
                    Some(&respond(
                        &landing,
                        "<html></html>",
                        &[("set-cookie", "XSRF-TOKEN=abc%3D%3D; path=/")],
                    )),
                )
                .expect("session step"),
        );
        assert_eq!(search.body.as_deref(), Some("_token=abc%3D%3D&postcode=TN22+1AA"));
        assert_eq!(
            search.headers.get("cookie").map(String::as_str),
            Some("XSRF-TOKEN=abc%3D%3D")
        );
    }

    #[test]
    fn missing_token_is_reported() {
        let collector = PortalCollector::new(WEALDEN);
        let landing = collector.session_request();

        assert!(matches!(
            collector.get_addresses("TN22 1AA", Some(&respond(&landing, "<html></html>", &[]))),
            Err(CollectorError::MissingField(TOKEN_FIELD))
        ));
    }

    #[test]
    fn schedule_html_is_scraped_and_matched() {
        let collector = PortalCollector::new(WEALDEN);
        let html = r#"
            <ul class="collections">
              <li class="collection">
                <h3 class="collection__type">Refuse collection</h3>
                <p class="collection__date">Tuesday 20th October</p>
              </li>
              <li class="collection collection--alt">
                <h3 class="collection__type">Recycling &amp; food waste</h3>
                <p class="collection__date">Tuesday 27th October</p>
              </li>
            </ul>"#;

        let bin_days = collector
            .parse_bin_days(html, &Address::default(), date(2026, 10, 16))
            .expect("parses");

        let summary: Vec<_> = bin_days
            .iter()
            .map(|bin_day| {
                let names: Vec<_> = bin_day.bins.iter().map(|bin| bin.name.as_str()).collect();
                (bin_day.date, names)
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (date(2026, 10, 20), vec!["Rubbish"]),
                (date(2026, 10, 27), vec!["Recycling", "Food Waste"]),
            ]
        );
    }

    #[test]
    fn bin_day_lookup_posts_the_uprn() {
        let collector = PortalCollector::new(WEALDEN);
        let address = Address {
            uid: Some("100060085791".to_owned()),
            ..Address::default()
        };

        let GetBinDaysResponse::NextClientSideRequest(landing) =
            collector.get_bin_days(&address, None).expect("start")
        else {
            panic!("expected request");
        };
        let GetBinDaysResponse::NextClientSideRequest(schedule) = collector
            .get_bin_days(&address, Some(&respond(&landing, LANDING, &[])))
            .expect("session step")
        else {
            panic!("expected request");
        };

        assert_eq!(schedule.url, "https://www.wealden.gov.uk/bin-collections/schedule");
        assert_eq!(schedule.body.as_deref(), Some("_token=tok-123&uprn=100060085791"));
    }

    #[test]
    fn unknown_request_id_is_rejected() {
        let collector = PortalCollector::new(WEALDEN);
        let stray = ClientSideRequest::get(5, "https://www.wealden.gov.uk/");

        assert!(matches!(
            collector.get_bin_days(&Address::default(), Some(&respond(&stray, "", &[]))),
            Err(CollectorError::ProtocolViolation { request_id: 5, .. })
        ));
    }
}
