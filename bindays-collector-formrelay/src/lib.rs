//! Collector for legacy ASP.NET WebForms sites where every step is a postback
//! that must echo the page's hidden state and session cookie.
//!
//! Redirects are never followed on a postback: the `Location` header decides
//! whether another GET is needed before the next page can be scraped.

use std::sync::{Arc, LazyLock};

use bindays_core::{
    Address, Bin, BinColour, BinDay, BinType, ClientSideRequest, ClientSideResponse, Collector,
    CollectorError, CollectorId, CollectorKind, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse, Result, normalize, scrape,
};
use chrono::NaiveDate;
use regex::Regex;
use url::Url;

const LANDING_REQUEST: u32 = 1;
const SEARCH_REQUEST: u32 = 2;
const RESULTS_REQUEST: u32 = 3;
const SELECT_REQUEST: u32 = 4;
const SCHEDULE_REQUEST: u32 = 5;

const EVENT_TARGET: &str = "__EVENTTARGET";
const EVENT_ARGUMENT: &str = "__EVENTARGUMENT";
const VIEW_STATE: &str = "__VIEWSTATE";
const STATE_FIELDS: [&str; 3] = [VIEW_STATE, "__VIEWSTATEGENERATOR", "__EVENTVALIDATION"];

const COOKIE_KEY: &str = "cookie";
const PAGE_KEY: &str = "page";

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row regex"));

static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid cell regex"));

static POSTBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__doPostBack\(\s*(?:'|&#39;|&#x27;)([^'&]+)(?:'|&#39;|&#x27;)")
        .expect("valid postback regex")
});

static FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b[^>]*\baction\s*=\s*"([^"]*)""#).expect("valid form regex")
});

/// Per-authority configuration for a WebForms site.
#[derive(Debug, Clone, Copy)]
pub struct FormRelayAuthority {
    /// GOV.UK authority slug.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Public website.
    pub website_url: &'static str,
    /// Page hosting the postcode search form.
    pub form_url: &'static str,
    /// Control name of the postcode text box.
    pub postcode_field: &'static str,
    /// Control name and caption of the search button.
    pub search_button: (&'static str, &'static str),
    /// Format of the dates in the schedule table.
    pub date_format: &'static str,
}

/// East Lindsey District Council.
///
/// Illustrative configuration: the form URL and control names follow the
/// WebForms shape but are not checked against the live site.
pub const EAST_LINDSEY: FormRelayAuthority = FormRelayAuthority {
    id: "east-lindsey",
    name: "East Lindsey District Council",
    website_url: "https://www.e-lindsey.gov.uk",
    form_url: "https://collections.e-lindsey.gov.uk/Default.aspx",
    postcode_field: "ctl00$MainContent$txtPostcode",
    search_button: ("ctl00$MainContent$btnSearch", "Find address"),
    date_format: "%d/%m/%Y",
};

/// Multi-page form relay collector.
pub struct FormRelayCollector {
    meta: CollectorMeta,
    authority: FormRelayAuthority,
    bins: Vec<Bin>,
}

/// What a postback response asks for next.
enum Landing<'a> {
    Redirect(String),
    Page(&'a ClientSideResponse),
}

impl FormRelayCollector {
    /// Create a collector for the given authority.
    #[must_use]
    pub fn new(authority: FormRelayAuthority) -> Self {
        Self {
            meta: CollectorMeta {
                id: CollectorId::from(authority.id),
                name: authority.name.to_owned(),
                website_url: authority.website_url.to_owned(),
                kind: CollectorKind::FormRelay,
            },
            authority,
            bins: bins(),
        }
    }

    fn landing_request(&self) -> ClientSideRequest {
        ClientSideRequest::get(LANDING_REQUEST, self.authority.form_url).without_redirects()
    }

    /// Postback of the search button with the landing page's state.
    fn search_request(
        &self,
        response: &ClientSideResponse,
        postcode: &str,
    ) -> Result<ClientSideRequest> {
        response.ensure_success()?;
        let cookie = merge_cookies("", response.header("set-cookie"));

        let mut fields = postback_fields(&response.content, "")?;
        fields.push((self.authority.postcode_field.to_owned(), postcode.to_owned()));
        fields.push((
            self.authority.search_button.0.to_owned(),
            self.authority.search_button.1.to_owned(),
        ));

        Ok(postback(SEARCH_REQUEST, self.authority.form_url, &fields, cookie))
    }

    /// Postback of an address row's select link on the results page.
    fn select_request(
        &self,
        response: &ClientSideResponse,
        control: &str,
    ) -> Result<ClientSideRequest> {
        response.ensure_success()?;
        let page = response.metadata(PAGE_KEY).unwrap_or(self.authority.form_url);
        let target = form_action(&response.content, page)?;
        let cookie = merge_cookies(
            response.metadata(COOKIE_KEY).unwrap_or_default(),
            response.header("set-cookie"),
        );

        let fields = postback_fields(&response.content, control)?;
        Ok(postback(SELECT_REQUEST, &target, &fields, cookie))
    }

    /// Follow-up GET for a postback that redirected.
    fn follow(
        &self,
        request_id: u32,
        response: &ClientSideResponse,
        location: &str,
    ) -> Result<ClientSideRequest> {
        let base = response.metadata(PAGE_KEY).unwrap_or(self.authority.form_url);
        let url = resolve(base, location)?;
        let cookie = merge_cookies(
            response.metadata(COOKIE_KEY).unwrap_or_default(),
            response.header("set-cookie"),
        );
        tracing::debug!(collector = %self.meta.id, %url, "following postback redirect");

        let mut request = ClientSideRequest::get(request_id, url.clone()).without_redirects();
        if !cookie.is_empty() {
            request = request.with_header("cookie", cookie.clone());
        }
        Ok(request
            .with_metadata(COOKIE_KEY, cookie)
            .with_metadata(PAGE_KEY, url))
    }

    fn parse_schedule(&self, html: &str, address: &Address) -> Vec<BinDay> {
        let mut bin_days = Vec::new();

        for row in ROW.captures_iter(html) {
            let Some(body) = row.get(1).map(|body| body.as_str()) else {
                continue;
            };
            let cells: Vec<String> = CELL
                .captures_iter(body)
                .filter_map(|cell| cell.get(1).map(|text| scrape::clean_text(text.as_str())))
                .collect();

            let Some(date) = cells.iter().find_map(|cell| {
                NaiveDate::parse_from_str(cell, self.authority.date_format).ok()
            }) else {
                continue;
            };
            let service = cells
                .iter()
                .filter(|cell| NaiveDate::parse_from_str(cell, self.authority.date_format).is_err())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");

            bin_days.push(BinDay {
                date,
                address: address.clone(),
                bins: normalize::match_bins(&self.bins, &service),
            });
        }

        bin_days
    }
}

impl Collector for FormRelayCollector {
    fn meta(&self) -> &CollectorMeta {
        &self.meta
    }

    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse> {
        let Some(response) = response else {
            return Ok(self.landing_request().into());
        };
        tracing::debug!(collector = %self.meta.id, request_id = response.request_id, "address step");

        match response.request_id {
            LANDING_REQUEST => Ok(self.search_request(response, postcode)?.into()),
            SEARCH_REQUEST => match landing(response)? {
                Landing::Redirect(location) => {
                    Ok(self.follow(RESULTS_REQUEST, response, &location)?.into())
                }
                Landing::Page(page) => Ok(GetAddressesResponse::Addresses(parse_results(
                    &page.content,
                    postcode,
                ))),
            },
            RESULTS_REQUEST => {
                response.ensure_success()?;
                Ok(GetAddressesResponse::Addresses(parse_results(
                    &response.content,
                    postcode,
                )))
            }
            other => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }

    fn get_bin_days(
        &self,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse> {
        let control = address.uid.as_deref().ok_or(CollectorError::MissingField("uid"))?;
        let postcode = address
            .postcode
            .as_deref()
            .ok_or(CollectorError::MissingField("postcode"))?;

        let Some(response) = response else {
            return Ok(self.landing_request().into());
        };
        tracing::debug!(collector = %self.meta.id, request_id = response.request_id, "bin day step");

        match response.request_id {
            LANDING_REQUEST => Ok(self.search_request(response, postcode)?.into()),
            SEARCH_REQUEST => match landing(response)? {
                Landing::Redirect(location) => {
                    Ok(self.follow(RESULTS_REQUEST, response, &location)?.into())
                }
                Landing::Page(page) => Ok(self.select_request(page, control)?.into()),
            },
            RESULTS_REQUEST => Ok(self.select_request(response, control)?.into()),
            SELECT_REQUEST => match landing(response)? {
                Landing::Redirect(location) => {
                    Ok(self.follow(SCHEDULE_REQUEST, response, &location)?.into())
                }
                Landing::Page(page) => Ok(GetBinDaysResponse::BinDays(
                    self.parse_schedule(&page.content, address),
                )),
            },
            SCHEDULE_REQUEST => {
                response.ensure_success()?;
                Ok(GetBinDaysResponse::BinDays(
                    self.parse_schedule(&response.content, address),
                ))
            }
            other => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }
}

fn postback(
    request_id: u32,
    url: &str,
    fields: &[(String, String)],
    cookie: String,
) -> ClientSideRequest {
    let mut request = ClientSideRequest::post_form(request_id, url, fields).without_redirects();
    if !cookie.is_empty() {
        request = request.with_header("cookie", cookie.clone());
    }
    request
        .with_metadata(COOKIE_KEY, cookie)
        .with_metadata(PAGE_KEY, url)
}

fn landing(response: &ClientSideResponse) -> Result<Landing<'_>> {
    if (300..400).contains(&response.status_code) {
        let location = response
            .header("location")
            .ok_or(CollectorError::MissingField("location"))?;
        return Ok(Landing::Redirect(location.to_owned()));
    }
    response.ensure_success()?;
    Ok(Landing::Page(response))
}

/// Event fields followed by the page's hidden state, in postback order.
fn postback_fields(html: &str, target: &str) -> Result<Vec<(String, String)>> {
    let mut fields = vec![
        (EVENT_TARGET.to_owned(), target.to_owned()),
        (EVENT_ARGUMENT.to_owned(), String::new()),
    ];
    for name in STATE_FIELDS {
        match scrape::input_value(html, name) {
            Some(value) => fields.push((name.to_owned(), value)),
            None if name == VIEW_STATE => return Err(CollectorError::MissingField(VIEW_STATE)),
            None => {}
        }
    }
    Ok(fields)
}

/// Address rows of the results grid. The select link's control name becomes the uid.
fn parse_results(html: &str, postcode: &str) -> Vec<Address> {
    ROW.captures_iter(html)
        .filter_map(|row| {
            let body = row.get(1)?.as_str();
            let control = POSTBACK.captures(body)?.get(1)?.as_str().to_owned();
            let label = CELL
                .captures_iter(body)
                .filter_map(|cell| cell.get(1).map(|text| scrape::clean_text(text.as_str())))
                .find(|text| !text.is_empty() && !text.eq_ignore_ascii_case("select"))?;

            let (property, town) = match label.split_once(',') {
                Some((property, town)) => (property.trim().to_owned(), Some(town.trim().to_owned())),
                None => (label.clone(), None),
            };
            Some(Address {
                property: Some(property),
                street: None,
                town,
                postcode: Some(postcode.to_owned()),
                uid: Some(control),
            })
        })
        .collect()
}

fn form_action(html: &str, page: &str) -> Result<String> {
    match FORM_ACTION.captures(html).and_then(|caps| caps.get(1)) {
        Some(action) if !action.as_str().is_empty() => {
            resolve(page, &scrape::decode_entities(action.as_str()))
        }
        _ => Ok(page.to_owned()),
    }
}

fn resolve(base: &str, location: &str) -> Result<String> {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map(String::from)
        .map_err(|err| CollectorError::unexpected(format!("invalid redirect {location}: {err}")))
}

/// Fold `Set-Cookie` values over an existing `Cookie` header, newest wins.
fn merge_cookies(existing: &str, set_cookie: Option<&str>) -> String {
    let mut cookies: Vec<(String, String)> = existing
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_owned(), value.to_owned()))
        })
        .collect();

    for (name, value) in scrape::set_cookies(set_cookie.unwrap_or_default()) {
        match cookies.iter_mut().find(|(existing, _value)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => cookies.push((name, value)),
        }
    }

    scrape::cookie_header(&cookies)
}

fn bins() -> Vec<Bin> {
    vec![
        Bin::new("Domestic Waste", BinColour::Green, Some(BinType::Bin), &["domestic", "refuse"]),
        Bin::new("Recycling", BinColour::Blue, Some(BinType::Bin), &["recycl"]),
        Bin::new("Garden Waste", BinColour::Brown, Some(BinType::Bin), &["garden"]),
        Bin::new("Paper and Card", BinColour::Purple, Some(BinType::Bin), &["paper", "card"]),
    ]
}

/// Build the collector for the built-in form relay authority.
#[must_use]
pub fn plugin() -> Arc<dyn Collector> {
    Arc::new(FormRelayCollector::new(EAST_LINDSEY))
}
