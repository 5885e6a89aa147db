//! Domain data structures for addresses, bins, and the relay protocol envelopes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier for a collector, the authority slug published by GOV.UK.
pub struct CollectorId(pub String);

impl fmt::Display for CollectorId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for CollectorId {
    fn from(slug: &str) -> Self {
        CollectorId(slug.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Vendor families a collector can belong to.
pub enum CollectorKind {
    /// Council portal relayed with a session cookie and scraped HTML.
    GovernmentPortal,
    /// REST backend exchanging AES encrypted, hex encoded JSON.
    EncryptedApi,
    /// Legacy multi-page form posting back hidden view state.
    FormRelay,
    /// Single page application backend answering plain JSON.
    JsonApi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Metadata describing a collector and the authority it serves.
pub struct CollectorMeta {
    /// Unique identifier.
    pub id: CollectorId,
    /// Human-friendly authority name.
    pub name: String,
    /// Public website of the authority.
    pub website_url: String,
    /// Vendor family implementing the lookup.
    pub kind: CollectorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Address returned by a collector.
pub struct Address {
    /// House name or number, or the full display line when the vendor does not split it.
    pub property: Option<String>,
    /// Street name.
    pub street: Option<String>,
    /// Town or locality.
    pub town: Option<String>,
    /// Postcode in canonical format.
    pub postcode: Option<String>,
    /// Vendor specific identifier used when requesting bin days.
    pub uid: Option<String>,
}

impl Address {
    /// Human-friendly label joining all populated parts.
    #[must_use]
    pub fn label(&self) -> String {
        [&self.property, &self.street, &self.town, &self.postcode]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Physical colour of a container.
pub enum BinColour {
    /// Black.
    Black,
    /// Blue.
    Blue,
    /// Brown.
    Brown,
    /// Green.
    Green,
    /// Grey.
    Grey,
    /// Orange.
    Orange,
    /// Pink.
    Pink,
    /// Purple.
    Purple,
    /// Red.
    Red,
    /// White.
    White,
    /// Yellow.
    Yellow,
}

impl fmt::Display for BinColour {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinColour::Black => "Black",
            BinColour::Blue => "Blue",
            BinColour::Brown => "Brown",
            BinColour::Green => "Green",
            BinColour::Grey => "Grey",
            BinColour::Orange => "Orange",
            BinColour::Pink => "Pink",
            BinColour::Purple => "Purple",
            BinColour::Red => "Red",
            BinColour::White => "White",
            BinColour::Yellow => "Yellow",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Container class.
pub enum BinType {
    /// Wheeled bin.
    Bin,
    /// Kerbside box.
    Box,
    /// Reusable bag.
    Bag,
    /// Food caddy.
    Caddy,
    /// Disposable sack.
    Sack,
    /// Generic container such as a communal bin.
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Entry in a vendor's static bin catalogue.
pub struct Bin {
    /// Canonical display name.
    pub name: String,
    /// Container colour.
    pub colour: BinColour,
    /// Container class, when the vendor distinguishes it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bin_type: Option<BinType>,
    /// Lowercase substrings matched against vendor descriptions.
    #[serde(default)]
    pub keys: Vec<String>,
}

impl Bin {
    /// Create a catalogue entry; keys are stored lowercase.
    #[must_use]
    pub fn new(name: &str, colour: BinColour, bin_type: Option<BinType>, keys: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            colour,
            bin_type,
            keys: keys.iter().map(|key| key.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Collection of one or more bins on a date.
pub struct BinDay {
    /// Collection date.
    pub date: NaiveDate,
    /// Address the collection applies to.
    pub address: Address,
    /// Bins collected; never empty after normalization.
    pub bins: Vec<Bin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
/// HTTP method of a relayed request.
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

const fn follow_redirects_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-request relay options.
pub struct ClientSideOptions {
    /// Whether the client follows redirects. Steps that read `Location` disable it.
    #[serde(default = "follow_redirects_default")]
    pub follow_redirects: bool,
    /// Opaque continuation state echoed back unmodified by the client.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for ClientSideOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// HTTP call the relay client must execute on behalf of a collector.
pub struct ClientSideRequest {
    /// Step that produced the request and will consume its response.
    pub request_id: u32,
    /// Absolute URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Relay options.
    #[serde(default)]
    pub options: ClientSideOptions,
}

impl ClientSideRequest {
    /// A GET request.
    pub fn get(request_id: u32, url: impl Into<String>) -> Self {
        Self {
            request_id,
            url: url.into(),
            method: Method::Get,
            headers: BTreeMap::new(),
            body: None,
            options: ClientSideOptions::default(),
        }
    }

    /// A POST request with a raw body.
    pub fn post(request_id: u32, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            body: Some(body.into()),
            ..Self::get(request_id, url)
        }
    }

    /// A POST request with a URL-encoded form body built from `fields` in order.
    pub fn post_form<K, V>(request_id: u32, url: impl Into<String>, fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::post(request_id, url, crate::scrape::form_body(fields))
            .with_header("content-type", "application/x-www-form-urlencoded")
    }

    /// A POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CollectorError::Json`] when `payload` cannot be serialized.
    pub fn post_json<T: Serialize>(
        request_id: u32,
        url: impl Into<String>,
        payload: &T,
    ) -> crate::Result<Self> {
        let body = serde_json::to_string(payload)?;
        Ok(Self::post(request_id, url, body).with_header("content-type", "application/json"))
    }

    /// Add or replace a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add or replace a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.metadata.insert(key.into(), value.into());
        self
    }

    /// Carry forward every metadata entry from a prior response.
    #[must_use]
    pub fn with_metadata_from(mut self, response: &ClientSideResponse) -> Self {
        self.options.metadata.extend(
            response
                .options
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        self
    }

    /// Ask the client not to follow redirects for this request.
    #[must_use]
    pub fn without_redirects(mut self) -> Self {
        self.options.follow_redirects = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Raw outcome of a relayed request, fed back verbatim by the client.
pub struct ClientSideResponse {
    /// Correlates with [`ClientSideRequest::request_id`].
    pub request_id: u32,
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers; repeated headers are joined with `\n`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    #[serde(default)]
    pub content: String,
    /// HTTP reason phrase.
    #[serde(default)]
    pub reason_phrase: String,
    /// Options echoed from the request, including metadata.
    #[serde(default)]
    pub options: ClientSideOptions,
}

impl ClientSideResponse {
    /// Whether the status code is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _value)| key.eq_ignore_ascii_case(name))
            .map(|(_key, value)| value.as_str())
    }

    /// Echoed metadata value.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.options.metadata.get(key).map(String::as_str)
    }

    /// Echoed metadata value that a later step depends on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CollectorError::MissingField`] when the client dropped the entry.
    pub fn require_metadata(&self, key: &'static str) -> crate::Result<&str> {
        self.metadata(key)
            .ok_or(crate::CollectorError::MissingField(key))
    }

    /// Fail unless the status code is 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CollectorError::UnexpectedStatus`] for any other status.
    pub fn ensure_success(&self) -> crate::Result<&Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(crate::CollectorError::UnexpectedStatus {
                request_id: self.request_id,
                status: self.status_code,
            })
        }
    }
}

/// Either another request to relay or the finished payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// More round trips are required.
    Next(ClientSideRequest),
    /// The lookup finished.
    Done(T),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Envelope returned while resolving the collector for a postcode.
pub enum GetCollectorResponse {
    /// Relay this request and call again with its response.
    NextClientSideRequest(ClientSideRequest),
    /// The resolved collector.
    Collector(CollectorMeta),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Envelope returned while looking up addresses for a postcode.
pub enum GetAddressesResponse {
    /// Relay this request and call again with its response.
    NextClientSideRequest(ClientSideRequest),
    /// The addresses found.
    Addresses(Vec<Address>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Envelope returned while looking up bin days for an address.
pub enum GetBinDaysResponse {
    /// Relay this request and call again with its response.
    NextClientSideRequest(ClientSideRequest),
    /// The upcoming collections.
    BinDays(Vec<BinDay>),
}

impl GetCollectorResponse {
    /// Split into the generic step representation.
    #[must_use]
    pub fn into_step(self) -> Step<CollectorMeta> {
        match self {
            Self::NextClientSideRequest(request) => Step::Next(request),
            Self::Collector(collector) => Step::Done(collector),
        }
    }
}

impl GetAddressesResponse {
    /// Split into the generic step representation.
    #[must_use]
    pub fn into_step(self) -> Step<Vec<Address>> {
        match self {
            Self::NextClientSideRequest(request) => Step::Next(request),
            Self::Addresses(addresses) => Step::Done(addresses),
        }
    }
}

impl GetBinDaysResponse {
    /// Split into the generic step representation.
    #[must_use]
    pub fn into_step(self) -> Step<Vec<BinDay>> {
        match self {
            Self::NextClientSideRequest(request) => Step::Next(request),
            Self::BinDays(bin_days) => Step::Done(bin_days),
        }
    }
}

impl From<ClientSideRequest> for GetCollectorResponse {
    fn from(request: ClientSideRequest) -> Self {
        Self::NextClientSideRequest(request)
    }
}

impl From<ClientSideRequest> for GetAddressesResponse {
    fn from(request: ClientSideRequest) -> Self {
        Self::NextClientSideRequest(request)
    }
}

impl From<ClientSideRequest> for GetBinDaysResponse {
    fn from(request: ClientSideRequest) -> Self {
        Self::NextClientSideRequest(request)
    }
}

/// Normalize a free-text postcode: uppercase, no inner spacing except one space
/// before the final three characters.
#[must_use]
pub fn format_postcode(postcode: &str) -> String {
    let compact: String = postcode
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    let char_count = compact.chars().count();
    if char_count <= 3 {
        return compact;
    }

    let split_at = compact
        .char_indices()
        .nth(char_count - 3)
        .map_or(compact.len(), |(index, _ch)| index);
    let (outward, inward) = compact.split_at(split_at);
    format!("{outward} {inward}")
}
