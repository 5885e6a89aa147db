//! Collector for council single page applications backed by a small JSON API.
//! Each operation is one POST whose reply is wrapped in a `success` envelope.

use std::sync::Arc;

use bindays_core::{
    Address, Bin, BinColour, BinDay, BinType, ClientSideRequest, ClientSideResponse, Collector,
    CollectorError, CollectorId, CollectorKind, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse, Result,
    normalize::{self, DEFAULT_YEAR_GRACE_MONTHS},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

const API_REQUEST: u32 = 1;

/// Per-authority configuration for a JSON backend.
#[derive(Debug, Clone, Copy)]
pub struct JsonApiAuthority {
    /// GOV.UK authority slug.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Public website.
    pub website_url: &'static str,
    /// Root of the JSON API.
    pub api_url: &'static str,
    /// Year-less format of collection dates.
    pub date_format: &'static str,
    /// Months a year-less date may lie in the past before next year is assumed.
    pub year_grace_months: u32,
}

/// Cheltenham Borough Council.
///
/// Illustrative configuration: the API root is a placeholder, not the council's
/// live backend.
pub const CHELTENHAM: JsonApiAuthority = JsonApiAuthority {
    id: "cheltenham",
    name: "Cheltenham Borough Council",
    website_url: "https://www.cheltenham.gov.uk",
    api_url: "https://api.cheltenham.gov.uk/bins/v1",
    date_format: "%a %d %b",
    year_grace_months: DEFAULT_YEAR_GRACE_MONTHS,
};

#[derive(Debug, Serialize)]
struct AddressSearch<'a> {
    postcode: &'a str,
}

#[derive(Debug, Serialize)]
struct CollectionSearch<'a> {
    uprn: &'a str,
}

/// `{"success": true, ...}` wrapper around every reply.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Default, Deserialize)]
struct AddressData {
    #[serde(default)]
    data: Vec<AddressRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressRecord {
    id: Uid,
    full_address: String,
    #[serde(default)]
    postcode: Option<String>,
}

/// Identifiers come back as numbers from some endpoints and strings from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Uid {
    Number(u64),
    Text(String),
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        match uid {
            Uid::Number(number) => number.to_string(),
            Uid::Text(text) => text,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CollectionData {
    #[serde(default)]
    collections: Vec<CollectionRecord>,
}

#[derive(Debug, Deserialize)]
struct CollectionRecord {
    #[serde(rename = "type")]
    service: String,
    date: String,
}

/// JSON API collector.
pub struct JsonApiCollector {
    meta: CollectorMeta,
    authority: JsonApiAuthority,
    bins: Vec<Bin>,
}

impl JsonApiCollector {
    /// Create a collector for the given authority.
    #[must_use]
    pub fn new(authority: JsonApiAuthority) -> Self {
        Self {
            meta: CollectorMeta {
                id: CollectorId::from(authority.id),
                name: authority.name.to_owned(),
                website_url: authority.website_url.to_owned(),
                kind: CollectorKind::JsonApi,
            },
            authority,
            bins: bins(),
        }
    }

    fn api_request<T: Serialize>(&self, path: &str, payload: &T) -> Result<ClientSideRequest> {
        let url = format!("{}/{path}", self.authority.api_url);
        Ok(ClientSideRequest::post_json(API_REQUEST, url, payload)?
            .with_header("accept", "application/json"))
    }

    fn parse_bin_days(
        &self,
        response: &ClientSideResponse,
        address: &Address,
        today: NaiveDate,
    ) -> Result<Vec<BinDay>> {
        let data: CollectionData = unwrap_envelope(response)?;

        data.collections
            .into_iter()
            .map(|record| {
                Ok(BinDay {
                    date: normalize::infer_year(
                        &record.date,
                        self.authority.date_format,
                        today,
                        self.authority.year_grace_months,
                    )?,
                    address: address.clone(),
                    bins: normalize::match_bins(&self.bins, &record.service),
                })
            })
            .collect()
    }
}

impl Collector for JsonApiCollector {
    fn meta(&self) -> &CollectorMeta {
        &self.meta
    }

    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse> {
        match response {
            None => Ok(self.api_request("address/search", &AddressSearch { postcode })?.into()),
            Some(response) if response.request_id == API_REQUEST => {
                let data: AddressData = unwrap_envelope(response)?;
                Ok(GetAddressesResponse::Addresses(
                    data.data
                        .into_iter()
                        .map(|record| Address {
                            property: Some(record.full_address),
                            street: None,
                            town: None,
                            postcode: Some(record.postcode.unwrap_or_else(|| postcode.to_owned())),
                            uid: Some(record.id.into()),
                        })
                        .collect(),
                ))
            }
            Some(response) => Err(CollectorError::protocol_violation(
                &self.meta.id,
                response.request_id,
            )),
        }
    }

    fn get_bin_days(
        &self,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse> {
        match response {
            None => {
                let uprn = address.uid.as_deref().ok_or(CollectorError::MissingField("uid"))?;
                Ok(self.api_request("collections", &CollectionSearch { uprn })?.into())
            }
            Some(response) if response.request_id == API_REQUEST => {
                let bin_days = self.parse_bin_days(response, address, normalize::today())?;
                Ok(GetBinDaysResponse::BinDays(bin_days))
            }
            Some(response) => Err(CollectorError::protocol_violation(
                &self.meta.id,
                response.request_id,
            )),
        }
    }
}

/// Decode the envelope and insist on an explicit `"success": true`.
fn unwrap_envelope<T: DeserializeOwned>(response: &ClientSideResponse) -> Result<T> {
    response.ensure_success()?;
    let envelope: Envelope<T> = serde_json::from_str(&response.content)?;

    match envelope.success {
        Some(true) => Ok(envelope.payload),
        Some(false) => {
            let message = envelope.message.unwrap_or_default();
            tracing::warn!(%message, "api reported failure");
            Err(CollectorError::unexpected(format!("API reported failure: {message}")))
        }
        None => Err(CollectorError::unexpected("API reply has no success flag")),
    }
}

fn bins() -> Vec<Bin> {
    vec![
        Bin::new("Refuse", BinColour::Green, Some(BinType::Bin), &["refuse", "rubbish"]),
        Bin::new("Recycling", BinColour::Blue, Some(BinType::Box), &["recycl"]),
        Bin::new("Garden Waste", BinColour::Brown, Some(BinType::Bin), &["garden"]),
        Bin::new("Food Waste", BinColour::Black, Some(BinType::Caddy), &["food"]),
    ]
}

/// Build the collector for the built-in JSON authority.
#[must_use]
pub fn plugin() -> Arc<dyn Collector> {
    Arc::new(JsonApiCollector::new(CHELTENHAM))
}
