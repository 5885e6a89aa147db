//! Shared fixtures for bindays-core integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::BTreeMap;
use std::sync::Arc;

use bindays_core::{
    Address, Bin, BinColour, BinDay, BinDaysService, BinType, ClientSideOptions,
    ClientSideRequest, ClientSideResponse, Collector, CollectorError, CollectorId, CollectorKind,
    CollectorMeta, CollectorRegistry, GetAddressesResponse, GetBinDaysResponse,
};
use chrono::NaiveDate;

/// Collector with a two step conversation that threads a session value through metadata.
pub struct ScriptedCollector {
    meta: CollectorMeta,
    pub bin_days: Vec<(NaiveDate, Vec<Bin>)>,
    pub addresses: Vec<Address>,
}

impl ScriptedCollector {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            meta: CollectorMeta {
                id: CollectorId::from(id),
                name: name.to_owned(),
                website_url: format!("https://{id}.example.gov.uk"),
                kind: CollectorKind::GovernmentPortal,
            },
            bin_days: Vec::new(),
            addresses: Vec::new(),
        }
    }
}

impl Collector for ScriptedCollector {
    fn meta(&self) -> &CollectorMeta {
        &self.meta
    }

    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse, CollectorError> {
        match response.map(|response| response.request_id) {
            None => Ok(ClientSideRequest::get(1, format!("{}/session", self.meta.website_url))
                .with_metadata("postcode", postcode)
                .into()),
            Some(1) => {
                let response = response.ok_or(CollectorError::MissingField("response"))?;
                Ok(ClientSideRequest::get(2, format!("{}/addresses", self.meta.website_url))
                    .with_metadata_from(response)
                    .with_metadata("session", response.content.clone())
                    .into())
            }
            Some(2) => {
                let response = response.ok_or(CollectorError::MissingField("response"))?;
                response.require_metadata("session")?;
                Ok(GetAddressesResponse::Addresses(self.addresses.clone()))
            }
            Some(other) => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }

    fn get_bin_days(
        &self,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse, CollectorError> {
        match response.map(|response| response.request_id) {
            None => Ok(ClientSideRequest::get(1, format!("{}/schedule", self.meta.website_url)).into()),
            Some(1) => Ok(GetBinDaysResponse::BinDays(
                self.bin_days
                    .iter()
                    .map(|(date, bins)| BinDay {
                        date: *date,
                        address: address.clone(),
                        bins: bins.clone(),
                    })
                    .collect(),
            )),
            Some(other) => Err(CollectorError::protocol_violation(&self.meta.id, other)),
        }
    }
}

pub fn service_with(collectors: Vec<Arc<dyn Collector>>) -> BinDaysService {
    BinDaysService::new(Arc::new(CollectorRegistry::new(collectors)))
}

/// Simulates the relay client: answers `request` and echoes its metadata.
pub fn respond(request: &ClientSideRequest, status_code: u16, content: &str) -> ClientSideResponse {
    respond_with_headers(request, status_code, content, &[])
}

pub fn respond_with_headers(
    request: &ClientSideRequest,
    status_code: u16,
    content: &str,
    headers: &[(&str, &str)],
) -> ClientSideResponse {
    ClientSideResponse {
        request_id: request.request_id,
        status_code,
        headers: headers
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect::<BTreeMap<_, _>>(),
        content: content.to_owned(),
        reason_phrase: String::new(),
        options: ClientSideOptions {
            follow_redirects: request.options.follow_redirects,
            metadata: request.options.metadata.clone(),
        },
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn rubbish() -> Bin {
    Bin::new("Rubbish", BinColour::Black, Some(BinType::Bin), &["refuse", "rubbish"])
}

pub fn recycling() -> Bin {
    Bin::new("Recycling", BinColour::Blue, Some(BinType::Bin), &["recycl"])
}

pub fn garden() -> Bin {
    Bin::new("Garden Waste", BinColour::Green, Some(BinType::Bin), &["garden"])
}
