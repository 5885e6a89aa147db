//! Collector for council REST APIs that exchange AES-256-CBC encrypted, hex
//! encoded JSON. Each operation is a single round trip.

use std::sync::Arc;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use bindays_core::{
    Address, Bin, BinColour, BinDay, BinType, ClientSideRequest, ClientSideResponse, Collector,
    CollectorError, CollectorId, CollectorKind, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse, Result, normalize,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const API_REQUEST: u32 = 1;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-authority configuration for an encrypted REST backend.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedAuthority {
    /// GOV.UK authority slug.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Public website.
    pub website_url: &'static str,
    /// Root of the REST API.
    pub api_url: &'static str,
    /// AES-256 key shipped in the council's web client.
    pub key: [u8; 32],
    /// CBC initialisation vector shipped alongside the key.
    pub iv: [u8; 16],
}

/// Broxtowe Borough Council.
///
/// Illustrative configuration: the API root, key and IV are placeholders, not
/// values taken from the council's live client. Replace them before
/// registering this collector against real traffic.
pub const BROXTOWE: EncryptedAuthority = EncryptedAuthority {
    id: "broxtowe",
    name: "Broxtowe Borough Council",
    website_url: "https://www.broxtowe.gov.uk",
    api_url: "https://selfservice.broxtowe.gov.uk/api/bins",
    key: *b"Xq3vN8pL2mR7tY5wK9zB4cF6hJ1sD0gA",
    iv: *b"P7kM2nQ9rT4vW8yZ",
};

#[derive(Debug, Serialize)]
struct AddressQuery<'a> {
    postcode: &'a str,
}

#[derive(Debug, Serialize)]
struct CollectionQuery<'a> {
    uprn: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddressesPayload {
    #[serde(default)]
    addresses: Vec<AddressEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressEntry {
    uprn: u64,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionsPayload {
    #[serde(default)]
    collections: Vec<CollectionEntry>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    service: String,
    /// "YYYY-MM-DDTHH:MM:SS"
    date: String,
}

/// Encrypted REST collector.
pub struct EncryptedApiCollector {
    meta: CollectorMeta,
    authority: EncryptedAuthority,
    bins: Vec<Bin>,
}

impl EncryptedApiCollector {
    /// Create a collector for the given authority.
    #[must_use]
    pub fn new(authority: EncryptedAuthority) -> Self {
        Self {
            meta: CollectorMeta {
                id: CollectorId::from(authority.id),
                name: authority.name.to_owned(),
                website_url: authority.website_url.to_owned(),
                kind: CollectorKind::EncryptedApi,
            },
            authority,
            bins: bins(),
        }
    }

    /// Encrypt and hex encode a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Json`] when the payload cannot be serialized.
    pub fn encrypt<T: Serialize>(&self, payload: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)?;
        let cipher = Aes256CbcEnc::new(&self.authority.key.into(), &self.authority.iv.into());
        Ok(hex::encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(&plaintext)))
    }

    /// Hex decode and decrypt a response body into JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Decryption`] when the body is not valid hex, the
    /// padding is wrong, or the plaintext is not UTF-8.
    pub fn decrypt(&self, content: &str) -> Result<String> {
        let encoded = content.trim().trim_matches('"');
        let ciphertext = hex::decode(encoded)
            .map_err(|err| CollectorError::Decryption(format!("invalid hex: {err}")))?;
        let cipher = Aes256CbcDec::new(&self.authority.key.into(), &self.authority.iv.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|err| CollectorError::Decryption(format!("invalid padding: {err}")))?;
        String::from_utf8(plaintext)
            .map_err(|err| CollectorError::Decryption(format!("invalid UTF-8: {err}")))
    }

    fn api_request<T: Serialize>(&self, path: &str, payload: &T) -> Result<ClientSideRequest> {
        let body = self.encrypt(payload)?;
        let url = format!("{}/{path}", self.authority.api_url);
        Ok(ClientSideRequest::post(API_REQUEST, url, body)
            .with_header("content-type", "text/plain")
            .with_header("accept", "text/plain"))
    }

    fn parse_addresses(
        &self,
        response: &ClientSideResponse,
        postcode: &str,
    ) -> Result<Vec<Address>> {
        response.ensure_success()?;
        let payload: AddressesPayload = serde_json::from_str(&self.decrypt(&response.content)?)?;

        Ok(payload
            .addresses
            .into_iter()
            .map(|entry| Address {
                property: entry.house_number,
                street: entry.street,
                town: entry.town,
                postcode: Some(entry.postcode.unwrap_or_else(|| postcode.to_owned())),
                uid: Some(entry.uprn.to_string()),
            })
            .collect())
    }

    fn parse_bin_days(
        &self,
        response: &ClientSideResponse,
        address: &Address,
    ) -> Result<Vec<BinDay>> {
        response.ensure_success()?;
        let payload: CollectionsPayload = serde_json::from_str(&self.decrypt(&response.content)?)?;

        payload
            .collections
            .into_iter()
            .map(|entry| {
                let day = entry.date.split('T').next().unwrap_or_default();
                Ok(BinDay {
                    date: NaiveDate::parse_from_str(day, DATE_FORMAT)?,
                    address: address.clone(),
                    bins: normalize::match_bins(&self.bins, &entry.service),
                })
            })
            .collect()
    }
}

impl Collector for EncryptedApiCollector {
    fn meta(&self) -> &CollectorMeta {
        &self.meta
    }

    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse> {
        match response {
            None => Ok(self.api_request("addresses", &AddressQuery { postcode })?.into()),
            Some(response) if response.request_id == API_REQUEST => Ok(
                GetAddressesResponse::Addresses(self.parse_addresses(response, postcode)?),
            ),
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
                Ok(self.api_request("collections", &CollectionQuery { uprn })?.into())
            }
            Some(response) if response.request_id == API_REQUEST => {
                tracing::debug!(collector = %self.meta.id, "decrypting collections");
                Ok(GetBinDaysResponse::BinDays(self.parse_bin_days(response, address)?))
            }
            Some(response) => Err(CollectorError::protocol_violation(
                &self.meta.id,
                response.request_id,
            )),
        }
    }
}

fn bins() -> Vec<Bin> {
    vec![
        Bin::new(
            "General Waste",
            BinColour::Green,
            Some(BinType::Bin),
            &["refuse", "general", "residual"],
        ),
        Bin::new("Recycling", BinColour::Grey, Some(BinType::Bin), &["recycl"]),
        Bin::new("Garden Waste", BinColour::Brown, Some(BinType::Bin), &["garden"]),
        Bin::new("Glass", BinColour::Purple, Some(BinType::Box), &["glass"]),
    ]
}

/// Build the collector for the built-in encrypted authority.
#[must_use]
pub fn plugin() -> Arc<dyn Collector> {
    Arc::new(EncryptedApiCollector::new(BROXTOWE))
}
