//! High-level service facade driving collectors on behalf of relay clients.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{CollectorError, Result};
use crate::model::{
    Address, ClientSideResponse, CollectorId, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse, GetCollectorResponse, format_postcode,
};
use crate::normalize;
use crate::plugin::CollectorRegistry;
use crate::ports::Collector;
use crate::resolution::ResolutionMachine;

/// Public entry point for resolving collectors, addresses, and bin days.
///
/// Every method is one relay step: call with `None`, relay the returned
/// request, then call again with the response until a terminal payload arrives.
pub struct BinDaysService {
    registry: Arc<CollectorRegistry>,
    resolution: ResolutionMachine,
}

impl BinDaysService {
    /// Create a new service bound to the provided registry and GOV.UK.
    #[must_use]
    pub fn new(registry: Arc<CollectorRegistry>) -> Self {
        Self::with_resolution(registry, ResolutionMachine::default())
    }

    /// Create a new service with a custom resolution machine.
    #[must_use]
    pub fn with_resolution(registry: Arc<CollectorRegistry>, resolution: ResolutionMachine) -> Self {
        Self {
            registry,
            resolution,
        }
    }

    /// Metadata of all registered collectors.
    #[must_use]
    pub fn collectors(&self) -> Vec<CollectorMeta> {
        self.registry.collectors()
    }

    /// Advance the collector resolution for a postcode.
    ///
    /// # Errors
    ///
    /// Returns a [`CollectorError`] describing why the authority could not be resolved.
    pub fn get_collector(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetCollectorResponse> {
        let postcode = format_postcode(postcode);
        self.resolution.step(&self.registry, &postcode, response)
    }

    /// Advance the address lookup with a known collector.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::CollectorNotFound`] for unknown identifiers,
    /// [`CollectorError::AddressesNotFound`] when the lookup finishes empty, or
    /// any failure raised by the collector.
    pub fn get_addresses(
        &self,
        collector_id: &CollectorId,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse> {
        let collector = self.collector(collector_id)?;
        let postcode = format_postcode(postcode);
        trace_step("addresses", collector_id, response);

        match collector.get_addresses(&postcode, response)? {
            GetAddressesResponse::Addresses(addresses) if addresses.is_empty() => {
                Err(CollectorError::AddressesNotFound)
            }
            other => Ok(other),
        }
    }

    /// Advance the bin day lookup with a known collector, normalizing the final schedule.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::CollectorNotFound`] for unknown identifiers,
    /// [`CollectorError::BinDaysNotFound`] when nothing upcoming was found or a
    /// collection matched no bins, or any failure raised by the collector.
    pub fn get_bin_days(
        &self,
        collector_id: &CollectorId,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse> {
        self.get_bin_days_at(collector_id, address, response, normalize::today())
    }

    /// As [`Self::get_bin_days`] with an explicit "today".
    ///
    /// # Errors
    ///
    /// See [`Self::get_bin_days`].
    pub fn get_bin_days_at(
        &self,
        collector_id: &CollectorId,
        address: &Address,
        response: Option<&ClientSideResponse>,
        today: NaiveDate,
    ) -> Result<GetBinDaysResponse> {
        let collector = self.collector(collector_id)?;
        trace_step("bin_days", collector_id, response);

        match collector.get_bin_days(address, response)? {
            GetBinDaysResponse::BinDays(bin_days) => Ok(GetBinDaysResponse::BinDays(
                normalize::process_bin_days_at(bin_days, today)?,
            )),
            next @ GetBinDaysResponse::NextClientSideRequest(_) => Ok(next),
        }
    }

    fn collector(&self, id: &CollectorId) -> Result<&Arc<dyn Collector>> {
        self.registry
            .collector(id)
            .ok_or_else(|| CollectorError::CollectorNotFound(id.clone()))
    }
}

fn trace_step(operation: &str, collector: &CollectorId, response: Option<&ClientSideResponse>) {
    match response {
        None => tracing::debug!(%collector, operation, "starting lookup"),
        Some(response) => tracing::debug!(
            %collector,
            operation,
            request_id = response.request_id,
            status = response.status_code,
            "continuing lookup"
        ),
    }
}
