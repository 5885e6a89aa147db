//! Trait describing the per-vendor collector state machines.

use crate::error::Result;
use crate::model::{
    Address, ClientSideResponse, CollectorId, CollectorMeta, GetAddressesResponse,
    GetBinDaysResponse,
};

/// A vendor-specific state machine that describes, one request at a time, the
/// HTTP conversation needed to look up addresses and bin days.
///
/// Implementations never perform I/O and keep no per-lookup state: everything a
/// later step needs travels in the request id sequence and in the metadata the
/// relay client echoes back. A single instance serves concurrent lookups.
pub trait Collector: Send + Sync {
    /// Metadata describing the authority served by this collector.
    fn meta(&self) -> &CollectorMeta;

    /// Identifier shortcut.
    fn id(&self) -> &CollectorId {
        &self.meta().id
    }

    /// Advance the address lookup for `postcode`. Pass `None` to start.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::CollectorError`] when a response cannot be understood or
    /// carries a request id this collector never issued.
    fn get_addresses(
        &self,
        postcode: &str,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetAddressesResponse>;

    /// Advance the bin day lookup for `address`. Pass `None` to start.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::CollectorError`] when a response cannot be understood or
    /// carries a request id this collector never issued.
    fn get_bin_days(
        &self,
        address: &Address,
        response: Option<&ClientSideResponse>,
    ) -> Result<GetBinDaysResponse>;
}
