use bindays_core::{Address, BinDay, CollectorMeta};

use crate::relay::{Relay, ReqwestExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    PostcodeInput,
    AddressSelect,
    BinDaysView,
}

pub(crate) struct App {
    pub relay: Relay<ReqwestExecutor>,

    pub screen: Screen,
    pub collectors: Vec<CollectorMeta>,

    pub postcode_input: String,
    pub collector: Option<CollectorMeta>,

    pub addresses: Vec<Address>,
    pub address_list_index: usize,
    pub selected_address: Option<Address>,

    pub bin_days: Vec<BinDay>,

    pub is_loading: bool,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new(relay: Relay<ReqwestExecutor>) -> Self {
        let collectors = relay.service().collectors();
        Self {
            relay,
            screen: Screen::PostcodeInput,
            collectors,
            postcode_input: String::new(),
            collector: None,
            addresses: Vec::new(),
            address_list_index: 0,
            selected_address: None,
            bin_days: Vec::new(),
            is_loading: false,
            error_message: None,
        }
    }

    pub(crate) fn show_addresses(&mut self, collector: CollectorMeta, addresses: Vec<Address>) {
        self.collector = Some(collector);
        self.addresses = addresses;
        self.address_list_index = 0;
        self.selected_address = None;
        self.screen = Screen::AddressSelect;
    }

    pub(crate) fn select_current_address(&mut self) -> Option<Address> {
        let address = self.addresses.get(self.address_list_index).cloned()?;
        self.selected_address = Some(address.clone());
        self.bin_days.clear();
        self.screen = Screen::BinDaysView;
        Some(address)
    }

    pub(crate) fn back_to_postcode(&mut self) {
        self.screen = Screen::PostcodeInput;
        self.collector = None;
        self.addresses.clear();
        self.address_list_index = 0;
    }
}
