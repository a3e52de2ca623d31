//! Network module - interface detection, subnet utilities, sweep scope, device classification

mod device;
mod interface;
mod scope;
mod subnet;

pub use device::classify_device_kind;
pub use interface::{InterfaceInfo, find_valid_interface, interface_score};
pub use scope::ScanScope;
pub use subnet::{calculate_subnet_ips, is_special_address};
