// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::connection_info::UsbNodeConnectionInfoEx;
use crate::hub_info::{
    UsbHubCapabilities,
    UsbHubCapabilitiesEx,
    UsbNodeInformation,
};
use crate::string_descriptor_table::StringDescriptorTable;

/// Icon category a presentation layer should show for a topology node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceIcon {
    HubIcon,
    NoDeviceIcon,
    // connected and carrying a current configuration
    GoodDeviceIcon,
    // connected but unconfigured
    BadDeviceIcon,
}

/// A host controller node. Identity is the driver key; the PCI fields are
/// parsed out of the controller's hardware ID string and are absent when that
/// string does not carry them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbHostControllerInfo {
    pub driver_key: String,
    pub vendor_id: Option<u32>,
    pub device_id: Option<u32>,
    pub sub_sys_id: Option<u32>,
    pub revision: Option<u32>,
}
//
impl UsbHostControllerInfo {
    /// Parses a PCI hardware ID of the form
    /// `PCI\VEN_xxxx&DEV_xxxx&SUBSYS_xxxxxxxx&REV_xx` into its four components.
    pub fn parse_pci_hardware_id(hardware_id: &str) -> Option<(u32, u32, u32, u32)> {
        let remainder = hardware_id.strip_prefix("PCI\\")?;

        let mut vendor_id = None;
        let mut device_id = None;
        let mut sub_sys_id = None;
        let mut revision = None;
        for component in remainder.split('&') {
            if let Some(value) = component.strip_prefix("VEN_") {
                vendor_id = u32::from_str_radix(value, 16).ok();
            } else if let Some(value) = component.strip_prefix("DEV_") {
                device_id = u32::from_str_radix(value, 16).ok();
            } else if let Some(value) = component.strip_prefix("SUBSYS_") {
                sub_sys_id = u32::from_str_radix(value, 16).ok();
            } else if let Some(value) = component.strip_prefix("REV_") {
                revision = u32::from_str_radix(value, 16).ok();
            }
        }

        Some((vendor_id?, device_id?, sub_sys_id?, revision?))
    }
}

/// A root hub node. A root hub has no upstream connection, so it carries no
/// connection info, configuration descriptor or string table of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbRootHubInfo {
    pub hub_name: String,
    pub hub_info: UsbNodeInformation,
    pub hub_caps: Option<UsbHubCapabilities>,
    pub hub_caps_ex: Option<UsbHubCapabilitiesEx>,
}

/// An external hub node: a hub discovered as a device on an upstream port, so
/// it additionally owns the upstream port's connection info and whatever
/// descriptors were fetched for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbExternalHubInfo {
    pub hub_name: String,
    pub hub_info: UsbNodeInformation,
    pub hub_caps: Option<UsbHubCapabilities>,
    pub hub_caps_ex: Option<UsbHubCapabilitiesEx>,
    pub connection_info: Box<UsbNodeConnectionInfoEx>,
    pub config_desc: Option<Vec<u8>>,
    pub string_descs: Option<StringDescriptorTable>,
}

/// A non-hub leaf device node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub connection_info: Box<UsbNodeConnectionInfoEx>,
    pub config_desc: Option<Vec<u8>>,
    pub string_descs: Option<StringDescriptorTable>,
}

/// The variant-typed payload attached to every node of the topology tree.
///
/// Each variant exclusively owns every buffer reachable from it; nodes are
/// write-once after construction and release everything exactly once when
/// dropped through the session's cleanup path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsbDeviceNodeInfo {
    HostController(UsbHostControllerInfo),
    RootHub(UsbRootHubInfo),
    ExternalHub(UsbExternalHubInfo),
    Device(UsbDeviceInfo),
}
