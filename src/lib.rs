// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

mod connection_info;
pub use connection_info::{
    UsbConnectionStatus,
    UsbDeviceSpeed,
    UsbNodeConnectionInfo,
    UsbNodeConnectionInfoEx,
    UsbPipeInfo,
    MAXIMUM_PIPES_PER_CONNECTION,
};

mod enumeration_session;
pub use enumeration_session::EnumerationSession;

mod errors;
pub use errors::*;

mod hub_info;
pub use hub_info::{
    UsbHubCapabilities,
    UsbHubCapabilitiesEx,
    UsbHubDescriptor,
    UsbNodeInformation,
};

mod string_descriptor_table;
pub use string_descriptor_table::{
    StringDescriptorEntry,
    StringDescriptorTable,
};

mod usb_api;
pub use usb_api::{
    NameRequestResponse,
    UsbApi,
    CONNECTION_NAME_REQUEST_HEADER_SIZE,
    CONTROLLER_NAME_REQUEST_HEADER_SIZE,
};

mod usb_descriptors;
pub use usb_descriptors::*;

mod usb_device_node_info;
pub use usb_device_node_info::{
    DeviceIcon,
    UsbDeviceInfo,
    UsbDeviceNodeInfo,
    UsbExternalHubInfo,
    UsbHostControllerInfo,
    UsbRootHubInfo,
};

mod usb_enumerator;
pub use usb_enumerator::{
    EnumerateOptions,
    UsbEnumerator,
};

mod usb_tree;
pub use usb_tree::UsbTreeNode;

#[cfg(target_os = "windows")]
mod windows_usb_api;
#[cfg(target_os = "windows")]
pub use windows_usb_api::{
    OwnedDeviceHandle,
    WindowsUsbApi,
};
