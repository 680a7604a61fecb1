// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::connection_info::{
    UsbNodeConnectionInfo,
    UsbNodeConnectionInfoEx,
};
use crate::errors::{
    UsbOpenError,
    UsbRequestError,
};
use crate::hub_info::{
    UsbHubCapabilities,
    UsbHubCapabilitiesEx,
    UsbNodeInformation,
};

// Fixed header sizes of the variable-length name responses. A name request
// issued with exactly the header size is the probe phase: it yields the
// actual_length_in_bytes needed for the full fetch.
//
// controller-scoped name responses carry a 4-byte actual-length field plus one
// padded UTF-16 unit of name
pub const CONTROLLER_NAME_REQUEST_HEADER_SIZE: u32 = 8;
// port-scoped name responses additionally carry the 4-byte connection index
pub const CONNECTION_NAME_REQUEST_HEADER_SIZE: u32 = 12;

/// Response to a variable-length name request.
///
/// The executor fills in as much of the UTF-16 name as the requested size
/// allows and always reports the total byte length the full response would
/// occupy, so a caller can probe with the fixed header size and then re-issue
/// the request sized exactly to actual_length_in_bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameRequestResponse {
    pub actual_length_in_bytes: u32,
    pub name_utf16: Vec<u16>,
}
//
impl NameRequestResponse {
    /// Decodes the name payload, dropping the terminating NUL (and anything
    /// after it) that the driver stack includes in the response.
    pub fn to_string_lossy(&self) -> String {
        let end = self.name_utf16.iter().position(|&unit| unit == 0).unwrap_or(self.name_utf16.len());
        String::from_utf16_lossy(&self.name_utf16[..end])
    }
}

/// The synchronous request executor this crate enumerates through.
///
/// An implementation owns the transport (on Windows, DeviceIoControl against
/// hub and controller handles) and answers one typed request per call. The
/// enumeration core drives all retry, fallback and two-phase sizing logic
/// itself, so executor methods are single requests with no internal retries.
pub trait UsbApi {
    type ControllerHandle;
    type HubHandle;

    /// Device path for the numbered legacy controller symbolic links. Most of
    /// these will not exist; failure to open one is an expected skip.
    fn legacy_host_controller_path(&self, controller_number: u32) -> String {
        format!("\\\\.\\HCD{}", controller_number)
    }

    /// Device paths discovered through the host-controller device interface
    /// class. This is the discovery service; the executor does not open them.
    fn host_controller_device_paths(&mut self) -> Result<Vec<String>, UsbRequestError>;

    fn open_host_controller(&mut self, device_path: &str) -> Result<Self::ControllerHandle, UsbOpenError>;

    /// Opens a hub by its symbolic link name (as returned by the root-hub-name
    /// and connection-name requests, without the device-path prefix).
    fn open_hub(&mut self, hub_name: &str) -> Result<Self::HubHandle, UsbOpenError>;

    fn get_root_hub_name(
        &mut self,
        controller: &Self::ControllerHandle,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError>;

    fn get_hcd_driver_key_name(
        &mut self,
        controller: &Self::ControllerHandle,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError>;

    fn get_node_connection_name(
        &mut self,
        hub: &Self::HubHandle,
        connection_index: u32,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError>;

    fn get_node_connection_driver_key_name(
        &mut self,
        hub: &Self::HubHandle,
        connection_index: u32,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError>;

    /// Mandatory per-hub record; a hub that cannot answer this cannot be
    /// enumerated.
    fn get_node_information(&mut self, hub: &Self::HubHandle) -> Result<UsbNodeInformation, UsbRequestError>;

    fn get_hub_capabilities(&mut self, hub: &Self::HubHandle) -> Result<UsbHubCapabilities, UsbRequestError>;

    /// Absent on older systems; callers treat any failure as "absent".
    fn get_hub_capabilities_ex(&mut self, hub: &Self::HubHandle) -> Result<UsbHubCapabilitiesEx, UsbRequestError>;

    /// Extended per-port connection info sized for pipe_capacity pipes. Older
    /// driver stacks reject this form; callers fall back to
    /// get_node_connection_info.
    fn get_node_connection_info_ex(
        &mut self,
        hub: &Self::HubHandle,
        connection_index: u32,
        pipe_capacity: usize,
    ) -> Result<UsbNodeConnectionInfoEx, UsbRequestError>;

    fn get_node_connection_info(
        &mut self,
        hub: &Self::HubHandle,
        connection_index: u32,
        pipe_capacity: usize,
    ) -> Result<UsbNodeConnectionInfo, UsbRequestError>;

    /// Issues a GET_DESCRIPTOR control request through the hub for the device
    /// on the given port and returns the raw descriptor bytes, at most
    /// requested_length of them.
    fn get_descriptor_from_node_connection(
        &mut self,
        hub: &Self::HubHandle,
        connection_index: u32,
        descriptor_type: u8,
        descriptor_index: u8,
        language_id: u16,
        requested_length: u16,
    ) -> Result<Vec<u8>, UsbRequestError>;

    /// Best-effort driver-key to human-readable device description lookup.
    fn device_description_for_driver_key(&mut self, driver_key: &str) -> Option<String>;

    /// Best-effort driver-key to hardware ID lookup (the string the PCI
    /// vendor/device/subsystem/revision identity is parsed from).
    fn device_id_for_driver_key(&mut self, driver_key: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_response_decodes_up_to_the_terminating_nul() {
        let mut name_utf16: Vec<u16> = "USB#ROOT_HUB30".encode_utf16().collect();
        name_utf16.push(0);
        name_utf16.push(0x2a2a); // stale buffer contents past the terminator
        let response = NameRequestResponse { actual_length_in_bytes: 40, name_utf16 };
        assert_eq!(response.to_string_lossy(), "USB#ROOT_HUB30");
    }

    #[test]
    fn name_response_without_terminator_decodes_fully() {
        let response = NameRequestResponse {
            actual_length_in_bytes: 16,
            name_utf16: "HUB".encode_utf16().collect(),
        };
        assert_eq!(response.to_string_lossy(), "HUB");
    }
}
