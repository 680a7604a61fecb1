// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::connection_info::{
    UsbConnectionStatus,
    UsbNodeConnectionInfoEx,
    MAXIMUM_PIPES_PER_CONNECTION,
};
use crate::enumeration_session::EnumerationSession;
use crate::errors::EnumerateError;
use crate::string_descriptor_table::{
    StringDescriptorEntry,
    StringDescriptorTable,
};
use crate::usb_api::{
    UsbApi,
    CONNECTION_NAME_REQUEST_HEADER_SIZE,
    CONTROLLER_NAME_REQUEST_HEADER_SIZE,
};
use crate::usb_descriptors::{
    DescriptorWalker,
    UsbConfigurationDescriptor,
    UsbDeviceDescriptor,
    MAXIMUM_USB_STRING_LENGTH,
    USB_COMMON_DESCRIPTOR_SIZE,
    USB_CONFIGURATION_DESCRIPTOR_SIZE,
    USB_CONFIGURATION_DESCRIPTOR_TYPE,
    USB_INTERFACE_DESCRIPTOR2_SIZE,
    USB_INTERFACE_DESCRIPTOR_SIZE,
    USB_INTERFACE_DESCRIPTOR_TYPE,
    USB_STRING_DESCRIPTOR_TYPE,
};
use crate::usb_device_node_info::{
    DeviceIcon,
    UsbDeviceInfo,
    UsbDeviceNodeInfo,
    UsbExternalHubInfo,
    UsbHostControllerInfo,
    UsbRootHubInfo,
};
use crate::usb_tree::UsbTreeNode;
use log::{debug, warn};

/// Policy knobs for an enumeration pass.
#[derive(Clone, Debug)]
pub struct EnumerateOptions {
    /// Fetch configuration descriptors (and, where they reference strings, the
    /// string table) for connected devices.
    pub fetch_configuration_descriptors: bool,
    /// How many numbered legacy controller symbolic links to probe before the
    /// device-interface-class discovery path runs.
    pub legacy_controller_probe_count: u32,
}
//
impl Default for EnumerateOptions {
    fn default() -> EnumerateOptions {
        EnumerateOptions { fetch_configuration_descriptors: true, legacy_controller_probe_count: 10 }
    }
}

/// Walks the USB bus tree through a request executor, producing one
/// presentation tree entry per host controller.
///
/// The walk is a single synchronous pass: controllers, then each controller's
/// root hub, then recursively every hub's downstream ports. Failures never
/// propagate above the enclosing subtree; the controller probe loop always
/// completes every slot.
pub struct UsbEnumerator<A: UsbApi> {
    api: A,
    options: EnumerateOptions,
}
//
impl<A: UsbApi> UsbEnumerator<A> {
    pub fn new(api: A) -> UsbEnumerator<A> {
        UsbEnumerator::with_options(api, EnumerateOptions::default())
    }

    pub fn with_options(api: A, options: EnumerateOptions) -> UsbEnumerator<A> {
        UsbEnumerator { api, options }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn into_api(self) -> A {
        self.api
    }

    /// Enumerates every reachable host controller and returns their tree
    /// entries. Controllers are probed twice over: once through the numbered
    /// legacy symbolic links and once through the device-interface-class
    /// discovery path; the session's identity set suppresses the duplicates.
    pub fn enumerate_host_controllers(&mut self, session: &mut EnumerationSession) -> Vec<UsbTreeNode> {
        session.begin_pass();

        let mut host_controllers = Vec::<UsbTreeNode>::new();

        // probe the numbered legacy controller paths; a path that does not
        // open simply is not a controller on this system
        for controller_number in 0..self.options.legacy_controller_probe_count {
            let device_path = self.api.legacy_host_controller_path(controller_number);

            let controller = match self.api.open_host_controller(&device_path) {
                Ok(handle) => handle,
                Err(_) => continue,
            };

            // display the leaf portion of the path (e.g. "HCD0"), not the device-path prefix
            let leaf_name =
                device_path.strip_prefix("\\\\.\\").unwrap_or(device_path.as_str()).to_string();

            if let Some(node) = self.enumerate_host_controller(session, &controller, &leaf_name) {
                host_controllers.push(node);
            }
        }

        // now the device-interface-class discovery path
        match self.api.host_controller_device_paths() {
            Ok(device_paths) => {
                for device_path in device_paths {
                    let controller = match self.api.open_host_controller(&device_path) {
                        Ok(handle) => handle,
                        Err(_) => continue,
                    };

                    if let Some(node) = self.enumerate_host_controller(session, &controller, &device_path) {
                        host_controllers.push(node);
                    }
                }
            }
            Err(error) => {
                warn!("host controller device interface discovery failed: {}", error);
            }
        }

        host_controllers
    }

    /// Enumerates one open host controller: resolves its driver-key identity,
    /// suppresses duplicates, builds the controller node and walks its root
    /// hub. Returns None when the controller is a duplicate or its identity
    /// could not be resolved.
    fn enumerate_host_controller(
        &mut self,
        session: &mut EnumerationSession,
        controller: &A::ControllerHandle,
        leaf_name: &str,
    ) -> Option<UsbTreeNode> {
        let driver_key = match self.get_hcd_driver_key_name(controller) {
            Ok(name) => name,
            Err(error) => {
                warn!("could not resolve the driver key of host controller '{}': {}", leaf_name, error);
                return None;
            }
        };

        // the same physical controller may be reachable through a legacy
        // numbered path and through the device-interface-class path; dedup is
        // on driver-key identity, never on device path
        if session.host_controller_already_enumerated(&driver_key) {
            return None;
        }

        let (vendor_id, device_id, sub_sys_id, revision) =
            match self.api.device_id_for_driver_key(&driver_key) {
                Some(hardware_id) => match UsbHostControllerInfo::parse_pci_hardware_id(&hardware_id) {
                    Some((ven, dev, subsys, rev)) => (Some(ven), Some(dev), Some(subsys), Some(rev)),
                    None => {
                        debug!("hardware id '{}' of '{}' is not a PCI identity", hardware_id, driver_key);
                        (None, None, None, None)
                    }
                },
                None => {
                    debug!("no hardware id for driver key '{}'", driver_key);
                    (None, None, None, None)
                }
            };

        // prefer the human-readable device description over the raw path
        let controller_leaf_name = match self.api.device_description_for_driver_key(&driver_key) {
            Some(device_description) => device_description,
            None => {
                debug!("no device description for driver key '{}'", driver_key);
                leaf_name.to_string()
            }
        };

        session.register_host_controller(&driver_key);

        let mut host_controller_node = UsbTreeNode::new(
            controller_leaf_name,
            DeviceIcon::GoodDeviceIcon,
            UsbDeviceNodeInfo::HostController(UsbHostControllerInfo {
                driver_key: driver_key.clone(),
                vendor_id,
                device_id,
                sub_sys_id,
                revision,
            }),
        );

        // resolve the root hub's symbolic link name and walk it; a failure
        // here costs this controller its subtree but nothing more
        match self.get_root_hub_name(controller) {
            Ok(root_hub_name) => {
                if let Err(error) = self.enumerate_hub(
                    session,
                    &mut host_controller_node,
                    root_hub_name,
                    None, // connection info: none marks a root hub
                    None,
                    None,
                    Some("RootHub"),
                ) {
                    warn!("could not enumerate the root hub of '{}': {}", driver_key, error);
                }
            }
            Err(error) => {
                warn!("could not resolve the root hub name of '{}': {}", driver_key, error);
            }
        }

        Some(host_controller_node)
    }

    /// Enumerates one hub (root or external): opens it, queries its records,
    /// attaches its tree entry under tree_parent and walks its ports.
    ///
    /// Takes ownership of the name, connection info and descriptors; on
    /// failure they are consumed and released here, so the caller has nothing
    /// left to free. connection_info of None marks a root hub.
    fn enumerate_hub(
        &mut self,
        session: &mut EnumerationSession,
        tree_parent: &mut UsbTreeNode,
        hub_name: String,
        connection_info: Option<Box<UsbNodeConnectionInfoEx>>,
        config_desc: Option<Vec<u8>>,
        string_descs: Option<StringDescriptorTable>,
        device_description: Option<&str>,
    ) -> Result<(), EnumerateError> {
        let hub = self.api.open_hub(&hub_name)?;

        // both capability queries are best-effort: older driver stacks answer
        // neither, and that downgrades to "absent" rather than aborting
        let hub_caps_ex = match self.api.get_hub_capabilities_ex(&hub) {
            Ok(capabilities) => Some(capabilities),
            Err(error) => {
                debug!("extended hub capabilities unavailable for '{}': {}", hub_name, error);
                None
            }
        };
        let hub_caps = match self.api.get_hub_capabilities(&hub) {
            Ok(capabilities) => Some(capabilities),
            Err(error) => {
                debug!("hub capabilities unavailable for '{}': {}", hub_name, error);
                None
            }
        };

        // node information is mandatory; without a port count there is nothing
        // to walk
        let hub_info = self.api.get_node_information(&hub)?;

        // leaf label: parent port and connection state for an external hub,
        // then the device description, or the hub name when there is none
        let mut leaf_name = match connection_info.as_deref() {
            Some(info) => format!("[Port{}] {} :  ", info.connection_index, info.connection_status),
            None => String::new(),
        };
        match device_description {
            Some(description) => leaf_name.push_str(description),
            None => leaf_name.push_str(&hub_name),
        }

        let number_of_ports = hub_info.hub_descriptor.number_of_ports;

        let node_info = match connection_info {
            Some(connection_info) => UsbDeviceNodeInfo::ExternalHub(UsbExternalHubInfo {
                hub_name,
                hub_info,
                hub_caps,
                hub_caps_ex,
                connection_info,
                config_desc,
                string_descs,
            }),
            None => UsbDeviceNodeInfo::RootHub(UsbRootHubInfo {
                hub_name,
                hub_info,
                hub_caps,
                hub_caps_ex,
            }),
        };

        let hub_node = tree_parent.add_leaf(UsbTreeNode::new(leaf_name, DeviceIcon::HubIcon, node_info));

        self.enumerate_hub_ports(session, hub_node, &hub, number_of_ports);

        Ok(())
    }

    /// Walks every downstream port of an open hub. Port indices are 1-based;
    /// one failed port is skipped without aborting its siblings.
    fn enumerate_hub_ports(
        &mut self,
        session: &mut EnumerationSession,
        tree_parent: &mut UsbTreeNode,
        hub: &A::HubHandle,
        number_of_ports: u8,
    ) {
        for connection_index in 1..=(number_of_ports as u32) {
            // sized for the maximum of 30 pipes per configuration
            let connection_info = match self.api.get_node_connection_info_ex(
                hub,
                connection_index,
                MAXIMUM_PIPES_PER_CONNECTION,
            ) {
                Ok(info) => info,
                Err(extended_error) => {
                    // older driver stacks only answer the legacy request shape
                    match self.api.get_node_connection_info(hub, connection_index, MAXIMUM_PIPES_PER_CONNECTION) {
                        Ok(legacy_info) => UsbNodeConnectionInfoEx::from(legacy_info),
                        Err(legacy_error) => {
                            warn!(
                                "port {}: connection info unavailable (extended: {}; legacy: {})",
                                connection_index, extended_error, legacy_error
                            );
                            continue;
                        }
                    }
                }
            };

            if connection_info.connection_status == UsbConnectionStatus::DeviceConnected {
                session.record_connected_device();
            }
            if connection_info.device_is_hub {
                session.record_hub();
            }

            // resolve the device description through the driver key; both
            // lookups are best-effort
            let mut device_description = None;
            if connection_info.connection_status != UsbConnectionStatus::NoDeviceConnected {
                match self.get_driver_key_name(hub, connection_index) {
                    Ok(driver_key) => {
                        device_description = self.api.device_description_for_driver_key(&driver_key);
                    }
                    Err(error) => {
                        debug!("port {}: no driver key name: {}", connection_index, error);
                    }
                }
            }

            let config_desc = if self.options.fetch_configuration_descriptors
                && connection_info.connection_status == UsbConnectionStatus::DeviceConnected
            {
                match self.get_config_descriptor(hub, connection_index, 0) {
                    Ok(buffer) => Some(buffer),
                    Err(error) => {
                        warn!("port {}: configuration descriptor fetch failed: {}", connection_index, error);
                        None
                    }
                }
            } else {
                None
            };

            let string_descs = match config_desc {
                Some(ref buffer)
                    if are_there_string_descriptors(&connection_info.device_descriptor, buffer) =>
                {
                    self.get_all_string_descriptors(
                        hub,
                        connection_index,
                        &connection_info.device_descriptor,
                        buffer,
                    )
                }
                _ => None,
            };

            if connection_info.device_is_hub {
                // the attached device is itself a hub: resolve its symbolic
                // link name and recurse, handing this port's records over as
                // the new hub's upstream context
                match self.get_external_hub_name(hub, connection_index) {
                    Ok(external_hub_name) => {
                        if let Err(error) = self.enumerate_hub(
                            session,
                            tree_parent,
                            external_hub_name,
                            Some(Box::new(connection_info)),
                            config_desc,
                            string_descs,
                            device_description.as_deref(),
                        ) {
                            // enumerate_hub consumed and released the port's
                            // records on its failure path
                            warn!("port {}: could not enumerate the attached hub: {}", connection_index, error);
                        }
                    }
                    Err(error) => {
                        warn!("port {}: could not resolve the attached hub's name: {}", connection_index, error);
                    }
                }
            } else {
                let mut leaf_name =
                    format!("[Port{}] {}", connection_index, connection_info.connection_status);
                if let Some(ref description) = device_description {
                    leaf_name.push_str(" :  ");
                    leaf_name.push_str(description);
                }

                let icon = if connection_info.connection_status == UsbConnectionStatus::NoDeviceConnected {
                    DeviceIcon::NoDeviceIcon
                } else if connection_info.current_configuration_value != 0 {
                    DeviceIcon::GoodDeviceIcon
                } else {
                    // connected but unconfigured
                    DeviceIcon::BadDeviceIcon
                };

                tree_parent.add_leaf(UsbTreeNode::new(
                    leaf_name,
                    icon,
                    UsbDeviceNodeInfo::Device(UsbDeviceInfo {
                        connection_info: Box::new(connection_info),
                        config_desc,
                        string_descs,
                    }),
                ));
            }
        }
    }

    //
    // variable-length name requests (two-phase: probe with the fixed header
    // size to learn the full length, then fetch sized exactly to it)
    //

    fn get_root_hub_name(&mut self, controller: &A::ControllerHandle) -> Result<String, EnumerateError> {
        let probe = self.api.get_root_hub_name(controller, CONTROLLER_NAME_REQUEST_HEADER_SIZE)?;
        let full = self.api.get_root_hub_name(controller, probe.actual_length_in_bytes)?;
        Ok(full.to_string_lossy())
    }

    fn get_hcd_driver_key_name(&mut self, controller: &A::ControllerHandle) -> Result<String, EnumerateError> {
        let probe = self.api.get_hcd_driver_key_name(controller, CONTROLLER_NAME_REQUEST_HEADER_SIZE)?;
        if probe.actual_length_in_bytes <= CONTROLLER_NAME_REQUEST_HEADER_SIZE {
            return Err(EnumerateError::InconsistentResponse(format!(
                "driver key name response declares {} bytes, not more than its {}-byte header",
                probe.actual_length_in_bytes, CONTROLLER_NAME_REQUEST_HEADER_SIZE
            )));
        }
        let full = self.api.get_hcd_driver_key_name(controller, probe.actual_length_in_bytes)?;
        Ok(full.to_string_lossy())
    }

    fn get_external_hub_name(&mut self, hub: &A::HubHandle, connection_index: u32) -> Result<String, EnumerateError> {
        let probe =
            self.api.get_node_connection_name(hub, connection_index, CONNECTION_NAME_REQUEST_HEADER_SIZE)?;
        if probe.actual_length_in_bytes <= CONNECTION_NAME_REQUEST_HEADER_SIZE {
            return Err(EnumerateError::InconsistentResponse(format!(
                "connection name response declares {} bytes, not more than its {}-byte header",
                probe.actual_length_in_bytes, CONNECTION_NAME_REQUEST_HEADER_SIZE
            )));
        }
        let full = self.api.get_node_connection_name(hub, connection_index, probe.actual_length_in_bytes)?;
        Ok(full.to_string_lossy())
    }

    fn get_driver_key_name(&mut self, hub: &A::HubHandle, connection_index: u32) -> Result<String, EnumerateError> {
        let probe = self.api.get_node_connection_driver_key_name(
            hub,
            connection_index,
            CONNECTION_NAME_REQUEST_HEADER_SIZE,
        )?;
        if probe.actual_length_in_bytes <= CONNECTION_NAME_REQUEST_HEADER_SIZE {
            return Err(EnumerateError::InconsistentResponse(format!(
                "driver key name response declares {} bytes, not more than its {}-byte header",
                probe.actual_length_in_bytes, CONNECTION_NAME_REQUEST_HEADER_SIZE
            )));
        }
        let full = self.api.get_node_connection_driver_key_name(
            hub,
            connection_index,
            probe.actual_length_in_bytes,
        )?;
        Ok(full.to_string_lossy())
    }

    //
    // descriptor fetching
    //

    /// Two-phase configuration descriptor fetch: probe with a request sized to
    /// exactly one configuration descriptor header, read the declared
    /// wTotalLength, then re-issue the request sized exactly to it. Any length
    /// inconsistency fails the fetch and retains no buffer.
    fn get_config_descriptor(
        &mut self,
        hub: &A::HubHandle,
        connection_index: u32,
        descriptor_index: u8,
    ) -> Result<Vec<u8>, EnumerateError> {
        let probe_length = USB_CONFIGURATION_DESCRIPTOR_SIZE as u16;
        let probe = self.api.get_descriptor_from_node_connection(
            hub,
            connection_index,
            USB_CONFIGURATION_DESCRIPTOR_TYPE,
            descriptor_index,
            0,
            probe_length,
        )?;

        if probe.len() != probe_length as usize {
            return Err(EnumerateError::InconsistentResponse(format!(
                "configuration descriptor probe returned {} bytes where {} were requested",
                probe.len(),
                probe_length
            )));
        }

        // probe.len() was checked above, so the header parse cannot fail
        let header = match UsbConfigurationDescriptor::from_bytes(&probe) {
            Some(header) => header,
            None => {
                return Err(EnumerateError::InconsistentResponse(
                    "configuration descriptor probe shorter than the fixed header".to_string(),
                ))
            }
        };

        if (header.total_length as usize) < USB_CONFIGURATION_DESCRIPTOR_SIZE {
            return Err(EnumerateError::InconsistentResponse(format!(
                "configuration descriptor declares wTotalLength {}, less than the fixed header size",
                header.total_length
            )));
        }

        let total_length = header.total_length;
        let full = self.api.get_descriptor_from_node_connection(
            hub,
            connection_index,
            USB_CONFIGURATION_DESCRIPTOR_TYPE,
            descriptor_index,
            0,
            total_length,
        )?;

        if full.len() != total_length as usize {
            return Err(EnumerateError::InconsistentResponse(format!(
                "configuration descriptor fetch returned {} bytes where {} were requested",
                full.len(),
                total_length
            )));
        }

        match UsbConfigurationDescriptor::from_bytes(&full) {
            Some(full_header) if full_header.total_length == total_length => Ok(full),
            _ => Err(EnumerateError::InconsistentResponse(format!(
                "configuration descriptor wTotalLength changed between fetches (was {})",
                total_length
            ))),
        }
    }

    /// Fetches one string descriptor in one language. Single-phase: a request
    /// sized to the protocol maximum always fits a string descriptor.
    fn get_string_descriptor(
        &mut self,
        hub: &A::HubHandle,
        connection_index: u32,
        descriptor_index: u8,
        language_id: u16,
    ) -> Result<StringDescriptorEntry, EnumerateError> {
        let buffer = self.api.get_descriptor_from_node_connection(
            hub,
            connection_index,
            USB_STRING_DESCRIPTOR_TYPE,
            descriptor_index,
            language_id,
            MAXIMUM_USB_STRING_LENGTH,
        )?;

        // sanity checks on a firmware-controlled response
        if buffer.len() < USB_COMMON_DESCRIPTOR_SIZE {
            return Err(EnumerateError::InconsistentResponse(
                "string descriptor response shorter than a descriptor header".to_string(),
            ));
        }
        if buffer[1] != USB_STRING_DESCRIPTOR_TYPE {
            return Err(EnumerateError::InconsistentResponse(format!(
                "string descriptor response carries descriptor type {:#04x}",
                buffer[1]
            )));
        }
        if buffer[0] as usize != buffer.len() {
            return Err(EnumerateError::InconsistentResponse(format!(
                "string descriptor declares bLength {} but {} bytes were returned",
                buffer[0],
                buffer.len()
            )));
        }
        if buffer[0] % 2 != 0 {
            return Err(EnumerateError::InconsistentResponse(format!(
                "string descriptor bLength {} is odd",
                buffer[0]
            )));
        }

        Ok(StringDescriptorEntry { descriptor_index, language_id, descriptor: buffer })
    }

    /// Fetches every string the device references: the supported-language list
    /// (string index 0) heads the table, then the device descriptor strings
    /// and the configuration/interface strings follow, each in every supported
    /// language. Returns None when the language list itself is unavailable, in
    /// which case no further string fetch is attempted.
    fn get_all_string_descriptors(
        &mut self,
        hub: &A::HubHandle,
        connection_index: u32,
        device_descriptor: &UsbDeviceDescriptor,
        config_desc: &[u8],
    ) -> Option<StringDescriptorTable> {
        let supported_languages = match self.get_string_descriptor(hub, connection_index, 0, 0) {
            Ok(entry) => entry,
            Err(error) => {
                debug!("port {}: supported-language list unavailable: {}", connection_index, error);
                return None;
            }
        };

        let language_ids = supported_languages.language_ids();

        let mut table = StringDescriptorTable::new();
        table.push(supported_languages);

        for descriptor_index in [
            device_descriptor.i_manufacturer,
            device_descriptor.i_product,
            device_descriptor.i_serial_number,
        ] {
            if descriptor_index != 0 {
                self.get_string_descriptors_for_index(
                    hub,
                    connection_index,
                    descriptor_index,
                    &language_ids,
                    &mut table,
                );
            }
        }

        let mut walker = DescriptorWalker::new(config_desc);
        while let Some((descriptor_type, descriptor)) = walker.next_descriptor() {
            match descriptor_type {
                USB_CONFIGURATION_DESCRIPTOR_TYPE => {
                    if descriptor.len() != USB_CONFIGURATION_DESCRIPTOR_SIZE {
                        // lenient: skip past the anomalous descriptor by its
                        // declared length and keep walking
                        warn!(
                            "port {}: configuration descriptor with anomalous declared length {}",
                            connection_index,
                            descriptor.len()
                        );
                        continue;
                    }
                    let i_configuration = descriptor[6];
                    if i_configuration != 0 {
                        self.get_string_descriptors_for_index(
                            hub,
                            connection_index,
                            i_configuration,
                            &language_ids,
                            &mut table,
                        );
                    }
                }
                USB_INTERFACE_DESCRIPTOR_TYPE => {
                    if descriptor.len() != USB_INTERFACE_DESCRIPTOR_SIZE
                        && descriptor.len() != USB_INTERFACE_DESCRIPTOR2_SIZE
                    {
                        warn!(
                            "port {}: interface descriptor with anomalous declared length {}",
                            connection_index,
                            descriptor.len()
                        );
                        continue;
                    }
                    let i_interface = descriptor[8];
                    if i_interface != 0 {
                        self.get_string_descriptors_for_index(
                            hub,
                            connection_index,
                            i_interface,
                            &language_ids,
                            &mut table,
                        );
                    }
                }
                _ => {
                    // unknown descriptor types are skipped by declared length
                }
            }
        }

        Some(table)
    }

    /// Fetches one string index in every supported language, appending each
    /// successful fetch to the table tail. A language that does not answer is
    /// skipped.
    fn get_string_descriptors_for_index(
        &mut self,
        hub: &A::HubHandle,
        connection_index: u32,
        descriptor_index: u8,
        language_ids: &[u16],
        table: &mut StringDescriptorTable,
    ) {
        for &language_id in language_ids {
            match self.get_string_descriptor(hub, connection_index, descriptor_index, language_id) {
                Ok(entry) => table.push(entry),
                Err(error) => {
                    debug!(
                        "port {}: string descriptor {} (language {:#06x}) unavailable: {}",
                        connection_index, descriptor_index, language_id, error
                    );
                }
            }
        }
    }
}

/// True when the device descriptor or any configuration/interface descriptor
/// within the configuration buffer references a string index.
fn are_there_string_descriptors(device_descriptor: &UsbDeviceDescriptor, config_desc: &[u8]) -> bool {
    if device_descriptor.i_manufacturer != 0
        || device_descriptor.i_product != 0
        || device_descriptor.i_serial_number != 0
    {
        return true;
    }

    let mut walker = DescriptorWalker::new(config_desc);
    while let Some((descriptor_type, descriptor)) = walker.next_descriptor() {
        match descriptor_type {
            USB_CONFIGURATION_DESCRIPTOR_TYPE => {
                if descriptor.len() != USB_CONFIGURATION_DESCRIPTOR_SIZE {
                    warn!("configuration descriptor with anomalous declared length {}", descriptor.len());
                    continue;
                }
                if descriptor[6] != 0 {
                    return true;
                }
            }
            USB_INTERFACE_DESCRIPTOR_TYPE => {
                if descriptor.len() != USB_INTERFACE_DESCRIPTOR_SIZE
                    && descriptor.len() != USB_INTERFACE_DESCRIPTOR2_SIZE
                {
                    warn!("interface descriptor with anomalous declared length {}", descriptor.len());
                    continue;
                }
                if descriptor[8] != 0 {
                    return true;
                }
            }
            _ => {}
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_info::{UsbDeviceSpeed, UsbNodeConnectionInfo};
    use crate::errors::{UsbOpenError, UsbRequestError};
    use crate::hub_info::{UsbHubCapabilities, UsbHubCapabilitiesEx, UsbHubDescriptor, UsbNodeInformation};
    use crate::usb_api::NameRequestResponse;
    use std::collections::HashMap;

    //
    // mock request executor
    //

    #[derive(Default)]
    struct MockController {
        driver_key: String,
        root_hub_name: Option<String>,
    }

    #[derive(Default)]
    struct MockPort {
        connection_info_ex: Option<UsbNodeConnectionInfoEx>,
        connection_info_legacy: Option<UsbNodeConnectionInfo>,
        driver_key: Option<String>,
        attached_hub_name: Option<String>,
        config_descriptor: Option<Vec<u8>>,
        string_descriptors: HashMap<(u8, u16), Vec<u8>>,
    }

    #[derive(Default)]
    struct MockHub {
        node_information: Option<UsbNodeInformation>,
        capabilities: Option<UsbHubCapabilities>,
        capabilities_ex: Option<UsbHubCapabilitiesEx>,
        ports: Vec<MockPort>,
    }

    #[derive(Default)]
    struct MockUsbApi {
        paths: HashMap<String, usize>,
        interface_paths: Vec<String>,
        controllers: Vec<MockController>,
        hubs: HashMap<String, MockHub>,
        device_descriptions: HashMap<String, String>,
        hardware_ids: HashMap<String, String>,
        extended_info_requests: Vec<(String, u32)>,
        legacy_info_requests: Vec<(String, u32)>,
        // (hub, port, descriptor_type, descriptor_index, language_id, requested_length)
        descriptor_requests: Vec<(String, u32, u8, u8, u16, u16)>,
    }
    //
    impl MockUsbApi {
        fn name_response(name: &str, header_size: u32, request_size: u32) -> NameRequestResponse {
            let mut full_name: Vec<u16> = name.encode_utf16().collect();
            full_name.push(0);
            let actual_length_in_bytes = header_size + (full_name.len() as u32) * 2;
            let available_units = (request_size.saturating_sub(header_size) / 2) as usize;
            full_name.truncate(available_units);
            NameRequestResponse { actual_length_in_bytes, name_utf16: full_name }
        }

        fn port(&self, hub: &str, connection_index: u32) -> Result<&MockPort, UsbRequestError> {
            self.hubs
                .get(hub)
                .and_then(|hub| hub.ports.get((connection_index - 1) as usize))
                .ok_or_else(|| UsbRequestError::RequestFailed("no such port".to_string()))
        }

        fn config_descriptor_request_count(&self) -> usize {
            self.descriptor_requests
                .iter()
                .filter(|request| request.2 == USB_CONFIGURATION_DESCRIPTOR_TYPE)
                .count()
        }

        fn string_descriptor_request_count(&self) -> usize {
            self.descriptor_requests
                .iter()
                .filter(|request| request.2 == USB_STRING_DESCRIPTOR_TYPE)
                .count()
        }
    }
    //
    impl UsbApi for MockUsbApi {
        type ControllerHandle = usize;
        type HubHandle = String;

        fn host_controller_device_paths(&mut self) -> Result<Vec<String>, UsbRequestError> {
            Ok(self.interface_paths.clone())
        }

        fn open_host_controller(&mut self, device_path: &str) -> Result<usize, UsbOpenError> {
            self.paths
                .get(device_path)
                .copied()
                .ok_or_else(|| UsbOpenError::DeviceNotFound(device_path.to_string()))
        }

        fn open_hub(&mut self, hub_name: &str) -> Result<String, UsbOpenError> {
            if self.hubs.contains_key(hub_name) {
                Ok(hub_name.to_string())
            } else {
                Err(UsbOpenError::DeviceNotFound(hub_name.to_string()))
            }
        }

        fn get_root_hub_name(
            &mut self,
            controller: &usize,
            request_size_in_bytes: u32,
        ) -> Result<NameRequestResponse, UsbRequestError> {
            match self.controllers[*controller].root_hub_name {
                Some(ref name) => Ok(MockUsbApi::name_response(
                    name,
                    CONTROLLER_NAME_REQUEST_HEADER_SIZE,
                    request_size_in_bytes,
                )),
                None => Err(UsbRequestError::RequestFailed("no root hub".to_string())),
            }
        }

        fn get_hcd_driver_key_name(
            &mut self,
            controller: &usize,
            request_size_in_bytes: u32,
        ) -> Result<NameRequestResponse, UsbRequestError> {
            let driver_key = self.controllers[*controller].driver_key.clone();
            Ok(MockUsbApi::name_response(
                &driver_key,
                CONTROLLER_NAME_REQUEST_HEADER_SIZE,
                request_size_in_bytes,
            ))
        }

        fn get_node_connection_name(
            &mut self,
            hub: &String,
            connection_index: u32,
            request_size_in_bytes: u32,
        ) -> Result<NameRequestResponse, UsbRequestError> {
            let name = self
                .port(hub, connection_index)?
                .attached_hub_name
                .clone()
                .ok_or_else(|| UsbRequestError::RequestFailed("no hub attached".to_string()))?;
            Ok(MockUsbApi::name_response(&name, CONNECTION_NAME_REQUEST_HEADER_SIZE, request_size_in_bytes))
        }

        fn get_node_connection_driver_key_name(
            &mut self,
            hub: &String,
            connection_index: u32,
            request_size_in_bytes: u32,
        ) -> Result<NameRequestResponse, UsbRequestError> {
            let driver_key = self
                .port(hub, connection_index)?
                .driver_key
                .clone()
                .ok_or_else(|| UsbRequestError::RequestFailed("no driver key".to_string()))?;
            Ok(MockUsbApi::name_response(
                &driver_key,
                CONNECTION_NAME_REQUEST_HEADER_SIZE,
                request_size_in_bytes,
            ))
        }

        fn get_node_information(&mut self, hub: &String) -> Result<UsbNodeInformation, UsbRequestError> {
            self.hubs
                .get(hub)
                .and_then(|hub| hub.node_information.clone())
                .ok_or_else(|| UsbRequestError::RequestFailed("node information unavailable".to_string()))
        }

        fn get_hub_capabilities(&mut self, hub: &String) -> Result<UsbHubCapabilities, UsbRequestError> {
            self.hubs
                .get(hub)
                .and_then(|hub| hub.capabilities)
                .ok_or(UsbRequestError::NotSupported)
        }

        fn get_hub_capabilities_ex(&mut self, hub: &String) -> Result<UsbHubCapabilitiesEx, UsbRequestError> {
            self.hubs
                .get(hub)
                .and_then(|hub| hub.capabilities_ex)
                .ok_or(UsbRequestError::NotSupported)
        }

        fn get_node_connection_info_ex(
            &mut self,
            hub: &String,
            connection_index: u32,
            _pipe_capacity: usize,
        ) -> Result<UsbNodeConnectionInfoEx, UsbRequestError> {
            self.extended_info_requests.push((hub.clone(), connection_index));
            self.port(hub, connection_index)?
                .connection_info_ex
                .clone()
                .ok_or(UsbRequestError::NotSupported)
        }

        fn get_node_connection_info(
            &mut self,
            hub: &String,
            connection_index: u32,
            _pipe_capacity: usize,
        ) -> Result<UsbNodeConnectionInfo, UsbRequestError> {
            self.legacy_info_requests.push((hub.clone(), connection_index));
            self.port(hub, connection_index)?
                .connection_info_legacy
                .clone()
                .ok_or_else(|| UsbRequestError::RequestFailed("connection info unavailable".to_string()))
        }

        fn get_descriptor_from_node_connection(
            &mut self,
            hub: &String,
            connection_index: u32,
            descriptor_type: u8,
            descriptor_index: u8,
            language_id: u16,
            requested_length: u16,
        ) -> Result<Vec<u8>, UsbRequestError> {
            self.descriptor_requests.push((
                hub.clone(),
                connection_index,
                descriptor_type,
                descriptor_index,
                language_id,
                requested_length,
            ));
            let port = self.port(hub, connection_index)?;
            match descriptor_type {
                USB_CONFIGURATION_DESCRIPTOR_TYPE => {
                    let full = port
                        .config_descriptor
                        .clone()
                        .ok_or_else(|| UsbRequestError::RequestFailed("descriptor request failed".to_string()))?;
                    let returned_length = full.len().min(requested_length as usize);
                    Ok(full[..returned_length].to_vec())
                }
                USB_STRING_DESCRIPTOR_TYPE => port
                    .string_descriptors
                    .get(&(descriptor_index, language_id))
                    .cloned()
                    .ok_or_else(|| UsbRequestError::RequestFailed("descriptor request failed".to_string())),
                _ => Err(UsbRequestError::RequestFailed("unsupported descriptor type".to_string())),
            }
        }

        fn device_description_for_driver_key(&mut self, driver_key: &str) -> Option<String> {
            self.device_descriptions.get(driver_key).cloned()
        }

        fn device_id_for_driver_key(&mut self, driver_key: &str) -> Option<String> {
            self.hardware_ids.get(driver_key).cloned()
        }
    }

    //
    // fixtures
    //

    const ROOT_HUB_NAME: &str = "USB#ROOT_HUB30";
    const CONTROLLER_DRIVER_KEY: &str = "{36fc9e60-c465-11cf-8056-444553540000}\\0000";

    fn node_information(number_of_ports: u8) -> UsbNodeInformation {
        UsbNodeInformation {
            hub_is_bus_powered: true,
            hub_descriptor: UsbHubDescriptor {
                descriptor_length: 9,
                descriptor_type: 0x29,
                number_of_ports,
                ..Default::default()
            },
        }
    }

    fn mock_hub(ports: Vec<MockPort>) -> MockHub {
        MockHub {
            node_information: Some(node_information(ports.len() as u8)),
            capabilities: Some(UsbHubCapabilities::default()),
            capabilities_ex: Some(UsbHubCapabilitiesEx::default()),
            ports,
        }
    }

    fn single_controller(root_hub: MockHub) -> MockUsbApi {
        let mut api = MockUsbApi::default();
        api.controllers.push(MockController {
            driver_key: CONTROLLER_DRIVER_KEY.to_string(),
            root_hub_name: Some(ROOT_HUB_NAME.to_string()),
        });
        api.paths.insert("\\\\.\\HCD0".to_string(), 0);
        api.hubs.insert(ROOT_HUB_NAME.to_string(), root_hub);
        api
    }

    fn device_descriptor(i_manufacturer: u8, i_product: u8, i_serial_number: u8) -> UsbDeviceDescriptor {
        UsbDeviceDescriptor {
            length: 18,
            descriptor_type: 0x01,
            bcd_usb: 0x0200,
            max_packet_size_0: 64,
            id_vendor: 0x046d,
            id_product: 0xc077,
            num_configurations: 1,
            i_manufacturer,
            i_product,
            i_serial_number,
            ..Default::default()
        }
    }

    // config(9) + interface(9) + endpoint(7): wTotalLength 25
    fn config_descriptor_bytes(i_configuration: u8, i_interface: u8) -> Vec<u8> {
        let mut buffer = vec![9, 2, 25, 0, 1, 1, i_configuration, 0x80, 50];
        buffer.extend_from_slice(&[9, 4, 0, 0, 1, 3, 1, 2, i_interface]);
        buffer.extend_from_slice(&[7, 5, 0x81, 0x03, 8, 0, 10]);
        buffer
    }

    fn string_descriptor_bytes(text: &str) -> Vec<u8> {
        let mut descriptor = vec![0u8, 0x03];
        for unit in text.encode_utf16() {
            descriptor.extend_from_slice(&unit.to_le_bytes());
        }
        descriptor[0] = descriptor.len() as u8;
        descriptor
    }

    fn language_list_bytes(language_ids: &[u16]) -> Vec<u8> {
        let mut descriptor = vec![0u8, 0x03];
        for language_id in language_ids {
            descriptor.extend_from_slice(&language_id.to_le_bytes());
        }
        descriptor[0] = descriptor.len() as u8;
        descriptor
    }

    fn connected_port(descriptor: UsbDeviceDescriptor, current_configuration_value: u8) -> MockPort {
        MockPort {
            connection_info_ex: Some(UsbNodeConnectionInfoEx {
                connection_index: 0, // filled in by the driver from the request
                device_descriptor: descriptor,
                current_configuration_value,
                speed: UsbDeviceSpeed::HighSpeed,
                device_is_hub: false,
                device_address: 1,
                number_of_open_pipes: 1,
                connection_status: UsbConnectionStatus::DeviceConnected,
                pipe_list: Vec::new(),
            }),
            ..Default::default()
        }
    }

    fn empty_port() -> MockPort {
        MockPort {
            connection_info_ex: Some(UsbNodeConnectionInfoEx {
                connection_status: UsbConnectionStatus::NoDeviceConnected,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn run(api: MockUsbApi) -> (Vec<UsbTreeNode>, EnumerationSession, MockUsbApi) {
        let mut session = EnumerationSession::new();
        let mut enumerator = UsbEnumerator::new(api);
        let tree = enumerator.enumerate_host_controllers(&mut session);
        (tree, session, enumerator.into_api())
    }

    fn root_hub_of(tree: &[UsbTreeNode]) -> &UsbTreeNode {
        assert_eq!(tree.len(), 1, "expected exactly one host controller");
        assert_eq!(tree[0].children.len(), 1, "expected exactly one root hub");
        &tree[0].children[0]
    }

    //
    // end-to-end scenarios
    //

    #[test]
    fn controller_with_no_attached_devices_yields_an_empty_root_hub() {
        let (tree, session, _) = run(single_controller(mock_hub(Vec::new())));

        let root_hub = root_hub_of(&tree);
        assert!(root_hub.children.is_empty());
        assert!(matches!(root_hub.info, UsbDeviceNodeInfo::RootHub(_)));
        assert_eq!(root_hub.leaf_name, "RootHub");
        assert_eq!(session.total_devices_connected(), 0);
        assert_eq!(session.total_hubs(), 0);
    }

    #[test]
    fn empty_port_yields_a_no_device_leaf_without_counting() {
        let (tree, session, _) = run(single_controller(mock_hub(vec![empty_port()])));

        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children.len(), 1);
        let port = &root_hub.children[0];
        assert_eq!(port.leaf_name, "[Port1] NoDeviceConnected");
        assert_eq!(port.icon, DeviceIcon::NoDeviceIcon);
        assert_eq!(session.total_devices_connected(), 0);
    }

    #[test]
    fn connected_device_without_strings_gets_exactly_the_declared_config_buffer() {
        let mut port = connected_port(device_descriptor(0, 0, 0), 1);
        port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        let (tree, session, api) = run(single_controller(mock_hub(vec![port])));

        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children.len(), 1);
        match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => {
                let config_desc = device.config_desc.as_ref().expect("configuration descriptor expected");
                assert_eq!(config_desc.len(), 25);
                assert!(device.string_descs.is_none());
            }
            ref other => panic!("expected a device node, got {:?}", other),
        }
        assert_eq!(root_hub.children[0].icon, DeviceIcon::GoodDeviceIcon);
        assert_eq!(session.total_devices_connected(), 1);
        // two-phase fetch: the probe sized to one header, then the exact fetch
        assert_eq!(api.config_descriptor_request_count(), 2);
        // no string index anywhere, so no string request was ever issued
        assert_eq!(api.string_descriptor_request_count(), 0);
    }

    #[test]
    fn hub_typed_port_recurses_exactly_once_with_the_port_context() {
        let mut port = connected_port(device_descriptor(1, 0, 0), 1);
        if let Some(ref mut info) = port.connection_info_ex {
            info.device_is_hub = true;
        }
        port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        port.string_descriptors.insert((0, 0), language_list_bytes(&[0x0409]));
        port.string_descriptors.insert((1, 0x0409), string_descriptor_bytes("Generic Hub"));
        port.attached_hub_name = Some("USB#EXT_HUB".to_string());

        let mut api = single_controller(mock_hub(vec![port]));
        api.hubs.insert("USB#EXT_HUB".to_string(), mock_hub(Vec::new()));
        let (tree, session, _) = run(api);

        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children.len(), 1);
        let external_hub = &root_hub.children[0];
        assert_eq!(external_hub.icon, DeviceIcon::HubIcon);
        match external_hub.info {
            UsbDeviceNodeInfo::ExternalHub(ref info) => {
                // the port's records travel into the new hub's construction
                assert_eq!(info.hub_name, "USB#EXT_HUB");
                assert_eq!(info.connection_info.connection_status, UsbConnectionStatus::DeviceConnected);
                assert!(info.connection_info.device_is_hub);
                assert_eq!(info.config_desc.as_ref().map(Vec::len), Some(25));
                let string_descs = info.string_descs.as_ref().expect("string table expected");
                assert_eq!(string_descs.len(), 2); // language list + manufacturer
            }
            ref other => panic!("expected an external hub node, got {:?}", other),
        }
        assert!(external_hub.children.is_empty());
        assert_eq!(session.total_hubs(), 1);
        assert_eq!(session.total_devices_connected(), 1);
    }

    #[test]
    fn unsupported_extended_query_falls_back_to_the_legacy_shape_once() {
        let port = MockPort {
            connection_info_ex: None, // extended request form rejected
            connection_info_legacy: Some(UsbNodeConnectionInfo {
                connection_index: 1,
                device_descriptor: device_descriptor(0, 0, 0),
                current_configuration_value: 1,
                low_speed: true,
                device_is_hub: false,
                device_address: 2,
                number_of_open_pipes: 1,
                connection_status: UsbConnectionStatus::DeviceConnected,
                pipe_list: Vec::new(),
            }),
            config_descriptor: Some(config_descriptor_bytes(0, 0)),
            ..Default::default()
        };
        let (tree, _, api) = run(single_controller(mock_hub(vec![port])));

        assert_eq!(api.extended_info_requests, vec![(ROOT_HUB_NAME.to_string(), 1)]);
        assert_eq!(api.legacy_info_requests, vec![(ROOT_HUB_NAME.to_string(), 1)]);

        let root_hub = root_hub_of(&tree);
        match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => {
                assert_eq!(device.connection_info.speed, UsbDeviceSpeed::LowSpeed);
                assert_eq!(device.connection_info.device_address, 2);
            }
            ref other => panic!("expected a device node, got {:?}", other),
        }
    }

    #[test]
    fn failed_port_is_skipped_without_aborting_its_siblings() {
        // port 1 answers neither request shape; port 2 is fine
        let dead_port = MockPort::default();
        let (tree, session, api) =
            run(single_controller(mock_hub(vec![dead_port, empty_port()])));

        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children.len(), 1);
        assert_eq!(root_hub.children[0].leaf_name, "[Port2] NoDeviceConnected");
        assert_eq!(session.total_devices_connected(), 0);
        assert_eq!(api.extended_info_requests.len(), 2);
    }

    #[test]
    fn every_port_is_queried_once_in_order() {
        let ports = vec![empty_port(), empty_port(), empty_port()];
        let (_, _, api) = run(single_controller(mock_hub(ports)));

        let expected: Vec<(String, u32)> =
            (1..=3).map(|index| (ROOT_HUB_NAME.to_string(), index)).collect();
        assert_eq!(api.extended_info_requests, expected);
    }

    #[test]
    fn duplicate_controller_identity_is_enumerated_once() {
        let mut api = single_controller(mock_hub(Vec::new()));
        // the same physical controller, reachable through the class-discovery path too
        let interface_path = "\\\\?\\usb#hc_xhci".to_string();
        api.paths.insert(interface_path.clone(), 0);
        api.interface_paths.push(interface_path);

        let (tree, session, _) = run(api);
        assert_eq!(tree.len(), 1);
        assert_eq!(session.enumerated_host_controller_count(), 1);
    }

    #[test]
    fn controller_pci_identity_is_parsed_from_the_hardware_id() {
        let mut api = single_controller(mock_hub(Vec::new()));
        api.hardware_ids.insert(
            CONTROLLER_DRIVER_KEY.to_string(),
            "PCI\\VEN_8086&DEV_1E31&SUBSYS_05A4105B&REV_04".to_string(),
        );
        api.device_descriptions
            .insert(CONTROLLER_DRIVER_KEY.to_string(), "Intel(R) USB 3.0 eXtensible Host Controller".to_string());

        let (tree, _, _) = run(api);
        assert_eq!(tree[0].leaf_name, "Intel(R) USB 3.0 eXtensible Host Controller");
        match tree[0].info {
            UsbDeviceNodeInfo::HostController(ref info) => {
                assert_eq!(info.driver_key, CONTROLLER_DRIVER_KEY);
                assert_eq!(info.vendor_id, Some(0x8086));
                assert_eq!(info.device_id, Some(0x1E31));
                assert_eq!(info.sub_sys_id, Some(0x05A4105B));
                assert_eq!(info.revision, Some(0x04));
            }
            ref other => panic!("expected a host controller node, got {:?}", other),
        }
    }

    #[test]
    fn config_probe_with_undersized_total_length_skips_phase_two() {
        let mut port = connected_port(device_descriptor(0, 0, 0), 1);
        // header declares wTotalLength 5, less than the fixed header size
        port.config_descriptor = Some(vec![9, 2, 5, 0, 1, 1, 0, 0x80, 50]);
        let (tree, _, api) = run(single_controller(mock_hub(vec![port])));

        assert_eq!(api.config_descriptor_request_count(), 1);
        let root_hub = root_hub_of(&tree);
        match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => assert!(device.config_desc.is_none()),
            ref other => panic!("expected a device node, got {:?}", other),
        }
    }

    #[test]
    fn config_fetch_shorter_than_declared_retains_no_buffer() {
        let mut port = connected_port(device_descriptor(0, 0, 0), 1);
        // declares 25 bytes but the device only ever produces 20
        let mut truncated = config_descriptor_bytes(0, 0);
        truncated.truncate(20);
        port.config_descriptor = Some(truncated);
        let (tree, _, api) = run(single_controller(mock_hub(vec![port])));

        assert_eq!(api.config_descriptor_request_count(), 2);
        let root_hub = root_hub_of(&tree);
        match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => assert!(device.config_desc.is_none()),
            ref other => panic!("expected a device node, got {:?}", other),
        }
    }

    #[test]
    fn string_table_covers_every_index_in_every_language_in_discovery_order() {
        let mut port = connected_port(device_descriptor(1, 2, 0), 1);
        port.config_descriptor = Some(config_descriptor_bytes(4, 5));
        port.string_descriptors.insert((0, 0), language_list_bytes(&[0x0409, 0x0407]));
        for index in [1u8, 2, 4, 5] {
            port.string_descriptors.insert((index, 0x0409), string_descriptor_bytes("english"));
            port.string_descriptors.insert((index, 0x0407), string_descriptor_bytes("deutsch"));
        }
        let (tree, _, _) = run(single_controller(mock_hub(vec![port])));

        let root_hub = root_hub_of(&tree);
        let string_descs = match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => {
                device.string_descs.as_ref().expect("string table expected")
            }
            ref other => panic!("expected a device node, got {:?}", other),
        };

        assert_eq!(string_descs.supported_language_ids(), vec![0x0409, 0x0407]);
        // language list, then indices 1, 2 (device), 4 (configuration), 5 (interface), two languages each
        let order: Vec<(u8, u16)> = string_descs
            .entries()
            .iter()
            .map(|entry| (entry.descriptor_index, entry.language_id))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, 0),
                (1, 0x0409),
                (1, 0x0407),
                (2, 0x0409),
                (2, 0x0407),
                (4, 0x0409),
                (4, 0x0407),
                (5, 0x0409),
                (5, 0x0407),
            ]
        );
        assert_eq!(string_descs.entries()[1].text(), "english");
    }

    #[test]
    fn missing_language_list_skips_all_string_fetches() {
        let mut port = connected_port(device_descriptor(1, 2, 3), 1);
        port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        // no (0, 0) entry: the language list request fails
        port.string_descriptors.insert((1, 0x0409), string_descriptor_bytes("orphan"));
        let (tree, _, api) = run(single_controller(mock_hub(vec![port])));

        // only the index-0 attempt was issued
        assert_eq!(api.string_descriptor_request_count(), 1);
        let root_hub = root_hub_of(&tree);
        match root_hub.children[0].info {
            UsbDeviceNodeInfo::Device(ref device) => assert!(device.string_descs.is_none()),
            ref other => panic!("expected a device node, got {:?}", other),
        }
    }

    #[test]
    fn device_leaf_label_carries_port_status_and_description() {
        let mut port = connected_port(device_descriptor(0, 0, 0), 1);
        port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        port.driver_key = Some("usb\\vid_046d&pid_c077\\0001".to_string());
        let mut api = single_controller(mock_hub(vec![port]));
        api.device_descriptions
            .insert("usb\\vid_046d&pid_c077\\0001".to_string(), "USB Optical Mouse".to_string());

        let (tree, _, _) = run(api);
        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children[0].leaf_name, "[Port1] DeviceConnected :  USB Optical Mouse");
    }

    #[test]
    fn connected_but_unconfigured_device_gets_the_bad_device_icon() {
        let mut port = connected_port(device_descriptor(0, 0, 0), 0);
        port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        let (tree, _, _) = run(single_controller(mock_hub(vec![port])));

        let root_hub = root_hub_of(&tree);
        assert_eq!(root_hub.children[0].icon, DeviceIcon::BadDeviceIcon);
    }

    #[test]
    fn hub_without_node_information_loses_only_its_subtree() {
        let mut api = single_controller(MockHub {
            node_information: None, // mandatory query fails
            capabilities: None,
            capabilities_ex: None,
            ports: Vec::new(),
        });
        // a second, healthy controller must still enumerate fully
        api.controllers.push(MockController {
            driver_key: "{36fc9e60-c465-11cf-8056-444553540000}\\0001".to_string(),
            root_hub_name: Some("USB#ROOT_HUB31".to_string()),
        });
        api.paths.insert("\\\\.\\HCD1".to_string(), 1);
        api.hubs.insert("USB#ROOT_HUB31".to_string(), mock_hub(vec![empty_port()]));

        let (tree, session, _) = run(api);
        assert_eq!(tree.len(), 2);
        assert!(tree[0].children.is_empty());
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(session.enumerated_host_controller_count(), 2);
    }

    #[test]
    fn hub_capability_failures_downgrade_to_absent() {
        let mut hub = mock_hub(Vec::new());
        hub.capabilities = None;
        hub.capabilities_ex = None;
        let (tree, _, _) = run(single_controller(hub));

        let root_hub = root_hub_of(&tree);
        match root_hub.info {
            UsbDeviceNodeInfo::RootHub(ref info) => {
                assert!(info.hub_caps.is_none());
                assert!(info.hub_caps_ex.is_none());
            }
            ref other => panic!("expected a root hub node, got {:?}", other),
        }
    }

    #[test]
    fn unopenable_child_hub_costs_only_its_own_subtree() {
        let mut hub_port = connected_port(device_descriptor(0, 0, 0), 1);
        if let Some(ref mut info) = hub_port.connection_info_ex {
            info.device_is_hub = true;
        }
        hub_port.config_descriptor = Some(config_descriptor_bytes(0, 0));
        hub_port.attached_hub_name = Some("USB#VANISHED_HUB".to_string());
        // "USB#VANISHED_HUB" is deliberately not registered: the open fails

        let (tree, session, _) =
            run(single_controller(mock_hub(vec![hub_port, empty_port()])));

        let root_hub = root_hub_of(&tree);
        // the failed hub contributed no node; the sibling port still did
        assert_eq!(root_hub.children.len(), 1);
        assert_eq!(root_hub.children[0].leaf_name, "[Port2] NoDeviceConnected");
        assert_eq!(session.total_hubs(), 1);
        assert_eq!(session.total_devices_connected(), 1);
    }

    #[test]
    fn lenient_walk_still_finds_strings_past_a_malformed_descriptor() {
        // configuration header with a wrong declared length (10), followed by a
        // well-formed interface descriptor referencing string index 5
        let mut buffer = vec![10u8, 2, 26, 0, 1, 1, 0, 0x80, 50, 0];
        buffer.extend_from_slice(&[9, 4, 0, 0, 1, 3, 1, 2, 5]);
        buffer.extend_from_slice(&[7, 5, 0x81, 0x03, 8, 0, 10]);

        assert!(are_there_string_descriptors(&device_descriptor(0, 0, 0), &buffer));
    }
}
