// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::usb_device_node_info::UsbDeviceNodeInfo;
use crate::usb_tree::UsbTreeNode;
use std::collections::HashSet;

/// Shared state for one enumeration pass: the set of host controller
/// identities already enumerated plus the two running counters.
///
/// The same physical controller can be reached both through a legacy numbered
/// path and through the device-interface-class path, so controllers are
/// deduplicated on driver-key identity, not on device path. All access is
/// single-threaded; the session is created empty at the start of a pass and
/// cleared when the presentation tree is torn down.
#[derive(Debug, Default)]
pub struct EnumerationSession {
    enumerated_host_controllers: HashSet<String>,
    total_devices_connected: u32,
    total_hubs: u32,
}
//
impl EnumerationSession {
    pub fn new() -> EnumerationSession {
        EnumerationSession::default()
    }

    /// Zeroes the counters at the start of an enumeration pass. The
    /// enumerated-controller set deliberately survives between passes; entries
    /// leave it only when their tree nodes are cleaned up.
    pub fn begin_pass(&mut self) {
        self.total_devices_connected = 0;
        self.total_hubs = 0;
    }

    pub fn host_controller_already_enumerated(&self, driver_key: &str) -> bool {
        self.enumerated_host_controllers.contains(driver_key)
    }

    pub fn register_host_controller(&mut self, driver_key: &str) {
        self.enumerated_host_controllers.insert(driver_key.to_string());
    }

    pub fn enumerated_host_controller_count(&self) -> usize {
        self.enumerated_host_controllers.len()
    }

    pub fn record_connected_device(&mut self) {
        self.total_devices_connected += 1;
    }

    pub fn record_hub(&mut self) {
        self.total_hubs += 1;
    }

    /// Count of ports observed with a device connected during the last pass.
    pub fn total_devices_connected(&self) -> u32 {
        self.total_devices_connected
    }

    /// Count of ports observed with a hub attached during the last pass.
    pub fn total_hubs(&self) -> u32 {
        self.total_hubs
    }

    /// Disposes a tree entry removed from the presentation tree, children
    /// included. Host controller entries are removed from the enumerated set
    /// before their identity string is released; every other owned buffer is
    /// released by the drop at the end of the walk. Each node must pass
    /// through here exactly once, driven by presentation-tree removal.
    pub fn cleanup_item(&mut self, item: UsbTreeNode) {
        if let UsbDeviceNodeInfo::HostController(ref host_controller_info) = item.info {
            self.enumerated_host_controllers.remove(&host_controller_info.driver_key);
        }

        for child in item.children {
            self.cleanup_item(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_device_node_info::{DeviceIcon, UsbHostControllerInfo};

    fn host_controller_node(driver_key: &str) -> UsbTreeNode {
        UsbTreeNode::new(
            driver_key.to_string(),
            DeviceIcon::GoodDeviceIcon,
            UsbDeviceNodeInfo::HostController(UsbHostControllerInfo {
                driver_key: driver_key.to_string(),
                vendor_id: None,
                device_id: None,
                sub_sys_id: None,
                revision: None,
            }),
        )
    }

    #[test]
    fn cleanup_removes_host_controller_identity_from_the_set() {
        let mut session = EnumerationSession::new();
        session.register_host_controller("usb\\hc0");
        assert!(session.host_controller_already_enumerated("usb\\hc0"));

        session.cleanup_item(host_controller_node("usb\\hc0"));
        assert!(!session.host_controller_already_enumerated("usb\\hc0"));
    }

    #[test]
    fn begin_pass_zeroes_counters_but_keeps_the_controller_set() {
        let mut session = EnumerationSession::new();
        session.register_host_controller("usb\\hc0");
        session.record_connected_device();
        session.record_hub();

        session.begin_pass();
        assert_eq!(session.total_devices_connected(), 0);
        assert_eq!(session.total_hubs(), 0);
        assert!(session.host_controller_already_enumerated("usb\\hc0"));
    }
}
