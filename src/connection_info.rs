// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::usb_descriptors::UsbDeviceDescriptor;
use std::fmt;

// Endpoint numbers are 0-15. Endpoint number 0 is the standard control endpoint
// which is not explicitly listed in the configuration descriptor. There can be
// an IN endpoint and an OUT endpoint at endpoint numbers 1-15, so there can be
// a maximum of 30 pipes per device configuration.
pub const MAXIMUM_PIPES_PER_CONNECTION: usize = 30;

/// Connection state of a downstream hub port.
///
/// Only DeviceConnected guarantees that the connection info record carries a
/// valid device descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsbConnectionStatus {
    #[default]
    NoDeviceConnected,
    DeviceConnected,
    DeviceFailedEnumeration,
    DeviceGeneralFailure,
    DeviceCausedOvercurrent,
    DeviceNotEnoughPower,
}
//
impl UsbConnectionStatus {
    pub fn from_raw(value: u32) -> Option<UsbConnectionStatus> {
        match value {
            0 => Some(UsbConnectionStatus::NoDeviceConnected),
            1 => Some(UsbConnectionStatus::DeviceConnected),
            2 => Some(UsbConnectionStatus::DeviceFailedEnumeration),
            3 => Some(UsbConnectionStatus::DeviceGeneralFailure),
            4 => Some(UsbConnectionStatus::DeviceCausedOvercurrent),
            5 => Some(UsbConnectionStatus::DeviceNotEnoughPower),
            _ => None,
        }
    }
}
//
impl fmt::Display for UsbConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let as_str = match self {
            UsbConnectionStatus::NoDeviceConnected => "NoDeviceConnected",
            UsbConnectionStatus::DeviceConnected => "DeviceConnected",
            UsbConnectionStatus::DeviceFailedEnumeration => "DeviceFailedEnumeration",
            UsbConnectionStatus::DeviceGeneralFailure => "DeviceGeneralFailure",
            UsbConnectionStatus::DeviceCausedOvercurrent => "DeviceCausedOvercurrent",
            UsbConnectionStatus::DeviceNotEnoughPower => "DeviceNotEnoughPower",
        };
        f.write_str(as_str)
    }
}

/// Bus speed of an attached device, as reported by the extended per-port
/// connection info request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsbDeviceSpeed {
    LowSpeed,
    #[default]
    FullSpeed,
    HighSpeed,
    SuperSpeed,
}

/// One open pipe on an attached device: the endpoint descriptor fields plus the
/// schedule offset reported by the hub driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbPipeInfo {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
    pub schedule_offset: u32,
}

/// Per-port connection info in the extended request shape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbNodeConnectionInfoEx {
    // 1-based index of the port on its hub
    pub connection_index: u32,
    pub device_descriptor: UsbDeviceDescriptor,
    pub current_configuration_value: u8,
    pub speed: UsbDeviceSpeed,
    pub device_is_hub: bool,
    pub device_address: u16,
    pub number_of_open_pipes: u32,
    pub connection_status: UsbConnectionStatus,
    pub pipe_list: Vec<UsbPipeInfo>,
}

/// Per-port connection info in the legacy request shape; older driver stacks
/// only implement this form. It reports a low-speed boolean where the extended
/// shape reports a speed enumeration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbNodeConnectionInfo {
    pub connection_index: u32,
    pub device_descriptor: UsbDeviceDescriptor,
    pub current_configuration_value: u8,
    pub low_speed: bool,
    pub device_is_hub: bool,
    pub device_address: u16,
    pub number_of_open_pipes: u32,
    pub connection_status: UsbConnectionStatus,
    pub pipe_list: Vec<UsbPipeInfo>,
}
//
impl From<UsbNodeConnectionInfo> for UsbNodeConnectionInfoEx {
    /// Maps the legacy record into the extended record shape field-by-field.
    ///
    /// NOTE: the legacy low-speed boolean can only distinguish low speed from
    /// full speed; a high-speed or super-speed device reached through this
    /// fallback is reported as full speed. This is an inherent limitation of
    /// the legacy request shape, reproduced faithfully.
    fn from(item: UsbNodeConnectionInfo) -> UsbNodeConnectionInfoEx {
        UsbNodeConnectionInfoEx {
            connection_index: item.connection_index,
            device_descriptor: item.device_descriptor,
            current_configuration_value: item.current_configuration_value,
            speed: if item.low_speed { UsbDeviceSpeed::LowSpeed } else { UsbDeviceSpeed::FullSpeed },
            device_is_hub: item.device_is_hub,
            device_address: item.device_address,
            number_of_open_pipes: item.number_of_open_pipes,
            connection_status: item.connection_status,
            pipe_list: item.pipe_list,
        }
    }
}
