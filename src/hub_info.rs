// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

/// The fixed fields of a hub descriptor, as carried in the node information
/// record. bRemoveAndPowerMask is deliberately not modeled; nothing in the
/// topology view consumes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbHubDescriptor {
    pub descriptor_length: u8,
    pub descriptor_type: u8,
    pub number_of_ports: u8,
    pub hub_characteristics: u16,
    pub power_on_to_power_good: u8,
    pub hub_control_current: u8,
}

/// Node information for a hub: the mandatory record every hub must answer.
/// Its port count drives the port enumeration loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbNodeInformation {
    pub hub_is_bus_powered: bool,
    pub hub_descriptor: UsbHubDescriptor,
}

/// Hub capabilities record. Optional: a hub that does not answer this request
/// is recorded with the capabilities absent rather than failing enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsbHubCapabilities {
    pub hub_is_2x_capable: bool,
}

/// Extended hub capabilities record. Absent (not an error) on older systems
/// whose driver stacks predate the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsbHubCapabilitiesEx {
    pub hub_is_high_speed_capable: bool,
    pub hub_is_high_speed: bool,
    pub hub_is_multi_tt_capable: bool,
    pub hub_is_multi_tt: bool,
    pub hub_is_root: bool,
    pub hub_is_armed_wake_on_connect: bool,
    pub hub_is_bus_powered: bool,
}
