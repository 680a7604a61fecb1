// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

// USB descriptor type tags (the high byte of wValue in a GET_DESCRIPTOR setup packet)
pub const USB_DEVICE_DESCRIPTOR_TYPE: u8 = 0x01;
pub const USB_CONFIGURATION_DESCRIPTOR_TYPE: u8 = 0x02;
pub const USB_STRING_DESCRIPTOR_TYPE: u8 = 0x03;
pub const USB_INTERFACE_DESCRIPTOR_TYPE: u8 = 0x04;
pub const USB_ENDPOINT_DESCRIPTOR_TYPE: u8 = 0x05;

// every descriptor starts with a {bLength, bDescriptorType} header
pub const USB_COMMON_DESCRIPTOR_SIZE: usize = 2;
pub const USB_DEVICE_DESCRIPTOR_SIZE: usize = 18;
pub const USB_CONFIGURATION_DESCRIPTOR_SIZE: usize = 9;
pub const USB_INTERFACE_DESCRIPTOR_SIZE: usize = 9;
// alternate interface descriptor shape with a trailing wNumClasses field
pub const USB_INTERFACE_DESCRIPTOR2_SIZE: usize = 11;
pub const USB_ENDPOINT_DESCRIPTOR_SIZE: usize = 7;

// a string descriptor can never exceed one byte's worth of length, so a request
// sized to the protocol maximum is always sufficient in a single phase
pub const MAXIMUM_USB_STRING_LENGTH: u16 = 255;

pub(crate) fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

/// The standard 18-byte USB device descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsbDeviceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub max_packet_size_0: u8,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    // string descriptor indices; zero means "no string"
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub num_configurations: u8,
}
//
impl UsbDeviceDescriptor {
    pub fn from_bytes(buffer: &[u8]) -> Option<UsbDeviceDescriptor> {
        if buffer.len() < USB_DEVICE_DESCRIPTOR_SIZE {
            return None;
        }

        Some(UsbDeviceDescriptor {
            length: buffer[0],
            descriptor_type: buffer[1],
            bcd_usb: read_u16_le(buffer, 2),
            device_class: buffer[4],
            device_sub_class: buffer[5],
            device_protocol: buffer[6],
            max_packet_size_0: buffer[7],
            id_vendor: read_u16_le(buffer, 8),
            id_product: read_u16_le(buffer, 10),
            bcd_device: read_u16_le(buffer, 12),
            i_manufacturer: buffer[14],
            i_product: buffer[15],
            i_serial_number: buffer[16],
            num_configurations: buffer[17],
        })
    }
}

/// The fixed 9-byte header of a configuration descriptor; the full configuration
/// payload (interface, endpoint and class descriptors) follows it in the same
/// buffer, wTotalLength bytes in all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbConfigurationDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub i_configuration: u8,
    pub attributes: u8,
    pub max_power: u8,
}
//
impl UsbConfigurationDescriptor {
    pub fn from_bytes(buffer: &[u8]) -> Option<UsbConfigurationDescriptor> {
        if buffer.len() < USB_CONFIGURATION_DESCRIPTOR_SIZE {
            return None;
        }

        Some(UsbConfigurationDescriptor {
            length: buffer[0],
            descriptor_type: buffer[1],
            total_length: read_u16_le(buffer, 2),
            num_interfaces: buffer[4],
            configuration_value: buffer[5],
            i_configuration: buffer[6],
            attributes: buffer[7],
            max_power: buffer[8],
        })
    }
}

/// The fixed 9-byte interface descriptor (the 11-byte alternate shape shares the
/// same leading fields; iInterface sits at the same offset in both).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbInterfaceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_sub_class: u8,
    pub interface_protocol: u8,
    pub i_interface: u8,
}
//
impl UsbInterfaceDescriptor {
    pub fn from_bytes(buffer: &[u8]) -> Option<UsbInterfaceDescriptor> {
        if buffer.len() < USB_INTERFACE_DESCRIPTOR_SIZE {
            return None;
        }

        Some(UsbInterfaceDescriptor {
            length: buffer[0],
            descriptor_type: buffer[1],
            interface_number: buffer[2],
            alternate_setting: buffer[3],
            num_endpoints: buffer[4],
            interface_class: buffer[5],
            interface_sub_class: buffer[6],
            interface_protocol: buffer[7],
            i_interface: buffer[8],
        })
    }
}

/// Walks the sequence of {bLength, bDescriptorType}-headed descriptors packed
/// into a configuration descriptor buffer.
///
/// Every step is bound-checked against firmware-controlled length fields: the
/// walk stops when the next common header would cross the end of the buffer,
/// when a descriptor's declared length would cross the end of the buffer, or
/// when a declared length is too small to advance the cursor. A known-type
/// descriptor with an unexpected declared length is the caller's concern; the
/// walker hands back the declared slice either way.
pub struct DescriptorWalker<'a> {
    buffer: &'a [u8],
    offset: usize,
}
//
impl<'a> DescriptorWalker<'a> {
    pub fn new(buffer: &'a [u8]) -> DescriptorWalker<'a> {
        DescriptorWalker { buffer, offset: 0 }
    }

    /// Returns the next descriptor as (descriptor_type, descriptor_bytes), or
    /// None once the walk reaches (or cannot safely reach) the buffer end.
    pub fn next_descriptor(&mut self) -> Option<(u8, &'a [u8])> {
        if self.offset + USB_COMMON_DESCRIPTOR_SIZE >= self.buffer.len() {
            return None;
        }

        let declared_length = self.buffer[self.offset] as usize;
        let descriptor_type = self.buffer[self.offset + 1];

        if declared_length < USB_COMMON_DESCRIPTOR_SIZE {
            // a declared length this small can never advance the cursor
            return None;
        }
        if self.offset + declared_length > self.buffer.len() {
            return None;
        }

        let descriptor = &self.buffer[self.offset..self.offset + declared_length];
        self.offset += declared_length;

        Some((descriptor_type, descriptor))
    }
}
