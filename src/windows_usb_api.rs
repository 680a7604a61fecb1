// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use crate::connection_info::{
    UsbConnectionStatus,
    UsbDeviceSpeed,
    UsbNodeConnectionInfo,
    UsbNodeConnectionInfoEx,
    UsbPipeInfo,
};
use crate::errors::{
    UsbOpenError,
    UsbRequestError,
};
use crate::hub_info::{
    UsbHubCapabilities,
    UsbHubCapabilitiesEx,
    UsbHubDescriptor,
    UsbNodeInformation,
};
use crate::usb_api::{
    NameRequestResponse,
    UsbApi,
};
use crate::usb_descriptors::UsbDeviceDescriptor;
use windows_sys::{
    core::GUID,
    Win32::Devices::DeviceAndDriverInstallation::{
        HDEVINFO,
        SP_DEVICE_INTERFACE_DATA,
        SP_DEVICE_INTERFACE_DETAIL_DATA_W,
        SP_DEVINFO_DATA,
        SPDRP_DEVICEDESC,
        SPDRP_DRIVER,
        SPDRP_HARDWAREID,
        DIGCF_ALLCLASSES,
        DIGCF_DEVICEINTERFACE,
        DIGCF_PRESENT,
        SetupDiDestroyDeviceInfoList,
        SetupDiEnumDeviceInfo,
        SetupDiEnumDeviceInterfaces,
        SetupDiGetClassDevsW,
        SetupDiGetDeviceInterfaceDetailW,
        SetupDiGetDeviceRegistryPropertyW,
    },
    Win32::Devices::Usb::{
        GUID_DEVINTERFACE_USB_HOST_CONTROLLER,
        IOCTL_GET_HCD_DRIVERKEY_NAME,
        IOCTL_USB_GET_DESCRIPTOR_FROM_NODE_CONNECTION,
        IOCTL_USB_GET_HUB_CAPABILITIES,
        IOCTL_USB_GET_HUB_CAPABILITIES_EX,
        IOCTL_USB_GET_NODE_CONNECTION_DRIVERKEY_NAME,
        IOCTL_USB_GET_NODE_CONNECTION_INFORMATION,
        IOCTL_USB_GET_NODE_CONNECTION_INFORMATION_EX,
        IOCTL_USB_GET_NODE_CONNECTION_NAME,
        IOCTL_USB_GET_NODE_INFORMATION,
        IOCTL_USB_GET_ROOT_HUB_NAME,
    },
    Win32::Foundation::{
        CloseHandle,
        GetLastError,
        ERROR_ACCESS_DENIED,
        ERROR_FILE_NOT_FOUND,
        ERROR_INSUFFICIENT_BUFFER,
        ERROR_INVALID_FUNCTION,
        ERROR_INVALID_PARAMETER,
        ERROR_NOT_SUPPORTED,
        ERROR_NO_MORE_ITEMS,
        ERROR_PATH_NOT_FOUND,
        GENERIC_WRITE,
        HANDLE,
        INVALID_HANDLE_VALUE,
    },
    Win32::Storage::FileSystem::{
        CreateFileW,
        FILE_SHARE_WRITE,
        OPEN_EXISTING,
    },
    Win32::System::IO::DeviceIoControl,
};

// wire offsets within the USB_NODE_CONNECTION_INFORMATION(_EX) records; the
// device descriptor is packed, the fields after it are naturally aligned
const CONNECTION_INFO_DEVICE_DESCRIPTOR_OFFSET: usize = 4;
const CONNECTION_INFO_CURRENT_CONFIGURATION_OFFSET: usize = 22;
const CONNECTION_INFO_SPEED_OFFSET: usize = 23; // LowSpeed boolean in the legacy record shape
const CONNECTION_INFO_DEVICE_IS_HUB_OFFSET: usize = 24;
const CONNECTION_INFO_DEVICE_ADDRESS_OFFSET: usize = 26;
const CONNECTION_INFO_NUMBER_OF_OPEN_PIPES_OFFSET: usize = 28;
const CONNECTION_INFO_CONNECTION_STATUS_OFFSET: usize = 32;
const CONNECTION_INFO_PIPE_LIST_OFFSET: usize = 36;
// USB_PIPE_INFO: a packed 7-byte endpoint descriptor, then a padded ULONG ScheduleOffset
const PIPE_INFO_SIZE: usize = 12;
const PIPE_INFO_SCHEDULE_OFFSET_OFFSET: usize = 8;

// USB_NODE_INFORMATION: ULONG NodeType, then the packed 71-byte hub descriptor
// (whose tail is the 64-byte remove-and-power mask), then BOOLEAN HubIsBusPowered
const NODE_INFORMATION_HUB_DESCRIPTOR_OFFSET: usize = 4;
const NODE_INFORMATION_HUB_IS_BUS_POWERED_OFFSET: usize = 75;
const NODE_INFORMATION_SIZE: usize = 80;

// USB_DESCRIPTOR_REQUEST: ULONG ConnectionIndex, an 8-byte setup packet, then the data region.
// The hub driver fills in bmRequestType/bRequest itself; only wValue, wIndex and
// wLength are ours to set.
const DESCRIPTOR_REQUEST_W_VALUE_OFFSET: usize = 6;
const DESCRIPTOR_REQUEST_W_INDEX_OFFSET: usize = 8;
const DESCRIPTOR_REQUEST_W_LENGTH_OFFSET: usize = 10;
const DESCRIPTOR_REQUEST_DATA_OFFSET: usize = 12;

// name regions of the variable-length name responses; see the header size
// constants alongside the UsbApi trait
const CONTROLLER_NAME_RESPONSE_NAME_OFFSET: usize = 4;
const CONNECTION_NAME_RESPONSE_NAME_OFFSET: usize = 8;

fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buffer[offset], buffer[offset + 1], buffer[offset + 2], buffer[offset + 3]])
}

fn write_u16_le(buffer: &mut [u8], offset: usize, value: u16) {
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32_le(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn to_utf16z(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn open_error_from_win32(device_path: &str, win32_error: u32) -> UsbOpenError {
    match win32_error {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => {
            UsbOpenError::DeviceNotFound(device_path.to_string())
        }
        ERROR_ACCESS_DENIED => UsbOpenError::AccessDenied(device_path.to_string()),
        other => UsbOpenError::OpenFailed {
            device_path: device_path.to_string(),
            reason: format!("win32 error {}", other),
        },
    }
}

fn request_error_from_win32(win32_error: u32) -> UsbRequestError {
    match win32_error {
        // the request form is unknown to this driver stack (e.g. the extended
        // connection info request on pre-XP-era stacks)
        ERROR_INVALID_FUNCTION | ERROR_INVALID_PARAMETER | ERROR_NOT_SUPPORTED => {
            UsbRequestError::NotSupported
        }
        other => UsbRequestError::RequestFailed(format!("win32 error {}", other)),
    }
}

fn speed_from_raw(value: u8) -> UsbDeviceSpeed {
    match value {
        0 => UsbDeviceSpeed::LowSpeed,
        1 => UsbDeviceSpeed::FullSpeed,
        2 => UsbDeviceSpeed::HighSpeed,
        // 3 and above: super speed (and its successors) all gate the same way here
        _ => UsbDeviceSpeed::SuperSpeed,
    }
}

/// An open device handle which closes itself when dropped.
pub struct OwnedDeviceHandle {
    handle: HANDLE,
}
//
impl OwnedDeviceHandle {
    fn open(device_path: &str) -> Result<OwnedDeviceHandle, UsbOpenError> {
        let device_path_as_utf16_chars = to_utf16z(device_path);

        // see: https://learn.microsoft.com/en-us/windows/win32/api/fileapi/nf-fileapi-createfilew
        let handle = unsafe {
            CreateFileW(
                device_path_as_utf16_chars.as_ptr(),
                GENERIC_WRITE,
                FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let win32_error = unsafe { GetLastError() };
            return Err(open_error_from_win32(device_path, win32_error));
        }

        Ok(OwnedDeviceHandle { handle })
    }

    /// Issues one IOCTL with the same buffer as input and output; returns the
    /// number of bytes the driver wrote back.
    fn device_io_control(&self, control_code: u32, buffer: &mut [u8]) -> Result<usize, UsbRequestError> {
        let mut bytes_returned: u32 = 0;

        // see: https://learn.microsoft.com/en-us/windows/win32/api/ioapiset/nf-ioapiset-deviceiocontrol
        let io_result = unsafe {
            DeviceIoControl(
                self.handle,
                control_code,
                buffer.as_ptr() as *const std::ffi::c_void,
                buffer.len() as u32,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                buffer.len() as u32,
                &mut bytes_returned,
                std::ptr::null_mut(),
            )
        };
        if io_result == 0 {
            let win32_error = unsafe { GetLastError() };
            return Err(request_error_from_win32(win32_error));
        }

        Ok(bytes_returned as usize)
    }
}
//
impl Drop for OwnedDeviceHandle {
    fn drop(&mut self) {
        let close_result = unsafe { CloseHandle(self.handle) };
        debug_assert!(close_result != 0, "could not close the device handle");
    }
}

/// An open SetupDi device information set which destroys itself when dropped.
struct OwnedDeviceInfoSet {
    handle: HDEVINFO,
}
//
impl OwnedDeviceInfoSet {
    fn for_device_interface_class(interface_class_guid: &GUID) -> Result<OwnedDeviceInfoSet, UsbRequestError> {
        // see: https://learn.microsoft.com/en-us/windows/win32/api/setupapi/nf-setupapi-setupdigetclassdevsw
        let handle = unsafe {
            SetupDiGetClassDevsW(
                interface_class_guid,
                std::ptr::null(),
                std::ptr::null_mut(),
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let win32_error = unsafe { GetLastError() };
            return Err(request_error_from_win32(win32_error));
        }

        Ok(OwnedDeviceInfoSet { handle })
    }

    fn for_all_present_devices() -> Result<OwnedDeviceInfoSet, UsbRequestError> {
        let handle = unsafe {
            SetupDiGetClassDevsW(
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null_mut(),
                DIGCF_PRESENT | DIGCF_ALLCLASSES,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let win32_error = unsafe { GetLastError() };
            return Err(request_error_from_win32(win32_error));
        }

        Ok(OwnedDeviceInfoSet { handle })
    }
}
//
impl Drop for OwnedDeviceInfoSet {
    fn drop(&mut self) {
        let destroy_result = unsafe { SetupDiDestroyDeviceInfoList(self.handle) };
        debug_assert!(destroy_result != 0, "could not clean up the device info set");
    }
}

fn zeroed_devinfo_data() -> SP_DEVINFO_DATA {
    let mut devinfo_data = SP_DEVINFO_DATA {
        cbSize: 0,
        ClassGuid: GUID::from_u128(0),
        DevInst: 0,
        Reserved: 0,
    };
    devinfo_data.cbSize = std::mem::size_of::<SP_DEVINFO_DATA>() as u32;
    devinfo_data
}

/// Reads one device registry property (two-phase: size query, then fetch) and
/// returns its raw UTF-16 payload. None when the device does not carry the
/// property.
fn get_device_registry_property(
    device_info_set: &OwnedDeviceInfoSet,
    devinfo_data: &SP_DEVINFO_DATA,
    property: u32,
) -> Option<Vec<u16>> {
    let mut required_size: u32 = 0;

    // see: https://learn.microsoft.com/en-us/windows/win32/api/setupapi/nf-setupapi-setupdigetdeviceregistrypropertyw
    let get_property_result = unsafe {
        SetupDiGetDeviceRegistryPropertyW(
            device_info_set.handle,
            devinfo_data,
            property,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
            &mut required_size,
        )
    };
    if get_property_result == 0 {
        let win32_error = unsafe { GetLastError() };
        if win32_error != ERROR_INSUFFICIENT_BUFFER {
            // the device does not carry this property
            return None;
        }
    }
    if required_size == 0 {
        return None;
    }

    let mut property_buffer = vec![0u16; ((required_size as usize) + 1) / 2];
    let get_property_result = unsafe {
        SetupDiGetDeviceRegistryPropertyW(
            device_info_set.handle,
            devinfo_data,
            property,
            std::ptr::null_mut(),
            property_buffer.as_mut_ptr() as *mut u8,
            required_size,
            std::ptr::null_mut(),
        )
    };
    if get_property_result == 0 {
        return None;
    }

    Some(property_buffer)
}

/// Decodes the first NUL-terminated string of a registry string payload
/// (REG_SZ, or the head entry of a REG_MULTI_SZ list).
fn decode_first_registry_string(payload: &[u16]) -> String {
    let end = payload.iter().position(|&unit| unit == 0).unwrap_or(payload.len());
    String::from_utf16_lossy(&payload[..end])
}

/// Scans every present device for one whose SPDRP_DRIVER property matches the
/// given driver key (case-insensitively) and returns the requested property of
/// that device.
fn find_device_property_for_driver_key(driver_key: &str, property: u32) -> Option<String> {
    let device_info_set = OwnedDeviceInfoSet::for_all_present_devices().ok()?;

    for device_index in 0..u32::MAX {
        let mut devinfo_data = zeroed_devinfo_data();

        // see: https://learn.microsoft.com/en-us/windows/win32/api/setupapi/nf-setupapi-setupdienumdeviceinfo
        let enum_device_info_result =
            unsafe { SetupDiEnumDeviceInfo(device_info_set.handle, device_index, &mut devinfo_data) };
        if enum_device_info_result == 0 {
            // out of devices (ERROR_NO_MORE_ITEMS) or a scan failure; either
            // way there is no match to report
            break;
        }

        let device_driver_key =
            match get_device_registry_property(&device_info_set, &devinfo_data, SPDRP_DRIVER) {
                Some(payload) => decode_first_registry_string(&payload),
                None => continue,
            };
        if !device_driver_key.eq_ignore_ascii_case(driver_key) {
            continue;
        }

        return get_device_registry_property(&device_info_set, &devinfo_data, property)
            .map(|payload| decode_first_registry_string(&payload));
    }

    None
}

/// The live request executor: every request is one DeviceIoControl (or SetupDi)
/// call against the Windows USB driver stack.
#[derive(Default)]
pub struct WindowsUsbApi {
}
//
impl WindowsUsbApi {
    pub fn new() -> WindowsUsbApi {
        WindowsUsbApi {}
    }

    /// Issues one of the variable-length name IOCTLs. The same fixed-size
    /// in/out buffer carries the connection index in (for port-scoped
    /// requests) and the actual length plus as much of the name as fits out.
    fn name_request(
        &self,
        handle: &OwnedDeviceHandle,
        control_code: u32,
        connection_index: Option<u32>,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError> {
        let name_offset = match connection_index {
            Some(_) => CONNECTION_NAME_RESPONSE_NAME_OFFSET,
            None => CONTROLLER_NAME_RESPONSE_NAME_OFFSET,
        };
        let actual_length_offset = match connection_index {
            Some(_) => 4,
            None => 0,
        };
        if (request_size_in_bytes as usize) < name_offset + 4 {
            return Err(UsbRequestError::RequestFailed(format!(
                "name request size {} is smaller than the response header",
                request_size_in_bytes
            )));
        }

        let mut buffer = vec![0u8; request_size_in_bytes as usize];
        if let Some(connection_index) = connection_index {
            write_u32_le(&mut buffer, 0, connection_index);
        }

        let bytes_returned = handle.device_io_control(control_code, &mut buffer)?;
        if bytes_returned < name_offset {
            return Err(UsbRequestError::RequestFailed(format!(
                "name response returned {} bytes, less than its header",
                bytes_returned
            )));
        }

        let actual_length_in_bytes = read_u32_le(&buffer, actual_length_offset);
        let name_utf16 = buffer[name_offset..bytes_returned]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(NameRequestResponse { actual_length_in_bytes, name_utf16 })
    }

    /// Issues one of the two per-port connection info request shapes and
    /// returns the raw response buffer.
    fn connection_info_request(
        &self,
        hub: &OwnedDeviceHandle,
        control_code: u32,
        connection_index: u32,
        pipe_capacity: usize,
    ) -> Result<Vec<u8>, UsbRequestError> {
        let mut buffer = vec![0u8; CONNECTION_INFO_PIPE_LIST_OFFSET + pipe_capacity * PIPE_INFO_SIZE];
        write_u32_le(&mut buffer, 0, connection_index);

        let bytes_returned = hub.device_io_control(control_code, &mut buffer)?;
        if bytes_returned < CONNECTION_INFO_PIPE_LIST_OFFSET {
            return Err(UsbRequestError::RequestFailed(format!(
                "connection info response returned {} bytes, less than its fixed region",
                bytes_returned
            )));
        }

        Ok(buffer)
    }

    fn parse_pipe_list(buffer: &[u8], number_of_open_pipes: u32, pipe_capacity: usize) -> Vec<UsbPipeInfo> {
        let pipe_count = (number_of_open_pipes as usize).min(pipe_capacity);
        let mut pipe_list = Vec::with_capacity(pipe_count);
        for pipe_index in 0..pipe_count {
            let pipe_offset = CONNECTION_INFO_PIPE_LIST_OFFSET + pipe_index * PIPE_INFO_SIZE;
            if pipe_offset + PIPE_INFO_SIZE > buffer.len() {
                break;
            }
            pipe_list.push(UsbPipeInfo {
                endpoint_address: buffer[pipe_offset + 2],
                attributes: buffer[pipe_offset + 3],
                max_packet_size: read_u16_le(buffer, pipe_offset + 4),
                interval: buffer[pipe_offset + 6],
                schedule_offset: read_u32_le(buffer, pipe_offset + PIPE_INFO_SCHEDULE_OFFSET_OFFSET),
            });
        }
        pipe_list
    }

    fn parse_device_descriptor(buffer: &[u8]) -> Result<UsbDeviceDescriptor, UsbRequestError> {
        let descriptor_region = &buffer
            [CONNECTION_INFO_DEVICE_DESCRIPTOR_OFFSET..CONNECTION_INFO_CURRENT_CONFIGURATION_OFFSET];
        UsbDeviceDescriptor::from_bytes(descriptor_region).ok_or_else(|| {
            UsbRequestError::RequestFailed("connection info device descriptor region is truncated".to_string())
        })
    }

    fn parse_connection_status(buffer: &[u8]) -> Result<UsbConnectionStatus, UsbRequestError> {
        let raw_status = read_u32_le(buffer, CONNECTION_INFO_CONNECTION_STATUS_OFFSET);
        UsbConnectionStatus::from_raw(raw_status).ok_or_else(|| {
            UsbRequestError::RequestFailed(format!("unknown connection status value {}", raw_status))
        })
    }
}
//
impl UsbApi for WindowsUsbApi {
    type ControllerHandle = OwnedDeviceHandle;
    type HubHandle = OwnedDeviceHandle;

    fn host_controller_device_paths(&mut self) -> Result<Vec<String>, UsbRequestError> {
        let device_info_set =
            OwnedDeviceInfoSet::for_device_interface_class(&GUID_DEVINTERFACE_USB_HOST_CONTROLLER)?;

        let mut device_paths = Vec::<String>::new();

        for member_index in 0..u32::MAX {
            let mut interface_data = SP_DEVICE_INTERFACE_DATA {
                cbSize: std::mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
                InterfaceClassGuid: GUID::from_u128(0),
                Flags: 0,
                Reserved: 0,
            };

            // see: https://learn.microsoft.com/en-us/windows/win32/api/setupapi/nf-setupapi-setupdienumdeviceinterfaces
            let enum_interfaces_result = unsafe {
                SetupDiEnumDeviceInterfaces(
                    device_info_set.handle,
                    std::ptr::null(),
                    &GUID_DEVINTERFACE_USB_HOST_CONTROLLER,
                    member_index,
                    &mut interface_data,
                )
            };
            if enum_interfaces_result == 0 {
                let win32_error = unsafe { GetLastError() };
                if win32_error == ERROR_NO_MORE_ITEMS {
                    break;
                }
                return Err(request_error_from_win32(win32_error));
            }

            // size query first; ERROR_INSUFFICIENT_BUFFER is the expected result
            // see: https://learn.microsoft.com/en-us/windows/win32/api/setupapi/nf-setupapi-setupdigetdeviceinterfacedetailw
            let mut required_size: u32 = 0;
            let get_detail_result = unsafe {
                SetupDiGetDeviceInterfaceDetailW(
                    device_info_set.handle,
                    &interface_data,
                    std::ptr::null_mut(),
                    0,
                    &mut required_size,
                    std::ptr::null_mut(),
                )
            };
            if get_detail_result == 0 {
                let win32_error = unsafe { GetLastError() };
                if win32_error != ERROR_INSUFFICIENT_BUFFER {
                    return Err(request_error_from_win32(win32_error));
                }
            }
            if (required_size as usize) < std::mem::size_of::<u32>() {
                return Err(UsbRequestError::RequestFailed(
                    "device interface detail size query returned an impossible size".to_string(),
                ));
            }

            // NOTE: the detail record starts with a u32 cbSize, so a u32-backed
            // buffer satisfies its alignment requirement; the device path is a
            // NUL-terminated UTF-16 string starting at byte offset 4
            let mut detail_buffer = vec![0u32; ((required_size as usize) + 3) / 4];
            {
                let detail_data = detail_buffer.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
                unsafe {
                    (*detail_data).cbSize = std::mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
                }
            }
            let get_detail_result = unsafe {
                SetupDiGetDeviceInterfaceDetailW(
                    device_info_set.handle,
                    &interface_data,
                    detail_buffer.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W,
                    required_size,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            if get_detail_result == 0 {
                let win32_error = unsafe { GetLastError() };
                return Err(request_error_from_win32(win32_error));
            }

            let path_units_available = ((required_size as usize) - std::mem::size_of::<u32>()) / 2;
            let path_units = unsafe {
                std::slice::from_raw_parts((detail_buffer.as_ptr() as *const u16).add(2), path_units_available)
            };
            let path_end = path_units.iter().position(|&unit| unit == 0).unwrap_or(path_units.len());
            device_paths.push(String::from_utf16_lossy(&path_units[..path_end]));
        }

        Ok(device_paths)
    }

    fn open_host_controller(&mut self, device_path: &str) -> Result<OwnedDeviceHandle, UsbOpenError> {
        OwnedDeviceHandle::open(device_path)
    }

    fn open_hub(&mut self, hub_name: &str) -> Result<OwnedDeviceHandle, UsbOpenError> {
        // hub names come back from the name requests without the device-path prefix
        let device_path = format!("\\\\.\\{}", hub_name);
        OwnedDeviceHandle::open(&device_path)
    }

    fn get_root_hub_name(
        &mut self,
        controller: &OwnedDeviceHandle,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError> {
        self.name_request(controller, IOCTL_USB_GET_ROOT_HUB_NAME, None, request_size_in_bytes)
    }

    fn get_hcd_driver_key_name(
        &mut self,
        controller: &OwnedDeviceHandle,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError> {
        self.name_request(controller, IOCTL_GET_HCD_DRIVERKEY_NAME, None, request_size_in_bytes)
    }

    fn get_node_connection_name(
        &mut self,
        hub: &OwnedDeviceHandle,
        connection_index: u32,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError> {
        self.name_request(hub, IOCTL_USB_GET_NODE_CONNECTION_NAME, Some(connection_index), request_size_in_bytes)
    }

    fn get_node_connection_driver_key_name(
        &mut self,
        hub: &OwnedDeviceHandle,
        connection_index: u32,
        request_size_in_bytes: u32,
    ) -> Result<NameRequestResponse, UsbRequestError> {
        self.name_request(
            hub,
            IOCTL_USB_GET_NODE_CONNECTION_DRIVERKEY_NAME,
            Some(connection_index),
            request_size_in_bytes,
        )
    }

    fn get_node_information(&mut self, hub: &OwnedDeviceHandle) -> Result<UsbNodeInformation, UsbRequestError> {
        let mut buffer = vec![0u8; NODE_INFORMATION_SIZE];
        let bytes_returned = hub.device_io_control(IOCTL_USB_GET_NODE_INFORMATION, &mut buffer)?;
        if bytes_returned < NODE_INFORMATION_HUB_IS_BUS_POWERED_OFFSET + 1 {
            return Err(UsbRequestError::RequestFailed(format!(
                "node information response returned {} bytes",
                bytes_returned
            )));
        }

        let descriptor_offset = NODE_INFORMATION_HUB_DESCRIPTOR_OFFSET;
        Ok(UsbNodeInformation {
            hub_is_bus_powered: buffer[NODE_INFORMATION_HUB_IS_BUS_POWERED_OFFSET] != 0,
            hub_descriptor: UsbHubDescriptor {
                descriptor_length: buffer[descriptor_offset],
                descriptor_type: buffer[descriptor_offset + 1],
                number_of_ports: buffer[descriptor_offset + 2],
                hub_characteristics: read_u16_le(&buffer, descriptor_offset + 3),
                power_on_to_power_good: buffer[descriptor_offset + 5],
                hub_control_current: buffer[descriptor_offset + 6],
            },
        })
    }

    fn get_hub_capabilities(&mut self, hub: &OwnedDeviceHandle) -> Result<UsbHubCapabilities, UsbRequestError> {
        let mut buffer = vec![0u8; 4];
        let bytes_returned = hub.device_io_control(IOCTL_USB_GET_HUB_CAPABILITIES, &mut buffer)?;
        if bytes_returned < 4 {
            return Err(UsbRequestError::RequestFailed(format!(
                "hub capabilities response returned {} bytes",
                bytes_returned
            )));
        }

        let capability_flags = read_u32_le(&buffer, 0);
        Ok(UsbHubCapabilities { hub_is_2x_capable: capability_flags & 0x1 != 0 })
    }

    fn get_hub_capabilities_ex(&mut self, hub: &OwnedDeviceHandle) -> Result<UsbHubCapabilitiesEx, UsbRequestError> {
        let mut buffer = vec![0u8; 4];
        let bytes_returned = hub.device_io_control(IOCTL_USB_GET_HUB_CAPABILITIES_EX, &mut buffer)?;
        if bytes_returned < 4 {
            return Err(UsbRequestError::RequestFailed(format!(
                "extended hub capabilities response returned {} bytes",
                bytes_returned
            )));
        }

        let capability_flags = read_u32_le(&buffer, 0);
        Ok(UsbHubCapabilitiesEx {
            hub_is_high_speed_capable: capability_flags & (1 << 0) != 0,
            hub_is_high_speed: capability_flags & (1 << 1) != 0,
            hub_is_multi_tt_capable: capability_flags & (1 << 2) != 0,
            hub_is_multi_tt: capability_flags & (1 << 3) != 0,
            hub_is_root: capability_flags & (1 << 4) != 0,
            hub_is_armed_wake_on_connect: capability_flags & (1 << 5) != 0,
            hub_is_bus_powered: capability_flags & (1 << 6) != 0,
        })
    }

    fn get_node_connection_info_ex(
        &mut self,
        hub: &OwnedDeviceHandle,
        connection_index: u32,
        pipe_capacity: usize,
    ) -> Result<UsbNodeConnectionInfoEx, UsbRequestError> {
        let buffer = self.connection_info_request(
            hub,
            IOCTL_USB_GET_NODE_CONNECTION_INFORMATION_EX,
            connection_index,
            pipe_capacity,
        )?;

        let number_of_open_pipes = read_u32_le(&buffer, CONNECTION_INFO_NUMBER_OF_OPEN_PIPES_OFFSET);
        Ok(UsbNodeConnectionInfoEx {
            connection_index: read_u32_le(&buffer, 0),
            device_descriptor: WindowsUsbApi::parse_device_descriptor(&buffer)?,
            current_configuration_value: buffer[CONNECTION_INFO_CURRENT_CONFIGURATION_OFFSET],
            speed: speed_from_raw(buffer[CONNECTION_INFO_SPEED_OFFSET]),
            device_is_hub: buffer[CONNECTION_INFO_DEVICE_IS_HUB_OFFSET] != 0,
            device_address: read_u16_le(&buffer, CONNECTION_INFO_DEVICE_ADDRESS_OFFSET),
            number_of_open_pipes,
            connection_status: WindowsUsbApi::parse_connection_status(&buffer)?,
            pipe_list: WindowsUsbApi::parse_pipe_list(&buffer, number_of_open_pipes, pipe_capacity),
        })
    }

    fn get_node_connection_info(
        &mut self,
        hub: &OwnedDeviceHandle,
        connection_index: u32,
        pipe_capacity: usize,
    ) -> Result<UsbNodeConnectionInfo, UsbRequestError> {
        let buffer = self.connection_info_request(
            hub,
            IOCTL_USB_GET_NODE_CONNECTION_INFORMATION,
            connection_index,
            pipe_capacity,
        )?;

        let number_of_open_pipes = read_u32_le(&buffer, CONNECTION_INFO_NUMBER_OF_OPEN_PIPES_OFFSET);
        Ok(UsbNodeConnectionInfo {
            connection_index: read_u32_le(&buffer, 0),
            device_descriptor: WindowsUsbApi::parse_device_descriptor(&buffer)?,
            current_configuration_value: buffer[CONNECTION_INFO_CURRENT_CONFIGURATION_OFFSET],
            low_speed: buffer[CONNECTION_INFO_SPEED_OFFSET] != 0,
            device_is_hub: buffer[CONNECTION_INFO_DEVICE_IS_HUB_OFFSET] != 0,
            device_address: read_u16_le(&buffer, CONNECTION_INFO_DEVICE_ADDRESS_OFFSET),
            number_of_open_pipes,
            connection_status: WindowsUsbApi::parse_connection_status(&buffer)?,
            pipe_list: WindowsUsbApi::parse_pipe_list(&buffer, number_of_open_pipes, pipe_capacity),
        })
    }

    fn get_descriptor_from_node_connection(
        &mut self,
        hub: &OwnedDeviceHandle,
        connection_index: u32,
        descriptor_type: u8,
        descriptor_index: u8,
        language_id: u16,
        requested_length: u16,
    ) -> Result<Vec<u8>, UsbRequestError> {
        let mut buffer = vec![0u8; DESCRIPTOR_REQUEST_DATA_OFFSET + requested_length as usize];
        write_u32_le(&mut buffer, 0, connection_index);
        let w_value = ((descriptor_type as u16) << 8) | descriptor_index as u16;
        write_u16_le(&mut buffer, DESCRIPTOR_REQUEST_W_VALUE_OFFSET, w_value);
        write_u16_le(&mut buffer, DESCRIPTOR_REQUEST_W_INDEX_OFFSET, language_id);
        write_u16_le(&mut buffer, DESCRIPTOR_REQUEST_W_LENGTH_OFFSET, requested_length);

        let bytes_returned =
            hub.device_io_control(IOCTL_USB_GET_DESCRIPTOR_FROM_NODE_CONNECTION, &mut buffer)?;
        if bytes_returned < DESCRIPTOR_REQUEST_DATA_OFFSET {
            return Err(UsbRequestError::RequestFailed(format!(
                "descriptor response returned {} bytes, less than the request header",
                bytes_returned
            )));
        }

        Ok(buffer[DESCRIPTOR_REQUEST_DATA_OFFSET..bytes_returned].to_vec())
    }

    fn device_description_for_driver_key(&mut self, driver_key: &str) -> Option<String> {
        find_device_property_for_driver_key(driver_key, SPDRP_DEVICEDESC)
    }

    fn device_id_for_driver_key(&mut self, driver_key: &str) -> Option<String> {
        find_device_property_for_driver_key(driver_key, SPDRP_HARDWAREID)
    }
}
