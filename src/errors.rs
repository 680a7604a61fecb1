// Copyright (c) ScaleFS LLC; used with permission
// Licensed under the MIT License

use thiserror::Error;

/// Error returned when a host controller or hub device could not be opened.
#[derive(Debug, Error)]
pub enum UsbOpenError {
    // the device path does not exist (or no longer exists); callers generally skip the device silently
    #[error("device '{0}' could not be found")]
    DeviceNotFound(/*device_path: */String),

    #[error("access to device '{0}' was denied")]
    AccessDenied(/*device_path: */String),

    #[error("could not open device '{device_path}': {reason}")]
    OpenFailed { device_path: String, reason: String },
}

/// Error returned by a request executor when a single typed request against an
/// open controller or hub handle fails.
#[derive(Debug, Error)]
pub enum UsbRequestError {
    // the driver stack does not implement this request form (e.g. the extended
    // per-port connection info request on older stacks); callers fall back where
    // a legacy request shape exists
    #[error("the request is not supported by the driver stack")]
    NotSupported,

    #[error("the device request failed: {0}")]
    RequestFailed(/*reason: */String),
}

/// Error returned by the enumeration core when a mandatory query failed or a
/// response failed its consistency checks; aborts the enclosing subtree only.
#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error(transparent)]
    Open(#[from] UsbOpenError),

    #[error(transparent)]
    Request(#[from] UsbRequestError),

    // a response was received but its length fields or descriptor type tags
    // were inconsistent with what was requested
    #[error("inconsistent response: {0}")]
    InconsistentResponse(/*description: */String),
}
