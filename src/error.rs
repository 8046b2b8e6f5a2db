use thiserror::Error;

/// Failure taxonomy for the sentry session.
///
/// Only `DeviceAccessDenied`, `NoCameraDevices` and `DeviceEnumeration` are
/// surfaced to the operator at startup. Detector and speech failures are
/// recovered inside the session and only show up in logs and the session
/// report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SentryError {
    #[error("camera access denied for device '{device_id}'")]
    DeviceAccessDenied { device_id: String },

    #[error("no camera devices available")]
    NoCameraDevices,

    #[error("camera enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("unknown camera device '{device_id}'")]
    UnknownDevice { device_id: String },

    #[error("detector failure: {0}")]
    DetectorFailure(String),

    #[error("speech failure: {0}")]
    SpeechFailure(String),

    #[error("session already closed")]
    SessionClosed,
}

impl SentryError {
    /// Errors that need a user action (granting permission, plugging in a
    /// camera) before a retry can succeed.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SentryError::DeviceAccessDenied { .. }
                | SentryError::NoCameraDevices
                | SentryError::DeviceEnumeration(_)
        )
    }
}
