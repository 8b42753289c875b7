//! Error types for check-in operations

use thiserror::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scan and check-in operations
#[derive(Error, Debug)]
pub enum Error {
    /// Camera-related errors (device busy, failed to configure)
    #[error("Camera error: {0}")]
    Camera(String),

    /// Camera device not found
    #[error("Camera device not found: {0}")]
    CameraNotFound(String),

    /// The host platform refused access to the camera
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// Failed to capture frame from camera
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// A QR grid was located but could not be read
    #[error("Failed to decode QR code: {0}")]
    QrDecode(String),

    /// No QR code found in frame
    #[error("No QR code found in frame")]
    NoQrCodeFound,

    /// QR code encoding failed
    #[error("Failed to encode QR code: {0}")]
    QrEncode(String),

    /// Decoded QR content is not text
    #[error("QR payload is not valid UTF-8 ({0} bytes)")]
    PayloadNotText(usize),

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Review form rejected the draft locally
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The check-in service rejected or failed the submission
    #[error("{}", submission_message(*status, message))]
    Submission {
        /// HTTP status when the service answered
        status: Option<u16>,
        /// Service or transport message
        message: String,
    },

    /// The authentication gate has not authorized an operator
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// The requested action is not valid in the current session state
    #[error("Cannot {action} while session is {from}")]
    InvalidTransition {
        /// Name of the state the session was in
        from: &'static str,
        /// Action that was attempted
        action: &'static str,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn submission_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Check-in failed (HTTP {code}): {message}"),
        None => format!("Check-in failed: {message}"),
    }
}

impl Error {
    /// Message suitable for an operator-facing fault, keeping platform text verbatim.
    pub fn platform_message(&self) -> String {
        match self {
            Error::Camera(msg)
            | Error::CameraNotFound(msg)
            | Error::PermissionDenied(msg)
            | Error::FrameCapture(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Local rejection of a review draft. No request is issued when one of these occurs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Attendee presence checkbox not ticked
    #[error("Please mark the participant as present to complete check-in.")]
    PresenceNotConfirmed,

    /// Reviewer name left blank
    #[error("Reviewer name is required")]
    MissingReviewerName,

    /// Reviewer email left blank
    #[error("Reviewer email is required")]
    MissingReviewerEmail,

    /// Reviewer email is not of the form local@domain
    #[error("Reviewer email '{0}' is not a valid address")]
    InvalidReviewerEmail(String),

    /// Scanned payload has no usable ticket identifier
    #[error("Scanned code does not contain a ticket identifier")]
    EmptyTicketId,
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Submission {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
