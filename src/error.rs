use nokhwa::NokhwaError;
use std::path::PathBuf;
use thiserror::Error;

/// Camera could not be acquired. The pipeline never starts after one of these.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl From<NokhwaError> for DeviceError {
    fn from(err: NokhwaError) -> Self {
        let message = err.to_string();
        match err {
            NokhwaError::OpenDeviceError(_, reason) if is_permission_denial(&reason) => {
                DeviceError::PermissionDenied(message)
            }
            _ => DeviceError::Unavailable(message),
        }
    }
}

/// Backends only report the OS error text for a failed open
fn is_permission_denial(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    lower.contains("permission") || lower.contains("eacces") || lower.contains("denied")
}

/// Segmentation model failed to initialize (at startup or on a mode switch)
#[derive(Debug, Error)]
#[error("failed to load segmentation model from {}: {reason}", path.display())]
pub struct ModelLoadError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("{what} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        what: &'static str,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

impl CompositeError {
    pub(crate) fn check(what: &'static str, expected: (u32, u32), actual: (u32, u32)) -> Result<(), Self> {
        if expected == actual {
            return Ok(());
        }
        Err(CompositeError::DimensionMismatch {
            what,
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failure_with_permission_denial() {
        let err = DeviceError::from(NokhwaError::OpenDeviceError(
            "/dev/video0".to_string(),
            "Permission denied (os error 13)".to_string(),
        ));
        assert!(matches!(err, DeviceError::PermissionDenied(_)));
    }

    #[test]
    fn other_open_failures_are_unavailable() {
        let err = DeviceError::from(NokhwaError::OpenDeviceError(
            "/dev/video0".to_string(),
            "No such device".to_string(),
        ));
        assert!(matches!(err, DeviceError::Unavailable(_)));
    }

    #[test]
    fn denial_text_outside_open_is_unavailable() {
        let err = DeviceError::from(NokhwaError::OpenStreamError("access denied by driver".to_string()));
        assert!(matches!(err, DeviceError::Unavailable(_)));
    }

    #[test]
    fn dimension_check() {
        assert!(CompositeError::check("frame", (4, 2), (4, 2)).is_ok());
        let err = CompositeError::check("frame", (4, 2), (2, 4)).unwrap_err();
        assert_eq!(err.to_string(), "frame is 2x4, expected 4x2");
    }
}
