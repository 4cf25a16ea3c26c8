use serde::{Deserialize, Serialize};

/// Uniform response envelope for the HTTP surface.
///
/// `status` is 0 on success and the HTTP status on failure; `code`
/// carries the machine-readable error code from the core taxonomy so
/// clients never parse `msg`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: i32,
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: 0,
            code: "OK".to_string(),
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(status: i32, code: &str, msg: String) -> Self {
        Self {
            status,
            code: code.to_string(),
            msg,
            data: None,
        }
    }
}
