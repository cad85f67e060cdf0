//! Process exit statuses shared by the automation tools.
//!
//! The numeric values double as the process exit code so a wrapping script
//! can tell which precondition failed without parsing logs. They mirror HTTP
//! status semantics: 4xx for caller-side problems, 5xx for the remote side.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    /// Required invocation parameters were not supplied.
    MissingParameters,
    /// Credentials were rejected or the CSRF token is absent.
    BadCredentials,
    /// Account type mismatch or additional verification required.
    Forbidden,
    /// The target resource (bot handle, page) does not exist.
    NotFound,
    /// A response body was missing or had an unexpected shape.
    MalformedResponse,
    /// Anything the automation did not anticipate.
    AutomationError,
}

impl ExitStatus {
    pub const ALL: [ExitStatus; 7] = [
        ExitStatus::Success,
        ExitStatus::MissingParameters,
        ExitStatus::BadCredentials,
        ExitStatus::Forbidden,
        ExitStatus::NotFound,
        ExitStatus::MalformedResponse,
        ExitStatus::AutomationError,
    ];

    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::MissingParameters => 400,
            ExitStatus::BadCredentials => 401,
            ExitStatus::Forbidden => 403,
            ExitStatus::NotFound => 404,
            ExitStatus::MalformedResponse => 500,
            ExitStatus::AutomationError => 503,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitStatus::Success => "success",
            ExitStatus::MissingParameters => "missing required parameters",
            ExitStatus::BadCredentials => "bad credentials or missing CSRF token",
            ExitStatus::Forbidden => "account type mismatch or additional verification required",
            ExitStatus::NotFound => "target resource not found",
            ExitStatus::MalformedResponse => "malformed or missing response body",
            ExitStatus::AutomationError => "unexpected automation error",
        };
        write!(f, "{text} ({})", self.code())
    }
}
