//! Progress codes reported by the status endpoints.

/// Authentication status codes.
///
/// ```text
/// Init(40100) → Scanned(40200) → PendingSp(40300) → PendingApp(40400) → Done(40500)
///                                                                     ↘ NotFound(40600)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Request created, nothing seen yet
    Init,
    /// Code scanned or notification opened
    Scanned,
    /// App challenge waiting for the SP
    PendingSp,
    /// Waiting for the device's decision
    PendingApp,
    /// Solution ready for collection
    Done,
    /// Expired or unknown request
    NotFound,
    /// Any code this client does not know
    Other(i64),
}

impl AuthStatus {
    /// Map a wire code.
    pub fn from_code(code: i64) -> Self {
        match code {
            40100 => Self::Init,
            40200 => Self::Scanned,
            40300 => Self::PendingSp,
            40400 => Self::PendingApp,
            40500 => Self::Done,
            40600 => Self::NotFound,
            other => Self::Other(other),
        }
    }

    /// Wire code.
    pub fn code(self) -> i64 {
        match self {
            Self::Init => 40100,
            Self::Scanned => 40200,
            Self::PendingSp => 40300,
            Self::PendingApp => 40400,
            Self::Done => 40500,
            Self::NotFound => 40600,
            Self::Other(code) => code,
        }
    }
}

/// Enrolment scan status, parsed from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Device scanned the code
    Scanned,
    /// Code expired
    NotFound,
    /// Still waiting (`initialised`, `done` and anything unrecognised)
    Waiting,
}

impl ScanStatus {
    /// Parse the `QREnrolStatus` text, ignoring case.
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("scanned") {
            Self::Scanned
        } else if text.eq_ignore_ascii_case("not found") {
            Self::NotFound
        } else {
            Self::Waiting
        }
    }
}
