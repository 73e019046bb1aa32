//! Reason codes and interrupt source identities.
//!
//! An NMI occurrence is identified by the `(SourceType, ReasonCode)` pair the
//! host hands to the handler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform-specific byte accompanying an NMI that identifies its cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCode(pub u8);

impl ReasonCode {
    pub const MIN: ReasonCode = ReasonCode(u8::MIN);
    pub const MAX: ReasonCode = ReasonCode(u8::MAX);

    /// Parse a reason code written either in decimal (`61`) or hex (`0x3d`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16).ok(),
            None => s.parse::<u8>().ok(),
        };
        parsed.map(ReasonCode)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

/// Rendered the way the kernel log shows it: `0x3d (61)`.
impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x} ({})", self.0, self.0)
    }
}

impl From<u8> for ReasonCode {
    fn from(code: u8) -> Self {
        ReasonCode(code)
    }
}

impl From<ReasonCode> for u8 {
    fn from(code: ReasonCode) -> Self {
        code.0
    }
}

/// Hardware interrupt class exposed by the host.
///
/// This is a closed, host-defined enumeration. Only [`SourceType::MANAGED`]
/// is bound by default; `Local` belongs to the host's own CPU-local handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// CPU-local NMIs (watchdog, perf counters).
    Local,
    /// NMIs no other handler claimed.
    Unknown,
    /// PCI system error (SERR).
    SystemError,
    /// I/O channel check (IOCHK).
    IoCheck,
}

impl SourceType {
    /// Every source the host enumerates, in host order.
    pub const ALL: [SourceType; 4] = [
        SourceType::Local,
        SourceType::Unknown,
        SourceType::SystemError,
        SourceType::IoCheck,
    ];

    /// Sources the triage handler binds to by default, in registration order.
    pub const MANAGED: [SourceType; 3] = [
        SourceType::Unknown,
        SourceType::SystemError,
        SourceType::IoCheck,
    ];

    /// Host-facing name, as used by the kernel's NMI type constants.
    pub fn host_name(self) -> &'static str {
        match self {
            SourceType::Local => "NMI_LOCAL",
            SourceType::Unknown => "NMI_UNKNOWN",
            SourceType::SystemError => "NMI_SERR",
            SourceType::IoCheck => "NMI_IO_CHECK",
        }
    }

    /// Numeric type id passed to handlers (`NMI_LOCAL` = 0).
    pub fn index(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Local => write!(f, "local"),
            SourceType::Unknown => write!(f, "unknown"),
            SourceType::SystemError => write!(f, "system_error"),
            SourceType::IoCheck => write!(f, "io_check"),
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "nmi_local" => Ok(SourceType::Local),
            "unknown" | "nmi_unknown" => Ok(SourceType::Unknown),
            "system_error" | "system-error" | "serr" | "nmi_serr" => Ok(SourceType::SystemError),
            "io_check" | "io-check" | "iochk" | "nmi_io_check" => Ok(SourceType::IoCheck),
            other => Err(format!("unknown NMI source: {other}")),
        }
    }
}
