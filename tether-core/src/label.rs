//! Routing labels
//!
//! Every outbound line is prefixed with the routing label of the request or
//! task that produced it, so the host can route replies and diagnostics
//! back to their origin. Outside of a command or task the label is
//! [`IDLE_LABEL`].

use heapless::Vec;

/// Maximum routing label length in bytes
pub const MAX_LABEL_LEN: usize = 48;

/// Label used outside any command or task
pub const IDLE_LABEL: &[u8] = b"sched";

/// Errors creating a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LabelError {
    /// Longer than [`MAX_LABEL_LEN`]
    TooLong,
}

/// Short byte string tagging output with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label(Vec<u8, MAX_LABEL_LEN>);

impl Label {
    /// Create a label from raw bytes
    pub fn new(bytes: &[u8]) -> Result<Self, LabelError> {
        Vec::from_slice(bytes)
            .map(Self)
            .map_err(|_| LabelError::TooLong)
    }

    /// The idle label
    pub fn idle() -> Self {
        let mut bytes = Vec::new();
        // Cannot fail: IDLE_LABEL is shorter than MAX_LABEL_LEN
        let _ = bytes.extend_from_slice(IDLE_LABEL);
        Self(bytes)
    }

    /// True for the idle label
    pub fn is_idle(&self) -> bool {
        self.as_bytes() == IDLE_LABEL
    }

    /// Label bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Label {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:a}", self.as_bytes());
    }
}
