//! Logging macros
//!
//! Enable with `--features defmt`. Without the feature every macro expands
//! to nothing, so log statements cost nothing in builds without a logger.

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, trace, warn};

#[cfg(not(feature = "defmt"))]
macro_rules! trace_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! debug_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! error_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "defmt"))]
pub(crate) use error_noop as error;
#[cfg(not(feature = "defmt"))]
pub(crate) use trace_noop as trace;
#[cfg(not(feature = "defmt"))]
pub(crate) use warn_noop as warn;
