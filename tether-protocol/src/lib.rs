//! Tether Command Loader Protocol
//!
//! This crate defines the line-oriented protocol between the host and the
//! device. Commands arrive as newline-terminated, pipe-delimited records;
//! arguments that are not text-safe travel as length-prefixed raw blocks.
//!
//! # Protocol Overview
//!
//! ```text
//! <label>|<command>[|<arg>...]\n
//! <label>|eval|&5\n<5 raw bytes>\n
//! ```
//!
//! Bytes flow through the layers below, leaves first:
//!
//! - [`buffer::FramedBuffer`] - bounded byte store with sticky overflow
//! - [`parser`] - splits a line into argument records, finds raw blocks
//! - [`loader::Loader`] - byte-fed state machine assembling whole commands
//! - [`command::Command`] - typed command with argument-count checks
//!
//! Replies and asynchronous output are encoded by [`record`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod buffer;
pub mod command;
pub mod loader;
pub mod parser;
pub mod record;

pub use buffer::{BufferError, FramedBuffer};
pub use command::{Command, CommandError, CommandKind};
pub use loader::{Feed, Loader, LoaderError};
pub use parser::{ArgumentRecord, ParseError, ParsedLine, RawBlockSpec, MAX_ARGS};
