//! Outbound record encoding
//!
//! Every line the device sends is `<label>|<tag>[|<field>...]\n`. A field
//! that cannot travel inline (it starts with `&`, contains `|`, or holds a
//! byte outside printable ASCII) is replaced by `&<N>` and its raw bytes are
//! appended after the line, each followed by a newline. This is the same
//! raw extension the loader accepts on input.

use core::fmt::Write as _;

use embedded_io::Write;
use heapless::String;

use crate::parser::{DELIMITER, RAW_MARKER, TERMINATOR};

/// Reply tag for command results
pub const TAG_RET: &[u8] = b"ret";
/// Reply tag for diagnostics
pub const TAG_ERROR: &[u8] = b"error";
/// Reply tag for serialized modules
pub const TAG_DUMP: &[u8] = b"dump";
/// Banner tag sent once on connect
pub const TAG_VERSION: &[u8] = b"version";

/// `ret` value for success
pub const RET_OK: &[u8] = b"ok";
/// `ret` value for failure
pub const RET_FAIL: &[u8] = b"fail";

/// Serialized bytes per `dump` line (two hex digits each)
pub const DUMP_BYTES_PER_LINE: usize = 40;

/// Hex digits per `dump` line
pub const DUMP_HEX_PER_LINE: usize = DUMP_BYTES_PER_LINE * 2;

/// Check whether a field can be sent inline
pub fn is_clean(field: &[u8]) -> bool {
    match field.first() {
        None => true,
        Some(&RAW_MARKER) => false,
        Some(_) => field
            .iter()
            .all(|&b| (32..=126).contains(&b) && b != DELIMITER),
    }
}

/// Write one record, escaping fields that cannot travel inline
pub fn write_record<W: Write>(out: &mut W, fields: &[&[u8]]) -> Result<(), W::Error> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(&[DELIMITER])?;
        }
        if is_clean(field) {
            out.write_all(field)?;
        } else {
            let mut marker: String<24> = String::new();
            // Cannot fail: "&" plus at most 20 digits
            let _ = write!(marker, "&{}", field.len());
            out.write_all(marker.as_bytes())?;
        }
    }
    out.write_all(&[TERMINATOR])?;

    for field in fields.iter().filter(|f| !is_clean(f)) {
        out.write_all(field)?;
        out.write_all(&[TERMINATOR])?;
    }
    Ok(())
}

/// Split serialized bytes into `dump` line payloads of hex digits
///
/// Yields at least one (possibly empty) chunk so that an empty module
/// still produces a `dump|<name>|` line.
pub fn hex_lines(bytes: &[u8]) -> impl Iterator<Item = String<DUMP_HEX_PER_LINE>> + '_ {
    let empty = bytes.is_empty();
    bytes
        .chunks(DUMP_BYTES_PER_LINE)
        .chain(core::iter::once(&bytes[..0]).filter(move |_| empty))
        .map(|chunk| {
            let mut digits = [0u8; DUMP_HEX_PER_LINE];
            let hex = &mut digits[..chunk.len() * 2];
            let mut line = String::new();
            if hex::encode_to_slice(chunk, hex).is_ok() {
                for &d in hex.iter() {
                    // Cannot fail: capacity matches the chunk size
                    let _ = line.push(d as char);
                }
            }
            line
        })
}
