//! Line/record parser
//!
//! Splits one buffered line (terminator already stripped) into argument
//! records on the [`DELIMITER`] byte. A record of the exact form
//! `&<decimal>` declares a raw block: the argument's real value is the
//! next `<decimal>` bytes delivered after the line, each block followed by
//! a newline. Raw block bytes are never scanned for delimiters.

use heapless::Vec;

/// Field delimiter
pub const DELIMITER: u8 = b'|';

/// Line terminator
pub const TERMINATOR: u8 = b'\n';

/// Raw block marker prefix
pub const RAW_MARKER: u8 = b'&';

/// Maximum number of records in one command
pub const MAX_ARGS: usize = 16;

/// Errors that abort the current line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// More than [`MAX_ARGS`] records
    TooManyArgs,
    /// `&` followed by something other than decimal digits
    MalformedRawCount,
    /// Declared raw byte count not below the buffer's `max_size`
    RawCountTooLarge,
}

/// One argument as a byte range into the command buffer
///
/// Ranges of distinct records never overlap. A record is only valid until
/// the buffer is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArgumentRecord {
    /// Byte offset into the buffer
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
}

impl ArgumentRecord {
    /// Resolve this record against the buffer it was parsed from
    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.offset + self.len]
    }
}

/// A raw block declared on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawBlockSpec {
    /// Index of the argument the block replaces
    pub arg_index: usize,
    /// Declared payload size in bytes
    pub bytes: usize,
}

/// Result of parsing one line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    /// Argument records, left to right
    pub args: Vec<ArgumentRecord, MAX_ARGS>,
    /// Raw blocks, in declaration order
    pub raws: Vec<RawBlockSpec, MAX_ARGS>,
}

/// Parse a raw block declaration (`&<decimal>`)
///
/// Returns `Ok(None)` when the token is not a declaration at all (does not
/// start with `&`, or is a lone `&`).
pub fn parse_raw_count(token: &[u8], max_size: usize) -> Result<Option<usize>, ParseError> {
    if token.len() < 2 || token[0] != RAW_MARKER {
        return Ok(None);
    }

    let mut count: usize = 0;
    for &digit in &token[1..] {
        if !digit.is_ascii_digit() {
            return Err(ParseError::MalformedRawCount);
        }
        count = count
            .checked_mul(10)
            .and_then(|c| c.checked_add((digit - b'0') as usize))
            .ok_or(ParseError::RawCountTooLarge)?;
    }

    if count >= max_size {
        return Err(ParseError::RawCountTooLarge);
    }
    Ok(Some(count))
}

/// Split a line into argument records
///
/// A line with K delimiters yields K+1 records; an empty line yields none.
/// `max_size` bounds raw block declarations so that no declared block can
/// exceed what the buffer could ever hold.
pub fn parse_line(line: &[u8], max_size: usize) -> Result<ParsedLine, ParseError> {
    let mut parsed = ParsedLine::default();
    if line.is_empty() {
        return Ok(parsed);
    }

    let mut start = 0;
    loop {
        let end = line[start..]
            .iter()
            .position(|&b| b == DELIMITER)
            .map(|i| start + i);
        let record = ArgumentRecord {
            offset: start,
            len: end.unwrap_or(line.len()) - start,
        };

        let arg_index = parsed.args.len();
        parsed
            .args
            .push(record)
            .map_err(|_| ParseError::TooManyArgs)?;

        if let Some(bytes) = parse_raw_count(record.slice(line), max_size)? {
            parsed
                .raws
                .push(RawBlockSpec { arg_index, bytes })
                .map_err(|_| ParseError::TooManyArgs)?;
        }

        match end {
            // A trailing delimiter produces one more, empty, record
            Some(end) => start = end + 1,
            None => break,
        }
    }

    Ok(parsed)
}
