//! Byte-fed command loader
//!
//! Turns an unreliable byte stream into complete commands:
//!
//! ```text
//!            ┌──────────── newline, no raw blocks ──────────────┐
//!            │                                                  ▼
//!   ┌──────┐ │ newline, raw pending  ┌───────────────┐ last  ┌──────────┐
//!   │ Line ├─┴──────────────────────▶│ CollectingRaw ├──────▶│  Ready   │
//!   └──────┘                         └───────────────┘ block └──────────┘
//!      ▲  │ overflow / bad terminator        │                    │
//!      │  ▼                                  ▼                    │
//!   ┌────────────┐◀───────────────────────────┘                   │
//!   │ Discarding │── newline ──▶ Line ◀──────── finish() ─────────┘
//!   └────────────┘
//! ```
//!
//! The loader never dispatches a partial command: after
//! [`Feed::Ready`] the caller reads [`Loader::args`] and then calls
//! [`Loader::finish`].

use heapless::Vec;

use crate::buffer::{BufferError, FramedBuffer};
use crate::parser::{self, ArgumentRecord, ParseError, RawBlockSpec, DELIMITER, MAX_ARGS, TERMINATOR};

/// Errors reported while feeding bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoaderError {
    /// The buffer overflowed; input is dropped until the next newline
    Overflow(BufferError),
    /// The line could not be parsed and was discarded
    Parse(ParseError),
    /// A raw block was not followed by a newline; input is dropped until
    /// the next newline
    MissingRawTerminator,
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feed {
    /// More bytes are needed
    Pending,
    /// A complete command is available through [`Loader::args`]
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    /// Accumulating the command line
    Line,
    /// Accumulating raw block `index`, `read` bytes seen so far
    CollectingRaw { index: usize, read: usize },
    /// Command assembled, waiting for `finish`
    Ready,
    /// Line rejected by the parser, kept readable until the next byte
    Rejected,
    /// Dropping input until a newline
    Discarding,
}

/// Command loader state machine
#[derive(Debug)]
pub struct Loader {
    buffer: FramedBuffer,
    args: Vec<ArgumentRecord, MAX_ARGS>,
    raws: Vec<RawBlockSpec, MAX_ARGS>,
    state: State,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(FramedBuffer::default())
    }
}

impl Loader {
    /// Create a loader over the given buffer
    pub fn new(buffer: FramedBuffer) -> Self {
        Self {
            buffer,
            args: Vec::new(),
            raws: Vec::new(),
            state: State::Line,
        }
    }

    /// Access the underlying buffer
    pub fn buffer(&self) -> &FramedBuffer {
        &self.buffer
    }

    /// Forget any partial input and return to the line state
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.args.clear();
        self.raws.clear();
        self.state = State::Line;
    }

    /// Release a completed command; the records become invalid
    pub fn finish(&mut self) {
        self.reset();
    }

    /// True while the loader waits for the next newline to resynchronize
    pub fn is_discarding(&self) -> bool {
        self.state == State::Discarding
    }

    /// True while raw block bytes are being collected
    pub fn is_collecting_raw(&self) -> bool {
        matches!(self.state, State::CollectingRaw { .. })
    }

    /// Number of records in the assembled command
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Argument `index` of the assembled command
    pub fn arg(&self, index: usize) -> Option<&[u8]> {
        self.args
            .get(index)
            .map(|record| record.slice(self.buffer.as_slice()))
    }

    /// Iterate the argument byte slices of the assembled command
    pub fn args(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let buf = self.buffer.as_slice();
        self.args.iter().map(move |record| record.slice(buf))
    }

    /// Argument records of the assembled command
    pub fn records(&self) -> &[ArgumentRecord] {
        &self.args
    }

    /// Best-effort view of the first two fields of the pending line
    ///
    /// Used to route a diagnostic for a line that failed to parse.
    pub fn header(&self) -> (&[u8], Option<&[u8]>) {
        if let (Some(label), Some(command)) = (self.arg(0), self.arg(1)) {
            return (label, Some(command));
        }
        let mut fields = self.buffer.as_slice().splitn(3, |&b| b == DELIMITER);
        let label = fields.next().unwrap_or_default();
        let command = fields
            .next()
            .map(|c| c.strip_suffix(&[TERMINATOR]).unwrap_or(c));
        (label.strip_suffix(&[TERMINATOR]).unwrap_or(label), command)
    }

    /// Feed a single byte
    ///
    /// On `Err` the current line has been discarded (or, for overflow and
    /// framing errors, the loader drops bytes until the next newline). The
    /// buffer contents stay readable through [`header`](Self::header) until
    /// the next byte is fed.
    pub fn feed(&mut self, byte: u8) -> Result<Feed, LoaderError> {
        match self.state {
            State::Ready | State::Rejected => {
                // Previous command never released; drop it
                self.reset();
            }
            State::Discarding => {
                if byte == TERMINATOR {
                    self.reset();
                }
                return Ok(Feed::Pending);
            }
            _ => {}
        }

        if let Err(e) = self.buffer.add(byte) {
            if byte == TERMINATOR && self.state == State::Line {
                // The terminator itself did not fit: the line is over
                self.reset();
            } else {
                self.state = State::Discarding;
            }
            return Err(LoaderError::Overflow(e));
        }

        match self.state {
            State::Line => self.feed_line(byte),
            State::CollectingRaw { index, read } => self.feed_raw(byte, index, read + 1),
            State::Ready | State::Rejected | State::Discarding => Ok(Feed::Pending),
        }
    }

    fn feed_line(&mut self, byte: u8) -> Result<Feed, LoaderError> {
        if byte != TERMINATOR {
            return Ok(Feed::Pending);
        }
        self.buffer.pop();

        let parsed = match parser::parse_line(self.buffer.as_slice(), self.buffer.max_size()) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.args.clear();
                self.raws.clear();
                self.state = State::Rejected;
                return Err(LoaderError::Parse(e));
            }
        };
        self.args = parsed.args;
        self.raws = parsed.raws;

        if self.args.is_empty() {
            self.reset();
            return Ok(Feed::Pending);
        }
        if self.raws.is_empty() {
            self.state = State::Ready;
            return Ok(Feed::Ready);
        }
        self.state = State::CollectingRaw { index: 0, read: 0 };
        Ok(Feed::Pending)
    }

    fn feed_raw(&mut self, byte: u8, index: usize, read: usize) -> Result<Feed, LoaderError> {
        let spec = self.raws[index];
        if read < spec.bytes + 1 {
            self.state = State::CollectingRaw { index, read };
            return Ok(Feed::Pending);
        }

        if byte != TERMINATOR {
            self.buffer.mark_overflow();
            self.state = State::Discarding;
            return Err(LoaderError::MissingRawTerminator);
        }
        self.buffer.pop();

        self.args[spec.arg_index] = ArgumentRecord {
            offset: self.buffer.len() - spec.bytes,
            len: spec.bytes,
        };

        if index + 1 == self.raws.len() {
            self.state = State::Ready;
            Ok(Feed::Ready)
        } else {
            self.state = State::CollectingRaw {
                index: index + 1,
                read: 0,
            };
            Ok(Feed::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::vec::Vec as StdVec;

    /// Feed bytes, collecting every completed command's arguments
    fn feed_all(loader: &mut Loader, bytes: &[u8]) -> StdVec<StdVec<StdVec<u8>>> {
        let mut commands = StdVec::new();
        for &b in bytes {
            if let Ok(Feed::Ready) = loader.feed(b) {
                commands.push(loader.args().map(|a| a.to_vec()).collect());
                loader.finish();
            }
        }
        commands
    }

    fn owned(fields: &[&[u8]]) -> StdVec<StdVec<u8>> {
        fields.iter().map(|f| f.to_vec()).collect()
    }

    #[test]
    fn test_simple_command() {
        let mut loader = Loader::default();
        let cmds = feed_all(&mut loader, b"t1|eval|print(1+1)\n");
        assert_eq!(cmds, [owned(&[b"t1", b"eval", b"print(1+1)"])]);
    }

    #[test]
    fn test_two_commands_back_to_back() {
        let mut loader = Loader::default();
        let cmds = feed_all(&mut loader, b"a|reset\nb|reset\n");
        assert_eq!(cmds, [owned(&[b"a", b"reset"]), owned(&[b"b", b"reset"])]);
    }

    #[test]
    fn test_raw_block_is_binary_safe() {
        let mut loader = Loader::default();
        let cmds = feed_all(&mut loader, b"t1|eval|&5\na|\n\x00b\n");
        assert_eq!(cmds, [owned(&[b"t1", b"eval", b"a|\n\x00b"])]);
    }

    #[test]
    fn test_multiple_raw_blocks_in_declaration_order() {
        let mut loader = Loader::default();
        let cmds = feed_all(&mut loader, b"t|msg|&2|&3\nab\nc|d\n");
        assert_eq!(cmds, [owned(&[b"t", b"msg", b"ab", b"c|d"])]);
    }

    #[test]
    fn test_zero_length_raw_block() {
        let mut loader = Loader::default();
        let cmds = feed_all(&mut loader, b"t|eval|&0\n\n");
        assert_eq!(cmds, [owned(&[b"t", b"eval", b""])]);
    }

    #[test]
    fn test_missing_raw_terminator_discards_until_newline() {
        let mut loader = Loader::default();
        for &b in b"t|eval|&2\nabX" {
            let _ = loader.feed(b);
        }
        assert!(loader.is_discarding());
        // garbage up to the next newline is dropped, then input resumes
        let cmds = feed_all(&mut loader, b"junk\nt|reset\n");
        assert_eq!(cmds, [owned(&[b"t", b"reset"])]);
    }

    #[test]
    fn test_missing_raw_terminator_error() {
        let mut loader = Loader::default();
        let mut last = Ok(Feed::Pending);
        for &b in b"t|eval|&1\nab" {
            last = loader.feed(b);
        }
        assert_eq!(last, Err(LoaderError::MissingRawTerminator));
    }

    #[test]
    fn test_parse_error_discards_line() {
        let mut loader = Loader::default();
        let mut errors = 0;
        for &b in b"t|eval|&x\n" {
            if loader.feed(b).is_err() {
                errors += 1;
            }
        }
        assert_eq!(errors, 1);
        assert_eq!(loader.header(), (&b"t"[..], Some(&b"eval"[..])));
        let cmds = feed_all(&mut loader, b"t|reset\n");
        assert_eq!(cmds, [owned(&[b"t", b"reset"])]);
    }

    #[test]
    fn test_oversize_raw_rejected_before_collecting() {
        let mut loader = Loader::new(FramedBuffer::growable(16, 32));
        let mut last = Ok(Feed::Pending);
        for &b in b"t|eval|&32\n" {
            last = loader.feed(b);
        }
        assert_eq!(last, Err(LoaderError::Parse(ParseError::RawCountTooLarge)));
        assert!(!loader.is_collecting_raw());
        assert_eq!(loader.buffer().size(), 16);
    }

    #[test]
    fn test_overflow_recovers_on_newline() {
        let mut loader = Loader::new(FramedBuffer::growable(8, 8));
        let mut overflowed = false;
        for &b in b"t|eval|0123456789" {
            if let Err(LoaderError::Overflow(_)) = loader.feed(b) {
                overflowed = true;
            }
        }
        assert!(overflowed);
        assert!(loader.is_discarding());
        let cmds = feed_all(&mut loader, b"\nt|reset\n");
        assert_eq!(cmds, [owned(&[b"t", b"reset"])]);
    }

    #[test]
    fn test_terminator_overflow_ends_line() {
        let mut loader = Loader::new(FramedBuffer::growable(4, 4));
        let cmds = feed_all(&mut loader, b"a|bc\nx|y\n");
        // "a|bc" fills the buffer; its newline overflows and closes the line
        assert_eq!(cmds, [owned(&[b"x", b"y"])]);
    }

    #[test]
    fn test_empty_line_ignored() {
        let mut loader = Loader::default();
        assert_eq!(loader.feed(b'\n'), Ok(Feed::Pending));
        assert_eq!(loader.buffer().len(), 0);
    }

    proptest! {
        #[test]
        fn prop_bytewise_matches_whole_line(
            parts in proptest::collection::vec("[ -{}~]{0,8}", 2..8)
        ) {
            let line = parts.join("|");
            let mut input = line.clone().into_bytes();
            input.push(b'\n');

            let mut loader = Loader::default();
            let cmds = feed_all(&mut loader, &input);

            let parsed = parser::parse_line(line.as_bytes(), loader.buffer().max_size());
            match parsed {
                Ok(parsed) if parsed.raws.is_empty() => {
                    let want: StdVec<StdVec<u8>> = parsed
                        .args
                        .iter()
                        .map(|a| a.slice(line.as_bytes()).to_vec())
                        .collect();
                    prop_assert_eq!(cmds, [want]);
                }
                _ => {}
            }
        }

        #[test]
        fn prop_raw_block_roundtrips_any_bytes(
            payload in proptest::collection::vec(any::<u8>(), 0..64)
        ) {
            let mut input = StdVec::new();
            input.extend_from_slice(b"t|eval|&");
            input.extend_from_slice(payload.len().to_string().as_bytes());
            input.push(b'\n');
            input.extend_from_slice(&payload);
            input.push(b'\n');

            let mut loader = Loader::default();
            let cmds = feed_all(&mut loader, &input);
            prop_assert_eq!(cmds.len(), 1);
            prop_assert_eq!(&cmds[0][2], &payload);
        }
    }
}
