//! Label-prefixed serial output
//!
//! The console is the single outbound path: command replies, diagnostics,
//! script output and the connect banner all go through [`Console::emit`],
//! which prefixes the current routing label.

use core::fmt::{self, Write as _};

use embedded_io::Write;
use heapless::{String, Vec};
use tether_protocol::record::{self, RET_FAIL, RET_OK, TAG_DUMP, TAG_ERROR, TAG_RET, TAG_VERSION};

use crate::label::Label;
use crate::trace::warn;

/// Maximum fields per outbound record, label excluded
pub const MAX_FIELDS: usize = 8;

/// Maximum length of a diagnostic's text
pub const MAX_DIAGNOSTIC_LEN: usize = 192;

/// Outbound line sink carrying the current routing label
pub trait Console {
    /// Current routing label
    fn label(&self) -> &Label;

    /// Replace the current routing label
    fn set_label(&mut self, label: Label);

    /// Write `<label>|<field>...` as one record
    fn emit(&mut self, fields: &[&[u8]]);

    /// Script output line
    fn print(&mut self, text: &[u8]) {
        self.emit(&[text]);
    }

    /// `ret|ok` or `ret|fail`
    fn ret(&mut self, ok: bool) {
        self.emit(&[TAG_RET, if ok { RET_OK } else { RET_FAIL }]);
    }

    /// `error|<file>:<line>,<details>`
    fn diagnostic(&mut self, file: &str, line: u32, details: fmt::Arguments<'_>) {
        let mut text = Truncating::<MAX_DIAGNOSTIC_LEN>::default();
        let _ = write!(text, "{}:{},", file, line);
        let _ = text.write_fmt(details);
        self.emit(&[TAG_ERROR, text.0.as_bytes()]);
    }

    /// `dump|<name>|<hex>` lines, wrapped at 80 hex digits
    fn dump(&mut self, name: &[u8], bytes: &[u8]) {
        for line in record::hex_lines(bytes) {
            self.emit(&[TAG_DUMP, name, line.as_bytes()]);
        }
    }

    /// `version|<name>,<version>`
    fn version(&mut self, name: &str, version: &str) {
        let mut text = Truncating::<64>::default();
        let _ = write!(text, "{},{}", name, version);
        self.emit(&[TAG_VERSION, text.0.as_bytes()]);
    }
}

/// Emit a diagnostic tagged with the calling source location
///
/// `$console` is a mutable reference to a [`Console`].
#[macro_export]
macro_rules! diagnostic {
    ($console:expr, $($arg:tt)*) => {
        $crate::console::Console::diagnostic(
            &mut *$console,
            ::core::file!(),
            ::core::line!(),
            ::core::format_args!($($arg)*),
        )
    };
}

/// Run `f` with `label` as the routing label, then restore the previous one
///
/// The previous label is restored on every path out of `f`, including when
/// `f` reports failure through its return value. Overrides nest.
pub fn with_label<C, R>(console: &mut C, label: Label, f: impl FnOnce(&mut C) -> R) -> R
where
    C: Console + ?Sized,
{
    let previous = console.label().clone();
    console.set_label(label);
    let result = f(console);
    console.set_label(previous);
    result
}

/// Formatter that keeps as much text as fits and drops the rest
#[derive(Default)]
struct Truncating<const N: usize>(String<N>);

impl<const N: usize> fmt::Write for Truncating<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Console writing records to an `embedded-io` serial writer
#[derive(Debug)]
pub struct SerialConsole<W> {
    out: W,
    label: Label,
    write_errors: u32,
}

impl<W: Write> SerialConsole<W> {
    /// Create a console with the idle label
    pub fn new(out: W) -> Self {
        Self {
            out,
            label: Label::idle(),
            write_errors: 0,
        }
    }

    /// Number of records lost to write errors
    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    /// Access the underlying writer
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Mutable access to the underlying writer
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.out
    }
}

impl<W: Write> Console for SerialConsole<W> {
    fn label(&self) -> &Label {
        &self.label
    }

    fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    fn emit(&mut self, fields: &[&[u8]]) {
        let mut line: Vec<&[u8], { MAX_FIELDS + 1 }> = Vec::new();
        let _ = line.push(self.label.as_bytes());
        for field in fields.iter().take(MAX_FIELDS) {
            let _ = line.push(*field);
        }

        let written = record::write_record(&mut self.out, &line).and_then(|_| self.out.flush());
        if written.is_err() {
            self.write_errors = self.write_errors.wrapping_add(1);
            warn!("console write failed");
        }
    }
}
