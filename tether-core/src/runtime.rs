//! Host-pumped runtime
//!
//! Ties the loader, dispatcher, scheduler and console together. The board
//! firmware owns the outer loop and calls in with whatever it observed:
//!
//! ```ignore
//! loop {
//!     let n = uart.read_available(&mut rx);
//!     let sleep = runtime.poll(usb.connected(), &rx[..n], irq.take());
//!     wait_for_event_or(sleep);
//! }
//! ```
//!
//! Nothing here blocks; every call runs to completion and reports how long
//! the caller may sleep before calling again.

use embedded_io::Write;
use heapless::Vec;
use tether_protocol::{CommandKind, Feed, FramedBuffer, Loader, LoaderError, MAX_ARGS};

use crate::clock::MillisSource;
use crate::config::RuntimeConfig;
use crate::console::{with_label, Console, SerialConsole};
use crate::diagnostic;
use crate::dispatch::{text, Dispatcher};
use crate::engine::{MessageHook, ScriptEngine};
use crate::label::Label;
use crate::scheduler::Scheduler;
use crate::trace::{debug, warn};

/// Firmware core: command loader plus task scheduler
pub struct Runtime<E: ScriptEngine, S, W> {
    loader: Loader,
    engine: E,
    dispatcher: Dispatcher<E>,
    scheduler: Scheduler<E::Task, E::Args, S>,
    console: SerialConsole<W>,
    connected: bool,
    config: RuntimeConfig,
}

impl<E, S, W> Runtime<E, S, W>
where
    E: ScriptEngine,
    S: MillisSource,
    W: Write,
{
    /// Create a runtime with a growable loader buffer
    pub fn new(config: RuntimeConfig, engine: E, clock: S, out: W) -> Self {
        let buffer = config.loader.buffer();
        Self::with_buffer(config, buffer, engine, clock, out)
    }

    /// Create a runtime over a caller-supplied loader buffer
    pub fn with_buffer(
        config: RuntimeConfig,
        buffer: FramedBuffer,
        engine: E,
        clock: S,
        out: W,
    ) -> Self {
        Self {
            loader: Loader::new(buffer),
            engine,
            dispatcher: Dispatcher::new(),
            scheduler: Scheduler::with_idle_sleep(clock, config.scheduler.idle_sleep_ms),
            console: SerialConsole::new(out),
            connected: false,
            config,
        }
    }

    /// Register the handler for `msg` commands
    pub fn on_message(&mut self, hook: MessageHook<E>) {
        self.dispatcher.on_message(hook);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn scheduler(&self) -> &Scheduler<E::Task, E::Args, S> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<E::Task, E::Args, S> {
        &mut self.scheduler
    }

    pub fn console(&self) -> &SerialConsole<W> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut SerialConsole<W> {
        &mut self.console
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Service the serial link
    ///
    /// On a new connection the loader is reset and the version banner sent
    /// before `input` is fed. While disconnected nothing is consumed.
    /// Returns 0 if anything happened, else the configured poll sleep.
    pub fn service(&mut self, connected: bool, input: &[u8]) -> u32 {
        if !connected {
            if self.connected {
                debug!("link down");
                self.connected = false;
            }
            return self.config.poll_sleep_ms;
        }
        if !self.connected {
            self.connected = true;
            self.loader.reset();
            self.console.set_label(Label::idle());
            self.console
                .version(self.config.name.as_str(), self.config.version.as_str());
            debug!("link up");
            self.feed(input);
            return 0;
        }
        if input.is_empty() {
            return self.config.poll_sleep_ms;
        }
        self.feed(input);
        0
    }

    /// Feed received bytes, dispatching every command they complete
    pub fn feed(&mut self, input: &[u8]) {
        for &byte in input {
            match self.loader.feed(byte) {
                Ok(Feed::Pending) => {}
                Ok(Feed::Ready) => {
                    self.dispatch_loaded();
                    self.loader.finish();
                }
                Err(e) => self.reject(e),
            }
        }
    }

    /// Run one scheduler tick; see [`Scheduler::tick`]
    pub fn tick(&mut self, interrupts: u32) -> u32 {
        self.scheduler
            .tick(&mut self.engine, &mut self.console, interrupts)
    }

    /// Service the link, then tick; returns the smaller suggested sleep
    pub fn poll(&mut self, connected: bool, input: &[u8], interrupts: u32) -> u32 {
        let service = self.service(connected, input);
        let tick = self.tick(interrupts);
        service.min(tick)
    }

    fn dispatch_loaded(&mut self) {
        let mut fields: Vec<&[u8], MAX_ARGS> = Vec::new();
        for arg in self.loader.args() {
            let _ = fields.push(arg);
        }
        self.dispatcher.dispatch(
            &fields,
            &mut self.engine,
            &mut self.scheduler,
            &mut self.console,
        );
    }

    /// Report a line the loader gave up on
    fn reject(&mut self, error: LoaderError) {
        warn!("rejected input: {}", error);
        let (label, command) = self.loader.header();
        let label = match Label::new(label) {
            Ok(label) if !label.as_bytes().is_empty() => label,
            _ => Label::idle(),
        };
        let replies = command
            .and_then(CommandKind::from_name)
            .map_or(true, CommandKind::replies);

        with_label(&mut self.console, label, |console| match error {
            LoaderError::Overflow(_) => {
                diagnostic!(console, "command too long");
            }
            LoaderError::Parse(e) => {
                diagnostic!(console, "bad command line,{:?}", e);
                if replies {
                    console.ret(false);
                }
            }
            LoaderError::MissingRawTerminator => {
                diagnostic!(
                    console,
                    "expected newline after raw block,{}",
                    command.map(text).unwrap_or("")
                );
                if replies {
                    console.ret(false);
                }
            }
        });
    }
}
