//! Command dispatch
//!
//! Maps an assembled command onto the script engine. The command's routing
//! label is installed on the console for the whole call and the previous
//! (idle) label restored afterwards, whatever the outcome.

use core::str;

use tether_protocol::{Command, CommandError, CommandKind};

use crate::clock::MillisSource;
use crate::console::{with_label, Console};
use crate::diagnostic;
use crate::engine::{Host, MessageHook, ScriptEngine};
use crate::label::Label;
use crate::scheduler::Scheduler;
use crate::trace::{debug, warn};

/// Printable view of a protocol field
pub(crate) fn text(field: &[u8]) -> &str {
    str::from_utf8(field).unwrap_or("?")
}

/// Routes commands to the script engine
pub struct Dispatcher<E: ScriptEngine> {
    on_message: Option<MessageHook<E>>,
}

impl<E: ScriptEngine> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScriptEngine> Dispatcher<E> {
    pub fn new() -> Self {
        Self { on_message: None }
    }

    /// Register the handler for `msg` commands, replacing any previous one
    pub fn on_message(&mut self, hook: MessageHook<E>) {
        self.on_message = Some(hook);
    }

    /// Dispatch one command given as its full record list, label first
    ///
    /// Returns true if the command ran and succeeded. Lists with fewer than
    /// two records are ignored.
    pub fn dispatch<S: MillisSource>(
        &mut self,
        fields: &[&[u8]],
        engine: &mut E,
        scheduler: &mut Scheduler<E::Task, E::Args, S>,
        console: &mut dyn Console,
    ) -> bool {
        if fields.len() < 2 {
            return false;
        }
        let label = match Label::new(fields[0]) {
            Ok(label) => label,
            Err(_) => {
                warn!("label too long ({=usize} bytes)", fields[0].len());
                with_label(console, Label::idle(), |console| {
                    diagnostic!(console, "label too long,{}", fields[0].len());
                    console.ret(false);
                });
                return false;
            }
        };

        with_label(console, label, |console| {
            self.run(fields, engine, scheduler, console)
        })
    }

    fn run<S: MillisSource>(
        &mut self,
        fields: &[&[u8]],
        engine: &mut E,
        scheduler: &mut Scheduler<E::Task, E::Args, S>,
        console: &mut dyn Console,
    ) -> bool {
        let command = match Command::decode(fields) {
            Ok(command) => command,
            Err(CommandError::Incomplete) => return false,
            Err(CommandError::UnknownCommand) => {
                warn!("unknown command");
                diagnostic!(console, "bad command,{}", text(fields[1]));
                console.ret(false);
                return false;
            }
            Err(CommandError::ArgCount {
                command,
                expected,
                given,
            }) => {
                warn!("{} expects {=usize} args, got {=usize}", command, expected, given);
                diagnostic!(
                    console,
                    "bad arg count,{},expected {},got {}",
                    command.name(),
                    expected,
                    given
                );
                if command.replies() {
                    console.ret(false);
                }
                return false;
            }
        };

        let kind = command.kind();
        debug!("dispatch {}", kind);

        if kind == CommandKind::Reset {
            scheduler.clear(&mut *engine);
        }

        let result = {
            let mut host = Host::new(&mut *scheduler, &mut *console);
            match command {
                Command::Reset => {
                    engine.reset(&mut host);
                    Ok(())
                }
                Command::Eval { source } => engine.eval(source, &mut host),
                Command::Load { name, source } => engine.load(name, source, &mut host),
                Command::Compile { name, source } => engine
                    .compile(name, source)
                    .map(|bytes| host.console().dump(name, &bytes)),
                Command::Msg { topic, payload } => match self.on_message {
                    Some(hook) => hook(engine, &mut host, topic, payload),
                    None => {
                        debug!("no message handler");
                        Ok(())
                    }
                },
            }
        };

        match result {
            Ok(()) => {
                if kind.replies() {
                    console.ret(true);
                }
                true
            }
            Err(e) => {
                diagnostic!(console, "{}", e);
                if kind.replies() {
                    console.ret(false);
                }
                false
            }
        }
    }
}
