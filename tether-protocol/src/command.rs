//! Command decoding
//!
//! Every command line has the shape `<label>|<command>[|<arg>...]`. The
//! label routes replies back to the requester; the command name selects
//! one of the actions below, each with a fixed record count (label and
//! command name included).
//!
//! | Command   | Records | Arguments              |
//! |-----------|---------|------------------------|
//! | `reset`   | 2       |                        |
//! | `eval`    | 3       | source                 |
//! | `load`    | 4       | module name, source    |
//! | `compile` | 4       | module name, source    |
//! | `msg`     | 4       | topic, payload         |

/// Command selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    Reset,
    Eval,
    Load,
    Compile,
    Msg,
}

impl CommandKind {
    /// Look up a command by its wire name
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"reset" => Some(Self::Reset),
            b"eval" => Some(Self::Eval),
            b"load" => Some(Self::Load),
            b"compile" => Some(Self::Compile),
            b"msg" => Some(Self::Msg),
            _ => None,
        }
    }

    /// Wire name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Eval => "eval",
            Self::Load => "load",
            Self::Compile => "compile",
            Self::Msg => "msg",
        }
    }

    /// Required record count, label and command name included
    pub const fn arg_count(self) -> usize {
        match self {
            Self::Reset => 2,
            Self::Eval => 3,
            Self::Load | Self::Compile | Self::Msg => 4,
        }
    }

    /// Whether the command answers with `ret|ok` / `ret|fail`
    pub const fn replies(self) -> bool {
        !matches!(self, Self::Msg)
    }
}

/// Errors decoding a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Fewer than two records; there is no command name
    Incomplete,
    /// Command name not recognized
    UnknownCommand,
    /// Record count does not match what the command requires
    ArgCount {
        command: CommandKind,
        expected: usize,
        given: usize,
    },
}

/// A decoded command borrowing its arguments from the loader buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Reinitialize scripting state
    Reset,
    /// Compile and run an inline script
    Eval { source: &'a [u8] },
    /// Compile and run a module, keeping its result under `name`
    Load { name: &'a [u8], source: &'a [u8] },
    /// Compile a module and emit its serialized form
    Compile { name: &'a [u8], source: &'a [u8] },
    /// Deliver a message to the registered handler
    Msg { topic: &'a [u8], payload: &'a [u8] },
}

impl<'a> Command<'a> {
    /// Decode from a full record list (label first)
    pub fn decode(fields: &[&'a [u8]]) -> Result<Self, CommandError> {
        if fields.len() < 2 {
            return Err(CommandError::Incomplete);
        }
        let kind = CommandKind::from_name(fields[1]).ok_or(CommandError::UnknownCommand)?;
        if fields.len() != kind.arg_count() {
            return Err(CommandError::ArgCount {
                command: kind,
                expected: kind.arg_count(),
                given: fields.len(),
            });
        }

        Ok(match kind {
            CommandKind::Reset => Command::Reset,
            CommandKind::Eval => Command::Eval { source: fields[2] },
            CommandKind::Load => Command::Load {
                name: fields[2],
                source: fields[3],
            },
            CommandKind::Compile => Command::Compile {
                name: fields[2],
                source: fields[3],
            },
            CommandKind::Msg => Command::Msg {
                topic: fields[2],
                payload: fields[3],
            },
        })
    }

    /// Selector for this command
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Reset => CommandKind::Reset,
            Command::Eval { .. } => CommandKind::Eval,
            Command::Load { .. } => CommandKind::Load,
            Command::Compile { .. } => CommandKind::Compile,
            Command::Msg { .. } => CommandKind::Msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_eval() {
        let cmd = Command::decode(&[b"t1", b"eval", b"print(1+1)"]).unwrap();
        assert_eq!(cmd, Command::Eval { source: b"print(1+1)" });
    }

    #[test]
    fn test_decode_compile() {
        let cmd = Command::decode(&[b"t1", b"compile", b"foo", b"return 1"]).unwrap();
        assert_eq!(
            cmd,
            Command::Compile {
                name: b"foo",
                source: b"return 1"
            }
        );
        assert_eq!(cmd.kind(), CommandKind::Compile);
    }

    #[test]
    fn test_arg_count_enforced() {
        assert_eq!(
            Command::decode(&[b"t1", b"eval"]),
            Err(CommandError::ArgCount {
                command: CommandKind::Eval,
                expected: 3,
                given: 2
            })
        );
        assert_eq!(
            Command::decode(&[b"t1", b"reset", b"extra"]),
            Err(CommandError::ArgCount {
                command: CommandKind::Reset,
                expected: 2,
                given: 3
            })
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            Command::decode(&[b"t1", b"frobnicate"]),
            Err(CommandError::UnknownCommand)
        );
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(Command::decode(&[b"t1"]), Err(CommandError::Incomplete));
    }

    #[test]
    fn test_only_msg_is_silent() {
        assert!(CommandKind::Eval.replies());
        assert!(!CommandKind::Msg.replies());
        assert_eq!(CommandKind::from_name(b"msg"), Some(CommandKind::Msg));
    }
}
