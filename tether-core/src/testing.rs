//! Test doubles shared by the unit tests

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::clock::MillisSource;
use crate::diagnostic;
use crate::engine::{Host, ScriptEngine, ScriptError, ScriptErrorKind};
use crate::label::Label;
use crate::task::{Step, TaskId, TaskRunner, Wake};

/// Millisecond counter the test moves by hand
#[derive(Debug, Clone)]
pub struct FakeMillis(Rc<Cell<u32>>);

impl FakeMillis {
    pub fn new(start: u32) -> Self {
        Self(Rc::new(Cell::new(start)))
    }

    pub fn set(&self, ms: u32) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl MillisSource for FakeMillis {
    fn millis(&mut self) -> u32 {
        self.0.get()
    }
}

/// Serial sink recording everything written
#[derive(Debug, Default)]
pub struct Capture {
    bytes: Vec<u8>,
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(ToString::to_string).collect()
    }
}

impl embedded_io::ErrorType for Capture {
    type Error = Infallible;
}

impl embedded_io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Task that replays a fixed list of steps, then finishes
#[derive(Debug)]
pub struct MockTask {
    pub name: &'static str,
    steps: VecDeque<Step>,
    spawn: Option<&'static str>,
    killed: Rc<Cell<bool>>,
}

impl MockTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: VecDeque::new(),
            spawn: None,
            killed: Rc::new(Cell::new(false)),
        }
    }

    /// Append a step to return from the next resume
    pub fn then(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    /// Start a child task on the first resume
    pub fn spawning(mut self, child: &'static str) -> Self {
        self.spawn = Some(child);
        self
    }

    /// Handle to mark the task terminated from outside
    pub fn kill_switch(&self) -> Rc<Cell<bool>> {
        self.killed.clone()
    }
}

/// Script engine understanding a handful of canned sources
///
/// - `print(<a>+<b>)` prints the sum, `print(<x>)` prints `x`
/// - `spawn <ms>` starts a task named `spawned`
/// - anything starting with `syntax` fails to compile
/// - anything else succeeds silently
#[derive(Debug, Default)]
pub struct MockEngine {
    pub resumed: Vec<(&'static str, Wake<u32>)>,
    pub released: Vec<&'static str>,
    pub evaluated: Vec<Vec<u8>>,
    pub modules: Vec<(Vec<u8>, Vec<u8>)>,
    pub messages: Vec<(Vec<u8>, Vec<u8>)>,
    pub spawned: Vec<TaskId>,
    pub resets: u32,
}

impl MockEngine {
    /// Serialized form produced by `compile`
    pub fn bytecode(source: &[u8]) -> Vec<u8> {
        let mut out = b"\x1bTB".to_vec();
        out.extend_from_slice(source);
        out
    }

    fn check_syntax(source: &[u8]) -> Result<&str, ScriptError> {
        let text =
            core::str::from_utf8(source).map_err(|_| ScriptError::syntax("invalid utf-8"))?;
        if text.starts_with("syntax") {
            return Err(ScriptError::syntax("unexpected symbol"));
        }
        Ok(text)
    }
}

impl TaskRunner for MockEngine {
    type Task = MockTask;
    type Args = u32;

    fn resume(
        &mut self,
        task: &mut MockTask,
        wake: Wake<u32>,
        host: &mut Host<'_, MockTask, u32>,
    ) -> Step {
        self.resumed.push((task.name, wake));
        host.console().print(task.name.as_bytes());

        if let Some(child) = task.spawn.take() {
            if let Ok(id) = host.start(MockTask::new(child), 0, 0) {
                self.spawned.push(id);
            }
        }

        let step = task.steps.pop_front().unwrap_or(Step::Done);
        if step == Step::Failed {
            diagnostic!(host.console(), "runtime,{} failed", task.name);
        }
        step
    }

    fn is_terminated(&mut self, task: &MockTask) -> bool {
        task.killed.get()
    }

    fn release(&mut self, task: MockTask) {
        self.released.push(task.name);
    }
}

impl ScriptEngine for MockEngine {
    fn reset(&mut self, _host: &mut Host<'_, MockTask, u32>) {
        self.resets += 1;
        self.modules.clear();
    }

    fn eval(&mut self, source: &[u8], host: &mut Host<'_, MockTask, u32>) -> Result<(), ScriptError> {
        self.evaluated.push(source.to_vec());
        let text = Self::check_syntax(source)?;

        if let Some(rest) = text.strip_prefix("tag ") {
            let (label, output) = rest.split_once(' ').unwrap_or((rest, ""));
            let label = Label::new(label.as_bytes()).map_err(|_| ScriptError::runtime("bad label"))?;
            host.with_label(label, |console| console.print(output.as_bytes()));
            return Ok(());
        }

        if let Some(delay) = text.strip_prefix("spawn ") {
            let delay = delay
                .trim()
                .parse()
                .map_err(|_| ScriptError::runtime("bad delay"))?;
            let id = host
                .start(MockTask::new("spawned"), delay, 0)
                .map_err(|_| ScriptError::new(ScriptErrorKind::Memory, "task table full"))?;
            self.spawned.push(id);
            return Ok(());
        }

        if let Some(expr) = text.strip_prefix("print(").and_then(|t| t.strip_suffix(')')) {
            let sum = expr
                .split_once('+')
                .and_then(|(a, b)| Some(a.trim().parse::<i64>().ok()? + b.trim().parse::<i64>().ok()?));
            let value = match sum {
                Some(sum) => sum.to_string(),
                None => expr.to_string(),
            };
            host.console().print(value.as_bytes());
        }
        Ok(())
    }

    fn load(
        &mut self,
        name: &[u8],
        source: &[u8],
        _host: &mut Host<'_, MockTask, u32>,
    ) -> Result<(), ScriptError> {
        Self::check_syntax(source)?;
        // Empty source stands in for a module that returns nil
        if source.is_empty() {
            return Ok(());
        }
        self.modules.retain(|(existing, _)| existing != name);
        self.modules.push((name.to_vec(), source.to_vec()));
        Ok(())
    }

    fn compile(&mut self, _name: &[u8], source: &[u8]) -> Result<alloc::vec::Vec<u8>, ScriptError> {
        Self::check_syntax(source)?;
        Ok(Self::bytecode(source))
    }
}
