//! Lifecycle of one spawned action process and the log it produces.
//!
//! A session starts `Running`. Aborting sends a single terminate request and
//! moves it to `Aborted`; the child exiting (for whatever reason) moves it to
//! `Finished`. All methods run on the UI thread, so shared sessions are plain
//! `Rc<RefCell<..>>` values.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const ABORT_NOTICE: &str = "Operation aborted by user.";

/// The process side of a session.
pub trait ChildHandle {
    /// Ask the child to exit (SIGTERM). Best effort.
    fn terminate(&self);

    /// Write raw text to the child's standard input.
    fn write_input(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Aborted,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    Signaled,
    SpawnFailed(Error),
}

impl Exit {
    pub fn success(&self) -> bool {
        matches!(self, Exit::Code(0))
    }

    fn describe(&self) -> String {
        match self {
            Exit::Code(0) => "Process finished successfully.".to_string(),
            Exit::Code(code) => format!("Process exited with code {}.", code),
            Exit::Signaled => "Process was terminated by a signal.".to_string(),
            Exit::SpawnFailed(e) => format!("Could not start process: {}", e),
        }
    }
}

type OutputListener = Box<dyn Fn(&str)>;
type StateListener = Box<dyn Fn(SessionState, Option<&Exit>)>;

pub struct ProcessSession<H: ChildHandle> {
    command: String,
    handle: Option<H>,
    log: String,
    state: SessionState,
    exit: Option<Exit>,
    output_listeners: Vec<OutputListener>,
    state_listeners: Vec<StateListener>,
}

impl<H: ChildHandle> ProcessSession<H> {
    pub fn new(command: impl Into<String>, handle: H) -> Self {
        Self {
            command: command.into(),
            handle: Some(handle),
            log: String::new(),
            state: SessionState::Running,
            exit: None,
            output_listeners: Vec::new(),
            state_listeners: Vec::new(),
        }
    }

    /// A session whose process never started. It is born finished.
    pub fn spawn_failed(command: impl Into<String>, error: Error) -> Self {
        let exit = Exit::SpawnFailed(error);
        let mut log = exit.describe();
        log.push('\n');
        Self {
            command: command.into(),
            handle: None,
            log,
            state: SessionState::Finished,
            exit: Some(exit),
            output_listeners: Vec::new(),
            state_listeners: Vec::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn exit(&self) -> Option<&Exit> {
        self.exit.as_ref()
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn is_alive(&self) -> bool {
        self.state != SessionState::Finished
    }

    pub fn connect_output<F: Fn(&str) + 'static>(&mut self, f: F) {
        self.output_listeners.push(Box::new(f));
    }

    pub fn connect_state_changed<F: Fn(SessionState, Option<&Exit>) + 'static>(&mut self, f: F) {
        self.state_listeners.push(Box::new(f));
    }

    /// Record a chunk of stdout or stderr text in arrival order.
    pub fn append_output(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.log.push_str(chunk);
        for listener in &self.output_listeners {
            listener(chunk);
        }
    }

    /// Returns `true` when a terminate request was actually sent.
    pub fn abort(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        if let Some(handle) = &self.handle {
            handle.terminate();
        }
        self.append_line(ABORT_NOTICE);
        self.set_state(SessionState::Aborted);
        true
    }

    /// Forward one line of user input, newline terminated.
    pub fn send_line(&self, text: &str) -> Result<()> {
        match (&self.handle, self.state) {
            (Some(handle), SessionState::Running | SessionState::Aborted) => {
                handle.write_input(&format!("{}\n", text))
            }
            _ => Err(Error::NotRunning),
        }
    }

    pub fn finish(&mut self, exit: Exit) {
        if self.state == SessionState::Finished {
            return;
        }
        self.append_line(&exit.describe());
        self.handle = None;
        self.exit = Some(exit);
        self.set_state(SessionState::Finished);
    }

    fn append_line(&mut self, line: &str) {
        let mut text = String::new();
        if !self.log.is_empty() && !self.log.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(line);
        text.push('\n');
        self.append_output(&text);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        for listener in &self.state_listeners {
            listener(state, self.exit.as_ref());
        }
    }
}

pub type SharedSession<H> = Rc<RefCell<ProcessSession<H>>>;

/// Sessions still worth terminating when the application shuts down.
pub struct SessionRegistry<H: ChildHandle> {
    inner: Rc<RefCell<BTreeMap<u64, SharedSession<H>>>>,
    next_id: Rc<RefCell<u64>>,
}

impl<H: ChildHandle> Clone for SessionRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<H: ChildHandle> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BTreeMap::new())),
            next_id: Rc::new(RefCell::new(0)),
        }
    }
}

impl<H: ChildHandle> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: SharedSession<H>) -> u64 {
        self.prune();
        let id = {
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            *next
        };
        self.inner.borrow_mut().insert(id, session);
        id
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .borrow()
            .values()
            .filter(|s| s.borrow().is_alive())
            .count()
    }

    /// Abort every running session. Returns how many were signalled.
    pub fn terminate_all(&self) -> usize {
        let sessions: Vec<_> = self.inner.borrow().values().cloned().collect();
        sessions
            .iter()
            .filter(|s| s.borrow_mut().abort())
            .count()
    }

    fn prune(&self) {
        self.inner.borrow_mut().retain(|_, s| s.borrow().is_alive());
    }
}
