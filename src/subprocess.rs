use crate::error::{Error, Result};
use crate::logger::{log_error, log_info, log_warning};
use crate::search::SearchRun;
use crate::session::{ChildHandle, Exit, ProcessSession, SharedSession};
use crate::yay::CommandSpec;
use gtk4::gio::prelude::*;
use gtk4::{gio, glib};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

const READ_CHUNK: usize = 4096;

/// How long output readers may keep going once the child has exited. A
/// grandchild holding the pipes open must not delay the end of the session.
const DRAIN_GRACE: Duration = Duration::from_millis(300);

/// `ChildHandle` backed by a GIO subprocess.
pub struct GioChild {
    process: gio::Subprocess,
    stdin: Option<Rc<InputWriter>>,
}

impl ChildHandle for GioChild {
    fn terminate(&self) {
        log_info(&format!(
            "Sending SIGTERM to process {}",
            self.process.identifier().as_deref().unwrap_or("?")
        ));
        self.process.send_signal(libc::SIGTERM);
    }

    fn write_input(&self, text: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_ref()
            .ok_or_else(|| Error::Io("standard input is not connected".to_string()))?;
        stdin.enqueue(text.as_bytes().to_vec());
        Ok(())
    }
}

/// Serialises writes to the child's stdin. GIO allows one pending operation
/// per stream, so lines are queued and written by a single drain future.
pub struct InputWriter {
    stream: gio::OutputStream,
    queue: RefCell<VecDeque<Vec<u8>>>,
    draining: Cell<bool>,
}

impl InputWriter {
    fn new(stream: gio::OutputStream) -> Rc<Self> {
        Rc::new(Self {
            stream,
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        })
    }

    fn enqueue(self: &Rc<Self>, bytes: Vec<u8>) {
        self.queue.borrow_mut().push_back(bytes);
        if self.draining.replace(true) {
            return;
        }
        glib::spawn_future_local(self.clone().drain());
    }

    async fn drain(self: Rc<Self>) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(buffer) = next else {
                break;
            };
            if let Err((_, e)) = self
                .stream
                .write_all_future(buffer, glib::Priority::DEFAULT)
                .await
            {
                let dropped = self.queue.borrow().len();
                log_warning(&format!(
                    "Failed to write to process input ({} queued line(s) dropped): {}",
                    dropped, e
                ));
                self.queue.borrow_mut().clear();
                break;
            }
        }
        self.draining.set(false);
    }
}

fn launcher(spec: &CommandSpec, flags: gio::SubprocessFlags) -> gio::SubprocessLauncher {
    let launcher = gio::SubprocessLauncher::new(flags);
    for (key, value) in &spec.env {
        launcher.setenv(key, value, true);
    }
    launcher
}

fn spawn_error(spec: &CommandSpec, e: glib::Error) -> Error {
    Error::Spawn {
        program: spec.program.clone(),
        reason: e.message().to_string(),
    }
}

/// Run `spec` to completion and capture both output streams.
pub async fn capture(spec: &CommandSpec) -> SearchRun {
    let flags = gio::SubprocessFlags::STDOUT_PIPE | gio::SubprocessFlags::STDERR_PIPE;
    let process = match launcher(spec, flags).spawn(&spec.argv()) {
        Ok(process) => process,
        Err(e) => return SearchRun::SpawnFailed(spawn_error(spec, e)),
    };

    match process.communicate_future(None).await {
        Ok((stdout, stderr)) => SearchRun::Completed {
            stdout: bytes_to_string(stdout),
            stderr: bytes_to_string(stderr),
            success: process.has_exited() && process.exit_status() == 0,
        },
        Err(e) => SearchRun::SpawnFailed(Error::from(e)),
    }
}

fn bytes_to_string(bytes: Option<glib::Bytes>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

/// Start `spec` with all three standard streams piped and feed its output
/// into a new session. A spawn failure yields an already finished session.
pub fn spawn_session(spec: &CommandSpec) -> SharedSession<GioChild> {
    let command = spec.to_string();
    let flags = gio::SubprocessFlags::STDIN_PIPE
        | gio::SubprocessFlags::STDOUT_PIPE
        | gio::SubprocessFlags::STDERR_PIPE;

    let process = match launcher(spec, flags).spawn(&spec.argv()) {
        Ok(process) => process,
        Err(e) => {
            let error = spawn_error(spec, e);
            log_error(&format!("{}", error));
            return Rc::new(RefCell::new(ProcessSession::spawn_failed(command, error)));
        }
    };
    log_info(&format!("Started: {}", command));

    let child = GioChild {
        process: process.clone(),
        stdin: process.stdin_pipe().map(InputWriter::new),
    };
    let session = Rc::new(RefCell::new(ProcessSession::new(command, child)));

    let drain = gio::Cancellable::new();
    let stdout_pump = glib::spawn_future_local(pump(
        process.stdout_pipe(),
        session.clone(),
        drain.clone(),
    ));
    let stderr_pump = glib::spawn_future_local(pump(
        process.stderr_pipe(),
        session.clone(),
        drain.clone(),
    ));

    let session_for_exit = session.clone();
    glib::spawn_future_local(async move {
        if let Err(e) = process.wait_future().await {
            log_warning(&format!("Waiting for process failed: {}", e));
        }
        // Give the readers a short window to pick up the tail of the output,
        // then stop them even if something still holds the pipes open.
        let cancel = drain.clone();
        glib::timeout_add_local_once(DRAIN_GRACE, move || cancel.cancel());
        let _ = stdout_pump.await;
        let _ = stderr_pump.await;

        let exit = exit_of(&process);
        log_info(&format!(
            "Finished: {} ({:?})",
            session_for_exit.borrow().command(),
            exit
        ));
        session_for_exit.borrow_mut().finish(exit);
    });

    session
}

fn exit_of(process: &gio::Subprocess) -> Exit {
    if process.has_exited() {
        Exit::Code(process.exit_status())
    } else if process.has_signaled() {
        Exit::Signaled
    } else {
        Exit::Code(-1)
    }
}

async fn pump(
    stream: Option<gio::InputStream>,
    session: SharedSession<GioChild>,
    drain: gio::Cancellable,
) {
    let Some(stream) = stream else {
        return;
    };
    let mut decoder = Utf8Decoder::default();
    loop {
        let read = stream.read_bytes_future(READ_CHUNK, glib::Priority::DEFAULT);
        match gio::CancellableFuture::new(read, drain.clone()).await {
            Err(_) => {
                log_warning("Output pipe still open after exit, stopped reading");
                break;
            }
            Ok(Ok(bytes)) if bytes.is_empty() => break,
            Ok(Ok(bytes)) => {
                let text = decoder.push(&bytes);
                session.borrow_mut().append_output(&text);
            }
            Ok(Err(e)) => {
                log_warning(&format!("Reading process output failed: {}", e));
                break;
            }
        }
    }
    let rest = decoder.flush();
    session.borrow_mut().append_output(&rest);
}

/// Decodes a byte stream chunk by chunk without splitting multi-byte
/// characters that straddle a read boundary.
#[derive(Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end, keep it for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    pub fn flush(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::future::Future;
    use std::time::Instant;

    fn block_on<F: Future>(future: F) -> F::Output {
        let context = glib::MainContext::new();
        context
            .with_thread_default(|| context.block_on(future))
            .expect("fresh main context can be acquired")
    }

    async fn wait_finished(session: &SharedSession<GioChild>, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while session.borrow().is_alive() {
            if Instant::now() > deadline {
                return false;
            }
            glib::timeout_future(Duration::from_millis(20)).await;
        }
        true
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[test]
    fn each_session_logs_only_its_own_process() {
        block_on(async {
            let alpha = spawn_session(&sh("echo alpha-output; echo alpha-err >&2"));
            let bravo = spawn_session(&sh("echo bravo-output"));
            assert!(wait_finished(&alpha, Duration::from_secs(5)).await);
            assert!(wait_finished(&bravo, Duration::from_secs(5)).await);

            let alpha_log = alpha.borrow().log().to_string();
            let bravo_log = bravo.borrow().log().to_string();
            assert!(alpha_log.contains("alpha-output"));
            assert!(alpha_log.contains("alpha-err"));
            assert!(!alpha_log.contains("bravo"));
            assert!(bravo_log.contains("bravo-output"));
            assert!(!bravo_log.contains("alpha"));
            assert_eq!(alpha.borrow().exit(), Some(&Exit::Code(0)));
        });
    }

    #[test]
    fn finishes_when_child_exits_even_if_pipe_stays_open() {
        block_on(async {
            let started = Instant::now();
            let session = spawn_session(&sh("sleep 30 & echo done"));
            assert!(wait_finished(&session, Duration::from_secs(3)).await);
            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(session.borrow().state(), SessionState::Finished);
            assert!(session.borrow().log().contains("done"));
        });
    }

    #[test]
    fn abort_terminates_with_signal() {
        block_on(async {
            let session = spawn_session(&CommandSpec::new("sleep", ["5"]));
            assert!(session.borrow_mut().abort());
            assert!(wait_finished(&session, Duration::from_secs(3)).await);
            assert_eq!(session.borrow().exit(), Some(&Exit::Signaled));
        });
    }

    #[test]
    fn queued_input_lines_all_reach_the_child() {
        block_on(async {
            let session = spawn_session(&sh("read a; read b; echo \"$a-$b\""));
            session.borrow().send_line("first").expect("stdin is open");
            session.borrow().send_line("second").expect("stdin is open");
            assert!(wait_finished(&session, Duration::from_secs(5)).await);
            assert!(session.borrow().log().contains("first-second"));
        });
    }

    #[test]
    fn missing_binary_is_a_spawn_failure() {
        block_on(async {
            let spec = CommandSpec::new("no-such-binary-yay-packer", ["-Ss", "vim"]);
            assert!(matches!(
                capture(&spec).await,
                SearchRun::SpawnFailed(Error::Spawn { .. })
            ));

            let session = spawn_session(&spec);
            assert_eq!(session.borrow().state(), SessionState::Finished);
            assert!(matches!(session.borrow().exit(), Some(Exit::SpawnFailed(_))));
        });
    }

    #[test]
    fn capture_collects_stdout_and_status() {
        block_on(async {
            match capture(&sh("echo 'extra/vim 9.1-1'; exit 1")).await {
                SearchRun::Completed { stdout, success, .. } => {
                    assert_eq!(stdout, "extra/vim 9.1-1\n");
                    assert!(!success);
                }
                other => panic!("unexpected run result: {:?}", other),
            }
        });
    }

    #[test]
    fn split_multibyte_char_is_joined() {
        let text = "Instalación completa\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xc3).expect("has ó") + 1;
        let mut decoder = Utf8Decoder::default();
        let first = decoder.push(&text[..split]);
        let second = decoder.push(&text[split..]);
        assert_eq!(first, "Instalaci");
        assert_eq!(format!("{}{}", first, second), "Instalación completa\n");
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"ok \xff done"), "ok \u{fffd} done");
    }

    #[test]
    fn dangling_prefix_is_flushed_lossily() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"abc\xe2\x82"), "abc");
        assert_eq!(decoder.flush(), "\u{fffd}");
    }
}
