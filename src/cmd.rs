use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DeployError, DeployResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long to keep collecting output after a killed child. Its
/// pipes may stay open in descendants or an SSH control master.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Run a command with all standard streams detached. Used for
/// processes that fork into the background and would otherwise
/// hold our pipes open.
pub fn run_detached(program: &str, args: &[&str]) -> DeployResult<ExitStatus> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| spawn_error(program, e))
}

/// Run a command, optionally feeding `stdin_data`, and collect
/// stdout and stderr regardless of the exit status.
///
/// With a `timeout`, the child is killed once the deadline passes
/// and [`DeployError::CommandTimeout`] is returned carrying
/// whatever output was produced so far.
pub fn capture(
    program: &str,
    args: &[&str],
    stdin_data: Option<&[u8]>,
    timeout: Option<Duration>,
) -> DeployResult<Output> {
    capture_until(program, args, stdin_data, timeout, || false)
}

/// Like [`capture`], but also kills the child as soon as `stop`
/// returns true, failing with [`DeployError::Interrupted`].
pub fn capture_until(
    program: &str,
    args: &[&str],
    stdin_data: Option<&[u8]>,
    timeout: Option<Duration>,
    stop: impl Fn() -> bool,
) -> DeployResult<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group: a terminal Ctrl-C must not kill a step that
    // is already running.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn().map_err(|e| spawn_error(program, e))?;

    // Feed stdin from its own thread so a chatty child cannot
    // deadlock against a full stdout pipe. Never joined: a
    // descendant may keep the pipe open without reading.
    let _writer = child.stdin.take().zip(stdin_data).map(|(mut pipe, data)| {
        let data = data.to_vec();
        thread::spawn(move || {
            let _ = pipe.write_all(&data);
        })
    });
    let stdout = child.stdout.take().map(Reader::spawn);
    let stderr = child.stderr.take().map(Reader::spawn);

    let deadline = timeout.map(|limit| Instant::now() + limit);
    let waited = wait_until(&mut child, deadline, &stop)?;

    if let Waited::Exited(status) = waited {
        // Past a deadline, pipes held open by descendants are not
        // waited for.
        let grace = deadline
            .map(|d| d.saturating_duration_since(Instant::now()).max(DRAIN_GRACE));
        return Ok(Output {
            status,
            stdout: Reader::finish(stdout, grace),
            stderr: Reader::finish(stderr, grace),
        });
    }

    // Killed: whatever still holds the pipes must not hold us.
    let mut output =
        String::from_utf8_lossy(&Reader::finish(stdout, Some(DRAIN_GRACE))).to_string();
    output.push_str(&String::from_utf8_lossy(&Reader::finish(
        stderr,
        Some(DRAIN_GRACE),
    )));
    let command = format_command(program, args);

    Err(match waited {
        Waited::Stopped => DeployError::Interrupted { command, output },
        _ => DeployError::CommandTimeout {
            command,
            timeout: timeout.unwrap_or_default(),
            output,
        },
    })
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Stopped,
}

/// Wait for `child` to exit, killing it once `deadline` passes or
/// `stop` returns true.
fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
    stop: &impl Fn() -> bool,
) -> std::io::Result<Waited> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        let outcome = if stop() {
            Waited::Stopped
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Waited::TimedOut
        } else {
            thread::sleep(POLL_INTERVAL);
            continue;
        };
        child.kill()?;
        child.wait()?;
        return Ok(outcome);
    }
}

/// Collects one pipe on a background thread. The buffer is shared
/// so output read so far is available even if the pipe never
/// closes.
struct Reader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Reader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = shared.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for end of stream, at most `grace` if given, and return
    /// what was read.
    fn finish(reader: Option<Self>, grace: Option<Duration>) -> Vec<u8> {
        let Some(reader) = reader else {
            return Vec::new();
        };
        match grace {
            Some(grace) => {
                let _ = reader.done.recv_timeout(grace);
            }
            None => {
                let _ = reader.done.recv();
            }
        }
        reader
            .buf
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn capture_collects_both_streams() {
        let output = capture("sh", &["-c", "echo out; echo err >&2; exit 3"], None, None)
            .expect("sh should run");

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[test]
    fn capture_feeds_stdin() {
        let output = capture("sh", &["-s"], Some(b"echo from-stdin\n"), None)
            .expect("sh should run");

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "from-stdin\n");
    }

    #[test]
    fn capture_kills_on_timeout() {
        let err = capture(
            "sh",
            &["-c", "echo started; exec sleep 5"],
            None,
            Some(Duration::from_millis(300)),
        )
        .unwrap_err();

        match err {
            DeployError::CommandTimeout { output, .. } => {
                assert!(output.contains("started"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn timeout_does_not_wait_for_descendants_holding_pipes() {
        let started = Instant::now();

        let err = capture(
            "sh",
            &["-c", "sleep 4 & echo started; exec sleep 30"],
            None,
            Some(Duration::from_millis(300)),
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        match err {
            DeployError::CommandTimeout { output, .. } => assert!(output.contains("started")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn stop_interrupts_running_command() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            setter.store(true, Ordering::SeqCst);
        });
        let started = Instant::now();

        let err = capture_until(
            "sh",
            &["-c", "echo working; exec sleep 30"],
            None,
            None,
            || flag.load(Ordering::SeqCst),
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            DeployError::Interrupted { output, .. } => assert!(output.contains("working")),
            other => panic!("expected interruption, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_reported() {
        let err = capture("trebuchet-no-such-binary", &[], None, None).unwrap_err();

        assert!(matches!(err, DeployError::CommandNotFound(_)));
    }
}
