use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Default bound on how long a worker may take to complete the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on how long a worker may run after going live.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);

/// What the worker's stdin is wired to. stdout and stderr always pass
/// through to the parent's own streams; the protocol channel is a separate
/// descriptor and never competes with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// Closed (reads see EOF). The default.
    Null,
    /// The parent's stdin.
    Inherit,
}

/// Launch descriptor for a worker process.
///
/// Built up with chained setters, then consumed by `Worker::spawn`. Both
/// timeouts default to 60 seconds; passing `None` disables the bound
/// entirely.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    program: PathBuf,
    args: Vec<OsString>,
    interpreter: Option<PathBuf>,
    handshake_timeout: Option<Duration>,
    max_duration: Option<Duration>,
    stdin: StdinMode,
}

impl WorkerOptions {
    /// Describe a worker that runs `program` directly.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            interpreter: None,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            max_duration: Some(DEFAULT_MAX_DURATION),
            stdin: StdinMode::Null,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run `program` through an interpreter (e.g. a script runtime) instead
    /// of executing it directly.
    pub fn interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Bound the handshake wait. `None` disables the bound.
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bound the worker's total running time after going live. `None`
    /// disables the bound.
    pub fn max_duration(mut self, duration: Option<Duration>) -> Self {
        self.max_duration = duration;
        self
    }

    /// Wire the worker's stdin to the parent's instead of closing it.
    pub fn inherit_stdin(mut self) -> Self {
        self.stdin = StdinMode::Inherit;
        self
    }

    pub(crate) fn handshake_deadline(&self) -> Option<Duration> {
        self.handshake_timeout
    }

    pub(crate) fn max_duration_deadline(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Build the process command: interpreter (if any), program, args.
    /// stdout and stderr inherit; stdin follows the configured mode.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(&self.args);
        cmd.stdin(match self.stdin {
            StdinMode::Null => Stdio::null(),
            StdinMode::Inherit => Stdio::inherit(),
        });
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sixty_seconds() {
        let options = WorkerOptions::new("/bin/true");
        assert_eq!(options.handshake_deadline(), Some(Duration::from_secs(60)));
        assert_eq!(
            options.max_duration_deadline(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(options.stdin, StdinMode::Null);
    }

    #[test]
    fn none_disables_a_deadline() {
        let options = WorkerOptions::new("/bin/true")
            .handshake_timeout(None)
            .max_duration(None);
        assert_eq!(options.handshake_deadline(), None);
        assert_eq!(options.max_duration_deadline(), None);
    }

    #[test]
    fn interpreter_prepends_the_runtime() {
        let options = WorkerOptions::new("worker.py")
            .interpreter("/usr/bin/python3")
            .arg("--fast");
        let cmd = options.command();
        assert_eq!(cmd.get_program(), "/usr/bin/python3");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["worker.py", "--fast"]);
    }

    #[test]
    fn direct_program_keeps_its_args() {
        let options = WorkerOptions::new("/usr/local/bin/worker").args(["a", "b"]);
        let cmd = options.command();
        assert_eq!(cmd.get_program(), "/usr/local/bin/worker");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["a", "b"]);
    }
}
