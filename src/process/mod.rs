use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

pub mod toolchain;

pub use toolchain::Toolchain;

/// Lines buffered between the output readers and the consumer
const LINE_BUFFER: usize = 256;

/// The external tool could not be started at all
#[derive(thiserror::Error, Debug)]
#[error("Command '{program}' could not be started: {source}")]
pub struct ProcessLaunchError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

impl ProcessLaunchError {
    pub fn new(program: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            program: program.into(),
            source,
        }
    }

    /// The tool is missing from `PATH`
    pub fn not_found(program: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::new(
            program,
            std::io::Error::new(std::io::ErrorKind::NotFound, reason.to_string()),
        )
    }
}

/// A fully described command line for one external tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value following the given flag, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// How an external process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    code: Option<i32>,
}

impl ProcessExit {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Terminated by a signal, or the status could not be collected
    pub fn without_code() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "no exit code (terminated by signal)"),
        }
    }
}

/// A live subprocess whose merged output can be read line by line
#[async_trait]
pub trait ProcessHandle: Send {
    /// Next line of stdout or stderr, `None` once both streams are closed
    async fn next_line(&mut self) -> Option<String>;

    /// Stop reading and wait for the process to exit
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;
}

/// Starts external processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ProcessHandle>, ProcessLaunchError>;
}

/// Launcher backed by real OS processes
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launcher for ProcessRunner {
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ProcessHandle>, ProcessLaunchError> {
        tracing::debug!("Executing command: {}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessLaunchError::new(invocation.program.clone(), source))?;

        let (tx, lines) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx));
        }

        Ok(Box::new(ChildProcess { child, lines }))
    }
}

/// A spawned child; killed if dropped before it has been waited on
pub struct ChildProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        // Unblock the readers if the consumer stopped early
        self.lines.close();
        let status = self.child.wait().await?;
        Ok(status.into())
    }
}

async fn pump_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut chunk = Vec::new();

    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => break,
            Ok(_) => {
                for line in split_lines(&chunk) {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

/// Decode a raw output chunk, treating both `\r` and `\n` as terminators
pub fn split_lines(chunk: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(chunk)
        .split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
