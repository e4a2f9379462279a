use crate::command::LaunchCommand;
use crate::error::{LaunchError, LaunchResult};
use crate::layout::LogFile;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Exit status of a launched (or simulated) child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    code: i32,
}

impl ExitOutcome {
    pub const SUCCESS: Self = Self { code: 0 };

    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        self.code
    }

    #[must_use]
    pub fn success(self) -> bool {
        self.code == 0
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self { code: 128 + signal };
            }
        }
        Self { code: 1 }
    }
}

/// Executes assembled commands.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, command: &LaunchCommand, log: Option<&LogFile>)
    -> LaunchResult<ExitOutcome>;

    /// Whether commands are really executed (filesystem side effects are skipped otherwise).
    fn executes(&self) -> bool {
        true
    }
}

/// Spawns the child and mirrors its combined output to stdout and the log file.
#[derive(Debug, Default)]
pub struct ProcessRunner;

/// Fans child output out to the terminal and the log file. A sink that fails
/// is dropped with a warning; the child keeps running either way.
struct Tee {
    terminal: Option<tokio::io::Stdout>,
    file: Option<File>,
}

async fn write_flushed<W: AsyncWrite + Unpin>(sink: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    sink.write_all(chunk).await?;
    sink.flush().await
}

impl Tee {
    async fn write(&mut self, chunk: &[u8]) {
        if let Some(terminal) = self.terminal.as_mut() {
            if let Err(error) = write_flushed(terminal, chunk).await {
                warn!(%error, "terminal write failed, child output goes to the log file only");
                self.terminal = None;
            }
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(error) = write_flushed(file, chunk).await {
                warn!(%error, "log file write failed, child output goes to the terminal only");
                self.file = None;
            }
        }
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, tee: &Mutex<Tee>) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        tee.lock().await.write(&line).await;
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        command: &LaunchCommand,
        log: Option<&LogFile>,
    ) -> LaunchResult<ExitOutcome> {
        let file = match log {
            Some(log) => {
                log.create_parent()?;
                Some(File::create(&log.path).await?)
            }
            None => None,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        for key in &command.env_remove {
            cmd.env_remove(key);
        }
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(program = %command.program, args = ?command.args, "spawning");
        let mut child = cmd
            .spawn()
            .map_err(|source| LaunchError::Spawn { program: command.program.clone(), source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stdout of {}", command.program))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stderr of {}", command.program))?;

        let tee = Mutex::new(Tee { terminal: Some(tokio::io::stdout()), file });
        let (out, err) = tokio::join!(pump(stdout, &tee), pump(stderr, &tee));

        // The child is always reaped before any output error is reported.
        let pumped = out.and(err);
        if let Err(error) = &pumped {
            warn!(%error, program = %command.program, "lost the child's output, stopping it");
            if let Err(error) = child.start_kill() {
                warn!(%error, program = %command.program, "failed to stop the child");
            }
        }
        let status = child.wait().await?;
        pumped?;

        let mut tee = tee.into_inner();
        if let Some(file) = tee.file.as_mut() {
            if let Err(error) = file.flush().await {
                warn!(%error, "log file flush failed");
            }
        }
        Ok(ExitOutcome::from(status))
    }
}

/// Never spawns anything; every command "succeeds".
#[derive(Debug, Default)]
pub struct DryRunRunner;

#[async_trait]
impl Runner for DryRunRunner {
    async fn run(
        &self,
        command: &LaunchCommand,
        _log: Option<&LogFile>,
    ) -> LaunchResult<ExitOutcome> {
        debug!(program = %command.program, "dry run, not spawning");
        Ok(ExitOutcome::SUCCESS)
    }

    fn executes(&self) -> bool {
        false
    }
}
