//! Subprocess execution for ffmpeg, ffprobe, and friends.

use std::process::Stdio;
use std::time::{Duration, Instant};

use adforge_common::error::{AdforgeError, AdforgeResult};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last few stderr lines, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is reported
    /// through [`CommandOutput::success`], not as an error.
    async fn run(&self, program: &str, args: &[String]) -> AdforgeResult<CommandOutput>;

    /// Like [`CommandRunner::run`], feeding each stdout line to `on_line`
    /// as it arrives.
    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> AdforgeResult<CommandOutput> {
        let output = self.run(program, args).await?;
        for line in output.stdout.lines() {
            on_line(line);
        }
        Ok(output)
    }
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> AdforgeError {
    AdforgeError::unsupported(format!("failed to start {program}: {err}"))
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> AdforgeResult<CommandOutput> {
        tracing::debug!(program, args = ?args, "Running command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> AdforgeResult<CommandOutput> {
        tracing::debug!(program, args = ?args, "Running command with streamed output");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        tracing::info!(pid = child.id(), program, args_len = args.len(), "Process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdforgeError::unsupported(format!("cannot capture {program} stdout")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AdforgeError::unsupported(format!("cannot capture {program} stderr")))?;

        // Drain stderr concurrently so a chatty process never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read stderr: {err}>"),
            }
        });

        let started = Instant::now();
        let mut last_line = Instant::now();
        let mut collected = String::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if last_line.elapsed() >= Duration::from_secs(10) {
                tracing::warn!(
                    program,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "No process output for 10s"
                );
            }
            last_line = Instant::now();
            on_line(line.trim());
            collected.push_str(&line);
            collected.push('\n');
        }

        let status = child.wait().await?;
        let stderr = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: collected,
            stderr,
        })
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner that records invocations instead of spawning.

    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&str, &[String]) -> CommandOutput + Send + Sync>;

    pub struct FakeRunner {
        responder: Responder,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        pub fn new(
            responder: impl Fn(&str, &[String]) -> CommandOutput + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Every command succeeds. ffmpeg invocations create their last
        /// argument, which is where the output path goes.
        pub fn succeeding() -> Self {
            Self::new(|program, args| {
                if program.contains("ffprobe") {
                    return ok("");
                }
                if let Some(out) = args.last() {
                    if out.contains('.') && !out.starts_with('-') {
                        std::fs::write(out, b"fake-media").ok();
                    }
                }
                ok("")
            })
        }

        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[String]) -> AdforgeResult<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok((self.responder)(program, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        let out = CommandOutput {
            stderr: "a\nb\nc\nd".to_string(),
            ..Default::default()
        };
        assert_eq!(out.stderr_tail(2), "c\nd");
        assert_eq!(out.stderr_tail(10), "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_system_runner_streams_lines() {
        if !command_exists("sh") {
            return;
        }
        let runner = SystemCommandRunner::new();
        let mut seen = Vec::new();
        let output = runner
            .run_streaming(
                "sh",
                &["-c".to_string(), "echo one; echo two; echo err >&2".to_string()],
                &mut |line: &str| seen.push(line.to_string()),
            )
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(seen, vec!["one", "two"]);
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_default_streaming_replays_captured_stdout() {
        let runner = testing::FakeRunner::new(|_, _| testing::ok("out_time_us=1\nprogress=end\n"));
        let mut seen: Vec<String> = Vec::new();
        let output = runner
            .run_streaming("ffmpeg", &[], &mut |line: &str| seen.push(line.to_string()))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(seen, vec!["out_time_us=1", "progress=end"]);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unsupported() {
        let err = SystemCommandRunner::new()
            .run("adforge-definitely-missing-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AdforgeError::Unsupported { .. }));
    }
}
