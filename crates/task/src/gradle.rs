//! Build tool backed by the Gradle command line
//!
//! Each operation spawns one Gradle process in the source directory and
//! streams its stdout/stderr line by line. When the operation's token is
//! signalled the whole process group is killed and the run reports
//! `Cancelled`.

use crate::build_tool::{BuildTool, OperationContext};
use async_trait::async_trait;
use gradle_tasks_config::BuildToolSettings;
use gradle_tasks_core::{
    Error, ProjectSummary, Reply, Result, TaskSummary, GRADLE_EXECUTABLE, GRADLE_WRAPPER_UNIX,
    GRADLE_WRAPPER_WINDOWS,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Runs Gradle as a child process
#[derive(Debug, Clone, Default)]
pub struct GradleCli {
    settings: BuildToolSettings,
}

impl GradleCli {
    pub fn new(settings: BuildToolSettings) -> Self {
        Self { settings }
    }

    /// Explicit executable, else the project's wrapper, else `gradle` on `PATH`
    pub fn resolve_executable(&self, source_dir: &Path) -> PathBuf {
        if let Some(executable) = &self.settings.executable {
            return executable.clone();
        }
        let wrapper = if cfg!(windows) {
            GRADLE_WRAPPER_WINDOWS
        } else {
            GRADLE_WRAPPER_UNIX
        };
        let wrapper = source_dir.join(wrapper);
        if wrapper.is_file() {
            wrapper
        } else {
            PathBuf::from(GRADLE_EXECUTABLE)
        }
    }

    fn task_args(&self, task: &str, args: &[String]) -> Vec<String> {
        std::iter::once(task.to_string())
            .chain(args.iter().cloned())
            .chain(self.settings.extra_args.iter().cloned())
            .collect()
    }

    /// Spawn Gradle with `args`, stream its output, return the exit code
    async fn run_gradle(&self, ctx: &OperationContext, args: &[String]) -> Result<i32> {
        let program = self.resolve_executable(ctx.source_dir());
        let command = program.to_string_lossy().to_string();

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .current_dir(ctx.source_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_platform_specific(&mut cmd);

        tracing::debug!(command = %command, args = ?args, "Spawning build tool");
        let mut child = cmd.spawn().map_err(|e| {
            Error::command_execution(
                &command,
                args.to_vec(),
                format!("Failed to spawn build tool: {e}"),
                None,
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal_inconsistency("build tool stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::internal_inconsistency("build tool stderr was not piped"))?;
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        loop {
            tokio::select! {
                biased;

                _ = ctx.token().cancelled() => {
                    terminate(&mut child).await;
                    return Err(Error::cancelled(format!(
                        "Build cancelled: {command} {}",
                        args.join(" ")
                    )));
                }

                read = stdout.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                    match take_line(read, &mut stdout_buf, "stdout") {
                        Some(line) => {
                            ctx.emit(Reply::stdout(line)).await;
                        }
                        None => stdout_done = true,
                    }
                }

                read = stderr.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                    match take_line(read, &mut stderr_buf, "stderr") {
                        Some(line) => {
                            ctx.emit(Reply::stderr(line)).await;
                        }
                        None => stderr_done = true,
                    }
                }

                status = child.wait(), if stdout_done && stderr_done => {
                    let status = status.map_err(|e| {
                        Error::command_execution(
                            &command,
                            args.to_vec(),
                            format!("Failed to wait for build tool: {e}"),
                            None,
                        )
                    })?;
                    let exit_code = status.code().unwrap_or(-1);
                    if exit_code != 0 {
                        return Err(Error::command_execution(
                            &command,
                            args.to_vec(),
                            "build tool reported failure",
                            Some(exit_code),
                        ));
                    }
                    return Ok(exit_code);
                }
            }
        }
    }
}

/// Turn one `read_until` result into an output line.
///
/// Bytes are decoded lossily so a non-UTF-8 line never stops the pipe from
/// being drained. `None` means the stream is finished.
fn take_line(read: std::io::Result<usize>, buf: &mut Vec<u8>, stream: &str) -> Option<String> {
    match read {
        Ok(0) => None,
        Ok(_) => {
            let mut end = buf.len();
            if buf[..end].ends_with(b"\n") {
                end -= 1;
            }
            if buf[..end].ends_with(b"\r") {
                end -= 1;
            }
            let line = String::from_utf8_lossy(&buf[..end]).into_owned();
            buf.clear();
            Some(line)
        }
        Err(e) => {
            tracing::warn!(error = %e, stream, "Failed to read build tool output");
            None
        }
    }
}

#[async_trait]
impl BuildTool for GradleCli {
    async fn get_project(&self, ctx: &OperationContext) -> Result<ProjectSummary> {
        ctx.emit(Reply::progress("Configure project")).await;
        let exit_code = self.run_gradle(ctx, &self.settings.project_args).await?;
        Ok(ProjectSummary {
            source_dir: ctx.source_dir().display().to_string(),
            exit_code,
        })
    }

    async fn run_task(
        &self,
        ctx: &OperationContext,
        task: &str,
        args: &[String],
    ) -> Result<TaskSummary> {
        ctx.emit(Reply::progress(format!("Run task {task}"))).await;
        let exit_code = self.run_gradle(ctx, &self.task_args(task, args)).await?;
        Ok(TaskSummary {
            source_dir: ctx.source_dir().display().to_string(),
            task: task.to_string(),
            args: args.to_vec(),
            exit_code,
        })
    }
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn configure_platform_specific(cmd: &mut Command) {
    // Own process group so cancellation reaches Gradle's children too
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: plain syscall on a process group we created
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Build tool already exited");
    }
}
