use std::path::{Path, PathBuf};
use std::process::Stdio;
use log::{debug, error};
use tokio::process::Command;
use crate::config::defs::PipelineError;

/// Outcome of one external tool invocation.
#[derive(Debug)]
pub struct StageOutput {
    pub tool: String,
    pub code: i32,
    pub stdout_path: Option<PathBuf>,
}

/// Runs one external tool to completion.
///
/// If `stdout_to` is given, the child's standard output is written verbatim
/// to that file (truncating any existing content); otherwise stdout is
/// discarded. stderr is inherited so tool diagnostics reach the operator.
/// A non-zero exit is surfaced with the tool tag, its arguments, and the
/// exit code; tool failures are not transient, so there is no retry.
///
/// # Arguments
///
/// * `tool` - Tag naming the tool, for logs and errors.
/// * `program` - Executable to spawn (the jar launcher for java tools).
/// * `args` - Full argument list.
/// * `stdout_to` - Optional redirection target for the child's stdout.
///
/// # Returns
/// StageOutput on success.
pub async fn run_tool(
    tool: &str,
    program: &str,
    args: &[String],
    stdout_to: Option<&Path>,
) -> Result<StageOutput, PipelineError> {
    debug!("{} argv: {} {}", tool, program, args.join(" "));

    let stdout = match stdout_to {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| {
                PipelineError::IOError(format!("cannot create {}: {}", path.display(), e))
            })?;
            Stdio::from(file)
        }
        None => Stdio::null(),
    };

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| PipelineError::ToolSpawn {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        error!(
            "{} exited with code {} (args: {})",
            tool,
            code,
            args.join(" ")
        );
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            args: args.join(" "),
            code,
        });
    }

    Ok(StageOutput {
        tool: tool.to_string(),
        code: status.code().unwrap_or(0),
        stdout_path: stdout_to.map(Path::to_path_buf),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_to_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("captured.txt");
        run_tool(
            "echo",
            "echo",
            &["hello".to_string()],
            Some(&target),
        )
        .await?;
        let content = std::fs::read_to_string(&target)?;
        assert_eq!(content.trim(), "hello");
        Ok(())
    }

    #[tokio::test]
    async fn truncates_existing_stdout_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("captured.txt");
        std::fs::write(&target, "stale content that should disappear")?;
        run_tool("echo", "echo", &["fresh".to_string()], Some(&target)).await?;
        assert_eq!(std::fs::read_to_string(&target)?.trim(), "fresh");
        Ok(())
    }

    #[tokio::test]
    async fn nonzero_exit_carries_tool_and_code() {
        let err = run_tool("false", "false", &[], None).await.unwrap_err();
        match err {
            PipelineError::ToolExecution { tool, code, .. } => {
                assert_eq!(tool, "false");
                assert_eq!(code, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_tool(
            "nope",
            "/definitely/not/a/real/tool",
            &[],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::ToolSpawn { .. }));
    }
}
