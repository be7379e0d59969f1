use std::path::Path;
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

pub fn create_command(arguments: Vec<&str>, workdir: Option<&Path>) -> Command {
    let mut command = Command::new(arguments[0]);
    command.args(&arguments[1..]);
    if let Some(workdir) = workdir {
        command.current_dir(workdir);
    }
    command.kill_on_drop(true);
    command
}

pub fn check_command_output(output: Output) -> anyhow::Result<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

/// Runs a scheduler tool and returns its standard output.
pub async fn run_tool(arguments: Vec<&str>, workdir: Option<&Path>) -> anyhow::Result<String> {
    let program = arguments[0].to_string();
    log::debug!("Running command `{}`", arguments.join(" "));
    let mut command = create_command(arguments, workdir);
    let output = command
        .output()
        .await
        .with_context(|| format!("{program} start failed"))?;
    let output =
        check_command_output(output).with_context(|| format!("{program} execution failed"))?;
    log::trace!(
        "{program} output\nStdout\n{}Stderr\n{}",
        output.stdout.to_str_lossy(),
        output.stderr.to_str_lossy()
    );
    Ok(output.stdout.to_str_lossy().into_owned())
}

/// Name of a signal number, e.g. `SIGKILL`.
pub fn signal_name(signal: i32) -> String {
    match nix::sys::signal::Signal::try_from(signal) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("SIG{signal}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(9), "SIGKILL");
        assert_eq!(signal_name(1000), "SIG1000");
    }

    #[tokio::test]
    async fn test_run_tool_output() {
        let output = run_tool(vec!["sh", "-c", "echo hello"], None).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_tool_failure() {
        let error = run_tool(vec!["sh", "-c", "echo oops >&2; exit 3"], None)
            .await
            .unwrap_err();
        let message = format!("{error:#}");
        assert!(message.contains("sh execution failed"));
        assert!(message.contains("Exit code: 3"));
        assert!(message.contains("oops"));
    }
}
