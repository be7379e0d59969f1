use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::backend::BackendKind;
use crate::client::commands::control::ControlOpts;
use crate::client::commands::status::StatusOpts;
use crate::client::commands::submit::SubmitOpts;
use crate::client::commands::wait::WaitOpts;
use crate::client::output::Outputs;

#[derive(clap::ValueEnum, Clone, Copy)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Options that select the scheduler and the session contact.
/// Values that are not given fall back to the configuration file.
#[derive(Parser, Clone, Default)]
pub struct SessionOpts {
    /// Scheduler backend
    #[arg(
        long,
        value_enum,
        global = true,
        env = "DRMS_BACKEND",
        help_heading("SESSION OPTIONS")
    )]
    pub backend: Option<BackendKind>,

    /// Contact string of the session, e.g. `session=analysis`
    #[arg(
        long,
        global = true,
        env = "DRMS_CONTACT",
        help_heading("SESSION OPTIONS")
    )]
    pub contact: Option<String>,

    /// How often waiting commands ask the scheduler for finished jobs
    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        help_heading("SESSION OPTIONS"),
        hide_short_help(true)
    )]
    pub poll_interval: Option<Duration>,
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Path to the configuration file
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = "DRMS_CONFIG",
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub config: Option<PathBuf>,

    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = "DRMS_OUTPUT_MODE",
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "DRMS_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,

    #[clap(flatten)]
    pub session: SessionOpts,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::DRMS_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Submit a job or an array of jobs
    Submit(SubmitOpts),
    /// Display the status of jobs
    Status(StatusOpts),
    /// Suspend, resume, hold, release or terminate jobs
    Control(ControlOpts),
    /// Wait until jobs finish
    Wait(WaitOpts),
    /// Display information about the scheduler and the session
    Info,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        RootOptions::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let opts = RootOptions::try_parse_from([
            "drms",
            "--backend",
            "local",
            "submit",
            "--array",
            "1-4:2",
            "--",
            "/bin/echo",
            "-n",
            "hello",
        ])
        .unwrap();
        assert_eq!(opts.common.session.backend, Some(BackendKind::Local));
        let SubCommand::Submit(submit) = opts.subcmd else {
            panic!("Expected the submit command");
        };
        assert_eq!(submit.command, vec!["/bin/echo", "-n", "hello"]);
        assert_eq!(submit.array.map(|a| a.unpack().count()), Some(2));
    }
}
