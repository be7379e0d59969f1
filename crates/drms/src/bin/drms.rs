use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};
use cli_table::ColorChoice;

use drms::client::commands::control::control_jobs;
use drms::client::commands::info::output_session_info;
use drms::client::commands::status::output_job_status;
use drms::client::commands::submit::submit_job;
use drms::client::commands::wait::wait_for_jobs;
use drms::client::globalsettings::GlobalSettings;
use drms::client::output::cli::CliOutput;
use drms::client::output::json::JsonOutput;
use drms::client::output::{Output, Outputs};
use drms::common::cli::{ColorPolicy, CommonOpts, RootOptions, SubCommand};
use drms::common::setup::setup_logging;
use drms::config::ClientConfig;

fn make_printer(opts: &CommonOpts) -> Box<dyn Output> {
    let color_policy = match opts.colors {
        ColorPolicy::Always => ColorChoice::AlwaysAnsi,
        ColorPolicy::Auto => {
            if std::io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorPolicy::Never => ColorChoice::Never,
    };

    match opts.output_mode {
        Outputs::CLI => {
            match color_policy {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => {
                    colored::control::set_override(true)
                }
                ColorChoice::Never => colored::control::set_override(false),
                _ => {}
            }
            Box::new(CliOutput::new(color_policy))
        }
        Outputs::JSON => Box::new(JsonOutput),
    }
}

fn make_global_settings(opts: CommonOpts) -> GlobalSettings {
    let printer = make_printer(&opts);
    match ClientConfig::load_or_default(opts.config.as_deref()) {
        Ok(config) => GlobalSettings::new(config, opts.session, printer),
        Err(error) => {
            printer.print_error(error.into());
            std::process::exit(1);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> drms::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };
    setup_logging(top_opts.common.debug);
    let gsettings = make_global_settings(top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Submit(opts) => submit_job(&gsettings, opts).await,
        SubCommand::Status(opts) => output_job_status(&gsettings, opts).await,
        SubCommand::Control(opts) => control_jobs(&gsettings, opts).await,
        SubCommand::Wait(opts) => wait_for_jobs(&gsettings, opts).await,
        SubCommand::Info => output_session_info(&gsettings).await,
    };
    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }
    Ok(())
}
