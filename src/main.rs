use anyhow::Result;
use clap::Parser;
use oppy::args::CliArgs;
use oppy::cli::{check_command_exists, ProcessRunner, TerminalPrompt};
use oppy::shell::{build_editor, Shell};
use oppy::stores::os_keyring::KeyringStore;
use oppy::{config, telemetry, Dispatcher, OppyError};
use std::process::ExitCode;
use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let options = config::resolve(args.config_path(), &args.profile, &args.overrides())?;
    let log = telemetry::init_tracing(options.debug)?;
    debug!(?options, "resolved options");

    if !check_command_exists(&options.op_path).await? {
        return Err(OppyError::NotInstalled(options.op_path.clone()).into());
    }

    let dispatcher = Dispatcher::new(KeyringStore::new(), ProcessRunner, TerminalPrompt);
    let mut shell = Shell::new(options, dispatcher, Box::new(std::io::stdout())).with_log_handle(log);

    shell.start().await?;
    let mut editor = build_editor()?;
    shell.run(&mut editor).await?;
    Ok(())
}
