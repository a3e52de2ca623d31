use anyhow::Result;

use nexus_research::controller::CancelHandle;

use crate::cli::{CliCommand, parse_cli_args, usage_text, version_text};
use crate::command_handlers::{ExitCode, handle_devices, handle_run};

/// Run the app by parsing CLI-style args and dispatching the command.
pub(crate) async fn run<I, S>(args: I, cancel: CancelHandle) -> Result<ExitCode>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let command = parse_cli_args(args)?;
    execute_command(command, cancel).await
}

/// Execute a pre-parsed command. The exit code follows the run's halt status.
pub(crate) async fn execute_command(command: CliCommand, cancel: CancelHandle) -> Result<ExitCode> {
    match command {
        CliCommand::Help => {
            println!("{}", usage_text());
            Ok(0)
        }
        CliCommand::Version => {
            println!("{}", version_text());
            Ok(0)
        }
        CliCommand::Devices { protocol, limit } => handle_devices(protocol, limit).await,
        CliCommand::Run {
            max_cycles,
            cycle_delay_secs,
            empty_delay_secs,
            test_mode,
        } => handle_run(max_cycles, cycle_delay_secs, empty_delay_secs, test_mode, cancel).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_help_exits_zero() {
        let code = run(["nexus-research", "--help"], CancelHandle::new())
            .await
            .expect("help should succeed");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_self_check_exits_zero_offline() {
        let code = run(["nexus-research", "--test"], CancelHandle::new())
            .await
            .expect("self-check should run");
        assert_eq!(code, 0);
    }
}
