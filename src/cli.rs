use anyhow::Result;

use nexus_research::{DEFAULT_DEVICE_LIST_LIMIT, MAX_CYCLES};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Run {
        max_cycles: Option<u32>,
        cycle_delay_secs: Option<u64>,
        empty_delay_secs: Option<u64>,
        test_mode: bool,
    },
    Devices {
        protocol: Option<String>,
        limit: usize,
    },
    Help,
    Version,
}

pub(crate) fn version_text() -> String {
    format!("nexus-research {}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn usage_text() -> String {
    format!(
        "{version}
NEXUS Research - adaptive network discovery loop

Usage:
  nexus-research [run] [--max-cycles <N>] [--cycle-delay <SECS>] [--empty-delay <SECS>] [--test]
  nexus-research devices [--protocol <NAME>] [--limit <N>]
  nexus-research --help
  nexus-research --version

Options:
      --max-cycles <N>    Maximum research cycles (default: {default_cycles})
      --cycle-delay <SECS>
                          Seconds between productive cycles; empty cycles wait half
      --empty-delay <SECS>
                          Seconds after an empty or failed cycle
      --test              Offline self-check of every subsystem, no network
      --protocol <NAME>   Devices: only those found via SNMP, MNDP, LLDP or CDP
      --limit <N>         Devices: maximum rows to print (default: {default_limit})
  -h, --help              Show this help text
  -V, --version           Show version",
        version = version_text(),
        default_cycles = MAX_CYCLES,
        default_limit = DEFAULT_DEVICE_LIST_LIMIT
    )
}

fn parse_u32_arg(flag: &str, raw: &str) -> Result<u32> {
    raw.parse::<u32>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn parse_u64_arg(flag: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|_| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a whole number of seconds.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn parse_usize_arg(flag: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

/// Split `--flag=value` into its parts; plain `--flag` takes the next argument
fn flag_value<'a, S: AsRef<str>>(
    flag: &str,
    inline: Option<&'a str>,
    iter: &mut impl Iterator<Item = S>,
) -> Result<String> {
    let value = match inline {
        Some(value) => Some(value.to_string()),
        None => iter.next().map(|v| v.as_ref().to_string()),
    };
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!(
            "Missing value for {}.\n\n{}",
            flag,
            usage_text()
        )),
    }
}

pub(crate) fn parse_cli_args<I, S>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut max_cycles: Option<u32> = None;
    let mut cycle_delay_secs: Option<u64> = None;
    let mut empty_delay_secs: Option<u64> = None;
    let mut test_mode = false;
    let mut protocol: Option<String> = None;
    let mut limit: Option<usize> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref().to_string();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (arg.as_str(), None),
        };

        match flag {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-V" | "--version" => return Ok(CliCommand::Version),
            "run" | "devices" => {
                if command.as_deref().is_some_and(|existing| existing != flag) {
                    return Err(anyhow::anyhow!(
                        "Multiple commands provided. Use only one command.\n\n{}",
                        usage_text()
                    ));
                }
                command = Some(flag.to_string());
            }
            "--test" => test_mode = true,
            "--max-cycles" => {
                let value = flag_value(flag, inline, &mut iter)?;
                max_cycles = Some(parse_u32_arg(flag, &value)?);
            }
            "--cycle-delay" => {
                let value = flag_value(flag, inline, &mut iter)?;
                cycle_delay_secs = Some(parse_u64_arg(flag, &value)?);
            }
            "--empty-delay" => {
                let value = flag_value(flag, inline, &mut iter)?;
                empty_delay_secs = Some(parse_u64_arg(flag, &value)?);
            }
            "--protocol" => {
                let value = flag_value(flag, inline, &mut iter)?;
                protocol = Some(value);
            }
            "--limit" => {
                let value = flag_value(flag, inline, &mut iter)?;
                limit = Some(parse_usize_arg(flag, &value)?);
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown argument: {arg}\n\n{}",
                    usage_text()
                ));
            }
        }
    }

    match command.as_deref().unwrap_or("run") {
        "run" => {
            if protocol.is_some() || limit.is_some() {
                return Err(anyhow::anyhow!(
                    "--protocol/--limit are only valid with devices.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Run {
                max_cycles,
                cycle_delay_secs,
                empty_delay_secs,
                test_mode,
            })
        }
        _ => {
            if max_cycles.is_some()
                || cycle_delay_secs.is_some()
                || empty_delay_secs.is_some()
                || test_mode
            {
                return Err(anyhow::anyhow!(
                    "--max-cycles/--cycle-delay/--empty-delay/--test are only valid with run.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Devices {
                protocol,
                limit: limit.unwrap_or(DEFAULT_DEVICE_LIST_LIMIT),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_help_flag() {
        let parsed = parse_cli_args(["nexus-research", "--help"]).expect("help args should parse");
        assert_eq!(parsed, CliCommand::Help);
    }

    #[test]
    fn parse_version_flag() {
        let parsed =
            parse_cli_args(["nexus-research", "-V"]).expect("version args should parse");
        assert_eq!(parsed, CliCommand::Version);
    }

    #[test]
    fn parse_default_run_command() {
        let parsed = parse_cli_args(["nexus-research"]).expect("default args should parse");
        assert_eq!(
            parsed,
            CliCommand::Run {
                max_cycles: None,
                cycle_delay_secs: None,
                empty_delay_secs: None,
                test_mode: false
            }
        );
    }

    #[test]
    fn parse_run_with_options() {
        let args = [
            "nexus-research",
            "run",
            "--max-cycles",
            "3",
            "--cycle-delay=60",
            "--empty-delay",
            "10",
        ];
        let parsed = parse_cli_args(args).expect("run with options should parse");
        assert_eq!(
            parsed,
            CliCommand::Run {
                max_cycles: Some(3),
                cycle_delay_secs: Some(60),
                empty_delay_secs: Some(10),
                test_mode: false
            }
        );
    }

    #[test]
    fn parse_test_mode_flag() {
        let parsed = parse_cli_args(["nexus-research", "--test"]).expect("--test should parse");
        assert!(matches!(parsed, CliCommand::Run { test_mode: true, .. }));
    }

    #[test]
    fn parse_devices_command() {
        let args = ["nexus-research", "devices", "--protocol", "snmp", "--limit", "5"];
        let parsed = parse_cli_args(args).expect("devices command should parse");
        assert_eq!(
            parsed,
            CliCommand::Devices {
                protocol: Some("snmp".to_string()),
                limit: 5
            }
        );
    }

    #[test]
    fn parse_zero_cycles_rejected() {
        let err = parse_cli_args(["nexus-research", "--max-cycles", "0"])
            .expect_err("zero cycles should fail");
        assert!(err.to_string().contains("Expected a positive integer"));
    }

    #[test]
    fn parse_devices_rejects_run_flags() {
        let err = parse_cli_args(["nexus-research", "devices", "--max-cycles", "2"])
            .expect_err("devices should reject run flags");
        assert!(err.to_string().contains("only valid with run"));
    }

    #[test]
    fn parse_missing_value_errors() {
        let err = parse_cli_args(["nexus-research", "--cycle-delay"]).expect_err("missing value");
        assert!(err.to_string().contains("Missing value for --cycle-delay"));
    }

    #[test]
    fn parse_unknown_argument_errors() {
        let err = parse_cli_args(["nexus-research", "--unknown"]).expect_err("unknown flag");
        assert!(err.to_string().contains("Unknown argument"));
    }
}
