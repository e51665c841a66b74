use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// pushctl - send push notifications through Firebase or Huawei Push Kit
#[derive(Parser, Debug)]
#[command(name = "pushctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "PUSHCTL_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deliver every notification in the input file and print a report
    Send(SendArgs),

    /// Check notifications locally without sending them
    Validate(InputArgs),
}

#[derive(ClapArgs, Debug)]
pub struct InputArgs {
    /// Push provider the notifications are addressed to
    #[arg(short, long, value_enum)]
    pub provider: Provider,

    /// JSON file holding an array of notifications
    #[arg(short, long)]
    pub input: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Number of concurrent workers (overrides PUSH_BROKER_SCALE)
    #[arg(short, long)]
    pub scale: Option<usize>,

    /// Stop immediately after this many seconds instead of draining the queue
    #[arg(long, value_name = "SECS")]
    pub immediate_after: Option<u64>,

    /// Firebase service-account JSON file
    #[arg(long, env = "FIREBASE_SERVICE_ACCOUNT")]
    pub service_account: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Firebase,
    Huawei,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let args = Args::try_parse_from([
            "pushctl",
            "send",
            "--provider",
            "huawei",
            "--input",
            "batch.json",
            "--scale",
            "4",
            "--immediate-after",
            "30",
        ])
        .unwrap();

        match args.command {
            Commands::Send(send) => {
                assert_eq!(send.input.provider, Provider::Huawei);
                assert_eq!(send.input.input, PathBuf::from("batch.json"));
                assert_eq!(send.scale, Some(4));
                assert_eq!(send.immediate_after, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "pushctl",
            "validate",
            "-p",
            "firebase",
            "-i",
            "batch.json",
            "--log-format",
            "json",
            "-v",
        ])
        .unwrap();

        assert!(args.verbose);
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(matches!(args.command, Commands::Validate(_)));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Args::try_parse_from(["pushctl", "validate", "-p", "apns", "-i", "x.json"]);
        assert!(result.is_err());
    }
}
