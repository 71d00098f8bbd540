//! Hand-rolled argument parsing and subcommand dispatch — no `clap`.
//!
//! Each subcommand builds a fresh, empty `SwitchLifecycle` for the
//! invocation: this binary has no persistence layer of its own (per the
//! Switch API's persistence interface, which is an external collaborator
//! this repository does not implement), so `create`/`check-in`/`cancel`/
//! `status`/`trigger-scan` only make sense chained within one process —
//! they exist as a scriptable driver and smoke-test surface for the
//! library crates, matching the "CLI wrapper is a driver, not a REST
//! surface" framing.

use std::path::PathBuf;
use std::sync::Arc;

use echolock_primitives::kind::ErrorKind;
use echolock_switch::{CreateRequest, RecipientRef, SwitchLifecycle};

use crate::config::ServerConfig;

pub const EXIT_OK: i32 = 0;
pub const EXIT_VALIDATION: i32 = 2;
pub const EXIT_RELEASE_FAILURE: i32 = 3;
pub const EXIT_EXPLORER_UNAVAILABLE: i32 = 4;
pub const EXIT_CRYPTO_FAILURE: i32 = 5;
pub const EXIT_UNSPECIFIED: i32 = 1;

pub fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Input => EXIT_VALIDATION,
        ErrorKind::AuthFailure | ErrorKind::Fatal => EXIT_CRYPTO_FAILURE,
        ErrorKind::Transient | ErrorKind::Timeout => EXIT_EXPLORER_UNAVAILABLE,
        ErrorKind::Quorum => EXIT_RELEASE_FAILURE,
        ErrorKind::Permanent => EXIT_UNSPECIFIED,
    }
}

pub enum Command {
    Run,
    Validate,
    Create {
        owner_id: String,
        title: String,
        message: String,
        interval_secs: u64,
        recipients: Vec<String>,
        n: u8,
        k: u8,
    },
    CheckIn {
        switch_id_hex: String,
    },
    Cancel {
        switch_id_hex: String,
    },
    Status {
        switch_id_hex: String,
    },
    Release {
        switch_id_hex: String,
    },
    TriggerScan,
    Help,
    Version,
}

pub struct ParsedArgs {
    pub config_path: PathBuf,
    pub command: Command,
}

pub fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut config_path = PathBuf::from("/config/echolock-server.toml");
    let mut command = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a path argument")?;
                config_path = PathBuf::from(path);
            }
            "--validate" => command = Some(Command::Validate),
            "--help" | "-h" => command = Some(Command::Help),
            "--version" | "-V" => command = Some(Command::Version),
            "run" => command = Some(Command::Run),
            "trigger-scan" => command = Some(Command::TriggerScan),
            "create" => {
                let owner_id = require_flag(args, &mut i, "--owner")?;
                let title = require_flag(args, &mut i, "--title")?;
                let message = require_flag(args, &mut i, "--message")?;
                let interval_secs = require_flag(args, &mut i, "--interval-secs")?
                    .parse::<u64>()
                    .map_err(|_| "--interval-secs must be an integer".to_string())?;
                let n = require_flag(args, &mut i, "--n")?
                    .parse::<u8>()
                    .map_err(|_| "--n must be an integer 0-255".to_string())?;
                let k = require_flag(args, &mut i, "--k")?
                    .parse::<u8>()
                    .map_err(|_| "--k must be an integer 0-255".to_string())?;
                let recipients_raw = require_flag(args, &mut i, "--recipients")?;
                let recipients = recipients_raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                command = Some(Command::Create {
                    owner_id,
                    title,
                    message,
                    interval_secs,
                    recipients,
                    n,
                    k,
                });
            }
            "check-in" => {
                let switch_id_hex = require_flag(args, &mut i, "--switch-id")?;
                command = Some(Command::CheckIn { switch_id_hex });
            }
            "cancel" => {
                let switch_id_hex = require_flag(args, &mut i, "--switch-id")?;
                command = Some(Command::Cancel { switch_id_hex });
            }
            "status" => {
                let switch_id_hex = require_flag(args, &mut i, "--switch-id")?;
                command = Some(Command::Status { switch_id_hex });
            }
            "release" => {
                let switch_id_hex = require_flag(args, &mut i, "--switch-id")?;
                command = Some(Command::Release { switch_id_hex });
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    Ok(ParsedArgs {
        config_path,
        command: command.unwrap_or(Command::Help),
    })
}

/// Consume the next two tokens, requiring the first to be exactly `flag`
/// and returning the second as its value. `i` ends pointed at the value
/// token, so the caller's loop increment lands past it.
fn require_flag(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    let got = args.get(*i).ok_or_else(|| format!("expected {flag}"))?;
    if got != flag {
        return Err(format!("expected {flag}, got {got}"));
    }
    *i += 1;
    let value = args
        .get(*i)
        .ok_or_else(|| format!("{flag} requires a value"))?;
    Ok(value.clone())
}

pub fn print_help() {
    println!(
        r#"echolock-server — headless dead-man's-switch coordinator daemon

USAGE:
    echolock-server [--config <PATH>] <SUBCOMMAND>

SUBCOMMANDS:
    run                                          Run the daemon loop
    trigger-scan                                 Run one timer-tick scan and exit
    create --owner <ID> --title <T> --message <M>
           --interval-secs <SECS> --n <N> --k <K>
           --recipients <id1,id2,...>             Create a switch, print its id
    check-in --switch-id <HEX>                    Reset a switch's deadline
    cancel --switch-id <HEX>                       Cancel an armed switch
    status --switch-id <HEX>                       Print a switch's status view
    release --switch-id <HEX>                       Force release of a triggered switch
    --validate                                     Validate config and exit

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/echolock-server.toml)
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    ECHOLOCK_LOG_LEVEL
    ECHOLOCK_CHECK_IN_SCAN_INTERVAL_SECS
    ECHOLOCK_SERVICE_MASTER_KEY
    ECHOLOCK_ALLOW_MAINNET
    RELAY_URLS
    EXPLORER_URL
    MIN_PUBLISH_QUORUM
    PBKDF2_ITERATIONS
"#
    );
}

pub fn print_validate_summary(config: &ServerConfig) {
    println!("configuration is valid.");
    println!("  relays:              {}", config.relay.urls.len());
    println!("  min publish quorum:  {}", config.relay.min_publish_quorum);
    println!("  explorer:            {}", config.explorer.url);
    println!("  network:             {:?}", config.explorer.network);
    println!("  pbkdf2 iterations:   {}", config.crypto.pbkdf2_iterations);
    println!(
        "  scan interval:       {}s",
        config.server.check_in_scan_interval_secs
    );
}

/// Run a one-shot `create` against a fresh, process-local lifecycle and
/// print the resulting switch id hex to stdout.
pub async fn run_create(
    lifecycle: &SwitchLifecycle,
    config: &ServerConfig,
    owner_id: String,
    title: String,
    message: String,
    interval_secs: u64,
    recipients: Vec<String>,
    n: u8,
    k: u8,
) -> Result<String, echolock_switch::SwitchError> {
    let req = CreateRequest {
        owner_id,
        title,
        plaintext: message.as_bytes(),
        interval_secs,
        recipients: recipients
            .into_iter()
            .map(|id| RecipientRef { id, label: None })
            .collect(),
        n,
        k,
        relays: config.relay.urls.clone(),
        min_quorum: config.relay.min_publish_quorum,
        password: None,
        chain_anchor: None,
    };
    let id = lifecycle.create(req).await?;
    Ok(hex::encode(id))
}

pub fn parse_switch_id(hex_str: &str) -> Result<[u8; 16], String> {
    let bytes = hex::decode(hex_str).map_err(|_| "switch id is not valid hex".to_string())?;
    bytes
        .try_into()
        .map_err(|_| "switch id must be exactly 16 bytes".to_string())
}

pub fn print_status(lifecycle_switch: &echolock_switch::Switch, now: u64) {
    println!("switch_id:       {}", lifecycle_switch.switch_id_hex());
    println!("status:          {:?}", lifecycle_switch.status);
    println!("check_in_count:  {}", lifecycle_switch.check_in_count);
    println!("expires_at:      {}", lifecycle_switch.expires_at);
    println!("recipients:      {}", lifecycle_switch.recipients.len());
    println!(
        "urgency:         {:?}",
        lifecycle_switch.check_in_urgency(now)
    );
}

pub fn lifecycle_handle() -> Arc<SwitchLifecycle> {
    Arc::new(SwitchLifecycle::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        std::iter::once("echolock-server".to_string())
            .chain(parts.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn parses_run_with_config_flag() {
        let parsed = parse_args(&args(&["--config", "/tmp/x.toml", "run"])).unwrap();
        assert_eq!(parsed.config_path, PathBuf::from("/tmp/x.toml"));
        assert!(matches!(parsed.command, Command::Run));
    }

    #[test]
    fn parses_create_with_all_flags() {
        let parsed = parse_args(&args(&[
            "create",
            "--owner",
            "alice",
            "--title",
            "will",
            "--message",
            "secret",
            "--interval-secs",
            "3600",
            "--n",
            "5",
            "--k",
            "3",
            "--recipients",
            "bob,carol",
        ]))
        .unwrap();
        match parsed.command {
            Command::Create {
                owner_id,
                n,
                k,
                recipients,
                ..
            } => {
                assert_eq!(owner_id, "alice");
                assert_eq!(n, 5);
                assert_eq!(k, 3);
                assert_eq!(recipients, vec!["bob".to_string(), "carol".to_string()]);
            }
            _ => panic!("expected Create"),
        }
    }

    #[test]
    fn parses_release_with_switch_id() {
        let parsed = parse_args(&args(&["release", "--switch-id", "ab"])).unwrap();
        match parsed.command {
            Command::Release { switch_id_hex } => assert_eq!(switch_id_hex, "ab"),
            _ => panic!("expected Release"),
        }
    }

    #[test]
    fn rejects_unknown_argument() {
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn missing_flag_value_is_an_error() {
        assert!(parse_args(&args(&["check-in", "--switch-id"])).is_err());
    }

    #[test]
    fn no_command_defaults_to_help() {
        let parsed = parse_args(&args(&[])).unwrap();
        assert!(matches!(parsed.command, Command::Help));
    }

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(exit_code_for(ErrorKind::Input), EXIT_VALIDATION);
        assert_eq!(exit_code_for(ErrorKind::Quorum), EXIT_RELEASE_FAILURE);
        assert_eq!(exit_code_for(ErrorKind::Transient), EXIT_EXPLORER_UNAVAILABLE);
        assert_eq!(exit_code_for(ErrorKind::AuthFailure), EXIT_CRYPTO_FAILURE);
        assert_eq!(exit_code_for(ErrorKind::Permanent), EXIT_UNSPECIFIED);
    }

    #[test]
    fn parses_valid_switch_id_hex() {
        let id = parse_switch_id(&"ab".repeat(16)).unwrap();
        assert_eq!(id.len(), 16);
    }

    #[test]
    fn rejects_wrong_length_switch_id() {
        assert!(parse_switch_id("abcd").is_err());
    }
}
