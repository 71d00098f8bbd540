//! echolock-server — headless daemon and CLI wrapper driving the switch
//! lifecycle API.

mod cli;
mod config;
mod daemon;

use std::path::PathBuf;

use cli::Command;
use config::ServerConfig;

fn main() {
    // Security hardening: disable core dumps before anything else runs,
    // so key material never lands in a crash dump.
    echolock_primitives::memory::disable_core_dumps();

    let args: Vec<String> = std::env::args().collect();
    let parsed = match cli::parse_args(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(cli::EXIT_VALIDATION);
        }
    };

    if matches!(parsed.command, Command::Help) {
        cli::print_help();
        std::process::exit(cli::EXIT_OK);
    }
    if matches!(parsed.command, Command::Version) {
        println!("echolock-server {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(cli::EXIT_OK);
    }

    let exit_code = run(parsed.config_path, parsed.command);
    std::process::exit(exit_code);
}

fn run(config_path: PathBuf, command: Command) -> i32 {
    let mut server_config = match ServerConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e:#}", config_path.display());
            return cli::EXIT_VALIDATION;
        }
    };
    server_config.apply_env_overrides();

    if let Err(e) = server_config.validate() {
        eprintln!("configuration validation failed: {e:#}");
        return cli::EXIT_VALIDATION;
    }

    std::env::set_var("RUST_LOG", &server_config.server.log_level);
    env_logger::init();

    if matches!(command, Command::Validate) {
        cli::print_validate_summary(&server_config);
        return cli::EXIT_OK;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {e}");
            return cli::EXIT_UNSPECIFIED;
        }
    };

    rt.block_on(run_async(server_config, command))
}

async fn run_async(config: ServerConfig, command: Command) -> i32 {
    let lifecycle = cli::lifecycle_handle();

    match command {
        Command::Run => {
            let result = tokio::select! {
                result = daemon::run(config, lifecycle) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("received shutdown signal, exiting…");
                    Ok(())
                }
            };
            match result {
                Ok(()) => cli::EXIT_OK,
                Err(e) => {
                    log::error!("server error: {e:#}");
                    cli::EXIT_UNSPECIFIED
                }
            }
        }
        Command::TriggerScan => match daemon::run_scan_cycle(&lifecycle).await {
            Ok(n) => {
                println!("scan complete: {n} switch(es) examined");
                cli::EXIT_OK
            }
            Err(e) => {
                eprintln!("scan failed: {e:#}");
                cli::EXIT_UNSPECIFIED
            }
        },
        Command::Create {
            owner_id,
            title,
            message,
            interval_secs,
            recipients,
            n,
            k,
        } => {
            match cli::run_create(
                &lifecycle,
                &config,
                owner_id,
                title,
                message,
                interval_secs,
                recipients,
                n,
                k,
            )
            .await
            {
                Ok(switch_id_hex) => {
                    println!("{switch_id_hex}");
                    cli::EXIT_OK
                }
                Err(e) => {
                    eprintln!("create failed: {e}");
                    cli::exit_code_for(e.kind())
                }
            }
        }
        Command::CheckIn { switch_id_hex } => {
            let id = match cli::parse_switch_id(&switch_id_hex) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("error: {e}");
                    return cli::EXIT_VALIDATION;
                }
            };
            match lifecycle.check_in(id, now()).await {
                Ok(()) => cli::EXIT_OK,
                Err(e) => {
                    eprintln!("check-in failed: {e}");
                    cli::exit_code_for(e.kind())
                }
            }
        }
        Command::Cancel { switch_id_hex } => {
            let id = match cli::parse_switch_id(&switch_id_hex) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("error: {e}");
                    return cli::EXIT_VALIDATION;
                }
            };
            match lifecycle.cancel(id, now()).await {
                Ok(()) => cli::EXIT_OK,
                Err(e) => {
                    eprintln!("cancel failed: {e}");
                    cli::exit_code_for(e.kind())
                }
            }
        }
        Command::Release { switch_id_hex } => {
            let id = match cli::parse_switch_id(&switch_id_hex) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("error: {e}");
                    return cli::EXIT_VALIDATION;
                }
            };
            let delivery = echolock_release::LoggingDelivery;
            match lifecycle
                .manual_release(id, now(), &delivery, &std::collections::HashMap::new())
                .await
            {
                Ok(report) => {
                    println!("{report:?}");
                    cli::EXIT_OK
                }
                Err(e) => {
                    eprintln!("release failed: {e}");
                    cli::exit_code_for(e.kind())
                }
            }
        }
        Command::Status { switch_id_hex } => {
            let id = match cli::parse_switch_id(&switch_id_hex) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("error: {e}");
                    return cli::EXIT_VALIDATION;
                }
            };
            match lifecycle.store.get(id).await {
                Some(switch) => {
                    cli::print_status(&switch, now());
                    cli::EXIT_OK
                }
                None => {
                    eprintln!("switch not found");
                    cli::EXIT_VALIDATION
                }
            }
        }
        Command::Validate | Command::Help | Command::Version => unreachable!(),
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
