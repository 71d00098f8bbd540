//! The daemon loop — periodically runs `TimerTick` against every armed
//! switch in the in-process registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use echolock_release::LoggingDelivery;
use echolock_switch::SwitchLifecycle;

use crate::config::ServerConfig;

/// Run the daemon loop. Blocks forever until the caller's select/signal
/// handling cancels it.
pub async fn run(config: ServerConfig, lifecycle: Arc<SwitchLifecycle>) -> Result<()> {
    log::info!("echolock server starting…");
    log::info!("  relays:              {} configured", config.relay.urls.len());
    log::info!("  min publish quorum:  {}", config.relay.min_publish_quorum);
    log::info!("  explorer:            {}", config.explorer.url);
    log::info!(
        "  scan interval:       {} seconds",
        config.server.check_in_scan_interval_secs
    );

    let interval = Duration::from_secs(config.server.check_in_scan_interval_secs);
    let mut first = true;

    loop {
        if !first {
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_scan_cycle(&lifecycle).await {
            Ok(n) => log::info!("scan cycle complete: {n} switch(es) examined"),
            Err(e) => log::error!("scan cycle failed: {e:#}"),
        }
    }
}

/// Execute one `TimerTick` scan against the current wall clock. No
/// password-protected switches are auto-released here — see
/// `ReleaseReport` / `FragmentKeyScheme::Passworded` in `echolock-switch`.
pub async fn run_scan_cycle(lifecycle: &SwitchLifecycle) -> Result<usize> {
    let now = now();
    let delivery = LoggingDelivery;
    let passwords: HashMap<String, Vec<u8>> = HashMap::new();

    let reports = lifecycle.timer_tick(now, &delivery, &passwords).await;
    for report in &reports {
        log_report(report);
    }
    Ok(reports.len())
}

fn log_report(report: &echolock_switch::ReleaseReport) {
    match report {
        echolock_switch::ReleaseReport::StillArmed { switch_id } => {
            log::debug!("switch {} still armed", hex::encode(switch_id));
        }
        echolock_switch::ReleaseReport::Released { switch_id } => {
            log::info!("switch {} released", hex::encode(switch_id));
        }
        echolock_switch::ReleaseReport::ReleaseFailed { switch_id, reason } => {
            log::error!("switch {} release failed: {reason}", hex::encode(switch_id));
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
