use std::time::Duration;

use gamekeeper_core::SessionService;
use tracing::{info, warn};

/// Background task that applies due auto-approvals and auto-voids.
///
/// Reads already resolve sessions lazily; this only keeps rows that nobody
/// reads from going stale.
pub async fn run_sweep_loop(sessions: SessionService, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let svc = sessions.clone();
        match tokio::task::spawn_blocking(move || svc.sweep()).await {
            Ok(Ok(report)) => {
                if report.approved > 0 || report.voided > 0 {
                    info!(
                        "Sweep: auto-approved {} results, voided {} sessions",
                        report.approved, report.voided
                    );
                }
            }
            Ok(Err(e)) => warn!("Sweep error: {}", e),
            Err(e) => warn!("Sweep task failed: {}", e),
        }
    }
}
