use anyhow::{Context, Result};
use chrono::Utc;

use postpilot::autopilot::TickOutcome;
use postpilot::config::Config;

/// Trigger one posting sweep from the command line
pub async fn tick(config: Config) -> Result<()> {
    println!("Triggering Posting Sweep");
    println!("========================");

    let (autopilot, _store) = super::build_autopilot(&config).context("Failed to wire autopilot")?;

    match autopilot.run_tick().await? {
        TickOutcome::Completed(report) => {
            println!("Tick: {}", report.tick_id);
            println!("Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
            println!(
                "Processed: {} ({} ok, {} failed)",
                report.processed, report.successes, report.failures
            );

            if !report.results.is_empty() {
                println!();
                for result in &report.results {
                    let marker = if result.success { "ok " } else { "ERR" };
                    let kind = result
                        .error_kind
                        .map(|k| format!(" [{k}]"))
                        .unwrap_or_default();
                    println!(
                        "  {} {:<20} {}{}  next {}",
                        marker,
                        result.username,
                        result.message,
                        kind,
                        result.next_run_at.format("%H:%M:%S")
                    );
                }
            }
        }
        TickOutcome::Busy => {
            println!("Another tick is already in progress; nothing to do.");
        }
    }

    Ok(())
}

/// Print the scheduler snapshot
pub fn status(config: Config) -> Result<()> {
    let store = super::open_store(&config)?;
    let now = Utc::now();
    let stats = store.scheduler_stats(now)?;
    let accounts = store.list_accounts()?;

    println!("Postpilot Status");
    println!("{:-<60}", "");
    println!("Generated: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Enabled accounts: {}", stats.enabled);
    println!("Due now: {}", stats.due_now);
    println!("Due within the hour: {}", stats.due_next_hour);
    println!();

    if accounts.is_empty() {
        println!("No accounts registered.");
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<9} {:<12} {:<6} {:<20}",
        "ID", "Username", "Enabled", "Health", "Errs", "Next Run"
    );
    println!("{:-<75}", "");
    for account in &accounts {
        let next = account
            .next_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<20} {:<9} {:<12} {:<6} {:<20}",
            account.id,
            account.username,
            if account.autopilot_enabled { "yes" } else { "no" },
            account.health_state().to_string(),
            account.error_count,
            next
        );
    }

    Ok(())
}
