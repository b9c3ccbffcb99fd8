use anyhow::{Context, Result};

use postpilot::config::Config;

/// Register a new account
pub fn account_add(config: Config, username: String, session_ref: Option<String>) -> Result<()> {
    let store = super::open_store(&config)?;
    let account = store
        .create_account(&username, session_ref.as_deref())
        .context("Failed to create account")?;

    println!("Account created");
    println!("  ID: {}", account.id);
    println!("  Username: {}", account.username);
    println!(
        "  Session: {}",
        account.session_ref.as_deref().unwrap_or("(none)")
    );
    println!();
    println!("Autopilot is off; enable it with:");
    println!("  postpilot account enable {username}");

    Ok(())
}

/// List all registered accounts
pub fn account_list(config: Config) -> Result<()> {
    let store = super::open_store(&config)?;
    let accounts = store.list_accounts()?;

    if accounts.is_empty() {
        println!("No accounts registered.");
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<9} {:<12} {:<10} {:<8}",
        "ID", "Username", "Enabled", "Health", "Cadence", "Jitter"
    );
    println!("{:-<68}", "");
    for account in &accounts {
        println!(
            "{:<4} {:<20} {:<9} {:<12} {:<10} {:<8}",
            account.id,
            account.username,
            if account.autopilot_enabled { "yes" } else { "no" },
            account.health_state().to_string(),
            format!("{}m", account.cadence_minutes),
            format!("{}s", account.jitter_seconds),
        );
    }

    Ok(())
}

/// Enable autopilot for an account
pub fn account_enable(
    config: Config,
    username: String,
    cadence: Option<i64>,
    jitter: Option<i64>,
) -> Result<()> {
    let (autopilot, store) = super::build_autopilot(&config)?;
    let account = store.require_account_by_username(&username)?;
    let updated = autopilot.enable_account(account.id, cadence, jitter)?;

    println!("Autopilot enabled for {}", updated.username);
    println!("  Cadence: {} minutes", updated.cadence_minutes);
    println!("  Jitter: up to {} seconds", updated.jitter_seconds);
    if let Some(next) = updated.next_run_at {
        println!("  First run: {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

/// Disable autopilot for an account
pub fn account_disable(config: Config, username: String) -> Result<()> {
    let (autopilot, store) = super::build_autopilot(&config)?;
    let account = store.require_account_by_username(&username)?;
    let updated = autopilot.disable_account(account.id)?;

    println!("Autopilot disabled for {}", updated.username);
    Ok(())
}

/// Show recent posting attempts for an account
pub fn history(config: Config, username: String, limit: usize) -> Result<()> {
    let store = super::open_store(&config)?;
    let account = store.require_account_by_username(&username)?;
    let attempts = store.recent_attempts(account.id, limit)?;

    println!("Posting history for {}", account.username);
    println!("{:-<72}", "");

    if attempts.is_empty() {
        println!("No attempts recorded.");
        return Ok(());
    }

    for attempt in &attempts {
        let marker = if attempt.success { "ok " } else { "ERR" };
        let caption = attempt
            .caption_id
            .map(|id| format!("caption {id}"))
            .unwrap_or_else(|| "no caption".to_string());
        let image = attempt
            .image_id
            .map(|id| format!(", image {id}"))
            .unwrap_or_default();
        println!(
            "{} {} {} ({}{})",
            attempt.created_at.format("%Y-%m-%d %H:%M:%S"),
            marker,
            attempt.message,
            caption,
            image,
        );
    }

    Ok(())
}
