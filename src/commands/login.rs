use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};

use postpilot::classifier::{ErrorKind, LoginPolicy};
use postpilot::config::Config;
use postpilot::publisher::LoginFlow;

/// Establish a session for an account through the publisher sidecar
pub async fn login(config: Config, username: String) -> Result<()> {
    let store = super::open_store(&config)?;
    let account = store.require_account_by_username(&username)?;
    let publisher = super::build_publisher(&config)?;

    println!("Logging in {}", account.username);

    let flow = LoginFlow::with_base_delay(publisher, config.login_backoff_base());
    let report = flow.login_with_policy(&account.username).await;

    if report.outcome.success {
        println!("Login succeeded after {} attempt(s)", report.attempts);
        return Ok(());
    }

    // Apply the same cooldown a tick would, so the scheduler backs off too
    let kind = report.kind.unwrap_or(ErrorKind::Unknown);
    let policy = LoginPolicy::for_kind(kind);
    let message = format!("login failed: {}", report.outcome.message);
    let next = Utc::now() + ChronoDuration::seconds(policy.cooldown_secs);
    store.mark_post_failure(account.id, &message, next)?;

    println!("Login failed after {} attempt(s)", report.attempts);
    println!("  Kind: {kind}");
    println!("  Error: {}", report.outcome.message);
    println!(
        "  Cooldown: {}s (next run {})",
        policy.cooldown_secs,
        next.format("%Y-%m-%d %H:%M:%S UTC")
    );

    anyhow::bail!("login failed for {}", account.username)
}
