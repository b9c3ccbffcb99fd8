//! Account autopilot: externally-triggered posting on a per-account schedule
//!
//! # Overview
//!
//! The autopilot never runs its own clock. Something external (cron hitting
//! the HTTP endpoint, an operator running the CLI) triggers a tick; the tick
//! sweeps the accounts whose `next_run_at` has passed, posts once for each,
//! and reschedules every account it touched. Multiple deployments can share
//! one database because a conditional-insert lock admits a single tick at a
//! time.
//!
//! # Architecture
//!
//! ```text
//!  POST /tick ─┐
//!              ├─▶ run_tick ──▶ lock ──▶ due accounts
//!  CLI tick  ──┘                              │
//!                                    per account:
//!                              pick caption + image
//!                                      │
//!                               executor (1 retry)
//!                                      │
//!                            attempt log + transition
//!                          success  / failure / login
//!                       cadence+jitter / +1h / per-kind
//! ```
//!
//! # Modules
//!
//! - [`health`] - health state transitions and next-run arithmetic
//! - [`tick`] - the tick sweep, account enable/disable, status snapshots
//!
//! # Quick Start
//!
//! ```ignore
//! use postpilot::autopilot::{Autopilot, TickOutcome};
//!
//! let pilot = Autopilot::new(store, publisher, &config.scheduler);
//!
//! match pilot.run_tick().await? {
//!     TickOutcome::Completed(report) => {
//!         println!("tick {}: {}/{} posted", report.tick_id, report.successes, report.processed);
//!     }
//!     TickOutcome::Busy => println!("another tick is running"),
//! }
//! ```

pub mod health;
pub mod tick;

pub use tick::{
    AccountStatus, AccountTickResult, Autopilot, StatusReport, TickOutcome, TickReport,
};
