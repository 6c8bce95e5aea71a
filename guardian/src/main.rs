//! Budget guardian CLI.
//!
//! State lives under `.guardian/` in the working directory (or `--root`).
//! Every command prints pretty JSON on stdout; failures print the error chain
//! on stderr and exit with a code from [`guardian::exit_codes`].

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use guardian::admin::{
    OverrideRequest, RevokeRequest, UsageRequest, override_plan, record_usage, revoke_decision,
};
use guardian::core::calendar::MonthKey;
use guardian::core::types::{EpisodeAttributes, EpisodeKind, PlanCode, QualityTier, ResourceKind};
use guardian::decide::{
    DecisionOutcome, DecisionRequest, OutageRequest, decide_with_retry, report_outage,
};
use guardian::error::{GuardianError, guardian_error};
use guardian::exit_codes;
use guardian::io::config::load_config;
use guardian::io::event_arcs::load_event_arcs;
use guardian::io::init::{GuardianPaths, InitOptions, init_guardian};
use guardian::status::{budget_status, estimate_ladder};
use guardian::validate::validate_guardian;

#[derive(Parser)]
#[command(
    name = "guardian",
    version,
    about = "Budget-constrained plan selector for episode production"
)]
struct Cli {
    /// Project root containing `.guardian/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.guardian/` with default config and an empty ledger.
    Init {
        /// Overwrite existing files, including the ledger.
        #[arg(short, long)]
        force: bool,
    },
    /// Check config, event arcs, and ledger (schema + invariants).
    Validate,
    /// Print the cost breakdown of every configured plan.
    Estimate,
    /// Choose and commit a plan for one episode, or delay it.
    Decide {
        #[command(flatten)]
        episode: EpisodeArgs,
        /// Ignore reserve and soft stop (never the hard cap).
        #[arg(long = "override")]
        budget_override: bool,
        /// Fail immediately on lease contention instead of retrying.
        #[arg(long)]
        no_retry: bool,
    },
    /// Force a fallback after a render failure or provider outage.
    Outage {
        #[command(flatten)]
        episode: EpisodeArgs,
        /// What failed.
        #[arg(long)]
        reason: String,
    },
    /// Commit an admin-chosen plan, superseding the current one.
    Override {
        #[arg(long)]
        episode: String,
        #[arg(long)]
        plan: PlanCode,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Reverse an episode's current plan with compensating entries.
    Revoke {
        #[arg(long)]
        episode: String,
        #[arg(long)]
        admin: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Record metered consumption outside a plan (e.g. a re-render).
    Usage {
        #[arg(long)]
        episode: String,
        #[arg(long)]
        resource: ResourceKind,
        #[arg(long)]
        quantity: u64,
        #[arg(long, default_value = "economy")]
        tier: QualityTier,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Show the budget snapshot for a month.
    Snapshot {
        /// Month as YYYY-MM (defaults to the month of `--at`).
        #[arg(long)]
        month: Option<MonthKey>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Show (or reset) this week's production target.
    Cadence {
        /// Restore the week-start target.
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Args)]
struct EpisodeArgs {
    #[arg(long)]
    episode: String,
    #[arg(long, default_value = "short")]
    kind: EpisodeKind,
    #[arg(long, default_value_t = 5)]
    importance: u8,
    /// Episode belongs to an event arc.
    #[arg(long)]
    event_arc: bool,
    /// Planned publish time (defaults to `--at`).
    #[arg(long)]
    scheduled_at: Option<DateTime<Utc>>,
    #[arg(long)]
    deadline: Option<DateTime<Utc>>,
    /// Decision time (defaults to now).
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    /// Episodes left this month including this one.
    #[arg(long)]
    episodes_remaining: Option<u32>,
}

impl EpisodeArgs {
    fn now(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }

    fn attributes(&self) -> EpisodeAttributes {
        EpisodeAttributes {
            episode_id: self.episode.clone(),
            kind: self.kind,
            importance: self.importance,
            is_event_arc: self.event_arc,
            scheduled_at: self.scheduled_at.unwrap_or_else(|| self.now()),
            deadline: self.deadline,
        }
    }
}

fn main() -> ExitCode {
    guardian::logging::init();
    // clap's own usage-error code (2) would read as DELAYED.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                exit_code(exit_codes::INVALID)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(&cli) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code(error_exit_code(&err))
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn error_exit_code(err: &anyhow::Error) -> i32 {
    match guardian_error(err) {
        Some(GuardianError::AlreadyDecided { .. }) => exit_codes::ALREADY_DECIDED,
        Some(found) if found.is_retryable() => exit_codes::BUSY,
        _ => exit_codes::INVALID,
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let root = cli.root.as_path();
    match &cli.command {
        Command::Init { force } => cmd_init(root, *force),
        Command::Validate => {
            let outcome = validate_guardian(root)?;
            print_json(&serde_json::json!({
                "ledger_version": outcome.ledger_version,
                "months": outcome.months,
                "current_plans": outcome.current_plans,
            }))?;
            Ok(exit_codes::OK)
        }
        Command::Estimate => {
            print_json(&estimate_ladder(root)?)?;
            Ok(exit_codes::OK)
        }
        Command::Decide {
            episode,
            budget_override,
            no_retry,
        } => cmd_decide(root, episode, *budget_override, *no_retry),
        Command::Outage { episode, reason } => {
            let outcome = report_outage(
                &GuardianPaths::new(root),
                &OutageRequest {
                    episode: episode.attributes(),
                    now: episode.now(),
                    reason: reason.clone(),
                    episodes_remaining: episode.episodes_remaining,
                },
            )?;
            print_outcome(&outcome)
        }
        Command::Override {
            episode,
            plan,
            admin,
            reason,
            at,
        } => {
            let decision = override_plan(
                &GuardianPaths::new(root),
                &OverrideRequest {
                    episode_id: episode.clone(),
                    plan: *plan,
                    admin: admin.clone(),
                    reason: reason.clone(),
                    now: at.unwrap_or_else(Utc::now),
                },
            )?;
            print_json(&decision)?;
            Ok(exit_codes::OK)
        }
        Command::Revoke {
            episode,
            admin,
            reason,
            at,
        } => {
            let revocation = revoke_decision(
                &GuardianPaths::new(root),
                &RevokeRequest {
                    episode_id: episode.clone(),
                    admin: admin.clone(),
                    reason: reason.clone(),
                    now: at.unwrap_or_else(Utc::now),
                },
            )?;
            print_json(&revocation)?;
            Ok(exit_codes::OK)
        }
        Command::Usage {
            episode,
            resource,
            quantity,
            tier,
            at,
        } => {
            let entry = record_usage(
                &GuardianPaths::new(root),
                &UsageRequest {
                    episode_id: episode.clone(),
                    resource: *resource,
                    quantity: *quantity,
                    tier: *tier,
                    now: at.unwrap_or_else(Utc::now),
                },
            )?;
            print_json(&entry)?;
            Ok(exit_codes::OK)
        }
        Command::Snapshot { month, at } => {
            let month = month.unwrap_or_else(|| MonthKey::of(at.unwrap_or_else(Utc::now)));
            print_json(&budget_status(root, month)?)?;
            Ok(exit_codes::OK)
        }
        Command::Cadence { reset, at } => cmd_cadence(root, *reset, at.unwrap_or_else(Utc::now)),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_guardian(root, &InitOptions { force })?;
    print_json(&serde_json::json!({ "initialized": paths.guardian_dir }))?;
    Ok(exit_codes::OK)
}

fn cmd_decide(
    root: &Path,
    episode: &EpisodeArgs,
    budget_override: bool,
    no_retry: bool,
) -> Result<i32> {
    let paths = GuardianPaths::new(root);
    let request = DecisionRequest {
        episode: episode.attributes(),
        now: episode.now(),
        episodes_remaining: episode.episodes_remaining,
        budget_override,
    };
    let outcome = if no_retry {
        guardian::decide::decide(&paths, &request)?
    } else {
        decide_with_retry(&paths, &request, std::thread::sleep)?
    };
    print_outcome(&outcome)
}

fn cmd_cadence(root: &Path, reset: bool, now: DateTime<Utc>) -> Result<i32> {
    let paths = GuardianPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let arc_override = load_event_arcs(&paths.event_arcs_path)?.cadence_override_at(now);
    let store = paths.cadence_store();
    let update = if reset {
        store.reset(now, &cfg.cadence, arc_override)?
    } else {
        store.current(now, &cfg.cadence, arc_override)?
    };
    print_json(&serde_json::json!({
        "state": update.state,
        "changes": update.changes,
    }))?;
    Ok(exit_codes::OK)
}

fn print_outcome(outcome: &DecisionOutcome) -> Result<i32> {
    print_json(outcome)?;
    Ok(match outcome {
        DecisionOutcome::Committed(_) => exit_codes::OK,
        DecisionOutcome::Delayed(_) => exit_codes::DELAYED,
    })
}

/// Print `value` as pretty-printed JSON with trailing newline.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}
