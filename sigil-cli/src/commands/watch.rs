//! Watch command - re-issue a request on an interval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use sigil_core::{RateLimitRule, RateLimitStatus, Response, TaskOptions};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::auth::{AuthArgs, CallArgs, client_builder};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub call: CallArgs,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Refresh interval in seconds.
    #[arg(long, short, default_value = "30")]
    pub interval: u64,

    /// Minimum interval to use.
    #[arg(long, default_value = "1")]
    pub min_interval: u64,

    /// Stop after this many ticks.
    #[arg(long)]
    pub times: Option<u32>,

    /// Skip ticks while the remaining rate limit is below this percentage.
    #[arg(long, value_name = "PCT")]
    pub skip_below: Option<f64>,

    /// Keep ticking after a failed call.
    #[arg(long)]
    pub keep_going: bool,
}

/// Reads rate-limit counters from the usual response headers.
pub fn rate_limit_from_headers(response: &Response) -> Option<RateLimitStatus> {
    let number = |name: &str| response.header(name).and_then(|v| v.trim().parse::<u64>().ok());
    let remaining_hits = number("X-RateLimit-Remaining")?;
    let hourly_limit = number("X-RateLimit-Limit")?;
    let reset_time = number("X-RateLimit-Reset")
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    Some(RateLimitStatus {
        remaining_hits,
        hourly_limit,
        reset_time,
    })
}

/// Runs the watch command.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<ExitCode> {
    let refresh_interval = args.interval.max(args.min_interval);
    info!(interval = refresh_interval, "Starting watch mode");

    let client = client_builder(&args.auth).await?.build()?;

    let latest: Arc<Mutex<Option<RateLimitStatus>>> = Arc::new(Mutex::new(None));
    let mut options = TaskOptions::every(Duration::from_secs(refresh_interval));
    if let Some(times) = args.times {
        options = options.with_repeat_times(times);
    }
    if args.keep_going {
        options = options.continue_on_error();
    }
    if let Some(percent) = args.skip_below {
        let status = Arc::clone(&latest);
        options = options.with_rate_limit(
            RateLimitRule::by_percent(percent)
                .with_status(move || status.lock().ok().and_then(|s| *s)),
        );
    }
    let request = args.call.request().with_task_options(options);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let observed = Arc::clone(&latest);
    let handle = client.begin_request(request, move |_, response| {
        if let Some(status) = rate_limit_from_headers(&response) {
            if let Ok(mut slot) = observed.lock() {
                *slot = Some(status);
            }
        }
        let _ = tx.send(response);
    })?;

    let text = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(cli.pretty);
    let mut last = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            response = rx.recv() => {
                let Some(response) = response else { break };
                match cli.format {
                    OutputFormat::Text => {
                        let now = chrono::Local::now();
                        println!("[{}] {}", now.format("%H:%M:%S"), text.status_line(&response));
                        if let Some(status) = rate_limit_from_headers(&response) {
                            debug!(
                                remaining = status.remaining_hits,
                                limit = status.hourly_limit,
                                "Rate limit"
                            );
                        }
                        if let Some(error) = &response.exception {
                            if !cli.quiet {
                                eprintln!("{}", text.format_error("watch", &error.message));
                            }
                        }
                    }
                    OutputFormat::Json => println!("{}", json.format_response(&response)?),
                }
                last = Some(response);
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                debug!("Interrupted, cancelling periodic task");
                interrupted = true;
                client.cancel_periodic_tasks();
            }
        }
    }

    handle.wait().await?;

    Ok(last
        .filter(|r| !r.skipped_due_to_rate_limiting)
        .map_or(ExitCode::Success, |r| super::request::exit_code(&r)))
}
