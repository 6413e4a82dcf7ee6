//! Stream command - print batches of lines until the stream ends.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use sigil_core::StreamOptions;
use sigil_http::{StreamEnd, StreamEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::auth::{AuthArgs, CallArgs, client_builder};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the stream command.
#[derive(Args)]
pub struct StreamArgs {
    #[command(flatten)]
    pub call: CallArgs,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Lines delivered per batch.
    #[arg(long, default_value = "1")]
    pub per_callback: usize,

    /// Stop after this many seconds; runs until closed when omitted.
    #[arg(long)]
    pub duration: Option<u64>,

    /// Keep reading after a line that looks like an HTML page.
    #[arg(long)]
    pub allow_html: bool,
}

/// Runs the stream command.
pub async fn run(args: &StreamArgs, cli: &Cli) -> Result<ExitCode> {
    let client = client_builder(&args.auth).await?.build()?;

    let mut options = StreamOptions::new().with_results_per_callback(args.per_callback);
    if let Some(secs) = args.duration {
        options = options.with_duration(Duration::from_secs(secs));
    }
    if args.allow_html {
        options = options.with_non_data_detector(|_| false);
    }
    let request = args.call.request().with_stream_options(options);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = client.stream(request, move |event| {
        let _ = tx.send(event);
    })?;
    info!(id = %handle.id(), "Streaming");

    let text = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(cli.pretty);
    let mut end = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(StreamEvent::Batch { lines }) => match cli.format {
                    OutputFormat::Text => println!("{}", text.format_batch(&lines)),
                    OutputFormat::Json => println!("{}", json.format_batch(&lines)?),
                },
                Some(StreamEvent::End { reason }) => {
                    if !cli.quiet {
                        match cli.format {
                            OutputFormat::Text => eprintln!("{}", text.format_stream_end(&reason)),
                            OutputFormat::Json => println!("{}", json.format_stream_end(&reason)?),
                        }
                    }
                    end = Some(reason);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                debug!("Interrupted, cancelling stream");
                interrupted = true;
                client.cancel_streaming();
            }
        }
    }

    handle.wait().await?;

    Ok(match end {
        Some(StreamEnd::Failed(failure)) if failure.is_timeout() => ExitCode::Timeout,
        Some(StreamEnd::Failed(_)) => ExitCode::Error,
        Some(StreamEnd::Rejected { .. }) => ExitCode::HttpStatus,
        _ => ExitCode::Success,
    })
}
