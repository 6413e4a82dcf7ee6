//! Request command - one call, one response.

use anyhow::Result;
use clap::Args;
use sigil_core::Response;
use sigil_http::RetryPolicy;
use tracing::info;

use super::auth::{AuthArgs, CallArgs, client_builder};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the request command.
#[derive(Args)]
pub struct RequestArgs {
    #[command(flatten)]
    pub call: CallArgs,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Raw request body; replaces form-encoded parameters.
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Retries after the first attempt, spent on timeouts and 5xx responses.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Print response headers.
    #[arg(long, short = 'i')]
    pub include_headers: bool,

    /// Answer locally with this status instead of sending the request.
    #[arg(long)]
    pub expect_status: Option<u16>,

    /// Body for the local answer.
    #[arg(long, requires = "expect_status")]
    pub expect_content: Option<String>,

    /// Content type for the local answer.
    #[arg(long, requires = "expect_status")]
    pub expect_content_type: Option<String>,
}

/// Runs the request command.
pub async fn run(args: &RequestArgs, cli: &Cli) -> Result<ExitCode> {
    let client = client_builder(&args.auth).await?.build()?;

    let mut request = args.call.request();
    if let Some(data) = &args.data {
        request = request.with_post_content(data.as_bytes().to_vec());
    }
    if let Some(retries) = args.retries {
        request = request.with_retry_policy(RetryPolicy::new(retries).on_timeout().on_server_error());
    }
    if let Some(status) = args.expect_status {
        request = request.expect_status(status);
        if let Some(content) = &args.expect_content {
            request = request.expect_content(content);
        }
        if let Some(content_type) = &args.expect_content_type {
            request = request.expect_content_type(content_type);
        }
    }

    let response = client.request(&request).await?;
    info!(
        status = response.status_code,
        tries = response.times_tried,
        "Request finished"
    );

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color).with_headers(args.include_headers);
            println!("{}", formatter.format_response(&response));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_response(&response)?);
        }
    }

    Ok(exit_code(&response))
}

/// Maps a response to the process exit code.
pub fn exit_code(response: &Response) -> ExitCode {
    if response.timed_out {
        ExitCode::Timeout
    } else if response.exception.is_some() && response.status_code == 0 {
        ExitCode::Error
    } else if response.is_success() {
        ExitCode::Success
    } else {
        ExitCode::HttpStatus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::TransportFailure;

    #[test]
    fn test_exit_codes() {
        let ok = Response {
            status_code: 204,
            ..Response::default()
        };
        assert_eq!(exit_code(&ok), ExitCode::Success);

        let missing = Response {
            status_code: 404,
            ..Response::default()
        };
        assert_eq!(exit_code(&missing), ExitCode::HttpStatus);

        let timed_out = Response {
            timed_out: true,
            exception: Some(TransportFailure::timeout()),
            ..Response::default()
        };
        assert_eq!(exit_code(&timed_out), ExitCode::Timeout);
    }
}
