//! Sign command - show the signature for a call without sending it.

use anyhow::{Context, Result, bail};
use clap::Args;
use sigil_http::query::QueryAuth;
use sigil_http::Query;

use super::auth::{AuthArgs, CallArgs, client_builder};
use crate::output::{HeaderOutput, JsonFormatter, SignatureOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the sign command.
#[derive(Args)]
pub struct SignArgs {
    #[command(flatten)]
    pub call: CallArgs,

    #[command(flatten)]
    pub auth: AuthArgs,
}

/// Runs the sign command.
pub async fn run(args: &SignArgs, cli: &Cli) -> Result<ExitCode> {
    let builder = client_builder(&args.auth).await?;
    let config = builder.config();
    let credentials = config
        .credentials
        .clone()
        .context("no credentials configured; pass --consumer-key or set one with `sigil config`")?;

    let mut request = args.call.request();
    let url = config.endpoint(request.path.as_deref())?;
    let method = request.method.or(config.method).unwrap_or_default();
    let query = credentials.get_query(&url, &mut request, method)?;

    let output = signature_output(&query)?;
    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_signature(&output));
        }
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&output)?),
    }

    Ok(ExitCode::Success)
}

/// Describes the signature a query carries.
pub fn signature_output(query: &Query) -> Result<SignatureOutput> {
    let QueryAuth::OAuth { info, .. } = &query.auth else {
        bail!("only OAuth credentials produce a signature");
    };

    Ok(SignatureOutput {
        flow: info.flow.to_string(),
        method: info.method.to_string(),
        url: query.url.to_string(),
        signature_method: info.signature_method.as_str().to_string(),
        signature_base: info.signature_base.clone(),
        signature: info.signature().map(ToString::to_string),
        authorization: query.authorization_header(),
        oauth_parameters: info
            .parameters
            .oauth()
            .map(|p| HeaderOutput {
                name: p.name.clone(),
                value: p.value.clone(),
            })
            .collect(),
    })
}
