use anyhow::Result;
use clap::Args;
use lucida_core::ExitStatus;
use lucida_publish::PublishParams;
use std::path::Path;

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Bot handle as shown in the portal
    #[arg(long)]
    handle: Option<String>,

    /// Public messaging endpoint, e.g. https://relay.example.com/api/messages
    #[arg(long)]
    endpoint: Option<String>,

    /// Portal account
    #[arg(long, env = "LUCIDA_PORTAL_USER")]
    user: Option<String>,

    /// Portal password
    #[arg(long, env = "LUCIDA_PORTAL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Portal base URL (overrides the config file)
    #[arg(long)]
    portal: Option<String>,

    /// Seconds before a stuck stage is re-invoked
    #[arg(long)]
    watchdog_secs: Option<u64>,

    /// Give up after this many watchdog expiries on one stage
    #[arg(long)]
    max_timeouts: Option<u32>,
}

/// Run the publish script. A non-success outcome terminates the process
/// with the outcome's code.
pub fn run(config_path: Option<&Path>, args: PublishArgs) -> Result<()> {
    let mut publish = super::load_config(config_path)?.publish;
    if let Some(portal) = args.portal {
        publish.portal_url = portal;
    }
    if let Some(secs) = args.watchdog_secs {
        publish.watchdog_secs = secs;
    }
    if args.max_timeouts.is_some() {
        publish.max_timeouts = args.max_timeouts;
    }

    let params = PublishParams {
        handle: args.handle.unwrap_or_default(),
        endpoint: args.endpoint.unwrap_or_default(),
        user: args.user.unwrap_or_default(),
        password: args.password.unwrap_or_default(),
    };

    let status = if let Err(status) = params.validate() {
        eprintln!("missing parameters: {}", params.missing().join(", "));
        status
    } else {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(lucida_publish::publish(
            &publish.portal_url,
            params,
            publish.sequencer_options(),
        ))
    };

    exit_with(status)
}

fn exit_with(status: ExitStatus) -> Result<()> {
    if status.is_success() {
        println!("endpoint published");
        return Ok(());
    }
    eprintln!("publish failed: {status}");
    std::process::exit(status.code());
}
