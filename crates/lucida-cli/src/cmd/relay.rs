use anyhow::{anyhow, Context, Result};
use lucida_core::config::resolve_listen;
use std::path::Path;

pub fn run(
    config_path: Option<&Path>,
    args: &[String],
    app_id: Option<String>,
    app_password: Option<String>,
) -> Result<()> {
    let mut config = super::load_config(config_path)?.relay;
    if app_id.is_some() {
        config.app_id = app_id;
    }
    if app_password.is_some() {
        config.app_password = app_password;
    }

    let defaults = config
        .listen_defaults()
        .map_err(|e| anyhow!("relay section of config: {e}"))?;
    let listen = resolve_listen(args, &defaults).map_err(|e| anyhow!("{e}"))?;
    let backend = listen.backend_url();
    let state = lucida_relay::build_state(&config, &backend)?;

    tracing::info!(port = listen.port, %backend, "starting relay");
    if config.app_id.is_some() && config.connector_token_url.is_none() {
        tracing::warn!("app_id set without connector_token_url; replies will be sent unauthenticated");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", listen.port))
            .await
            .with_context(|| format!("cannot listen on port {}", listen.port))?;

        tokio::select! {
            res = lucida_relay::serve_on(listener, state) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
