//! askbot server: wires the Discord and agent clients into the webhook router.

use crate::config::AskBotConfig;
use crate::cooldown::CooldownGuard;
use crate::driver::{ConversationDriver, DriverSettings};
use crate::routes;
use crate::sweeper::Sweeper;
use anyhow::Result;
use ask_agent::{AgentApi, AgentClient};
use ask_platform::{
    ApplicationId, DiscordClient, Ed25519Verifier, PlatformApi, SignatureVerifier,
    default_commands,
};
use ask_transport::HttpTransport;
use axum::Extension;
use axum::Router;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct BotState {
    pub verifier: Arc<dyn SignatureVerifier>,
    pub driver: ConversationDriver,
    pub sweeper: Sweeper,
    pub started_at: Instant,
}

impl BotState {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        platform: Arc<dyn PlatformApi>,
        agent: Arc<dyn AgentApi>,
        cfg: &AskBotConfig,
    ) -> Self {
        let cooldowns = Arc::new(CooldownGuard::new(cfg.cooldown_period()));
        Self {
            verifier,
            driver: ConversationDriver::new(
                platform.clone(),
                agent,
                cooldowns,
                DriverSettings::from_config(cfg),
            ),
            sweeper: Sweeper::new(platform),
            started_at: Instant::now(),
        }
    }
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AskBotConfig::load(config_path).await?;
    cfg.require_serve_credentials()?;
    Ed25519Verifier::from_hex(&cfg.discord.public_key)
        .map_err(|e| anyhow::anyhow!("discord.public_key: {e}"))?;
    tracing::info!(
        port = cfg.server.port,
        interactions_path = %cfg.server.interactions_path,
        discord_api_base_url = %cfg.discord.api_base_url,
        agent_base_url = %cfg.agent.base_url,
        agent_id = %cfg.agent.agent_id,
        agent_mode = ?cfg.agent.mode,
        cooldown_ms = cfg.limits.cooldown_ms,
        retry_max_retries = cfg.retry.max_retries,
        "config ok"
    );
    Ok(())
}

pub async fn register(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AskBotConfig::load(config_path).await?;
    cfg.require_discord_credentials()?;
    let discord = discord_client(&cfg)?;
    let application_id = ApplicationId::new(cfg.discord.application_id.trim());
    let commands = default_commands();
    let registered = discord
        .register_commands(&application_id, &commands)
        .await
        .map_err(|e| anyhow::anyhow!("register slash commands: {e}"))?;
    tracing::info!(
        application_id = %application_id,
        registered,
        "slash commands registered"
    );
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AskBotConfig::load(config_path).await?;
    cfg.require_serve_credentials()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(
        bind_addr = %addr,
        interactions_path = %cfg.server.interactions_path,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        agent_base_url = %cfg.agent.base_url,
        agent_id = %cfg.agent.agent_id,
        agent_mode = ?cfg.agent.mode,
        retry_timeout_ms = cfg.retry.timeout_ms,
        retry_max_retries = cfg.retry.max_retries,
        cooldown_ms = cfg.limits.cooldown_ms,
        "askbot configuration loaded"
    );

    let verifier = Ed25519Verifier::from_hex(&cfg.discord.public_key)
        .map_err(|e| anyhow::anyhow!("discord.public_key: {e}"))?;
    let platform: Arc<dyn PlatformApi> = Arc::new(discord_client(&cfg)?);
    let agent: Arc<dyn AgentApi> = Arc::new(AgentClient::new(
        HttpTransport::new(cfg.retry_policy())?,
        &cfg.agent.base_url,
        &cfg.agent.agent_id,
    ));
    let state = Arc::new(BotState::new(Arc::new(verifier), platform, agent, &cfg));

    let listener = preflight_bind_listener(addr).await?;
    let app = app_router(state, &cfg);

    let shutdown = CancellationToken::new();
    tracing::info!(%addr, "askbot serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

fn discord_client(cfg: &AskBotConfig) -> Result<DiscordClient> {
    let transport = HttpTransport::new(cfg.retry_policy())?;
    Ok(DiscordClient::new(transport, &cfg.discord.bot_token)
        .with_api_base_url(&cfg.discord.api_base_url)
        .with_thread_auto_archive_minutes(cfg.discord.thread_auto_archive_minutes))
}

fn app_router(state: Arc<BotState>, cfg: &AskBotConfig) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    routes::router(&cfg.server.interactions_path)
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}
