//! FNBUS Server - signature-verifying HTTP gateway.
//!
//! Every request except the health check must carry a valid FNBUS1 signature
//! (or FNSIGN, when legacy support is enabled). Authenticated requests get a
//! JSON description of the caller; everything else gets `403 Forbidden`.
//!
//! # Usage
//!
//! ```text
//! FNBUS_CREDENTIAL_ENDPOINT=http://auth.internal/api/secret fnbus-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:4580` | Bind address |
//! | `FNBUS_CREDENTIAL_ENDPOINT` | *(unset)* | Remote credential authority |
//! | `ACCESS_KEY` / `SECRET_KEY` | *(unset)* | Static key pair, used when no endpoint is set |
//! | `FNBUS_ENABLE_CACHING` | `true` | Cache looked-up secrets |
//! | `FNBUS_CACHE_TTL_SECS` | `1800` | Cache entry lifetime |
//! | `FNBUS_LOOKUP_TIMEOUT_SECS` | `5` | Secret lookup timeout |
//! | `FNBUS_MAX_CLOCK_SKEW_SECS` | *(unset)* | Reject requests dated further from now |
//! | `FNBUS_ENABLE_LEGACY` | `false` | Accept FNSIGN requests |
//! | `FNBUS_MAX_BODY_BYTES` | `10485760` | Larger bodies get `413 Payload Too Large` |
//! | `FNBUS_IDENTITY_AUTHORITY` | *(unset)* | Enterprise identity authority for caller claims |
//! | `FNBUS_IDENTITY_ENABLE_CACHING` | `true` | Cache enterprise identities |
//! | `FNBUS_IDENTITY_CACHE_TTL_SECS` | `300` | Identity cache entry lifetime |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod config;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use fnbus_auth::{CachingCredentialProvider, CredentialProvider, StaticCredentialProvider};
use fnbus_auth_http::{
    CachingIdentityProvider, IdentityProvider, RemoteCredentialProvider, RemoteIdentityProvider,
    SignatureGuard,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, SecretSource};
use crate::service::{GatewayService, HEALTH_PATH};

/// Server version reported in health check responses.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `RUST_LOG` wins over `LOG_LEVEL` when both are set.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("LOG_LEVEL is not a valid filter: {log_level}"))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Build the secret provider described by `config`.
fn build_credential_provider(config: &GatewayConfig) -> Result<Arc<dyn CredentialProvider>> {
    let Some(source) = &config.secrets else {
        anyhow::bail!(
            "no secret source configured. Set FNBUS_CREDENTIAL_ENDPOINT \
             or ACCESS_KEY and SECRET_KEY."
        );
    };

    match source {
        SecretSource::Remote { endpoint } => {
            let remote = RemoteCredentialProvider::with_timeout(endpoint, config.lookup_timeout)
                .with_context(|| format!("invalid credential endpoint: {endpoint}"))?;
            info!(
                endpoint = %endpoint,
                caching = config.enable_caching,
                "configured remote credential provider"
            );
            if config.enable_caching {
                Ok(Arc::new(CachingCredentialProvider::with_ttl(
                    remote,
                    config.cache_ttl,
                )))
            } else {
                Ok(Arc::new(remote))
            }
        }
        SecretSource::Static {
            access_key,
            secret_key,
        } => {
            info!(
                access_key = %access_key,
                "configured credential provider from environment"
            );
            Ok(Arc::new(StaticCredentialProvider::new(vec![(
                access_key.clone(),
                secret_key.clone(),
            )])))
        }
    }
}

/// Enterprise identity provider, when `FNBUS_IDENTITY_AUTHORITY` is set.
fn build_identity_provider(config: &GatewayConfig) -> Result<Option<Arc<dyn IdentityProvider>>> {
    let Some(authority) = &config.identity_authority else {
        return Ok(None);
    };
    let remote = RemoteIdentityProvider::with_timeout(authority, config.lookup_timeout)
        .with_context(|| format!("invalid identity authority: {authority}"))?;
    info!(
        authority = %authority,
        caching = config.identity_enable_caching,
        ttl = ?config.identity_cache_ttl,
        "configured enterprise identity provider"
    );
    let provider: Arc<dyn IdentityProvider> = if config.identity_enable_caching {
        Arc::new(CachingIdentityProvider::with_ttl(remote, config.identity_cache_ttl))
    } else {
        Arc::new(remote)
    };
    Ok(Some(provider))
}

/// Accept connections until Ctrl-C, then let open ones finish.
async fn serve(listener: TcpListener, service: GatewayService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let builder = HttpConnBuilder::new(TokioExecutor::new());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let conn = builder
                        .serve_connection(TokioIo::new(stream), service.clone())
                        .into_owned();
                    let conn = graceful.watch(conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            error!(%peer, error = %e, "connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            _ = &mut ctrl_c => break,
        }
    }

    info!("shutdown requested, waiting for open connections");
    graceful.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

/// Exit status for `--health-check`: asks a running gateway for its health document.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("gateway not reachable at {addr}"))?;
    stream
        .write_all(
            format!("GET {HEALTH_PATH} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n")
                .as_bytes(),
        )
        .await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let reply = String::from_utf8_lossy(&raw);

    let status_ok = reply
        .lines()
        .next()
        .is_some_and(|line| line.split_whitespace().nth(1) == Some("200"));
    anyhow::ensure!(
        status_ok && reply.contains(r#""status":"running""#),
        "gateway at {addr} is not healthy"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;

    let provider = build_credential_provider(&config)?;
    let guard = SignatureGuard::new(provider, config.guard_config());
    let mut gateway = GatewayService::new(guard).with_max_body_bytes(config.max_body_bytes);
    if let Some(identity) = build_identity_provider(&config)? {
        gateway = gateway.with_identity_provider(identity);
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        legacy = config.enable_legacy,
        max_clock_skew = ?config.max_clock_skew,
        version = VERSION,
        "starting FNBUS Server",
    );

    serve(listener, gateway).await
}
