//! Server setup

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use super::state::AppState;
use super::{Error, ServerConfig, create_app};

/// Run the server until `shutdown` resolves.
///
/// Counter instances are stopped once the listener has drained.
///
/// # Errors
///
/// Returns an error if the address is invalid, the port cannot be bound, or
/// the server fails while running.
pub async fn run_server<F>(config: ServerConfig, state: AppState, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e: std::net::AddrParseError| Error::InvalidAddress {
            address: config.bind_address.clone(),
            reason: e.to_string(),
        })?;

    let router = state.router.clone();
    let app = create_app(&config, state)?;

    let listener = TcpListener::bind(addr).await?;
    info!("Tally web server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    router.shutdown().await;
    info!("Tally web server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_objects::{CounterRouter, RouterConfig, StoreConfig};

    #[tokio::test]
    async fn test_invalid_bind_address_is_rejected() {
        let config = ServerConfig {
            bind_address: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        let state = AppState::new(CounterRouter::new(
            StoreConfig::in_memory(),
            RouterConfig::default(),
        ));

        let result = run_server(config, state, async {}).await;
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }
}
