//! Listener plumbing: serving the router and waiting for termination signals

use std::{future::Future, io, pin::pin, time::Duration};

use axum::extract::{ConnectInfo, Request};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    server::graceful::GracefulShutdown,
};
use tokio::{net::TcpListener, signal};
use tower::Service;
use tracing::{debug, error, info, warn};

use crate::{config::EchoConfig, handler::router};

/// How long a client may take to send the request head, also the keep-alive idle limit
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Back-off after a failed `accept`, e.g. when out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Serves [`router`] over HTTP/1 on `listener` until `shutdown` resolves.
///
/// The transport peer address of every connection is handed to the handler as
/// [`ConnectInfo`]. Connections which don't deliver a request head within
/// [`REQUEST_TIMEOUT`] are closed. On shutdown no new connections are accepted and
/// open ones are allowed to finish their current request.
///
/// # Errors
///
/// Returns an error if the listener address can't be read.
pub async fn serve<F>(listener: TcpListener, config: EchoConfig, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr()?;
    info!(%addr, route = config.route(), "serving client addresses");

    let app = router(config);
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(REQUEST_TIMEOUT);
    let graceful = GracefulShutdown::new();
    let mut shutdown = pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "can't accept connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let app = app.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(remote));
            app.clone().call(request)
        });
        let connection = graceful.watch(builder.serve_connection(TokioIo::new(stream), service));
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(%err, %remote, "connection closed");
            }
        });
    }

    graceful.shutdown().await;
    info!("server stopped");
    Ok(())
}

/// Resolves on `SIGINT` (Ctrl+C) or, on unix, `SIGTERM`
pub async fn shutdown_signal() {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("SIGINT received"),
            Err(err) => {
                error!(%err, "can't listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("SIGTERM received");
            }
            Err(err) => {
                error!(%err, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}
