// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tower::ServiceBuilder;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{Span, debug, info, info_span, warn};

use nimbus_completion::CompletionFeed;
use nimbus_storage_api::ActivationStore;
use nimbus_types::config::ControllerOptions;

use crate::ActivationDispatcher;
use crate::coordinator::InvocationCoordinator;
use crate::handler::Handler;

pub type StartSignal = oneshot::Receiver<SocketAddr>;

#[derive(Debug, thiserror::Error)]
pub enum ControllerServerError {
    #[error("failed binding to address '{address}' specified in 'controller.bind-address'")]
    Binding {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("error while accepting connections: {0}")]
    Accept(#[from] std::io::Error),
}

pub struct ControllerServer<D, S, F> {
    listening_addr: SocketAddr,
    concurrency_limit: usize,
    coordinator: Arc<InvocationCoordinator<D, S, F>>,

    start_signal_tx: oneshot::Sender<SocketAddr>,
}

impl<D, S, F> ControllerServer<D, S, F>
where
    D: ActivationDispatcher + Send + Sync + 'static,
    S: ActivationStore + Send + Sync + 'static,
    F: CompletionFeed + Send + Sync + 'static,
{
    pub fn from_options(
        options: &ControllerOptions,
        dispatcher: D,
        store: S,
        feed: F,
    ) -> ControllerServer<D, S, F> {
        crate::metric_definitions::describe_metrics();
        nimbus_completion::metric_definitions::describe_metrics();

        let coordinator = InvocationCoordinator::from_options(options, dispatcher, store, feed);
        let (server, _) = ControllerServer::new(
            options.bind_address,
            options.concurrent_requests_limit(),
            Arc::new(coordinator),
        );

        server
    }

    pub fn new(
        listening_addr: SocketAddr,
        concurrency_limit: usize,
        coordinator: Arc<InvocationCoordinator<D, S, F>>,
    ) -> (Self, StartSignal) {
        let (start_signal_tx, start_signal_rx) = oneshot::channel();

        let server = Self {
            listening_addr,
            concurrency_limit,
            coordinator,
            start_signal_tx,
        };

        (server, start_signal_rx)
    }

    /// Serve the controller API until `shutdown` resolves.
    ///
    /// Connections still open at shutdown are dropped, pending blocking
    /// invocations included.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ControllerServerError> {
        let ControllerServer {
            listening_addr,
            concurrency_limit,
            coordinator,
            start_signal_tx,
        } = self;

        let listener =
            TcpListener::bind(listening_addr)
                .await
                .map_err(|err| ControllerServerError::Binding {
                    address: listening_addr,
                    source: err,
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ControllerServerError::Binding {
                address: listening_addr,
                source: err,
            })?;

        let service = ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request<_>| {
                        info_span!(
                            target: "nimbus_controller::api",
                            "controller-http-request",
                            http.version = ?request.version(),
                            http.request.method = %request.method(),
                            url.path = request.uri().path(),
                            url.query = request.uri().query().unwrap_or_default(),
                        )
                    })
                    // Just log on response
                    .on_request(())
                    .on_eos(())
                    .on_body_chunk(())
                    .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                        debug!(
                            name: "access-log",
                            target: "nimbus_controller::api",
                            parent: span,
                            {
                                http.response.status_code = response.status().as_u16(),
                                http.response.latency = ?latency
                            },
                            "Replied"
                        )
                    })
                    .on_failure(
                        |error: ServerErrorsFailureClass, latency: Duration, span: &Span| {
                            // Status codes are logged by on_response already
                            if let ServerErrorsFailureClass::Error(error_string) = error {
                                debug!(
                                    name: "access-log",
                                    target: "nimbus_controller::api",
                                    parent: span,
                                    { error.type = error_string, http.response.latency = ?latency },
                                    "Failed processing"
                                )
                            }
                        },
                    ),
            )
            .service(Handler::new(coordinator, concurrency_limit));

        info!(
            server.address = %local_addr.ip(),
            server.port = %local_addr.port(),
            "Controller HTTP listening"
        );

        let (connections_shutdown_tx, connections_shutdown_rx) = watch::channel(());
        tokio::pin!(shutdown);

        let _ = start_signal_tx.send(local_addr);

        loop {
            tokio::select! {
                res = listener.accept() => {
                    let (stream, remote_peer) = res?;
                    Self::handle_connection(
                        stream,
                        remote_peer,
                        service.clone(),
                        connections_shutdown_rx.clone(),
                    );
                }
                _ = &mut shutdown => {
                    info!("Controller HTTP shutting down");
                    let _ = connections_shutdown_tx.send(());
                    return Ok(());
                }
            }
        }
    }

    fn handle_connection<T, B>(
        stream: TcpStream,
        remote_peer: SocketAddr,
        handler: T,
        mut shutdown: watch::Receiver<()>,
    ) where
        B: http_body::Body + Send + 'static,
        <B as http_body::Body>::Data: Send + 'static,
        <B as http_body::Body>::Error: std::error::Error + Sync + Send + 'static,
        T: tower::Service<Request<Incoming>, Response = Response<B>, Error = Infallible>
            + Clone
            + Send
            + 'static,
        T::Future: Send + 'static,
    {
        let io = TokioIo::new(stream);
        let handler = hyper_util::service::TowerToHyperService::new(handler);

        tokio::spawn(async move {
            let auto_connection = auto::Builder::new(TokioExecutor::new());
            let serve_connection_fut = auto_connection.serve_connection(io, handler);

            tokio::select! {
                res = serve_connection_fut => {
                    if let Err(err) = res {
                        warn!(%remote_peer, "Error when serving the connection: {:?}", err);
                    }
                }
                _ = shutdown.changed() => {}
            }
        });
    }
}
