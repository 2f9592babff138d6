// SPDX-License-Identifier: GPL-2.0-or-later

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get},
    Router,
};
use backend::{ArcBackend, FsBackend};
use common::{EnvConfig, ILogger, LogEntry, LogLevel};
use env::{EnvConf, EnvConfigNewError};
use handler::{delete_handler, get_or_head_manifest_handler, put_manifest_handler, SloState};
use log::Logger;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    runtime::Handle,
    signal,
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("create env config: {0}")]
    NewEnvConfig(#[from] EnvConfigNewError),

    #[error("listen address {0:?} does not resolve")]
    ResolveListenAddr(String),

    #[error("listen on sigterm: {0}")]
    SigTermListener(std::io::Error),
}

pub async fn run(rt_handle: Handle, config_path: &PathBuf) -> Result<(), RunError> {
    let mut app = App::new(rt_handle, config_path)?;
    app.setup_routes();
    let mut shutdown_complete_rx = app.run()?;
    shutdown_complete_rx.recv().await;
    Ok(())
}

pub struct App {
    rt_handle: Handle,
    token: CancellationToken,
    env: EnvConf,
    logger: Arc<Logger>,
    shutdown_complete_tx: mpsc::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
    backend: ArcBackend,
    router: Router,
}

impl App {
    pub fn new(rt_handle: Handle, config_path: &PathBuf) -> Result<Self, RunError> {
        let token = CancellationToken::new();
        let env = EnvConf::new(config_path)?;
        let logger = Arc::new(Logger::new(Vec::new()));
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel::<()>(1);
        let backend: ArcBackend = Arc::new(FsBackend::new(env.storage_dir().to_path_buf()));

        Ok(Self {
            rt_handle,
            token,
            env,
            logger,
            shutdown_complete_tx,
            shutdown_complete_rx,
            backend,
            router: Router::new(),
        })
    }

    pub fn setup_routes(&mut self) {
        let state = SloState {
            backend: self.backend.clone(),
            logger: self.logger.clone(),
            config: Arc::new(self.env.clone()),
        };

        self.router = Router::new()
            .route(
                "/{*path}",
                get(get_or_head_manifest_handler)
                    .head(get_or_head_manifest_handler)
                    .put(put_manifest_handler)
                    .delete(delete_handler),
            )
            .layer(DefaultBodyLimit::disable())
            .with_state(state);
    }

    /// `App` must be dropped when this returns.
    pub fn run(self) -> Result<mpsc::Receiver<()>, RunError> {
        self.logger.log(LogEntry::new(
            LogLevel::Info,
            "app",
            format!("serving slo-proxy on {}", self.env.listen_addr()),
        ));

        let addr = self
            .env
            .listen_addr()
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .ok_or_else(|| RunError::ResolveListenAddr(self.env.listen_addr().to_owned()))?;

        let (server_exited_tx, server_exited_rx) = oneshot::channel();

        self.rt_handle.spawn(start_server(
            self.token.child_token(),
            self.shutdown_complete_tx.clone(),
            server_exited_tx,
            addr,
            self.router.clone(),
        ));

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RunError::SigTermListener)?;
        let token = self.token.clone();
        let shutdown_complete_tx = self.shutdown_complete_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => eprintln!("\nreceived interrupt, stopping..\n"),
                        Err(e) => eprintln!("\ninterrupt error: {e}"),
                    }
                }
                _ = sigterm.recv() => eprintln!("\nreceived terminate, stopping..\n"),
                res = server_exited_rx => {
                    if let Err(e) = res {
                        eprintln!("server error: {e}");
                    }
                },
            }
            token.cancel();
            drop(shutdown_complete_tx);
        });

        Ok(self.shutdown_complete_rx)
    }
}

#[derive(Debug, Error)]
enum ServerError {
    #[error("bind: {0}")]
    Bind(std::io::Error),

    #[error("{0}")]
    Server(std::io::Error),
}

async fn start_server(
    token: CancellationToken,
    _shutdown_complete: mpsc::Sender<()>,
    on_exit: oneshot::Sender<Result<(), ServerError>>,
    addr: SocketAddr,
    router: Router,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(v) => v,
        Err(e) => {
            let _ = on_exit.send(Err(ServerError::Bind(e)));
            return;
        }
    };
    let graceful =
        axum::serve(listener, router).with_graceful_shutdown(async move { token.cancelled().await });
    let _ = on_exit.send(graceful.await.map_err(ServerError::Server));
}
