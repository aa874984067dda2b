//! html2md server - main entry point.
//!
//! Loads configuration from the environment, starts the REST and RPC
//! listeners and runs until SIGINT or SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;

use html2md_server::convert::HtmlConverter;
use html2md_server::http::HttpServer;
use html2md_server::lifecycle::ServerLifecycleManager;
use html2md_server::rpc::RpcServer;
use html2md_server::service::{ConvertService, ServiceInstance};
use html2md_server::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env().and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("html2md-server: {err}");
            return ExitCode::FAILURE;
        }
    };

    html2md_server::observability::init_tracing(&config.log);

    let instance = ServiceInstance::from_config(&config);
    tracing::info!(
        name = %instance.name,
        version = %instance.version,
        environment = %instance.environment,
        "service_starting"
    );

    let service = ConvertService::new(Arc::new(HtmlConverter::new()), &config, instance);

    let mut manager = ServerLifecycleManager::from_config(&config.server);
    manager
        .register(Arc::new(HttpServer::new(service.clone(), config.server.http.clone())))
        .register(Arc::new(RpcServer::new(service, config.server.rpc.clone())));

    if let Err(err) = manager.start().await {
        tracing::error!(error = %err, "service_start_failed");
        return ExitCode::FAILURE;
    }

    let report = manager.run(termination_signal()).await;
    if report.has_failures() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Resolve on the first SIGINT or SIGTERM.
async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "signal_received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "signal_received"),
    }
}
