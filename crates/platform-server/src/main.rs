//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! TrustEdge Platform Server — thin entry point for the edge CA agent.
//!
//! All coordination logic lives in `trustedge_platform`. This binary is
//! responsible only for: CLI parsing, env config loading, wiring the CA
//! store, the two monitors, and their reference transport/connectivity
//! implementations, and graceful shutdown.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use trustedge_platform::ca::builder as ca_builder;
use trustedge_platform::ca::gen::IssuedChain;
use trustedge_platform::ca::{CertGen, CertStore};
use trustedge_platform::monitor::{
    CachingConnectivityProvider, ExpiryMonitor, FixedConnectivityProvider, InMemoryShadowTransport, ShadowMonitor,
    ShadowTransport,
};
use trustedge_platform::Config;
use trustedge_types::prelude::{CertProfile, ConnectivityInfo, ValidityPolicy};

/// TrustEdge Platform Server — boots the edge certificate-lifecycle agent.
#[derive(Parser)]
#[command(
    name = "trustedge-platform-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "TrustEdge Platform Server — privacy and trust at the edge"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the CA agent: expiry monitor + shadow monitor (default)
    Serve {
        /// Overrides `CA_WORKDIR` for this run.
        #[arg(long)]
        workdir: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve { workdir: None }) {
        Commands::Serve { workdir } => serve(workdir).await,
    }
}

async fn serve(workdir_override: Option<std::path::PathBuf>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = Config::from_env()?;
    if let Some(workdir) = workdir_override {
        config.workdir = workdir;
    }
    tracing::info!(
        thing_name = %config.thing_name,
        ca_type = ?config.ca_type,
        workdir = %config.workdir.display(),
        "trustedge-platform-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let passphrase = config
        .ca_passphrase
        .clone()
        .unwrap_or_else(trustedge_core::generate_passphrase);
    let store = Arc::new(CertStore::update(&config.workdir, &passphrase, config.ca_type)?);

    // The cloud connectivity API and the MQTT shadow bridge are out of scope
    // for this core (spec §1); these are the reference implementations a
    // single-node deployment wires in behind the same trait boundaries.
    let seed_hosts = env::var("CONNECTIVITY_HOSTS").unwrap_or_default();
    let seed_infos: Vec<ConnectivityInfo> = seed_hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|host| ConnectivityInfo {
            host_address: host.to_string(),
            port: 8883,
            id: "primary".to_string(),
            metadata: Default::default(),
        })
        .collect();
    let connectivity = Arc::new(CachingConnectivityProvider::new(Arc::new(FixedConnectivityProvider::new(
        seed_infos,
    ))));
    // Prime the cache so ExpiryMonitor's expiry-path regenerations have a
    // host set even before the first shadow event arrives.
    if let Err(err) = connectivity.get_connectivity_info().await {
        tracing::warn!(error = %err, "initial connectivity lookup failed, expiry-path certs will carry no SANs until the shadow converges");
    }

    let server_certgen = Arc::new(CertGen::new(
        config.thing_name.clone(),
        CertProfile::Server,
        ca_builder::generate_key_pair(config.ca_type)?,
        ValidityPolicy::server_default(),
        config.server_cert_validity_seconds,
        consumer_callback(format!("{}-server", config.thing_name)),
    ));
    let client_certgen = Arc::new(CertGen::new(
        format!("{}-client", config.thing_name),
        CertProfile::Client,
        ca_builder::generate_key_pair(config.ca_type)?,
        ValidityPolicy::client_default(),
        config.client_cert_validity_seconds,
        consumer_callback(format!("{}-client", config.thing_name)),
    ));

    let expiry_connectivity = connectivity.clone();
    let expiry_monitor = Arc::new(ExpiryMonitor::new(
        store.clone(),
        Arc::new(move || expiry_connectivity.cached_host_addresses()),
    ));
    expiry_monitor.add(server_certgen.clone()).await;
    expiry_monitor.add(client_certgen.clone()).await;
    let expiry_handle = expiry_monitor.clone().start(config.expiry_monitor_interval);

    let transport = Arc::new(InMemoryShadowTransport::new());
    let shadow_monitor = Arc::new(ShadowMonitor::new(
        config.thing_name.clone(),
        transport as Arc<dyn ShadowTransport>,
        connectivity,
        store,
        vec![server_certgen],
        config.shadow_processing_delay,
    ));
    let shadow_handles = shadow_monitor.clone().start();

    shutdown_signal().await;

    expiry_monitor.stop();
    shadow_monitor.stop().await;
    expiry_handle.abort();
    shadow_handles.processing.abort();
    shadow_handles.subscribe.abort();

    tracing::info!("trustedge-platform-server shut down cleanly");
    Ok(())
}

/// Build the `fn(chain_or_leaf)` consumer callback a `CertGen` invokes after
/// each successful issuance. No subscription framework needed — a real
/// deployment would hand this straight to the local MQTT client's TLS
/// context; this reference binary just logs that rotation happened.
fn consumer_callback(cert_id: String) -> Arc<dyn Fn(IssuedChain) + Send + Sync> {
    Arc::new(move |chain| {
        let leaf_pem = match &chain {
            IssuedChain::Leaf(leaf) => leaf,
            IssuedChain::LeafAndCa(leaf, _ca) => leaf,
        };
        tracing::info!(cert_id = %cert_id, bytes = leaf_pem.len(), "issued new certificate");
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping monitors...");
}
