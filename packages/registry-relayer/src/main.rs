//! Registry Relayer
//!
//! Watches PaymentManager for new and completed transfers and mirrors them
//! into RemoteBridge, checkpointing progress with `setLastBlock` so a restart
//! resumes where the last run stopped.

use eyre::{eyre, WrapErr};
use registry_relayer::{server, Config, RelaySettings, TransferRelay};
use tracing::{error, info};
use transfer_registry::evm::{EvmClient, EvmClientConfig, EvmPaymentManager, EvmRemoteBridge};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Registry Relayer");

    let config = Config::load()?;
    info!(
        evm_rpc = %config.evm_rpc_url,
        payment_manager = %config.payment_manager_address,
        remote_bridge = %config.remote_bridge_address,
        "Configuration loaded"
    );

    let mut client_config = EvmClientConfig::new(&config.evm_rpc_url, &config.evm_private_key);
    client_config.max_block_range = config.max_block_range;
    client_config.poll_interval = config.poll_interval();
    let client = EvmClient::new(&client_config)?;

    let chain_id = client
        .chain_id()
        .await
        .wrap_err("Failed to query chain ID")?;
    if chain_id != config.evm_chain_id {
        return Err(eyre!(
            "Chain ID mismatch: node reports {}, EVM_CHAIN_ID is {}",
            chain_id,
            config.evm_chain_id
        ));
    }

    let mut relay = TransferRelay::new(
        EvmPaymentManager::new(client.clone(), config.payment_manager()?),
        EvmRemoteBridge::new(client, config.remote_bridge()?),
        RelaySettings::from_config(&config),
    );
    relay.preflight().await?;

    // Health and metrics server
    let bind_address = config.health_bind_address.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&bind_address, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    relay.run(shutdown_rx).await?;

    info!("Registry Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,registry_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
