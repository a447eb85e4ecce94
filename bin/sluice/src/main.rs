//! Rollup batcher.
//!
//! Loads unsafe L2 blocks from the sequencer, packs them into compressed
//! channels and posts the channel frames to the batch inbox on L1.

mod alt_da;
mod cli;
mod l1_info;
mod rpc;

use std::sync::{Arc, atomic::Ordering};

use alloy::providers::{Provider, ProviderBuilder};
use alt_da::HttpAltDaClient;
use clap::Parser;
use cli::Args;
use eyre::Result;
use op_alloy::network::Optimism;
use rpc::{RpcL2Client, RpcRollupClient, RpcThrottleEndpoint};
use sluice_batcher::{
    AltDaClient, BatchSubmitter, BatcherMetrics, DriverSetup, ThrottleConfig, ThrottleEndpoint,
};
use sluice_cli::{init_tracing, shutdown_signal};
use sluice_txmgr::{ProviderBackend, TxManager, TxManagerConfig, WalletSigner};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let l1 = ProviderBuilder::new().disable_recommended_fillers().connect(&args.l1_rpc_url).await?;
    let chain_id = l1.get_chain_id().await?;
    let address = args.private_key.address();
    info!(%address, chain_id, "Connected to L1");

    let tx_manager = TxManager::new(
        TxManagerConfig::from(&args.txmgr),
        Arc::new(ProviderBackend::new(Arc::new(l1))),
        Arc::new(WalletSigner::new(args.private_key, chain_id)),
    );

    let l2 = ProviderBuilder::new()
        .disable_recommended_fillers()
        .network::<Optimism>()
        .connect(&args.l2_rpc_url)
        .await?;
    let rollup =
        ProviderBuilder::new().disable_recommended_fillers().connect(&args.rollup_rpc_url).await?;

    let mut throttle_endpoints: Vec<Arc<dyn ThrottleEndpoint>> = Vec::new();
    for url in std::iter::once(&args.l2_rpc_url).chain(&args.throttle.additional_endpoints) {
        let provider = ProviderBuilder::new().disable_recommended_fillers().connect(url).await?;
        throttle_endpoints.push(Arc::new(RpcThrottleEndpoint::new(url.clone(), provider)));
    }

    let alt_da = match args.batcher.altda_server.as_deref() {
        Some(server) => {
            info!(server, "Posting channel data to alt-DA");
            let client = HttpAltDaClient::new(server, args.batcher.rpc_timeout)?;
            Some(Arc::new(client) as Arc<dyn AltDaClient>)
        }
        None => None,
    };

    let metrics = Arc::new(BatcherMetrics::new());
    let submitter = BatchSubmitter::new(DriverSetup {
        config: args.batcher.batcher_config(ThrottleConfig::from(&args.throttle)),
        tx_manager,
        l2: Arc::new(RpcL2Client::new(l2)),
        rollup: Arc::new(RpcRollupClient::new(rollup)),
        channel_config: args.batcher.channel_config_provider(),
        metrics: metrics.clone(),
        alt_da,
        throttle_endpoints,
    })?;

    submitter.start().await?;
    shutdown_signal().await;
    submitter.stop(args.kill_timeout).await?;

    info!(
        channels_submitted = metrics.channels_submitted.load(Ordering::Relaxed),
        txs_submitted = metrics.txs_submitted.load(Ordering::Relaxed),
        txs_failed = metrics.txs_failed.load(Ordering::Relaxed),
        compression_ratio = metrics.compression_ratio(),
        "Batcher exited"
    );
    Ok(())
}
