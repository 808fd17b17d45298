//! Scheduler entry point.
//!
//! Builds the job graph once from environment configuration and drives it:
//! block discovery, the booster payout phases for each standard tier, and
//! the activity enricher consuming the internal event bus. All external
//! contracts are injected explicitly; this binary wires the in-memory
//! backends used for local development, with production backends plugging in
//! behind the same traits.

use std::sync::Arc;

use stride_core::observability::{init_logging, LogFormat};

use stride_flow::bus::ActivityEventBus;
use stride_flow::chain::memory::InMemoryLedgerNode;
use stride_flow::chain::LedgerClient;
use stride_flow::discovery::block_range::BlockRangeDiscovery;
use stride_flow::enrich::ActivityEnricher;
use stride_flow::error::Result;
use stride_flow::lease::memory::InMemoryLeaseRegistry;
use stride_flow::lease::JobLease;
use stride_flow::pipeline::booster::{BoosterSource, BoosterTier};
use stride_flow::pipeline::{BroadcastPayouts, ConfirmPayouts, PayoutPipeline, PreparePayouts};
use stride_flow::provider::{InMemoryIntegrationStore, ScriptedDriver};
use stride_flow::runtime::{optional_env, FlowConfig, Job, JobGraph, JobRunner};
use stride_flow::signer::{Signer, StaticSigner};
use stride_flow::store::memory::InMemoryStore;
use stride_flow::store::{ChainStore, PayoutStore, ReferralStore};
use stride_flow::webhook::WebhookIngestor;

#[tokio::main]
async fn main() -> Result<()> {
    let format = match optional_env("STRIDE_LOG_FORMAT", "pretty").as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_logging(format);

    let config = FlowConfig::from_env()?;
    tracing::info!(instance = %config.instance_id, "starting stride-flow scheduler");

    let store = Arc::new(InMemoryStore::new());
    let node = Arc::new(InMemoryLedgerNode::new());
    let signer: Arc<dyn Signer> = Arc::new(StaticSigner::new());
    let lease: Arc<dyn JobLease> = Arc::new(InMemoryLeaseRegistry::new());

    let (bus, events) = ActivityEventBus::channel();
    // The HTTP layer owns webhook acknowledgment and hands payloads to the
    // ingestor; it is wired here so the bus stays open for the enricher.
    let _ingestor = WebhookIngestor::new(Arc::clone(&store) as _, bus);

    let enricher = ActivityEnricher::new(
        Arc::clone(&store) as _,
        Arc::new(InMemoryIntegrationStore::new()),
        Arc::new(ScriptedDriver::new()),
    );
    let enricher_task = tokio::spawn(async move { enricher.run(events).await });

    let mut graph = JobGraph::new();
    graph.schedule(
        Arc::new(BlockRangeDiscovery::new(
            Arc::clone(&store),
            Arc::clone(&node),
        )),
        config.discovery_interval,
    );

    for tier in BoosterTier::standard() {
        let source = BoosterSource::new(
            tier,
            Arc::clone(&store) as Arc<dyn ReferralStore>,
            Arc::clone(&store) as Arc<dyn PayoutStore>,
            Arc::clone(&store) as Arc<dyn ChainStore>,
        );
        let pipeline = Arc::new(PayoutPipeline::new(
            source,
            Arc::clone(&store) as Arc<dyn PayoutStore>,
            Arc::clone(&node) as Arc<dyn LedgerClient>,
            Arc::clone(&signer),
        ));
        graph.schedule(
            Arc::new(PreparePayouts::new(Arc::clone(&pipeline))) as Arc<dyn Job>,
            config.payout_interval,
        );
        graph.schedule(
            Arc::new(BroadcastPayouts::new(Arc::clone(&pipeline))) as Arc<dyn Job>,
            config.payout_interval,
        );
        graph.schedule(
            Arc::new(ConfirmPayouts::new(pipeline)) as Arc<dyn Job>,
            config.confirm_interval,
        );
    }

    tracing::info!(jobs = graph.len(), "job graph constructed");

    let runner = Arc::new(JobRunner::new(
        lease,
        config.instance_id.clone(),
        config.tick_budget,
    ));

    tokio::select! {
        () = graph.run(runner) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    enricher_task.abort();
    Ok(())
}
