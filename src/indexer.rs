/// Indexing loop
///
/// The system driver: advances a small block window along the chain,
/// decodes whatever the YAM contract emitted in it, and commits the
/// batch together with the watermark. Periodically re-anchors the window
/// to the chain head and reconciles a trailing window against the
/// subgraph to close any gaps direct RPC ingestion missed.
use crate::codec;
use crate::error::Result;
use crate::rpc::RpcPool;
use crate::store::EventStore;
use crate::subgraph::SubgraphClient;
use alloy::primitives::Address;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

/// Blocks fetched per iteration
pub const BLOCK_TO_RETRIEVE: u64 = 3;

/// Lag kept behind the chain head, so shallow re-orgs never reach us
pub const BLOCK_BUFFER: u64 = 5;

/// Iterations between re-anchoring the window to the chain head
pub const COUNT_BEFORE_RESYNC: u32 = 100;

/// Iterations between subgraph reconciliations
pub const COUNT_PERIODIC_BACKFILL: u32 = 960;

/// Trailing window reconciled against the subgraph (~1 day of blocks)
pub const BACKFILL_WINDOW: u64 = 17_280;

/// Pacing: slightly above the nominal 5 s block time, otherwise the
/// window outruns the tip and fetches blocks that do not exist yet
pub const SECONDS_PER_BLOCK: f64 = 5.1;

/// Supervisor pause before restarting a failed loop
pub const RESTART_DELAY: Duration = Duration::from_secs(30);

pub struct Indexer {
    store: EventStore,
    pool: RpcPool,
    subgraph: SubgraphClient,
    contract: Address,
    genesis_block: u64,
}

impl Indexer {
    pub fn new(
        store: EventStore,
        pool: RpcPool,
        subgraph: SubgraphClient,
        contract: Address,
        genesis_block: u64,
    ) -> Self {
        Self {
            store,
            pool,
            subgraph,
            contract,
            genesis_block,
        }
    }

    /// Run the loop under the outermost supervisor: a failed loop is
    /// logged and restarted after a pause, a clean shutdown ends it.
    pub async fn run_supervised(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            match self.run(&mut shutdown).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::error!(
                        "Indexing loop failed: {e}; restarting in {} seconds",
                        RESTART_DELAY.as_secs()
                    );
                    tokio::select! {
                        _ = sleep(RESTART_DELAY) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    /// One life of the indexing loop: initialise, then iterate until
    /// shutdown or error
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let head = self.pool.head_block().await?;
        let resume_from = self
            .store
            .last_indexed_block()
            .await?
            .unwrap_or(self.genesis_block);

        // Close the gap accumulated since the last run before going live
        self.backfill(resume_from, Some(head)).await?;

        let mut from_block = (head + 1).saturating_sub(BLOCK_BUFFER + BLOCK_TO_RETRIEVE);
        let mut to_block = head.saturating_sub(BLOCK_BUFFER);
        let mut sync_counter: u32 = 0;
        let mut backfill_counter: u32 = 0;

        tracing::info!(
            "Indexing loop running: window [{}..{}], head {}",
            from_block,
            to_block,
            head
        );

        loop {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested; stopping the indexing loop");
                return Ok(());
            }

            let start = Instant::now();

            // The pool retries internally; when it gives up it has
            // already rotated, so the next iteration gets a fresh
            // endpoint. The window is not advanced.
            let logs = match self.pool.get_logs(self.contract, from_block, to_block).await {
                Ok(logs) => logs,
                Err(e) => {
                    tracing::warn!("{e}; retrying the window next iteration");
                    continue;
                }
            };

            let events = match codec::decode_logs(&logs) {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(
                        "Decoding blocks {}..{} failed: {e}; retrying on a rotated endpoint",
                        from_block,
                        to_block
                    );
                    self.pool.rotate()?;
                    continue;
                }
            };

            self.store
                .commit_batch(Some((from_block, to_block)), &events)
                .await?;
            tracing::info!(
                "{} YAM log(s) retrieved from block {} to {}",
                events.len(),
                from_block,
                to_block
            );

            from_block = to_block + 1;
            to_block += BLOCK_TO_RETRIEVE;
            sync_counter += 1;
            backfill_counter += 1;

            if sync_counter > COUNT_BEFORE_RESYNC {
                match self.pool.head_block().await {
                    Ok(head) => {
                        sync_counter = 0;
                        // Re-anchor to_block to the head; pull from_block
                        // back only if it got ahead of where it should be
                        to_block = head.saturating_sub(BLOCK_BUFFER);
                        let deviation =
                            to_block as i64 - from_block as i64 - BLOCK_TO_RETRIEVE as i64;
                        if deviation < 0 {
                            from_block =
                                (head + 1).saturating_sub(BLOCK_BUFFER + BLOCK_TO_RETRIEVE);
                        }
                        tracing::info!(
                            "Resynced on newest block - deviation was {} block(s)",
                            deviation
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Resync skipped, head unavailable: {e}");
                    }
                }
            }

            if backfill_counter > COUNT_PERIODIC_BACKFILL {
                backfill_counter = 0;
                let backfill_from = to_block.saturating_sub(BACKFILL_WINDOW);
                self.backfill(backfill_from, Some(to_block)).await?;
            }

            // Pace to block time, accounting for the iteration's own cost
            let target = Duration::from_secs_f64(BLOCK_TO_RETRIEVE as f64 * SECONDS_PER_BLOCK);
            let pause = target.saturating_sub(start.elapsed());
            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested; stopping the indexing loop");
                    return Ok(());
                }
            }
        }
    }

    /// Reconcile `[from_block, to_block]` against the subgraph
    ///
    /// A failed fetch abandons the attempt (nothing committed, watermark
    /// untouched) and the next periodic tick retries; a failed commit is
    /// a store consistency problem and propagates to the supervisor.
    async fn backfill(&self, from_block: u64, to_block: Option<u64>) -> Result<()> {
        tracing::info!(
            "Backfilling from the subgraph: blocks {} to {:?}",
            from_block,
            to_block
        );

        let events = match self.subgraph.fetch_block_range(from_block, to_block).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(
                    "Backfill of blocks {}..{:?} abandoned: {e}",
                    from_block,
                    to_block
                );
                return Ok(());
            }
        };

        let window = to_block.map(|to| (from_block, to));
        self.store.commit_batch(window, &events).await?;
        tracing::info!(
            "Backfill successful - {} YAM event(s) merged between block {} and {:?}",
            events.len(),
            from_block,
            to_block
        );
        Ok(())
    }
}
