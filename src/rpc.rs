/// RPC endpoint pool
///
/// Holds an ordered list of RPC endpoint URLs and one live provider. A
/// request is retried against the current endpoint a bounded number of
/// times; when the endpoint keeps failing, the pool rotates one step
/// (mod pool size) and surrenders the error to the caller, which simply
/// tries again on its next iteration with the fresh endpoint. Rotation
/// is a small state machine, not exception-driven control flow.
use crate::error::{Result, YamError};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use std::time::Duration;
use tokio::time::sleep;

/// Attempts against one endpoint before rotating
pub const MAX_RETRIES: u32 = 6;

/// Pause between attempts against the same endpoint
pub const RETRY_DELAY: Duration = Duration::from_millis(1500);

pub struct RpcPool {
    urls: Vec<String>,
    current: usize,
    provider: RootProvider<Http<Client>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RpcPool {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        let Some(first) = urls.first() else {
            return Err(YamError::Config(
                "At least one RPC endpoint is required".to_string(),
            ));
        };

        let provider = connect(first)?;
        Ok(Self {
            urls,
            current: 0,
            provider,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        })
    }

    /// Override the retry schedule (tests use short delays)
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// URL of the endpoint currently in use
    pub fn endpoint(&self) -> &str {
        &self.urls[self.current]
    }

    /// Fetch all logs emitted by `contract` in `[from_block, to_block]`
    ///
    /// On exhaustion the pool rotates and returns the error; the next
    /// call runs against the new endpoint.
    pub async fn get_logs(
        &mut self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(contract)
            .from_block(from_block)
            .to_block(to_block);

        for attempt in 1..=self.max_retries {
            match self.provider.get_logs(&filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    tracing::info!(
                        "get_logs [{}..{}] failed on {} (attempt {}/{}): {}",
                        from_block,
                        to_block,
                        self.endpoint(),
                        attempt,
                        self.max_retries,
                        e
                    );
                    if attempt < self.max_retries {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let exhausted = self.endpoint().to_string();
        self.rotate()?;
        Err(YamError::Rpc(format!(
            "Blocks {from_block}..{to_block}: all {} attempts on {exhausted} failed",
            self.max_retries
        )))
    }

    /// Current chain head block number, same retry/rotate discipline
    pub async fn head_block(&mut self) -> Result<u64> {
        for attempt in 1..=self.max_retries {
            match self.provider.get_block_number().await {
                Ok(head) => return Ok(head),
                Err(e) => {
                    tracing::info!(
                        "get_block_number failed on {} (attempt {}/{}): {}",
                        self.endpoint(),
                        attempt,
                        self.max_retries,
                        e
                    );
                    if attempt < self.max_retries {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let exhausted = self.endpoint().to_string();
        self.rotate()?;
        Err(YamError::Rpc(format!(
            "Head block: all {} attempts on {exhausted} failed",
            self.max_retries
        )))
    }

    /// Advance to the next endpoint and rebuild the provider
    pub fn rotate(&mut self) -> Result<()> {
        let previous = self.current;
        self.current = (self.current + 1) % self.urls.len();
        self.provider = connect(&self.urls[self.current])?;
        tracing::info!(
            "Rotated from RPC endpoint #{} to #{} [{}]",
            previous + 1,
            self.current + 1,
            self.endpoint()
        );
        Ok(())
    }
}

fn connect(url: &str) -> Result<RootProvider<Http<Client>>> {
    let parsed = url
        .parse()
        .map_err(|e| YamError::Config(format!("Invalid RPC URL '{url}': {e}")))?;
    Ok(ProviderBuilder::new().on_http(parsed))
}
