//! ERC-20 allowance confirmation: one state machine per
//! (owner, spender, token) key. The machine checks the on-chain
//! allowance through the indexing service, decides whether an approval
//! is needed, and once the external wallet service reports an approval
//! transaction id, polls until the allowance covers the deposit or the
//! retry budget runs out. It never signs or broadcasts anything.

pub mod indexer;

use crate::core::constants::{
    ALLOWANCE_MAX_POLL_ATTEMPTS, ALLOWANCE_POLL_INTERVAL_MS, ALLOWANCE_QUERY_RETRIES,
};
use crate::core::{AllowanceState, SwapResult};
use dashmap::DashMap;
use log::{debug, warn};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

pub use indexer::IndexerClient;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllowanceKey {
    pub chain: String,
    pub owner: String,
    pub spender: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct AllowanceConfig {
    pub poll_interval: Duration,
    /// Upper bound on confirmation polls; the upstream behavior polls
    /// forever, this implementation fails the machine instead.
    pub max_poll_attempts: u32,
    pub query_retries: u32,
}

impl Default for AllowanceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(ALLOWANCE_POLL_INTERVAL_MS),
            max_poll_attempts: ALLOWANCE_MAX_POLL_ATTEMPTS,
            query_retries: ALLOWANCE_QUERY_RETRIES,
        }
    }
}

pub struct AllowanceMachine {
    key: AllowanceKey,
    indexer: Arc<IndexerClient>,
    config: AllowanceConfig,
    state_tx: watch::Sender<AllowanceState>,
    cancelled: AtomicBool,
    polling: AtomicBool,
}

impl AllowanceMachine {
    pub fn new(key: AllowanceKey, indexer: Arc<IndexerClient>, config: AllowanceConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(AllowanceState::Unknown);
        Arc::new(Self {
            key,
            indexer,
            config,
            state_tx,
            cancelled: AtomicBool::new(false),
            polling: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &AllowanceKey {
        &self.key
    }

    pub fn state(&self) -> AllowanceState {
        *self.state_tx.borrow()
    }

    /// Every transition is observable by the caller.
    pub fn observe(&self) -> watch::Receiver<AllowanceState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, next: AllowanceState) {
        let current = self.state();
        if current != next {
            debug!(
                "Allowance {} -> {} (spender {})",
                current, next, self.key.spender
            );
            self.state_tx.send_replace(next);
        }
    }

    async fn fetch_allowance(&self) -> SwapResult<BigUint> {
        let mut attempt = 0u32;
        loop {
            match self
                .indexer
                .token_allowance(&self.key.chain, &self.key.owner, &self.key.spender, &self.key.token)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.query_retries => {
                    attempt += 1;
                    warn!(
                        "Allowance query failed, retrying ({}/{}): {}",
                        attempt, self.config.query_retries, err
                    );
                    sleep(self.config.poll_interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run the allowance check for a deposit in smallest units.
    /// Re-enterable: call again whenever the spend amount changes.
    pub async fn check(&self, deposit: &BigUint) -> SwapResult<AllowanceState> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(self.state());
        }
        self.transition(AllowanceState::Checking);

        match self.fetch_allowance().await {
            Ok(allowance) => {
                debug!(
                    "Amount to deposit: {} | allowance for spender {}: {}",
                    deposit, self.key.spender, allowance
                );
                let next = if allowance >= *deposit {
                    AllowanceState::Sufficient
                } else {
                    AllowanceState::InsufficientNeedsApproval
                };
                self.transition(next);
                Ok(next)
            }
            Err(err) => {
                self.transition(AllowanceState::Failed);
                Err(err)
            }
        }
    }

    /// The external wallet service signed and broadcast an approval
    /// transaction; poll until the allowance covers the deposit. A
    /// single poll loop per key: repeated calls while one is running
    /// are no-ops.
    pub fn approval_submitted(self: &Arc<Self>, txid: &str, deposit: BigUint) {
        if self.polling.swap(true, Ordering::SeqCst) {
            debug!("Allowance poll already running for spender {}", self.key.spender);
            return;
        }

        debug!(
            "Approval tx {} submitted, waiting for confirmation (spender {})",
            txid, self.key.spender
        );
        self.transition(AllowanceState::ApprovalPending);

        let machine = self.clone();
        tokio::spawn(async move {
            machine.transition(AllowanceState::ApprovalConfirming);
            let mut attempts = 0u32;

            loop {
                if machine.cancelled.load(Ordering::SeqCst) {
                    debug!("Allowance poll cancelled, stop checking");
                    break;
                }
                if attempts >= machine.config.max_poll_attempts {
                    warn!(
                        "Allowance poll budget exhausted after {} attempts",
                        attempts
                    );
                    machine.transition(AllowanceState::Failed);
                    break;
                }

                sleep(machine.config.poll_interval).await;
                if machine.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                attempts += 1;

                match machine
                    .indexer
                    .token_allowance(
                        &machine.key.chain,
                        &machine.key.owner,
                        &machine.key.spender,
                        &machine.key.token,
                    )
                    .await
                {
                    Ok(allowance) if allowance >= deposit => {
                        debug!("Allowance confirmed after {} poll(s)", attempts);
                        machine.transition(AllowanceState::Sufficient);
                        break;
                    }
                    Ok(_) => {
                        debug!(
                            "Allowance still below deposit, checking again in {:?} ({}/{})",
                            machine.config.poll_interval, attempts, machine.config.max_poll_attempts
                        );
                    }
                    Err(err) => {
                        // Transient indexer failures count against the budget.
                        warn!("Allowance poll error: {}", err);
                    }
                }
            }

            machine.polling.store(false, Ordering::SeqCst);
        });
    }

    /// Unmount signal: in-flight queries finish, their results are
    /// dropped, no further polls are scheduled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Registry of allowance machines keyed by (chain, owner, spender,
/// token), so the same approval is tracked by exactly one machine.
pub struct AllowanceTracker {
    machines: DashMap<AllowanceKey, Arc<AllowanceMachine>>,
    indexer: Arc<IndexerClient>,
    config: AllowanceConfig,
}

impl AllowanceTracker {
    pub fn new(indexer: Arc<IndexerClient>, config: AllowanceConfig) -> Self {
        Self {
            machines: DashMap::new(),
            indexer,
            config,
        }
    }

    pub fn machine_for(&self, key: AllowanceKey) -> Arc<AllowanceMachine> {
        self.machines
            .entry(key.clone())
            .or_insert_with(|| AllowanceMachine::new(key, self.indexer.clone(), self.config.clone()))
            .clone()
    }

    pub fn cancel_all(&self) {
        for entry in self.machines.iter() {
            entry.value().cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const SPENDER: &str = "0x2222222222222222222222222222222222222222";
    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn key() -> AllowanceKey {
        AllowanceKey {
            chain: "eth".to_string(),
            owner: OWNER.to_string(),
            spender: SPENDER.to_string(),
            token: TOKEN.to_string(),
        }
    }

    fn fast_config() -> AllowanceConfig {
        AllowanceConfig {
            poll_interval: Duration::from_millis(10),
            max_poll_attempts: 20,
            query_retries: 0,
        }
    }

    fn allowance_body(value: &str) -> String {
        format!(
            r#"{{"result":[{{"spender":"{}","tokenAddress":"{}","value":"{}"}}]}}"#,
            SPENDER, TOKEN, value
        )
    }

    async fn machine_against(server: &mockito::Server, config: AllowanceConfig) -> Arc<AllowanceMachine> {
        AllowanceMachine::new(key(), Arc::new(IndexerClient::new(server.url())), config)
    }

    #[tokio::test]
    async fn test_allowance_covering_deposit_is_sufficient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(allowance_body("1000"))
            .create_async()
            .await;

        let machine = machine_against(&server, fast_config()).await;
        let state = machine.check(&BigUint::from(999u32)).await.unwrap();
        assert_eq!(state, AllowanceState::Sufficient);
    }

    #[tokio::test]
    async fn test_allowance_below_deposit_needs_approval() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(allowance_body("999"))
            .create_async()
            .await;

        let machine = machine_against(&server, fast_config()).await;
        let state = machine.check(&BigUint::from(1000u32)).await.unwrap();
        assert_eq!(state, AllowanceState::InsufficientNeedsApproval);
    }

    #[tokio::test]
    async fn test_sufficient_is_reentrant_for_larger_deposit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(allowance_body("1000"))
            .create_async()
            .await;

        let machine = machine_against(&server, fast_config()).await;
        assert_eq!(
            machine.check(&BigUint::from(500u32)).await.unwrap(),
            AllowanceState::Sufficient
        );
        // The user bumped the amount: the same key re-checks.
        assert_eq!(
            machine.check(&BigUint::from(2000u32)).await.unwrap(),
            AllowanceState::InsufficientNeedsApproval
        );
    }

    #[tokio::test]
    async fn test_poll_until_confirmed() {
        let mut server = mockito::Server::new_async().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body_from_request(move |_| {
                let n = hits_clone.fetch_add(1, Ordering::SeqCst);
                // Initial check plus first poll see no allowance yet.
                if n < 2 {
                    allowance_body("0").into_bytes()
                } else {
                    allowance_body("500000000").into_bytes()
                }
            })
            .create_async()
            .await;

        let machine = machine_against(&server, fast_config()).await;
        let deposit = BigUint::from(500_000_000u64);

        let state = machine.check(&deposit).await.unwrap();
        assert_eq!(state, AllowanceState::InsufficientNeedsApproval);

        let mut rx = machine.observe();
        machine.approval_submitted("0xtxid", deposit);

        let confirmed = timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if *rx.borrow() == AllowanceState::Sufficient {
                    break;
                }
            }
        })
        .await;
        assert!(confirmed.is_ok(), "poll never confirmed the allowance");
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_fails_machine() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(allowance_body("0"))
            .create_async()
            .await;

        let config = AllowanceConfig {
            poll_interval: Duration::from_millis(5),
            max_poll_attempts: 3,
            query_retries: 0,
        };
        let machine = machine_against(&server, config).await;
        let mut rx = machine.observe();
        machine.approval_submitted("0xtxid", BigUint::from(1u32));

        let failed = timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if *rx.borrow() == AllowanceState::Failed {
                    break;
                }
            }
        })
        .await;
        assert!(failed.is_ok(), "machine never hit the poll budget");
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/approvals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(allowance_body("0"))
            .create_async()
            .await;

        let config = AllowanceConfig {
            poll_interval: Duration::from_millis(10),
            max_poll_attempts: 1000,
            query_retries: 0,
        };
        let machine = machine_against(&server, config).await;
        machine.approval_submitted("0xtxid", BigUint::from(1u32));
        sleep(Duration::from_millis(25)).await;
        machine.cancel();
        sleep(Duration::from_millis(50)).await;

        // Cancellation is not a failure; the loop just stops.
        assert_ne!(machine.state(), AllowanceState::Failed);
        assert_ne!(machine.state(), AllowanceState::Sufficient);
    }

    #[tokio::test]
    async fn test_tracker_reuses_machine_per_key() {
        let server = mockito::Server::new_async().await;
        let tracker = AllowanceTracker::new(
            Arc::new(IndexerClient::new(server.url())),
            fast_config(),
        );
        let a = tracker.machine_for(key());
        let b = tracker.machine_for(key());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
