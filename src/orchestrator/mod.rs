//! Quote orchestration: settle-then-fire debounce, validation gate,
//! concurrent provider fan-out, settle delay and round supersession.
//! One reducer task owns the visible offer state; everything else only
//! emits events at it.

pub mod round;

use crate::allowance::{AllowanceConfig, AllowanceKey, AllowanceTracker, IndexerClient};
use crate::core::{
    AllowanceState, Config, ExchangeKey, Offer, OfferState, ProviderError, QuoteRequest, SwapError,
    SwapResult,
};
use crate::providers::{PreloadedProviderData, ProviderAdapter};
use crate::services::{deposit_in_smallest_units, WalletService};
use futures::future::join_all;
use log::{debug, error, info, warn};
use num_bigint::BigUint;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

pub use round::{OffersSnapshot, RoundEvent, RoundSeq};

const OVERDRAFT_MSG: &str =
    "You are trying to send more funds than you have available. Enter a valid amount.";

/// Aggregates quotes across all eligible providers for a stream of
/// inputs. At most one round mutates visible state at a time; calls
/// from superseded rounds finish but their results are discarded.
pub struct QuoteOrchestrator {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    config: Config,
    preload: HashMap<ExchangeKey, PreloadedProviderData>,
    wallet_service: Arc<dyn WalletService>,
    allowance: AllowanceTracker,
    events: mpsc::UnboundedSender<RoundEvent>,
    snapshots: watch::Receiver<OffersSnapshot>,
    round_seq: AtomicU64,
    debounce_gen: AtomicU64,
    closed: AtomicBool,
}

impl QuoteOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        config: Config,
        preload: HashMap<ExchangeKey, PreloadedProviderData>,
        wallet_service: Arc<dyn WalletService>,
    ) -> Arc<Self> {
        let (events, mut events_rx) = mpsc::unbounded_channel::<RoundEvent>();
        let (snapshot_tx, snapshots) = watch::channel(OffersSnapshot::default());

        // Single consumer of all round events.
        tokio::spawn(async move {
            let mut state = round::RoundState::default();
            while let Some(event) = events_rx.recv().await {
                if matches!(event, RoundEvent::Shutdown) {
                    break;
                }
                if state.apply(event) {
                    let _ = snapshot_tx.send(state.snapshot());
                }
            }
            debug!("Offer reducer stopped");
        });

        let indexer = Arc::new(IndexerClient::new(config.allowance_indexer_url.clone()));
        let allowance = AllowanceTracker::new(
            indexer,
            AllowanceConfig {
                poll_interval: Duration::from_millis(config.allowance_poll_interval_ms),
                max_poll_attempts: config.allowance_max_poll_attempts,
                query_retries: config.allowance_query_retries,
            },
        );

        Arc::new(Self {
            providers,
            config,
            preload,
            wallet_service,
            allowance,
            events,
            snapshots,
            round_seq: AtomicU64::new(0),
            debounce_gen: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Live, round-scoped offer stream.
    pub fn observe_offers(&self) -> watch::Receiver<OffersSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> OffersSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Currently selected offer, if any.
    pub fn selected_offer(&self) -> Option<Offer> {
        let snapshot = self.snapshots.borrow();
        snapshot.selected_offer().cloned()
    }

    /// Current round-level warning, if any.
    pub fn warning(&self) -> Option<String> {
        self.snapshots.borrow().warning.clone()
    }

    /// Request a new aggregation round. The round fires only after the
    /// quiet window elapses with no further input; every call within
    /// the window restarts the timer.
    pub fn start_round(self: &Arc<Self>, request: QuoteRequest) {
        if self.closed.load(Ordering::SeqCst) {
            warn!("start_round on a shut-down orchestrator");
            return;
        }

        let generation = self.debounce_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let me = self.clone();

        tokio::spawn(async move {
            sleep(debounce).await;
            if me.debounce_gen.load(Ordering::SeqCst) != generation
                || me.closed.load(Ordering::SeqCst)
            {
                debug!("Debounced input superseded before firing");
                return;
            }
            me.fire_round(request).await;
        });
    }

    async fn fire_round(self: &Arc<Self>, request: QuoteRequest) {
        if request.amount_from.is_zero() || request.amount_from.is_sign_negative() {
            debug!("Amount {} rejected, clearing selection", request.amount_from);
            self.send(RoundEvent::Cleared { warning: None });
            return;
        }
        if let Some(spendable) = request.wallet_from.spendable_balance {
            if request.amount_from > spendable {
                self.send(RoundEvent::Cleared {
                    warning: Some(OVERDRAFT_MSG.to_string()),
                });
                return;
            }
        }

        let eligible: Vec<Arc<dyn ProviderAdapter>> = self
            .providers
            .iter()
            .filter(|adapter| {
                let provider_config = self.config.provider(adapter.key());
                if provider_config.removed {
                    return false;
                }
                let coins = self
                    .preload
                    .get(&adapter.key())
                    .and_then(|p| p.supported_coins.as_deref());
                adapter.supports_pair(&request, coins)
            })
            .cloned()
            .collect();

        let round = self.round_seq.fetch_add(1, Ordering::SeqCst) + 1;

        if eligible.is_empty() {
            error!(
                "No provider supports {}/{} -> {}/{}",
                request.coin_from, request.chain_from, request.coin_to, request.chain_to
            );
            self.send(RoundEvent::Started {
                round,
                request,
                offers: Vec::new(),
            });
            self.send(RoundEvent::Settled { round });
            return;
        }

        info!(
            "Round {}: {} {} -> {} across {} provider(s)",
            round,
            request.amount_from,
            request.coin_from,
            request.coin_to,
            eligible.len()
        );

        let offers: Vec<Offer> = eligible
            .iter()
            .map(|adapter| self.default_offer(adapter.as_ref(), &request))
            .collect();
        self.send(RoundEvent::Started {
            round,
            request: request.clone(),
            offers,
        });

        // While an approval is confirming, a fresh quote must keep the
        // confirming route's spender instead of hopping to the optimal one.
        let confirming_routes: HashMap<ExchangeKey, String> = self
            .latest()
            .offers
            .iter()
            .filter(|o| {
                matches!(
                    o.approval,
                    Some(AllowanceState::ApprovalPending | AllowanceState::ApprovalConfirming)
                )
            })
            .filter_map(|o| o.selected_route.clone().map(|r| (o.key, r)))
            .collect();

        let handles: Vec<_> = eligible
            .into_iter()
            .map(|adapter| {
                let me = self.clone();
                let request = request.clone();
                let keep_route = confirming_routes.get(&adapter.key()).cloned();
                tokio::spawn(async move {
                    me.run_provider(round, adapter, request, keep_route).await;
                })
            })
            .collect();

        // After the last completion, hold the settle delay before the
        // round is declared final.
        let me = self.clone();
        let settle = Duration::from_millis(self.config.settle_ms);
        tokio::spawn(async move {
            join_all(handles).await;
            sleep(settle).await;
            me.send(RoundEvent::Settled { round });
        });
    }

    async fn run_provider(
        self: &Arc<Self>,
        round: RoundSeq,
        adapter: Arc<dyn ProviderAdapter>,
        request: QuoteRequest,
        keep_route: Option<String>,
    ) {
        let key = adapter.key();
        let limits = self
            .preload
            .get(&key)
            .map(|p| p.limits.clone())
            .unwrap_or_default();

        // Isolated task so a panicking adapter cannot take the round down.
        let call = {
            let adapter = adapter.clone();
            let request = request.clone();
            tokio::spawn(async move { adapter.get_quote(&request, &limits).await })
        };
        let result = match call.await {
            Ok(result) => result,
            Err(join_err) => {
                error!("{} adapter task failed: {}", key, join_err);
                Err(ProviderError::NetworkError(
                    "provider task failed".to_string(),
                ))
            }
        };

        if let Err(err) = &result {
            debug!("{} round {} failed: {}", key, round, err);
        }

        let approval_quote = result
            .as_ref()
            .ok()
            .filter(|q| q.requires_approval)
            .cloned();
        let succeeded = result.is_ok();

        self.send(RoundEvent::Offer { round, key, result });

        if succeeded {
            if let Some(route_key) = keep_route {
                self.send(RoundEvent::SelectRoute { key, route_key });
            }
        }

        if let Some(quote) = approval_quote {
            // Only the current round engages the allowance machine.
            if self.round_seq.load(Ordering::SeqCst) != round {
                return;
            }
            match quote.spender_address {
                Some(spender) => self.spawn_allowance_check(round, key, request, spender),
                None => {
                    // Spender unresolvable from the route: dead-end.
                    warn!("{}: approval required but no spender on route", key);
                    self.send(RoundEvent::Approval {
                        round,
                        key,
                        state: AllowanceState::Failed,
                    });
                }
            }
        }
    }

    fn default_offer(&self, adapter: &dyn ProviderAdapter, request: &QuoteRequest) -> Offer {
        let mut offer = Offer::loading(adapter.key(), adapter.display_name());
        offer.requires_approval = adapter.requires_approval(request);
        if let Some(opts) = adapter.slippage_opts() {
            offer.slippage = Some(opts.default);
            offer.slippage_opts = Some(opts);
        }
        offer
    }

    fn spawn_allowance_check(
        self: &Arc<Self>,
        round: RoundSeq,
        key: ExchangeKey,
        request: QuoteRequest,
        spender: String,
    ) {
        let me = self.clone();
        tokio::spawn(async move {
            me.send(RoundEvent::Approval {
                round,
                key,
                state: AllowanceState::Checking,
            });
            let state = match me.check_allowance(&request, &spender).await {
                Ok(state) => state,
                Err(err) => {
                    warn!("{}: allowance check failed: {}", key, err);
                    AllowanceState::Failed
                }
            };
            me.send(RoundEvent::Approval { round, key, state });
        });
    }

    async fn resolve_allowance_key(
        &self,
        request: &QuoteRequest,
        spender: &str,
    ) -> SwapResult<(AllowanceKey, BigUint)> {
        let token = request.wallet_from.token_address.clone().ok_or_else(|| {
            SwapError::AllowanceQueryFailed("token contract address not present".to_string())
        })?;
        let owner = self
            .wallet_service
            .create_or_get_deposit_address(&request.wallet_from)
            .await?;
        let deposit = deposit_in_smallest_units(
            self.wallet_service.as_ref(),
            &request.wallet_from,
            request.amount_from,
        )?;
        Ok((
            AllowanceKey {
                chain: request.chain_from.clone(),
                owner,
                spender: spender.to_string(),
                token,
            },
            deposit,
        ))
    }

    async fn check_allowance(
        &self,
        request: &QuoteRequest,
        spender: &str,
    ) -> SwapResult<AllowanceState> {
        let (allowance_key, deposit) = self.resolve_allowance_key(request, spender).await?;
        let machine = self.allowance.machine_for(allowance_key);
        machine.check(&deposit).await
    }

    /// The external wallet service broadcast an approval transaction for
    /// the given offer; poll the allowance until it covers the deposit
    /// and mirror every transition onto the offer.
    pub async fn approval_submitted(self: &Arc<Self>, key: ExchangeKey, txid: &str) -> SwapResult<()> {
        let snapshot = self.latest();
        let round = snapshot.round;
        let request = snapshot
            .request
            .clone()
            .ok_or(SwapError::OfferNotReady(key))?;
        let offer = snapshot.offer(key).ok_or(SwapError::OfferNotReady(key))?;
        let spender = offer.spender_address.clone().ok_or_else(|| {
            SwapError::AllowanceQueryFailed("no spender address on selected offer".to_string())
        })?;

        let (allowance_key, deposit) = self.resolve_allowance_key(&request, &spender).await?;
        let machine = self.allowance.machine_for(allowance_key);
        let mut states = machine.observe();
        machine.approval_submitted(txid, deposit);

        let me = self.clone();
        tokio::spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                if me
                    .events
                    .send(RoundEvent::Approval { round, key, state })
                    .is_err()
                {
                    break;
                }
                if matches!(state, AllowanceState::Sufficient | AllowanceState::Failed) {
                    break;
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        });

        Ok(())
    }

    /// User-driven slippage override; recomputes the minimum receive
    /// without starting a new round.
    pub fn set_slippage(&self, key: ExchangeKey, value: Decimal) {
        self.send(RoundEvent::SetSlippage { key, value });
    }

    /// Switch a multi-route offer to another quoted route without a new
    /// round.
    pub fn select_route(&self, key: ExchangeKey, route_key: &str) {
        self.send(RoundEvent::SelectRoute {
            key,
            route_key: route_key.to_string(),
        });
    }

    /// Gate before handing the offer to the external execution flow: the
    /// offer must be successful and, when an approval is involved, the
    /// allowance must already be sufficient.
    pub fn begin_execution(&self, key: ExchangeKey) -> SwapResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SwapError::EngineClosed);
        }
        let snapshot = self.latest();
        let offer = snapshot.offer(key).ok_or(SwapError::OfferNotReady(key))?;
        if offer.state != OfferState::Success {
            return Err(SwapError::OfferNotReady(key));
        }
        if offer.requires_approval && offer.approval != Some(AllowanceState::Sufficient) {
            return Err(SwapError::ApprovalRequired(key));
        }
        Ok(())
    }

    /// Unmount signal: supersedes any pending round, stops allowance
    /// polling and shuts the reducer down. In-flight calls finish but
    /// their results go nowhere.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Cleanup on unmount");
        self.debounce_gen.fetch_add(1, Ordering::SeqCst);
        self.allowance.cancel_all();
        self.send(RoundEvent::Shutdown);
    }

    fn send(&self, event: RoundEvent) {
        if self.events.send(event).is_err() {
            debug!("Reducer gone, event dropped");
        }
    }
}
