//! State synchronization engine.
//!
//! [`Dashboard`] is the single owner of everything the views display. It
//! sequences connect → refresh → mutate → refresh, and while a session is
//! connected it runs two background tasks: a periodic full refresh and a
//! one-second countdown tick. Both are tied to the session's
//! [`CancellationToken`] and stop when the session is replaced or dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

use crate::contract::VotingContract;
use crate::errors::{DashboardError, Result};
use crate::types::{
    saturating_u64, Action, Address, Candidate, ContractDiagnostics, DashboardSnapshot,
    Notification, TransactionState, TxStatus, VoterRecord, Winner, U256,
};
use crate::wallet::WalletProvider;

const DEFAULT_NETWORK: &str = "Localhost";

/// Source of "now" as a Unix timestamp in seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncIntervals {
    pub refresh: Duration,
    pub countdown_tick: Duration,
}

impl Default for SyncIntervals {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(10),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// What one countdown tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not connected, voting inactive, or the counter is already zero.
    Idle,
    Decremented(u64),
    /// The counter hit zero and a full refresh was run.
    Expired,
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Fields whose read failed and kept their previous value.
    pub failed: Vec<&'static str>,
    /// False when a newer refresh or a new session superseded this one.
    pub applied: bool,
}

struct Session {
    id: u64,
    account: Address,
    contract: Arc<dyn VotingContract>,
    cancel: CancellationToken,
}

struct DashboardState {
    session: Option<Session>,
    network_name: String,
    is_admin: bool,
    voting_active: bool,
    time_remaining: u64,
    start_time: U256,
    end_time: U256,
    total_votes: U256,
    total_voters: U256,
    candidates: Vec<Candidate>,
    voter: Option<VoterRecord>,
    winner: Option<Winner>,
    transaction: TransactionState,
    is_loading: bool,
    error: Option<String>,
    applied_refresh: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            session: None,
            network_name: DEFAULT_NETWORK.to_string(),
            is_admin: false,
            voting_active: false,
            time_remaining: 0,
            start_time: U256::ZERO,
            end_time: U256::ZERO,
            total_votes: U256::ZERO,
            total_voters: U256::ZERO,
            candidates: Vec::new(),
            voter: None,
            winner: None,
            transaction: TransactionState::default(),
            is_loading: false,
            error: None,
            applied_refresh: 0,
        }
    }
}

impl DashboardState {
    /// Drop the session and everything read through it. Transaction state,
    /// the error message and the refresh watermark survive.
    fn clear_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
        *self = DashboardState {
            transaction: std::mem::take(&mut self.transaction),
            error: self.error.take(),
            is_loading: self.is_loading,
            applied_refresh: self.applied_refresh,
            ..DashboardState::default()
        };
    }
}

/// Reads of one refresh cycle; `None` marks a failed read.
#[derive(Default)]
struct RefreshReads {
    is_admin: Option<bool>,
    voting_active: Option<bool>,
    candidates: Option<Vec<Candidate>>,
    voter: Option<VoterRecord>,
    total_votes: Option<U256>,
    total_voters: Option<U256>,
    start_time: Option<U256>,
    end_time: Option<U256>,
    time_remaining: Option<U256>,
    failed: Vec<&'static str>,
}

fn keep<T>(field: &'static str, read: Result<T>, failed: &mut Vec<&'static str>) -> Option<T> {
    match read {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Refresh: reading {field} failed, keeping previous value: {e}");
            failed.push(field);
            None
        }
    }
}

/// Like [`keep`] for diagnostics: a failed read becomes an error line.
fn observed<T>(field: &str, read: Result<T>, errors: &mut Vec<String>) -> Option<T> {
    read.map_err(|e| errors.push(format!("{field}: {e}"))).ok()
}

/// Seconds by which the contract's `getTimeRemaining` disagrees with
/// `end_time - chain_time`. Positive means the contract reports more time.
pub fn timing_drift(end_time: U256, chain_time: U256, time_remaining: U256) -> i64 {
    let expected = end_time.saturating_sub(chain_time);
    let clamp = |v: U256| saturating_u64(v).min(i64::MAX as u64) as i64;
    if time_remaining >= expected {
        clamp(time_remaining - expected)
    } else {
        -clamp(expected - time_remaining)
    }
}

struct Inner {
    wallet: Option<Arc<dyn WalletProvider>>,
    contract_address: Address,
    clock: Arc<dyn Clock>,
    intervals: SyncIntervals,
    state: RwLock<DashboardState>,
    refresh_seq: AtomicU64,
    session_seq: AtomicU64,
    notifications: broadcast::Sender<Notification>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.state.get_mut().session.take() {
            session.cancel.cancel();
        }
    }
}

/// Cloneable handle to the shared dashboard state.
///
/// Background tasks only hold a weak reference: dropping the last handle
/// stops the timers even without [`Dashboard::disconnect`].
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

impl Dashboard {
    pub fn new(
        wallet: Option<Arc<dyn WalletProvider>>,
        contract_address: Address,
        clock: Arc<dyn Clock>,
        intervals: SyncIntervals,
    ) -> Self {
        let (notifications, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                wallet,
                contract_address,
                clock,
                intervals,
                state: RwLock::new(DashboardState::default()),
                refresh_seq: AtomicU64::new(0),
                session_seq: AtomicU64::new(0),
                notifications,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let s = self.inner.state.read().await;
        DashboardSnapshot {
            is_connected: s.session.is_some(),
            account: s.session.as_ref().map(|sess| sess.account),
            network_name: s.network_name.clone(),
            contract_address: self.inner.contract_address,
            is_admin: s.is_admin,
            voting_active: s.voting_active,
            time_remaining: s.time_remaining,
            start_time: s.start_time,
            end_time: s.end_time,
            total_votes: s.total_votes,
            total_voters: s.total_voters,
            candidates: s.candidates.clone(),
            voter: s.voter,
            winner: s.winner.clone(),
            transaction: s.transaction.clone(),
            is_loading: s.is_loading,
            error: s.error.clone(),
        }
    }

    // ─────────────────────────────────────────────────────
    // Connect / disconnect
    // ─────────────────────────────────────────────────────

    /// Request wallet access, bind the contract and check it answers, then refresh.
    /// On failure the dashboard is left disconnected.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut s = self.inner.state.write().await;
            s.is_loading = true;
            s.error = None;
        }

        let established = self.establish().await;

        let result = match established {
            Ok((account, contract, network_name)) => {
                let cancel = CancellationToken::new();
                let id = self.inner.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut s = self.inner.state.write().await;
                    s.clear_session();
                    s.network_name = network_name.clone();
                    s.session = Some(Session {
                        id,
                        account,
                        contract,
                        cancel: cancel.clone(),
                    });
                }
                info!("Connected {account} on {network_name}");
                self.spawn_background(cancel);

                if let Err(e) = self.refresh().await {
                    warn!("Initial refresh after connect failed: {e}");
                }
                self.notify(Notification::info(
                    "Wallet Connected",
                    format!("Connected to {network_name} network"),
                ));
                Ok(())
            }
            Err(e) => {
                error!("Error connecting wallet: {e}");
                let message = e.to_string();
                {
                    let mut s = self.inner.state.write().await;
                    s.clear_session();
                    s.error = Some(message.clone());
                }
                self.notify(Notification::destructive("Connection Failed", message));
                Err(e)
            }
        };

        self.inner.state.write().await.is_loading = false;
        result
    }

    async fn establish(&self) -> Result<(Address, Arc<dyn VotingContract>, String)> {
        let wallet = self
            .inner
            .wallet
            .clone()
            .ok_or(DashboardError::WalletUnavailable)?;

        let account = wallet
            .request_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(DashboardError::WalletUnavailable)?;

        let contract = wallet.bind_contract(account, self.inner.contract_address);
        contract.voting_status().await.map_err(|e| {
            DashboardError::ContractUnreachable(format!(
                "make sure the node is running and the contract is deployed at {} ({e})",
                self.inner.contract_address
            ))
        })?;

        let network_name = wallet.network_name().await?;
        Ok((account, contract, network_name))
    }

    /// Stop the background tasks and forget the session.
    pub async fn disconnect(&self) {
        let mut s = self.inner.state.write().await;
        if s.session.is_some() {
            info!("Disconnecting");
        }
        s.clear_session();
    }

    fn spawn_background(&self, cancel: CancellationToken) {
        let refresh_every = self.inner.intervals.refresh;
        let weak = Arc::downgrade(&self.inner);
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + refresh_every, refresh_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(dashboard) = Self::upgrade(&weak) else { break };
                        if let Err(e) = dashboard.refresh().await {
                            warn!("Periodic refresh failed: {e}");
                        }
                    }
                }
            }
        });

        let tick_every = self.inner.intervals.countdown_tick;
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick_every, tick_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(dashboard) = Self::upgrade(&weak) else { break };
                        dashboard.tick().await;
                    }
                }
            }
        });
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Dashboard> {
        weak.upgrade().map(|inner| Dashboard { inner })
    }

    // ─────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────

    /// Re-read every contract field. A failing read keeps that field's
    /// previous value and never stops the others.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let (session_id, account, contract) = {
            let s = self.inner.state.read().await;
            let session = s.session.as_ref().ok_or(DashboardError::NotConnected)?;
            (session.id, session.account, session.contract.clone())
        };
        let seq = self.inner.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let reads = Self::read_all(contract.as_ref(), &account).await;
        if tracing::enabled!(Level::DEBUG) {
            self.log_timing(contract.as_ref()).await;
        }

        // Winner guard runs on the values this refresh will leave in place.
        let (candidate_count, total_votes) = {
            let s = self.inner.state.read().await;
            (
                reads
                    .candidates
                    .as_ref()
                    .map_or(s.candidates.len(), Vec::len),
                reads.total_votes.unwrap_or(s.total_votes),
            )
        };
        let winner = if candidate_count > 0 && !total_votes.is_zero() {
            match contract.winner().await {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("Error getting winner, treating as no current leader: {e}");
                    None
                }
            }
        } else {
            None
        };

        let failed = reads.failed.clone();
        let applied = self.apply(seq, session_id, reads, winner).await;
        Ok(RefreshReport { failed, applied })
    }

    async fn read_all(contract: &dyn VotingContract, account: &Address) -> RefreshReads {
        let (
            is_admin,
            voting_active,
            candidates,
            voter,
            total_votes,
            total_voters,
            start_time,
            end_time,
            time_remaining,
        ) = tokio::join!(
            contract.is_admin(),
            contract.voting_status(),
            contract.candidates(),
            contract.voter(account),
            contract.total_votes(),
            contract.total_voters(),
            contract.start_time(),
            contract.end_time(),
            contract.time_remaining(),
        );

        let mut failed = Vec::new();
        RefreshReads {
            is_admin: keep("is_admin", is_admin, &mut failed),
            voting_active: keep("voting_status", voting_active, &mut failed),
            candidates: keep("candidates", candidates, &mut failed),
            voter: keep("voter", voter, &mut failed),
            total_votes: keep("total_votes", total_votes, &mut failed),
            total_voters: keep("total_voters", total_voters, &mut failed),
            start_time: keep("start_time", start_time, &mut failed),
            end_time: keep("end_time", end_time, &mut failed),
            time_remaining: keep("time_remaining", time_remaining, &mut failed),
            failed,
        }
    }

    /// Overwrite state with a refresh's reads unless a newer refresh has
    /// already been applied or the session changed underneath it.
    async fn apply(
        &self,
        seq: u64,
        session_id: u64,
        reads: RefreshReads,
        winner: Option<Winner>,
    ) -> bool {
        let mut s = self.inner.state.write().await;
        if s.session.as_ref().map(|sess| sess.id) != Some(session_id) {
            return false;
        }
        if seq <= s.applied_refresh {
            return false;
        }
        s.applied_refresh = seq;

        if let Some(v) = reads.is_admin {
            s.is_admin = v;
        }
        if let Some(v) = reads.voting_active {
            s.voting_active = v;
        }
        if let Some(v) = reads.candidates {
            s.candidates = v;
        }
        if let Some(v) = reads.voter {
            s.voter = Some(v);
        }
        if let Some(v) = reads.total_votes {
            s.total_votes = v;
        }
        if let Some(v) = reads.total_voters {
            s.total_voters = v;
        }
        if let Some(v) = reads.start_time {
            s.start_time = v;
        }
        if let Some(v) = reads.end_time {
            s.end_time = v;
        }
        if let Some(v) = reads.time_remaining {
            s.time_remaining = saturating_u64(v);
        }
        s.winner = winner;
        true
    }

    // ─────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────

    /// Read the contract's raw voting flags and clock, independent of the
    /// displayed state. Nothing read here is applied to the dashboard.
    pub async fn diagnostics(&self) -> Result<ContractDiagnostics> {
        let contract = {
            let s = self.inner.state.read().await;
            let session = s.session.as_ref().ok_or(DashboardError::NotConnected)?;
            session.contract.clone()
        };
        Ok(Self::collect_diagnostics(contract.as_ref(), self.inner.contract_address).await)
    }

    async fn collect_diagnostics(
        contract: &dyn VotingContract,
        contract_address: Address,
    ) -> ContractDiagnostics {
        let (
            status,
            started,
            ended,
            start_time,
            end_time,
            chain_time,
            time_remaining,
            candidates,
        ) = tokio::join!(
            contract.voting_status(),
            contract.voting_started(),
            contract.voting_ended(),
            contract.start_time(),
            contract.end_time(),
            contract.current_time(),
            contract.time_remaining(),
            contract.candidates(),
        );

        let mut errors = Vec::new();
        let end_time = observed("end_time", end_time, &mut errors);
        let chain_time = observed("current_time", chain_time, &mut errors);
        let time_remaining = observed("time_remaining", time_remaining, &mut errors);
        let drift_secs = match (end_time, chain_time, time_remaining) {
            (Some(end), Some(now), Some(left)) => Some(timing_drift(end, now, left)),
            _ => None,
        };

        ContractDiagnostics {
            contract_address,
            voting_status: observed("voting_status", status, &mut errors),
            voting_started: observed("voting_started", started, &mut errors),
            voting_ended: observed("voting_ended", ended, &mut errors),
            start_time: observed("start_time", start_time, &mut errors),
            end_time,
            chain_time,
            time_remaining,
            drift_secs,
            candidate_count: observed("candidates", candidates, &mut errors).map(|c| c.len()),
            errors,
        }
    }

    async fn log_timing(&self, contract: &dyn VotingContract) {
        let d = Self::collect_diagnostics(contract, self.inner.contract_address).await;
        debug!(
            "Voting timing: started={:?} ended={:?} start={:?} end={:?} chain_time={:?} \
             remaining={:?} drift={:?}s",
            d.voting_started,
            d.voting_ended,
            d.start_time,
            d.end_time,
            d.chain_time,
            d.time_remaining,
            d.drift_secs
        );
        if let Some(chain_time) = d.chain_time {
            let local = U256::from(self.inner.clock.now_unix().max(0) as u64);
            let skew = timing_drift(chain_time, U256::ZERO, local);
            debug!("Local clock is {skew}s ahead of chain time {chain_time}");
        }
        for e in &d.errors {
            debug!("Voting timing read failed: {e}");
        }
    }

    // ─────────────────────────────────────────────────────
    // Countdown
    // ─────────────────────────────────────────────────────

    /// Advance the local countdown by one unit. Reaching zero triggers a
    /// full refresh; the local counter is never trusted past zero.
    pub async fn tick(&self) -> TickOutcome {
        let outcome = {
            let mut s = self.inner.state.write().await;
            if s.session.is_none() || !s.voting_active || s.time_remaining == 0 {
                TickOutcome::Idle
            } else if s.time_remaining <= 1 {
                s.time_remaining = 0;
                TickOutcome::Expired
            } else {
                s.time_remaining -= 1;
                TickOutcome::Decremented(s.time_remaining)
            }
        };

        if outcome == TickOutcome::Expired {
            info!("Countdown reached zero, resynchronising");
            if let Err(e) = self.refresh().await {
                warn!("Refresh after countdown expiry failed: {e}");
            }
        }
        outcome
    }

    // ─────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────

    pub async fn vote(&self, candidate_id: U256) -> Result<String> {
        self.mutate(Action::Vote { candidate_id }).await
    }

    pub async fn add_candidate(&self, name: &str, proposal: &str) -> Result<String> {
        self.mutate(Action::AddCandidate {
            name: name.to_string(),
            proposal: proposal.to_string(),
        })
        .await
    }

    /// Admins are registered with weight 2, everyone else with weight 1.
    pub async fn register_voter(&self, address: Address, is_admin: bool) -> Result<String> {
        self.mutate(Action::RegisterVoter { address, is_admin }).await
    }

    /// The requested start time is ignored: voting always starts now.
    pub async fn start_voting(&self, requested_start: Option<i64>, end_time: i64) -> Result<String> {
        self.mutate(Action::StartVoting {
            start_time: requested_start.unwrap_or_default(),
            end_time,
        })
        .await
    }

    pub async fn end_voting(&self) -> Result<String> {
        self.mutate(Action::EndVoting).await
    }

    /// Send a write, wait for it to be mined, then refresh. Returns the
    /// transaction hash. On failure the transaction state records the error
    /// and no refresh is run.
    pub async fn mutate(&self, action: Action) -> Result<String> {
        let contract = {
            let s = self.inner.state.read().await;
            s.session.as_ref().map(|sess| sess.contract.clone())
        };
        let Some(contract) = contract else {
            self.notify(Notification::destructive("Error", "Contract not connected"));
            return Err(DashboardError::NotConnected);
        };

        let action = self.normalize(action)?;
        info!("Submitting {}", action.label());

        {
            let mut s = self.inner.state.write().await;
            s.is_loading = true;
            s.error = None;
            s.transaction = TransactionState {
                status: TxStatus::Pending,
                hash: None,
                error: None,
            };
        }

        let result = match self.submit(contract.as_ref(), &action).await {
            Ok(hash) => {
                self.inner.state.write().await.transaction.status = TxStatus::Success;
                if let Err(e) = self.refresh().await {
                    warn!("Refresh after {} failed: {e}", action.label());
                }
                let (title, description) = success_message(&action);
                self.notify(Notification::info(title, description));
                Ok(hash)
            }
            Err(e) => {
                error!("Error during {}: {e}", action.label());
                let message = e.to_string();
                {
                    let mut s = self.inner.state.write().await;
                    s.transaction.status = TxStatus::Error;
                    s.transaction.error = Some(message.clone());
                    s.error = Some(message.clone());
                }
                self.notify(Notification::destructive(failure_title(&action), message));
                Err(e)
            }
        };

        self.inner.state.write().await.is_loading = false;
        result
    }

    /// Client-side checks that happen before any transaction state change.
    fn normalize(&self, action: Action) -> Result<Action> {
        match action {
            Action::StartVoting { end_time, .. } => {
                let now = self.inner.clock.now_unix();
                if end_time <= now {
                    self.notify(Notification::destructive(
                        "Invalid End Time",
                        "End time must be in the future",
                    ));
                    return Err(DashboardError::InvalidInput(
                        "End time must be in the future".to_string(),
                    ));
                }
                Ok(Action::StartVoting {
                    start_time: now,
                    end_time,
                })
            }
            Action::AddCandidate { ref name, ref proposal }
                if name.trim().is_empty() || proposal.trim().is_empty() =>
            {
                Err(DashboardError::InvalidInput(
                    "candidate name and proposal are required".to_string(),
                ))
            }
            other => Ok(other),
        }
    }

    async fn submit(&self, contract: &dyn VotingContract, action: &Action) -> Result<String> {
        let pending = match action {
            Action::Vote { candidate_id } => contract.vote(*candidate_id).await?,
            Action::AddCandidate { name, proposal } => {
                contract.add_candidate(name, proposal).await?
            }
            Action::RegisterVoter { address, is_admin } => {
                contract
                    .register_voter(address, voter_weight(*is_admin))
                    .await?
            }
            Action::StartVoting {
                start_time,
                end_time,
            } => contract.start_voting(*start_time, *end_time).await?,
            Action::EndVoting => contract.end_voting().await?,
        };

        let hash = pending.hash().to_string();
        self.inner.state.write().await.transaction.hash = Some(hash.clone());
        pending.confirmed().await?;
        Ok(hash)
    }

    /// Close the transaction status view.
    pub async fn dismiss_transaction(&self) {
        self.inner.state.write().await.transaction = TransactionState::default();
    }
}

pub fn voter_weight(is_admin: bool) -> u8 {
    if is_admin {
        2
    } else {
        1
    }
}

fn success_message(action: &Action) -> (&'static str, String) {
    match action {
        Action::Vote { .. } => (
            "Vote Cast Successfully",
            "Your vote has been recorded on the blockchain".to_string(),
        ),
        Action::AddCandidate { name, .. } => (
            "Candidate Added",
            format!("{name} has been added as a candidate"),
        ),
        Action::RegisterVoter { is_admin, .. } => (
            "Voter Registered",
            format!("Voter registered with weight {}", voter_weight(*is_admin)),
        ),
        Action::StartVoting { .. } => ("Voting Started", "The voting period has begun".to_string()),
        Action::EndVoting => ("Voting Ended", "The voting period has ended".to_string()),
    }
}

fn failure_title(action: &Action) -> &'static str {
    match action {
        Action::Vote { .. } => "Vote Failed",
        Action::AddCandidate { .. } => "Failed to Add Candidate",
        Action::RegisterVoter { .. } => "Failed to Register Voter",
        Action::StartVoting { .. } => "Failed to Start Voting",
        Action::EndVoting => "Failed to End Voting",
    }
}
