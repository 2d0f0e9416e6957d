//! In-memory wallet and contract used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::contract::{PendingTx, VotingContract};
use crate::errors::{DashboardError, Result};
use crate::sync::{Clock, Dashboard, SyncIntervals};
use crate::types::{Address, Candidate, VoterRecord, Winner, U256};
use crate::wallet::WalletProvider;

#[derive(Default)]
pub(crate) struct Chain {
    pub(crate) admin: Option<Address>,
    pub(crate) voting_active: bool,
    pub(crate) voting_started: bool,
    pub(crate) voting_ended: bool,
    pub(crate) chain_time: U256,
    pub(crate) time_remaining: U256,
    pub(crate) start_time: U256,
    pub(crate) end_time: U256,
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) voters: HashMap<Address, VoterRecord>,
    pub(crate) total_votes_override: Option<U256>,
    pub(crate) failing: HashSet<&'static str>,
    pub(crate) revert_writes: bool,
    pub(crate) writes: Vec<String>,
    pub(crate) status_reads: usize,
    pub(crate) winner_reads: usize,
}

impl Chain {
    pub(crate) fn total_votes(&self) -> U256 {
        self.total_votes_override.unwrap_or_else(|| {
            self.candidates
                .iter()
                .fold(U256::ZERO, |acc, c| acc + c.vote_count)
        })
    }
}

pub(crate) type Effect = Box<dyn FnOnce(&mut Chain) + Send>;

pub(crate) struct FakePending {
    hash: String,
    chain: Arc<Mutex<Chain>>,
    effect: Mutex<Option<Effect>>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl PendingTx for FakePending {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn confirmed(&self) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut chain = self.chain.lock().unwrap();
        if chain.revert_writes {
            return Err(DashboardError::TransactionFailed(
                "execution reverted".to_string(),
            ));
        }
        if let Some(effect) = self.effect.lock().unwrap().take() {
            effect(&mut *chain);
        }
        Ok(())
    }
}

pub(crate) struct FakeContract {
    chain: Arc<Mutex<Chain>>,
    account: Address,
    gate: Option<Arc<Notify>>,
}

impl FakeContract {
    fn read<T>(&self, field: &'static str, f: impl FnOnce(&Chain) -> T) -> Result<T> {
        let mut chain = self.chain.lock().unwrap();
        match field {
            "status" => chain.status_reads += 1,
            "winner" => chain.winner_reads += 1,
            _ => {}
        }
        if chain.failing.contains(field) {
            return Err(DashboardError::RemoteCall(format!("{field} reverted")));
        }
        Ok(f(&chain))
    }

    fn write(&self, call: String, effect: Effect) -> Result<Box<dyn PendingTx>> {
        let mut chain = self.chain.lock().unwrap();
        chain.writes.push(call);
        let hash = format!("0x{:064x}", chain.writes.len());
        Ok(Box::new(FakePending {
            hash,
            chain: self.chain.clone(),
            effect: Mutex::new(Some(effect)),
            gate: self.gate.clone(),
        }))
    }
}

#[async_trait]
impl VotingContract for FakeContract {
    async fn voting_status(&self) -> Result<bool> {
        self.read("status", |c| c.voting_active)
    }
    async fn voting_started(&self) -> Result<bool> {
        self.read("voting_started", |c| c.voting_started)
    }
    async fn voting_ended(&self) -> Result<bool> {
        self.read("voting_ended", |c| c.voting_ended)
    }
    async fn candidates(&self) -> Result<Vec<Candidate>> {
        self.read("candidates", |c| c.candidates.clone())
    }
    async fn voter(&self, address: &Address) -> Result<VoterRecord> {
        self.read("voter", |c| c.voters.get(address).copied().unwrap_or_default())
    }
    async fn total_votes(&self) -> Result<U256> {
        self.read("total_votes", Chain::total_votes)
    }
    async fn total_voters(&self) -> Result<U256> {
        self.read("total_voters", |c| U256::from(c.voters.len()))
    }
    async fn start_time(&self) -> Result<U256> {
        self.read("start_time", |c| c.start_time)
    }
    async fn end_time(&self) -> Result<U256> {
        self.read("end_time", |c| c.end_time)
    }
    async fn time_remaining(&self) -> Result<U256> {
        self.read("time_remaining", |c| c.time_remaining)
    }
    async fn current_time(&self) -> Result<U256> {
        self.read("current_time", |c| c.chain_time)
    }
    async fn is_admin(&self) -> Result<bool> {
        let account = self.account;
        self.read("is_admin", move |c| c.admin == Some(account))
    }
    async fn winner(&self) -> Result<Winner> {
        self.read("winner", |c| {
            let total = c.total_votes();
            let leader = c
                .candidates
                .iter()
                .max_by_key(|cand| cand.vote_count)
                .cloned()
                .unwrap_or(Candidate {
                    id: U256::ZERO,
                    name: String::new(),
                    proposal: String::new(),
                    vote_count: U256::ZERO,
                });
            Winner {
                id: leader.id,
                name: leader.name,
                vote_count: leader.vote_count,
                percentage: if total.is_zero() {
                    U256::ZERO
                } else {
                    leader.vote_count * U256::from(10_000u64) / total
                },
            }
        })
    }

    async fn add_candidate(&self, name: &str, proposal: &str) -> Result<Box<dyn PendingTx>> {
        let (name, proposal) = (name.to_string(), proposal.to_string());
        self.write(
            format!("addCandidate({name},{proposal})"),
            Box::new(move |c| {
                let id = U256::from(c.candidates.len());
                c.candidates.push(Candidate {
                    id,
                    name,
                    proposal,
                    vote_count: U256::ZERO,
                });
            }),
        )
    }
    async fn register_voter(&self, voter: &Address, weight: u8) -> Result<Box<dyn PendingTx>> {
        let voter = *voter;
        self.write(
            format!("registerVoter({voter},{weight})"),
            Box::new(move |c| {
                c.voters.insert(
                    voter,
                    VoterRecord {
                        is_registered: true,
                        weight: U256::from(weight),
                        has_voted: false,
                        voted_for: U256::ZERO,
                    },
                );
            }),
        )
    }
    async fn start_voting(&self, start_time: i64, end_time: i64) -> Result<Box<dyn PendingTx>> {
        self.write(
            format!("startVoting({start_time},{end_time})"),
            Box::new(move |c| {
                c.voting_active = true;
                c.start_time = U256::from(start_time as u64);
                c.end_time = U256::from(end_time as u64);
                c.time_remaining = U256::from((end_time - start_time) as u64);
            }),
        )
    }
    async fn end_voting(&self) -> Result<Box<dyn PendingTx>> {
        self.write(
            "endVoting()".to_string(),
            Box::new(|c| {
                c.voting_active = false;
                c.time_remaining = U256::ZERO;
            }),
        )
    }
    async fn vote(&self, candidate_id: U256) -> Result<Box<dyn PendingTx>> {
        let account = self.account;
        self.write(
            format!("vote({candidate_id})"),
            Box::new(move |c| {
                let weight = c.voters.get(&account).map_or(U256::from(1u64), |v| v.weight);
                if let Some(cand) = c.candidates.iter_mut().find(|x| x.id == candidate_id) {
                    cand.vote_count += weight;
                }
                if let Some(v) = c.voters.get_mut(&account) {
                    v.has_voted = true;
                    v.voted_for = candidate_id;
                }
            }),
        )
    }
}

pub(crate) struct FakeWallet {
    chain: Arc<Mutex<Chain>>,
    accounts: Vec<Address>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }
    async fn network_name(&self) -> Result<String> {
        Ok("Localhost".to_string())
    }
    fn bind_contract(&self, account: Address, _contract: Address) -> Arc<dyn VotingContract> {
        Arc::new(FakeContract {
            chain: self.chain.clone(),
            account,
            gate: self.gate.clone(),
        })
    }
}

pub(crate) struct FixedClock(pub(crate) i64);

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}

pub(crate) fn account() -> Address {
    Address::with_last_byte(0xa1)
}

pub(crate) fn uint(v: u64) -> U256 {
    U256::from(v)
}

pub(crate) fn candidate(id: u64, name: &str, votes: u64) -> Candidate {
    Candidate {
        id: uint(id),
        name: name.to_string(),
        proposal: format!("{name}'s proposal"),
        vote_count: uint(votes),
    }
}

pub(crate) fn seeded_chain() -> Arc<Mutex<Chain>> {
    let mut chain = Chain {
        admin: Some(account()),
        ..Chain::default()
    };
    chain.candidates = vec![
        candidate(0, "Alice", 0),
        candidate(1, "Bob", 0),
        candidate(2, "Carol", 0),
    ];
    chain.voters.insert(
        account(),
        VoterRecord {
            is_registered: true,
            weight: uint(1),
            has_voted: false,
            voted_for: U256::ZERO,
        },
    );
    Arc::new(Mutex::new(chain))
}

pub(crate) fn dashboard_with(chain: Arc<Mutex<Chain>>, gate: Option<Arc<Notify>>) -> Dashboard {
    let wallet = FakeWallet {
        chain,
        accounts: vec![account()],
        gate,
    };
    Dashboard::new(
        Some(Arc::new(wallet)),
        Address::default(),
        Arc::new(FixedClock(1_000)),
        SyncIntervals::default(),
    )
}
