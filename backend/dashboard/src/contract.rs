//! Contract access facade.
//!
//! [`VotingContract`] is the typed read/write surface of the deployed voting
//! contract. It is a pass-through with type shaping only: no caching, no
//! retries. Writes hand back a [`PendingTx`] whose `confirmed()` resolves once
//! the transaction is mined.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::abi::{self, Token};
use crate::errors::{DashboardError, Result};
use crate::rpc::RpcClient;
use crate::types::{Address, Candidate, VoterRecord, Winner, U256};

/// Handle to a submitted, not yet confirmed, transaction.
#[async_trait]
pub trait PendingTx: Send + Sync {
    fn hash(&self) -> &str;

    /// Wait until the transaction is mined. Fails with
    /// [`DashboardError::TransactionFailed`] if it reverted or never confirmed.
    async fn confirmed(&self) -> Result<()>;
}

#[async_trait]
pub trait VotingContract: Send + Sync {
    async fn voting_status(&self) -> Result<bool>;
    /// Raw `votingStarted` flag, independent of the time window.
    async fn voting_started(&self) -> Result<bool>;
    async fn voting_ended(&self) -> Result<bool>;
    async fn candidates(&self) -> Result<Vec<Candidate>>;
    async fn voter(&self, address: &Address) -> Result<VoterRecord>;
    async fn total_votes(&self) -> Result<U256>;
    async fn total_voters(&self) -> Result<U256>;
    async fn start_time(&self) -> Result<U256>;
    async fn end_time(&self) -> Result<U256>;
    async fn time_remaining(&self) -> Result<U256>;
    /// `block.timestamp` as seen by the contract.
    async fn current_time(&self) -> Result<U256>;
    /// Whether the bound account is the contract admin.
    async fn is_admin(&self) -> Result<bool>;
    async fn winner(&self) -> Result<Winner>;

    async fn add_candidate(&self, name: &str, proposal: &str) -> Result<Box<dyn PendingTx>>;
    async fn register_voter(&self, voter: &Address, weight: u8) -> Result<Box<dyn PendingTx>>;
    async fn start_voting(&self, start_time: i64, end_time: i64) -> Result<Box<dyn PendingTx>>;
    async fn end_voting(&self) -> Result<Box<dyn PendingTx>>;
    async fn vote(&self, candidate_id: U256) -> Result<Box<dyn PendingTx>>;
}

/// Weight must be 1 (voter) or 2 (admin voter).
pub fn validate_weight(weight: u8) -> Result<()> {
    match weight {
        1 | 2 => Ok(()),
        other => Err(DashboardError::InvalidInput(format!(
            "voter weight must be 1 or 2, got {other}"
        ))),
    }
}

fn timestamp_token(ts: i64) -> Result<Token> {
    u64::try_from(ts)
        .map(|ts| Token::Uint(U256::from(ts)))
        .map_err(|_| DashboardError::InvalidInput(format!("timestamp {ts} is negative")))
}

// ─────────────────────────────────────────────────────────
// JSON-RPC implementation
// ─────────────────────────────────────────────────────────

/// Receipt polling parameters for [`RpcPendingTx`].
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }
}

/// [`VotingContract`] over a JSON-RPC node, bound to one account.
pub struct RpcVotingContract {
    rpc: Arc<RpcClient>,
    address: Address,
    account: Address,
    confirm: ConfirmPolicy,
}

impl RpcVotingContract {
    pub fn new(rpc: Arc<RpcClient>, address: Address, account: Address, confirm: ConfirmPolicy) -> Self {
        Self {
            rpc,
            address,
            account,
            confirm,
        }
    }

    async fn read(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let data = abi::encode_call(signature, args);
        self.rpc
            .eth_call(Some(&self.account), &self.address, &data)
            .await
    }

    async fn write(&self, signature: &str, args: &[Token]) -> Result<Box<dyn PendingTx>> {
        let data = abi::encode_call(signature, args);
        let hash = self
            .rpc
            .send_transaction(&self.account, &self.address, &data)
            .await?;
        info!("Submitted {signature} as {hash}");
        Ok(Box::new(RpcPendingTx {
            rpc: self.rpc.clone(),
            hash,
            confirm: self.confirm,
        }))
    }
}

#[async_trait]
impl VotingContract for RpcVotingContract {
    async fn voting_status(&self) -> Result<bool> {
        abi::decode_bool(&self.read("getVotingStatus()", &[]).await?)
    }

    async fn voting_started(&self) -> Result<bool> {
        abi::decode_bool(&self.read("votingStarted()", &[]).await?)
    }

    async fn voting_ended(&self) -> Result<bool> {
        abi::decode_bool(&self.read("votingEnded()", &[]).await?)
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        abi::decode_candidates(&self.read("getCandidates()", &[]).await?)
    }

    async fn voter(&self, address: &Address) -> Result<VoterRecord> {
        abi::decode_voter(
            &self
                .read("getVoter(address)", &[Token::Address(*address)])
                .await?,
        )
    }

    async fn total_votes(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getTotalVotes()", &[]).await?)
    }

    async fn total_voters(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getTotalVoters()", &[]).await?)
    }

    async fn start_time(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getStartTime()", &[]).await?)
    }

    async fn end_time(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getEndTime()", &[]).await?)
    }

    async fn time_remaining(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getTimeRemaining()", &[]).await?)
    }

    async fn current_time(&self) -> Result<U256> {
        abi::decode_uint(&self.read("getCurrentTime()", &[]).await?)
    }

    async fn is_admin(&self) -> Result<bool> {
        abi::decode_bool(&self.read("isAdmin()", &[]).await?)
    }

    async fn winner(&self) -> Result<Winner> {
        abi::decode_winner(&self.read("getWinner()", &[]).await?)
    }

    async fn add_candidate(&self, name: &str, proposal: &str) -> Result<Box<dyn PendingTx>> {
        self.write(
            "addCandidate(string,string)",
            &[Token::String(name.to_string()), Token::String(proposal.to_string())],
        )
        .await
    }

    async fn register_voter(&self, voter: &Address, weight: u8) -> Result<Box<dyn PendingTx>> {
        validate_weight(weight)?;
        self.write(
            "registerVoter(address,uint256)",
            &[Token::Address(*voter), Token::Uint(U256::from(weight))],
        )
        .await
    }

    async fn start_voting(&self, start_time: i64, end_time: i64) -> Result<Box<dyn PendingTx>> {
        self.write(
            "startVoting(uint256,uint256)",
            &[timestamp_token(start_time)?, timestamp_token(end_time)?],
        )
        .await
    }

    async fn end_voting(&self) -> Result<Box<dyn PendingTx>> {
        self.write("endVoting()", &[]).await
    }

    async fn vote(&self, candidate_id: U256) -> Result<Box<dyn PendingTx>> {
        self.write("vote(uint256)", &[Token::Uint(candidate_id)]).await
    }
}

/// Polls `eth_getTransactionReceipt` until the transaction is mined.
pub struct RpcPendingTx {
    rpc: Arc<RpcClient>,
    hash: String,
    confirm: ConfirmPolicy,
}

#[async_trait]
impl PendingTx for RpcPendingTx {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn confirmed(&self) -> Result<()> {
        let wait = async {
            loop {
                match self.rpc.transaction_receipt(&self.hash).await {
                    Ok(Some(receipt)) if receipt.succeeded() => {
                        debug!(
                            "{} mined in block {:?}",
                            receipt.transaction_hash, receipt.block_number
                        );
                        return Ok(());
                    }
                    Ok(Some(_)) => {
                        return Err(DashboardError::TransactionFailed(format!(
                            "transaction {} reverted",
                            self.hash
                        )))
                    }
                    Ok(None) => {}
                    Err(e) => {
                        return Err(DashboardError::TransactionFailed(format!(
                            "could not fetch receipt for {}: {e}",
                            self.hash
                        )))
                    }
                }
                tokio::time::sleep(self.confirm.poll_interval).await;
            }
        };

        tokio::time::timeout(self.confirm.timeout, wait)
            .await
            .map_err(|_| {
                DashboardError::TransactionFailed(format!(
                    "transaction {} not confirmed within {:?}",
                    self.hash, self.confirm.timeout
                ))
            })?
    }
}
