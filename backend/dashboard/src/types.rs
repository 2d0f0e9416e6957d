//! Domain types observed from the voting contract and held by the dashboard.

pub use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::{DashboardError, Result};

/// Parse a user- or node-supplied `0x` address.
pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| DashboardError::InvalidInput(format!("bad address {raw:?}: {e}")))
}

/// Parse a decimal or `0x`-prefixed unsigned integer.
pub fn parse_uint(raw: &str) -> Result<U256> {
    raw.trim()
        .parse()
        .map_err(|e| DashboardError::InvalidInput(format!("bad number {raw:?}: {e}")))
}

/// Clamp a contract integer into `u64`.
pub fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_limbs()[0]
    }
}

/// A candidate as listed by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: U256,
    pub name: String,
    pub proposal: String,
    pub vote_count: U256,
}

/// Registration and ballot status of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRecord {
    pub is_registered: bool,
    pub weight: U256,
    pub has_voted: bool,
    pub voted_for: U256,
}

/// The contract-computed leader. `percentage` is fixed-point with two
/// implied decimals (`5000` = 50.00%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub id: U256,
    pub name: String,
    pub vote_count: U256,
    pub percentage: U256,
}

/// Status of the most recent mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionState {
    pub status: TxStatus,
    pub hash: Option<String>,
    pub error: Option<String>,
}

/// A user intent that results in a contract write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Vote { candidate_id: U256 },
    AddCandidate { name: String, proposal: String },
    RegisterVoter { address: Address, is_admin: bool },
    StartVoting { start_time: i64, end_time: i64 },
    EndVoting,
}

impl Action {
    /// Label used in logs and in the failure notification title.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vote { .. } => "cast vote",
            Self::AddCandidate { .. } => "add candidate",
            Self::RegisterVoter { .. } => "register voter",
            Self::StartVoting { .. } => "start voting",
            Self::EndVoting => "end voting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Destructive,
}

/// A dismissible user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }
}

/// Everything the views render, copied out of the engine in one read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub is_connected: bool,
    pub account: Option<Address>,
    pub network_name: String,
    pub contract_address: Address,
    pub is_admin: bool,
    pub voting_active: bool,
    pub time_remaining: u64,
    pub start_time: U256,
    pub end_time: U256,
    pub total_votes: U256,
    pub total_voters: U256,
    pub candidates: Vec<Candidate>,
    pub voter: Option<VoterRecord>,
    pub winner: Option<Winner>,
    pub transaction: TransactionState,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Raw timing and reachability view of the contract, read on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDiagnostics {
    pub contract_address: Address,
    pub voting_status: Option<bool>,
    pub voting_started: Option<bool>,
    pub voting_ended: Option<bool>,
    pub start_time: Option<U256>,
    pub end_time: Option<U256>,
    /// Block timestamp reported by the contract.
    pub chain_time: Option<U256>,
    pub time_remaining: Option<U256>,
    /// `time_remaining - (end_time - chain_time)`, in seconds.
    pub drift_secs: Option<i64>,
    pub candidate_count: Option<usize>,
    pub errors: Vec<String>,
}


mod tests {
    use super::*;

    #[test]
    fn address_parse_accepts_mixed_case() {
        let addr = parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
        assert_eq!(addr, parse_address("0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap());
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!(matches!(
            parse_address("0x1234"),
            Err(DashboardError::InvalidInput(_))
        ));
        assert!(parse_address("not-hex").is_err());
    }

    #[test]
    fn address_serde_round_trips() {
        let addr = Address::repeat_byte(0xff);
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn uint_parses_decimal_and_hex() {
        assert_eq!(parse_uint("42").unwrap(), U256::from(42u64));
        assert_eq!(parse_uint("0x2a").unwrap(), U256::from(42u64));
        assert!(parse_uint("-1").is_err());
    }

    #[test]
    fn u64_conversion_saturates() {
        assert_eq!(saturating_u64(U256::from(7u64)), 7);
        assert_eq!(saturating_u64(U256::MAX), u64::MAX);
        assert_eq!(saturating_u64(U256::from(u64::MAX) + U256::from(1u64)), u64::MAX);
    }

    #[test]
    fn tx_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TxStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(TxStatus::default(), TxStatus::Idle);
        assert_eq!(TxStatus::Error.as_str(), "error");
    }
}
