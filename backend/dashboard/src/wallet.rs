//! Wallet provider boundary: account access and a contract bound to it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{ConfirmPolicy, RpcVotingContract, VotingContract};
use crate::errors::Result;
use crate::rpc::RpcClient;
use crate::types::Address;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for account access. The first account is the active one.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Human-readable label of the connected network.
    async fn network_name(&self) -> Result<String>;

    /// Build a contract facade that signs with `account`.
    fn bind_contract(&self, account: Address, contract: Address) -> Arc<dyn VotingContract>;
}

/// Wallet backed by a JSON-RPC node that manages its own keys.
pub struct NodeWallet {
    rpc: Arc<RpcClient>,
    pinned_account: Option<Address>,
    confirm: ConfirmPolicy,
}

impl NodeWallet {
    pub fn new(rpc: Arc<RpcClient>, pinned_account: Option<Address>, confirm: ConfirmPolicy) -> Self {
        Self {
            rpc,
            pinned_account,
            confirm,
        }
    }
}

#[async_trait]
impl WalletProvider for NodeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let accounts = self.rpc.request_accounts().await?;
        match self.pinned_account {
            Some(pinned) => {
                let mut ordered = vec![pinned];
                ordered.extend(accounts.into_iter().filter(|a| *a != pinned));
                Ok(ordered)
            }
            None => Ok(accounts),
        }
    }

    async fn network_name(&self) -> Result<String> {
        Ok(network_label(self.rpc.chain_id().await?))
    }

    fn bind_contract(&self, account: Address, contract: Address) -> Arc<dyn VotingContract> {
        Arc::new(RpcVotingContract::new(
            self.rpc.clone(),
            contract,
            account,
            self.confirm,
        ))
    }
}

/// Map a chain id to the label shown in the connection status.
pub fn network_label(chain_id: u64) -> String {
    match chain_id {
        1 => "mainnet".to_string(),
        11_155_111 => "sepolia".to_string(),
        1337 | 31_337 => "Localhost".to_string(),
        other => format!("chain-{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_dev_chains_are_localhost() {
        assert_eq!(network_label(31_337), "Localhost");
        assert_eq!(network_label(1337), "Localhost");
        assert_eq!(network_label(1), "mainnet");
        assert_eq!(network_label(11_155_111), "sepolia");
        assert_eq!(network_label(42), "chain-42");
    }
}
