//! Solidity ABI codec for the voting contract's call surface.
//!
//! Only the shapes the contract actually uses are supported: `uint256`,
//! `address` and `string` arguments, and `bool` / `uint256` / `string`
//! scalars plus the candidate, voter and winner tuples in return data.
//! Words are read and written as [`U256`], so every `uint256` survives the
//! round trip intact.

use sha3::{Digest, Keccak256};

use crate::errors::{DashboardError, Result};
use crate::types::{Address, Candidate, VoterRecord, Winner, U256};

const WORD: usize = 32;

// ─────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────

/// A single call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    Address(Address),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Build calldata: selector followed by the head/tail encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_args(args));
    out
}

fn encode_args(args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for arg in args {
        if arg.is_dynamic() {
            head.extend(encode_usize(head_len + tail.len()));
        }
        match arg {
            Token::Uint(v) => head.extend(encode_u256(*v)),
            Token::Address(a) => head.extend(encode_address(*a)),
            Token::String(s) => {
                let bytes = s.as_bytes();
                tail.extend(encode_usize(bytes.len()));
                tail.extend_from_slice(bytes);
                let pad = (WORD - bytes.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
        }
    }

    head.extend(tail);
    head
}

fn encode_u256(value: U256) -> [u8; WORD] {
    value.to_be_bytes()
}

fn encode_usize(value: usize) -> [u8; WORD] {
    encode_u256(U256::from(value))
}

/// Addresses are right-aligned in their word.
fn encode_address(address: Address) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[12..].copy_from_slice(address.as_slice());
    w
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, at: usize) -> Result<&'a [u8]> {
        let end = at
            .checked_add(WORD)
            .ok_or_else(|| DashboardError::Decode("offset overflow".to_string()))?;
        self.data.get(at..end).ok_or_else(|| {
            DashboardError::Decode(format!(
                "return data too short: need {end} bytes, have {}",
                self.data.len()
            ))
        })
    }

    fn uint(&self, at: usize) -> Result<U256> {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(self.word(at)?);
        Ok(U256::from_be_bytes(bytes))
    }

    /// A word used as an offset or length; must fit the address space.
    fn index(&self, at: usize) -> Result<usize> {
        let value = self.uint(at)?;
        if value > U256::from(usize::MAX) {
            return Err(DashboardError::Decode(format!(
                "offset or length at byte {at} too large"
            )));
        }
        Ok(value.as_limbs()[0] as usize)
    }

    fn bool(&self, at: usize) -> Result<bool> {
        let value = self.uint(at)?;
        if value == U256::ZERO {
            Ok(false)
        } else if value == U256::from(1u64) {
            Ok(true)
        } else {
            Err(DashboardError::Decode(format!("invalid bool value {value}")))
        }
    }

    /// Follow the relative offset stored at `at` from `base`.
    fn locate(&self, base: usize, at: usize) -> Result<usize> {
        base.checked_add(self.index(at)?)
            .ok_or_else(|| DashboardError::Decode("offset overflow".to_string()))
    }

    /// Read a string whose offset (relative to `base`) sits in the word at `at`.
    fn string(&self, base: usize, at: usize) -> Result<String> {
        let start = self.locate(base, at)?;
        let len = self.index(start)?;
        let body_start = start
            .checked_add(WORD)
            .ok_or_else(|| DashboardError::Decode("offset overflow".to_string()))?;
        let bytes = body_start
            .checked_add(len)
            .and_then(|end| self.data.get(body_start..end))
            .ok_or_else(|| DashboardError::Decode("string body out of bounds".to_string()))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DashboardError::Decode(format!("string is not UTF-8: {e}")))
    }
}

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    Decoder::new(data).bool(0)
}

pub fn decode_uint(data: &[u8]) -> Result<U256> {
    Decoder::new(data).uint(0)
}

/// `tuple(uint256 id, string name, string proposal, uint256 voteCount)[]`
pub fn decode_candidates(data: &[u8]) -> Result<Vec<Candidate>> {
    let d = Decoder::new(data);
    let array_start = d.index(0)?;
    let len = d.index(array_start)?;
    let items_base = array_start + WORD;

    let mut candidates = Vec::new();
    for i in 0..len {
        let tuple = d.locate(items_base, items_base + i * WORD)?;
        candidates.push(Candidate {
            id: d.uint(tuple)?,
            name: d.string(tuple, tuple + WORD)?,
            proposal: d.string(tuple, tuple + 2 * WORD)?,
            vote_count: d.uint(tuple + 3 * WORD)?,
        });
    }
    Ok(candidates)
}

/// `(bool voterIsRegistered, uint256 weight, bool hasVoted, uint256 votedFor)`
pub fn decode_voter(data: &[u8]) -> Result<VoterRecord> {
    let d = Decoder::new(data);
    Ok(VoterRecord {
        is_registered: d.bool(0)?,
        weight: d.uint(WORD)?,
        has_voted: d.bool(2 * WORD)?,
        voted_for: d.uint(3 * WORD)?,
    })
}

/// `(uint256 id, string name, uint256 voteCount, uint256 percentage)`
pub fn decode_winner(data: &[u8]) -> Result<Winner> {
    let d = Decoder::new(data);
    Ok(Winner {
        id: d.uint(0)?,
        name: d.string(0, WORD)?,
        vote_count: d.uint(2 * WORD)?,
        percentage: d.uint(3 * WORD)?,
    })
}

/// Parse `0x`-prefixed hex as returned by `eth_call`.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| DashboardError::Decode(format!("invalid hex: {e}")))
}
