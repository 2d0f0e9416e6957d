//! Text rendering of the dashboard and the admin form state.
//!
//! Views are pure functions of a [`DashboardSnapshot`]; they never talk to
//! the contract. [`AdminForms`] only turns form input into an [`Action`] for
//! the caller to hand to the sync engine.

use std::fmt::Write;

use alloy_primitives::U512;
use chrono::NaiveDateTime;

use crate::errors::{DashboardError, Result};
use crate::types::{
    parse_address, Action, Address, DashboardSnapshot, TransactionState, TxStatus, Winner, U256,
};

const BAR_WIDTH: usize = 40;

// ─────────────────────────────────────────────────────────
// Formatting helpers
// ─────────────────────────────────────────────────────────

/// `round(100 * votes / total)`, or 0 when nobody has voted.
///
/// Rounds half up in 512-bit integers so no pair of `uint256` counters can
/// overflow or lose precision. Only a `votes` far above `total` can exceed
/// `U256::MAX`, in which case the result saturates.
pub fn calculate_percentage(votes: U256, total: U256) -> U256 {
    if total.is_zero() {
        return U256::ZERO;
    }
    let votes = widen(votes);
    let total = widen(total);
    let pct = (votes * U512::from(200u64) + total) / (total * U512::from(2u64));
    narrow(pct)
}

fn widen(value: U256) -> U512 {
    let l = value.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(value: U512) -> U256 {
    let l = value.as_limbs();
    if l[4..].iter().any(|limb| *limb != 0) {
        return U256::MAX;
    }
    U256::from_limbs([l[0], l[1], l[2], l[3]])
}

pub fn shorten_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Two most significant units, e.g. `2 days 3 hours` or `45 seconds`.
pub fn format_time_remaining(seconds: u64) -> String {
    if seconds == 0 {
        return "N/A".to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{} {}", plural(days, "day"), plural(hours, "hour"))
    } else if hours > 0 {
        format!("{} {}", plural(hours, "hour"), plural(minutes, "minute"))
    } else if minutes > 0 {
        format!("{} {}", plural(minutes, "minute"), plural(secs, "second"))
    } else {
        plural(secs, "second")
    }
}

/// Fixed-point with two implied decimals: `5000` → `50.00%`.
pub fn format_fixed_percentage(value: U256) -> String {
    let hundred = U256::from(100u64);
    format!("{}.{:02}%", value / hundred, (value % hundred).as_limbs()[0])
}

// ─────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────

pub fn render_connection_status(snap: &DashboardSnapshot) -> String {
    match &snap.account {
        Some(account) if snap.is_connected => format!(
            "Connected: {} on {} (contract {}){}",
            shorten_address(account),
            snap.network_name,
            shorten_address(&snap.contract_address),
            if snap.is_admin { " [admin]" } else { "" }
        ),
        _ => match &snap.error {
            Some(err) => format!("Not connected: {err}"),
            None => "Not connected".to_string(),
        },
    }
}

/// Whether the connected account may cast a vote right now.
pub fn can_vote(snap: &DashboardSnapshot) -> bool {
    snap.is_connected
        && snap.voting_active
        && snap
            .voter
            .map_or(false, |v| v.is_registered && !v.has_voted)
}

pub fn render_candidate_list(snap: &DashboardSnapshot) -> String {
    if snap.candidates.is_empty() {
        return "No candidates yet.\n".to_string();
    }

    let eligible = can_vote(snap);
    let mut out = String::new();
    for c in &snap.candidates {
        let marker = match snap.voter {
            Some(v) if v.has_voted && v.voted_for == c.id => " (your vote)",
            _ if eligible => " [vote]",
            _ => "",
        };
        let _ = writeln!(
            out,
            "#{} {} - {} votes{}\n    {}",
            c.id, c.name, c.vote_count, marker, c.proposal
        );
    }
    out
}

pub fn render_results(snap: &DashboardSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Results: {} votes cast, {} voters registered",
        snap.total_votes, snap.total_voters
    );
    let name_width = snap
        .candidates
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);

    for c in &snap.candidates {
        let pct = calculate_percentage(c.vote_count, snap.total_votes);
        let filled = pct.min(U256::from(100u64)).as_limbs()[0] as usize * BAR_WIDTH / 100;
        let _ = writeln!(
            out,
            "{:<width$} |{}{}| {:>3}%",
            c.name,
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            pct.to_string(),
            width = name_width
        );
    }
    out
}

pub fn render_winner(winner: Option<&Winner>) -> String {
    match winner {
        Some(w) => format!(
            "Current leader: {} with {} votes ({})",
            w.name,
            w.vote_count,
            format_fixed_percentage(w.percentage)
        ),
        None => "No current leader".to_string(),
    }
}

pub fn render_voting_window(snap: &DashboardSnapshot) -> String {
    if snap.voting_active {
        format!(
            "Voting open, {} remaining",
            format_time_remaining(snap.time_remaining)
        )
    } else {
        "Voting closed".to_string()
    }
}

/// `None` while idle: the status view is only shown for an active transaction.
pub fn render_transaction_modal(tx: &TransactionState) -> Option<String> {
    let hash = tx
        .hash
        .as_deref()
        .map(|h| format!("\n  tx: {h}"))
        .unwrap_or_default();
    let body = match tx.status {
        TxStatus::Idle => return None,
        TxStatus::Pending => "Waiting for the transaction to be confirmed...",
        TxStatus::Success => "Transaction confirmed.",
        TxStatus::Error => tx.error.as_deref().unwrap_or("Transaction failed"),
    };
    Some(format!("[{}] {body}{hash}", tx.status.as_str()))
}

pub fn render_dashboard(snap: &DashboardSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", render_connection_status(snap));
    let _ = writeln!(out, "{}\n", render_voting_window(snap));
    out.push_str(&render_candidate_list(snap));
    out.push('\n');
    out.push_str(&render_results(snap));
    let _ = writeln!(out, "{}", render_winner(snap.winner.as_ref()));
    if let Some(modal) = render_transaction_modal(&snap.transaction) {
        let _ = writeln!(out, "\n{modal}");
    }
    out
}

// ─────────────────────────────────────────────────────────
// Admin forms
// ─────────────────────────────────────────────────────────

/// Ephemeral admin form input. Fields are cleared as soon as an action is
/// produced, not when its transaction confirms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminForms {
    pub candidate_name: String,
    pub candidate_proposal: String,
    pub voter_address: String,
    pub voter_is_admin: bool,
    /// Kept for display only; voting always starts at submission time.
    pub start_date: String,
    pub end_date: String,
}

impl AdminForms {
    /// `None` when either field is empty.
    pub fn take_add_candidate(&mut self) -> Option<Action> {
        if self.candidate_name.trim().is_empty() || self.candidate_proposal.trim().is_empty() {
            return None;
        }
        let action = Action::AddCandidate {
            name: std::mem::take(&mut self.candidate_name),
            proposal: std::mem::take(&mut self.candidate_proposal),
        };
        Some(action)
    }

    /// `Ok(None)` when the address field is empty. A malformed address is
    /// an error and leaves the form untouched.
    pub fn take_register_voter(&mut self) -> Result<Option<Action>> {
        if self.voter_address.trim().is_empty() {
            return Ok(None);
        }
        let address = parse_address(&self.voter_address)?;
        let action = Action::RegisterVoter {
            address,
            is_admin: self.voter_is_admin,
        };
        self.voter_address.clear();
        self.voter_is_admin = false;
        Ok(Some(action))
    }

    /// Build a start-voting action from the end date. The start date field
    /// is not consulted; the sync engine substitutes "now".
    pub fn take_start_voting(&mut self) -> Result<Option<Action>> {
        if self.end_date.trim().is_empty() {
            return Ok(None);
        }
        let end_time = parse_datetime_local(&self.end_date)?;
        self.start_date.clear();
        self.end_date.clear();
        Ok(Some(Action::StartVoting {
            start_time: 0,
            end_time,
        }))
    }
}

/// Parse an HTML `datetime-local` value (`YYYY-MM-DDTHH:MM[:SS]`) as UTC.
pub fn parse_datetime_local(value: &str) -> Result<i64> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| DashboardError::InvalidInput(format!("invalid date {value:?}: {e}")))
}
