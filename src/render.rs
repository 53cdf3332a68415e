//! Terminal rendering of proposal reports.

use alloy_primitives::utils::format_ether;
use alloy_primitives::U256;
use std::fmt::Write;

use governor_proposals::models::{ActionReport, ProposalReport, RemoteSummary};

const RULE: &str = "--------------------------------------------------------";

pub fn render_report(report: &ProposalReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");

    match &report.remote {
        Some(remote) => render_remote(&mut out, report, remote),
        None => {
            let _ = writeln!(out, "Unsubmitted proposal ({})", report.state);
            let _ = writeln!(out, "Description: {}", report.description);
        }
    }

    for action in &report.actions {
        render_action(&mut out, action);
    }
    out
}

fn render_remote(out: &mut String, report: &ProposalReport, remote: &RemoteSummary) {
    // Decimals too large for a U256 unit leave the votes unscaled
    let (unit, label) = match &remote.token {
        Some(token) => (
            U256::from(10)
                .checked_pow(U256::from(token.decimals))
                .unwrap_or(U256::from(1)),
            format!("{} Votes", token.name),
        ),
        None => (U256::from(1), "Votes".to_string()),
    };

    let _ = writeln!(out, "Id: {}", report.id);
    let _ = writeln!(out, "Description: {}", report.description);
    let _ = writeln!(out, "For Votes: {} {label}", remote.for_votes / unit);
    let _ = writeln!(out, "Against Votes: {} {label}", remote.against_votes / unit);
    let _ = writeln!(out, "Vote End: {}", remote.end_block);
    if let Some(eta) = remote.eta {
        let _ = writeln!(out, "Eta: {}", eta.to_rfc3339());
    }
    let _ = writeln!(out, "State: {}", remote.state);
}

fn render_action(out: &mut String, action: &ActionReport) {
    let _ = writeln!(out, "Action {}", action.index);
    match &action.target_name {
        Some(name) => {
            let _ = writeln!(out, " ├─ target ───── {} (name: {name})", action.target);
        }
        None => {
            let _ = writeln!(out, " ├─ target ───── {}", action.target);
        }
    }
    if !action.value.is_zero() {
        let _ = writeln!(out, " ├─ value ────── {} ETH", format_ether(action.value));
    }

    match action.args.split_last() {
        None => {
            let _ = writeln!(out, " └─ signature ── {}", action.signature);
        }
        Some((last, rest)) => {
            let _ = writeln!(out, " ├─ signature ── {}", action.signature);
            for (i, arg) in rest.iter().enumerate() {
                let _ = writeln!(out, " ├─ args [ {i} ] ─ {arg}");
            }
            let _ = writeln!(out, " └─ args [ {} ] ─ {last}", rest.len());
        }
    }
}
