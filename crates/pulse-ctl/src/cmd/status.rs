//! Registry status, connections and sweep commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    records: usize,
    online: usize,
    offline: usize,
    groups: usize,
    active_connections: usize,
    completed_connections: u64,
    transport: Option<String>,
}

#[derive(Deserialize)]
struct ConnectionsResponse {
    connections: Vec<ConnectionInfo>,
}

#[derive(Deserialize)]
struct ConnectionInfo {
    id: u64,
    peer: String,
    transport: String,
    open_secs: u64,
    packets_accepted: u64,
    packets_rejected: u64,
}

#[derive(Deserialize)]
struct SweepReport {
    examined: usize,
    stale: usize,
    went_offline: usize,
    unevaluable: usize,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Pulse Registry Status");
    println!("═══════════════════════════════════════");
    match &resp.transport {
        Some(t) => println!("  Listener          : {}", t),
        None => println!("  Listener          : DOWN (setup failed)"),
    }
    println!("  Services          : {}", resp.records);
    println!("  Online            : {}", resp.online);
    println!("  Offline           : {}", resp.offline);
    println!("  Grouping keys     : {}", resp.groups);
    println!("  Open connections  : {}", resp.active_connections);
    println!("  Total connections : {}", resp.completed_connections);

    Ok(())
}

pub async fn cmd_connections(port: u16) -> Result<()> {
    let resp: ConnectionsResponse =
        get_json(&format!("{}/connections", base_url(port))).await?;

    if resp.connections.is_empty() {
        println!("No open connections.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Open Connections ({})", resp.connections.len());
    println!("═══════════════════════════════════════");

    for c in &resp.connections {
        println!("  ┌─ conn-{}", c.id);
        println!("  │  peer      : {}", c.peer);
        println!("  │  transport : {}", c.transport);
        println!("  │  packets   : {} ok, {} dropped", c.packets_accepted, c.packets_rejected);
        println!("  └─ open for : {}s", c.open_secs);
    }

    Ok(())
}

pub async fn cmd_sweep(port: u16) -> Result<()> {
    let resp: SweepReport = post_json(&format!("{}/sweep", base_url(port))).await?;
    println!(
        "Examined {} services: {} stale, {} went offline, {} with unreadable time.",
        resp.examined, resp.stale, resp.went_offline, resp.unevaluable
    );
    Ok(())
}
