//! Fleet status report commands.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    service_name: String,
    time: serde_json::Value,
    metrics: Metrics,
    online: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    hostname: String,
    update_interval_seconds: f64,
}

pub async fn cmd_fleet(port: u16) -> Result<()> {
    let fleet: BTreeMap<String, Vec<Record>> =
        get_json(&format!("{}/fleet", base_url(port))).await?;

    if fleet.is_empty() {
        println!("No services registered yet.");
        return Ok(());
    }

    for (key, records) in &fleet {
        print_group(key, records);
    }
    Ok(())
}

pub async fn cmd_fleet_group(port: u16, key: &str) -> Result<()> {
    let records: Vec<Record> = get_json(&format!("{}/fleet/{}", base_url(port), key)).await?;
    print_group(key, &records);
    Ok(())
}

fn print_group(key: &str, records: &[Record]) {
    let online = records.iter().filter(|r| r.online).count();

    println!("═══════════════════════════════════════");
    println!("  {} ({}/{} online)", key, online, records.len());
    println!("═══════════════════════════════════════");

    for r in records {
        let state = if r.online { "online" } else { "OFFLINE" };
        println!("  ┌─ {}", r.metrics.hostname);
        println!("  │  service  : {}", r.service_name);
        println!("  │  state    : {}", state);
        println!("  │  interval : {}s", r.metrics.update_interval_seconds);
        println!("  └─ last at  : {}", r.time);
    }
}
