use crate::*;

use pulse_transport::PlainTransport;

/// First heartbeat inserts, later ones update the same record.
#[tokio::test]
async fn test_plain_heartbeats_register_services() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    let mut bytes = heartbeat("payments", "host-1", 10.0, T0);
    bytes.extend(heartbeat("payments", "host-2", 10.0, T0));
    bytes.extend(heartbeat("search", "host-1", 30.0, T0));
    send_plain(reg.addr, &bytes).await?;
    reg.wait_for_completed(1).await?;

    let fleet = reg.store().group_by_key();
    assert_eq!(fleet.len(), 2);
    assert_eq!(fleet["payments"].len(), 2);
    assert_eq!(fleet["search"].len(), 1);
    assert!(reg.store().all().iter().all(|r| r.online));

    send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0 + 5.0)).await?;
    reg.wait_for_completed(2).await?;

    assert_eq!(reg.store().len(), 3);
    let rec = reg.store().find_one("payments", "host-1").context("record")?;
    assert_eq!(rec.heartbeat.time.as_epoch_secs(), Some(T0 + 5.0));
    Ok(())
}

/// A malformed packet is dropped; packets after it on the same connection
/// still land.
#[tokio::test]
async fn test_malformed_packet_keeps_connection() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    let mut bytes = heartbeat("payments", "host-1", 10.0, T0);
    bytes.extend(b"{\"payload\": \"nope\"}\n");
    bytes.extend(b"}}}{{{\n");
    bytes.extend(heartbeat("payments", "host-2", 10.0, T0));
    send_plain(reg.addr, &bytes).await?;
    reg.wait_for_completed(1).await?;

    assert_eq!(reg.store().len(), 2);
    assert!(reg.store().exists("payments", "host-2"));
    Ok(())
}

/// Extra fields survive the round trip into the fleet status report.
#[tokio::test]
async fn test_extra_fields_are_kept() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    let packet = serde_json::json!({
        "payload": {
            "groupingKey": "payments",
            "serviceName": "payments-api",
            "time": "2023-11-14T22:13:20Z",
            "region": "eu-west-1",
            "metrics": {
                "hostname": "host-1",
                "updateIntervalSeconds": 10,
                "cpu": 0.25
            }
        }
    });
    let mut bytes = serde_json::to_vec(&packet)?;
    bytes.push(b'\n');
    send_plain(reg.addr, &bytes).await?;
    reg.wait_for_completed(1).await?;

    let report = serde_json::to_value(reg.store().group_by_key())?;
    let rec = &report["payments"][0];
    assert_eq!(rec["region"], "eu-west-1");
    assert_eq!(rec["metrics"]["cpu"], 0.25);
    assert_eq!(rec["online"], true);
    Ok(())
}

/// Many agents reporting the same pair at once still leave one record.
#[tokio::test]
async fn test_concurrent_connections_keep_pairs_unique() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    let mut clients = Vec::new();
    for n in 0..16 {
        let addr = reg.addr;
        clients.push(tokio::spawn(async move {
            let mut bytes = Vec::new();
            for i in 0..10 {
                bytes.extend(heartbeat("payments", "host-1", 10.0, T0 + f64::from(i)));
                bytes.extend(heartbeat("payments", &format!("host-{}", n % 4), 10.0, T0));
            }
            send_plain(addr, &bytes).await
        }));
    }
    for client in clients {
        client.await??;
    }
    reg.wait_for_completed(16).await?;

    assert_eq!(reg.store().len(), 4);
    assert_eq!(reg.manager.active_connections(), 0);
    Ok(())
}

/// A heartbeat whose time can't be read is dropped rather than stored as
/// a record no sweep could ever take offline.
#[tokio::test]
async fn test_unreadable_time_is_not_stored() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    let packet = serde_json::json!({
        "payload": {
            "groupingKey": "payments",
            "serviceName": "payments-api",
            "time": "some time on tuesday",
            "metrics": { "hostname": "host-1", "updateIntervalSeconds": 10 }
        }
    });
    let mut bytes = serde_json::to_vec(&packet)?;
    bytes.push(b'\n');
    bytes.extend(heartbeat("payments", "host-2", 10.0, T0));
    send_plain(reg.addr, &bytes).await?;
    reg.wait_for_completed(1).await?;

    assert!(!reg.store().exists("payments", "host-1"));
    assert_eq!(reg.store().len(), 1);
    Ok(())
}
