use crate::*;

use pulse_transport::PlainTransport;

/// A record stays online inside its deadline and goes offline once a
/// connection end sweeps past it.
#[tokio::test]
async fn test_end_of_connection_sweep() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;

    send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0)).await?;
    reg.wait_for_completed(1).await?;

    // Deadline is T0 + 10 + 1.5.
    reg.clock.set(T0 + 11.4);
    send_plain(reg.addr, &heartbeat("search", "host-9", 10.0, T0 + 11.4)).await?;
    reg.wait_for_completed(2).await?;
    assert!(reg.store().find_one("payments", "host-1").context("record")?.online);

    reg.clock.set(T0 + 11.6);
    send_plain(reg.addr, &heartbeat("search", "host-9", 10.0, T0 + 11.6)).await?;
    reg.wait_for_completed(3).await?;
    assert!(!reg.store().find_one("payments", "host-1").context("record")?.online);
    assert!(reg.store().find_one("search", "host-9").context("record")?.online);
    Ok(())
}

/// An empty connection still counts and still sweeps.
#[tokio::test]
async fn test_empty_connection_triggers_sweep() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;
    send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0)).await?;
    reg.wait_for_completed(1).await?;

    reg.clock.advance(60.0);
    send_plain(reg.addr, b"").await?;
    reg.wait_for_completed(2).await?;

    let rec = reg.store().find_one("payments", "host-1").context("record")?;
    assert!(!rec.online);
    Ok(())
}

/// A fresh heartbeat brings an offline record back without creating a
/// second one.
#[tokio::test]
async fn test_offline_record_comes_back() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;
    send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0)).await?;
    reg.wait_for_completed(1).await?;

    reg.clock.set(T0 + 100.0);
    send_plain(reg.addr, b"").await?;
    reg.wait_for_completed(2).await?;
    let before = reg.store().find_one("payments", "host-1").context("record")?;
    assert!(!before.online);

    send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0 + 100.0)).await?;
    reg.wait_for_completed(3).await?;

    let after = reg.store().find_one("payments", "host-1").context("record")?;
    assert!(after.online);
    assert_eq!(after.id(), before.id());
    assert_eq!(reg.store().len(), 1);
    Ok(())
}

/// A sweep with no connection involved uses the same rule.
#[tokio::test]
async fn test_manual_sweep_matches_connection_sweep() -> Result<()> {
    let reg = start_registry(PlainTransport, T0).await?;
    let mut bytes = heartbeat("payments", "host-1", 10.0, T0);
    bytes.extend(heartbeat("payments", "host-2", 60.0, T0));
    send_plain(reg.addr, &bytes).await?;
    reg.wait_for_completed(1).await?;

    reg.clock.set(T0 + 20.0);
    let report = reg.manager.sweep_now();
    assert_eq!(report.examined, 2);
    assert_eq!(report.went_offline, 1);
    assert!(!reg.store().find_one("payments", "host-1").context("record")?.online);
    assert!(reg.store().find_one("payments", "host-2").context("record")?.online);
    Ok(())
}
