use crate::*;

use tokio::io::AsyncReadExt;

use pulse_transport::{MutualTlsTransport, PlainTransport};

use crate::pki::{connect_tls, send_tls, Pki};

async fn start_tls(pki: &Pki) -> Result<Registry> {
    start_registry(MutualTlsTransport::new(&pki.server_material())?, T0).await
}

/// Write a packet on a connection the server should refuse and wait until
/// the server has closed it. The handshake may fail on either side.
async fn attempt_rejected(
    reg: &Registry,
    pki: &Pki,
    identity: Option<&crate::pki::Identity>,
) -> Result<()> {
    let config = pki.client_config(identity)?;
    tokio::time::timeout(Duration::from_secs(10), async {
        let Ok(mut stream) = connect_tls(reg.addr, config).await else {
            return;
        };
        let _ = stream.write_all(&heartbeat("payments", "intruder", 10.0, T0)).await;
        let _ = stream.flush().await;
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await
    .context("server never closed the rejected connection")
}

#[tokio::test]
async fn test_mutual_tls_accepts_trusted_client() -> Result<()> {
    let pki = Pki::generate()?;
    let reg = start_tls(&pki).await?;

    let mut bytes = heartbeat("payments", "host-1", 10.0, T0);
    bytes.extend(heartbeat("payments", "host-2", 10.0, T0));
    send_tls(reg.addr, pki.client_config(Some(&pki.client))?, &bytes).await?;
    reg.wait_for_completed(1).await?;

    assert_eq!(reg.store().len(), 2);
    assert!(reg.store().all().iter().all(|r| r.online));
    Ok(())
}

#[tokio::test]
async fn test_client_without_certificate_is_rejected() -> Result<()> {
    let pki = Pki::generate()?;
    let reg = start_tls(&pki).await?;

    attempt_rejected(&reg, &pki, None).await?;

    assert!(reg.store().is_empty());
    assert_eq!(reg.manager.completed_connections(), 0);
    assert_eq!(reg.manager.active_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn test_client_from_unknown_ca_is_rejected() -> Result<()> {
    let pki = Pki::generate()?;
    let reg = start_tls(&pki).await?;

    attempt_rejected(&reg, &pki, Some(&pki.stranger)).await?;

    assert!(reg.store().is_empty());
    assert_eq!(reg.manager.completed_connections(), 0);
    Ok(())
}

/// A failed handshake must not stop the listener.
#[tokio::test]
async fn test_listener_survives_failed_handshake() -> Result<()> {
    let pki = Pki::generate()?;
    let reg = start_tls(&pki).await?;

    // Plain bytes at a TLS listener are not a ClientHello.
    let _ = send_plain(reg.addr, &heartbeat("payments", "host-1", 10.0, T0)).await;
    attempt_rejected(&reg, &pki, None).await?;

    send_tls(
        reg.addr,
        pki.client_config(Some(&pki.client))?,
        &heartbeat("payments", "host-2", 10.0, T0),
    )
    .await?;
    reg.wait_for_completed(1).await?;

    assert_eq!(reg.store().len(), 1);
    assert!(reg.store().exists("payments", "host-2"));
    Ok(())
}

/// The same packet sequence leaves the same store whichever transport
/// carried it.
#[tokio::test]
async fn test_transports_are_equivalent() -> Result<()> {
    let pki = Pki::generate()?;
    let plain = start_registry(PlainTransport, T0).await?;
    let tls = start_tls(&pki).await?;

    let mut bytes = heartbeat("payments", "host-1", 10.0, T0 - 30.0);
    bytes.extend(b"not json\n");
    bytes.extend(heartbeat("payments", "host-2", 10.0, T0));
    bytes.extend(heartbeat("search", "host-1", 5.0, T0 - 1.0));
    bytes.extend(heartbeat("payments", "host-1", 10.0, T0 - 20.0));
    // unterminated final packet
    let mut tail = heartbeat("billing", "host-7", 10.0, T0);
    tail.pop();
    bytes.extend(tail);

    send_plain(plain.addr, &bytes).await?;
    send_tls(tls.addr, pki.client_config(Some(&pki.client))?, &bytes).await?;
    plain.wait_for_completed(1).await?;
    tls.wait_for_completed(1).await?;

    assert_eq!(plain.store().len(), 4);
    assert_eq!(plain.store().all(), tls.store().all());
    assert!(!plain.store().find_one("payments", "host-1").context("record")?.online);
    Ok(())
}
