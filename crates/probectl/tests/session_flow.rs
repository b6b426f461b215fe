//! End-to-end tests for probe sessions.
//!
//! These tests drive complete flows through the public API:
//! - Grant, open and selection replacement
//! - Lifecycle signal across tasks
//! - Commands running against in-memory devices

use std::sync::Arc;
use std::time::Duration;

use hidlink::{
    DeviceInfo, HidDevice, MemoryDevice, MemoryProvider, ProbeSession, ProviderError,
    SessionError, SessionOptions, StaticCapability,
};
use probectl::commands;
use probectl::config::Config;
use tokio::time::timeout;

/// A CMSIS-DAP-like probe that echoes the command byte and answers DAP_Info
/// packet size queries.
fn cmsis_probe(provider: &MemoryProvider, path: &str) -> MemoryDevice {
    let device = provider.device(
        DeviceInfo::new(path)
            .with_ids(0x03eb, 0x2141)
            .with_manufacturer("Atmel Corp.")
            .with_product("EDBG CMSIS-DAP")
            .with_serial("ATML2130021800001234"),
    );
    device.respond_with(|_, request| match request {
        [0x00, 0xFF, ..] => Some(vec![0x00, 0x00, 0x02, 0x40, 0x00]),
        [cmd, ..] => Some(vec![*cmd, 0xFF]),
        [] => None,
    });
    device
}

fn plain(provider: &MemoryProvider, path: &str) -> MemoryDevice {
    provider.device(DeviceInfo::new(path))
}

// =============================================================================
// Selection Tests
// =============================================================================

#[tokio::test]
async fn test_grant_then_replace_then_close() {
    let provider = MemoryProvider::new();
    let a = plain(&provider, "A");
    let b = plain(&provider, "B");
    let c = plain(&provider, "C");
    provider.push_grant([a.clone(), b.clone()]);
    provider.push_grant([c.clone()]);

    let session = ProbeSession::new(provider.clone(), StaticCapability::AVAILABLE);
    assert!(session.is_available());

    session.refresh_devices().await.unwrap();
    assert_eq!(session.devices().await, vec![a, b]);

    session.refresh_devices().await.unwrap();
    assert_eq!(session.devices().await, vec![c]);

    session.close_session();
    timeout(Duration::from_millis(50), session.session_ended())
        .await
        .expect("session_ended should resolve immediately after close");
}

#[tokio::test]
async fn test_unavailable_host_never_mutates_devices() {
    let provider = MemoryProvider::new();
    provider.push_grant([plain(&provider, "A")]);
    let session = ProbeSession::new(provider.clone(), StaticCapability::UNAVAILABLE);

    for _ in 0..3 {
        let result = session.refresh_devices().await;
        assert!(matches!(result, Err(SessionError::CapabilityUnavailable)));
        assert!(session.devices().await.is_empty());
    }
    assert!(provider.grant_requests().is_empty());
}

#[tokio::test]
async fn test_third_of_four_failing_leaves_partial_opens() {
    let provider = MemoryProvider::new();
    let batch: Vec<_> = ["d0", "d1", "d2", "d3"]
        .iter()
        .map(|p| plain(&provider, p))
        .collect();
    batch[2].fail_open(ProviderError::OpenFailed("Permission denied".to_string()));
    provider.push_grant(batch.clone());

    let session = ProbeSession::new(provider.clone(), StaticCapability::AVAILABLE);
    let err = session.refresh_devices().await.unwrap_err();

    assert!(matches!(err, SessionError::OpenFailed { index: 2, .. }));
    assert!(session.devices().await.is_empty());
    assert!(batch[0].is_opened());
    assert!(batch[1].is_opened());
}

#[tokio::test]
async fn test_denied_grant_can_be_retried() {
    let provider = MemoryProvider::new();
    provider.push_denial();
    let probe = plain(&provider, "A");
    provider.push_grant([probe.clone()]);

    let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);

    assert!(matches!(
        session.refresh_devices().await,
        Err(SessionError::GrantDenied)
    ));
    session.refresh_devices().await.unwrap();
    assert_eq!(session.devices().await, vec![probe]);
}

#[tokio::test]
async fn test_regrant_of_open_device_does_not_reopen() {
    let provider = MemoryProvider::new();
    let probe = plain(&provider, "A");
    provider.push_grant([probe.clone()]);
    provider.push_grant([probe.clone()]);

    let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);
    session.refresh_devices().await.unwrap();
    session.refresh_devices().await.unwrap();

    assert_eq!(probe.open_count(), 1);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_waiters_in_other_tasks_observe_close() {
    let provider = MemoryProvider::new();
    let session = Arc::new(ProbeSession::new(provider, StaticCapability::AVAILABLE));

    let waiters: Vec<_> = (0..3)
        .map(|_| tokio::spawn(session.session_ended()))
        .collect();

    let closer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session.close_session();
            session.close_session();
        })
    };
    closer.await.unwrap();

    for waiter in waiters {
        timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter timed out")
            .unwrap();
    }

    let late = session.lifecycle();
    timeout(Duration::from_millis(50), late.wait())
        .await
        .expect("late waiter should not hang");
}

#[tokio::test]
async fn test_close_from_failure_handler() {
    let provider = MemoryProvider::new();
    provider.push_denial();
    let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);

    if session.refresh_devices().await.is_err() {
        session.close_session();
    }

    assert!(session.is_closed());
}

// =============================================================================
// Command Tests
// =============================================================================

#[tokio::test]
async fn test_list_command_reports_descriptors() {
    let provider = MemoryProvider::new();
    provider.push_grant([cmsis_probe(&provider, "/dev/hidraw4")]);
    let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);

    let devices = commands::list_devices(&session).await.unwrap();
    let table = commands::render_devices(&devices, false).unwrap();

    assert_eq!(devices.len(), 1);
    assert!(table.contains("Atmel Corp. EDBG CMSIS-DAP"));
    assert!(table.contains("/dev/hidraw4"));
}

#[tokio::test]
async fn test_transact_command_against_probe() {
    let provider = MemoryProvider::new();
    let first = cmsis_probe(&provider, "/dev/hidraw4");
    let second = cmsis_probe(&provider, "/dev/hidraw5");
    provider.push_grant([first.clone(), second.clone()]);

    let config = Config::default();
    let session = ProbeSession::with_options(
        provider,
        StaticCapability::AVAILABLE,
        config.probe.session_options(),
    );

    let request = commands::parse_hex("00 ff").unwrap();
    let response = commands::transact(&session, 1, &request).await.unwrap();

    assert_eq!(commands::format_hex(&response), "00 02 40 00");
    assert!(first.sent_reports().is_empty());
    assert_eq!(second.sent_reports(), vec![(0x00, vec![0x00, 0xff])]);
}

#[tokio::test]
async fn test_transact_command_with_bad_index() {
    let provider = MemoryProvider::new();
    provider.push_grant([cmsis_probe(&provider, "/dev/hidraw4")]);
    let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);

    let result = commands::transact(&session, 3, &[0x00]).await;
    assert!(matches!(
        result,
        Err(SessionError::NoSuchDevice { index: 3, len: 1 })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transact_command_honours_configured_timeout() {
    let provider = MemoryProvider::new();
    provider.push_grant([plain(&provider, "/dev/hidraw4")]);

    let mut config = Config::default();
    config.probe.response_timeout_ms = 150;
    let session = ProbeSession::with_options(
        provider,
        StaticCapability::AVAILABLE,
        config.probe.session_options(),
    );

    let result = commands::transact(&session, 0, &[0x00]).await;
    match result {
        Err(SessionError::ResponseTimeout(wait)) => {
            assert_eq!(wait, Duration::from_millis(150));
        }
        other => panic!("expected ResponseTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_options_default_matches_config_default() {
    let config = Config::default();
    assert_eq!(config.probe.session_options(), SessionOptions::default());
}
