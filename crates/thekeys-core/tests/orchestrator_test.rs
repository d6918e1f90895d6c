// End-to-end orchestrator tests against mock cloud and gateway servers.
//
// Rate-limit intervals are shrunk to milliseconds so the readiness and
// spacing behavior is observable without multi-second test runs.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use thekeys_core::{ClientConfig, CoreError, GatewayAddress, LockState, Orchestrator};

const LOCK_ID: i64 = 3723;

fn shares_body(battery: f64, locked: bool) -> serde_json::Value {
    json!([{
        "id": 1,
        "code": "secret-share-code",
        "locker": {
            "id": LOCK_ID,
            "name": "Front Door",
            "battery": battery,
            "locked": locked,
        },
        "gateway": { "id": 55 },
    }])
}

async fn mount_cloud(cloud: &MockServer, shares: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/login_check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-token" })))
        .mount(cloud)
        .await;
    Mock::given(method("GET"))
        .and(path("/fr/api/v2/share/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(shares))
        .mount(cloud)
        .await;
}

fn test_config(cloud: &MockServer, gateway_addr: &str) -> ClientConfig {
    let mut config = ClientConfig::new("+33612345678", SecretString::from("hunter2".to_owned()));
    config.cloud_url = Url::parse(&cloud.uri()).expect("mock server URI");
    config.gateway_address = Some(GatewayAddress::parse(gateway_addr).expect("gateway address"));
    config.light_delay = Duration::from_millis(10);
    config.heavy_delay = Duration::from_millis(50);
    config.retry_backoff = vec![Duration::from_millis(10), Duration::from_millis(20)];
    config.busy_retry_delay = Duration::from_millis(20);
    config.readiness_max_polls = 5;
    config
}

async fn connected(cloud: &MockServer, gateway_addr: &str) -> Orchestrator {
    let orchestrator = Orchestrator::new(test_config(cloud, gateway_addr)).expect("valid config");
    orchestrator.connect().await.expect("connect");
    orchestrator
}

fn status_body(current: &str) -> serde_json::Value {
    json!({ "current_status": current, "version": 68, "lockers": 1 })
}

#[tokio::test]
async fn connect_publishes_cloud_snapshot() {
    let cloud = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    let orchestrator = connected(&cloud, "192.168.1.50").await;

    let locks = orchestrator.locks();
    assert_eq!(locks.len(), 1);
    let snap = &locks[0];
    assert_eq!(snap.id, LOCK_ID);
    assert_eq!(snap.name, "Front Door");
    assert_eq!(snap.state, LockState::Locked);
    assert!(!snap.stale);

    // Raw 87.0 through the calibration model.
    let battery = snap.battery_percent.expect("battery present");
    assert!((battery - 80.76).abs() < 0.01, "calibrated battery {battery}");
}

#[tokio::test]
async fn open_waits_for_gateway_readiness() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    // The gateway works through a sync and a scan before going idle.
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Synchronizing 3/6")))
        .up_to_n_times(1)
        .mount(&gateway)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Scanning")))
        .up_to_n_times(1)
        .mount(&gateway)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    orchestrator.open(LOCK_ID).await.expect("open");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Unlocked);
}

#[tokio::test]
async fn open_fails_when_gateway_never_ready() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Synchronizing 1/6")))
        .mount(&gateway)
        .await;
    // The heavy command must never be dispatched into a syncing gateway.
    Mock::given(method("POST"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    let err = orchestrator.open(LOCK_ID).await.expect_err("must refuse");
    assert!(matches!(err, CoreError::GatewayNotReady { attempts: 5, .. }), "got {err}");
}

#[tokio::test]
async fn refresh_updates_snapshot_from_gateway() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(90.0, true)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "closed": false,
            "battery": 87.0,
            "rssi": -61,
        })))
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    orchestrator.refresh().await.expect("refresh");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Unlocked);
    assert!(!snap.stale);
    let battery = snap.battery_percent.expect("battery present");
    assert!((battery - 80.76).abs() < 0.01, "calibrated battery {battery}");
}

#[tokio::test]
async fn refresh_skips_locks_while_gateway_synchronizes() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Synchronizing 2/6")))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "closed": true })))
        .expect(0)
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    orchestrator.refresh().await.expect("refresh");

    // Last known state is retained, flagged stale.
    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Locked);
    assert!(snap.stale);
}

#[tokio::test]
async fn unreachable_gateway_keeps_last_known_state() {
    let cloud = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    // Grab a port that refuses connections by dropping the server.
    let doomed = MockServer::start().await;
    let addr = doomed.address().to_string();
    drop(doomed);

    let orchestrator = connected(&cloud, &addr).await;
    orchestrator.refresh().await.expect("refresh isolates failures");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Locked);
    assert!(snap.stale);
    assert!(snap.battery_percent.is_some(), "battery survives outage");
}

#[tokio::test]
async fn clock_skew_triggers_gateway_resync() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, false)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&gateway)
        .await;
    // First locker_status is rejected for clock skew, second succeeds.
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ko", "code": 38, "message": "time skewed",
        })))
        .up_to_n_times(1)
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "closed": true })))
        .mount(&gateway)
        .await;
    Mock::given(method("GET"))
        .and(path("/synchronize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    orchestrator.refresh().await.expect("refresh");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Locked);
    assert!(!snap.stale);
}

#[tokio::test]
async fn busy_gateway_is_waited_out() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ko", "code": 500, "message": "locker busy",
        })))
        .up_to_n_times(1)
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "closed": false })))
        .mount(&gateway)
        .await;

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;
    orchestrator.refresh().await.expect("refresh");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Unlocked);
    assert!(!snap.stale);
}

#[tokio::test]
async fn lock_without_gateway_is_rejected() {
    let cloud = MockServer::start().await;
    let shares = json!([{
        "id": 1,
        "code": "secret-share-code",
        "locker": { "id": LOCK_ID, "name": "App-only Lock" },
    }]);
    mount_cloud(&cloud, shares).await;

    let mut config = test_config(&cloud, "192.168.1.50");
    config.gateway_address = None;
    let orchestrator = Orchestrator::new(config).expect("valid config");
    orchestrator.connect().await.expect("connect");

    let err = orchestrator.open(LOCK_ID).await.expect_err("no gateway");
    assert!(matches!(err, CoreError::NoGateway { lock_id: LOCK_ID }), "got {err}");
}

#[tokio::test]
async fn refresh_skips_app_only_lock() {
    let cloud = MockServer::start().await;
    // No gateway object at all: the lock is operated through the app only.
    let shares = json!([{
        "id": 1,
        "code": "secret-share-code",
        "locker": { "id": LOCK_ID, "name": "App-only Lock", "locked": true },
    }]);
    mount_cloud(&cloud, shares).await;

    let mut config = test_config(&cloud, "192.168.1.50");
    config.gateway_address = None;
    let orchestrator = Orchestrator::new(config).expect("valid config");
    orchestrator.connect().await.expect("connect");

    orchestrator.refresh().await.expect("refresh");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Unknown);
    assert!(snap.stale);
}

#[tokio::test]
async fn refresh_isolates_lock_with_dangling_gateway() {
    let cloud = MockServer::start().await;
    // The share names gateway 77 but carries no address for it, so no
    // runtime can be built and the lock's reference dangles.
    let shares = json!([{
        "id": 1,
        "code": "secret-share-code",
        "locker": { "id": LOCK_ID, "name": "Front Door", "locked": true },
        "gateway": { "id": 77 },
    }]);
    mount_cloud(&cloud, shares).await;

    let mut config = test_config(&cloud, "192.168.1.50");
    config.gateway_address = None;
    let orchestrator = Orchestrator::new(config).expect("valid config");
    orchestrator.connect().await.expect("connect");

    // The inconsistency is logged and contained, never a cycle failure.
    orchestrator.refresh().await.expect("refresh");

    let snap = orchestrator.lock(LOCK_ID).expect("snapshot");
    assert_eq!(snap.state, LockState::Unknown);
    assert!(snap.stale);
}

#[tokio::test]
async fn unreachable_gateway_does_not_block_other_gateways() {
    let cloud = MockServer::start().await;
    let healthy = MockServer::start().await;

    let doomed = MockServer::start().await;
    let dead_addr = doomed.address().to_string();
    drop(doomed);

    // Two locks behind the healthy gateway, one behind the dead one.
    let shares = json!([
        {
            "id": 1,
            "code": "code-front",
            "locker": { "id": 3723, "name": "Front Door", "battery": 90.0, "locked": true },
            "gateway": { "id": 55, "host": healthy.address().to_string() },
        },
        {
            "id": 2,
            "code": "code-back",
            "locker": { "id": 3724, "name": "Back Door", "battery": 90.0, "locked": true },
            "gateway": { "id": 55, "host": healthy.address().to_string() },
        },
        {
            "id": 3,
            "code": "code-garage",
            "locker": { "id": 3725, "name": "Garage", "battery": 90.0, "locked": true },
            "gateway": { "id": 66, "host": dead_addr },
        },
    ]);
    mount_cloud(&cloud, shares).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&healthy)
        .await;
    Mock::given(method("POST"))
        .and(path("/locker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "closed": false,
            "battery": 87.0,
        })))
        .expect(2)
        .mount(&healthy)
        .await;

    let mut config = test_config(&cloud, "192.168.1.50");
    config.gateway_address = None;
    let orchestrator = Orchestrator::new(config).expect("valid config");
    orchestrator.connect().await.expect("connect");

    orchestrator.refresh().await.expect("refresh");

    // Both locks on the live gateway refreshed in the same cycle.
    for id in [3723, 3724] {
        let snap = orchestrator.lock(id).expect("snapshot");
        assert_eq!(snap.state, LockState::Unlocked, "lock {id}");
        assert!(!snap.stale, "lock {id}");
    }

    // The dead gateway's lock keeps its last known state, flagged stale.
    let snap = orchestrator.lock(3725).expect("snapshot");
    assert_eq!(snap.state, LockState::Locked);
    assert!(snap.stale);
}

#[tokio::test]
async fn unknown_lock_is_rejected() {
    let cloud = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    let orchestrator = connected(&cloud, "192.168.1.50").await;
    let err = orchestrator.open(9999).await.expect_err("unknown lock");
    assert!(matches!(err, CoreError::LockNotFound { id: 9999 }), "got {err}");
}

#[tokio::test]
async fn commands_require_connect_first() {
    let cloud = MockServer::start().await;
    let orchestrator =
        Orchestrator::new(test_config(&cloud, "192.168.1.50")).expect("valid config");

    assert!(matches!(orchestrator.refresh().await, Err(CoreError::NotConnected)));
    assert!(matches!(orchestrator.open(LOCK_ID).await, Err(CoreError::NotConnected)));
}

#[tokio::test]
async fn consecutive_heavy_commands_are_spaced() {
    let cloud = MockServer::start().await;
    let gateway = MockServer::start().await;
    mount_cloud(&cloud, shares_body(87.0, true)).await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("Idle")))
        .mount(&gateway)
        .await;
    for endpoint in ["/open", "/close"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&gateway)
            .await;
    }

    let orchestrator = connected(&cloud, &gateway.address().to_string()).await;

    let started = Instant::now();
    orchestrator.open(LOCK_ID).await.expect("open");
    orchestrator.close(LOCK_ID).await.expect("close");

    // The second heavy dispatch must wait out the heavy-tier interval.
    assert!(
        started.elapsed() >= Duration::from_millis(50),
        "heavy commands ran {:?} apart",
        started.elapsed()
    );
    assert_eq!(orchestrator.lock(LOCK_ID).expect("snapshot").state, LockState::Locked);
}
