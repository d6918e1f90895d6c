// ── Device orchestrator ──
//
// Composes the cloud and gateway clients into one coordinating owner
// per account: resolves which gateway serves which lock, gates heavy
// lock commands on gateway readiness, runs the poll cycle with
// per-device error isolation, and publishes an immutable snapshot of
// every lock's state for the host application.
//
// The readiness gate exists because of a documented failure mode: a
// gateway that is still scanning its paired locks resets the connection
// on heavy calls, and blind retries both fail and burn the rate budget.
// Heavy commands are therefore dispatched only after the gateway
// self-reports a ready status, within a bounded status-poll budget.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thekeys_api::gateway::LockerStatusReport;
use thekeys_api::{
    CloudClient, Error as ApiError, GatewayAddress, GatewayClient, GatewayStatus, RateLimiter,
};

use crate::battery;
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::model::{Gateway, Lock, LockSnapshot, LockState};

// ── Readiness ────────────────────────────────────────────────────────

/// Per-gateway readiness as tracked by the orchestrator.
///
/// Derived from the gateway's self-reported status: `Ready` means the
/// last observed status is in the configured ready set; `Error` means
/// repeated unreachable cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unknown,
    Synchronizing,
    Scanning,
    Ready,
    Error,
}

// ── Internal state ───────────────────────────────────────────────────

struct GatewayRuntime {
    info: Gateway,
    client: GatewayClient,
    readiness: Readiness,
    consecutive_failures: u32,
    /// Warn-once bookkeeping: the first unreachable cycle logs at WARN,
    /// subsequent ones at DEBUG, recovery at INFO.
    reachable: bool,
}

impl GatewayRuntime {
    fn observe_status(&mut self, status: &GatewayStatus, ready_statuses: &[GatewayStatus]) {
        if !self.reachable {
            info!(gateway = %self.info.address, "gateway is back online");
        }
        self.reachable = true;
        self.consecutive_failures = 0;
        self.info.last_status = Some(status.clone());

        self.readiness = if ready_statuses.contains(status) {
            Readiness::Ready
        } else {
            match status {
                GatewayStatus::Synchronizing => Readiness::Synchronizing,
                GatewayStatus::Scanning => Readiness::Scanning,
                GatewayStatus::Error => Readiness::Error,
                GatewayStatus::Idle | GatewayStatus::Unknown(_) => Readiness::Unknown,
            }
        };
    }

    fn observe_unreachable(&mut self, reason: &str, threshold: u32) {
        self.consecutive_failures += 1;
        if self.reachable {
            warn!(
                gateway = %self.info.address,
                reason,
                "gateway unreachable, keeping last known lock states"
            );
            self.reachable = false;
        } else {
            debug!(gateway = %self.info.address, reason, "gateway still unreachable");
        }
        if self.consecutive_failures >= threshold {
            self.readiness = Readiness::Error;
        }
    }
}

struct LockRecord {
    lock: Lock,
    state: LockState,
    battery_raw: Option<f64>,
    last_seen: DateTime<Utc>,
    stale: bool,
}

struct Inventory {
    locks: Vec<LockRecord>,
    gateways: HashMap<i64, GatewayRuntime>,
}

enum LockCommand {
    Open,
    Close,
    Calibrate,
}

// ── Orchestrator ─────────────────────────────────────────────────────

/// The coordinating owner for one account's locks and gateways.
///
/// All gateway traffic flows through this type so the per-gateway rate
/// limiters see every request. Commands and poll cycles serialize on an
/// internal mutex; the published snapshot is lock-free to read.
pub struct Orchestrator {
    config: ClientConfig,
    cloud: CloudClient,
    state: Mutex<Option<Inventory>>,
    snapshot: ArcSwap<Vec<Arc<LockSnapshot>>>,
}

impl Orchestrator {
    /// Create an orchestrator from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to authenticate and pull the
    /// inventory.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let cloud = CloudClient::new(
            config.cloud_url.clone(),
            config.username.clone(),
            config.password.clone(),
            &config.transport,
        )?;
        Ok(Self {
            config,
            cloud,
            state: Mutex::new(None),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        })
    }

    /// Authenticate against the cloud and build the device inventory.
    ///
    /// The inventory is fetched once here, not on every poll cycle --
    /// poll cycles only refresh lock state through the gateway, so a
    /// cloud outage never resets known devices.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.cloud.login().await?;
        let shares = self.cloud.list_devices().await?;

        let mut gateways: HashMap<i64, GatewayRuntime> = HashMap::new();
        let mut locks = Vec::new();
        let now = Utc::now();

        for share in &shares {
            if let Some(info) = &share.gateway {
                if !gateways.contains_key(&info.id) {
                    match self.build_gateway(info.id, info.host.as_deref(), info.version) {
                        Ok(runtime) => {
                            gateways.insert(info.id, runtime);
                        }
                        Err(e) => {
                            warn!(gateway = info.id, error = %e, "skipping unusable gateway");
                        }
                    }
                }
            }

            let lock = Lock::from_share(share);
            locks.push(LockRecord {
                state: lock.state,
                battery_raw: lock.battery_raw,
                last_seen: now,
                stale: false,
                lock,
            });
        }

        info!(
            locks = locks.len(),
            gateways = gateways.len(),
            "loaded device inventory"
        );

        let inventory = Inventory { locks, gateways };
        self.publish(&inventory);
        *self.state.lock().await = Some(inventory);
        Ok(())
    }

    /// Resolve the address for a gateway: a configured override wins
    /// over the LAN host reported by the cloud.
    fn build_gateway(
        &self,
        id: i64,
        cloud_host: Option<&str>,
        version: Option<u64>,
    ) -> Result<GatewayRuntime, CoreError> {
        let address = match &self.config.gateway_address {
            Some(addr) => addr.clone(),
            None => {
                let host = cloud_host.ok_or(CoreError::Config {
                    message: format!("gateway {id} has no known address"),
                })?;
                GatewayAddress::parse(host)?
            }
        };

        let limiter = RateLimiter::new(self.config.light_delay, self.config.heavy_delay);
        let client = GatewayClient::new(address.clone(), limiter, &self.config.transport)?;

        Ok(GatewayRuntime {
            info: Gateway {
                id,
                address,
                version,
                last_status: None,
            },
            client,
            readiness: Readiness::Unknown,
            consecutive_failures: 0,
            reachable: true,
        })
    }

    // ── Poll cycle ───────────────────────────────────────────────────

    /// One full poll cycle: gateway status first, then per-lock state.
    ///
    /// Failures are isolated per device -- an unreachable gateway marks
    /// its locks stale (last known state retained) and never blocks
    /// reporting for other gateways' locks. A lock whose gateway is
    /// absent from the inventory is a transient inconsistency: it is
    /// logged and reported `Unknown` for the cycle, nothing more.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let inventory = guard.as_mut().ok_or(CoreError::NotConnected)?;
        let Inventory { locks, gateways } = inventory;

        // Gateway reachability/status check before polling individual
        // locks, so a dead host is not hammered once per lock.
        for runtime in gateways.values_mut() {
            match runtime.client.status().await {
                Ok(report) => {
                    runtime.observe_status(&report.status, &self.config.ready_statuses);
                    debug!(gateway = %runtime.info.address, status = %report.status, "gateway status");
                }
                Err(ref e) if e.is_unreachable() => {
                    runtime
                        .observe_unreachable(&e.to_string(), self.config.unreachable_error_threshold);
                }
                Err(e) => {
                    warn!(gateway = %runtime.info.address, error = %e, "gateway status query failed");
                }
            }
        }

        let now = Utc::now();
        for record in locks.iter_mut() {
            // An app-only lock (no paired gateway) simply can't be
            // polled; a dangling gateway reference is an inventory
            // inconsistency worth flagging. Both report Unknown/stale.
            let Some(gateway_id) = record.lock.gateway_id else {
                debug!(lock = record.lock.id, "lock has no paired gateway, skipping poll");
                record.state = LockState::Unknown;
                record.stale = true;
                continue;
            };
            let runtime = match gateways.get(&gateway_id) {
                Some(runtime) => runtime,
                None => {
                    warn!(
                        lock = record.lock.id,
                        gateway = gateway_id,
                        "inventory inconsistent: lock references a gateway absent from this snapshot"
                    );
                    record.state = LockState::Unknown;
                    record.stale = true;
                    continue;
                }
            };

            if !runtime.reachable || runtime.readiness == Readiness::Error {
                record.stale = true;
                continue;
            }
            if runtime.readiness == Readiness::Synchronizing {
                debug!(
                    gateway = %runtime.info.address,
                    "gateway is synchronizing, skipping lock updates this cycle"
                );
                record.stale = true;
                continue;
            }

            match locker_status_with_recovery(&runtime.client, &record.lock, &self.config).await {
                Ok(report) => {
                    record.state = LockState::from_closed(report.closed);
                    if report.battery.is_some() {
                        record.battery_raw = report.battery;
                    }
                    record.last_seen = now;
                    record.stale = false;
                }
                Err(e) => {
                    debug!(
                        lock = record.lock.id,
                        error = %e,
                        "lock poll failed, keeping last state"
                    );
                    record.stale = true;
                }
            }
        }

        self.publish(inventory);
        Ok(())
    }

    /// Drive poll cycles at the configured scan interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "poll cycle failed");
                    }
                }
            }
        }
    }

    // ── Lock commands ────────────────────────────────────────────────

    /// Unlock the door. [heavy, readiness-gated, not auto-retried]
    pub async fn open(&self, lock_id: i64) -> Result<(), CoreError> {
        self.dispatch(lock_id, LockCommand::Open).await
    }

    /// Lock the door. [heavy, readiness-gated, not auto-retried]
    pub async fn close(&self, lock_id: i64) -> Result<(), CoreError> {
        self.dispatch(lock_id, LockCommand::Close).await
    }

    /// Run the lock's travel calibration. [heavy, readiness-gated,
    /// retried with backoff on transport failure]
    pub async fn calibrate(&self, lock_id: i64) -> Result<(), CoreError> {
        self.dispatch(lock_id, LockCommand::Calibrate).await
    }

    /// Re-sync one lock's pairing data with its gateway. [light]
    pub async fn sync(&self, lock_id: i64) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let inventory = guard.as_mut().ok_or(CoreError::NotConnected)?;
        let Inventory { locks, gateways } = inventory;
        let (record, runtime) = resolve(locks, gateways, lock_id)?;
        runtime
            .client
            .locker_synchronize(record.lock.id, &record.lock.share_code)
            .await?;
        Ok(())
    }

    /// Push a firmware update to one lock. [light]
    pub async fn update(&self, lock_id: i64) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let inventory = guard.as_mut().ok_or(CoreError::NotConnected)?;
        let Inventory { locks, gateways } = inventory;
        let (record, runtime) = resolve(locks, gateways, lock_id)?;
        runtime
            .client
            .locker_update(record.lock.id, &record.lock.share_code)
            .await?;
        Ok(())
    }

    async fn dispatch(&self, lock_id: i64, command: LockCommand) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let inventory = guard.as_mut().ok_or(CoreError::NotConnected)?;
        let Inventory { locks, gateways } = inventory;
        let (record, runtime) = resolve(locks, gateways, lock_id)?;

        self.ensure_ready(runtime).await?;

        match command {
            // Open/close are not idempotent from the gateway's point of
            // view: a transport failure leaves the effect unknown, so the
            // first failure surfaces and the next poll observes reality.
            LockCommand::Open => {
                runtime
                    .client
                    .locker_open(record.lock.id, &record.lock.share_code)
                    .await?;
                record.state = LockState::Unlocked;
            }
            LockCommand::Close => {
                runtime
                    .client
                    .locker_close(record.lock.id, &record.lock.share_code)
                    .await?;
                record.state = LockState::Locked;
            }
            LockCommand::Calibrate => {
                calibrate_with_retry(&runtime.client, &record.lock, &self.config).await?;
            }
        }

        record.last_seen = Utc::now();
        record.stale = false;
        self.publish(inventory);
        Ok(())
    }

    /// Poll the gateway's status (light tier) until it reports ready,
    /// within the configured poll budget. The rate limiter spaces the
    /// polls by the light interval automatically.
    async fn ensure_ready(&self, runtime: &mut GatewayRuntime) -> Result<(), CoreError> {
        for attempt in 1..=self.config.readiness_max_polls {
            match runtime.client.status().await {
                Ok(report) => {
                    runtime.observe_status(&report.status, &self.config.ready_statuses);
                    if runtime.readiness == Readiness::Ready {
                        return Ok(());
                    }
                    debug!(
                        gateway = %runtime.info.address,
                        status = %report.status,
                        attempt,
                        "gateway not ready for heavy operations yet"
                    );
                }
                Err(ref e) if e.is_unreachable() => {
                    runtime
                        .observe_unreachable(&e.to_string(), self.config.unreachable_error_threshold);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::GatewayNotReady {
            gateway: runtime.info.address.to_string(),
            attempts: self.config.readiness_max_polls,
        })
    }

    // ── Snapshot surface ─────────────────────────────────────────────

    /// The current per-lock state, replaced wholesale each poll cycle.
    pub fn locks(&self) -> Arc<Vec<Arc<LockSnapshot>>> {
        self.snapshot.load_full()
    }

    /// One lock's current snapshot, if it exists in the inventory.
    pub fn lock(&self, lock_id: i64) -> Option<Arc<LockSnapshot>> {
        self.snapshot
            .load()
            .iter()
            .find(|s| s.id == lock_id)
            .cloned()
    }

    fn publish(&self, inventory: &Inventory) {
        let snapshots = inventory
            .locks
            .iter()
            .map(|r| {
                Arc::new(LockSnapshot {
                    id: r.lock.id,
                    name: r.lock.name.clone(),
                    state: r.state,
                    battery_percent: r.battery_raw.map(battery::calibrate),
                    last_seen: r.last_seen,
                    stale: r.stale,
                })
            })
            .collect();
        self.snapshot.store(Arc::new(snapshots));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Resolve a lock id to its record and serving gateway runtime.
fn resolve<'a>(
    locks: &'a mut [LockRecord],
    gateways: &'a mut HashMap<i64, GatewayRuntime>,
    lock_id: i64,
) -> Result<(&'a mut LockRecord, &'a mut GatewayRuntime), CoreError> {
    let record = locks
        .iter_mut()
        .find(|r| r.lock.id == lock_id)
        .ok_or(CoreError::LockNotFound { id: lock_id })?;
    let gateway_id = record
        .lock
        .gateway_id
        .ok_or(CoreError::NoGateway { lock_id })?;
    let runtime = gateways.get_mut(&gateway_id).ok_or_else(|| {
        warn!(
            lock = lock_id,
            gateway = gateway_id,
            "inventory inconsistent: lock references a gateway absent from this snapshot"
        );
        CoreError::NoGateway { lock_id }
    })?;
    Ok((record, runtime))
}

/// `locker_status` with the recovery ladder observed on real hardware:
/// transport resets get the bounded exponential backoff, busy codes wait
/// out the lock's physical travel, clock skew triggers one gateway
/// re-sync, and the transient radio codes get a single retry.
async fn locker_status_with_recovery(
    client: &GatewayClient,
    lock: &Lock,
    config: &ClientConfig,
) -> Result<LockerStatusReport, ApiError> {
    let mut backoff = config.retry_backoff.iter();
    let mut busy_retries = 0u32;
    let mut synced_clock = false;
    let mut transient_retry_used = false;

    loop {
        match client.locker_status(lock.id, &lock.share_code).await {
            Ok(report) => return Ok(report),

            Err(e) if e.is_unreachable() => match backoff.next() {
                Some(wait) => {
                    debug!(lock = lock.id, ?wait, "gateway reset connection, backing off");
                    tokio::time::sleep(*wait).await;
                }
                None => return Err(e),
            },

            Err(e) if e.is_gateway_busy() => {
                if busy_retries >= 2 {
                    return Err(e);
                }
                busy_retries += 1;
                debug!(
                    lock = lock.id,
                    attempt = busy_retries,
                    "gateway busy, waiting out lock travel"
                );
                tokio::time::sleep(config.busy_retry_delay).await;
            }

            Err(e) if e.is_clock_skew() => {
                if synced_clock {
                    return Err(e);
                }
                synced_clock = true;
                info!(lock = lock.id, "gateway clock out of sync, re-synchronizing");
                client.synchronize().await?;
            }

            Err(e) if e.is_transient_locker_failure() => {
                if transient_retry_used {
                    return Err(e);
                }
                transient_retry_used = true;
                debug!(lock = lock.id, "transient locker error, retrying once");
            }

            Err(e) => return Err(e),
        }
    }
}

/// `locker_calibrate` with backoff on transport failure only.
/// Calibration is safe to re-issue; open/close are not.
async fn calibrate_with_retry(
    client: &GatewayClient,
    lock: &Lock,
    config: &ClientConfig,
) -> Result<(), ApiError> {
    let mut backoff = config.retry_backoff.iter();
    loop {
        match client.locker_calibrate(lock.id, &lock.share_code).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_unreachable() => match backoff.next() {
                Some(wait) => {
                    debug!(lock = lock.id, ?wait, "calibrate hit transport failure, backing off");
                    tokio::time::sleep(*wait).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}
