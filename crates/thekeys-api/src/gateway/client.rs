// Gateway HTTP client
//
// Sole owner of the local protocol's framing: plain-HTTP endpoints,
// form-encoded bodies, HMAC-signed locker operations, and the implicit
// `{"status": ...}` envelope. Every operation first acquires a
// rate-limiter slot of its tier; the limiter state is per-instance, so
// clients for different gateways never contend.
//
// Transport failures (refused/reset connections, timeouts) surface as
// `GatewayUnreachable` and are never retried here. The documented
// failure mode is a gateway mid-scan resetting connections on heavy
// calls -- whether and when to retry is the orchestrator's call.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, trace};
use url::Url;

use crate::address::GatewayAddress;
use crate::error::Error;
use crate::gateway::models::{LockerStatusReport, RawStatusReport, StatusReport};
use crate::rate_limit::{RateLimiter, Tier};
use crate::transport::TransportConfig;

type HmacSha256 = Hmac<Sha256>;

/// HTTP client for one gateway device's local API.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    address: GatewayAddress,
    limiter: RateLimiter,
}

impl GatewayClient {
    /// Create a client for the gateway at `address`, owning `limiter`.
    pub fn new(
        address: GatewayAddress,
        limiter: RateLimiter,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_gateway_client()?,
            base_url: address.base_url()?,
            address,
            limiter,
        })
    }

    /// The gateway's validated network address.
    pub fn address(&self) -> &GatewayAddress {
        &self.address
    }

    // ── Gateway operations ───────────────────────────────────────────

    /// Query the gateway's self-reported status. [light]
    ///
    /// `GET /status`
    pub async fn status(&self) -> Result<StatusReport, Error> {
        self.limiter.acquire(Tier::Light).await;
        let raw: RawStatusReport = self.get("status").await?;
        Ok(raw.into())
    }

    /// Ask the gateway to refresh its internal lock list and clock. [light]
    ///
    /// `GET /synchronize`
    pub async fn synchronize(&self) -> Result<(), Error> {
        self.limiter.acquire(Tier::Light).await;
        let _: serde_json::Value = self.get("synchronize").await?;
        Ok(())
    }

    /// Trigger a gateway firmware update check. [light]
    ///
    /// `POST /update` -- the `fake` field is required by the firmware.
    pub async fn update(&self) -> Result<(), Error> {
        self.limiter.acquire(Tier::Light).await;
        let _: serde_json::Value = self.post("update", &[("fake", "true".to_owned())]).await?;
        Ok(())
    }

    // ── Locker operations ────────────────────────────────────────────

    /// Query a lock's physical state through the gateway. [heavy]
    ///
    /// `POST /locker_status` -- the historically fragile call; a gateway
    /// mid-scan may reset the connection.
    pub async fn locker_status(
        &self,
        identifier: i64,
        share_code: &str,
    ) -> Result<LockerStatusReport, Error> {
        self.limiter.acquire(Tier::Heavy).await;
        self.post("locker_status", &signed_form(identifier, share_code)).await
    }

    /// Drive the lock open. [heavy]
    ///
    /// `POST /open`
    pub async fn locker_open(&self, identifier: i64, share_code: &str) -> Result<(), Error> {
        self.limiter.acquire(Tier::Heavy).await;
        let _: serde_json::Value = self.post("open", &signed_form(identifier, share_code)).await?;
        Ok(())
    }

    /// Drive the lock closed. [heavy]
    ///
    /// `POST /close`
    pub async fn locker_close(&self, identifier: i64, share_code: &str) -> Result<(), Error> {
        self.limiter.acquire(Tier::Heavy).await;
        let _: serde_json::Value = self.post("close", &signed_form(identifier, share_code)).await?;
        Ok(())
    }

    /// Run the lock's travel calibration. [heavy]
    ///
    /// `POST /calibrate`
    pub async fn locker_calibrate(&self, identifier: i64, share_code: &str) -> Result<(), Error> {
        self.limiter.acquire(Tier::Heavy).await;
        let _: serde_json::Value =
            self.post("calibrate", &signed_form(identifier, share_code)).await?;
        Ok(())
    }

    /// Re-sync one lock's pairing data. [light]
    ///
    /// `POST /locker/synchronize`
    pub async fn locker_synchronize(
        &self,
        identifier: i64,
        share_code: &str,
    ) -> Result<(), Error> {
        self.limiter.acquire(Tier::Light).await;
        let _: serde_json::Value = self
            .post("locker/synchronize", &signed_form(identifier, share_code))
            .await?;
        Ok(())
    }

    /// Push a firmware update to one lock. [light]
    ///
    /// `POST /locker/update`
    pub async fn locker_update(&self, identifier: i64, share_code: &str) -> Result<(), Error> {
        self.limiter.acquire(Tier::Light).await;
        let _: serde_json::Value =
            self.post("locker/update", &signed_form(identifier, share_code)).await?;
        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;
        self.parse_envelope(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;
        self.parse_envelope(resp).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::InvalidUrl)
    }

    /// Connection resets and timeouts become `GatewayUnreachable`;
    /// anything else stays a raw transport error.
    fn classify_transport(&self, e: reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            Error::GatewayUnreachable {
                host: self.address.to_string(),
                reason: e.to_string(),
            }
        } else {
            Error::Transport(e)
        }
    }

    /// Unwrap the gateway's implicit envelope: a missing `status` key or
    /// `"status": "ok"` means success; `"status": "ko"` carries a numeric
    /// failure code.
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let body = resp.text().await.map_err(|e| self.classify_transport(e))?;
        trace!(body = %body, "gateway response");

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if value.get("status").and_then(|s| s.as_str()) == Some("ko") {
            return Err(Error::GatewayOperation {
                code: value.get("code").and_then(serde_json::Value::as_i64).unwrap_or(-1),
                message: value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("gateway reported failure")
                    .to_owned(),
            });
        }

        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Form body for locker operations: the lock identifier plus a signed
/// timestamp. The gateway verifies `hash` against the share code it
/// holds for that lock, so a skewed gateway clock rejects these
/// (error code 38) until a `synchronize()`.
fn signed_form(identifier: i64, share_code: &str) -> [(&'static str, String); 3] {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
        .to_string();

    let mut mac = HmacSha256::new_from_slice(share_code.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(ts.as_bytes());
    let hash = BASE64.encode(mac.finalize().into_bytes());

    [
        ("identifier", identifier.to_string()),
        ("ts", ts),
        ("hash", hash),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_form_is_verifiable() {
        let form = signed_form(3723, "secret-share-code");
        assert_eq!(form[0].0, "identifier");
        assert_eq!(form[0].1, "3723");

        let ts = &form[1].1;
        let mut mac = HmacSha256::new_from_slice(b"secret-share-code").expect("key");
        mac.update(ts.as_bytes());
        let expected = BASE64.encode(mac.finalize().into_bytes());
        assert_eq!(form[2].1, expected);
    }
}
