//! Lease-based leader election
//!
//! Only one operator replica may drive the controllers at a time. Replicas
//! contend for a `coordination.k8s.io/v1` Lease; standbys block in
//! [`LeaderElector::acquire`] until the holder stops renewing.

use crate::constants::OPERATOR_NAMESPACE;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "svcat-controller-manager-operator-lock";
const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace holding the lease: explicit flag, then the pod's service
/// account namespace, then the operator's well-known namespace.
pub fn detect_namespace(explicit: &str) -> String {
    let mounted = std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE).ok();
    resolve_namespace(explicit, mounted.as_deref())
}

fn resolve_namespace(explicit: &str, mounted: Option<&str>) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    mounted
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .unwrap_or(OPERATOR_NAMESPACE)
        .to_string()
}

fn holder(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref())
}

fn is_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let duration_secs = spec
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(LEASE_DURATION_SECS) as i64;

    match spec.and_then(|s| s.renew_time.as_ref()) {
        Some(MicroTime(t)) => now.signed_duration_since(*t).num_seconds() > duration_secs,
        None => true,
    }
}

/// Whether `identity` may write itself into the lease: it already holds it,
/// nobody does, or the holder stopped renewing.
fn can_claim(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> bool {
    match spec
        .and_then(|s| s.holder_identity.as_deref())
        .filter(|holder| !holder.is_empty())
    {
        None => true,
        Some(holder) if holder == identity => true,
        Some(_) => is_expired(spec, now),
    }
}

/// Spec for the lease after `identity` claims or renews it
fn claimed_spec(
    previous: Option<&LeaseSpec>,
    identity: &str,
    now: &MicroTime,
    takeover: bool,
) -> LeaseSpec {
    let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);
    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(LEASE_DURATION_SECS),
        acquire_time: if takeover {
            Some(now.clone())
        } else {
            previous.and_then(|s| s.acquire_time.clone())
        },
        renew_time: Some(now.clone()),
        lease_transitions: Some(if takeover && previous.is_some() {
            transitions + 1
        } else {
            transitions
        }),
        ..Default::default()
    }
}

pub struct LeaderElector {
    lease_api: Api<Lease>,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str) -> Self {
        let lease_api = Api::<Lease>::namespaced(client, namespace);
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("svcat-operator-{:08x}", rand::random::<u32>()));
        info!(identity = %identity, namespace = %namespace, lease = LEASE_NAME, "Initialized leader elector");
        Self { lease_api, identity }
    }

    /// Blocks until the lease is acquired.
    pub async fn acquire(&self) -> anyhow::Result<()> {
        info!(identity = %self.identity, "Waiting to acquire leader lease '{}'", LEASE_NAME);
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return Ok(());
                }
                Ok(false) => {
                    debug!("Lease held by another replica, retrying in {:?}", RETRY_INTERVAL);
                }
                Err(e) => {
                    warn!("Lease acquisition error: {}, retrying in {:?}", e, RETRY_INTERVAL);
                }
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Renews the lease. `Ok(false)` means leadership was lost.
    pub async fn renew(&self) -> anyhow::Result<bool> {
        let lease = self.lease_api.get(LEASE_NAME).await?;
        if holder(&lease) != Some(self.identity.as_str()) {
            return Ok(false);
        }

        let mut updated = lease.clone();
        if let Some(ref mut spec) = updated.spec {
            spec.renew_time = Some(MicroTime(Utc::now()));
        }
        self.replace(&updated).await
    }

    /// Clears the holder so a standby can take over without waiting for expiry.
    pub async fn release(&self) {
        let lease = match self.lease_api.get(LEASE_NAME).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to read lease for release: {}", e);
                return;
            }
        };
        if holder(&lease) != Some(self.identity.as_str()) {
            debug!("Lease not held by this replica, skipping release");
            return;
        }

        let mut updated = lease.clone();
        if let Some(ref mut spec) = updated.spec {
            spec.holder_identity = None;
        }
        match self.replace(&updated).await {
            Ok(true) => info!("Released leader lease"),
            Ok(false) => debug!("Lease changed hands before release"),
            Err(e) => warn!("Failed to release leader lease: {}", e),
        }
    }

    pub fn renew_interval(&self) -> Duration {
        RENEW_INTERVAL
    }

    async fn try_acquire(&self) -> anyhow::Result<bool> {
        let now = MicroTime(Utc::now());

        match self.lease_api.get(LEASE_NAME).await {
            Ok(existing) => {
                let spec = existing.spec.as_ref();
                let ours = holder(&existing) == Some(self.identity.as_str());
                if !can_claim(spec, &self.identity, now.0) {
                    return Ok(false);
                }
                let mut updated = existing.clone();
                updated.spec = Some(claimed_spec(spec, &self.identity, &now, !ours));
                self.replace(&updated).await
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(LEASE_NAME.to_string()),
                        ..Default::default()
                    },
                    spec: Some(claimed_spec(None, &self.identity, &now, true)),
                };
                match self.lease_api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Optimistic write; a conflict means another replica got there first.
    async fn replace(&self, lease: &Lease) -> anyhow::Result<bool> {
        match self
            .lease_api
            .replace(LEASE_NAME, &PostParams::default(), lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                warn!("Lease conflict, another replica holds the lock");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
