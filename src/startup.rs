//! Operator startup helpers

use crate::client::ClusterClient;
use crate::constants::OPERATOR_CONFIG_NAME;
use crate::crd::ServiceCatalogControllerManager;
use crate::error::Result;
use std::time::Duration;
use tracing::info;

/// Interval between checks for the operator config
pub const OPERATOR_CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Block until the `cluster` operator config exists.
///
/// Checks immediately, then every `interval`. A missing object keeps the
/// wait going; any other error is returned.
pub async fn wait_for_operator_config<C>(
    client: &C,
    interval: Duration,
) -> Result<ServiceCatalogControllerManager>
where
    C: ClusterClient + ?Sized,
{
    info!(
        name = OPERATOR_CONFIG_NAME,
        "Waiting for ServiceCatalogControllerManager to exist"
    );
    loop {
        match client.get_operator_config(OPERATOR_CONFIG_NAME).await {
            Ok(Some(config)) => return Ok(config),
            Ok(None) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
}
