//! Service Catalog controller manager operator
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig or in-cluster config)
//! IMAGE=quay.io/openshift/origin-service-catalog:latest \
//! RELEASE_VERSION=4.4.0 \
//! svcat-controller-manager-operator
//!
//! # Run with custom log level
//! RUST_LOG=debug svcat-controller-manager-operator --leader-election
//! ```

use clap::Parser;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use svcat_controller_manager_operator::config::DEFAULT_RESYNC_INTERVAL;
use svcat_controller_manager_operator::leader_election::{self, LeaderElector};
use svcat_controller_manager_operator::startup::{
    wait_for_operator_config, OPERATOR_CONFIG_POLL_INTERVAL,
};
use svcat_controller_manager_operator::{
    ClusterOperatorStatusController, ControllerManagerController, EventPublisher,
    KubeClusterClient, KubeEventPublisher, Settings,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Service Catalog controller manager operator
#[derive(Parser, Debug)]
#[command(name = "svcat-controller-manager-operator")]
#[command(version, about = "Manages the OpenShift Service Catalog controller manager")]
struct Args {
    /// Operand image; empty keeps the image from the DaemonSet manifest
    #[arg(long, env = "IMAGE", default_value = "")]
    image: String,

    /// Release version reported on the operand and the ClusterOperator
    #[arg(long, env = "RELEASE_VERSION", default_value = "")]
    release_version: String,

    /// Enable leader election for HA deployments
    #[arg(long, default_value = "false")]
    leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected if empty)
    #[arg(long, default_value = "")]
    leader_election_namespace: String,

    /// Seconds between full resyncs
    #[arg(long, default_value_t = DEFAULT_RESYNC_INTERVAL.as_secs())]
    resync_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting Service Catalog controller manager operator");
    info!("Leader election: {}", args.leader_election);
    if args.image.is_empty() {
        info!("IMAGE not set, keeping the operand image from the manifest");
    }

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let elector = if args.leader_election {
        let ns = leader_election::detect_namespace(&args.leader_election_namespace);
        info!("Leader election namespace: {}", ns);
        let elector = LeaderElector::new(client.clone(), &ns);
        elector.acquire().await?;
        Some(Arc::new(elector))
    } else {
        None
    };

    // Controllers key on the operator config, so do not start them before it exists
    let cluster = KubeClusterClient::new(client.clone());
    wait_for_operator_config(&cluster, OPERATOR_CONFIG_POLL_INTERVAL).await?;
    info!("Found operator config");

    let settings = Settings::new(args.image, args.release_version)
        .with_resync_interval(Duration::from_secs(args.resync_interval_secs));
    let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(
        client.clone(),
        std::env::var("POD_NAME").ok(),
    ));

    let workload_controller = Arc::new(ControllerManagerController::new(
        client.clone(),
        Arc::clone(&events),
        settings.clone(),
    ));
    let status_controller = Arc::new(ClusterOperatorStatusController::new(
        client.clone(),
        Arc::clone(&events),
        settings.resync_interval,
    ));

    let workload_handle = {
        let controller = Arc::clone(&workload_controller);
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.run(client).await {
                error!("Controller manager controller error: {}", e);
            }
        })
    };

    let status_handle = {
        let controller = Arc::clone(&status_controller);
        let client = client.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.run(client).await {
                error!("ClusterOperator status controller error: {}", e);
            }
        })
    };

    // Periodic lease renewal (no-op future when leader election is disabled)
    let elector_for_renew = elector.clone();
    let renew_handle = tokio::spawn(async move {
        match elector_for_renew {
            Some(e) => loop {
                tokio::time::sleep(e.renew_interval()).await;
                match e.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Lost leader lease");
                        break;
                    }
                    Err(err) => {
                        error!("Failed to renew leader lease: {}", err);
                        break;
                    }
                }
            },
            None => std::future::pending::<()>().await,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = workload_handle => {
            if let Err(e) = result {
                error!("Controller manager controller task failed: {}", e);
            }
        }
        result = status_handle => {
            if let Err(e) = result {
                error!("ClusterOperator status controller task failed: {}", e);
            }
        }
        _ = renew_handle => {
            error!("Leader lease lost, initiating shutdown");
        }
    }

    // Release the lease before exiting so a standby replica can take over immediately
    if let Some(e) = &elector {
        e.release().await;
    }

    info!("Operator shutting down");
    Ok(())
}
