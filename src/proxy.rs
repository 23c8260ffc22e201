//! Proxy environment for the operand

use crate::crd::Proxy;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Container, EnvVar};

pub const HTTP_PROXY: &str = "HTTP_PROXY";
pub const HTTPS_PROXY: &str = "HTTPS_PROXY";
pub const NO_PROXY: &str = "NO_PROXY";

/// The six proxy variables with their desired values, upper case first.
pub fn proxy_env_vars(proxy: &Proxy) -> Vec<EnvVar> {
    let status = proxy.status.clone().unwrap_or_default();
    let values = [
        (HTTP_PROXY, status.http_proxy),
        (HTTPS_PROXY, status.https_proxy),
        (NO_PROXY, status.no_proxy),
    ];

    let upper = values.iter().map(|(name, value)| (name.to_string(), value.clone()));
    let lower = values
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.clone()));

    upper
        .chain(lower)
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            value_from: None,
        })
        .collect()
}

fn is_proxy_var(name: &str) -> bool {
    [HTTP_PROXY, HTTPS_PROXY, NO_PROXY]
        .iter()
        .any(|var| *var == name || var.to_lowercase() == name)
}

fn env_value<'a>(env: &'a [EnvVar], name: &str) -> &'a str {
    env.iter()
        .find(|var| var.name == name)
        .and_then(|var| var.value.as_deref())
        .unwrap_or_default()
}

/// Whether the live container environment disagrees with the proxy config.
///
/// With a proxy every variable must carry its desired value (a missing one
/// reads as empty). Without one, any non-empty proxy variable is stale.
pub fn proxy_env_changed(existing_env: &[EnvVar], proxy: Option<&Proxy>) -> bool {
    match proxy {
        Some(proxy) => proxy_env_vars(proxy)
            .iter()
            .any(|desired| env_value(existing_env, &desired.name) != desired.value.as_deref().unwrap_or_default()),
        None => existing_env.iter().any(|var| {
            is_proxy_var(&var.name) && !var.value.as_deref().unwrap_or_default().is_empty()
        }),
    }
}

/// Append the proxy variables to the first container of the DaemonSet.
pub fn add_proxy_to_environment(daemon_set: &mut DaemonSet, proxy: &Proxy) {
    if let Some(container) = first_container(daemon_set) {
        container
            .env
            .get_or_insert_with(Vec::new)
            .extend(proxy_env_vars(proxy));
    }
}

pub(crate) fn first_container(daemon_set: &mut DaemonSet) -> Option<&mut Container> {
    daemon_set
        .spec
        .as_mut()?
        .template
        .spec
        .as_mut()?
        .containers
        .first_mut()
}
