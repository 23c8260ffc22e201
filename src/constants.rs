//! Well-known names shared by the controllers.

/// Name of the singleton operator config and of the Proxy config.
pub const OPERATOR_CONFIG_NAME: &str = "cluster";

/// Namespace the controller manager operand runs in.
pub const TARGET_NAMESPACE: &str = "openshift-service-catalog-controller-manager";

/// Namespace the operator itself runs in.
pub const OPERATOR_NAMESPACE: &str = "openshift-service-catalog-controller-manager-operator";

/// Source namespace of the `client-ca` bundle.
pub const KUBE_APISERVER_NAMESPACE: &str = "openshift-kube-apiserver";

/// Operand DaemonSet name.
pub const DAEMON_SET_NAME: &str = "controller-manager";

/// Annotation carrying the release version on the operand DaemonSet.
pub const VERSION_ANNOTATION: &str = "release.openshift.io/version";

/// Pod template annotation bumped to force a rollout.
pub const FORCE_ROLLOUT_ANNOTATION: &str = "operator.openshift.io/force";

pub const TRUSTED_CA_BUNDLE: &str = "trusted-ca-bundle";
pub const CLIENT_CA: &str = "client-ca";
pub const SERVING_CERT: &str = "serving-cert";

/// ClusterOperator this operator reports through.
pub const CLUSTER_OPERATOR_NAME: &str = "service-catalog-controller-manager";

/// Field manager used for server-side apply and the event reporter.
pub const FIELD_MANAGER: &str = "svcat-controller-manager-operator";
