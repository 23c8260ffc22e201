//! Helpers for applying, merging and hashing Kubernetes objects

mod apply;
mod hash;
mod merge;

pub use apply::{
    apply_config_map, apply_daemon_set, expected_daemon_set_generation, set_daemon_set_generation,
    sync_config_map,
};
pub use hash::{config_map_hash, input_hashes, secret_hash, InputRef};
pub use merge::{ensure_object_meta, is_subset, merge_config, merge_config_map};
