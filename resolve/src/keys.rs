/// KV key layout for the engine's own records.
///
/// ```text
/// review:{id}                  → msgpack ReviewEntry
/// review-pending:{id}          → marker, present while the entry is unresolved
/// review-group:{group}:{id}    → marker, group membership
/// album:{id}                   → msgpack Identity
/// album-cluster:{id}           → msgpack IdentityCluster
/// scan:{id}                    → msgpack ScanStatus
/// ```
///
/// Similarity collections kept in the same store use the `vec:` namespace
/// owned by the vecstore crate.
pub fn review_key(id: &str) -> String {
    format!("review:{id}")
}

pub const PENDING_PREFIX: &str = "review-pending:";

pub fn pending_key(id: &str) -> String {
    format!("{PENDING_PREFIX}{id}")
}

/// Prefix for listing every entry in a group.
/// Format: "review-group:{group}:"
pub fn group_prefix(group_id: &str) -> String {
    format!("review-group:{group_id}:")
}

pub fn group_key(group_id: &str, id: &str) -> String {
    format!("review-group:{group_id}:{id}")
}

pub fn album_key(id: &str) -> String {
    format!("album:{id}")
}

pub fn album_cluster_key(id: &str) -> String {
    format!("album-cluster:{id}")
}

pub const SCAN_PREFIX: &str = "scan:";

pub fn scan_key(id: &str) -> String {
    format!("{SCAN_PREFIX}{id}")
}
