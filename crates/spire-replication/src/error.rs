use thiserror::Error;

/// Errors surfaced by replication operations that the caller must act on
/// (reject and report). Everything else -- duplicate ordinals, unmatched
/// shares, stale TC nodes -- is handled in place by dropping the message and
/// logging, per spec §7's "ordering"/"authentication" rows, and never
/// reaches this type.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Cluster(#[from] spire_cluster::ClusterError),
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
