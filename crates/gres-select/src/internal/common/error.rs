use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Invalid generic resource request: {0}")]
    InvalidGres(String),
    #[error("Requested generic resources are not available on allocated nodes")]
    NodeNotAvailable,
    #[error("Invalid job resources: {0}")]
    InvalidJobResources(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::error::Error> for SelectError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Reasons why a node cannot host a job's generic resource request.
///
/// These are not failures of the scheduler; the node is simply skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Unusable {
    #[error(
        "insufficient CPUs for any GRES: max_gres ({max_gres}) = max_cpus ({max_cpus}) / cpus_per_gres ({cpus_per_gres})"
    )]
    InsufficientCpus {
        max_gres: u64,
        max_cpus: u16,
        cpus_per_gres: u16,
    },
    #[error("insufficient memory for any GRES: mem_per_gres ({mem_per_gres}) > avail_mem ({avail_mem})")]
    InsufficientMemory { mem_per_gres: u64, avail_mem: u64 },
    #[error("no GRES fits available cores: cpu_cnt ({cpu_cnt}) / cpus_per_gres ({cpus_per_gres})")]
    NoCpusForGres { cpu_cnt: u64, cpus_per_gres: u16 },
    #[error(
        "min_gres ({min_gres}) is > max_node_gres ({max_node_gres}) or total_cnt ({total_cnt})"
    )]
    TooFewGres {
        min_gres: u64,
        max_node_gres: u64,
        total_cnt: u64,
    },
}
