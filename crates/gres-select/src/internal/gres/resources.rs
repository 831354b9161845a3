use crate::define_id_type;
use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::config::JobGresFlags;
use serde::{Deserialize, Serialize};

// Global index of a node in the cluster.
define_id_type!(NodeId, u32);

pub type JobId = u32;

/// Socket/core geometry of one node allocated to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobNodeLayout {
    pub node_id: NodeId,
    pub sockets: u16,
    pub cores_per_socket: u16,
    pub threads_per_core: u16,
    /// Tasks placed on this node by the node selection, 0 if unknown
    pub tasks: u32,
    /// CPUs used by the job on this node
    pub cpus: u32,
}

impl JobNodeLayout {
    #[inline]
    pub fn core_count(&self) -> usize {
        self.sockets as usize * self.cores_per_socket as usize
    }
}

/// Cores allocated to a job, already decided by node/core selection.
///
/// `core_bitmap` is the concatenation of per-node core bitmaps in the order of `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResources {
    pub nodes: Vec<JobNodeLayout>,
    pub core_bitmap: Bitmap,
    /// Number of nodes in the cluster; per-node selection vectors are sized by it
    pub cluster_node_cnt: usize,
}

impl JobResources {
    pub fn new(nodes: Vec<JobNodeLayout>, core_bitmap: Bitmap, cluster_node_cnt: usize) -> Self {
        JobResources {
            nodes,
            core_bitmap,
            cluster_node_cnt,
        }
    }

    /// Offset of the first core of `job_node_idx` within `core_bitmap`.
    pub fn core_offset(&self, job_node_idx: usize) -> Option<usize> {
        if job_node_idx >= self.nodes.len() {
            return None;
        }
        Some(
            self.nodes[..job_node_idx]
                .iter()
                .map(|n| n.core_count())
                .sum(),
        )
    }

    /// Sockets and cores per socket of `job_node_idx`, `None` if unknown.
    pub fn socket_layout(&self, job_node_idx: usize) -> Option<(u16, u16)> {
        self.nodes
            .get(job_node_idx)
            .filter(|n| n.sockets > 0 && n.cores_per_socket > 0)
            .map(|n| (n.sockets, n.cores_per_socket))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Length of per-node selection vectors; covers every node of the job even
    /// if `cluster_node_cnt` is not set.
    pub fn node_vector_len(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.node_id.as_num() as usize + 1)
            .max()
            .unwrap_or(0)
            .max(self.cluster_node_cnt)
    }
}

/// Multi-core options of the job (task geometry requests).
/// Zero means "not requested".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McOptions {
    pub cpus_per_task: u16,
    pub ntasks_per_job: u32,
    pub ntasks_per_node: u16,
    pub ntasks_per_socket: u16,
    pub ntasks_per_core: u16,
    pub sockets_per_node: u16,
}

impl McOptions {
    #[inline]
    pub fn cpus_per_task(&self) -> u16 {
        self.cpus_per_task.max(1)
    }
}

/// Everything about the job that device selection reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSelectInfo {
    pub job_id: JobId,
    pub flags: JobGresFlags,
    pub overcommit: bool,
    pub mc: McOptions,
    pub resources: JobResources,
}

impl JobSelectInfo {
    #[inline]
    pub fn enforce_binding(&self) -> bool {
        self.flags.contains(JobGresFlags::ENFORCE_BIND)
    }

    #[inline]
    pub fn one_task_per_sharing(&self) -> bool {
        self.flags.contains(JobGresFlags::ONE_TASK_PER_SHARING)
    }
}
