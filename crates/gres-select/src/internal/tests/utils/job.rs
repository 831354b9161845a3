use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::config::JobGresFlags;
use crate::internal::gres::resources::{
    JobId, JobNodeLayout, JobResources, JobSelectInfo, McOptions, NodeId,
};
use derive_builder::Builder;

#[derive(Builder)]
#[builder(pattern = "owned", derive(Clone), build_fn(name = "finish"))]
pub struct TestJob {
    #[builder(default = "1")]
    job_id: JobId,
    #[builder(default)]
    flags: JobGresFlags,
    #[builder(default)]
    overcommit: bool,
    #[builder(default)]
    cpus_per_task: u16,
    #[builder(default)]
    ntasks_per_job: u32,
    #[builder(default)]
    ntasks_per_node: u16,
    #[builder(default)]
    ntasks_per_socket: u16,
    #[builder(default)]
    ntasks_per_core: u16,
    #[builder(default)]
    sockets_per_node: u16,
    #[builder(default)]
    cluster_node_cnt: usize,
    #[builder(setter(custom), default)]
    nodes: Vec<(JobNodeLayout, Vec<usize>)>,
}

pub use TestJobBuilder as JobBuilder;

impl TestJobBuilder {
    /// Adds a job node with `sockets` x `cores_per_socket` cores, `cores` are
    /// the node-local indices of cores allocated to the job.
    pub fn node(mut self, node_id: u32, sockets: u16, cores_per_socket: u16, cores: &[usize]) -> Self {
        let layout = JobNodeLayout {
            node_id: NodeId::new(node_id),
            sockets,
            cores_per_socket,
            threads_per_core: 1,
            tasks: 0,
            cpus: cores.len() as u32,
        };
        self.nodes
            .get_or_insert_with(Vec::new)
            .push((layout, cores.to_vec()));
        self
    }

    /// Sets the task count of the last added node.
    pub fn tasks(mut self, tasks: u32) -> Self {
        if let Some((layout, _)) = self.nodes.as_mut().and_then(|n| n.last_mut()) {
            layout.tasks = tasks;
        }
        self
    }

    /// Sets threads per core of the last added node.
    pub fn threads_per_core(mut self, threads: u16) -> Self {
        if let Some((layout, cores)) = self.nodes.as_mut().and_then(|n| n.last_mut()) {
            layout.threads_per_core = threads;
            layout.cpus = cores.len() as u32 * threads as u32;
        }
        self
    }

    pub fn enforce_binding(self) -> Self {
        self.flags(JobGresFlags::ENFORCE_BIND)
    }

    pub fn build(self) -> JobSelectInfo {
        let TestJob {
            job_id,
            flags,
            overcommit,
            cpus_per_task,
            ntasks_per_job,
            ntasks_per_node,
            ntasks_per_socket,
            ntasks_per_core,
            sockets_per_node,
            cluster_node_cnt,
            nodes,
        } = self.finish().unwrap();

        let core_cnt = nodes.iter().map(|(layout, _)| layout.core_count()).sum();
        let mut core_bitmap = Bitmap::new(core_cnt);
        let mut offset = 0;
        for (layout, cores) in &nodes {
            for core in cores {
                core_bitmap.set(offset + core);
            }
            offset += layout.core_count();
        }
        let layouts: Vec<JobNodeLayout> = nodes.into_iter().map(|(layout, _)| layout).collect();

        JobSelectInfo {
            job_id,
            flags,
            overcommit,
            mc: McOptions {
                cpus_per_task,
                ntasks_per_job,
                ntasks_per_node,
                ntasks_per_socket,
                ntasks_per_core,
                sockets_per_node,
            },
            resources: JobResources::new(layouts, core_bitmap, cluster_node_cnt),
        }
    }
}
