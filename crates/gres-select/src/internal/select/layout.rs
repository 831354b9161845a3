use crate::internal::common::error::SelectError;
use crate::internal::gres::resources::{JobResources, McOptions};
use smallvec::SmallVec;

/// Per socket counters of one node; most nodes have at most four sockets.
pub type SocketCounts = SmallVec<[u32; 4]>;

/// Cores allocated to the job on one node, grouped by socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedSockets {
    pub cores_by_sock: SocketCounts,
    pub used_core_cnt: u32,
    pub used_sock_cnt: u32,
}

impl UsedSockets {
    pub fn compute(job_res: &JobResources, job_node_idx: usize) -> crate::Result<Self> {
        let (Some((sockets, cores_per_socket)), Some(offset)) = (
            job_res.socket_layout(job_node_idx),
            job_res.core_offset(job_node_idx),
        ) else {
            return Err(SelectError::InvalidJobResources(format!(
                "invalid socket/core count of job node {job_node_idx}"
            )));
        };
        let cores_per_socket = cores_per_socket as usize;

        let mut used = UsedSockets::default();
        for socket in 0..sockets as usize {
            let begin = offset + socket * cores_per_socket;
            let core_cnt = job_res
                .core_bitmap
                .count_range(begin, begin + cores_per_socket) as u32;
            used.cores_by_sock.push(core_cnt);
            used.used_core_cnt += core_cnt;
            if core_cnt > 0 {
                used.used_sock_cnt += 1;
            }
        }

        if used.used_sock_cnt == 0 {
            return Err(SelectError::InvalidJobResources(format!(
                "no allocated cores found on job node {job_node_idx}"
            )));
        }
        Ok(used)
    }

    #[inline]
    pub fn sock_cnt(&self) -> usize {
        self.cores_by_sock.len()
    }

    #[inline]
    pub fn is_used(&self, socket: usize) -> bool {
        self.cores_by_sock.get(socket).is_some_and(|c| *c > 0)
    }
}

/// Number of tasks of the job placed on every socket of every job node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLayout {
    tasks: Vec<SocketCounts>,
}

fn default_node_tasks() -> SocketCounts {
    // One task on socket 0
    SmallVec::from_elem(1, 1)
}

impl TaskLayout {
    /// Distributes the job's tasks over the allocated cores.
    ///
    /// Every allocated core takes `ntasks_per_core` tasks (or as many tasks as fit
    /// into its threads), limited by tasks per node and tasks per socket. With
    /// overcommit, tasks that did not fit are then spread round robin over sockets
    /// with allocated cores.
    pub fn compute(job_res: &JobResources, overcommit: bool, mc: &McOptions) -> Self {
        let mut rem_tasks = mc.ntasks_per_job as i64;
        let cpus_per_task = mc.cpus_per_task() as u32;
        let mut tasks = Vec::with_capacity(job_res.node_count());

        for (job_node_idx, node) in job_res.nodes.iter().enumerate() {
            let (Some((sockets, cores_per_socket)), Some(offset)) = (
                job_res.socket_layout(job_node_idx),
                job_res.core_offset(job_node_idx),
            ) else {
                log::error!("Failed to get socket/core count of job node {job_node_idx}");
                tasks.push(default_node_tasks());
                rem_tasks -= 1;
                continue;
            };

            let node_limit = if mc.ntasks_per_node > 0 {
                mc.ntasks_per_node as u32
            } else if node.tasks > 0 {
                node.tasks
            } else {
                log::error!("Tasks per node not set for job node {job_node_idx}");
                if node.cpus < 1 {
                    log::error!("Failed to get CPU count of job node {job_node_idx}");
                    tasks.push(default_node_tasks());
                    rem_tasks -= 1;
                    continue;
                }
                node.cpus / cpus_per_task
            };

            let threads_per_core = node.threads_per_core.max(1) as u32;
            let cores_per_socket = cores_per_socket as usize;
            let mut node_tasks: SocketCounts = SmallVec::from_elem(0, sockets as usize);
            let mut tasks_on_node = 0u32;

            'sockets: for (socket, socket_tasks) in node_tasks.iter_mut().enumerate() {
                let mut tasks_on_socket = 0u32;
                let mut skip_cores = 0u32;
                let begin = offset + socket * cores_per_socket;
                for core in begin..begin + cores_per_socket {
                    if !job_res.core_bitmap.test(core) {
                        continue;
                    }
                    if skip_cores > 0 {
                        skip_cores -= 1;
                        continue;
                    }
                    let tpc = if mc.ntasks_per_core > 0 {
                        mc.ntasks_per_core as u32
                    } else {
                        let tpc = threads_per_core / cpus_per_task;
                        if tpc < 1 {
                            // A task spans several cores
                            skip_cores = (cpus_per_task / threads_per_core).saturating_sub(1);
                            1
                        } else {
                            tpc
                        }
                    };
                    *socket_tasks += tpc;
                    tasks_on_node += tpc;
                    tasks_on_socket += tpc;
                    rem_tasks -= tpc as i64;

                    if node_limit > 0 {
                        if tasks_on_node > node_limit {
                            let excess = tasks_on_node - node_limit;
                            *socket_tasks -= excess;
                            rem_tasks += excess as i64;
                        }
                        if tasks_on_node >= node_limit {
                            break 'sockets;
                        }
                    }
                    if mc.ntasks_per_socket > 0 {
                        let socket_limit = mc.ntasks_per_socket as u32;
                        if tasks_on_socket > socket_limit {
                            let excess = tasks_on_socket - socket_limit;
                            *socket_tasks -= excess;
                            rem_tasks += excess as i64;
                        }
                        if tasks_on_socket >= socket_limit {
                            break;
                        }
                    }
                }
            }
            tasks.push(node_tasks);
        }

        let mut layout = TaskLayout { tasks };
        if overcommit && rem_tasks > 0 {
            rem_tasks = layout.overcommit_tasks(job_res, rem_tasks);
        }
        if rem_tasks > 0 {
            log::error!("Remaining tasks not zero ({rem_tasks} > 0) after task layout");
        }
        layout
    }

    /// Places one extra task on every socket with an allocated core, node after node,
    /// until no task remains. Returns the number of tasks that could not be placed.
    fn overcommit_tasks(&mut self, job_res: &JobResources, mut rem_tasks: i64) -> i64 {
        while rem_tasks > 0 {
            let before = rem_tasks;
            for (job_node_idx, node_tasks) in self.tasks.iter_mut().enumerate() {
                let (Some((_, cores_per_socket)), Some(offset)) = (
                    job_res.socket_layout(job_node_idx),
                    job_res.core_offset(job_node_idx),
                ) else {
                    continue;
                };
                let cores_per_socket = cores_per_socket as usize;
                for (socket, socket_tasks) in node_tasks.iter_mut().enumerate() {
                    if rem_tasks == 0 {
                        return 0;
                    }
                    let begin = offset + socket * cores_per_socket;
                    if job_res
                        .core_bitmap
                        .count_range(begin, begin + cores_per_socket)
                        > 0
                    {
                        *socket_tasks += 1;
                        rem_tasks -= 1;
                    }
                }
            }
            if rem_tasks == before {
                break;
            }
        }
        rem_tasks
    }

    /// Tasks per socket of a job node, `None` if the node is not part of the layout.
    pub fn node_tasks(&self, job_node_idx: usize) -> Option<&[u32]> {
        self.tasks.get(job_node_idx).map(|t| t.as_slice())
    }
}

/// Count of the job's tasks on a node.
pub fn task_cnt_node(tasks_per_socket: Option<&[u32]>) -> u32 {
    match tasks_per_socket {
        Some(tasks) => tasks.iter().sum(),
        None => {
            log::error!("Tasks per socket are missing");
            1
        }
    }
}
