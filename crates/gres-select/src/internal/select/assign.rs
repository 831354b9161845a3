use crate::internal::common::error::SelectError;
use crate::internal::gres::config::SelectConfig;
use crate::internal::gres::job::{GresCounter, GresJobState, JobGresIndex, JobGresList};
use crate::internal::gres::resources::{JobSelectInfo, NodeId};
use crate::internal::gres::sock::SockGres;
use crate::internal::select::dispatch::{
    JobFini, set_job_bits1, set_job_bits2, set_node_bits, set_sock_bits, set_task_bits,
};
use crate::internal::select::layout::{TaskLayout, UsedSockets, task_cnt_node};
use crate::internal::select::shared::{set_shared_node_bits, set_shared_task_bits};

/// Bookkeeping of one job node, built on first use by any of its device types.
struct NodeContext<'a> {
    job: &'a JobSelectInfo,
    job_node_idx: usize,
    node_id: NodeId,
    rem_node_cnt: usize,
    used: Option<UsedSockets>,
}

impl NodeContext<'_> {
    fn used_sockets(&mut self) -> crate::Result<&UsedSockets> {
        let used = match self.used.take() {
            Some(used) => used,
            None => UsedSockets::compute(&self.job.resources, self.job_node_idx)
                .inspect_err(|e| log::error!("Job {}: {e}", self.job.job_id))?,
        };
        Ok(self.used.insert(used))
    }
}

/// Device count of a node without topology table; only the count is selected.
fn node_count_without_topology(
    sock_gres: &SockGres,
    gres: &GresJobState,
    used: Option<&UsedSockets>,
    tasks: Option<&[u32]>,
    rem_node_cnt: usize,
) -> u64 {
    match gres.counter() {
        GresCounter::PerNode(count) => count,
        GresCounter::PerSocket(count) => count * used.map(|u| u.used_sock_cnt).unwrap_or(0) as u64,
        GresCounter::PerTask(count) => count * task_cnt_node(tasks) as u64,
        GresCounter::PerJob(count) => {
            let node_state = &sock_gres.node_state;
            let avail = node_state.gres_cnt_avail as i64 - node_state.gres_cnt_alloc as i64;
            // At least one device stays for every remaining node
            let max_gres = count as i64 - gres.total_gres as i64 - (rem_node_cnt as i64 - 1);
            avail.min(max_gres).max(0) as u64
        }
        GresCounter::None => 0,
    }
}

fn select_node_gres(
    ctx: &mut NodeContext,
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    tasks: &mut Option<TaskLayout>,
    config: &SelectConfig,
    job_fini: &mut JobFini,
) -> crate::Result<()> {
    let job = ctx.job;
    let node_id = ctx.node_id;
    let counter = gres.counter();
    let used = match counter {
        GresCounter::PerNode(_) | GresCounter::PerSocket(_) | GresCounter::PerJob(_) => {
            Some(ctx.used_sockets()?.clone())
        }
        GresCounter::PerTask(_) | GresCounter::None => ctx.used.clone(),
    };
    if matches!(counter, GresCounter::PerTask(_)) && tasks.is_none() {
        *tasks = Some(TaskLayout::compute(
            &job.resources,
            job.overcommit,
            &job.mc,
        ));
    }
    let node_tasks = tasks
        .as_ref()
        .and_then(|t| t.node_tasks(ctx.job_node_idx));

    gres.init_node_vectors(job.resources.node_vector_len());
    if ctx.job_node_idx == 0 {
        gres.total_gres = 0;
    }

    let node_state = &sock_gres.node_state;
    if !node_state.has_topology() {
        let count = node_count_without_topology(
            sock_gres,
            gres,
            used.as_ref(),
            node_tasks,
            ctx.rem_node_cnt,
        );
        gres.gres_cnt_node_select[node_id] = count;
        gres.total_gres += count;
        return Ok(());
    }

    gres.reset_bit_select(node_id, node_state.node_gres_count());
    if gres.is_shared() {
        gres.init_per_bit_select(node_id, node_state.node_gres_count());
        match counter {
            GresCounter::PerNode(_) => {
                let cores_by_sock = used.as_ref().map(|u| u.cores_by_sock.as_slice());
                set_shared_node_bits(
                    sock_gres,
                    gres,
                    node_id,
                    job,
                    config,
                    cores_by_sock.unwrap_or_default(),
                )?
            }
            GresCounter::PerTask(_) => {
                set_shared_task_bits(sock_gres, gres, node_id, job, config, node_tasks)?
            }
            _ => {
                log::error!(
                    "Job {} request of gres/{} lacks valid shared GRES counter",
                    job.job_id,
                    gres.name
                );
                return Err(SelectError::InvalidGres(format!(
                    "gres/{} lacks valid shared GRES counter",
                    gres.name
                )));
            }
        }
        gres.total_gres += gres.node_select(node_id);
        return Ok(());
    }

    match (counter, used.as_ref()) {
        (GresCounter::PerNode(_), Some(used)) => set_node_bits(sock_gres, gres, node_id, used),
        (GresCounter::PerSocket(_), Some(used)) => {
            set_sock_bits(sock_gres, gres, node_id, job, used)
        }
        (GresCounter::PerTask(_), _) => set_task_bits(sock_gres, gres, node_id, job, node_tasks),
        (GresCounter::PerJob(_), Some(used)) => {
            let outcome = set_job_bits1(
                sock_gres,
                gres,
                node_id,
                ctx.job_node_idx,
                ctx.rem_node_cnt,
                job,
                used,
            );
            job_fini.update(outcome);
            // Total is maintained by the per job selection itself
            return Ok(());
        }
        _ => {
            log::error!(
                "Job {} request of gres/{} lacks GRES counter",
                job.job_id,
                gres.name
            );
        }
    }
    gres.total_gres += gres.node_select(node_id);
    Ok(())
}

/// Makes the final device selection of a job.
///
/// `sock_gres_lists` holds the candidate devices of every job node, in the order of
/// `job.resources.nodes`. Selected devices are recorded in `job_gres`; on error the
/// selection state is left partially filled and has to be discarded by the caller.
pub fn select_and_set(
    sock_gres_lists: &[Vec<SockGres>],
    job_gres: &mut JobGresList,
    job: &JobSelectInfo,
    config: &SelectConfig,
) -> crate::Result<()> {
    let node_cnt = job.resources.node_count();
    if sock_gres_lists.len() < node_cnt {
        return Err(SelectError::InvalidJobResources(format!(
            "candidate lists for {} of {node_cnt} nodes",
            sock_gres_lists.len()
        )));
    }

    let mut job_fini = JobFini::NotApplicable;
    let mut tasks: Option<TaskLayout> = None;
    for (job_node_idx, (layout, sock_gres_list)) in
        job.resources.nodes.iter().zip(sock_gres_lists).enumerate()
    {
        let mut ctx = NodeContext {
            job,
            job_node_idx,
            node_id: layout.node_id,
            rem_node_cnt: node_cnt - job_node_idx,
            used: None,
        };
        for sock_gres in sock_gres_list {
            let Some(gres) = job_gres.get_mut(sock_gres.gres_idx) else {
                log::error!(
                    "Job {} has no request for gres index {}",
                    job.job_id,
                    sock_gres.gres_idx
                );
                continue;
            };
            select_node_gres(&mut ctx, sock_gres, gres, &mut tasks, config, &mut job_fini)?;
        }
    }

    if job_fini == JobFini::MoreWork {
        // Devices not on allocated sockets complete the per job requests
        for (layout, sock_gres_list) in job.resources.nodes.iter().zip(sock_gres_lists) {
            job_fini = JobFini::NotApplicable;
            for sock_gres in sock_gres_list {
                let Some(gres) = job_gres.get_mut(sock_gres.gres_idx) else {
                    continue;
                };
                if !matches!(gres.counter(), GresCounter::PerJob(_)) {
                    continue;
                }
                let outcome = set_job_bits2(sock_gres, gres, layout.node_id, job);
                job_fini.update(outcome);
            }
            if job_fini == JobFini::Finished {
                break;
            }
        }
        if job_fini == JobFini::MoreWork {
            log::error!("Job {} failed to satisfy gres-per-job counter", job.job_id);
            return Err(SelectError::NodeNotAvailable);
        }
    }

    #[cfg(debug_assertions)]
    validate_selection(sock_gres_lists, job_gres, job);

    Ok(())
}

#[cfg(debug_assertions)]
fn validate_selection(
    sock_gres_lists: &[Vec<SockGres>],
    job_gres: &JobGresList,
    job: &JobSelectInfo,
) {
    for (idx, gres) in job_gres.iter().enumerate() {
        let gres_idx = JobGresIndex::new(idx as u32);
        let node_states = job
            .resources
            .nodes
            .iter()
            .zip(sock_gres_lists)
            .flat_map(|(layout, list)| {
                list.iter()
                    .filter(move |sg| sg.gres_idx == gres_idx)
                    .map(move |sg| (layout.node_id, sg.node_state.as_ref()))
            });
        gres.validate(node_states);
    }
}
