use crate::internal::gres::job::GresJobState;
use crate::internal::gres::resources::{JobSelectInfo, NodeId};
use crate::internal::gres::sock::{SocketScope, SockGres};
use crate::internal::select::layout::{SocketCounts, UsedSockets, task_cnt_node};
use crate::internal::select::topo::{LinkOrder, pick_gres_topo};

/// Progress of a per job request across the job's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobFini {
    /// No per job request was processed
    #[default]
    NotApplicable,
    MoreWork,
    Finished,
}

impl JobFini {
    /// Folds the outcome of one device type into the node outcome;
    /// once more work is needed, it stays needed.
    pub fn update(&mut self, outcome: JobFini) {
        if *self != JobFini::MoreWork {
            *self = outcome;
        }
    }
}

fn gres_cnt(gres: &GresJobState, node_id: NodeId) -> usize {
    gres.bit_select(node_id).map(|bits| bits.len()).unwrap_or(0)
}

/// Per node request: one device per used socket, then more devices on used
/// sockets, then devices of any socket, then unused sockets.
pub fn set_node_bits(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    used: &UsedSockets,
) {
    let mut order = LinkOrder::for_node(&sock_gres.node_state, gres_cnt(gres, node_id));
    let mut needed = gres.gres_per_node;

    for s in 0..sock_gres.sock_cnt {
        if needed == 0 {
            break;
        }
        if used.is_used(s) {
            needed -= pick_gres_topo(
                sock_gres,
                gres,
                node_id,
                1,
                SocketScope::Socket(s),
                order.as_mut(),
            );
        }
    }
    if needed > 0 {
        needed -= pick_gres_topo(sock_gres, gres, node_id, 1, SocketScope::Any, order.as_mut());
    }

    for s in 0..sock_gres.sock_cnt {
        if needed == 0 {
            break;
        }
        if used.is_used(s) {
            needed -= pick_gres_topo(
                sock_gres,
                gres,
                node_id,
                needed,
                SocketScope::Socket(s),
                order.as_mut(),
            );
        }
    }
    if needed > 0 {
        needed -= pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Any,
            order.as_mut(),
        );
    }

    for s in 0..sock_gres.sock_cnt {
        if needed == 0 {
            break;
        }
        if !used.is_used(s) {
            needed -= pick_gres_topo(
                sock_gres,
                gres,
                node_id,
                needed,
                SocketScope::Socket(s),
                order.as_mut(),
            );
        }
    }
    if needed > 0 {
        log::debug!(
            "Node {node_id} provides {} of {} gres/{} per node",
            gres.gres_per_node - needed,
            gres.gres_per_node,
            gres.name
        );
    }
}

/// Sockets that receive `gres_per_socket` devices.
///
/// Normally these are the sockets with allocated cores. When the job asked for a
/// different socket count than it got, the set is repaired: missing sockets are
/// taken from unused sockets with enough free devices, surplus sockets with the
/// fewest free devices are dropped.
fn active_sockets(
    sock_gres: &SockGres,
    gres: &GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
    used: &UsedSockets,
) -> SocketCounts {
    let sock_cnt = sock_gres.sock_cnt;
    let mut used_sock = used.cores_by_sock.clone();
    used_sock.resize(sock_cnt, 0);

    let requested = job.mc.sockets_per_node as u32;
    let mut used_cnt = used.used_sock_cnt;
    let node_state = &sock_gres.node_state;
    if requested == 0
        || requested == used_cnt
        || node_state.gres_bit_alloc.is_none()
        || sock_gres.bits_by_sock.iter().all(|b| b.is_none())
    {
        return used_sock;
    }

    if requested > used_cnt {
        log::error!(
            "Inconsistent requested/allocated socket count ({requested} > {used_cnt}) for job {} on node {node_id}",
            job.job_id
        );
        for (s, count) in used_sock.iter_mut().enumerate() {
            if *count > 0 {
                continue;
            }
            let Some(bits) = sock_gres.socket_bits(SocketScope::Socket(s)) else {
                continue;
            };
            let free = node_state.free_in(bits);
            if free == 0 || free < gres.gres_per_socket {
                continue;
            }
            *count = free as u32;
            used_cnt += 1;
            if used_cnt == requested {
                break;
            }
        }
    } else {
        log::debug!(
            "Inconsistent requested/allocated socket count ({requested} < {used_cnt}) for job {} on node {node_id}",
            job.job_id
        );
        for (s, count) in used_sock.iter_mut().enumerate() {
            if *count == 0 {
                continue;
            }
            let Some(bits) = sock_gres.socket_bits(SocketScope::Socket(s)) else {
                continue;
            };
            *count = node_state.free_in(bits) as u32;
            if *count == 0 {
                used_cnt -= 1;
            }
        }
        while used_cnt > requested {
            // Scanning from the top, so the highest index wins ties
            let mut low_sock = None;
            for s in (0..sock_cnt).rev() {
                if used_sock[s] == 0 {
                    continue;
                }
                if low_sock.is_none_or(|low: usize| used_sock[s] < used_sock[low]) {
                    low_sock = Some(s);
                }
            }
            let Some(low_sock) = low_sock else {
                break;
            };
            used_sock[low_sock] = 0;
            used_cnt -= 1;
        }
    }
    used_sock
}

/// Per socket request: `gres_per_socket` devices for every active socket, from
/// the socket itself or from devices without socket affinity.
pub fn set_sock_bits(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
    used: &UsedSockets,
) {
    let used_sock = active_sockets(sock_gres, gres, node_id, job, used);
    let mut order = LinkOrder::for_node(&sock_gres.node_state, gres_cnt(gres, node_id));

    for (s, _) in used_sock.iter().enumerate().filter(|(_, c)| **c > 0) {
        let mut needed = gres.gres_per_socket;
        needed -= pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Socket(s),
            order.as_mut(),
        );
        if needed > 0 {
            pick_gres_topo(
                sock_gres,
                gres,
                node_id,
                needed,
                SocketScope::Any,
                order.as_mut(),
            );
        }
    }
}

/// Per task request: devices for the tasks of every socket, then devices of any
/// socket, then whatever is left on the node.
pub fn set_task_bits(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
    tasks_per_socket: Option<&[u32]>,
) {
    let Some(tasks_per_socket) = tasks_per_socket else {
        log::error!(
            "Tasks per socket unset for job {} on node {node_id}",
            job.job_id
        );
        return;
    };
    let mut order = LinkOrder::for_node(&sock_gres.node_state, gres_cnt(gres, node_id));
    let requested = task_cnt_node(Some(tasks_per_socket)) as u64 * gres.gres_per_task;
    let mut needed = requested;

    for s in 0..sock_gres.sock_cnt {
        let tasks = tasks_per_socket.get(s).copied().unwrap_or(0) as u64;
        if tasks == 0 {
            continue;
        }
        let sock_needed = needed.min(tasks * gres.gres_per_task);
        needed -= pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            sock_needed,
            SocketScope::Socket(s),
            order.as_mut(),
        );
    }
    if needed > 0 {
        needed -= pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Any,
            order.as_mut(),
        );
    }
    for s in 0..sock_gres.sock_cnt {
        if needed == 0 {
            break;
        }
        needed -= pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Socket(s),
            order.as_mut(),
        );
    }

    if needed > 0 {
        log::error!(
            "Insufficient gres/{} allocated for job {} on node {node_id} (gres still needed {needed}, total requested: {requested})",
            gres.name,
            job.job_id
        );
    }
}

/// Removes selected units until at most `max_gres` remain, keeping those best
/// linked to the unit that takes part in the strongest link among the selection.
fn trim_to_best_linked(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    max_gres: i64,
    mut alloc: u64,
) -> u64 {
    let gres_cnt = gres_cnt(gres, node_id);
    let Some(links) = sock_gres.node_state.dense_links(gres_cnt) else {
        return alloc;
    };
    let mut selected: Vec<usize> = match gres.bit_select(node_id) {
        Some(bits) => bits.iter_ones().collect(),
        None => return alloc,
    };

    let mut best_link = -1;
    let mut anchor = None;
    for (i, &s) in selected.iter().enumerate() {
        for &g in &selected[i + 1..] {
            if links.get(s, g) > best_link {
                best_link = links.get(s, g);
                anchor = Some(s);
            }
        }
    }
    let Some(anchor) = anchor else {
        return alloc;
    };

    while alloc as i64 > max_gres {
        let worst = selected
            .iter()
            .enumerate()
            .filter(|(_, g)| **g != anchor)
            .min_by_key(|(_, g)| (links.get(anchor, **g), **g));
        let Some((pos, &worst)) = worst else {
            log::error!("Failed to trim gres/{} selection on node {node_id}", gres.name);
            break;
        };
        gres.unselect_unit(node_id, worst);
        selected.remove(pos);
        alloc -= 1;
    }
    alloc
}

/// Per job request, first pass over the job's nodes.
///
/// Takes this node's share of the job's devices from sockets with allocated
/// cores, keeping at least one device for each of the `rem_nodes - 1` nodes that
/// follow and no more devices than the node's cores can feed.
pub fn set_job_bits1(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job_node_idx: usize,
    rem_nodes: usize,
    job: &JobSelectInfo,
    used: &UsedSockets,
) -> JobFini {
    if job_node_idx == 0 {
        gres.total_gres = 0;
    }
    let mut max_gres = gres.gres_per_job as i64 - gres.total_gres as i64 - (rem_nodes as i64 - 1);
    let gres_cnt = gres_cnt(gres, node_id);
    let cpus_per_core = job
        .resources
        .nodes
        .get(job_node_idx)
        .map(|n| n.threads_per_core)
        .unwrap_or(1) as i64;
    let cpus_per_gres = gres.explicit_cpus_per_gres(job.mc.cpus_per_task()) as i64;
    if cpus_per_gres > 0 {
        max_gres = max_gres.min(used.used_core_cnt as i64 * cpus_per_core / cpus_per_gres);
    }
    let dense_links = sock_gres.node_state.dense_links(gres_cnt).is_some();
    // With links, everything reachable is picked first and trimmed afterwards.
    // At least one device is picked even if the remaining nodes need the rest.
    let pick_gres = if max_gres > 1 && dense_links {
        gres_cnt as u64
    } else {
        max_gres.max(1) as u64
    };

    let mut alloc = 0;
    for s in 0..sock_gres.sock_cnt {
        if alloc >= pick_gres {
            break;
        }
        if used.is_used(s) {
            alloc += pick_gres_topo(
                sock_gres,
                gres,
                node_id,
                pick_gres - alloc,
                SocketScope::Socket(s),
                None,
            );
        }
    }
    if alloc < pick_gres {
        alloc += pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            pick_gres - alloc,
            SocketScope::Any,
            None,
        );
    }
    if alloc == 0 {
        for s in (0..sock_gres.sock_cnt).filter(|s| !used.is_used(*s)) {
            alloc += pick_gres_topo(sock_gres, gres, node_id, 1, SocketScope::Socket(s), None);
            if alloc > 0 {
                break;
            }
        }
    }
    if alloc == 0 {
        log::error!(
            "Job {} failed to find any available gres/{} on node {node_id}",
            job.job_id,
            gres.name
        );
    }

    if alloc as i64 > max_gres {
        alloc = trim_to_best_linked(sock_gres, gres, node_id, max_gres, alloc);
    }
    gres.total_gres += alloc;

    if gres.total_gres >= gres.gres_per_job {
        JobFini::Finished
    } else {
        JobFini::MoreWork
    }
}

/// Per job request, completion pass: takes any free device of the node,
/// preferring those linked to the devices selected in the first pass.
pub fn set_job_bits2(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
) -> JobFini {
    if gres.gres_per_job <= gres.total_gres {
        return JobFini::Finished;
    }
    let Some(selected) = gres.bit_select(node_id) else {
        log::error!(
            "Bit selection of gres/{} is not set for job {} on node {node_id}",
            gres.name,
            job.job_id
        );
        return JobFini::NotApplicable;
    };
    let mut order = LinkOrder::seeded(&sock_gres.node_state, selected.len(), selected);

    for s in 0..sock_gres.sock_cnt {
        if gres.gres_per_job <= gres.total_gres {
            break;
        }
        let needed = gres.gres_per_job - gres.total_gres;
        let picked = pick_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Socket(s),
            order.as_mut(),
        );
        gres.total_gres += picked;
    }
    if gres.gres_per_job > gres.total_gres {
        let needed = gres.gres_per_job - gres.total_gres;
        let picked =
            pick_gres_topo(sock_gres, gres, node_id, needed, SocketScope::Any, order.as_mut());
        gres.total_gres += picked;
    }

    if gres.gres_per_job <= gres.total_gres {
        JobFini::Finished
    } else {
        JobFini::MoreWork
    }
}
