use crate::internal::common::error::SelectError;
use crate::internal::gres::config::SelectConfig;
use crate::internal::gres::job::GresJobState;
use crate::internal::gres::node::GresNodeState;
use crate::internal::gres::resources::{JobSelectInfo, NodeId};
use crate::internal::gres::sock::{SocketScope, SockGres};
use crate::internal::select::layout::task_cnt_node;
use std::cmp::Reverse;

/// Constraints of a single shared device pick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedPick {
    /// Only sharing devices that already serve other jobs qualify
    pub busy_only: bool,
    /// The whole remaining demand has to fit on one sharing device
    pub single_dev: bool,
    /// Sharing devices already selected for this job are skipped
    pub no_repeat: bool,
    pub enforce_binding: bool,
}

/// Topology entries ordered by their idle fraction, the least loaded first.
///
/// The idle fraction is scaled by the node's total availability so it can be
/// compared in integers.
pub fn least_loaded_order(node_state: &GresNodeState) -> Vec<usize> {
    let idle: Vec<u64> = node_state
        .topo
        .iter()
        .map(|topo| {
            if topo.gres_cnt_avail == 0 {
                0
            } else {
                topo.free() * node_state.gres_cnt_avail / topo.gres_cnt_avail
            }
        })
        .collect();
    let mut order: Vec<usize> = (0..idle.len()).collect();
    order.sort_by_key(|t| Reverse(idle[*t]));
    order
}

/// Takes shared capacity from the topology entries within `scope` and returns
/// the demand that is still missing.
pub fn pick_shared_gres_topo(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    mut needed: u64,
    scope: SocketScope,
    pick: SharedPick,
    topo_order: Option<&[usize]>,
) -> u64 {
    let Some(sock_bits) = sock_gres.socket_bits(scope) else {
        return needed;
    };
    let node_state = &sock_gres.node_state;
    if !node_state.has_topology() {
        log::error!(
            "Topology counters of gres/{} are not set on node {node_id}",
            gres.name
        );
        return needed;
    }
    let (Some(Some(bit_select)), Some(Some(per_bit_select))) = (
        gres.gres_bit_select.get_mut(node_id),
        gres.gres_per_bit_select.get_mut(node_id),
    ) else {
        log::error!(
            "Shared selection of gres/{} is not initialized on node {node_id}",
            gres.name
        );
        return needed;
    };

    let topo_cnt = node_state.topo.len();
    for j in 0..topo_cnt {
        if needed == 0 {
            break;
        }
        let t = topo_order.and_then(|o| o.get(j).copied()).unwrap_or(j);
        let topo = &node_state.topo[t];
        if gres.type_id.is_some() && gres.type_id != topo.type_id {
            continue;
        }
        if pick.busy_only && topo.gres_cnt_alloc == 0 {
            continue;
        }
        let taken = per_bit_select.get(t).copied().unwrap_or(0);
        let cnt_avail = topo.free().saturating_sub(taken);
        if cnt_avail < if pick.single_dev { needed } else { 1 } {
            continue;
        }
        if !sock_bits.test(t) || t >= bit_select.len() || t >= per_bit_select.len() {
            continue;
        }
        if pick.no_repeat && bit_select.test(t) {
            continue;
        }
        let amount = cnt_avail.min(needed);
        bit_select.set(t);
        per_bit_select[t] += amount;
        gres.gres_cnt_node_select[node_id] += amount;
        needed -= amount;
    }
    needed
}

/// Places shared demand in three passes: sockets marked in `used_sock`, devices
/// without socket affinity and, unless binding is enforced, the remaining sockets.
///
/// Topology entries are scanned in `topo_order` when given, in index order otherwise.
pub fn pick_shared_gres(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    mut needed: u64,
    used_sock: &[u32],
    pick: SharedPick,
    topo_order: Option<&[usize]>,
) -> u64 {
    let is_used = |s: usize| used_sock.get(s).is_some_and(|c| *c > 0);

    for s in (0..sock_gres.sock_cnt).filter(|s| is_used(*s)) {
        if needed == 0 {
            break;
        }
        needed = pick_shared_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Socket(s),
            pick,
            topo_order,
        );
    }
    if needed > 0 {
        needed = pick_shared_gres_topo(
            sock_gres,
            gres,
            node_id,
            needed,
            SocketScope::Any,
            pick,
            topo_order,
        );
    }
    if needed > 0 && !pick.enforce_binding {
        for s in (0..sock_gres.sock_cnt).filter(|s| !is_used(*s)) {
            if needed == 0 {
                break;
            }
            needed = pick_shared_gres_topo(
                sock_gres,
                gres,
                node_id,
                needed,
                SocketScope::Socket(s),
                pick,
                topo_order,
            );
        }
    }
    needed
}

/// Scan order of the topology entries for one node, `None` keeps index order.
fn shared_topo_order(sock_gres: &SockGres, config: &SelectConfig) -> Option<Vec<usize>> {
    config
        .least_loaded_shared()
        .then(|| least_loaded_order(&sock_gres.node_state))
}

/// Selects shared devices for a per node request.
pub fn set_shared_node_bits(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
    config: &SelectConfig,
    used_sock: &[u32],
) -> crate::Result<()> {
    let mut pick = SharedPick {
        busy_only: sock_gres.node_state.use_busy_dev(),
        single_dev: true,
        no_repeat: false,
        enforce_binding: job.enforce_binding(),
    };
    let topo_order = shared_topo_order(sock_gres, config);
    let topo_order = topo_order.as_deref();
    let needed = gres.gres_per_node;
    let mut needed = pick_shared_gres(
        sock_gres,
        gres,
        node_id,
        needed,
        used_sock,
        pick,
        topo_order,
    );

    if needed > 0 && config.multiple_sharing_per_job() {
        pick.single_dev = false;
        needed = pick_shared_gres(
            sock_gres,
            gres,
            node_id,
            needed,
            used_sock,
            pick,
            topo_order,
        );
    }

    if needed > 0 {
        log::error!(
            "Not enough shared gres/{} available to satisfy gres per node request of job {} on node {node_id}",
            gres.name,
            job.job_id
        );
        return Err(SelectError::InvalidGres(format!(
            "not enough shared gres/{} available per node",
            gres.name
        )));
    }
    Ok(())
}

/// Selects shared devices for a per task request.
///
/// Without multiple sharing devices per job the whole demand of the node has to
/// fit on one sharing device. Otherwise every task is placed on its own, starting
/// with the socket the task runs on.
pub fn set_shared_task_bits(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    job: &JobSelectInfo,
    config: &SelectConfig,
    tasks_per_socket: Option<&[u32]>,
) -> crate::Result<()> {
    let Some(tasks_per_socket) = tasks_per_socket else {
        log::error!(
            "Tasks per socket unset for job {} on node {node_id}",
            job.job_id
        );
        return Err(SelectError::InvalidGres(format!(
            "task layout of gres/{} is unknown",
            gres.name
        )));
    };
    let mut pick = SharedPick {
        busy_only: sock_gres.node_state.use_busy_dev(),
        single_dev: true,
        no_repeat: false,
        enforce_binding: job.enforce_binding(),
    };
    let topo_order = shared_topo_order(sock_gres, config);
    let topo_order = topo_order.as_deref();

    if !config.multiple_sharing_per_job() {
        if job.one_task_per_sharing() {
            log::error!(
                "One task per sharing device requires MULTIPLE_SHARING_GRES_PJ to be set. Ignoring."
            );
        }
        let needed = gres.gres_per_task * task_cnt_node(Some(tasks_per_socket)) as u64;
        let needed = pick_shared_gres(
            sock_gres,
            gres,
            node_id,
            needed,
            tasks_per_socket,
            pick,
            topo_order,
        );
        if needed > 0 {
            log::error!(
                "Not enough shared gres/{} available on one sharing device to satisfy gres per task request of job {}",
                gres.name,
                job.job_id
            );
            return Err(SelectError::InvalidGres(format!(
                "not enough shared gres/{} available on one sharing device",
                gres.name
            )));
        }
        return Ok(());
    }

    pick.no_repeat = job.one_task_per_sharing();
    let per_task = gres.gres_per_task;
    let mut used_sock = vec![0u32; sock_gres.sock_cnt];
    for s in 0..sock_gres.sock_cnt {
        used_sock[s] = 1;
        let task_cnt = tasks_per_socket.get(s).copied().unwrap_or(0);
        for _ in 0..task_cnt {
            let needed = pick_shared_gres(
                sock_gres,
                gres,
                node_id,
                per_task,
                &used_sock,
                pick,
                topo_order,
            );
            if needed > 0 {
                log::error!(
                    "Not enough shared gres/{} available to satisfy gres per task request of job {} on node {node_id}",
                    gres.name,
                    job.job_id
                );
                return Err(SelectError::InvalidGres(format!(
                    "not enough shared gres/{} available per task",
                    gres.name
                )));
            }
        }
        used_sock[s] = 0;
    }
    Ok(())
}
