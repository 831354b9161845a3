use crate::internal::common::bitmap::Bitmap;
use crate::internal::common::error::Unusable;
use crate::internal::gres::job::{GresJobState, JobGresList};
use crate::internal::gres::sock::SockGres;

/// Near device count saturates at this value.
pub const NEAR_GRES_LIMIT: u16 = 0xff;

/// Node properties and job limits the usability filter checks against.
#[derive(Debug, Clone)]
pub struct NodeFilterInput<'a> {
    /// Memory available to the job; `None` when memory is not a consumable resource
    pub avail_mem: Option<u64>,
    /// Maximum CPUs usable on the node (after specialized cores and partition limits)
    pub max_cpus: u16,
    pub enforce_binding: bool,
    /// Cores of this node available to the job
    pub core_bitmap: &'a Bitmap,
    pub sockets: u16,
    pub cores_per_sock: u16,
    pub cpus_per_core: u16,
    /// Sockets requested per node
    pub sock_per_node: Option<u32>,
    /// Tasks requested per node
    pub task_per_node: Option<u16>,
    pub cpus_per_task: u16,
    pub whole_node: bool,
}

/// Device availability reported to the node scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailGres {
    /// Sharing devices usable on the node
    pub avail_gpus: u16,
    /// Sharing devices attached to sockets with available cores
    pub near_gpus: u16,
}

fn avail_cores_by_socket(core_bitmap: &Bitmap, sockets: u16, cores_per_sock: u16) -> Vec<bool> {
    let sockets = sockets as usize;
    let cores_per_sock = cores_per_sock as usize;
    let lim = core_bitmap.len();
    (0..sockets)
        .map(|s| {
            let begin = s * cores_per_sock;
            (begin..begin + cores_per_sock)
                .take_while(|i| *i < lim)
                .any(|i| core_bitmap.test(i))
        })
        .collect()
}

fn min_gres_for_node(sock_gres: &SockGres, gres: &GresJobState, input: &NodeFilterInput) -> u64 {
    let mut min_gres = if input.whole_node {
        sock_gres.total_cnt
    } else if gres.gres_per_node > 0 {
        gres.gres_per_node
    } else {
        1
    };
    if gres.gres_per_socket > 0 {
        let per_node = gres.gres_per_socket * input.sock_per_node.unwrap_or(1) as u64;
        min_gres = min_gres.max(per_node);
    }
    if gres.gres_per_task > 0 {
        let per_node = gres.gres_per_task * input.task_per_node.unwrap_or(1) as u64;
        min_gres = min_gres.max(per_node);
    }
    min_gres
}

/// Determines which devices can be used on this node given the available cores,
/// CPU and memory limits, and removes those that cannot.
///
/// Returns the device availability of the node, or the reason why the node
/// cannot host the job at all.
pub fn remove_unusable(
    sock_gres_list: &mut [SockGres],
    job_gres: &JobGresList,
    input: &NodeFilterInput,
) -> Result<AvailGres, Unusable> {
    filter_sock_gres(sock_gres_list, job_gres, input).inspect_err(|reason| {
        log::debug!("Node cannot satisfy GRES request: {reason}");
    })
}

fn filter_sock_gres(
    sock_gres_list: &mut [SockGres],
    job_gres: &JobGresList,
    input: &NodeFilterInput,
) -> Result<AvailGres, Unusable> {
    let mut avail = AvailGres::default();
    if sock_gres_list.is_empty() {
        return Ok(avail);
    }
    let mut avail_cores_by_sock: Option<Vec<bool>> = None;

    for sock_gres in sock_gres_list.iter_mut() {
        let gres = &job_gres[sock_gres.gres_idx];
        let min_gres = min_gres_for_node(sock_gres, gres, input);

        let cpus_per_gres = gres.effective_cpus_per_gres(input.cpus_per_task);
        if cpus_per_gres > 0 {
            let max_gres = (input.max_cpus / cpus_per_gres) as u64;
            if max_gres == 0
                || gres.gres_per_node > max_gres
                || gres.gres_per_task > max_gres
                || gres.gres_per_socket > max_gres
            {
                return Err(Unusable::InsufficientCpus {
                    max_gres,
                    max_cpus: input.max_cpus,
                    cpus_per_gres,
                });
            }
        }

        let mem_per_gres = gres.effective_mem_per_gres();
        let mem_limit = input.avail_mem.filter(|_| mem_per_gres > 0);
        if let Some(avail_mem) = mem_limit {
            if mem_per_gres > avail_mem {
                return Err(Unusable::InsufficientMemory {
                    mem_per_gres,
                    avail_mem,
                });
            }
            sock_gres.set_max_node_gres(avail_mem / mem_per_gres);
        }

        let near_gres_cnt = if sock_gres.has_socket_counts() {
            let cores_by_sock = avail_cores_by_sock.get_or_insert_with(|| {
                avail_cores_by_socket(input.core_bitmap, input.sockets, input.cores_per_sock)
            });
            let sockets = cores_by_sock.len().min(sock_gres.cnt_by_sock.len());
            if input.enforce_binding {
                for s in (0..sockets).filter(|s| !cores_by_sock[*s]) {
                    sock_gres.total_cnt =
                        sock_gres.total_cnt.saturating_sub(sock_gres.cnt_by_sock[s]);
                    sock_gres.cnt_by_sock[s] = 0;
                    if let Some(bits) = sock_gres.bits_by_sock.get_mut(s) {
                        *bits = None;
                    }
                }
                sock_gres.total_cnt
            } else {
                (0..sockets)
                    .filter(|s| !cores_by_sock[*s])
                    .fold(sock_gres.total_cnt, |near, s| {
                        near.saturating_sub(sock_gres.cnt_by_sock[s])
                    })
            }
        } else {
            sock_gres.total_cnt
        };

        if !input.whole_node && !sock_gres.set_max_node_gres(gres.gres_per_node) {
            sock_gres.set_max_node_gres(gres.gres_per_job);
        }

        // Whole node requests driven by tasks per device are not capped by cores
        if cpus_per_gres > 0 && (gres.ntasks_per_gres.is_none() || !input.whole_node) {
            let cpu_cnt = input.core_bitmap.count() as u64 * input.cpus_per_core as u64;
            let max_gres = cpu_cnt / cpus_per_gres as u64;
            if max_gres == 0 {
                return Err(Unusable::NoCpusForGres {
                    cpu_cnt,
                    cpus_per_gres,
                });
            }
            sock_gres.set_max_node_gres(max_gres);
        }

        if let Some(avail_mem) = mem_limit {
            sock_gres.total_cnt = sock_gres.total_cnt.min(avail_mem / mem_per_gres);
        }

        if sock_gres.total_cnt < min_gres
            || (sock_gres.max_node_gres != 0 && sock_gres.max_node_gres < min_gres)
        {
            return Err(Unusable::TooFewGres {
                min_gres,
                max_node_gres: sock_gres.max_node_gres,
                total_cnt: sock_gres.total_cnt,
            });
        }

        if gres.is_sharing() {
            avail.avail_gpus = avail
                .avail_gpus
                .saturating_add(sock_gres.total_cnt.min(u16::MAX as u64) as u16);
            let near = if sock_gres.max_node_gres != 0 {
                near_gres_cnt.min(sock_gres.max_node_gres)
            } else {
                near_gres_cnt
            };
            avail.near_gpus = (avail.near_gpus as u64 + near).min(NEAR_GRES_LIMIT as u64) as u16;
        }
    }

    Ok(avail)
}
