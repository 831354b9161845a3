use crate::define_id_type;
use crate::internal::common::bitmap::Bitmap;
use crate::internal::common::index::IndexVec;
use crate::internal::gres::config::GresConfigFlags;
use crate::internal::gres::node::GresNodeState;
use crate::internal::gres::resources::NodeId;
use serde::{Deserialize, Serialize};

// Position of a device type within the job's request list.
define_id_type!(JobGresIndex, u32);

pub type JobGresList = IndexVec<JobGresIndex, GresJobState>;

/// The request counter that drives selection of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GresCounter {
    PerNode(u64),
    PerSocket(u64),
    PerTask(u64),
    PerJob(u64),
    None,
}

/// Request of one device type by a job together with its selection state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GresJobState {
    pub name: String,
    /// Restricts the request to topology entries of this type
    pub type_id: Option<u32>,
    pub config_flags: GresConfigFlags,

    pub gres_per_job: u64,
    pub gres_per_node: u64,
    pub gres_per_socket: u64,
    pub gres_per_task: u64,

    pub cpus_per_gres: u16,
    pub def_cpus_per_gres: u16,
    pub ntasks_per_gres: Option<u16>,
    pub mem_per_gres: u64,
    pub def_mem_per_gres: u64,

    /// Size of the per-node vectors below (0 until the first node is visited)
    pub total_node_cnt: usize,
    pub total_gres: u64,
    pub gres_cnt_node_select: IndexVec<NodeId, u64>,
    pub gres_bit_select: IndexVec<NodeId, Option<Bitmap>>,
    /// Amount taken from each unit of a shared device
    pub gres_per_bit_select: IndexVec<NodeId, Option<Vec<u64>>>,
}

impl GresJobState {
    pub fn new(name: &str) -> Self {
        GresJobState {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn counter(&self) -> GresCounter {
        if self.gres_per_node > 0 {
            GresCounter::PerNode(self.gres_per_node)
        } else if self.gres_per_socket > 0 {
            GresCounter::PerSocket(self.gres_per_socket)
        } else if self.gres_per_task > 0 {
            GresCounter::PerTask(self.gres_per_task)
        } else if self.gres_per_job > 0 {
            GresCounter::PerJob(self.gres_per_job)
        } else {
            GresCounter::None
        }
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.config_flags.contains(GresConfigFlags::SHARED)
    }

    #[inline]
    pub fn is_sharing(&self) -> bool {
        self.config_flags.contains(GresConfigFlags::SHARING)
    }

    /// Explicit CPUs per device, or CPUs derived from tasks per device.
    pub fn explicit_cpus_per_gres(&self, cpus_per_task: u16) -> u16 {
        if self.cpus_per_gres > 0 {
            self.cpus_per_gres
        } else if let Some(ntasks) = self.ntasks_per_gres {
            ntasks.saturating_mul(cpus_per_task)
        } else {
            0
        }
    }

    /// Like [`GresJobState::explicit_cpus_per_gres`] but falls back to the configured default.
    pub fn effective_cpus_per_gres(&self, cpus_per_task: u16) -> u16 {
        match self.explicit_cpus_per_gres(cpus_per_task) {
            0 => self.def_cpus_per_gres,
            cpus => cpus,
        }
    }

    pub fn effective_mem_per_gres(&self) -> u64 {
        if self.mem_per_gres > 0 {
            self.mem_per_gres
        } else {
            self.def_mem_per_gres
        }
    }

    /// Allocates the per-node bookkeeping on the first visit of the job's nodes.
    pub(crate) fn init_node_vectors(&mut self, node_cnt: usize) {
        if self.total_node_cnt == 0 {
            self.total_node_cnt = node_cnt;
            self.total_gres = 0;
        }
        if self.gres_cnt_node_select.len() < self.total_node_cnt {
            self.gres_cnt_node_select.resize(self.total_node_cnt, 0);
        }
    }

    /// Starts a fresh bit selection of `gres_cnt` units on `node_id`.
    pub(crate) fn reset_bit_select(&mut self, node_id: NodeId, gres_cnt: usize) {
        if self.gres_bit_select.len() < self.total_node_cnt {
            self.gres_bit_select.resize(self.total_node_cnt, None);
        }
        self.gres_bit_select[node_id] = Some(Bitmap::new(gres_cnt));
        self.gres_cnt_node_select[node_id] = 0;
    }

    pub(crate) fn init_per_bit_select(&mut self, node_id: NodeId, gres_cnt: usize) {
        if self.gres_per_bit_select.len() < self.total_node_cnt {
            self.gres_per_bit_select.resize(self.total_node_cnt, None);
        }
        self.gres_per_bit_select[node_id] = Some(vec![0; gres_cnt]);
    }

    pub fn bit_select(&self, node_id: NodeId) -> Option<&Bitmap> {
        self.gres_bit_select.get(node_id).and_then(|b| b.as_ref())
    }

    pub fn per_bit_select(&self, node_id: NodeId) -> Option<&[u64]> {
        self.gres_per_bit_select
            .get(node_id)
            .and_then(|b| b.as_deref())
    }

    pub fn node_select(&self, node_id: NodeId) -> u64 {
        self.gres_cnt_node_select
            .get(node_id)
            .copied()
            .unwrap_or(0)
    }

    /// Marks `unit` as selected on `node_id`; returns false if it already was.
    pub(crate) fn select_unit(&mut self, node_id: NodeId, unit: usize) -> bool {
        let Some(Some(bits)) = self.gres_bit_select.get_mut(node_id) else {
            return false;
        };
        if bits.test(unit) {
            return false;
        }
        bits.set(unit);
        self.gres_cnt_node_select[node_id] += 1;
        true
    }

    pub(crate) fn unselect_unit(&mut self, node_id: NodeId, unit: usize) {
        if let Some(Some(bits)) = self.gres_bit_select.get_mut(node_id) {
            if bits.test(unit) {
                bits.clear(unit);
                self.gres_cnt_node_select[node_id] -= 1;
            }
        }
    }

    /// Checks selection invariants against the inventories the selection was made from.
    pub fn validate<'a>(&self, node_states: impl Iterator<Item = (NodeId, &'a GresNodeState)>) {
        assert_eq!(
            self.gres_cnt_node_select.iter().sum::<u64>(),
            self.total_gres,
            "selected counts of gres/{} do not sum up to the total",
            self.name
        );
        for (node_id, node_state) in node_states {
            let Some(bits) = self.bit_select(node_id) else {
                continue;
            };
            if self.is_shared() {
                // Sharing devices may be busy, only their remaining room matters
                if let Some(per_bit) = self.per_bit_select(node_id) {
                    for (t, &cnt) in per_bit.iter().enumerate() {
                        let free = node_state.topo.get(t).map_or(0, |topo| topo.free());
                        assert!(
                            cnt <= free,
                            "gres/{} oversubscribed sharing device {t} on node {node_id}",
                            self.name
                        );
                    }
                }
                continue;
            }
            if let Some(alloc) = &node_state.gres_bit_alloc {
                assert!(
                    !bits.intersects(alloc),
                    "gres/{} selected units allocated to other jobs on node {node_id}",
                    self.name
                );
            }
            assert_eq!(bits.count() as u64, self.node_select(node_id));
        }
    }
}
