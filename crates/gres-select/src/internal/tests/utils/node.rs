use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::config::GresConfigFlags;
use crate::internal::gres::job::JobGresIndex;
use crate::internal::gres::node::{GresNodeState, LinkMatrix, TopoEntry};
use crate::internal::gres::sock::SockGres;
use std::rc::Rc;

/// Builds the device inventory of a node.
#[derive(Default, Clone)]
pub struct NodeBuilder {
    topo: Vec<TopoEntry>,
    allocated: Vec<usize>,
    links: Option<LinkMatrix>,
    flags: GresConfigFlags,
}

impl NodeBuilder {
    /// Node with `count` exclusive units, one topology entry per unit.
    pub fn units(count: usize) -> Self {
        NodeBuilder {
            topo: (0..count)
                .map(|_| TopoEntry {
                    gres_cnt_avail: 1,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Node with sharing devices given as (available, allocated) counts.
    /// Devices with any allocation are marked busy in the allocation bitmap.
    pub fn shared(units: &[(u64, u64)]) -> Self {
        NodeBuilder {
            allocated: units
                .iter()
                .enumerate()
                .filter(|(_, (_, alloc))| *alloc > 0)
                .map(|(unit, _)| unit)
                .collect(),
            topo: units
                .iter()
                .map(|(avail, alloc)| TopoEntry {
                    gres_cnt_avail: *avail,
                    gres_cnt_alloc: *alloc,
                    ..Default::default()
                })
                .collect(),
            flags: GresConfigFlags::SHARED,
            ..Default::default()
        }
    }

    pub fn allocated(mut self, units: &[usize]) -> Self {
        self.allocated.extend_from_slice(units);
        for unit in units {
            self.topo[*unit].gres_cnt_alloc = self.topo[*unit].gres_cnt_avail;
        }
        self
    }

    /// Sets a symmetric link between two units; other links stay 0.
    pub fn link(mut self, a: usize, b: usize, value: i32) -> Self {
        let len = self.topo.len();
        self.links
            .get_or_insert_with(|| LinkMatrix::new(len))
            .set(a, b, value);
        self
    }

    pub fn links(mut self, links: LinkMatrix) -> Self {
        self.links = Some(links);
        self
    }

    pub fn flags(mut self, flags: GresConfigFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn type_id(mut self, unit: usize, type_id: u32) -> Self {
        self.topo[unit].type_id = Some(type_id);
        self
    }

    pub fn finish(self) -> Rc<GresNodeState> {
        let unit_cnt = self.topo.len();
        Rc::new(GresNodeState {
            gres_cnt_avail: self.topo.iter().map(|t| t.gres_cnt_avail).sum(),
            gres_cnt_alloc: self.topo.iter().map(|t| t.gres_cnt_alloc).sum(),
            gres_bit_alloc: Some(Bitmap::from_indices(unit_cnt, &self.allocated)),
            topo: self.topo,
            links: self.links,
            config_flags: self.flags,
        })
    }
}

/// Node inventory without topology table, only counts are known.
pub fn counted_node(avail: u64, alloc: u64) -> Rc<GresNodeState> {
    Rc::new(GresNodeState {
        gres_cnt_avail: avail,
        gres_cnt_alloc: alloc,
        ..Default::default()
    })
}

/// Builds the candidate view of one device type on one node.
pub struct SockBuilder {
    gres_idx: JobGresIndex,
    sock_cnt: usize,
    by_sock: Vec<(usize, Vec<usize>)>,
    any_sock: Option<Vec<usize>>,
}

impl SockBuilder {
    pub fn new(gres_idx: u32, sock_cnt: usize) -> Self {
        SockBuilder {
            gres_idx: JobGresIndex::new(gres_idx),
            sock_cnt,
            by_sock: Vec::new(),
            any_sock: None,
        }
    }

    pub fn socket(mut self, socket: usize, units: &[usize]) -> Self {
        self.by_sock.push((socket, units.to_vec()));
        self
    }

    pub fn any(mut self, units: &[usize]) -> Self {
        self.any_sock = Some(units.to_vec());
        self
    }

    pub fn finish(self, node_state: &Rc<GresNodeState>) -> SockGres {
        let unit_cnt = node_state.node_gres_count();
        let mut sock_gres = SockGres::new(self.gres_idx, node_state.clone(), self.sock_cnt);
        if !self.by_sock.is_empty() {
            sock_gres.cnt_by_sock = vec![0; self.sock_cnt];
        }
        for (socket, units) in &self.by_sock {
            sock_gres.bits_by_sock[*socket] = Some(Bitmap::from_indices(unit_cnt, units));
            sock_gres.cnt_by_sock[*socket] = units.len() as u64;
        }
        if let Some(units) = &self.any_sock {
            sock_gres.bits_any_sock = Some(Bitmap::from_indices(unit_cnt, units));
            sock_gres.cnt_any_sock = units.len() as u64;
        }
        sock_gres.total_cnt = sock_gres.cnt_by_sock.iter().sum::<u64>() + sock_gres.cnt_any_sock;
        sock_gres
    }
}
