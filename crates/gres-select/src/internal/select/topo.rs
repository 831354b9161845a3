use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::job::GresJobState;
use crate::internal::gres::node::GresNodeState;
use crate::internal::gres::resources::NodeId;
use crate::internal::gres::sock::{SocketScope, SockGres};
use std::cmp::Reverse;

/// Scan order of device units that favors units well linked to the units
/// picked so far.
///
/// Units are ordered by their summed link strength to already picked units,
/// then by their link strength to all other free units of the node, then by index.
#[derive(Debug, Clone)]
pub struct LinkOrder {
    order: Vec<usize>,
    affinity: Vec<i64>,
    connectivity: Vec<i64>,
}

impl LinkOrder {
    /// Returns `None` when the node has no link table covering all `gres_cnt` units.
    pub fn for_node(node_state: &GresNodeState, gres_cnt: usize) -> Option<Self> {
        let links = node_state.dense_links(gres_cnt)?;
        let connectivity = (0..gres_cnt)
            .map(|g| {
                (0..gres_cnt)
                    .filter(|l| *l != g && !node_state.is_allocated(*l))
                    .map(|l| links.get(g, l) as i64)
                    .sum()
            })
            .collect();
        let mut order = LinkOrder {
            order: (0..gres_cnt).collect(),
            affinity: vec![0; gres_cnt],
            connectivity,
        };
        order.sort();
        Some(order)
    }

    /// Like [`LinkOrder::for_node`], with affinity towards units in `selected` already counted.
    pub fn seeded(node_state: &GresNodeState, gres_cnt: usize, selected: &Bitmap) -> Option<Self> {
        let mut order = Self::for_node(node_state, gres_cnt)?;
        for g in selected.iter_ones().filter(|g| *g < gres_cnt) {
            order.add_links(g, node_state);
        }
        order.sort();
        Some(order)
    }

    #[inline]
    fn unit_at(&self, position: usize) -> Option<usize> {
        self.order.get(position).copied()
    }

    fn add_links(&mut self, picked: usize, node_state: &GresNodeState) {
        let Some(links) = node_state.links.as_ref() else {
            return;
        };
        for l in 0..self.affinity.len() {
            if l == picked || node_state.is_allocated(l) {
                continue;
            }
            self.affinity[l] += links.get(picked, l) as i64;
        }
    }

    fn sort(&mut self) {
        let affinity = &self.affinity;
        let connectivity = &self.connectivity;
        self.order
            .sort_unstable_by_key(|g| (Reverse(affinity[*g]), Reverse(connectivity[*g]), *g));
    }

    fn update(&mut self, picked: usize, node_state: &GresNodeState) {
        self.add_links(picked, node_state);
        self.sort();
    }

    #[cfg(test)]
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

/// Picks up to `needed` free units from the candidates of `scope` and marks them
/// as selected for the job on `node_id`. Returns the number of picked units.
///
/// Without `order` the units are scanned in index order. With it, the order is
/// updated after every pick and the scan starts over.
pub fn pick_gres_topo(
    sock_gres: &SockGres,
    gres: &mut GresJobState,
    node_id: NodeId,
    needed: u64,
    scope: SocketScope,
    mut order: Option<&mut LinkOrder>,
) -> u64 {
    let Some(sock_bits) = sock_gres.socket_bits(scope) else {
        return 0;
    };
    let Some(gres_cnt) = gres.bit_select(node_id).map(|bits| bits.len()) else {
        return 0;
    };
    let node_state = &sock_gres.node_state;

    let mut picked = 0;
    let mut position = 0;
    while position < gres_cnt && picked < needed {
        let g = match order.as_deref() {
            Some(order) => match order.unit_at(position) {
                Some(g) => g,
                None => break,
            },
            None => position,
        };
        position += 1;
        if !sock_bits.test(g) || node_state.is_allocated(g) {
            continue;
        }
        if !gres.select_unit(node_id, g) {
            continue;
        }
        picked += 1;
        if let Some(order) = order.as_deref_mut() {
            order.update(g, node_state);
            position = 0;
        }
    }
    picked
}
