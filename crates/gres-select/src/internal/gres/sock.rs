use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::job::JobGresIndex;
use crate::internal::gres::node::GresNodeState;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Which part of the node's devices a pick may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketScope {
    /// Devices attached to the given socket
    Socket(usize),
    /// Devices without a fixed socket affinity
    Any,
}

/// Candidate devices of one requested device type on one node, split by socket.
///
/// Built by the candidate builder before selection; the usability filter
/// shrinks it, pickers only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SockGres {
    pub gres_idx: JobGresIndex,
    pub node_state: Rc<GresNodeState>,
    pub sock_cnt: usize,
    #[serde(default)]
    pub bits_by_sock: Vec<Option<Bitmap>>,
    #[serde(default)]
    pub bits_any_sock: Option<Bitmap>,
    /// Device count per socket; empty when the devices have no socket affinity
    #[serde(default)]
    pub cnt_by_sock: Vec<u64>,
    #[serde(default)]
    pub cnt_any_sock: u64,
    #[serde(default)]
    pub total_cnt: u64,
    /// Upper bound of devices usable on the node, 0 means unbounded
    #[serde(default)]
    pub max_node_gres: u64,
}

impl SockGres {
    pub fn new(gres_idx: JobGresIndex, node_state: Rc<GresNodeState>, sock_cnt: usize) -> Self {
        SockGres {
            gres_idx,
            node_state,
            sock_cnt,
            bits_by_sock: vec![None; sock_cnt],
            bits_any_sock: None,
            cnt_by_sock: Vec::new(),
            cnt_any_sock: 0,
            total_cnt: 0,
            max_node_gres: 0,
        }
    }

    /// Candidate mask for the scope, `None` if the scope has no candidates.
    pub fn socket_bits(&self, scope: SocketScope) -> Option<&Bitmap> {
        match scope {
            SocketScope::Socket(socket) => self.bits_by_sock.get(socket).and_then(|b| b.as_ref()),
            SocketScope::Any => self.bits_any_sock.as_ref(),
        }
    }

    #[inline]
    pub fn has_socket_counts(&self) -> bool {
        !self.cnt_by_sock.is_empty()
    }

    /// Tightens `max_node_gres` to `value` if it is unset or larger.
    /// Zero values are ignored; returns whether the bound changed.
    pub fn set_max_node_gres(&mut self, value: u64) -> bool {
        if value > 0 && (self.max_node_gres == 0 || self.max_node_gres > value) {
            self.max_node_gres = value;
            true
        } else {
            false
        }
    }
}
