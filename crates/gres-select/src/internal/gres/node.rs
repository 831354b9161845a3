use crate::internal::common::bitmap::Bitmap;
use crate::internal::gres::config::GresConfigFlags;
use serde::{Deserialize, Serialize};

/// Square matrix of link strengths between device units of one node.
/// Higher value means a better interconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LinkMatrixRepr")]
pub struct LinkMatrix {
    len: usize,
    values: Vec<i32>,
}

#[derive(Deserialize)]
struct LinkMatrixRepr {
    len: usize,
    values: Vec<i32>,
}

impl TryFrom<LinkMatrixRepr> for LinkMatrix {
    type Error = String;

    fn try_from(repr: LinkMatrixRepr) -> Result<Self, Self::Error> {
        let expected = repr.len.checked_mul(repr.len);
        if expected != Some(repr.values.len()) {
            return Err(format!(
                "link matrix of {} units has {} values",
                repr.len,
                repr.values.len()
            ));
        }
        Ok(LinkMatrix {
            len: repr.len,
            values: repr.values,
        })
    }
}

impl LinkMatrix {
    pub fn new(len: usize) -> Self {
        LinkMatrix {
            len,
            values: vec![0; len * len],
        }
    }

    /// Builds the matrix from rows; returns `None` when the rows do not form a square.
    pub fn from_rows(rows: &[Vec<i32>]) -> Option<Self> {
        let len = rows.len();
        if rows.iter().any(|row| row.len() != len) {
            return None;
        }
        Some(LinkMatrix {
            len,
            values: rows.iter().flatten().copied().collect(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, a: usize, b: usize) -> i32 {
        self.values[a * self.len + b]
    }

    /// Sets the link strength symmetrically.
    pub fn set(&mut self, a: usize, b: usize, value: i32) {
        self.values[a * self.len + b] = value;
        self.values[b * self.len + a] = value;
    }
}

/// One record of the node's device topology table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopoEntry {
    pub gres_cnt_avail: u64,
    pub gres_cnt_alloc: u64,
    pub type_id: Option<u32>,
    pub bitmap: Option<Bitmap>,
}

impl TopoEntry {
    #[inline]
    pub fn free(&self) -> u64 {
        self.gres_cnt_avail.saturating_sub(self.gres_cnt_alloc)
    }
}

/// Device inventory of one device type on one node.
///
/// Owned by the node record; selection only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GresNodeState {
    pub gres_cnt_avail: u64,
    pub gres_cnt_alloc: u64,
    /// Units allocated to other jobs
    pub gres_bit_alloc: Option<Bitmap>,
    pub topo: Vec<TopoEntry>,
    pub links: Option<LinkMatrix>,
    pub config_flags: GresConfigFlags,
}

impl GresNodeState {
    /// Count of device units on this node.
    pub fn node_gres_count(&self) -> usize {
        if let Some(alloc) = &self.gres_bit_alloc {
            return alloc.len();
        }
        if let Some(bitmap) = self.topo.first().and_then(|t| t.bitmap.as_ref()) {
            return bitmap.len();
        }
        self.topo.iter().map(|t| t.gres_cnt_avail as usize).sum()
    }

    #[inline]
    pub fn has_topology(&self) -> bool {
        !self.topo.is_empty()
    }

    #[inline]
    pub fn is_allocated(&self, unit: usize) -> bool {
        self.gres_bit_alloc
            .as_ref()
            .is_some_and(|alloc| alloc.test(unit))
    }

    /// Link table usable for ordering a selection over `gres_cnt` units.
    pub fn dense_links(&self, gres_cnt: usize) -> Option<&LinkMatrix> {
        self.links
            .as_ref()
            .filter(|links| links.len() == gres_cnt && gres_cnt > 0)
    }

    /// Free units within `bits`, i.e. units not allocated to other jobs.
    pub fn free_in(&self, bits: &Bitmap) -> u64 {
        let allocated = self
            .gres_bit_alloc
            .as_ref()
            .map(|alloc| bits.overlap(alloc))
            .unwrap_or(0);
        (bits.count() - allocated) as u64
    }

    /// A shared request must land on an already busy sharing device when the type
    /// is restricted to one sharing device and something is already allocated.
    pub fn use_busy_dev(&self) -> bool {
        self.config_flags
            .contains(GresConfigFlags::SHARED | GresConfigFlags::ONE_SHARING)
            && self.gres_cnt_alloc != 0
    }
}
