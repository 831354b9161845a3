use crate::internal::gres::job::GresJobState;
use crate::internal::gres::resources::NodeId;

pub mod job;
pub mod node;

pub fn sorted_vec<T: Ord>(mut vec: Vec<T>) -> Vec<T> {
    vec.sort();
    vec
}

#[allow(unused)]
pub fn enable_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Units selected for `gres` on the node.
pub fn selected_units(gres: &GresJobState, node_id: u32) -> Vec<usize> {
    gres.bit_select(NodeId::new(node_id))
        .map(|bits| bits.iter_ones().collect())
        .unwrap_or_default()
}

pub fn gpu_per_node(count: u64) -> GresJobState {
    let mut gres = GresJobState::new("gpu");
    gres.gres_per_node = count;
    gres
}

pub fn gpu_per_socket(count: u64) -> GresJobState {
    let mut gres = GresJobState::new("gpu");
    gres.gres_per_socket = count;
    gres
}

pub fn gpu_per_task(count: u64) -> GresJobState {
    let mut gres = GresJobState::new("gpu");
    gres.gres_per_task = count;
    gres
}

pub fn gpu_per_job(count: u64) -> GresJobState {
    let mut gres = GresJobState::new("gpu");
    gres.gres_per_job = count;
    gres
}
