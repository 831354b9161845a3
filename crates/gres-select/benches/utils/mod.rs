use std::rc::Rc;

use gres_select::{
    Bitmap, GresJobState, GresNodeState, JobGresIndex, JobNodeLayout, JobResources,
    JobSelectInfo, LinkMatrix, NodeId, SockGres, TopoEntry,
};

/// Node with `unit_cnt` free devices; with `linked`, neighbouring units are
/// connected by a strong link.
pub fn create_node(unit_cnt: usize, linked: bool) -> Rc<GresNodeState> {
    let links = linked.then(|| {
        let mut links = LinkMatrix::new(unit_cnt);
        for a in 0..unit_cnt {
            for b in a + 1..unit_cnt {
                let value = if b == a + 1 { 10 } else { (a + b) as i32 % 3 };
                links.set(a, b, value);
            }
        }
        links
    });
    Rc::new(GresNodeState {
        gres_cnt_avail: unit_cnt as u64,
        gres_cnt_alloc: 0,
        gres_bit_alloc: Some(Bitmap::new(unit_cnt)),
        topo: (0..unit_cnt)
            .map(|_| TopoEntry {
                gres_cnt_avail: 1,
                ..Default::default()
            })
            .collect(),
        links,
        config_flags: Default::default(),
    })
}

pub fn create_sock_gres(node_state: &Rc<GresNodeState>, sockets: usize) -> SockGres {
    let unit_cnt = node_state.node_gres_count();
    let per_socket = unit_cnt / sockets;
    let mut sock_gres = SockGres::new(JobGresIndex::new(0), node_state.clone(), sockets);
    sock_gres.cnt_by_sock = vec![0; sockets];
    for s in 0..sockets {
        let units: Vec<usize> = (s * per_socket..(s + 1) * per_socket).collect();
        sock_gres.bits_by_sock[s] = Some(Bitmap::from_indices(unit_cnt, &units));
        sock_gres.cnt_by_sock[s] = units.len() as u64;
    }
    sock_gres.total_cnt = sock_gres.cnt_by_sock.iter().sum();
    sock_gres
}

/// Job holding every core of `node_cnt` nodes with the given geometry.
pub fn create_job(node_cnt: usize, sockets: u16, cores_per_socket: u16) -> JobSelectInfo {
    let nodes: Vec<JobNodeLayout> = (0..node_cnt)
        .map(|id| JobNodeLayout {
            node_id: NodeId::new(id as u32),
            sockets,
            cores_per_socket,
            threads_per_core: 1,
            tasks: 0,
            cpus: sockets as u32 * cores_per_socket as u32,
        })
        .collect();
    let core_cnt = nodes.iter().map(|n| n.core_count()).sum();
    JobSelectInfo {
        job_id: 1,
        resources: JobResources::new(nodes, Bitmap::full(core_cnt), node_cnt),
        ..Default::default()
    }
}

pub fn gpu_request(per_node: u64, per_job: u64) -> GresJobState {
    let mut gres = GresJobState::new("gpu");
    gres.gres_per_node = per_node;
    gres.gres_per_job = per_job;
    gres
}
