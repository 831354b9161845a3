use criterion::{BatchSize, BenchmarkId, Criterion};

use gres_select::select::{NodeFilterInput, remove_unusable};
use gres_select::{Bitmap, JobGresList};

use crate::{create_node, create_sock_gres, gpu_request};

fn bench_remove_unusable(c: &mut Criterion) {
    for sockets in [1, 2, 8] {
        c.bench_with_input(
            BenchmarkId::new("remove unusable", sockets),
            &sockets,
            |b, &sockets| {
                let node = create_node(8 * sockets, false);
                let mut request = gpu_request(4, 0);
                request.cpus_per_gres = 2;
                request.mem_per_gres = 1024;
                let job_gres = JobGresList::from(vec![request]);
                let cores_per_sock = 16u16;
                let core_cnt = sockets * cores_per_sock as usize;
                let core_bitmap = Bitmap::from_indices(core_cnt, &[0, 1, 2, 3, 4, 5, 6, 7]);
                let input = NodeFilterInput {
                    avail_mem: Some(64 * 1024),
                    max_cpus: core_cnt as u16,
                    enforce_binding: true,
                    core_bitmap: &core_bitmap,
                    sockets: sockets as u16,
                    cores_per_sock,
                    cpus_per_core: 1,
                    sock_per_node: None,
                    task_per_node: None,
                    cpus_per_task: 1,
                    whole_node: false,
                };
                b.iter_batched_ref(
                    || vec![create_sock_gres(&node, sockets)],
                    |sock_gres| remove_unusable(sock_gres, &job_gres, &input),
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_remove_unusable(c);
}
