use criterion::{BatchSize, BenchmarkId, Criterion};

use gres_select::select::select_and_set;
use gres_select::{JobGresList, SelectConfig};

use crate::{create_job, create_node, create_sock_gres, gpu_request};

fn bench_per_node(c: &mut Criterion) {
    for unit_cnt in [8, 32, 128] {
        for linked in [false, true] {
            c.bench_with_input(
                BenchmarkId::new(
                    "select per node",
                    format!("units={unit_cnt}, linked={linked}"),
                ),
                &(unit_cnt, linked),
                |b, &(unit_cnt, linked)| {
                    let node = create_node(unit_cnt, linked);
                    let sock_gres = vec![vec![create_sock_gres(&node, 2)]];
                    let job = create_job(1, 2, 16);
                    let config = SelectConfig::default();
                    b.iter_batched_ref(
                        || JobGresList::from(vec![gpu_request(unit_cnt as u64 / 2, 0)]),
                        |job_gres| select_and_set(&sock_gres, job_gres, &job, &config),
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }
}

fn bench_per_job(c: &mut Criterion) {
    for node_cnt in [1, 16, 256] {
        c.bench_with_input(
            BenchmarkId::new("select per job", node_cnt),
            &node_cnt,
            |b, &node_cnt| {
                let sock_gres: Vec<_> = (0..node_cnt)
                    .map(|_| vec![create_sock_gres(&create_node(8, true), 2)])
                    .collect();
                let job = create_job(node_cnt, 2, 8);
                let config = SelectConfig::default();
                let per_job = node_cnt as u64 * 3;
                b.iter_batched_ref(
                    || JobGresList::from(vec![gpu_request(0, per_job)]),
                    |job_gres| select_and_set(&sock_gres, job_gres, &job, &config),
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_per_node(c);
    bench_per_job(c);
}
