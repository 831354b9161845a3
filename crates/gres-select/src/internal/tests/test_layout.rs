use crate::internal::common::error::SelectError;
use crate::internal::select::layout::{TaskLayout, UsedSockets};
use crate::internal::tests::utils::job::JobBuilder;

#[test]
fn test_used_sockets_on_second_node() {
    let job = JobBuilder::default()
        .node(0, 1, 2, &[0, 1])
        .node(1, 2, 4, &[1, 2, 3])
        .build();
    let used = UsedSockets::compute(&job.resources, 1).unwrap();
    assert_eq!(used.cores_by_sock.as_slice(), &[3, 0]);
    assert_eq!(used.used_core_cnt, 3);
    assert_eq!(used.used_sock_cnt, 1);
    assert!(used.is_used(0));
    assert!(!used.is_used(1));
    assert!(!used.is_used(7));
}

#[test]
fn test_used_sockets_spread() {
    let job = JobBuilder::default().node(0, 2, 2, &[1, 2]).build();
    let used = UsedSockets::compute(&job.resources, 0).unwrap();
    assert_eq!(used.cores_by_sock.as_slice(), &[1, 1]);
    assert_eq!(used.used_sock_cnt, 2);
}

#[test]
fn test_used_sockets_without_cores() {
    let job = JobBuilder::default().node(0, 2, 2, &[]).build();
    assert!(matches!(
        UsedSockets::compute(&job.resources, 0),
        Err(SelectError::InvalidJobResources(_))
    ));
    let job = JobBuilder::default().node(0, 0, 0, &[]).build();
    assert!(matches!(
        UsedSockets::compute(&job.resources, 0),
        Err(SelectError::InvalidJobResources(_))
    ));
    assert!(UsedSockets::compute(&job.resources, 3).is_err());
}

#[test]
fn test_tasks_one_per_core() {
    let job = JobBuilder::default()
        .ntasks_per_job(4)
        .node(0, 2, 2, &[0, 1, 2, 3])
        .tasks(4)
        .build();
    let layout = TaskLayout::compute(&job.resources, job.overcommit, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[2, 2][..]));
    assert_eq!(layout.node_tasks(1), None);
}

#[test]
fn test_tasks_socket_limit_and_overcommit() {
    let builder = JobBuilder::default()
        .ntasks_per_job(4)
        .ntasks_per_socket(1)
        .node(0, 2, 2, &[0, 1, 2, 3])
        .tasks(4);
    let job = builder.clone().build();
    let layout = TaskLayout::compute(&job.resources, false, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[1, 1][..]));

    let job = builder.overcommit(true).build();
    let layout = TaskLayout::compute(&job.resources, job.overcommit, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[2, 2][..]));
}

#[test]
fn test_tasks_node_limit_rolls_back_excess() {
    let job = JobBuilder::default()
        .ntasks_per_job(3)
        .ntasks_per_core(2)
        .node(0, 2, 2, &[0, 1, 2])
        .tasks(3)
        .build();
    let layout = TaskLayout::compute(&job.resources, false, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[3, 0][..]));
}

#[test]
fn test_tasks_spanning_cores() {
    let job = JobBuilder::default()
        .ntasks_per_job(2)
        .cpus_per_task(2)
        .node(0, 1, 4, &[0, 1, 2, 3])
        .tasks(2)
        .build();
    let layout = TaskLayout::compute(&job.resources, false, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[2][..]));
}

#[test]
fn test_tasks_of_multithreaded_cores() {
    let job = JobBuilder::default()
        .ntasks_per_job(4)
        .node(0, 1, 2, &[0, 1])
        .threads_per_core(2)
        .build();
    // Task count unknown, derived from CPUs
    let layout = TaskLayout::compute(&job.resources, false, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[4][..]));
}

#[test]
fn test_tasks_without_socket_layout() {
    let job = JobBuilder::default()
        .ntasks_per_job(3)
        .node(0, 0, 0, &[])
        .node(1, 1, 2, &[0, 1])
        .tasks(2)
        .build();
    let layout = TaskLayout::compute(&job.resources, false, &job.mc);
    assert_eq!(layout.node_tasks(0), Some(&[1][..]));
    assert_eq!(layout.node_tasks(1), Some(&[2][..]));
}
