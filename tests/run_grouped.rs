//! Grouped dispatch through the library, with this package's binary as the
//! process-pool worker.

use valuefragments_core::jobs::{HashFile, PiForCpuLoad, PolyRoot, ProbNeeds};
use valuefragments_core::task_queue::WorkerCommand;
use valuefragments_core::{
    pi_for_cpu_load, probneeds, run_grouped, run_grouped_with, GroupError, GroupOptions, How,
    JobError,
};

fn ppe(workers: usize) -> GroupOptions {
    GroupOptions::default()
        .with_workers(workers)
        .with_worker_command(WorkerCommand::new(env!("CARGO_BIN_EXE_valuefragments")).arg("worker"))
}

fn probneeds_jobs() -> Vec<ProbNeeds> {
    (1..=6)
        .map(|avails| ProbNeeds {
            needs: vec![1, 2, 3],
            probs: vec![0.5, 0.4, 0.3],
            avails: Some(avails),
        })
        .collect()
}

#[tokio::test]
async fn test_ppe_results_follow_submission_order() {
    let expected: Vec<f64> = (1..=6)
        .map(|avails| probneeds(&[1, 2, 3], &[0.5, 0.4, 0.3], Some(avails)).unwrap())
        .collect();
    for workers in [1, 2, 16] {
        let got = run_grouped_with(probneeds_jobs(), How::Ppe, &ppe(workers))
            .await
            .unwrap();
        assert_eq!(got, expected, "workers={}", workers);
    }
}

#[tokio::test]
async fn test_failing_call_fails_the_group_in_every_mode() {
    let jobs = || {
        vec![
            PolyRoot { coeffs: (1.0, 0.0, -1.0), val: 0.0 },
            PolyRoot { coeffs: (1.0, 0.0, -4.0), val: 0.0 },
            PolyRoot { coeffs: (1.0, 0.0, 1.0), val: 0.0 },
            PolyRoot { coeffs: (1.0, 0.0, -9.0), val: 0.0 },
        ]
    };
    let expected = JobError::Value("Polynomial has no real roots.".to_string());
    for how in [How::Thread, How::Tpe, How::Ppe] {
        match run_grouped_with(jobs(), how, &ppe(2)).await {
            Err(GroupError::Job(e)) => assert_eq!(e, expected, "{}", how),
            other => panic!("{}: expected job error, got {:?}", how, other),
        }
    }
}

#[tokio::test]
async fn test_seeded_pi_matches_across_modes() {
    let jobs = || {
        (0..5)
            .map(|_| PiForCpuLoad { numiter: 20_000, seed: Some(4478) })
            .collect::<Vec<_>>()
    };
    let single = pi_for_cpu_load(20_000, Some(4478));
    let thread = run_grouped(jobs(), How::Thread).await.unwrap();
    let ppe_out = run_grouped_with(jobs(), How::Ppe, &ppe(3)).await.unwrap();
    assert_eq!(thread, vec![single; 5]);
    assert_eq!(ppe_out, thread);
}

#[tokio::test]
async fn test_ppe_is_repeatable() {
    let first = run_grouped_with(probneeds_jobs(), How::Ppe, &ppe(2)).await.unwrap();
    let second = run_grouped_with(probneeds_jobs(), How::Ppe, &ppe(2)).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_ppe_io_failure_travels_back() {
    let td = tempfile::tempdir().expect("tmp");
    let present = td.path().join("present");
    std::fs::write(&present, "abc").expect("write");
    let jobs = vec![
        HashFile { path: present },
        HashFile { path: td.path().join("absent") },
    ];
    match run_grouped_with(jobs, How::Ppe, &ppe(2)).await {
        Err(GroupError::Job(JobError::Io(msg))) => assert!(msg.contains("absent"), "{}", msg),
        other => panic!("expected io error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_group_spawns_nothing() {
    let options = GroupOptions::default()
        .with_worker_command(WorkerCommand::new("/definitely/not/a/worker"));
    let out = run_grouped_with(Vec::<ProbNeeds>::new(), How::Ppe, &options)
        .await
        .unwrap();
    assert!(out.is_empty());
}
