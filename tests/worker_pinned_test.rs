// S2: jobs targeted at an explicit worker index must actually run on
// that worker, in the face of 4 other workers idly competing for work.

use std::sync::Mutex;
use std::sync::Arc;

use rusty_jobs::{self as jobs, RuntimeConfig, Signal};

#[test]
fn jobs_pinned_to_a_worker_observe_that_worker() {
    jobs::init(RuntimeConfig {
        worker_count: Some(4),
        ..RuntimeConfig::default()
    })
    .expect("job system should start with 4 workers");

    let seen_worker_0: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_worker_1: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let signal = Signal::new();

    for _ in 0..100 {
        let seen = seen_worker_0.clone();
        jobs::run_lambda(
            move || {
                let idx = jobs::current_worker_index().expect("job must see a current worker");
                seen.lock().unwrap().push(idx);
            },
            Some(&signal),
            0,
        );
    }
    for _ in 0..100 {
        let seen = seen_worker_1.clone();
        jobs::run_lambda(
            move || {
                let idx = jobs::current_worker_index().expect("job must see a current worker");
                seen.lock().unwrap().push(idx);
            },
            Some(&signal),
            1,
        );
    }

    jobs::wait(&signal);

    let seen_0 = seen_worker_0.lock().unwrap();
    let seen_1 = seen_worker_1.lock().unwrap();
    assert_eq!(seen_0.len(), 100);
    assert_eq!(seen_1.len(), 100);
    assert!(seen_0.iter().all(|&w| w == 0), "every job pinned to worker 0 must run there");
    assert!(seen_1.iter().all(|&w| w == 1), "every job pinned to worker 1 must run there");

    jobs::shutdown();
}
