// S7 / testable property 7: a fiber that yields goes back onto the
// global queue and may be picked up by a different worker than the one
// it suspended on. Each resume must observe a consistent, valid
// `current_worker_index` -- and across enough yields, at least one
// migration across workers should actually happen.

use std::sync::Mutex;
use std::sync::Arc;

use rusty_jobs::{self as jobs, RuntimeConfig, Signal};

#[test]
fn yielding_fiber_may_resume_on_a_different_worker() {
    jobs::init(RuntimeConfig {
        worker_count: Some(4),
        ..RuntimeConfig::default()
    })
    .expect("job system should start with 4 workers");

    let observed: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let signal = Signal::new();

    for _ in 0..8 {
        let observed = observed.clone();
        jobs::run_lambda(
            move || {
                for _ in 0..200 {
                    let idx = jobs::current_worker_index().expect("job must see a current worker");
                    assert!(idx < jobs::workers_count(), "observed worker index out of range");
                    observed.lock().unwrap().push(idx);
                    jobs::yield_now();
                }
            },
            Some(&signal),
            jobs::ANY_WORKER,
        );
    }

    jobs::wait(&signal);

    let log = observed.lock().unwrap();
    assert_eq!(log.len(), 8 * 200);
    let distinct_workers: std::collections::HashSet<_> = log.iter().copied().collect();
    assert!(
        distinct_workers.len() > 1,
        "expected fibers to migrate across more than one worker over 1600 yields"
    );

    jobs::shutdown();
}
