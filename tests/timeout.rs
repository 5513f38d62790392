//! A read with a deadline and a silent peer: the deadline heap must fire
//! and release the request with `DeadlineError`, not hang.

mod support;

use std::time::{Duration, Instant};

use proactor_watch::{Op, Watcher, WatcherError};

#[test]
fn read_timeout_fires() {
    support::init_logger();

    let (client, _server) = support::connected_pair();

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    let deadline = Instant::now() + Duration::from_millis(80);
    handle
        .read_timeout(1, &conn, None, deadline)
        .expect("submit read with deadline");

    let started = Instant::now();
    let batch = watcher.wait_io().expect("deadline completion");
    let elapsed = started.elapsed();

    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 1);
    assert_eq!(batch[0].op, Op::Read);
    assert_eq!(batch[0].err, Some(WatcherError::DeadlineError));
    assert!(elapsed >= Duration::from_millis(60), "fired too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "never fired: {elapsed:?}");
}
