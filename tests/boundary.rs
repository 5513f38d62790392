//! Synchronous rejections that never touch the event loop: an empty
//! write buffer, and any submission after the watcher has been closed.

mod support;

use proactor_watch::{Watcher, WatcherError};

#[test]
fn empty_write_buffer_is_rejected_synchronously() {
    support::init_logger();

    let (client, _server) = support::connected_pair();
    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    let err = handle.write(1, &conn, Vec::new()).unwrap_err();
    assert_eq!(err, WatcherError::EmptyBuffer);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
    let err = handle.write_timeout(1, &conn, Vec::new(), deadline).unwrap_err();
    assert_eq!(err, WatcherError::EmptyBuffer);
}

#[test]
fn submissions_after_close_are_rejected() {
    support::init_logger();

    let (client, _server) = support::connected_pair();
    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    watcher.close();

    assert_eq!(handle.read(1, &conn, None).unwrap_err(), WatcherError::WatcherClosed);
    assert_eq!(
        handle.write(1, &conn, vec![1, 2, 3]).unwrap_err(),
        WatcherError::WatcherClosed
    );
    assert_eq!(handle.free(&conn).unwrap_err(), WatcherError::WatcherClosed);
    assert_eq!(watcher.wait_io().unwrap_err(), WatcherError::WatcherClosed);
}
