//! Dropping every strong `Conn` handle (rather than calling `free`
//! explicitly) must eventually release the descriptor through the same
//! silent-cancellation path: the finalizer on `ConnState` posts to the
//! loop's GC channel and wakes it, the loop releases the descriptor, and
//! the watcher keeps servicing other connections normally.

mod support;

use std::io::Write;
use std::thread;
use std::time::Duration;

use proactor_watch::Watcher;

#[test]
fn dropping_the_last_conn_releases_its_descriptor() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();
    let (control_client, mut control_server) = support::connected_pair();

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);
    let control = handle.wrap(control_client);

    // Pending, since nothing has been written to `server` yet.
    handle.read(100, &conn, None).expect("submit read");

    // `conn` is the only strong reference; dropping it should fire
    // `ConnState`'s finalizer and wake the loop without any other event
    // being needed.
    drop(conn);
    thread::sleep(Duration::from_millis(150));

    // Whether or not the descriptor was actually released yet, a write
    // from the peer must never produce a completion for the now-orphaned
    // request.
    let _ = server.write_all(b"late");

    control_server.write_all(b"ok").expect("control write");
    handle.read(1, &control, None).expect("submit control read");

    let mut saw_control = false;
    for _ in 0..8 {
        let batch = watcher.wait_io().expect("wait_io");
        assert!(
            batch.iter().all(|c| c.ctx != 100),
            "a completion was delivered for a GC-reclaimed connection"
        );
        if batch.iter().any(|c| c.ctx == 1) {
            saw_control = true;
            break;
        }
    }
    assert!(saw_control, "the control connection's read never completed");
}
