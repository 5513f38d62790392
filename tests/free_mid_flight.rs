//! Freeing a connection while a read is still queued must cancel it
//! silently: no completion is ever delivered for it, even if the peer
//! later sends the data that would have satisfied it.

mod support;

use std::io::Write;

use proactor_watch::Watcher;

#[test]
fn free_cancels_outstanding_read_silently() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();
    let (control_client, mut control_server) = support::connected_pair();

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);
    let control = handle.wrap(control_client);

    // Submitted before the peer has anything to say, so it sits in the
    // read FIFO rather than completing synchronously.
    handle.read(999, &conn, None).expect("submit read");
    handle.free(&conn).expect("free connection");

    // The peer sends the bytes anyway; if `free` had not discarded the
    // request, this would produce a completion for ctx 999.
    server.write_all(b"too late").expect("server write");

    // An unrelated connection's completion proves the loop kept running
    // and any absence of a ctx-999 completion isn't just "not yet".
    control_server.write_all(b"ok").expect("control write");
    handle.read(1, &control, None).expect("submit control read");

    let mut saw_control = false;
    for _ in 0..8 {
        let batch = watcher.wait_io().expect("wait_io");
        assert!(
            batch.iter().all(|c| c.ctx != 999),
            "a completion was delivered for the freed request"
        );
        if batch.iter().any(|c| c.ctx == 1) {
            saw_control = true;
            break;
        }
    }
    assert!(saw_control, "the control connection's read never completed");
}
