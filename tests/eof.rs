//! Clean EOF releases the descriptor; a later submission on the same
//! `Conn` must still work, registering a fresh descriptor-state rather
//! than reusing the released one.

mod support;

use proactor_watch::{Op, Watcher};

#[test]
fn eof_then_resubmit() {
    support::init_logger();

    let (client, server) = support::connected_pair();
    drop(server); // peer closes immediately, no bytes ever sent

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    handle.read(1, &conn, None).expect("submit first read");
    let batch = watcher.wait_io().expect("eof completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 1);
    assert_eq!(batch[0].op, Op::Read);
    assert!(batch[0].err.is_none());
    assert_eq!(batch[0].size, 0);

    // The descriptor was released on EOF; this submission must register a
    // new descriptor-state for the same `Conn` rather than erroring out.
    handle.read(2, &conn, None).expect("submit second read");
    let batch = watcher.wait_io().expect("second eof completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 2);
    assert!(batch[0].err.is_none());
    assert_eq!(batch[0].size, 0);
}
