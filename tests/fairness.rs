//! Two reads queued on the same descriptor before any data arrives must
//! complete in submission order, not in whatever order would be
//! convenient for the loop.

mod support;

use std::io::Write;

use proactor_watch::Watcher;

#[test]
fn same_descriptor_reads_complete_in_fifo_order() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    // Both queue up before any bytes exist to read.
    handle.read(9, &conn, Some(vec![0u8; 5])).expect("submit first read");
    handle.read(10, &conn, Some(vec![0u8; 5])).expect("submit second read");

    server.write_all(b"ABCDEFGHIJ").expect("server write");

    let batch = watcher.wait_io().expect("read completions");
    assert_eq!(batch.len(), 2, "expected both reads in a single batch, got {batch:?}");
    assert_eq!(batch[0].ctx, 9);
    assert_eq!(&*batch[0].buf, b"ABCDE");
    assert_eq!(batch[1].ctx, 10);
    assert_eq!(&*batch[1].buf, b"FGHIJ");
}
