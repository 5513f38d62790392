//! End-to-end round trip: submit a write, then a bufferless read, and
//! confirm the bytes that come back through the swap buffer match what
//! was sent.

mod support;

use std::io::{Read, Write};
use std::thread;

use proactor_watch::{Op, Watcher};

#[test]
fn write_then_swap_buffer_read() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();

    let echoer = thread::spawn(move || {
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).expect("server read");
        server.write_all(&buf[..n]).expect("server echo");
    });

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    handle.write(1, &conn, b"hello, watcher".to_vec()).expect("submit write");
    let batch = watcher.wait_io().expect("write completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 1);
    assert_eq!(batch[0].op, Op::Write);
    assert!(batch[0].err.is_none());
    assert_eq!(batch[0].size, "hello, watcher".len());

    handle.read(2, &conn, None).expect("submit read");
    let batch = watcher.wait_io().expect("read completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 2);
    assert_eq!(batch[0].op, Op::Read);
    assert!(batch[0].err.is_none());
    assert_eq!(&*batch[0].buf, b"hello, watcher");

    echoer.join().expect("echoer thread");
}

#[test]
fn caller_supplied_read_buffer_is_reused() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();
    let writer = thread::spawn(move || {
        server.write_all(b"abc").expect("server write");
    });

    let watcher: Watcher<u32> = Watcher::new(4096).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    handle
        .read(7, &conn, Some(vec![0u8; 3]))
        .expect("submit read with caller buffer");
    let batch = watcher.wait_io().expect("read completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].ctx, 7);
    assert_eq!(batch[0].size, 3);
    assert_eq!(&*batch[0].buf, b"abc");

    writer.join().expect("writer thread");
}
