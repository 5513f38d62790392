//! A transfer too large to fit in one syscall exercises the partial-write
//! loop inside `io_ops::try_write`; this only checks the end-to-end
//! result, not the intermediate partial-write steps, since those aren't
//! observable from outside the crate.

mod support;

use std::io::Read;
use std::sync::mpsc;
use std::thread;

use proactor_watch::{Op, Watcher};
use rand::RngCore;

fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

#[test]
fn large_write_completes_in_full() {
    support::init_logger();

    let (client, mut server) = support::connected_pair();

    let payload = random_payload(4 * 1024 * 1024);
    let expected = payload.clone();

    let (done_tx, done_rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        let mut received = Vec::with_capacity(expected.len());
        let mut buf = [0u8; 64 * 1024];
        loop {
            match server.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) => panic!("server read: {e}"),
            }
        }
        let _ = done_tx.send(received);
    });

    let watcher: Watcher<u32> = Watcher::new(64 * 1024).expect("watcher");
    let handle = watcher.handle();
    let conn = handle.wrap(client);

    handle.write(1, &conn, payload.clone()).expect("submit large write");
    let batch = watcher.wait_io().expect("write completion");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].op, Op::Write);
    assert!(batch[0].err.is_none());
    assert_eq!(batch[0].size, payload.len());

    // Drop the connection so the server sees EOF and stops reading.
    drop(conn);
    drop(watcher);

    let received = done_rx.recv().expect("server finished reading");
    reader.join().expect("reader thread");
    assert_eq!(received, payload);
}
