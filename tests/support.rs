//! Shared plumbing for the integration tests: a loopback socket pair and a
//! guarded `env_logger` init.

#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Initializes `env_logger` once per test binary. Harmless to call from
/// every test; only the first call does anything.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Returns two ends of a connected loopback TCP stream.
pub fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("local_addr");
    let client = TcpStream::connect(addr).expect("connect to loopback listener");
    let (server, _) = listener.accept().expect("accept loopback connection");
    (client, server)
}
