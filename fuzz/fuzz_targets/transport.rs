#![no_main]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use talk_proto::host::{Connector, CredentialStore, Interest, Timer, TimerId, TlsSocket};
use talk_proto::http::Method;
use talk_proto::{Completion, Transport, TransportConfig};

type Reads = Rc<RefCell<VecDeque<Vec<u8>>>>;

struct Socket(Reads);

impl TlsSocket for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.0.borrow_mut().pop_front();
        match next {
            Some(mut data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.0.borrow_mut().push_front(rest);
                }
                Ok(n)
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn register(&mut self, _: Interest) {}

    fn close(&mut self) {}
}

struct Tls(Reads);

impl Connector for Tls {
    type Socket = Socket;

    fn connect(&mut self, _: &str, _: u16) -> io::Result<Socket> {
        Ok(Socket(self.0.clone()))
    }
}

struct Clock;

impl Timer for Clock {
    fn schedule(&mut self, _: Duration) -> TimerId {
        TimerId(1)
    }

    fn cancel(&mut self, _: TimerId) {}
}

struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn get(&self, _: &str) -> Option<String> {
        None
    }

    fn set(&self, _: &str, _: &str) {}

    fn remove(&self, _: &str) {}
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let calls = (data[0] % 4) as usize + 1;
    let session_mode = data[1] % 2 == 0;
    let stride = (data[2] as usize).max(1);
    let input = &data[3..];

    let reads: Reads = Rc::new(RefCell::new(VecDeque::new()));

    let config = TransportConfig::new("rpc.test", 443).session_mode(session_mode);
    let mut transport = Transport::new(
        config,
        Tls(reads.clone()),
        Clock,
        Rc::new(NoCredentials),
    );
    transport.set_auto_reconnect(true);

    for i in 0..calls {
        let _ = transport.write_all(&[i as u8]);
        let _ = transport.request(Method::POST, "/S4", "application/x-thrift", |_, _| {
            Completion::Done
        });
    }

    if transport.on_connected().is_err() {
        return;
    }

    // One readable event per stride-sized burst.
    for chunk in input.chunks(stride) {
        reads.borrow_mut().push_back(chunk.to_vec());
        if transport.on_readable().is_err() {
            return;
        }
    }
});
