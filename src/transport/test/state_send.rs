use std::io::Write;

use crate::host::Interest;
use crate::transport::ConnectionState;

use super::scenario::{ok, response, Scenario};

#[test]
fn request_opens_connection() {
    let mut s = Scenario::builder().build();

    s.call("/S4", b"abc").unwrap();

    assert_eq!(s.transport.state(), ConnectionState::Connecting);
    assert_eq!(s.connections(), 1);
    assert_eq!(s.transport.queued(), 1);

    // Nothing goes out before the handshake.
    assert_eq!(s.take_written(), "");
    assert!(!s.transport.is_in_flight());
}

#[test]
fn standard_header_block() {
    let mut s = Scenario::builder().access_token("secret").build();

    s.call("/S4", b"abc").unwrap();
    s.connected().unwrap();

    assert_eq!(
        s.take_written(),
        "POST /S4 HTTP/1.1\r\n\
        Connection: Keep-Alive\r\n\
        Content-Type: application/x-thrift\r\n\
        Host: rpc.test:443\r\n\
        User-Agent: agent/1.0\r\n\
        X-Line-Application: APP\r\n\
        X-Line-Access: secret\r\n\
        Content-Length: 3\r\n\
        \r\n\
        abc"
    );

    assert!(s.transport.is_in_flight());
    assert_eq!(s.wire().borrow().interest, Some(Interest::Read));
}

#[test]
fn no_access_header_without_token() {
    let mut s = Scenario::builder().build();

    s.call("/S4", b"abc").unwrap();
    s.connected().unwrap();

    let written = s.take_written();
    assert!(written.contains("X-Line-Application: APP\r\n"));
    assert!(!written.contains("X-Line-Access"));
}

#[test]
fn empty_body_has_no_content_length() {
    let mut s = Scenario::builder().build();

    s.call("/P4", b"").unwrap();
    s.connected().unwrap();

    let written = s.take_written();
    assert!(written.ends_with("X-Line-Application: APP\r\n\r\n"));
    assert!(!written.contains("Content-Length"));
}

#[test]
fn partial_writes_resume_on_writable() {
    let mut s = Scenario::builder().write_chunk(7).build();

    s.call("/S4", b"0123456789").unwrap();
    s.wire().borrow_mut().write_budget = Some(10);
    s.connected().unwrap();

    assert_eq!(s.wire().borrow().written.len(), 10);
    assert_eq!(s.wire().borrow().interest, Some(Interest::Write));

    s.wire().borrow_mut().write_budget = Some(20);
    s.transport.on_writable().unwrap();

    assert_eq!(s.wire().borrow().written.len(), 30);
    assert_eq!(s.wire().borrow().interest, Some(Interest::Write));

    s.wire().borrow_mut().write_budget = None;
    s.transport.on_writable().unwrap();

    assert_eq!(s.wire().borrow().interest, Some(Interest::Read));

    let written = s.take_written();
    assert!(written.starts_with("POST /S4 HTTP/1.1\r\n"));
    assert!(written.ends_with("Content-Length: 10\r\n\r\n0123456789"));
}

#[test]
fn one_request_in_flight() {
    let mut s = Scenario::builder().build();

    s.call("/a", b"1").unwrap();
    s.call("/b", b"2").unwrap();
    s.call("/c", b"3").unwrap();
    s.connected().unwrap();

    let written = s.take_written();
    assert!(written.starts_with("POST /a HTTP/1.1\r\n"));
    assert_eq!(written.matches(" HTTP/1.1\r\n").count(), 1);

    s.feed(&[&ok("A")]).unwrap();

    let written = s.take_written();
    assert!(written.starts_with("POST /b HTTP/1.1\r\n"));
    assert_eq!(written.matches(" HTTP/1.1\r\n").count(), 1);

    s.feed(&[&ok("B")]).unwrap();

    let written = s.take_written();
    assert!(written.starts_with("POST /c HTTP/1.1\r\n"));
    assert_eq!(written.matches(" HTTP/1.1\r\n").count(), 1);

    s.feed(&[&ok("C")]).unwrap();

    assert_eq!(s.take_written(), "");
    assert_eq!(s.log(), ["/a 200 A", "/b 200 B", "/c 200 C"]);
    assert_eq!(s.connections(), 1);
    assert_eq!(s.transport.queued(), 0);
}

#[test]
fn session_token_echoed() {
    let mut s = Scenario::builder()
        .session_mode()
        .access_token("secret")
        .build();

    s.call("/P4", b"x").unwrap();
    s.connected().unwrap();

    // No token yet, the standard block goes out.
    let first = s.take_written();
    assert!(first.contains("X-Line-Access: secret\r\n"));
    assert!(!first.contains("X-LS"));

    s.feed(&[&response(200, "r1", "X-LS: tok-1\r\n")]).unwrap();
    assert_eq!(s.transport.session_token(), Some("tok-1"));

    s.call("/P4", b"y").unwrap();

    assert_eq!(
        s.take_written(),
        "POST /P4 HTTP/1.1\r\nX-LS: tok-1\r\nContent-Length: 1\r\n\r\ny"
    );
}

#[test]
fn session_token_replaced_by_newer() {
    let mut s = Scenario::builder().session_mode().build();

    s.call("/P4", b"x").unwrap();
    s.connected().unwrap();
    s.feed(&[&response(200, "", "X-LS: tok-1\r\n")]).unwrap();

    s.call("/P4", b"y").unwrap();
    s.feed(&[&response(200, "", "X-LS: tok-2\r\n")]).unwrap();

    s.take_written();
    s.call("/P4", b"z").unwrap();

    assert!(s.take_written().contains("X-LS: tok-2\r\n"));
}

#[test]
fn standard_mode_ignores_session_token() {
    let mut s = Scenario::builder().build();

    s.call("/S4", b"x").unwrap();
    s.connected().unwrap();
    s.feed(&[&response(200, "", "X-LS: tok-1\r\nConnection: keep-alive\r\n")])
        .unwrap();

    s.take_written();
    s.call("/S4", b"y").unwrap();

    let written = s.take_written();
    assert!(written.contains("Connection: Keep-Alive\r\n"));
    assert!(!written.contains("X-LS"));
}

#[test]
fn outbound_buffer_moves_into_request() {
    let mut s = Scenario::builder().build();

    s.transport.outbound_mut().extend_from_slice(b"ab");
    s.transport.write_all(b"cd").unwrap();
    s.call("/S4", b"").unwrap();

    assert!(s.transport.outbound_mut().is_empty());

    s.connected().unwrap();

    assert!(s.take_written().ends_with("Content-Length: 4\r\n\r\nabcd"));
}

#[test]
fn idle_connection_watches_for_close() {
    let mut s = Scenario::builder().build();

    s.call("/S4", b"x").unwrap();
    s.connected().unwrap();
    s.feed(&[&ok("A")]).unwrap();

    assert!(!s.transport.is_in_flight());
    assert_eq!(s.wire().borrow().interest, Some(Interest::Read));
}

#[test]
fn writable_without_request_is_ignored() {
    let mut s = Scenario::builder().build();

    s.transport.on_writable().unwrap();

    s.call("/S4", b"x").unwrap();
    s.connected().unwrap();
    s.feed(&[&ok("A")]).unwrap();
    s.take_written();

    s.transport.on_writable().unwrap();

    assert_eq!(s.take_written(), "");
}
