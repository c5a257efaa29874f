use smolws::frame::{
    payload_mask, FrameEncoder, FrameHead, FrameHeadParseError, WsFrame, WsOpcode,
};
use smolws::http::accept_challenge;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

// One-connection fixture server speaking raw RFC 6455 over a std socket.
// The handler runs on its own thread; join the handle to propagate its
// assertions into the test.
pub fn spawn_server<F>(handler: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        handler(stream);
    });
    (port, handle)
}

pub fn read_until_blank_line(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        request.push(byte[0]);
    }
    String::from_utf8(request).unwrap()
}

// Reads the upgrade request and answers 101 with the matching accept
// value.
pub fn accept_upgrade(stream: &mut TcpStream) {
    let request = read_until_blank_line(stream);
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .expect("upgrade request carries no key");
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_challenge(key.as_bytes())
    );
    stream.write_all(response.as_bytes()).unwrap();
}

// Incremental head read driven by the parser's byte requirements, then
// the payload, unmasked with the client's key.
pub fn read_frame(stream: &mut TcpStream) -> WsFrame {
    let mut buffer = [0u8; 14];
    let mut len = 0usize;
    let head = loop {
        match FrameHead::parse(&buffer[0..len]) {
            Ok(head) => break head,
            Err(FrameHeadParseError::Incomplete(min)) => {
                stream.read_exact(&mut buffer[len..min]).unwrap();
                len = min;
            }
            Err(err) => panic!("bad frame head: {err}"),
        }
    };
    let mut payload = vec![0u8; head.payload_len as usize];
    stream.read_exact(&mut payload).unwrap();
    if let Some(key) = head.mask {
        payload_mask(key, 0, &mut payload);
    }
    WsFrame { head, payload }
}

pub fn write_frame(stream: &mut TcpStream, opcode: WsOpcode, fin: bool, payload: &[u8]) {
    let bytes = FrameEncoder::server().encode_vec(opcode, fin, payload);
    stream.write_all(&bytes).unwrap();
}

pub fn write_raw(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).unwrap();
}

// The close frame the client sends on a protocol violation: the status
// code it computed, empty reason.
pub fn expect_close_frame(stream: &mut TcpStream, code: u16) {
    let frame = read_frame(stream);
    assert_eq!(frame.opcode(), WsOpcode::Close);
    assert!(frame.head.mask.is_some(), "client frames must be masked");
    assert_eq!(frame.payload, code.to_be_bytes());
}
