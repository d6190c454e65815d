//! Fake HTTP and STOMP servers for tests.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::Mutex;
use radiovis_protocol::{decode_frame, encode_frame, Command, Frame};

use crate::client::EventHandler;

/// Upper bound for any single wait in tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Event handler forwarding into a channel.
pub fn collector<E: Send + 'static>() -> (EventHandler<E>, mpsc::Receiver<E>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handler: EventHandler<E> = Arc::new(move |event| {
        let _ = tx.lock().send(event);
    });
    (handler, rx)
}

/// Read one HTTP request head.
pub fn read_http_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Port bound by nothing, so connects are refused.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// HTTP server answering connections in turn with the request path as body.
pub struct HttpServer {
    pub port: u16,
    /// Request heads, in arrival order.
    pub requests: mpsc::Receiver<String>,
    handle: JoinHandle<usize>,
}

impl HttpServer {
    /// Serve `count` connections. The first response is held until `gate`
    /// fires, when one is given.
    pub fn spawn(count: usize, gate: Option<mpsc::Receiver<()>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, requests) = mpsc::channel();

        let handle = thread::spawn(move || {
            for i in 0..count {
                let (mut stream, _) = listener.accept().unwrap();
                let request = read_http_request(&mut stream);
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(request);

                if i == 0 {
                    if let Some(gate) = &gate {
                        let _ = gate.recv_timeout(WAIT);
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n{}",
                    path
                );
                let _ = stream.write_all(response.as_bytes());
            }

            // Count connections that arrive after the expected ones.
            listener.set_nonblocking(true).unwrap();
            let deadline = Instant::now() + Duration::from_millis(300);
            let mut extra = 0;
            while Instant::now() < deadline {
                match listener.accept() {
                    Ok(_) => extra += 1,
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            }
            extra
        });

        Self {
            port,
            requests,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Wait for the server thread; returns the number of unexpected connections.
    pub fn finish(self) -> usize {
        self.handle.join().unwrap()
    }
}

/// Behaviour of a [`StompServer`].
#[derive(Default)]
pub struct StompScript {
    /// Answer an HTTP CONNECT before speaking STOMP.
    pub tunnel: bool,
    /// SUBSCRIBE frames to wait for before sending `frames`.
    pub subscriptions: usize,
    /// Frames sent after the subscriptions arrive.
    pub frames: Vec<Frame>,
    /// Keep reading after the script until DISCONNECT or EOF.
    pub linger: bool,
}

/// Single-connection STOMP server.
pub struct StompServer {
    pub port: u16,
    handle: JoinHandle<Vec<Frame>>,
}

impl StompServer {
    pub fn spawn(script: StompScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(WAIT)).unwrap();

            if script.tunnel {
                let request = read_http_request(&mut stream);
                assert!(request.starts_with("CONNECT "), "unexpected {:?}", request);
                stream
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .unwrap();
            }

            let mut buf = BytesMut::new();
            let mut received = Vec::new();

            match read_frame(&mut stream, &mut buf) {
                Some(frame) if frame.command == Command::Connect => received.push(frame),
                other => panic!("expected CONNECT, got {:?}", other),
            }
            let connected = Frame::new(Command::Connected).header("session", "test-1");
            stream.write_all(&encode_frame(&connected)).unwrap();

            let mut subscribed = 0;
            while subscribed < script.subscriptions {
                let Some(frame) = read_frame(&mut stream, &mut buf) else {
                    return received;
                };
                if frame.command == Command::Subscribe {
                    subscribed += 1;
                }
                received.push(frame);
            }

            for frame in &script.frames {
                stream.write_all(&encode_frame(frame)).unwrap();
            }

            if script.linger {
                while let Some(frame) = read_frame(&mut stream, &mut buf) {
                    let done = frame.command == Command::Disconnect;
                    received.push(frame);
                    if done {
                        break;
                    }
                }
            }

            received
        });

        Self { port, handle }
    }

    /// Frames received from the client.
    pub fn finish(self) -> Vec<Frame> {
        self.handle.join().unwrap()
    }
}

fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> Option<Frame> {
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(frame) = decode_frame(buf).unwrap() {
            return Some(frame);
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// A MESSAGE frame on `destination` with `body`.
pub fn message(destination: &str, body: &str) -> Frame {
    Frame::new(Command::Message)
        .header("destination", destination)
        .body(body.to_string())
}
