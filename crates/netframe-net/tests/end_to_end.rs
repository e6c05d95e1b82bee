//! End-to-end scenarios driving the engines over real TCP sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use netframe_net::{
    Client, ConnectionHandler, Configuration, LengthPrefixProcessor, PacketStream, SendHandle,
    Server, ServerHandler,
};

fn connect_retrying(addr: &str) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(err) => panic!("could not connect to {addr}: {err}"),
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).expect("header");
    let len = u32::from_le_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("payload");
    payload
}

#[derive(Default)]
struct NoopServerHandler;
impl ServerHandler for NoopServerHandler {}

struct EchoHandler {
    send: Option<SendHandle>,
}
impl ConnectionHandler for EchoHandler {
    fn on_connected(&mut self, send: SendHandle) {
        self.send = Some(send);
    }

    fn on_message_received(&mut self, mut packet: PacketStream) {
        let text: String = packet.read().expect("valid string frame");
        let mut out = PacketStream::for_sending();
        out.write(&text).unwrap();
        self.send.as_ref().unwrap().send(&mut out);
    }
}

#[test]
fn echo_single_string() {
    let addr = "127.0.0.1:18080";
    let config = Configuration::new(18080, 4).with_host("127.0.0.1");
    let mut server = Server::new(config, LengthPrefixProcessor, NoopServerHandler, || EchoHandler {
        send: None,
    });
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    let mut client = connect_retrying(addr);
    let mut out = PacketStream::for_sending();
    out.write(&"hello".to_string()).unwrap();
    client.write_all(&out.buffer()).unwrap();

    let payload = read_frame(&mut client);
    let mut input = PacketStream::from_bytes(payload.into());
    assert_eq!(input.read::<String>().unwrap(), "hello");

    handle.stop();
    join.join().unwrap();
}

#[test]
fn split_packet_delivers_two_messages_in_order() {
    let addr = "127.0.0.1:18081";
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log_factory = log.clone();

    struct RecordingHandler {
        log: Arc<Mutex<Vec<String>>>,
    }
    impl ConnectionHandler for RecordingHandler {
        fn on_message_received(&mut self, mut packet: PacketStream) {
            let text: String = packet.read().unwrap();
            self.log.lock().unwrap().push(text);
        }
    }

    let config = Configuration::new(18081, 4).with_host("127.0.0.1");
    let mut server = Server::new(config, LengthPrefixProcessor, NoopServerHandler, move || {
        RecordingHandler { log: log_factory.clone() }
    });
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    let mut client = connect_retrying(addr);
    let mut wire = frame(b"a");
    wire.extend(frame(b"bc"));
    client.write_all(&wire).unwrap();

    assert!(wait_until(|| log.lock().unwrap().len() == 2, Duration::from_secs(2)));
    assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "bc".to_string()]);

    handle.stop();
    join.join().unwrap();
}

#[test]
fn merged_packet_single_send_yields_one_message() {
    // Reassembly across arbitrary read chunk boundaries is exercised
    // precisely at the unit level (see netframe-net's assembly module);
    // this is the integration-level confirmation that a client built on
    // the same engine sees exactly one message per server-side send.
    let addr = "127.0.0.1:18082";

    struct WelcomeOnce;
    impl ConnectionHandler for WelcomeOnce {
        fn on_connected(&mut self, send: SendHandle) {
            let mut out = PacketStream::for_sending();
            out.write(&"hello world".to_string()).unwrap();
            send.send(&mut out);
        }

        fn on_message_received(&mut self, _packet: PacketStream) {}
    }

    let config = Configuration::new(18082, 4).with_host("127.0.0.1");
    let mut server =
        Server::new(config, LengthPrefixProcessor, NoopServerHandler, || WelcomeOnce);
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    struct ClientRecorder {
        received: Arc<Mutex<Vec<String>>>,
    }
    impl ConnectionHandler for ClientRecorder {
        fn on_message_received(&mut self, mut packet: PacketStream) {
            let text: String = packet.read().unwrap();
            self.received.lock().unwrap().push(text);
        }
    }

    // give the server a moment to be accepting connections
    let _ = connect_retrying(addr);

    let received = Arc::new(Mutex::new(Vec::new()));
    let client_received = received.clone();
    let mut client = Client::connect(
        "127.0.0.1",
        18082,
        1024,
        LengthPrefixProcessor,
        ClientRecorder { received: client_received },
    )
    .unwrap();

    assert!(wait_until(|| received.lock().unwrap().len() == 1, Duration::from_secs(2)));
    assert_eq!(received.lock().unwrap()[0], "hello world");

    client.disconnect();
    handle.stop();
    join.join().unwrap();
}

#[test]
fn oversize_frame_disconnects_only_the_offending_client() {
    let addr = "127.0.0.1:18083";
    let config = Configuration::new(18083, 4).with_host("127.0.0.1").with_buffer_size(64);
    let mut server = Server::new(config, LengthPrefixProcessor, NoopServerHandler, || EchoHandler {
        send: None,
    });
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    let mut bad = connect_retrying(addr);
    bad.write_all(&1024u32.to_le_bytes()).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(bad.read(&mut buf).unwrap(), 0, "oversize frame must close the connection");

    let mut good = connect_retrying(addr);
    let mut out = PacketStream::for_sending();
    out.write(&"still alive".to_string()).unwrap();
    good.write_all(&out.buffer()).unwrap();
    let payload = read_frame(&mut good);
    let mut input = PacketStream::from_bytes(payload.into());
    assert_eq!(input.read::<String>().unwrap(), "still alive");

    handle.stop();
    join.join().unwrap();
}

#[test]
fn max_connections_rejects_the_fifth_client_without_leaking() {
    let addr = "127.0.0.1:18084";
    struct Welcome;
    impl ConnectionHandler for Welcome {
        fn on_connected(&mut self, send: SendHandle) {
            let mut out = PacketStream::for_sending();
            out.write(&"welcome".to_string()).unwrap();
            send.send(&mut out);
        }
        fn on_message_received(&mut self, _packet: PacketStream) {}
    }

    let config = Configuration::new(18084, 4).with_host("127.0.0.1");
    let mut server = Server::new(config, LengthPrefixProcessor, NoopServerHandler, || Welcome);
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    let mut clients: Vec<TcpStream> = Vec::new();
    for _ in 0..4 {
        let mut client = connect_retrying(addr);
        let payload = read_frame(&mut client);
        let mut input = PacketStream::from_bytes(payload.into());
        assert_eq!(input.read::<String>().unwrap(), "welcome");
        clients.push(client);
    }

    let mut fifth = connect_retrying(addr);
    let mut buf = [0u8; 1];
    assert_eq!(fifth.read(&mut buf).unwrap(), 0, "fifth client must be rejected at the app layer");

    assert!(wait_until(|| handle.clients().len() == 4, Duration::from_secs(1)));

    handle.stop();
    join.join().unwrap();
}

#[test]
fn graceful_stop_disconnects_every_client_exactly_once_and_is_idempotent() {
    let addr = "127.0.0.1:18085";
    struct CountingServerHandler {
        disconnects: Arc<AtomicUsize>,
    }
    impl ServerHandler for CountingServerHandler {
        fn on_client_disconnected(&mut self, _identity: netframe_net::Identity) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    let disconnects = Arc::new(AtomicUsize::new(0));
    let config = Configuration::new(18085, 16).with_host("127.0.0.1");
    let mut server = Server::new(
        config,
        LengthPrefixProcessor,
        CountingServerHandler { disconnects: disconnects.clone() },
        || EchoHandler { send: None },
    );
    let handle = server.handle();
    let join = thread::spawn(move || server.start().unwrap());

    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(connect_retrying(addr));
    }
    assert!(wait_until(|| handle.clients().len() == 10, Duration::from_secs(2)));

    handle.stop();
    handle.stop(); // idempotent: must not panic or double-fire callbacks

    join.join().unwrap();
    assert_eq!(disconnects.load(Ordering::SeqCst), 10);

    for mut client in clients {
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
