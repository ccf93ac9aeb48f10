use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use fanout_server::cli;
use fanout_server::start;

pub const EVENTS_PORT: u16 = 39090;
pub const CLIENTS_PORT: u16 = 39099;

/// Boots the router on the test ports in a background thread and runs `f`
/// against it.
pub fn with_router<F>(f: F)
where
    F: FnOnce(),
{
    let _ = thread::spawn(|| {
        let args = cli::Serve {
            events_port: Some(EVENTS_PORT),
            clients_port: Some(CLIENTS_PORT),
        };
        let cmd = cli::Command::Serve(args);
        start(&cli::TopLevel {
            subcommand: Some(cmd),
        })
        .unwrap();
    });

    // give the server time to start
    thread::sleep(Duration::from_millis(500));

    f();
}

/// Lets in-flight registrations and deliveries land before the next step.
pub fn settle() {
    thread::sleep(Duration::from_millis(300));
}

pub fn connect_source() -> TcpStream {
    TcpStream::connect(("127.0.0.1", EVENTS_PORT)).expect("cannot reach the event listener")
}

pub fn connect_client(uid: u64) -> BufReader<TcpStream> {
    let mut stream =
        TcpStream::connect(("127.0.0.1", CLIENTS_PORT)).expect("cannot reach the client listener");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(stream, "{uid}\n").unwrap();

    BufReader::new(stream)
}

pub fn send_frame(source: &mut TcpStream, frame: &str) {
    source.write_all(frame.as_bytes()).unwrap();
}

/// Blocks until the client's next frame arrives.
pub fn read_frame(client: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    client.read_line(&mut line).unwrap();

    line
}

/// Asserts the connection was closed by the server.
pub fn expect_eof(client: &mut BufReader<TcpStream>) {
    let mut line = String::new();
    assert_eq!(client.read_line(&mut line).unwrap(), 0, "expected EOF");
}
