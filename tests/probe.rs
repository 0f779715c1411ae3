use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use autoatlas::probe::{HttpProbe, Reachability, ReachabilityProbe};

/// Serves `connections` requests with the given status line, then exits.
fn stub_server(status: &'static str, connections: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/tile.png", listener.local_addr().unwrap());
    thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let mut stream = stream.unwrap();
            let mut buffer = [0u8; 2048];
            let _ = stream.read(&mut buffer);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: image/png\r\nContent-Length: 2\r\n\
                 Connection: close\r\n\r\nok",
                status
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    url
}

/// Accepts connections and holds them open without ever answering.
fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/tile.png", listener.local_addr().unwrap());
    thread::spawn(move || {
        let mut held: Vec<TcpStream> = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    url
}

#[test]
fn responsive_endpoint_is_reachable() {
    let url = stub_server("200 OK", 1);
    let outcome = HttpProbe::new().probe(&url, Duration::from_millis(1500));
    assert_eq!(outcome, Reachability::Reachable);
}

#[test]
fn error_status_is_unreachable() {
    let url = stub_server("503 Service Unavailable", 1);
    let outcome = HttpProbe::new().probe(&url, Duration::from_millis(1500));
    assert_eq!(outcome, Reachability::Unreachable);
}

#[test]
fn silent_endpoint_is_unreachable_within_the_timeout() {
    let url = silent_server();
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let outcome = HttpProbe::new().probe(&url, timeout);
    let elapsed = started.elapsed();

    assert_eq!(outcome, Reachability::Unreachable);
    assert!(
        elapsed < timeout + Duration::from_millis(700),
        "probe took {:?} against a {:?} timeout",
        elapsed,
        timeout
    );
}
