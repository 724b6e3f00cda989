use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use kira_geo::error::KiraError;
use kira_geo::geo::GeoHttpClient;
use kira_geo::transfer::Transport;

/// Serves one request, writing `body` a byte at a time with `gap` between
/// bytes. With `stall_after`, the server goes quiet after that many bytes.
fn serve_slowly(body: &'static [u8], gap: Duration, stall_after: Option<usize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 && line != "\r\n" {
            line.clear();
        }
        let mut stream = stream;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.flush();
        for (index, byte) in body.iter().enumerate() {
            if stall_after == Some(index) {
                thread::sleep(Duration::from_secs(5));
                return;
            }
            thread::sleep(gap);
            if stream.write_all(&[*byte]).and_then(|_| stream.flush()).is_err() {
                return;
            }
        }
    });
    format!("http://{addr}/GSE1_RAW.tar")
}

#[test]
fn slow_transfer_outlives_the_read_timeout() {
    const BODY: &[u8] = b"0123456789abcdefghijklmno";
    let url = serve_slowly(BODY, Duration::from_millis(100), None);
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("GSE1_RAW.tar");
    let client = GeoHttpClient::new().unwrap();

    let start = Instant::now();
    client
        .fetch_to(&url, &destination, Duration::from_secs(1))
        .unwrap();
    assert!(start.elapsed() > Duration::from_secs(1));
    assert_eq!(fs::read(&destination).unwrap(), BODY);
}

#[test]
fn stalled_transfer_times_out() {
    let url = serve_slowly(b"0123456789", Duration::from_millis(10), Some(2));
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("GSE1_RAW.tar");
    let timeout = Duration::from_millis(500);
    let client = GeoHttpClient::new()
        .unwrap()
        .with_read_timeout(timeout)
        .unwrap();

    let start = Instant::now();
    let err = client.fetch_to(&url, &destination, timeout).unwrap_err();
    assert_matches!(err, KiraError::Transfer { .. });
    assert!(start.elapsed() < Duration::from_secs(4));
}
