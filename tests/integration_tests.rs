//! Integration tests for SeriesVault
//!
//! Tests the complete system over real TCP connections

use seriesvault::{Client, Command, Sample, SeriesVaultError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

/// Helper function to start a test server
async fn start_test_server(port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = seriesvault::ServerConfig {
            bind_addr: format!("127.0.0.1:{}", port),
            max_connections: 100,
            max_request_size: 64 * 1024,
        };

        let server = seriesvault::SeriesVaultServer::new(config);
        let _ = server.run().await;
    })
}

/// Helper function to wait for server to be ready
async fn wait_for_server(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..50 {
        if let Ok(client) = Client::connect(addr).await {
            let _ = client.close().await;
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }
    Err("Server failed to start".into())
}

/// Read from a raw stream until a full response frame has arrived
async fn read_frame(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    while !data.ends_with(b"\n\n") {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "server closed the connection");
        data.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(data).unwrap()
}

fn put(key: &str, value: f64, timestamp: i64) -> Command {
    Command::Put {
        key: key.to_string(),
        value,
        timestamp,
    }
}

#[tokio::test]
async fn test_round_trip_batch() {
    let port = 18090;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut client = Client::connect(&addr).await.unwrap();

    // one request carrying five puts
    let stored = client
        .execute(&[
            put("test", 0.5, 1),
            put("test", 2.0, 2),
            put("test", 0.5, 3),
            put("load", 3.0, 4),
            put("load", 4.0, 5),
        ])
        .await
        .unwrap();
    assert!(stored.is_empty());

    let result = client.get("*").await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(
        result["test"],
        vec![Sample::new(1, 0.5), Sample::new(2, 2.0), Sample::new(3, 0.5)]
    );
    assert_eq!(result["load"], vec![Sample::new(4, 3.0), Sample::new(5, 4.0)]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_last_write_wins_and_missing_keys() {
    let port = 18091;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut client = Client::connect(&addr).await.unwrap();

    client.put("cpu", 1.0, 100).await.unwrap();
    client.put("cpu", 9.5, 100).await.unwrap();
    client.put("cpu", 0.25, 50).await.unwrap();

    let result = client.get("cpu").await.unwrap();
    assert_eq!(result["cpu"], vec![Sample::new(50, 0.25), Sample::new(100, 9.5)]);

    // never-written keys come back empty rather than failing
    let result = client.get("nope").await.unwrap();
    assert!(result.is_empty());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_wire_format() {
    let port = 18092;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut stream = TcpStream::connect(&addr).await.unwrap();

    stream.write_all(b"get nope\n").await.unwrap();
    assert_eq!(read_frame(&mut stream).await, "ok\n\n");

    stream.write_all(b"put load 3 4\nget load\n").await.unwrap();
    assert_eq!(read_frame(&mut stream).await, "ok\nload 3.0 4\n\n");

    stream.write_all(b"foo bar\n").await.unwrap();
    assert_eq!(read_frame(&mut stream).await, "error\nwrong command\n\n");

    // the connection survives the protocol error
    stream.write_all(b"get foo\n").await.unwrap();
    assert_eq!(read_frame(&mut stream).await, "ok\n\n");
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let port = 18093;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let request = "put t\u{e9}mp 21.5 7\nget t\u{e9}mp\n".as_bytes();

    // split inside the multi-byte character, then before the final newline
    stream.write_all(&request[..6]).await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(&request[6..request.len() - 1]).await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(b"\n").await.unwrap();

    assert_eq!(read_frame(&mut stream).await, "ok\nt\u{e9}mp 21.5 7\n\n");
}

#[tokio::test]
async fn test_malformed_batch_applies_nothing() {
    let port = 18094;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"put good 1.0 1\nput good 2.0 2\nput bad x 3\n")
        .await
        .unwrap();
    assert_eq!(read_frame(&mut stream).await, "error\nwrong command\n\n");

    let mut client = Client::connect(&addr).await.unwrap();
    assert!(client.get("*").await.unwrap().is_empty());

    let err = client
        .execute(&[Command::Get {
            key: String::new(),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, SeriesVaultError::Server(ref m) if m == "wrong command"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let port = 18095;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(&vec![b'x'; 64 * 1024 + 1]).await.unwrap();
    assert_eq!(
        read_frame(&mut stream).await,
        "error\nrequest exceeds 65536 bytes\n\n"
    );

    // the rest of the rejected request is dropped without a reply
    stream.write_all(b"\nput leaked 1 1\n").await.unwrap();
    stream.flush().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    stream.write_all(b"get *\n").await.unwrap();
    assert_eq!(read_frame(&mut stream).await, "ok\n\n");
}

#[tokio::test]
async fn test_concurrent_clients() {
    let port = 18096;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let num_clients = 10;
    let ops_per_client = 50;
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&addr).await.unwrap();
            let key = format!("client_{}", client_id);

            for i in 0..ops_per_client {
                // a put and a get in one batch always see each other
                let result = client
                    .execute(&[
                        put(&key, i as f64, i),
                        Command::Get { key: key.clone() },
                    ])
                    .await
                    .unwrap();
                assert_eq!(result[&key].len(), i as usize + 1);
                assert_eq!(result[&key].last(), Some(&Sample::new(i, i as f64)));
            }

            client.close().await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let mut client = Client::connect(&addr).await.unwrap();
    let result = client.get("*").await.unwrap();
    assert_eq!(result.len(), num_clients);
    assert!(result.values().all(|samples| samples.len() == ops_per_client as usize));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_put_now_and_timeout_connect() {
    let port = 18097;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut client = Client::connect_timeout(&addr, Duration::from_secs(5))
        .await
        .unwrap();
    client.put_now("uptime", 1.5).await.unwrap();

    let result = client.get("uptime").await.unwrap();
    assert_eq!(result["uptime"].len(), 1);
    assert!(result["uptime"][0].timestamp > 0);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_error_handling() {
    let result = Client::connect("127.0.0.1:99999").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_timed_out_request_disables_client() {
    // answers each request only after the client has given up on it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut chunk = [0u8; 1024];
        while let Ok(n) = stream.read(&mut chunk).await {
            if n == 0 {
                break;
            }
            sleep(Duration::from_millis(500)).await;
            if stream.write_all(b"ok\nfirst 1.0 1\n\n").await.is_err() {
                break;
            }
        }
    });

    let mut client = Client::connect_timeout(&addr, Duration::from_millis(200))
        .await
        .unwrap();

    let err = client.get("first").await.unwrap_err();
    assert!(matches!(err, SeriesVaultError::Client(ref m) if m == "request timed out"));

    // the late reply must never be read as the answer to this one
    sleep(Duration::from_millis(600)).await;
    let err = client.get("second").await.unwrap_err();
    assert!(matches!(err, SeriesVaultError::Client(ref m) if m.contains("out of sync")));
}

#[tokio::test]
async fn test_empty_batch_is_rejected_locally() {
    let port = 18098;
    let addr = format!("127.0.0.1:{}", port);

    let _server_handle = start_test_server(port).await;
    wait_for_server(&addr).await.unwrap();

    let mut client = Client::connect(&addr).await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), client.execute(&[]))
        .await
        .expect("empty batch must not wait for a reply")
        .unwrap_err();
    assert!(matches!(err, SeriesVaultError::Client(ref m) if m == "empty request"));

    // the connection is still usable
    client.put("after", 1.0, 1).await.unwrap();
    assert_eq!(client.get("after").await.unwrap()["after"], vec![Sample::new(1, 1.0)]);

    client.close().await.unwrap();
}
