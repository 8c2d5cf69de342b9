//! Master-side replication over real sockets: full resync, write
//! propagation and WAIT acknowledgement counting, with the test acting as
//! the replica.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

use redstream::resp::RespValue;
use redstream::server::RedisServer;

async fn start_master(port: u16) {
    let server = RedisServer::new(vec![
        "redstream".to_string(),
        "--port".to_string(),
        port.to_string(),
    ])
    .unwrap();

    tokio::spawn(server.run());
}

async fn connect(port: u16) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(format!("127.0.0.1:{}", port)).await {
            return stream;
        }

        sleep(Duration::from_millis(20)).await;
    }

    panic!("server did not start listening on port {}", port);
}

/// Reads one RESP frame from the stream, buffering as needed.
async fn read_frame(stream: &mut TcpStream, buffer: &mut BytesMut) -> RespValue {
    loop {
        if let Some((value, _)) = RespValue::decode(buffer).unwrap() {
            return value;
        }

        let read = stream.read_buf(buffer).await.unwrap();
        assert!(read > 0, "connection closed while waiting for a frame");
    }
}

async fn send(stream: &mut TcpStream, parts: &[&str]) {
    stream
        .write_all(RespValue::command(parts).encode().as_bytes())
        .await
        .unwrap();
    stream.flush().await.unwrap();
}

/// Performs the replica handshake and consumes the RDB payload, returning
/// the connection with its (possibly non-empty) read buffer.
async fn attach_as_replica(port: u16) -> (TcpStream, BytesMut) {
    let mut stream = connect(port).await;
    let mut buffer = BytesMut::new();

    send(&mut stream, &["PING"]).await;
    assert_eq!(
        read_frame(&mut stream, &mut buffer).await,
        RespValue::SimpleString("PONG".to_string())
    );

    send(&mut stream, &["REPLCONF", "listening-port", "6380"]).await;
    assert_eq!(
        read_frame(&mut stream, &mut buffer).await,
        RespValue::SimpleString("OK".to_string())
    );

    send(&mut stream, &["REPLCONF", "capa", "psync2"]).await;
    assert_eq!(
        read_frame(&mut stream, &mut buffer).await,
        RespValue::SimpleString("OK".to_string())
    );

    send(&mut stream, &["PSYNC", "?", "-1"]).await;
    let fullresync = read_frame(&mut stream, &mut buffer).await;
    let RespValue::SimpleString(line) = fullresync else {
        panic!("expected FULLRESYNC, got {:?}", fullresync);
    };
    assert!(line.starts_with("FULLRESYNC "), "got {:?}", line);

    // The RDB bulk: $<len>\r\n then exactly <len> raw bytes, no CRLF.
    let header_end = loop {
        if let Some(position) = buffer.windows(2).position(|window| window == b"\r\n") {
            break position + 2;
        }

        stream.read_buf(&mut buffer).await.unwrap();
    };

    let header = String::from_utf8_lossy(&buffer[..header_end - 2]).to_string();
    let length: usize = header.strip_prefix('$').unwrap().parse().unwrap();
    let _ = buffer.split_to(header_end);

    while buffer.len() < length {
        stream.read_buf(&mut buffer).await.unwrap();
    }

    let rdb = buffer.split_to(length);
    assert_eq!(&rdb[..9], b"REDIS0011");

    // Give the master a moment to register the replica for fan-out.
    sleep(Duration::from_millis(50)).await;

    (stream, buffer)
}

#[tokio::test]
async fn test_full_resync_then_write_propagation() {
    let port = 47801;
    start_master(port).await;

    let (mut replica, mut replica_buffer) = attach_as_replica(port).await;

    let mut client = connect(port).await;
    let mut client_buffer = BytesMut::new();

    send(&mut client, &["SET", "fruit", "mango"]).await;
    assert_eq!(
        read_frame(&mut client, &mut client_buffer).await,
        RespValue::SimpleString("OK".to_string())
    );

    // The write arrives on the replica connection re-encoded as sent.
    assert_eq!(
        read_frame(&mut replica, &mut replica_buffer).await,
        RespValue::command(&["SET", "fruit", "mango"])
    );

    // Reads are not propagated.
    send(&mut client, &["GET", "fruit"]).await;
    assert_eq!(
        read_frame(&mut client, &mut client_buffer).await,
        RespValue::SimpleString("mango".to_string())
    );
}

#[tokio::test]
async fn test_wait_counts_acked_replicas() {
    let port = 47802;
    start_master(port).await;

    let (mut replica, mut replica_buffer) = attach_as_replica(port).await;

    let mut client = connect(port).await;
    let mut client_buffer = BytesMut::new();

    send(&mut client, &["SET", "k", "v"]).await;
    assert_eq!(
        read_frame(&mut client, &mut client_buffer).await,
        RespValue::SimpleString("OK".to_string())
    );

    let propagated = read_frame(&mut replica, &mut replica_buffer).await;
    let acked_offset = propagated.encode().len();

    // Answer the GETACK the WAIT broadcasts with our consumed offset.
    let replica_task = tokio::spawn(async move {
        let getack = read_frame(&mut replica, &mut replica_buffer).await;
        assert_eq!(getack, RespValue::command(&["REPLCONF", "GETACK", "*"]));

        send(
            &mut replica,
            &["REPLCONF", "ACK", &acked_offset.to_string()],
        )
        .await;

        replica
    });

    send(&mut client, &["WAIT", "1", "2000"]).await;
    assert_eq!(
        read_frame(&mut client, &mut client_buffer).await,
        RespValue::Integer(1)
    );

    replica_task.await.unwrap();
}

#[tokio::test]
async fn test_wait_with_no_writes_returns_replica_count() {
    let port = 47803;
    start_master(port).await;

    let (_replica, _replica_buffer) = attach_as_replica(port).await;

    let mut client = connect(port).await;
    let mut client_buffer = BytesMut::new();

    send(&mut client, &["WAIT", "5", "100"]).await;
    assert_eq!(
        read_frame(&mut client, &mut client_buffer).await,
        RespValue::Integer(1)
    );
}
