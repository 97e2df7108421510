mod common;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use common::{closed_port, scripted_listener, spawn_store, NOT_FOUND};
use vkv_client::{ClientConfig, ClientError, ConnectionState, Framing, KVClient};

async fn client_for(port: u16) -> KVClient {
    let config = ClientConfig::new("127.0.0.1", port).connect_timeout(Duration::from_secs(1));
    KVClient::connect(&config).await.expect("connect")
}

#[tokio::test]
async fn client_set_get_roundtrip() {
    let store = spawn_store().await;
    let client = client_for(store.port).await;

    client.set(b"myKey", b"myValue").await.expect("set");
    let value = client.get(b"myKey").await.expect("get");

    assert_eq!(value, "myValue");
    assert_eq!(store.received(), vec!["set myKey myValue", "get myKey"]);
}

#[tokio::test]
async fn missing_key_sentinel_passes_through() {
    let store = spawn_store().await;
    let client = client_for(store.port).await;

    let value = client.get(b"neverSetKey").await.expect("get");
    assert_eq!(value, NOT_FOUND);
}

#[tokio::test]
async fn serialized_calls_keep_their_own_replies() {
    let store = spawn_store().await;
    let client = client_for(store.port).await;

    client.set(b"a", b"1").await.expect("set a");
    client.set(b"b", b"2").await.expect("set b");
    assert_eq!(client.get(b"a").await.expect("get a"), "1");
    assert_eq!(client.del(b"a").await.expect("del a"), "1");
    assert_eq!(client.get(b"a").await.expect("get a"), NOT_FOUND);
}

#[tokio::test]
async fn concurrent_calls_on_one_connection_are_not_cross_wired() {
    let store = spawn_store().await;
    let client = client_for(store.port).await;

    for idx in 0..20 {
        let key = format!("key{idx}");
        let value = format!("value{idx}");
        client.set(key.as_bytes(), value.as_bytes()).await.expect("set");
    }

    let mut tasks = Vec::new();
    for idx in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("key{idx}");
            (idx, client.get(key.as_bytes()).await)
        }));
    }

    for task in tasks {
        let (idx, value) = task.await.expect("join");
        assert_eq!(value.expect("get"), format!("value{idx}"));
    }
    assert_eq!(store.connections(), 1);
    assert_eq!(client.metrics().inflight, 0);
}

#[tokio::test]
async fn commands_issued_before_connect_are_queued() {
    let store = spawn_store().await;
    let client = KVClient::open("127.0.0.1", store.port);

    client.set(b"early", b"bird").await.expect("set");
    assert_eq!(client.get(b"early").await.expect("get"), "bird");
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn socket_close_fails_pending_get() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        // Hang up without answering.
        drop(reader);
    });

    let client = client_for(port).await;
    let result = tokio::time::timeout(Duration::from_secs(2), client.get(b"key"))
        .await
        .expect("get must fail, not hang");

    assert!(result.is_err());
    assert!(!client.is_usable());
    // Later calls fail fast with the same terminal error.
    assert!(client.get(b"key").await.is_err());
}

#[tokio::test]
async fn socket_reset_fails_pending_get_with_io_error() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        stream.set_linger(Some(Duration::ZERO)).expect("linger");
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        // Zero linger turns the close into a reset.
        drop(reader);
    });

    let client = client_for(port).await;
    let result = tokio::time::timeout(Duration::from_secs(2), client.get(b"key"))
        .await
        .expect("get must fail, not hang");

    assert!(matches!(result, Err(ClientError::Io(_))), "got {result:?}");
    assert!(matches!(client.state(), ConnectionState::Errored(_)));
}

#[tokio::test]
async fn unterminated_reply_completes_when_socket_goes_quiet() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        lines.next_line().await.expect("read").expect("line");
        writer.write_all(b"$hello").await.expect("write");
        // Keep the socket open so only the quiet period ends the reply.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = client_for(port).await;
    let value = tokio::time::timeout(Duration::from_secs(2), client.get(b"k"))
        .await
        .expect("get must complete")
        .expect("get");
    assert_eq!(value, "hello");
}

#[tokio::test]
async fn bulk_reply_in_one_write_reaches_one_caller() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(lines.next_line().await.expect("read").expect("line"), "get myKey");
        assert_eq!(lines.next_line().await.expect("read").expect("line"), "get otherKey");

        writer.write_all(b"$7\r\nmyValue\r\n\n\0").await.expect("write");
        tokio::time::sleep(Duration::from_millis(100)).await;
        writer.write_all(b"$10\r\notherValue\r\n\n\0").await.expect("write");
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = client_for(port).await;
    let (mine, other) = tokio::join!(client.get(b"myKey"), client.get(b"otherKey"));

    assert_eq!(mine.expect("get myKey"), "myValue");
    assert_eq!(other.expect("get otherKey"), "otherValue");
    assert_eq!(client.metrics().unsolicited_total, 0);
}

#[tokio::test]
async fn replies_split_across_writes_are_reassembled() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        lines.next_line().await.expect("read").expect("line");
        lines.next_line().await.expect("read").expect("line");

        for chunk in [&b"$hel"[..], b"lo\n\0", b"$5\r\nwor", b"ld\r\n\n\0"] {
            writer.write_all(chunk).await.expect("write");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = ClientConfig::new("127.0.0.1", port).reply_flush(Duration::from_millis(500));
    let client = KVClient::connect(&config).await.expect("connect");
    let (first, second) = tokio::join!(client.get(b"a"), client.get(b"b"));

    assert_eq!(first.expect("get a"), "hello");
    assert_eq!(second.expect("get b"), "world");
}

#[tokio::test]
async fn coalesced_replies_in_one_write_are_split() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        for _ in 0..3 {
            lines.next_line().await.expect("read").expect("line");
        }
        writer.write_all(b"$one\n\0$3\r\ntwo\r\n\n\0OK\n\0").await.expect("write");
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = client_for(port).await;
    let (one, two, three) = tokio::join!(client.get(b"a"), client.get(b"b"), client.del(b"c"));

    assert_eq!(one.expect("get a"), "one");
    assert_eq!(two.expect("get b"), "two");
    assert_eq!(three.expect("del c"), "OK");
    assert_eq!(client.metrics().unsolicited_total, 0);
}

#[tokio::test]
async fn large_concurrent_writes_do_not_stall_reads() {
    let store = spawn_store().await;
    let config = ClientConfig::new("127.0.0.1", store.port)
        .connect_timeout(Duration::from_secs(1))
        .reply_flush(Duration::from_secs(1));
    let client = KVClient::connect(&config).await.expect("connect");

    // Big values each way overrun both socket buffers unless reads keep
    // draining while writes are blocked.
    let mut tasks = Vec::new();
    for idx in 0..32u8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("big{idx}");
            let value = vec![b'a' + idx % 26; 256 * 1024];
            client.set(key.as_bytes(), &value).await.expect("set");
            let echoed = client.get(key.as_bytes()).await.expect("get");
            (echoed.len(), echoed.bytes().all(|b| b == value[0]))
        }));
    }

    let all = async {
        for task in tasks {
            let (len, uniform) = task.await.expect("join");
            assert_eq!(len, 256 * 1024);
            assert!(uniform);
        }
    };
    tokio::time::timeout(Duration::from_secs(30), all).await.expect("no stall");
    assert_eq!(client.metrics().inflight, 0);
}

#[tokio::test]
async fn abandoned_get_does_not_steal_next_reply() {
    let (port, listener) = scripted_listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let first = lines.next_line().await.expect("read").expect("line");
        assert_eq!(first, "get slow");
        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.write_all(b"$slow-value\n").await.expect("write");

        let second = lines.next_line().await.expect("read").expect("line");
        assert_eq!(second, "get fast");
        writer.write_all(b"$fast-value\n").await.expect("write");
    });

    let client = client_for(port).await;
    let timed_out = tokio::time::timeout(Duration::from_millis(50), client.get(b"slow")).await;
    assert!(timed_out.is_err());

    let value = client.get(b"fast").await.expect("get");
    assert_eq!(value, "fast-value");
    assert_eq!(client.metrics().abandoned_total, 1);
}

#[tokio::test]
async fn refused_connection_surfaces_error() {
    let port = closed_port().await;
    let client = KVClient::open("127.0.0.1", port);

    let err = client.ready().await.expect_err("connect must fail");
    assert!(matches!(err, ClientError::Io(_)));
    assert!(matches!(client.state(), ConnectionState::Errored(_)));
    assert!(matches!(client.get(b"key").await, Err(ClientError::Io(_))));
}

#[tokio::test]
async fn line_framing_rejects_spaces_before_writing() {
    let store = spawn_store().await;
    let client = client_for(store.port).await;

    let err = client.set(b"my key", b"value").await.expect_err("invalid");
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    client.set(b"ok", b"value").await.expect("set");
    assert_eq!(store.received(), vec!["set ok value"]);
}

#[tokio::test]
async fn resp_framing_sends_length_prefixed_arguments() {
    let (port, listener) = scripted_listener().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let expected = b"*3\r\n$3\r\nset\r\n$6\r\nmy key\r\n$5\r\na b c\r\n";
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).await.expect("read");
        stream.write_all(b"OK\n").await.expect("write");
        buf == expected
    });

    let config = ClientConfig::new("127.0.0.1", port).framing(Framing::Resp);
    let client = KVClient::connect(&config).await.expect("connect");
    client.set(b"my key", b"a b c").await.expect("set");

    assert!(server.await.expect("join"));
}
