#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Reply the fake store sends for a key that was never set.
pub const NOT_FOUND: &str = "(nil)";

/// In-process stand-in for the VeroKV server.
pub struct FakeStore {
    pub port: u16,
    pub received: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<AtomicUsize>,
}

impl FakeStore {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Spawns a store that answers `set`/`get`/`del` lines in order, one reply
/// line per command, on every accepted connection.
pub async fn spawn_store() -> FakeStore {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let data = Arc::new(Mutex::new(HashMap::<String, String>::new()));

    let log = received.clone();
    let count = connections.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_store(stream, data.clone(), log.clone()));
        }
    });

    FakeStore {
        port,
        received,
        connections,
    }
}

async fn serve_store(stream: TcpStream, data: Arc<Mutex<HashMap<String, String>>>, log: Arc<Mutex<Vec<String>>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.lock().unwrap().push(line.clone());
        let parts: Vec<&str> = line.split_whitespace().collect();
        let reply = match parts.as_slice() {
            ["set", key, value] => {
                data.lock().unwrap().insert(key.to_string(), value.to_string());
                "OK".to_string()
            }
            ["get", key] => {
                let value = data.lock().unwrap().get(*key).cloned();
                format!("${}", value.as_deref().unwrap_or(NOT_FOUND))
            }
            ["del", key] => match data.lock().unwrap().remove(*key) {
                Some(_) => "$1".to_string(),
                None => "$0".to_string(),
            },
            _ => "ERR unknown command".to_string(),
        };
        if writer.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Binds a listener and hands back its port plus the listener itself, for
/// tests that script the server side by hand.
pub async fn scripted_listener() -> (u16, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (port, listener)
}

/// Returns a port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}
