//! Integration tests driving a real server instance over HTTP and WebSocket.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use sasayaki_server::{
    domain::Message,
    infrastructure::store::DurableLog,
    ui::{SERVER_CLOSING, Server, ServerConfig},
};
use serde_json::json;
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const USERS: &str = r##"
alice:
  token: alice-token
  color: "#f00"
  writeWhispers: [bob]

bob:
  token: bob-token
  writeWhispers: []

admin:
  token: admin-token
  perms: [delete]
  readWhispers: ["*"]
  hidden: true
"##;

/// Helper struct to manage an in-process server
struct TestServer {
    dir: TempDir,
    port: u16,
    client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let users_path = dir.path().join("users.yaml");
        std::fs::write(&users_path, USERS).unwrap();

        let config = ServerConfig {
            users_path,
            store_path: dir.path().join("messages.log"),
            ..ServerConfig::default()
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            Server::new(config)
                .serve(listener, async move {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        TestServer {
            dir,
            port,
            client: reqwest::Client::new(),
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn auth(user: &str) -> String {
        format!("{} {}-token", user, user)
    }

    async fn post(&self, user: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/messages"))
            .header("Authorization", Self::auth(user))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn messages(&self, user: &str) -> Vec<Message> {
        let resp = self
            .client
            .get(self.url("/messages"))
            .header("Authorization", Self::auth(user))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    /// Open a live stream; returns the socket and its session id.
    async fn listen(&self, user: &str) -> (WsStream, String) {
        let mut request = format!("ws://127.0.0.1:{}/ws", self.port)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&Self::auth(user)).unwrap(),
        );

        let (ws, response) = connect_async(request).await.unwrap();
        let session = response
            .headers()
            .get("session-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        // Registration completes right after the upgrade.
        tokio::time::sleep(Duration::from_millis(100)).await;
        (ws, session)
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

async fn next_text(ws: &mut WsStream) -> Option<String> {
    loop {
        match tokio::time::timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => return Some(text.as_str().to_string()),
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_health_check() {
    // テスト項目: ヘルスチェックが認証なしで応答する
    // given (前提条件):
    let mut server = TestServer::start().await;

    // when (操作):
    let resp = reqwest::get(server.url("/api/health")).await.unwrap();

    // then (期待する結果):
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unauthorized_requests_are_rejected() {
    // テスト項目: 認証ヘッダーがない、またはトークンが違う場合は 401
    // given (前提条件):
    let mut server = TestServer::start().await;

    // when (操作):
    let missing = server.client.get(server.url("/messages")).send().await.unwrap();
    let wrong = server
        .client
        .get(server.url("/messages"))
        .header("Authorization", "alice bob-token")
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = wrong.json().await.unwrap();
    assert!(body.get("error").is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn test_post_and_read_history_with_whisper_scoping() {
    // テスト項目: whisper は送信者、宛先、全 whisper を読めるユーザーにだけ見える
    // given (前提条件):
    let mut server = TestServer::start().await;

    // when (操作):
    let public = server.post("alice", json!({"content": " hello "})).await;
    let whisper = server.post("alice", json!({"content": "psst", "to": "bob"})).await;
    let denied = server.post("bob", json!({"content": "psst", "to": "alice"})).await;

    // then (期待する結果):
    assert_eq!(public.status(), StatusCode::OK);
    let stored: Message = public.json().await.unwrap();
    assert_eq!(stored, Message::new("alice", "*", "hello"));
    assert_eq!(whisper.status(), StatusCode::OK);
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    assert_eq!(server.messages("bob").await.len(), 2);
    assert_eq!(server.messages("admin").await.len(), 2);
    let alice_view = server.messages("alice").await;
    assert_eq!(alice_view, vec![Message::new("alice", "*", "hello")]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_message_is_bad_request() {
    // テスト項目: 不正な本文や JSON は 400 になる
    // given (前提条件):
    let mut server = TestServer::start().await;

    // when (操作):
    let control = server.post("alice", json!({"content": "a\u{1f}b"})).await;
    let empty = server.post("alice", json!({"content": "   "})).await;
    let garbage = server
        .client
        .post(server.url("/messages"))
        .header("Authorization", TestServer::auth("alice"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(control.status(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    assert!(server.messages("alice").await.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_requires_perm() {
    // テスト項目: delete 権限を持つユーザーだけが最新メッセージを削除できる
    // given (前提条件):
    let mut server = TestServer::start().await;
    server.post("alice", json!({"content": "one"})).await;
    server.post("alice", json!({"content": "two"})).await;

    // when (操作):
    let denied = server
        .client
        .delete(server.url("/messages"))
        .header("Authorization", TestServer::auth("alice"))
        .send()
        .await
        .unwrap();
    let allowed = server
        .client
        .delete(server.url("/messages"))
        .header("Authorization", TestServer::auth("admin"))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(allowed.status(), StatusCode::OK);
    let body: serde_json::Value = allowed.json().await.unwrap();
    assert_eq!(body, json!({"message": "Msg deleted"}));
    let contents: Vec<_> = server
        .messages("alice")
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["one"]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_users_and_perms() {
    // テスト項目: /users は hidden ユーザーを含まず、/perms はトークンを含まない
    // given (前提条件):
    let mut server = TestServer::start().await;

    // when (操作):
    let users: serde_json::Value = server
        .client
        .get(server.url("/users"))
        .header("Authorization", TestServer::auth("bob"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let perms = server
        .client
        .get(server.url("/perms"))
        .header("Authorization", TestServer::auth("alice"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(
        users,
        json!([
            {"name": "alice", "color": 0xff0000},
            {"name": "bob", "color": 0xffffff},
        ])
    );
    assert!(!perms.contains("alice-token"));
    let perms: serde_json::Value = serde_json::from_str(&perms).unwrap();
    assert_eq!(perms["write_whispers"], json!(["bob"]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_live_delivery_skips_own_session_and_scopes_whispers() {
    // テスト項目: ライブ配信は自分のセッションを除外し、whisper は宛先にだけ届く
    // given (前提条件):
    let mut server = TestServer::start().await;
    let (mut alice_ws, alice_session) = server.listen("alice").await;
    let (mut bob_ws, _) = server.listen("bob").await;

    // when (操作):
    let own = server
        .client
        .post(server.url("/messages"))
        .header("Authorization", TestServer::auth("alice"))
        .header("Session-Id", &alice_session)
        .json(&json!({"content": "from alice"}))
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    server.post("alice", json!({"content": "secret", "to": "bob"})).await;

    // then (期待する結果):
    let first = next_text(&mut bob_ws).await.unwrap();
    let first: Message = serde_json::from_str(&first).unwrap();
    assert_eq!(first, Message::new("alice", "*", "from alice"));

    let second = next_text(&mut bob_ws).await.unwrap();
    let second: Message = serde_json::from_str(&second).unwrap();
    assert_eq!(second, Message::new("alice", "bob", "secret"));

    // alice の接続には自分の投稿も bob 宛ての whisper も届かない
    assert_eq!(next_text(&mut alice_ws).await, None);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_sockets_and_flushes_log() {
    // テスト項目: 停止時に接続が閉じられ、未書き込みのメッセージがログに残る
    // given (前提条件):
    let mut server = TestServer::start().await;
    let (mut ws, _) = server.listen("bob").await;
    server.post("alice", json!({"content": "persist me"})).await;
    assert!(next_text(&mut ws).await.is_some());

    // when (操作):
    server.shutdown().await;

    // then (期待する結果):
    let mut reason = None;
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), ws.next()).await {
        if let Ok(tungstenite::Message::Close(Some(frame))) = frame {
            reason = Some(frame.reason.as_str().to_string());
            break;
        }
    }
    assert_eq!(reason.as_deref(), Some(SERVER_CLOSING));

    let on_disk = DurableLog::load_recent(server.dir.path().join("messages.log"), None)
        .await
        .unwrap();
    assert_eq!(on_disk, vec![Message::new("alice", "*", "persist me")]);
}
