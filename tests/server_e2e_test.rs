use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use tetris_duel::adapter::{read_frame, write_frame, Command, Request, Response, ServerConfig};
use tetris_duel::table::{Hall, LocalAuthority};
use tetris_duel::types::ResponseDesc;

async fn start_server() -> (Arc<Hall>, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        heartbeat: Duration::from_secs(30),
        ..ServerConfig::default()
    };
    let hall = Arc::new(Hall::new(config.hall.clone(), Arc::new(LocalAuthority::new())));
    let (ready_tx, ready_rx) = oneshot::channel();

    let server_hall = hall.clone();
    tokio::spawn(async move {
        let _ = tetris_duel::adapter::run_server(config, server_hall, Some(ready_tx)).await;
    });

    let addr = tokio::time::timeout(Duration::from_secs(2), ready_rx)
        .await
        .expect("server did not signal ready")
        .expect("ready channel dropped");
    (hall, addr)
}

async fn connect(addr: SocketAddr) -> (OwnedReadHalf, OwnedWriteHalf) {
    TcpStream::connect(addr)
        .await
        .expect("connect failed")
        .into_split()
}

async fn send(writer: &mut OwnedWriteHalf, cmd: Command, data: &str) {
    write_frame(writer, &Request::new(cmd, data)).await.unwrap();
}

/// Next response matching `desc`, skipping everything else.
async fn expect_desc(reader: &mut OwnedReadHalf, desc: ResponseDesc) -> Response {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let response: Response = read_frame(reader)
                .await
                .unwrap()
                .expect("connection closed early");
            if response.desc == desc {
                return response;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {desc:?} response"))
}

#[tokio::test]
async fn auth_then_chat_round_trip() {
    let (hall, addr) = start_server().await;
    let table = hall.create_table("e2e", 0).await;
    let (mut reader, mut writer) = connect(addr).await;

    send(&mut writer, Command::Auth, &format!("1:ann:{}:play", table.id())).await;
    let welcome = expect_desc(&mut reader, ResponseDesc::AuthSuccess).await;
    assert_eq!(welcome.data["userId"], 1);
    assert_eq!(welcome.data["tableId"], table.id());

    let joined = expect_desc(&mut reader, ResponseDesc::SysMsg).await;
    assert_eq!(joined.data, "ann joined as 1P");
    let refresh = expect_desc(&mut reader, ResponseDesc::RefreshNormal).await;
    assert_eq!(refresh.data["players"][0]["nickname"], "ann");

    send(&mut writer, Command::Chat, "hello").await;
    let chat = expect_desc(&mut reader, ResponseDesc::Chat).await;
    assert_eq!(chat.data["from"], "ann");
    assert_eq!(chat.data["text"], "hello");
}

#[tokio::test]
async fn bad_token_is_refused() {
    let (_hall, addr) = start_server().await;
    let (mut reader, mut writer) = connect(addr).await;

    send(&mut writer, Command::Auth, "not-a-token").await;
    let refusal = expect_desc(&mut reader, ResponseDesc::Error).await;
    assert!(refusal.data.as_str().unwrap().contains("malformed token"));

    let closed: Option<Response> = read_frame(&mut reader).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn commands_before_auth_are_refused() {
    let (_hall, addr) = start_server().await;
    let (mut reader, mut writer) = connect(addr).await;

    send(&mut writer, Command::Chat, "hi").await;
    let refusal = expect_desc(&mut reader, ResponseDesc::Error).await;
    assert_eq!(refusal.data, "authenticate first");
}

#[tokio::test]
async fn unknown_operation_gets_an_error_and_the_session_survives() {
    let (hall, addr) = start_server().await;
    let table = hall.create_table("e2e", 0).await;
    let (mut reader, mut writer) = connect(addr).await;

    send(&mut writer, Command::Auth, &format!("2:bob:{}:play", table.id())).await;
    expect_desc(&mut reader, ResponseDesc::AuthSuccess).await;

    send(&mut writer, Command::Operate, "teleport").await;
    let err = expect_desc(&mut reader, ResponseDesc::Error).await;
    assert!(err.data.as_str().unwrap().contains("teleport"));

    send(&mut writer, Command::Chat, "still here").await;
    let chat = expect_desc(&mut reader, ResponseDesc::Chat).await;
    assert_eq!(chat.data["text"], "still here");
}

#[tokio::test]
async fn quit_closes_the_connection_and_deletes_the_empty_table() {
    let (hall, addr) = start_server().await;
    let table = hall.create_table("e2e", 0).await;
    let (mut reader, mut writer) = connect(addr).await;

    send(&mut writer, Command::Auth, &format!("3:cid:{}:play", table.id())).await;
    expect_desc(&mut reader, ResponseDesc::AuthSuccess).await;
    send(&mut writer, Command::Quit, "").await;

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Ok(Some(_)) = read_frame::<_, Response>(&mut reader).await {}
    })
    .await;
    assert!(drained.is_ok(), "server kept the connection open");
    assert!(hall.tables().get(table.id()).await.is_none());
}

#[tokio::test]
async fn client_vanishing_right_after_auth_is_unseated() {
    let (hall, addr) = start_server().await;
    let table = hall.create_table("e2e", 0).await;

    {
        let (_reader, mut writer) = connect(addr).await;
        send(&mut writer, Command::Auth, &format!("4:dee:{}:play", table.id())).await;
    }

    let released = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let gone = hall.tables().get(table.id()).await.is_none();
            if gone && hall.users().busy_table(4).await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "session outlived its connection");
}
