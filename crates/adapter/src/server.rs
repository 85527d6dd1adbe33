//! TCP server
//!
//! One connection per client. The first frame must be an `auth` request,
//! answered with `authSuccess` or `error`. After that three tasks serve the
//! connection:
//!
//! - the reader loop turns request frames into [`Hall`] calls; a read that is
//!   idle for longer than the heartbeat ends the session with an implicit quit;
//! - the poller long-polls the table feed and forwards every response;
//! - the pinger sends a `ping` every half heartbeat.
//!
//! All outbound responses go through one writer task so frames never
//! interleave. The accept loop runs supervised.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::framing::{read_frame, write_frame, FrameError};
use crate::protocol::{Command, CommandError, Request, Response};
use crate::table::engine::supervise;
use crate::table::{Hall, Poll, Role, Session};
use crate::types::{Operation, ResponseDesc};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Time the writer gets to flush after the session ends.
const WRITER_GRACE: Duration = Duration::from_secs(1);

enum Flow {
    Continue,
    Quit,
}

/// Bind and serve forever. `ready_tx` receives the bound address.
pub async fn run_server(
    config: ServerConfig,
    hall: Arc<Hall>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    let bound = listener.local_addr()?;
    info!(%bound, "duel server listening");
    if let Some(tx) = ready_tx {
        let _ = tx.send(bound);
    }

    let listener = Arc::new(listener);
    let config = Arc::new(config);
    supervise("accept-loop", move || {
        accept_loop(listener.clone(), hall.clone(), config.clone())
    })
    .await
    .context("accept loop stopped")?;
    Ok(())
}

async fn accept_loop(listener: Arc<TcpListener>, hall: Arc<Hall>, config: Arc<ServerConfig>) {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(?err, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        info!(%addr, "client connected");

        let hall = hall.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(socket, hall, config).await {
                warn!(%addr, ?err, "client error");
            }
            info!(%addr, "client disconnected");
        });
    }
}

async fn handle_client(socket: TcpStream, hall: Arc<Hall>, config: Arc<ServerConfig>) -> anyhow::Result<()> {
    let (mut reader, mut writer) = socket.into_split();

    let Some(session) = authenticate(&mut reader, &mut writer, &hall, config.auth_timeout).await? else {
        return Ok(());
    };
    let seat = match session.role {
        Role::Player(seat) => json!(seat),
        Role::Observer => Value::Null,
    };
    let welcome = json!({
        "userId": session.user_id,
        "nickname": session.nickname,
        "tableId": session.table_id,
        "seat": seat,
    });
    // the user is seated from here on: every exit has to go through quit
    if let Err(err) = write_frame(&mut writer, &Response::new(ResponseDesc::AuthSuccess, welcome)).await {
        hall.quit(&session).await;
        return Err(err.into());
    }

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(write_responses(writer, out_rx));
    let poller = tokio::spawn(poll_feed(hall.clone(), session.clone(), out_tx.clone()));
    let pinger = tokio::spawn(ping(out_tx.clone(), config.heartbeat / 2));

    let result = read_commands(&mut reader, &hall, &session, &out_tx, config.heartbeat).await;
    hall.quit(&session).await;

    poller.abort();
    pinger.abort();
    drop(out_tx);
    if timeout(WRITER_GRACE, writer_task).await.is_err() {
        debug!(user_id = session.user_id, "writer did not drain in time");
    }
    result
}

/// Wait for the `auth` request. `None` means the connection was refused and
/// told why.
async fn authenticate(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    hall: &Hall,
    deadline: Duration,
) -> anyhow::Result<Option<Session>> {
    let refusal = match timeout(deadline, read_frame::<_, Request>(reader)).await {
        Err(_) => "authentication timed out".to_string(),
        Ok(Ok(None)) => return Ok(None),
        Ok(Ok(Some(req))) if req.cmd != Command::Auth => "authenticate first".to_string(),
        Ok(Ok(Some(req))) => match hall.enter(&req.data).await {
            Ok(session) => return Ok(Some(session)),
            Err(err) => err.to_string(),
        },
        Ok(Err(err @ (FrameError::Json(_) | FrameError::Oversized { .. }))) => err.to_string(),
        Ok(Err(err)) => return Err(err.into()),
    };
    info!(%refusal, "authentication refused");
    write_frame(writer, &Response::error(refusal)).await?;
    Ok(None)
}

async fn read_commands(
    reader: &mut OwnedReadHalf,
    hall: &Arc<Hall>,
    session: &Session,
    out: &mpsc::UnboundedSender<Response>,
    idle: Duration,
) -> anyhow::Result<()> {
    loop {
        let request = match timeout(idle, read_frame::<_, Request>(reader)).await {
            Err(_) => {
                info!(user_id = session.user_id, "heartbeat timed out");
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(request))) => request,
            Ok(Err(FrameError::Json(err))) => {
                if out.send(Response::error(format!("malformed request: {err}"))).is_err() {
                    debug!(user_id = session.user_id, "writer gone, ending session");
                    return Ok(());
                }
                continue;
            }
            Ok(Err(err)) => return Err(err.into()),
        };

        debug!(user_id = session.user_id, cmd = ?request.cmd, "request");
        match execute(hall, session, request).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(err) => {
                if out.send(Response::error(err.to_string())).is_err() {
                    debug!(user_id = session.user_id, "writer gone, ending session");
                    return Ok(());
                }
            }
        }
    }
}

async fn execute(hall: &Arc<Hall>, session: &Session, request: Request) -> Result<Flow, CommandError> {
    match request.cmd {
        Command::Auth => return Err(CommandError::AlreadyAuthenticated),
        Command::Chat => hall.chat(session, &request.data).await?,
        Command::SwitchState => hall.switch_ready(session).await?,
        Command::Operate => {
            let op = Operation::from_str(&request.data)
                .ok_or_else(|| CommandError::UnknownOperation(request.data.clone()))?;
            hall.operate(session, op).await?;
        }
        Command::Quit => return Ok(Flow::Quit),
        // any frame resets the read deadline
        Command::Ping => {}
    }
    Ok(Flow::Continue)
}

async fn write_responses(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Response>) {
    while let Some(response) = rx.recv().await {
        match write_frame(&mut writer, &response).await {
            Ok(()) => {}
            Err(FrameError::Oversized { len, .. }) => {
                warn!(len, desc = ?response.desc, "response too large for a frame, dropped");
            }
            Err(err) => {
                debug!(?err, "client write failed");
                return;
            }
        }
    }
}

async fn poll_feed(hall: Arc<Hall>, session: Session, out: mpsc::UnboundedSender<Response>) {
    let mut index = 0;
    loop {
        match hall.get_data(&session, index).await {
            Poll::Data {
                responses,
                next_index,
            } => {
                for response in responses {
                    if out.send(response).is_err() {
                        return;
                    }
                }
                index = next_index;
            }
            Poll::NoNewData { next_index } => index = next_index,
            Poll::Closed => {
                debug!(table_id = session.table_id, "feed closed");
                return;
            }
        }
    }
}

async fn ping(out: mpsc::UnboundedSender<Response>, period: Duration) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(100)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if out.send(Response::new(ResponseDesc::Ping, Value::Null)).is_err() {
            return;
        }
    }
}
