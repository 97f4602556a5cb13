use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use wren_core::{ClientCommand, HealthState, ServerEvent};
use wren_worker::{SearchOptions, SyncOptions, WorkerError};

use crate::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const SCOPED_QUEUE_DEPTH: usize = 256;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// One dashboard connection: fans the worker's broadcast stream out,
/// answers commands with connection-scoped replies, and drives the
/// heartbeat that feeds the coarse health signal.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.worker.subscribe();
    let (scoped_tx, mut scoped_rx) = mpsc::channel::<ServerEvent>(SCOPED_QUEUE_DEPTH);

    info!("Dashboard client connected");

    // Replay current state so a (re)connecting dashboard renders at once.
    for event in state.worker.snapshot().await {
        if send_event(&mut sender, &event).await.is_err() {
            return;
        }
    }
    let initial = ServerEvent::Health {
        state: state.health.state(),
    };
    if send_event(&mut sender, &initial).await.is_err() {
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // the first tick completes immediately
    let mut awaiting_pong = false;
    let mut last_health = state.health.state();

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Slow client lagged behind the event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            Some(event) = scoped_rx.recv() => {
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                let health = if awaiting_pong {
                    state.health.record_miss()
                } else {
                    state.health.state()
                };
                if health != last_health {
                    last_health = health;
                    let _ = send_event(&mut sender, &ServerEvent::Health { state: health }).await;
                }
                awaiting_pong = true;
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => {
                                handle_command(&state, command, &scoped_tx, &mut last_health).await;
                            }
                            Err(e) => {
                                debug!(error = %e, "Unparseable client command");
                                let _ = scoped_tx
                                    .send(ServerEvent::Error {
                                        message: "unrecognized command".to_string(),
                                        retryable: false,
                                    })
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                        let health = state.health.record_ok();
                        if health != last_health {
                            last_health = health;
                            let _ = send_event(&mut sender, &ServerEvent::Health { state: health }).await;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    info!("Dashboard client disconnected");
}

async fn handle_command(
    state: &Arc<AppState>,
    command: ClientCommand,
    scoped: &mpsc::Sender<ServerEvent>,
    last_health: &mut HealthState,
) {
    let worker = &state.worker;
    match command {
        ClientCommand::GetAccounts { user_id } => {
            let list = worker.get_accounts(user_id.as_deref()).await;
            let _ = scoped.send(ServerEvent::Accounts { list }).await;
        }
        ClientCommand::AddAccount { name, user_id } => match worker.add_account(&name, user_id).await
        {
            Ok(_) => {
                let list = worker.get_accounts(None).await;
                let _ = scoped.send(ServerEvent::Accounts { list }).await;
            }
            Err(e) => send_error(scoped, &e).await,
        },
        ClientCommand::SwitchAccount { account_id } => {
            if let Err(e) = worker.switch_account(&account_id).await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::DeleteAccount { account_id } => {
            if let Err(e) = worker.delete_account(&account_id).await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::SyncAllChats {
            max_chats,
            incremental_only,
        } => {
            let opts = SyncOptions {
                max_chats,
                incremental: incremental_only,
            };
            if let Err(e) = worker.start_sync(opts).await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::CancelSync => {
            if let Err(e) = worker.cancel_sync().await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::QuickSync => {
            if let Err(e) = worker.quick_sync().await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::GetChats => match worker.get_chats().await {
            Ok(list) => {
                let _ = scoped.send(ServerEvent::Chats { list }).await;
            }
            Err(e) => send_error(scoped, &e).await,
        },
        ClientCommand::GetMessages { chat_id, limit } => {
            match worker.get_messages(&chat_id, limit).await {
                Ok(messages) => {
                    let _ = scoped
                        .send(ServerEvent::Messages { chat_id, messages })
                        .await;
                }
                Err(e) => send_error(scoped, &e).await,
            }
        }
        ClientCommand::SendMessage { chat_id, message } => {
            match worker.send_message(&chat_id, &message).await {
                Ok(sent) => {
                    let _ = scoped
                        .send(ServerEvent::MessageSent {
                            chat_id: sent.chat_id.clone(),
                            message: sent,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = scoped
                        .send(ServerEvent::SendMessageError {
                            error: e.to_string(),
                            retryable: e.retryable(),
                        })
                        .await;
                }
            }
        }
        ClientCommand::SearchMessages {
            query,
            max_chats,
            max_messages_per_chat,
        } => {
            let opts = SearchOptions {
                max_chats,
                max_messages_per_chat,
            };
            match worker.search_messages(&query, opts, scoped).await {
                Ok(results) => {
                    let _ = scoped
                        .send(ServerEvent::SearchResults { results, query })
                        .await;
                }
                Err(e) => send_error(scoped, &e).await,
            }
        }
        ClientCommand::Logout => {
            if let Err(e) = worker.logout().await {
                send_error(scoped, &e).await;
            }
        }
        ClientCommand::ClearSessions => {
            let event = match worker.clear_sessions().await {
                Ok(()) => ServerEvent::SessionsCleared {
                    success: true,
                    error: None,
                },
                Err(e) => ServerEvent::SessionsCleared {
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = scoped.send(event).await;
        }
        ClientCommand::RequestReconnect => {
            state.health.reset();
            *last_health = HealthState::Healthy;
            for event in worker.snapshot().await {
                let _ = scoped.send(event).await;
            }
            let _ = scoped
                .send(ServerEvent::Health {
                    state: HealthState::Healthy,
                })
                .await;
        }
    }
}

async fn send_error(scoped: &mpsc::Sender<ServerEvent>, error: &WorkerError) {
    let _ = scoped
        .send(ServerEvent::Error {
            message: error.to_string(),
            retryable: error.retryable(),
        })
        .await;
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    if let Ok(json) = serde_json::to_string(event) {
        sender.send(Message::Text(json.into())).await?;
    }
    Ok(())
}
