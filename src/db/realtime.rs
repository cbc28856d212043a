// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push-event channel over the backend's realtime websocket.
//!
//! Speaks the Phoenix channel protocol: one `phx_join` per subscribed
//! table, a heartbeat every 30 seconds, and `postgres_changes` messages
//! carrying the changed row. The connection is re-established after a
//! fixed delay when it drops, and all joined tables are rejoined.

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::gateway::{ChangeEvent, ChangeKind, EVENT_CHANNEL_CAPACITY};
use super::supabase::ChangeChannels;
use super::Table;

/// Reconnection delay after a websocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Phoenix heartbeat period.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type WsError = tokio_tungstenite::tungstenite::Error;

#[derive(Debug)]
enum Command {
    Join(Table),
    AccessToken(String),
}

/// Handle to the background realtime connection task.
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Spawn the connection task. Events are fanned out on `channels`.
    pub fn spawn(ws_url: String, channels: ChangeChannels) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(ws_url, channels, rx));
        Self { commands, task }
    }

    /// Subscribe the connection to changes of `table`. Idempotent.
    pub fn join(&self, table: Table) {
        let _ = self.commands.send(Command::Join(table));
    }

    /// Use `token` for row-level-security checks on joined channels.
    pub fn set_access_token(&self, token: String) {
        let _ = self.commands.send(Command::AccessToken(token));
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

struct ConnectionState {
    joined: BTreeSet<Table>,
    access_token: Option<String>,
    next_ref: u64,
}

impl ConnectionState {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn join_message(&mut self, table: Table) -> String {
        let mut payload = json!({
            "config": {
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table.name() }
                ]
            }
        });
        if let Some(token) = &self.access_token {
            payload["access_token"] = json!(token);
        }
        json!({
            "topic": topic(table),
            "event": "phx_join",
            "payload": payload,
            "ref": self.next_ref(),
        })
        .to_string()
    }

    fn heartbeat_message(&mut self) -> String {
        json!({
            "topic": "phoenix",
            "event": "heartbeat",
            "payload": {},
            "ref": self.next_ref(),
        })
        .to_string()
    }

    fn access_token_message(&mut self, table: Table, token: &str) -> String {
        json!({
            "topic": topic(table),
            "event": "access_token",
            "payload": { "access_token": token },
            "ref": self.next_ref(),
        })
        .to_string()
    }
}

fn topic(table: Table) -> String {
    format!("realtime:public:{}", table.name())
}

/// Reconnect loop. Returns only when every handle has been dropped.
async fn run(ws_url: String, channels: ChangeChannels, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut state = ConnectionState {
        joined: BTreeSet::new(),
        access_token: None,
        next_ref: 0,
    };

    loop {
        // Nothing to listen for yet: wait for the first join before connecting.
        while state.joined.is_empty() {
            match commands.recv().await {
                Some(command) => apply_offline(&mut state, command),
                None => return,
            }
        }

        tracing::info!("Connecting to realtime websocket");
        match connect_async(ws_url.as_str()).await {
            Ok((ws_stream, _response)) => {
                tracing::info!(tables = state.joined.len(), "Realtime connected");
                if !run_session(ws_stream, &channels, &mut state, &mut commands).await {
                    return;
                }
                tracing::warn!("Realtime session ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "Realtime connection failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

fn apply_offline(state: &mut ConnectionState, command: Command) {
    match command {
        Command::Join(table) => {
            state.joined.insert(table);
        }
        Command::AccessToken(token) => state.access_token = Some(token),
    }
}

/// Drive a single connected session. Returns `false` once the command
/// channel is closed and the task should exit.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    channels: &ChangeChannels,
    state: &mut ConnectionState,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let (mut sink, mut stream) = ws_stream.split();

    let tables: Vec<Table> = state.joined.iter().copied().collect();
    for table in tables {
        let msg = state.join_message(table);
        if let Err(e) = sink.send(Message::Text(msg)).await {
            tracing::error!(error = %e, "Failed to join realtime channel");
            return true;
        }
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let msg = state.heartbeat_message();
                if let Err(e) = sink.send(Message::Text(msg)).await {
                    tracing::error!(error = %e, "Failed to send heartbeat");
                    return true;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = sink.close().await;
                    return false;
                };
                if let Err(e) = handle_command(&mut sink, state, command).await {
                    tracing::error!(error = %e, "Realtime send failed");
                    return true;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatch(channels, &text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Backend closed realtime websocket");
                        return true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Realtime receive error");
                        return true;
                    }
                    None => {
                        tracing::info!("Realtime stream exhausted");
                        return true;
                    }
                }
            }
        }
    }
}

async fn handle_command<S>(sink: &mut S, state: &mut ConnectionState, command: Command) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match command {
        Command::Join(table) => {
            if state.joined.insert(table) {
                let msg = state.join_message(table);
                sink.send(Message::Text(msg)).await?;
            }
        }
        Command::AccessToken(token) => {
            let tables: Vec<Table> = state.joined.iter().copied().collect();
            for table in tables {
                let msg = state.access_token_message(table, &token);
                sink.send(Message::Text(msg)).await?;
            }
            state.access_token = Some(token);
        }
    }
    Ok(())
}

fn dispatch(channels: &ChangeChannels, text: &str) {
    let Some(event) = parse_change(text) else {
        return;
    };
    tracing::debug!(table = event.table.name(), kind = ?event.kind, "Realtime change");
    let sender = channels
        .entry(event.table)
        .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
        .clone();
    let _ = sender.send(event);
}

/// Decode a realtime frame into a row change, ignoring control traffic
/// (replies, heartbeats, presence).
pub(crate) fn parse_change(text: &str) -> Option<ChangeEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let event = frame.get("event")?.as_str()?;
    let payload = frame.get("payload")?;

    let data = match event {
        "postgres_changes" => payload.get("data")?,
        // Legacy servers put the change directly in the payload.
        "INSERT" | "UPDATE" | "DELETE" => payload,
        _ => return None,
    };

    let kind = ChangeKind::from_wire(
        data.get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)?,
    )?;
    let table = Table::from_name(data.get("table")?.as_str()?)?;
    let row = match kind {
        ChangeKind::Delete => data.get("old_record").or_else(|| data.get("old")),
        _ => data.get("record").or_else(|| data.get("new")),
    }
    .cloned()
    .unwrap_or(Value::Null);

    Some(ChangeEvent { table, kind, row })
}
