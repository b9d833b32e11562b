// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive chat session: relay connection, history, and a stdin loop.

use std::error::Error;
use std::sync::Arc;

use parley_backend::BackendClient;
use parley_chat::ChatPipeline;
use parley_config::model::ParleyConfig;
use parley_connection::{ConnectionManager, ConnectionSignal, WsTransport};
use parley_core::traits::auth::Credentials;
use parley_core::types::{MessageKind, ParticipantId};
use parley_core::{MessageStore, RelayEvent, resolve_room_id};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Connect, join the shared room, and bridge stdin lines to messages
/// until EOF or Ctrl-C.
pub async fn run_chat(
    config: &ParleyConfig,
    credentials: Credentials,
    peer: &str,
) -> Result<(), Box<dyn Error>> {
    let peer_id = ParticipantId(peer.to_string());
    let room_id = resolve_room_id(&credentials.participant_id, &peer_id, None);
    info!(room_id = %room_id, "starting chat session");

    let backend = Arc::new(BackendClient::new(&config.backend, &credentials.token)?);
    let transport = WsTransport::new(config.relay.url.clone());
    let self_id = credentials.participant_id.clone();
    let connection = Arc::new(
        ConnectionManager::connect(
            Box::new(transport),
            credentials,
            &config.reconnect,
            &config.heartbeat,
        )
        .await?,
    );

    let pipeline = Arc::new(ChatPipeline::new(
        room_id,
        self_id.clone(),
        backend as Arc<dyn MessageStore>,
        connection.clone(),
    ));
    let listener = pipeline.spawn_listener();
    pipeline.join().await?;

    for message in pipeline.messages().await {
        print_message(&self_id, &message);
    }

    // Echo live messages from the other side as they arrive.
    let mut rx = connection.subscribe();
    let printer_self = self_id.clone();
    let printer_room = pipeline.room_id().clone();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ConnectionSignal::Event(RelayEvent::Message { message }))
                    if message.room_id == printer_room && message.sender != printer_self =>
                {
                    print_message(&printer_self, &message);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sent = pipeline
                    .send_message(&line, MessageKind::Text, None)
                    .await?;
                print_message(&self_id, &sent);
            }
        }
    }

    connection.close();
    printer.abort();
    listener.abort();
    Ok(())
}

fn print_message(self_id: &ParticipantId, message: &parley_core::ChatMessage) {
    let who = if &message.sender == self_id {
        "you"
    } else {
        message.sender.0.as_str()
    };
    if message.is_deleted {
        println!("[{}] {}: (deleted)", message.created_at, who);
    } else {
        println!("[{}] {}: {}", message.created_at, who, message.content);
    }
}
