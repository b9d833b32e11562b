// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The relay connection manager.
//!
//! Owns one authenticated transport and layers liveness and recovery on
//! top: a run loop dispatches inbound events to subscribers, answers pings,
//! emits heartbeats, and on any transport failure reconnects with backoff,
//! re-announcing room membership after each successful reconnect.
//!
//! Reconnection never re-delivers acknowledged outbound messages (they are
//! already persisted server-side); it re-subscribes rooms and publishes
//! [`ConnectionSignal::Reconnected`] so the chat pipeline can refresh
//! history for anything missed while offline.

use std::collections::HashSet;
use std::time::Instant;

use parley_config::model::{HeartbeatConfig, ReconnectConfig};
use parley_core::traits::auth::Credentials;
use parley_core::{ParleyError, RelayEvent, RelayTransport, RoomId};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::heartbeat::HeartbeatTracker;

/// Capacity of the broadcast channel fanning events out to subscribers.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the command channel feeding the run loop.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Notification published to subscribers.
#[derive(Debug, Clone)]
pub enum ConnectionSignal {
    /// An inbound relay event (heartbeat frames are filtered out).
    Event(RelayEvent),
    /// The transport dropped and was re-established; room membership has
    /// been re-announced. Consumers should refresh room history.
    Reconnected,
}

enum Command {
    Send(RelayEvent, oneshot::Sender<Result<(), ParleyError>>),
    Join(RoomId, oneshot::Sender<Result<(), ParleyError>>),
}

/// Handle to one authenticated realtime relay connection.
///
/// Explicitly owned and passed by reference where needed; lifecycle is
/// `connect()` .. `close()`. Dropping the handle without `close()` leaves
/// the run loop alive until the process exits.
pub struct ConnectionManager {
    command_tx: mpsc::Sender<Command>,
    signal_tx: broadcast::Sender<ConnectionSignal>,
    connected_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Opens the transport (retrying per the backoff policy) and spawns the
    /// run loop.
    pub async fn connect(
        mut transport: Box<dyn RelayTransport>,
        credentials: Credentials,
        reconnect: &ReconnectConfig,
        heartbeat: &HeartbeatConfig,
    ) -> Result<Self, ParleyError> {
        let backoff = BackoffPolicy::from_config(reconnect);
        let cancel = CancellationToken::new();

        establish(transport.as_mut(), &credentials, &backoff, &cancel).await?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = watch::channel(true);

        let loop_ctx = RunLoop {
            transport,
            credentials,
            backoff,
            heartbeat: heartbeat.clone(),
            signal_tx: signal_tx.clone(),
            connected_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(loop_ctx.run(command_rx));

        Ok(Self {
            command_tx,
            signal_tx,
            connected_rx,
            cancel,
        })
    }

    /// Subscribe to inbound events and reconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.signal_tx.subscribe()
    }

    /// Current transport liveness.
    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Send one event over the relay.
    pub async fn send(&self, event: RelayEvent) -> Result<(), ParleyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send(event, reply_tx))
            .await
            .map_err(|_| ParleyError::connection("connection manager closed"))?;
        reply_rx
            .await
            .map_err(|_| ParleyError::connection("connection manager closed"))?
    }

    /// Announce membership in a room and remember it for re-announcement
    /// after reconnects. Joining the same room twice is idempotent.
    pub async fn join_room(&self, room_id: RoomId) -> Result<(), ParleyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Join(room_id, reply_tx))
            .await
            .map_err(|_| ParleyError::connection("connection manager closed"))?;
        reply_rx
            .await
            .map_err(|_| ParleyError::connection("connection manager closed"))?
    }

    /// Stops the run loop, the heartbeat, and any pending reconnect retry.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// State owned by the spawned run loop task.
struct RunLoop {
    transport: Box<dyn RelayTransport>,
    credentials: Credentials,
    backoff: BackoffPolicy,
    heartbeat: HeartbeatConfig,
    signal_tx: broadcast::Sender<ConnectionSignal>,
    connected_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

enum Step {
    Inbound(Result<RelayEvent, ParleyError>),
    Cmd(Option<Command>),
    PingDue,
    Cancelled,
}

impl RunLoop {
    async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        let mut rooms: HashSet<RoomId> = HashSet::new();
        let mut tracker = HeartbeatTracker::new(&self.heartbeat, Instant::now());
        let interval = tracker.interval();
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                cmd = command_rx.recv() => Step::Cmd(cmd),
                event = self.transport.receive() => Step::Inbound(event),
                _ = ping.tick() => Step::PingDue,
            };

            match step {
                Step::Cancelled | Step::Cmd(None) => {
                    debug!("connection manager closing");
                    let _ = self.transport.close().await;
                    let _ = self.connected_tx.send(false);
                    return;
                }
                Step::Cmd(Some(Command::Send(event, reply))) => {
                    let result = self.transport.send(&event).await;
                    let failed = result.is_err();
                    let _ = reply.send(result);
                    if failed && !self.reestablish(&rooms, &mut tracker).await {
                        return;
                    }
                }
                Step::Cmd(Some(Command::Join(room_id, reply))) => {
                    let event = RelayEvent::JoinRoom {
                        room_id: room_id.clone(),
                        participant_id: self.credentials.participant_id.clone(),
                    };
                    let result = self.transport.send(&event).await;
                    if result.is_ok() {
                        rooms.insert(room_id);
                    }
                    let _ = reply.send(result);
                }
                Step::Inbound(Ok(RelayEvent::Pong)) => {
                    tracker.record_pong(Instant::now());
                }
                Step::Inbound(Ok(RelayEvent::Ping)) => {
                    if self.transport.send(&RelayEvent::Pong).await.is_err()
                        && !self.reestablish(&rooms, &mut tracker).await
                    {
                        return;
                    }
                }
                Step::Inbound(Ok(event)) => {
                    // Subscribers lagging behind drop oldest events; the
                    // history refresh on rejoin covers the gap.
                    let _ = self.signal_tx.send(ConnectionSignal::Event(event));
                }
                Step::Inbound(Err(err)) => {
                    warn!(error = %err, "relay receive failed");
                    if !self.reestablish(&rooms, &mut tracker).await {
                        return;
                    }
                }
                Step::PingDue => {
                    let now = Instant::now();
                    if tracker.is_silent(now) {
                        warn!("heartbeat silent past timeout, forcing reconnect");
                        if !self.reestablish(&rooms, &mut tracker).await {
                            return;
                        }
                    } else {
                        tracker.record_ping(now);
                        if self.transport.send(&RelayEvent::Ping).await.is_err()
                            && !self.reestablish(&rooms, &mut tracker).await
                        {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Tear down and reconnect with backoff, then re-announce membership in
    /// every joined room. Returns false when retries are exhausted or the
    /// manager was closed, in which case the run loop exits.
    async fn reestablish(
        &mut self,
        rooms: &HashSet<RoomId>,
        tracker: &mut HeartbeatTracker,
    ) -> bool {
        let _ = self.connected_tx.send(false);
        let _ = self.transport.close().await;

        match establish(
            self.transport.as_mut(),
            &self.credentials,
            &self.backoff,
            &self.cancel,
        )
        .await
        {
            Ok(()) => {}
            Err(err) => {
                warn!(error = %err, "relay reconnect abandoned");
                return false;
            }
        }

        for room_id in rooms {
            let event = RelayEvent::JoinRoom {
                room_id: room_id.clone(),
                participant_id: self.credentials.participant_id.clone(),
            };
            if let Err(err) = self.transport.send(&event).await {
                warn!(room_id = %room_id, error = %err, "room re-join failed");
            }
        }

        tracker.reset(Instant::now());
        let _ = self.connected_tx.send(true);
        let _ = self.signal_tx.send(ConnectionSignal::Reconnected);
        info!(rooms = rooms.len(), "relay reconnected");
        true
    }
}

/// Connect the transport, retrying per the backoff policy until success,
/// exhaustion, or cancellation.
async fn establish(
    transport: &mut dyn RelayTransport,
    credentials: &Credentials,
    backoff: &BackoffPolicy,
    cancel: &CancellationToken,
) -> Result<(), ParleyError> {
    let mut attempt: u32 = 0;
    loop {
        match transport.connect(credentials).await {
            Ok(()) => {
                debug!(attempt, "relay transport connected");
                return Ok(());
            }
            Err(err) => {
                if !backoff.allows_attempt(attempt + 1) {
                    return Err(err);
                }
                let delay = backoff.jittered_delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err,
                    "relay connect failed, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(ParleyError::connection("closed while reconnecting"));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ParticipantId;
    use parley_test_utils::MockRelay;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials {
            participant_id: ParticipantId("u1".into()),
            token: "tok-1".into(),
        }
    }

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 10,
            jitter: 0.0,
            max_attempts: Some(5),
        }
    }

    fn quiet_heartbeat() -> HeartbeatConfig {
        HeartbeatConfig {
            interval_secs: 60,
            timeout_secs: 120,
        }
    }

    async fn recv_signal(
        rx: &mut broadcast::Receiver<ConnectionSignal>,
    ) -> ConnectionSignal {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("signal channel closed")
    }

    #[tokio::test]
    async fn join_room_sends_join_event() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();

        manager.join_room(RoomId("u1_u2".into())).await.unwrap();

        let sent = handle.sent_events().await;
        assert!(sent.iter().any(|e| matches!(
            e,
            RelayEvent::JoinRoom { room_id, .. } if room_id.0 == "u1_u2"
        )));
        manager.close();
    }

    #[tokio::test]
    async fn inbound_events_reach_subscribers() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();
        let mut rx = manager.subscribe();

        handle
            .inject_event(RelayEvent::Typing {
                room_id: RoomId("u1_u2".into()),
                participant_id: ParticipantId("u2".into()),
                is_typing: true,
            })
            .await;

        match recv_signal(&mut rx).await {
            ConnectionSignal::Event(RelayEvent::Typing { is_typing, .. }) => {
                assert!(is_typing)
            }
            other => panic!("expected typing event, got {other:?}"),
        }
        manager.close();
    }

    #[tokio::test]
    async fn inbound_ping_is_answered_with_pong() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();

        handle.inject_event(RelayEvent::Ping).await;
        handle.wait_for_sent(1, Duration::from_secs(1)).await;

        let sent = handle.sent_events().await;
        assert!(sent.contains(&RelayEvent::Pong));
        manager.close();
    }

    #[tokio::test]
    async fn receive_error_triggers_reconnect_and_rejoin() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();
        let mut rx = manager.subscribe();

        manager.join_room(RoomId("u1_u2".into())).await.unwrap();
        assert_eq!(handle.connect_count(), 1);

        handle.inject_receive_error("socket reset").await;

        match recv_signal(&mut rx).await {
            ConnectionSignal::Reconnected => {}
            other => panic!("expected reconnected signal, got {other:?}"),
        }
        assert_eq!(handle.connect_count(), 2);

        // Membership was re-announced on the new connection.
        let joins = handle
            .sent_events()
            .await
            .into_iter()
            .filter(|e| matches!(e, RelayEvent::JoinRoom { .. }))
            .count();
        assert_eq!(joins, 2);
        manager.close();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_heartbeat_forces_reconnect() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        // A zero timeout makes any pong-less ping tick count as silence.
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &HeartbeatConfig {
                interval_secs: 1,
                timeout_secs: 0,
            },
        )
        .await
        .unwrap();
        let mut rx = manager.subscribe();

        manager.join_room(RoomId("u1_u2".into())).await.unwrap();
        assert_eq!(handle.connect_count(), 1);

        // No pong ever arrives; the next ping tick must notice the dead
        // connection even though the socket never errored. The await timeout
        // must exceed the ping interval: under paused time an equal deadline
        // ties with the tick and can fire before the reconnect is observable.
        let signal = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("signal channel closed");
        match signal {
            ConnectionSignal::Reconnected => {}
            other => panic!("expected reconnected signal, got {other:?}"),
        }
        assert!(handle.connect_count() >= 2);

        // Membership was re-announced on the new connection.
        let joins = handle
            .sent_events()
            .await
            .into_iter()
            .filter(|e| matches!(e, RelayEvent::JoinRoom { .. }))
            .count();
        assert!(joins >= 2);
        manager.close();
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let relay = MockRelay::new();
        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();

        manager.close();
        // Give the run loop a moment to observe cancellation.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = manager.send(RelayEvent::Ping).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn initial_connect_retries_until_success() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        handle.fail_next_connects(2);

        let manager = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await
        .unwrap();

        assert_eq!(handle.connect_count(), 3);
        assert!(manager.is_connected());
        manager.close();
    }

    #[tokio::test]
    async fn initial_connect_gives_up_after_max_attempts() {
        let relay = MockRelay::new();
        let handle = relay.handle();
        handle.fail_next_connects(10);

        let result = ConnectionManager::connect(
            Box::new(relay),
            credentials(),
            &fast_reconnect(),
            &quiet_heartbeat(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(handle.connect_count(), 5);
    }
}
