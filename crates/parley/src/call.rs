// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Billed call session: billing lifecycle plus relay signaling.
//!
//! The CLI carries no media engine; [`SignalOnlyPeer`] answers the
//! negotiation contract with placeholder descriptions so the signaling and
//! billing paths run end to end. Embedding applications supply a real
//! `PeerLink` over their platform's WebRTC stack.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley_backend::BackendClient;
use parley_billing::BillingEngine;
use parley_config::model::ParleyConfig;
use parley_connection::{ConnectionManager, ConnectionSignal, WsTransport};
use parley_core::traits::auth::Credentials;
use parley_core::types::{
    ConsultationKind, IceCandidate, ParticipantId, SdpKind, SessionDescription,
};
use parley_core::{ConsultationLedger, ParleyError, resolve_room_id};
use parley_signaling::{CallState, PeerLink, SignalingSession};
use tracing::info;

struct SignalOnlyPeer;

#[async_trait]
impl PeerLink for SignalOnlyPeer {
    async fn create_offer(&mut self) -> Result<SessionDescription, ParleyError> {
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\ns=parley signal-only\r\n".into(),
        })
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, ParleyError> {
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0\r\ns=parley signal-only\r\n".into(),
        })
    }

    async fn set_local_description(
        &mut self,
        _description: &SessionDescription,
    ) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        _description: &SessionDescription,
    ) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn add_ice_candidate(&mut self, _candidate: &IceCandidate) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn release_media(&mut self) {}
}

/// Start a billed call with a provider and run it until hangup, Ctrl-C,
/// or reservation exhaustion.
pub async fn run_call(
    config: &ParleyConfig,
    credentials: Credentials,
    provider: &str,
) -> Result<(), Box<dyn Error>> {
    let provider_id = ParticipantId(provider.to_string());
    let room_id = resolve_room_id(&credentials.participant_id, &provider_id, None);
    let self_id = credentials.participant_id.clone();

    let backend = Arc::new(BackendClient::new(&config.backend, &credentials.token)?);
    let billing = BillingEngine::new(
        backend.clone() as Arc<dyn ConsultationLedger>,
        &config.billing,
    );

    let transport = WsTransport::new(config.relay.url.clone());
    let connection = Arc::new(
        ConnectionManager::connect(
            Box::new(transport),
            credentials,
            &config.reconnect,
            &config.heartbeat,
        )
        .await?,
    );
    connection.join_room(room_id.clone()).await?;

    // Reserve the first block before any signaling happens.
    let consultation = billing
        .start(&self_id, &provider_id, ConsultationKind::Call)
        .await?;
    println!(
        "consultation {} started: {} minutes reserved at {}/min",
        consultation.id, consultation.elapsed_minutes, consultation.rate_per_minute
    );

    let mut session = SignalingSession::new(
        room_id,
        Box::new(SignalOnlyPeer),
        connection.clone(),
        &config.signaling,
    );
    session.start_call().await?;

    let mut rx = connection.subscribe();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let outcome: Result<(), Box<dyn Error>> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = session.hang_up().await;
                break Ok(());
            }
            signal = rx.recv() => {
                match signal {
                    Ok(ConnectionSignal::Event(event)) => {
                        if let Err(err) = session.handle_event(&event).await {
                            break Err(err.into());
                        }
                        if session.state() == CallState::Closed {
                            break Ok(());
                        }
                    }
                    Ok(ConnectionSignal::Reconnected) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break Err("relay connection closed".into());
                    }
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                if let Err(err) = session.enforce_setup_timeout(now).await {
                    break Err(err.into());
                }
                match billing.is_exhausted(&consultation.id, now).await {
                    Ok(true) => {
                        println!("reserved time exhausted, ending call");
                        let _ = session.hang_up().await;
                        break Ok(());
                    }
                    Ok(false) => {}
                    Err(err) => break Err(err.into()),
                }
            }
        }
    };

    let settlement = billing.end(&consultation.id).await?;
    info!(
        session_id = %consultation.id,
        charged = settlement.charged,
        refunded = settlement.refunded,
        "consultation settled"
    );
    println!(
        "consultation {} ended: charged {}, refunded {}",
        consultation.id, settlement.charged, settlement.refunded
    );

    connection.close();
    outcome
}
