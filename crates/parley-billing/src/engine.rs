// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The consultation billing state machine.
//!
//! Gates consultation start, extension, and termination on the prepaid
//! balance held by the ledger collaborator. Money moves only through the
//! ledger; the engine reads authoritative balances and session records and
//! never computes a balance locally to write back.
//!
//! Reservations are block-based: starting reserves one minimum block,
//! extending re-checks the balance and grows the reservation by one more
//! block, ending settles the session by charging true elapsed minutes
//! (ceiling of seconds over 60, never past the reserved ceiling) and
//! refunding the rest.

use std::collections::HashMap;
use std::time::Instant;

use parley_config::model::BillingConfig;
use parley_core::traits::ledger::StartConsultation;
use parley_core::{
    Amount, ConsultationKind, ConsultationLedger, ConsultationSession, ParleyError,
    ParticipantId, SessionId, SessionStatus, Settlement,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Ceiling of elapsed whole minutes between two instants.
///
/// A consultation that ran any fraction of a minute is billed for the full
/// minute; zero elapsed time bills zero minutes.
pub fn elapsed_minutes(started_at: Instant, now: Instant) -> u32 {
    let secs = now.saturating_duration_since(started_at).as_secs();
    secs.div_ceil(60) as u32
}

struct ActiveConsultation {
    session: ConsultationSession,
    started_at: Instant,
}

/// Occupancy of one (client, provider) pair.
enum PairSlot {
    /// A start is in flight; the pair is held until the ledger answers.
    Starting,
    Active(SessionId),
}

#[derive(Default)]
struct EngineState {
    active: HashMap<SessionId, ActiveConsultation>,
    /// One consultation per (client, provider) pair, starting or active.
    pairs: HashMap<(ParticipantId, ParticipantId), PairSlot>,
    /// Settlements kept for idempotent re-ends.
    settled: HashMap<SessionId, Settlement>,
}

/// Billing engine over one ledger collaborator.
pub struct BillingEngine {
    ledger: Arc<dyn ConsultationLedger>,
    minimum_block_minutes: u32,
    state: Mutex<EngineState>,
}

impl BillingEngine {
    pub fn new(ledger: Arc<dyn ConsultationLedger>, config: &BillingConfig) -> Self {
        Self {
            ledger,
            minimum_block_minutes: config.minimum_block_minutes,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Start a consultation, reserving one minimum block against the
    /// client's balance.
    ///
    /// Fails fast with [`ParleyError::InsufficientBalance`] before touching
    /// the ledger's session state when the balance cannot cover the block,
    /// and with a validation error when this pair already has an active
    /// consultation.
    pub async fn start(
        &self,
        client: &ParticipantId,
        provider: &ParticipantId,
        kind: ConsultationKind,
    ) -> Result<ConsultationSession, ParleyError> {
        self.start_at(client, provider, kind, Instant::now()).await
    }

    /// As [`Self::start`], with an injected clock.
    pub async fn start_at(
        &self,
        client: &ParticipantId,
        provider: &ParticipantId,
        kind: ConsultationKind,
        now: Instant,
    ) -> Result<ConsultationSession, ParleyError> {
        let pair = (client.clone(), provider.clone());
        {
            let mut state = self.state.lock().await;
            match state.pairs.get(&pair) {
                Some(PairSlot::Active(existing)) => {
                    return Err(ParleyError::Validation(format!(
                        "consultation {existing} already active for this pair"
                    )));
                }
                Some(PairSlot::Starting) => {
                    return Err(ParleyError::Validation(
                        "consultation already starting for this pair".into(),
                    ));
                }
                None => {
                    state.pairs.insert(pair.clone(), PairSlot::Starting);
                }
            }
        }

        // The lock is not held across ledger calls; the starting slot keeps
        // the pair exclusive meanwhile.
        let outcome = self.open_consultation(client, provider, kind).await;

        let mut state = self.state.lock().await;
        let session = match outcome {
            Ok(session) => session,
            Err(err) => {
                state.pairs.remove(&pair);
                return Err(err);
            }
        };

        info!(
            session_id = %session.id,
            client_id = %client,
            provider_id = %provider,
            reserved = session.reserved_balance,
            "consultation started"
        );
        state.pairs.insert(pair, PairSlot::Active(session.id.clone()));
        state.active.insert(
            session.id.clone(),
            ActiveConsultation {
                session: session.clone(),
                started_at: now,
            },
        );
        Ok(session)
    }

    async fn open_consultation(
        &self,
        client: &ParticipantId,
        provider: &ParticipantId,
        kind: ConsultationKind,
    ) -> Result<ConsultationSession, ParleyError> {
        let rate = self.ledger.provider_rate(provider).await?;
        if rate <= 0 {
            return Err(ParleyError::Validation(format!(
                "provider {provider} has no positive rate"
            )));
        }

        let required = rate * Amount::from(self.minimum_block_minutes);
        let current = self.ledger.balance(client).await?;
        if current < required {
            return Err(ParleyError::InsufficientBalance {
                required,
                current,
                shortfall: required - current,
            });
        }

        self.ledger
            .start_consultation(&StartConsultation {
                client_id: client.clone(),
                provider_id: provider.clone(),
                kind,
                rate_per_minute: rate,
                reserved_minutes: self.minimum_block_minutes,
            })
            .await
    }

    /// Extend the reservation by one more minimum block.
    ///
    /// The balance is re-checked first; on failure nothing changes and the
    /// session stays active, leaving the caller to extend again later or
    /// end the consultation.
    pub async fn extend(&self, id: &SessionId) -> Result<ConsultationSession, ParleyError> {
        let (rate, client_id) = {
            let state = self.state.lock().await;
            let active = state
                .active
                .get(id)
                .ok_or_else(|| ParleyError::Validation(format!("no active consultation {id}")))?;
            (active.session.rate_per_minute, active.session.client_id.clone())
        };

        let required = rate * Amount::from(self.minimum_block_minutes);
        let current = self.ledger.balance(&client_id).await?;
        if current < required {
            warn!(session_id = %id, required, current, "extension refused, balance short");
            return Err(ParleyError::InsufficientBalance {
                required,
                current,
                shortfall: required - current,
            });
        }

        let session = self
            .ledger
            .extend_consultation(id, self.minimum_block_minutes)
            .await?;
        info!(
            session_id = %id,
            reserved = session.reserved_balance,
            ceiling_minutes = session.elapsed_minutes,
            "consultation extended"
        );
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.get_mut(id) {
            active.session = session.clone();
        }
        Ok(session)
    }

    /// End and settle a consultation.
    ///
    /// Elapsed time is billed as the ceiling of elapsed seconds over 60,
    /// capped at the reserved ceiling. Idempotent: ending an
    /// already-settled session returns the recorded settlement without
    /// another ledger call.
    pub async fn end(&self, id: &SessionId) -> Result<Settlement, ParleyError> {
        self.end_at(id, Instant::now()).await
    }

    /// As [`Self::end`], with an injected clock.
    pub async fn end_at(&self, id: &SessionId, now: Instant) -> Result<Settlement, ParleyError> {
        // Taking the record out keeps the settlement exclusive without
        // holding the lock across the ledger call.
        let active = {
            let mut state = self.state.lock().await;
            if let Some(settlement) = state.settled.get(id) {
                return Ok(settlement.clone());
            }
            state
                .active
                .remove(id)
                .ok_or_else(|| ParleyError::Validation(format!("no active consultation {id}")))?
        };

        let billable =
            elapsed_minutes(active.started_at, now).min(active.session.elapsed_minutes);
        let result = self.ledger.end_consultation(id, billable).await;

        let mut state = self.state.lock().await;
        let settlement = match result {
            Ok(settlement) => settlement,
            Err(err) => {
                state.active.insert(id.clone(), active);
                return Err(err);
            }
        };
        info!(
            session_id = %id,
            elapsed_minutes = billable,
            charged = settlement.charged,
            refunded = settlement.refunded,
            "consultation settled"
        );

        let pair = (
            settlement.session.client_id.clone(),
            settlement.session.provider_id.clone(),
        );
        state.pairs.remove(&pair);
        state.settled.insert(id.clone(), settlement.clone());
        Ok(settlement)
    }

    /// Minutes of the reservation not yet consumed, by the billing ceiling.
    pub async fn remaining_minutes(
        &self,
        id: &SessionId,
        now: Instant,
    ) -> Result<u32, ParleyError> {
        let state = self.state.lock().await;
        let active = state
            .active
            .get(id)
            .ok_or_else(|| ParleyError::Validation(format!("no active consultation {id}")))?;
        let used = elapsed_minutes(active.started_at, now);
        Ok(active.session.elapsed_minutes.saturating_sub(used))
    }

    /// Whether the reservation is used up. The caller must then extend or
    /// end; the engine never bills past the reservation.
    pub async fn is_exhausted(&self, id: &SessionId, now: Instant) -> Result<bool, ParleyError> {
        Ok(self.remaining_minutes(id, now).await? == 0)
    }

    /// Current record of an active consultation.
    pub async fn session(&self, id: &SessionId) -> Option<ConsultationSession> {
        self.state
            .lock()
            .await
            .active
            .get(id)
            .map(|a| a.session.clone())
    }

    /// Status across active and settled records.
    pub async fn status(&self, id: &SessionId) -> Option<SessionStatus> {
        let state = self.state.lock().await;
        if state.active.contains_key(id) {
            Some(SessionStatus::Active)
        } else if state.settled.contains_key(id) {
            Some(SessionStatus::Ended)
        } else {
            None
        }
    }
}
