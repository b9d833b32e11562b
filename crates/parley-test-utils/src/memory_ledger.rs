// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory balance ledger for testing.
//!
//! Implements the authoritative money semantics the real ledger collaborator
//! guarantees: reservations deduct from the balance up front, extensions
//! re-check the remaining balance, and settlement charges only for elapsed
//! time, refunding the rest. Operations are serialized behind one mutex.

use std::collections::HashMap;

use async_trait::async_trait;
use parley_core::traits::ledger::StartConsultation;
use parley_core::types::{
    Amount, ConsultationSession, ParticipantId, SessionId, SessionStatus, Settlement,
};
use parley_core::{ConsultationLedger, ParleyError};
use tokio::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<ParticipantId, Amount>,
    rates: HashMap<ParticipantId, Amount>,
    sessions: HashMap<SessionId, ConsultationSession>,
    settlements: HashMap<SessionId, Settlement>,
    next_session: u64,
}

/// A ledger backed by hash maps, for tests.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            fail_next: Mutex::new(None),
        }
    }

    pub async fn set_balance(&self, participant: &ParticipantId, amount: Amount) {
        self.state
            .lock()
            .await
            .balances
            .insert(participant.clone(), amount);
    }

    pub async fn set_rate(&self, provider: &ParticipantId, rate: Amount) {
        self.state.lock().await.rates.insert(provider.clone(), rate);
    }

    /// Arm a one-shot failure: the next ledger operation fails with a
    /// persistence error carrying `message`.
    pub async fn fail_next(&self, message: &str) {
        *self.fail_next.lock().await = Some(message.to_string());
    }

    async fn take_armed_failure(&self) -> Result<(), ParleyError> {
        if let Some(message) = self.fail_next.lock().await.take() {
            return Err(ParleyError::persistence(message));
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsultationLedger for InMemoryLedger {
    async fn balance(&self, participant: &ParticipantId) -> Result<Amount, ParleyError> {
        self.take_armed_failure().await?;
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(participant)
            .copied()
            .unwrap_or(0))
    }

    async fn provider_rate(&self, provider: &ParticipantId) -> Result<Amount, ParleyError> {
        self.take_armed_failure().await?;
        self.state
            .lock()
            .await
            .rates
            .get(provider)
            .copied()
            .ok_or_else(|| ParleyError::persistence(format!("no rate for provider {provider}")))
    }

    async fn start_consultation(
        &self,
        request: &StartConsultation,
    ) -> Result<ConsultationSession, ParleyError> {
        self.take_armed_failure().await?;
        let mut state = self.state.lock().await;

        let reserve = request.rate_per_minute * Amount::from(request.reserved_minutes);
        let balance = state
            .balances
            .get(&request.client_id)
            .copied()
            .unwrap_or(0);
        if balance < reserve {
            return Err(ParleyError::InsufficientBalance {
                required: reserve,
                current: balance,
                shortfall: reserve - balance,
            });
        }

        state
            .balances
            .insert(request.client_id.clone(), balance - reserve);
        state.next_session += 1;
        let session = ConsultationSession {
            id: SessionId(format!("c-{}", state.next_session)),
            client_id: request.client_id.clone(),
            provider_id: request.provider_id.clone(),
            kind: request.kind,
            rate_per_minute: request.rate_per_minute,
            started_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            status: SessionStatus::Active,
            reserved_balance: reserve,
            elapsed_minutes: request.reserved_minutes,
        };
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn extend_consultation(
        &self,
        id: &SessionId,
        additional_minutes: u32,
    ) -> Result<ConsultationSession, ParleyError> {
        self.take_armed_failure().await?;
        let mut state = self.state.lock().await;

        let session = state
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| ParleyError::persistence(format!("no such session: {id}")))?;
        if session.status != SessionStatus::Active {
            return Err(ParleyError::Validation(format!(
                "session {id} is {}, cannot extend",
                session.status
            )));
        }

        let amount = session.rate_per_minute * Amount::from(additional_minutes);
        let balance = state
            .balances
            .get(&session.client_id)
            .copied()
            .unwrap_or(0);
        if balance < amount {
            return Err(ParleyError::InsufficientBalance {
                required: amount,
                current: balance,
                shortfall: amount - balance,
            });
        }

        state
            .balances
            .insert(session.client_id.clone(), balance - amount);
        let session = state
            .sessions
            .get_mut(id)
            .expect("session checked above");
        session.reserved_balance += amount;
        session.elapsed_minutes += additional_minutes;
        Ok(session.clone())
    }

    async fn end_consultation(
        &self,
        id: &SessionId,
        elapsed_minutes: u32,
    ) -> Result<Settlement, ParleyError> {
        self.take_armed_failure().await?;
        let mut state = self.state.lock().await;

        let session = state
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| ParleyError::persistence(format!("no such session: {id}")))?;
        if session.status == SessionStatus::Ended {
            return Err(ParleyError::Validation(format!(
                "session {id} already ended"
            )));
        }

        let charged = (session.rate_per_minute * Amount::from(elapsed_minutes))
            .min(session.reserved_balance);
        let refunded = session.reserved_balance - charged;
        let balance = state
            .balances
            .get(&session.client_id)
            .copied()
            .unwrap_or(0);
        state
            .balances
            .insert(session.client_id.clone(), balance + refunded);

        let session = state.sessions.get_mut(id).expect("session checked above");
        session.status = SessionStatus::Ended;
        let settlement = Settlement {
            session: session.clone(),
            charged,
            refunded,
        };
        state
            .settlements
            .insert(id.clone(), settlement.clone());
        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ConsultationKind;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId(s.into())
    }

    fn request(rate: Amount, minutes: u32) -> StartConsultation {
        StartConsultation {
            client_id: pid("client"),
            provider_id: pid("astro"),
            kind: ConsultationKind::Chat,
            rate_per_minute: rate,
            reserved_minutes: minutes,
        }
    }

    #[tokio::test]
    async fn start_reserves_against_balance() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(&pid("client"), 100).await;
        let session = ledger.start_consultation(&request(10, 5)).await.unwrap();
        assert_eq!(session.reserved_balance, 50);
        assert_eq!(ledger.balance(&pid("client")).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn start_rejects_short_balance_with_shortfall() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(&pid("client"), 40).await;
        let err = ledger.start_consultation(&request(10, 5)).await.unwrap_err();
        match err {
            ParleyError::InsufficientBalance {
                required,
                current,
                shortfall,
            } => {
                assert_eq!(required, 50);
                assert_eq!(current, 40);
                assert_eq!(shortfall, 10);
            }
            other => panic!("expected insufficient balance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_charges_elapsed_and_refunds_rest() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(&pid("client"), 100).await;
        let session = ledger.start_consultation(&request(10, 5)).await.unwrap();

        let settlement = ledger.end_consultation(&session.id, 3).await.unwrap();
        assert_eq!(settlement.charged, 30);
        assert_eq!(settlement.refunded, 20);
        assert_eq!(ledger.balance(&pid("client")).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn charge_never_exceeds_reservation() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(&pid("client"), 100).await;
        let session = ledger.start_consultation(&request(10, 5)).await.unwrap();

        // Elapsed past the reserved ceiling still only charges the reserve.
        let settlement = ledger.end_consultation(&session.id, 9).await.unwrap();
        assert_eq!(settlement.charged, 50);
        assert_eq!(settlement.refunded, 0);
    }

    #[tokio::test]
    async fn double_end_is_rejected_by_ledger() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(&pid("client"), 100).await;
        let session = ledger.start_consultation(&request(10, 5)).await.unwrap();
        ledger.end_consultation(&session.id, 1).await.unwrap();
        assert!(ledger.end_consultation(&session.id, 1).await.is_err());
    }
}
