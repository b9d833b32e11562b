// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger/consultation collaborator trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ParleyError;
use crate::types::{
    Amount, ConsultationKind, ConsultationSession, ParticipantId, SessionId, Settlement,
};

/// Request payload for opening a consultation with an initial reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConsultation {
    pub client_id: ParticipantId,
    pub provider_id: ParticipantId,
    pub kind: ConsultationKind,
    pub rate_per_minute: Amount,
    /// Minutes covered by the initial reservation.
    pub reserved_minutes: u32,
}

/// The balance ledger, the single source of truth for money.
///
/// The engine never computes a balance locally and writes it back; it only
/// reads authoritative results. Start/extend/end are serialized per session
/// by the collaborator.
#[async_trait]
pub trait ConsultationLedger: Send + Sync {
    /// Current prepaid balance for a participant.
    async fn balance(&self, participant: &ParticipantId) -> Result<Amount, ParleyError>;

    /// Per-minute rate charged by a provider.
    async fn provider_rate(&self, provider: &ParticipantId) -> Result<Amount, ParleyError>;

    /// Opens a consultation, reserving `rate_per_minute * reserved_minutes`
    /// against the client's balance.
    async fn start_consultation(
        &self,
        request: &StartConsultation,
    ) -> Result<ConsultationSession, ParleyError>;

    /// Grows the reservation by `additional_minutes` worth of the session
    /// rate. Fails without mutating anything if the balance cannot cover
    /// the extension.
    async fn extend_consultation(
        &self,
        id: &SessionId,
        additional_minutes: u32,
    ) -> Result<ConsultationSession, ParleyError>;

    /// Settles the session: charges for `elapsed_minutes`, refunds the
    /// unused reservation, and marks the session ended.
    async fn end_consultation(
        &self,
        id: &SessionId,
        elapsed_minutes: u32,
    ) -> Result<Settlement, ParleyError>;
}
