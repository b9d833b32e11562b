// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auth collaborator trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ParleyError;
use crate::types::ParticipantId;

/// Identity material attached to every relay connect call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub participant_id: ParticipantId,
    /// Bearer credential issued by the auth collaborator. Opaque to the
    /// engine.
    pub token: String,
}

/// Supplier of connection credentials.
///
/// Token issuance and refresh live outside the engine; this trait is the
/// interface boundary.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns credentials valid for a new relay connection.
    async fn credentials(&self) -> Result<Credentials, ParleyError>;
}
