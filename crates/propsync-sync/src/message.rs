// crates/propsync-sync/src/message.rs
// ============================================================================
// Module: PropSync Wire Messages
// Description: Tagged realtime messages with camelCase wire fields.
// Purpose: Give every realtime frame an exhaustively validated shape.
// Dependencies: propsync-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every realtime frame is a [`SyncMessage`]: a tagged message type, the
//! entity kind it concerns, the originating client identifier, and an
//! optional payload. Deserialization rejects unknown message types and
//! malformed fields instead of carrying loosely typed payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use propsync_core::ChangeOp;
use propsync_core::ClientId;
use propsync_core::EntityChange;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Message Type
// ============================================================================

/// Realtime message classification.
///
/// # Invariants
/// - Variants are stable for the wire and for handler routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A record was created.
    Create,
    /// A record was updated.
    Update,
    /// A record was soft-deleted.
    Delete,
    /// A concurrent-edit conflict notification.
    Conflict,
    /// A connection sync-status notification.
    SyncStatus,
}

impl MessageType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Conflict => "conflict",
            Self::SyncStatus => "sync_status",
        }
    }
}

impl From<ChangeOp> for MessageType {
    fn from(op: ChangeOp) -> Self {
        match op {
            ChangeOp::Create => Self::Create,
            ChangeOp::Update => Self::Update,
            ChangeOp::Delete => Self::Delete,
        }
    }
}

// ============================================================================
// SECTION: Sync Message
// ============================================================================

/// One realtime frame.
///
/// # Invariants
/// - Wire field names are camelCase and stable.
/// - `client_id` identifies the originating connection for echo
///   suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Message classification.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Entity kind the message concerns.
    pub entity_type: EntityKind,
    /// Entity identifier, when the message targets one record.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<EntityId>,
    /// Full record payload for creates/updates; absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    /// Send time at the originating client.
    pub timestamp: Timestamp,
    /// Originating connection identifier.
    pub client_id: ClientId,
    /// Record version after the change, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<u64>,
}

impl SyncMessage {
    /// Builds a frame from a confirmed local mutation.
    #[must_use]
    pub fn from_change(change: &EntityChange, client_id: &ClientId) -> Self {
        Self {
            message_type: MessageType::from(change.op),
            entity_type: change.entity_kind,
            entity_id: Some(change.entity_id.clone()),
            data: change.data.clone(),
            timestamp: Timestamp::now(),
            client_id: client_id.clone(),
            version: change.version,
        }
    }

    /// Returns the handler registry key: `entityType:messageType`.
    #[must_use]
    pub fn handler_key(&self) -> String {
        format!("{}:{}", self.entity_type.as_str(), self.message_type.as_str())
    }

    /// Converts the frame back into a store-facing change, when it
    /// describes one.
    ///
    /// Conflict and sync-status frames carry no reconcilable change.
    #[must_use]
    pub fn to_change(&self) -> Option<EntityChange> {
        let op = match self.message_type {
            MessageType::Create => ChangeOp::Create,
            MessageType::Update => ChangeOp::Update,
            MessageType::Delete => ChangeOp::Delete,
            MessageType::Conflict | MessageType::SyncStatus => return None,
        };
        let entity_id = self.entity_id.clone()?;
        Some(EntityChange {
            op,
            entity_kind: self.entity_type,
            entity_id,
            data: self.data.clone(),
            version: self.version,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
