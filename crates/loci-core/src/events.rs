use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TargetType, Timestamp, TriggerType};

/// Item-lifecycle events consumed by the workflow engine.
///
/// Events are emitted by the record CRUD layer (an external collaborator)
/// after a mutation commits, and fed to `WorkflowEngine::evaluate`. Each
/// variant carries the item's data after the mutation; update-shaped
/// variants also carry the previous snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ItemEvent {
    /// A record was created.
    ItemCreated {
        item_type: TargetType,
        item_id: Uuid,
        data: serde_json::Value,
        timestamp: Timestamp,
    },

    /// A record's fields were updated.
    ItemUpdated {
        item_type: TargetType,
        item_id: Uuid,
        data: serde_json::Value,
        previous: serde_json::Value,
        timestamp: Timestamp,
    },

    /// A record was deleted. `data` is the last snapshot before deletion.
    ItemDeleted {
        item_type: TargetType,
        item_id: Uuid,
        data: serde_json::Value,
        timestamp: Timestamp,
    },

    /// A record's `status` field changed value.
    StatusChanged {
        item_type: TargetType,
        item_id: Uuid,
        data: serde_json::Value,
        previous: serde_json::Value,
        timestamp: Timestamp,
    },
}

impl ItemEvent {
    /// The trigger class this event corresponds to.
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            ItemEvent::ItemCreated { .. } => TriggerType::ItemCreated,
            ItemEvent::ItemUpdated { .. } => TriggerType::ItemUpdated,
            ItemEvent::ItemDeleted { .. } => TriggerType::ItemDeleted,
            ItemEvent::StatusChanged { .. } => TriggerType::StatusChanged,
        }
    }

    pub fn item_type(&self) -> TargetType {
        match self {
            ItemEvent::ItemCreated { item_type, .. }
            | ItemEvent::ItemUpdated { item_type, .. }
            | ItemEvent::ItemDeleted { item_type, .. }
            | ItemEvent::StatusChanged { item_type, .. } => *item_type,
        }
    }

    pub fn item_id(&self) -> Uuid {
        match self {
            ItemEvent::ItemCreated { item_id, .. }
            | ItemEvent::ItemUpdated { item_id, .. }
            | ItemEvent::ItemDeleted { item_id, .. }
            | ItemEvent::StatusChanged { item_id, .. } => *item_id,
        }
    }

    /// The item's data after the mutation (last snapshot for deletes).
    pub fn data(&self) -> &serde_json::Value {
        match self {
            ItemEvent::ItemCreated { data, .. }
            | ItemEvent::ItemUpdated { data, .. }
            | ItemEvent::ItemDeleted { data, .. }
            | ItemEvent::StatusChanged { data, .. } => data,
        }
    }

    /// The item's data before the mutation, where the event carries one.
    pub fn previous(&self) -> Option<&serde_json::Value> {
        match self {
            ItemEvent::ItemUpdated { previous, .. }
            | ItemEvent::StatusChanged { previous, .. } => Some(previous),
            ItemEvent::ItemCreated { .. } | ItemEvent::ItemDeleted { .. } => None,
        }
    }
}
