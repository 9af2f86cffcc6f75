//! Client command surface and outbound notifications
//!
//! Both are plain serde enums tagged by a `type` field, matching the shape a
//! transport decodes from (and encodes to) JSON frames.

use crate::error::{Error, ErrorKind, Result};
use idlemmo_core::{
    ActivityId, ActivitySummary, EquipmentBonus, EquippedItemView, ItemDrop, ItemId, PlayerId,
    PlayerState, RareEvent, Slot, SubProjectId,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Login,
    StartSequence {
        seq_id: ActivityId,
        #[serde(default)]
        sub_project_id: Option<SubProjectId>,
    },
    StopSequence,
    ListSequences,
    ListBag,
    ListEquipment {
        #[serde(default)]
        include_catalog: bool,
    },
    EquipItem {
        item_id: ItemId,
        #[serde(default)]
        enhancement: i32,
    },
    UnequipItem {
        slot: String,
    },
    UseItem {
        item_id: ItemId,
        count: i64,
    },
    RemoveItem {
        item_id: ItemId,
        count: i64,
    },
}

impl ClientCommand {
    /// Decode a JSON frame
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Login => "login",
            ClientCommand::StartSequence { .. } => "start_sequence",
            ClientCommand::StopSequence => "stop_sequence",
            ClientCommand::ListSequences => "list_sequences",
            ClientCommand::ListBag => "list_bag",
            ClientCommand::ListEquipment { .. } => "list_equipment",
            ClientCommand::EquipItem { .. } => "equip_item",
            ClientCommand::UnequipItem { .. } => "unequip_item",
            ClientCommand::UseItem { .. } => "use_item",
            ClientCommand::RemoveItem { .. } => "remove_item",
        }
    }

    /// True for commands that change durable player state on success
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ClientCommand::EquipItem { .. }
                | ClientCommand::UnequipItem { .. }
                | ClientCommand::UseItem { .. }
                | ClientCommand::RemoveItem { .. }
        )
    }
}

/// Full player view sent on login and state-requesting reconnects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub exp: i64,
    pub seq_levels: IndexMap<ActivityId, u32>,
    pub bag: IndexMap<ItemId, u64>,
    pub equipment: IndexMap<Slot, EquippedItemView>,
    pub equipment_bonus: EquipmentBonus,
    pub is_running: bool,
    pub seq_id: Option<ActivityId>,
    pub seq_level: u32,
    pub active_sub_project: Option<SubProjectId>,
}

impl PlayerView {
    pub fn of(state: &PlayerState) -> Self {
        Self {
            exp: state.exp,
            seq_levels: state.seq_levels.clone(),
            bag: state.inventory.to_counts(),
            equipment: state.equipment.export_view(),
            equipment_bonus: state.equipment_bonus(),
            is_running: state.current_activity.is_some(),
            seq_id: state.current_activity.clone(),
            seq_level: state.current_level(),
            active_sub_project: state.active_sub_project.clone(),
        }
    }
}

/// Outbound notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewPlayer {
        player_id: PlayerId,
    },
    LoadOk {
        exp: i64,
        bag: IndexMap<ItemId, u64>,
        equipment: IndexMap<Slot, EquippedItemView>,
        equipment_bonus: EquipmentBonus,
        offline_limit_hours: u64,
    },
    LoginOk {
        player_id: PlayerId,
        #[serde(flatten)]
        view: PlayerView,
    },
    Reconnected {
        state: Option<PlayerView>,
    },
    OfflineReward {
        gains: i64,
        items: IndexMap<ItemId, u64>,
        offline_duration_secs: u64,
        bag: IndexMap<ItemId, u64>,
    },
    SequenceStarted {
        seq_id: ActivityId,
        level: u32,
        sub_project_id: Option<SubProjectId>,
        tick_interval_secs: f64,
        equipment_bonus: EquipmentBonus,
    },
    SequenceResult {
        seq_id: ActivityId,
        gains: i64,
        items: Vec<ItemDrop>,
        rare: Option<RareEvent>,
        level: u32,
        cur_exp: i64,
        leveled: bool,
        sub_project_id: Option<SubProjectId>,
        equipment_bonus: EquipmentBonus,
        bag: IndexMap<ItemId, u64>,
    },
    SequenceEnded {
        seq_id: Option<ActivityId>,
    },
    SequenceList {
        sequences: Vec<ActivitySummary>,
    },
    BagInfo {
        bag: IndexMap<ItemId, u64>,
    },
    ItemUsed {
        item_id: ItemId,
        count: i64,
        gain: i64,
        exp: i64,
    },
    ItemRemoved {
        item_id: ItemId,
        count: i64,
        bag: IndexMap<ItemId, u64>,
    },
    EquipmentChanged {
        slot: Slot,
        equipped: Option<ItemId>,
        returned: Option<ItemId>,
        equipment: IndexMap<Slot, EquippedItemView>,
        equipment_bonus: EquipmentBonus,
    },
    EquipmentState {
        equipment: IndexMap<Slot, EquippedItemView>,
        equipment_bonus: EquipmentBonus,
        active_sub_project: Option<SubProjectId>,
        catalog: Option<IndexMap<ItemId, EquippedItemView>>,
    },
    Error {
        message: String,
        kind: String,
    },
}

impl Notification {
    /// Error notification for a rejected command
    pub fn error(err: &Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::Capacity => "capacity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Infrastructure => "infrastructure",
        };
        Notification::Error {
            message: err.to_string(),
            kind: kind.to_string(),
        }
    }

    /// The `type` tag, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::NewPlayer { .. } => "new_player",
            Notification::LoadOk { .. } => "load_ok",
            Notification::LoginOk { .. } => "login_ok",
            Notification::Reconnected { .. } => "reconnected",
            Notification::OfflineReward { .. } => "offline_reward",
            Notification::SequenceStarted { .. } => "sequence_started",
            Notification::SequenceResult { .. } => "sequence_result",
            Notification::SequenceEnded { .. } => "sequence_ended",
            Notification::SequenceList { .. } => "sequence_list",
            Notification::BagInfo { .. } => "bag_info",
            Notification::ItemUsed { .. } => "item_used",
            Notification::ItemRemoved { .. } => "item_removed",
            Notification::EquipmentChanged { .. } => "equipment_changed",
            Notification::EquipmentState { .. } => "equipment_state",
            Notification::Error { .. } => "error",
        }
    }

    /// Encode as a JSON frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_commands() {
        let cmd = ClientCommand::from_json(r#"{"type":"start_sequence","seq_id":"mining"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::StartSequence {
                seq_id: ActivityId::new("mining"),
                sub_project_id: None,
            }
        );

        let cmd = ClientCommand::from_json(r#"{"type":"stop_sequence"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::StopSequence);

        let cmd = ClientCommand::from_json(r#"{"type":"list_equipment"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::ListEquipment { include_catalog: false });

        let cmd =
            ClientCommand::from_json(r#"{"type":"use_item","item_id":"potion","count":2}"#).unwrap();
        assert!(cmd.is_mutating());
        assert_eq!(cmd.name(), "use_item");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = ClientCommand::from_json(r#"{"type":"fly"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_notification_tag() {
        let json = Notification::SequenceEnded { seq_id: None }.to_json().unwrap();
        assert!(json.contains(r#""type":"sequence_ended""#));

        let err: Error = idlemmo_core::Error::InventoryFull { limit: 2 }.into();
        match Notification::error(&err) {
            Notification::Error { kind, .. } => assert_eq!(kind, "capacity"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
