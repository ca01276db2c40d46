//! Local mirrors of gateway-managed entities.

use chrono::{DateTime, Utc};
use selve_protocol::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// Entity Kinds
// ============================================================================

/// Kinds of entity the gateway manages. Ids are unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Commeo actuator (two-way).
    Device,
    /// Iveo actuator (one-way).
    Iveo,
    Group,
    /// Weather sensor.
    Sensor,
    /// Remote transmitter.
    Sender,
    /// Sensor-simulation channel acting as a virtual controller.
    Controller,
}

impl EntityKind {
    /// Every kind, in discovery order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Device,
        EntityKind::Iveo,
        EntityKind::Group,
        EntityKind::Sensor,
        EntityKind::Sender,
        EntityKind::Controller,
    ];

    /// Highest valid id for this kind.
    pub fn max_id(self) -> u8 {
        match self {
            EntityKind::Device | EntityKind::Iveo => MAX_DEVICE_ID,
            EntityKind::Group => MAX_GROUP_ID,
            EntityKind::Sender => MAX_SENDER_ID,
            EntityKind::Sensor => MAX_SENSOR_ID,
            EntityKind::Controller => MAX_SENSIM_ID,
        }
    }

    /// Reject ids outside this kind's id space.
    pub fn check_id(self, id: u8) -> Result<u8, EncodingError> {
        let max = self.max_id();
        if id > max {
            return Err(EncodingError::IdOutOfRange { id, max });
        }
        Ok(id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::Iveo => "iveo",
            EntityKind::Group => "group",
            EntityKind::Sensor => "sensor",
            EntityKind::Sender => "sender",
            EntityKind::Controller => "controller",
        }
    }

    /// The `getIDs` call listing this kind's entities.
    pub fn get_ids_call(self) -> MethodCall {
        match self {
            EntityKind::Device => MethodCall::device_get_ids(),
            EntityKind::Iveo => MethodCall::iveo_get_ids(),
            EntityKind::Group => MethodCall::group_get_ids(),
            EntityKind::Sensor => MethodCall::sensor_get_ids(),
            EntityKind::Sender => MethodCall::sender_get_ids(),
            EntityKind::Controller => MethodCall::sensim_get_ids(),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entity Snapshots
// ============================================================================

/// Coarse operational state of an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseState {
    Idle,
    Moving,
    Unknown,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    pub device_type: Option<DeviceType>,
    pub rf_address: Option<i64>,
    /// Slot state of the gateway entry.
    pub slot: Option<DeviceState>,
    pub movement: Option<MovementState>,
    /// Current position in percent, 0 = open.
    pub position: Option<u8>,
    pub target: Option<u8>,
    pub flags: DeviceFlags,
    pub day_mode: Option<DayMode>,
}

impl DeviceDetails {
    pub fn coarse_state(&self) -> CoarseState {
        match self.movement {
            Some(MovementState::UpOn) | Some(MovementState::DownOn) => CoarseState::Moving,
            _ if self.flags.has_fault() => CoarseState::Error,
            Some(MovementState::StoppedOff) => CoarseState::Idle,
            _ => CoarseState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IveoDetails {
    pub device_type: Option<DeviceType>,
    pub activity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    /// Member device ids.
    pub members: IdMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDetails {
    pub rf_address: Option<i64>,
    pub state: Option<SensorState>,
    pub readings: Option<SensorReadings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderDetails {
    pub rf_address: Option<i64>,
    pub channel: Option<i64>,
    pub reset_count: Option<i64>,
    /// Last key event seen from this transmitter.
    pub last_event: Option<SenderEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerDetails {
    pub active: Option<bool>,
    pub readings: Option<SensorReadings>,
}

/// Kind-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetails {
    Device(DeviceDetails),
    Iveo(IveoDetails),
    Group(GroupDetails),
    Sensor(SensorDetails),
    Sender(SenderDetails),
    Controller(ControllerDetails),
}

impl EntityDetails {
    /// Empty attributes for `kind`.
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Device => EntityDetails::Device(DeviceDetails::default()),
            EntityKind::Iveo => EntityDetails::Iveo(IveoDetails::default()),
            EntityKind::Group => EntityDetails::Group(GroupDetails::default()),
            EntityKind::Sensor => EntityDetails::Sensor(SensorDetails::default()),
            EntityKind::Sender => EntityDetails::Sender(SenderDetails::default()),
            EntityKind::Controller => EntityDetails::Controller(ControllerDetails::default()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityDetails::Device(_) => EntityKind::Device,
            EntityDetails::Iveo(_) => EntityKind::Iveo,
            EntityDetails::Group(_) => EntityKind::Group,
            EntityDetails::Sensor(_) => EntityKind::Sensor,
            EntityDetails::Sender(_) => EntityKind::Sender,
            EntityDetails::Controller(_) => EntityKind::Controller,
        }
    }
}

/// Snapshot of one gateway-managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u8,
    pub name: Option<String>,
    pub details: EntityDetails,
    pub last_updated: DateTime<Utc>,
    /// Created from an event before discovery read its attributes.
    pub placeholder: bool,
}

impl Entity {
    pub fn placeholder(kind: EntityKind, id: u8) -> Self {
        Entity {
            id,
            name: None,
            details: EntityDetails::empty(kind),
            last_updated: Utc::now(),
            placeholder: true,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.details.kind()
    }

    /// Device attributes, if this is a device.
    pub fn device(&self) -> Option<&DeviceDetails> {
        match &self.details {
            EntityDetails::Device(d) => Some(d),
            _ => None,
        }
    }

    /// Coarse state; only actuators have one.
    pub fn coarse_state(&self) -> Option<CoarseState> {
        self.device().map(DeviceDetails::coarse_state)
    }

    /// Group members, if this is a group.
    pub fn members(&self) -> Option<IdMask> {
        match &self.details {
            EntityDetails::Group(g) => Some(g.members),
            _ => None,
        }
    }

    /// Same name and attributes, ignoring timestamps.
    pub(crate) fn same_content(&self, other: &Entity) -> bool {
        self.name == other.name && self.details == other.details && self.placeholder == other.placeholder
    }
}

// ============================================================================
// Updates
// ============================================================================

/// A decoded payload that refreshes one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityUpdate {
    DeviceInfo(DeviceInfo),
    DeviceValues(DeviceValues),
    DeviceReport(DeviceReport),
    IveoConfig(IveoConfig),
    Group(GroupRecord),
    SensorInfo(SensorInfo),
    SensorValues(SensorValues),
    SenderInfo(SenderInfo),
    SenderReport(SenderReport),
    ControllerConfig(SenSimConfig),
    ControllerValues(SenSimValues),
}

impl EntityUpdate {
    /// The entity this update applies to.
    pub fn key(&self) -> (EntityKind, u8) {
        match self {
            EntityUpdate::DeviceInfo(u) => (EntityKind::Device, u.id),
            EntityUpdate::DeviceValues(u) => (EntityKind::Device, u.id),
            EntityUpdate::DeviceReport(u) => (EntityKind::Device, u.values.id),
            EntityUpdate::IveoConfig(u) => (EntityKind::Iveo, u.id),
            EntityUpdate::Group(u) => (EntityKind::Group, u.id),
            EntityUpdate::SensorInfo(u) => (EntityKind::Sensor, u.id),
            EntityUpdate::SensorValues(u) => (EntityKind::Sensor, u.id),
            EntityUpdate::SenderInfo(u) => (EntityKind::Sender, u.id),
            EntityUpdate::SenderReport(u) => (EntityKind::Sender, u.id),
            EntityUpdate::ControllerConfig(u) => (EntityKind::Controller, u.id),
            EntityUpdate::ControllerValues(u) => (EntityKind::Controller, u.id),
        }
    }

    /// Whether this update carries the entity's identity attributes. Such
    /// updates replace the name and clear the placeholder flag; value
    /// updates only overwrite the name when they carry one.
    fn is_authoritative(&self) -> bool {
        matches!(
            self,
            EntityUpdate::DeviceInfo(_)
                | EntityUpdate::IveoConfig(_)
                | EntityUpdate::Group(_)
                | EntityUpdate::SensorInfo(_)
                | EntityUpdate::SenderInfo(_)
                | EntityUpdate::ControllerConfig(_)
        )
    }

    fn name(&self) -> Option<&String> {
        match self {
            EntityUpdate::DeviceInfo(u) => u.name.as_ref(),
            EntityUpdate::DeviceValues(u) => u.name.as_ref(),
            EntityUpdate::DeviceReport(u) => u.values.name.as_ref(),
            EntityUpdate::IveoConfig(u) => u.name.as_ref(),
            EntityUpdate::Group(u) => u.name.as_ref(),
            EntityUpdate::SensorInfo(u) => u.name.as_ref(),
            EntityUpdate::SenderInfo(u) => u.name.as_ref(),
            EntityUpdate::SenderReport(u) => u.name.as_ref(),
            EntityUpdate::ControllerConfig(u) => u.name.as_ref(),
            EntityUpdate::SensorValues(_) | EntityUpdate::ControllerValues(_) => None,
        }
    }

    /// Merge into `entity`. Fields this update carries win; others are kept.
    /// An update for another kind leaves `entity` untouched and returns false.
    pub(crate) fn apply_to(&self, entity: &mut Entity) -> bool {
        let (kind, id) = self.key();
        if kind != entity.kind() || id != entity.id {
            warn!("{} {} update does not apply to {} {}", kind, id, entity.kind(), entity.id);
            return false;
        }

        if self.is_authoritative() {
            entity.name = self.name().cloned();
            entity.placeholder = false;
        } else if let Some(name) = self.name() {
            entity.name = Some(name.clone());
        }

        match (self, &mut entity.details) {
            (EntityUpdate::DeviceInfo(u), EntityDetails::Device(d)) => {
                d.device_type = Some(u.device_type);
                d.rf_address = Some(u.rf_address);
                d.slot = Some(u.state);
            }
            (EntityUpdate::DeviceValues(u), EntityDetails::Device(d)) => merge_device_values(d, u),
            (EntityUpdate::DeviceReport(u), EntityDetails::Device(d)) => {
                merge_device_values(d, &u.values);
                d.device_type = Some(u.device_type);
            }
            (EntityUpdate::IveoConfig(u), EntityDetails::Iveo(d)) => {
                d.device_type = Some(u.device_type);
                d.activity = Some(u.activity);
            }
            (EntityUpdate::Group(u), EntityDetails::Group(d)) => d.members = u.members,
            (EntityUpdate::SensorInfo(u), EntityDetails::Sensor(d)) => d.rf_address = Some(u.rf_address),
            (EntityUpdate::SensorValues(u), EntityDetails::Sensor(d)) => {
                d.state = Some(u.state);
                d.readings = Some(u.readings);
            }
            (EntityUpdate::SenderInfo(u), EntityDetails::Sender(d)) => {
                d.rf_address = Some(u.rf_address);
                d.channel = Some(u.channel);
                d.reset_count = Some(u.reset_count);
            }
            (EntityUpdate::SenderReport(u), EntityDetails::Sender(d)) => d.last_event = Some(u.event),
            (EntityUpdate::ControllerConfig(u), EntityDetails::Controller(d)) => d.active = Some(u.active),
            (EntityUpdate::ControllerValues(u), EntityDetails::Controller(d)) => d.readings = Some(u.readings),
            // Kinds were checked above.
            _ => {}
        }
        true
    }
}

fn merge_device_values(d: &mut DeviceDetails, u: &DeviceValues) {
    d.movement = Some(u.movement);
    d.position = Some(u.position);
    d.target = Some(u.target);
    d.flags = u.flags;
    d.day_mode = Some(u.day_mode);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(id: u8, movement: MovementState, flags: i64) -> DeviceValues {
        DeviceValues {
            name: None,
            id,
            movement,
            position: 40,
            target: 40,
            flags: DeviceFlags::from_bits(flags),
            day_mode: DayMode::Day,
        }
    }

    #[test]
    fn test_update_for_other_kind_is_refused() {
        let mut entity = Entity::placeholder(EntityKind::Device, 3);
        let before = entity.clone();
        let group = EntityUpdate::Group(GroupRecord {
            name: Some("Hall".into()),
            id: 3,
            members: IdMask::from_ids([1, 2]).unwrap(),
        });

        assert!(!group.apply_to(&mut entity));
        assert_eq!(entity, before);

        let other_id = EntityUpdate::DeviceValues(values(4, MovementState::UpOn, 0));
        assert!(!other_id.apply_to(&mut entity));
        assert_eq!(entity, before);
    }

    #[test]
    fn test_coarse_state() {
        let mut d = DeviceDetails::default();
        assert_eq!(d.coarse_state(), CoarseState::Unknown);

        merge_device_values(&mut d, &values(1, MovementState::StoppedOff, 0));
        assert_eq!(d.coarse_state(), CoarseState::Idle);

        merge_device_values(&mut d, &values(1, MovementState::DownOn, 0));
        assert_eq!(d.coarse_state(), CoarseState::Moving);

        // Obstructed while stopped.
        merge_device_values(&mut d, &values(1, MovementState::StoppedOff, 0b100));
        assert_eq!(d.coarse_state(), CoarseState::Error);
    }

    #[test]
    fn test_id_ranges() {
        assert_eq!(EntityKind::Group.max_id(), 31);
        assert_eq!(EntityKind::Controller.max_id(), 7);
        assert!(EntityKind::Device.check_id(63).is_ok());
        assert_eq!(
            EntityKind::Sensor.check_id(8),
            Err(EncodingError::IdOutOfRange { id: 8, max: 7 })
        );
    }

    #[test]
    fn test_authoritative_update_clears_placeholder() {
        let mut entity = Entity::placeholder(EntityKind::Device, 4);
        EntityUpdate::DeviceValues(values(4, MovementState::UpOn, 0)).apply_to(&mut entity);
        assert!(entity.placeholder);
        assert_eq!(entity.coarse_state(), Some(CoarseState::Moving));

        EntityUpdate::DeviceInfo(DeviceInfo {
            name: Some("Kitchen".into()),
            id: 4,
            rf_address: 0x1234,
            device_type: DeviceType::Shutter,
            state: DeviceState::Used,
        })
        .apply_to(&mut entity);
        assert!(!entity.placeholder);
        assert_eq!(entity.name.as_deref(), Some("Kitchen"));
        // Values survive an info merge.
        assert_eq!(entity.device().unwrap().movement, Some(MovementState::UpOn));
    }

    #[test]
    fn test_value_update_keeps_name_when_absent() {
        let mut entity = Entity::placeholder(EntityKind::Device, 4);
        entity.name = Some("Kitchen".into());
        EntityUpdate::DeviceValues(values(4, MovementState::StoppedOff, 0)).apply_to(&mut entity);
        assert_eq!(entity.name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EntityKind::Controller).unwrap(), "\"controller\"");
    }
}
