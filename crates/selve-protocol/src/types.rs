//! Common types used in the protocol.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::EncodingError;

// ============================================================================
// Typed Values
// ============================================================================

/// One typed parameter or return value.
///
/// Enum parameters travel as `<int>` on the wire. A [`Value::Enum`] is a raw
/// ordinal tagged with the members its enum allows; the codec checks it at
/// encode time and it decodes back as [`Value::Int`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `<int>`
    Int(i64),
    /// `<string>`
    Str(String),
    /// `<base64>`, held decoded.
    Base64(Vec<u8>),
    /// Enum ordinal not yet validated.
    Enum(RawEnum),
}

/// An enum ordinal as supplied by a caller, with the ordinals it may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEnum {
    /// Name of the enum type.
    pub enum_name: &'static str,
    /// Ordinal to send.
    pub ordinal: i64,
    /// Ordinals this codec knows for the enum.
    pub members: &'static [i64],
}

impl Value {
    /// Wrap a raw ordinal for enum `T` without checking it.
    pub fn raw_enum<T: ProtocolEnum>(ordinal: i64) -> Self {
        Value::Enum(RawEnum {
            enum_name: T::NAME,
            ordinal,
            members: T::ORDINALS,
        })
    }

    /// Element tag this value is written with.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Enum(_) => TAG_INT,
            Value::Str(_) => TAG_STRING,
            Value::Base64(_) => TAG_BASE64,
        }
    }

    /// Integer content, if this is an int.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Enum(raw) => Some(raw.ordinal),
            _ => None,
        }
    }

    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Blob content, if this is base64.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Base64(b) => Some(b),
            _ => None,
        }
    }

    /// Check the value is representable on the wire.
    pub fn validate(&self) -> Result<(), EncodingError> {
        match self {
            Value::Int(v) => {
                if i32::try_from(*v).is_err() {
                    return Err(EncodingError::IntOutOfRange(*v));
                }
            }
            Value::Enum(raw) => {
                if !raw.members.contains(&raw.ordinal) {
                    return Err(EncodingError::UnknownEnumOrdinal {
                        enum_name: raw.enum_name,
                        value: raw.ordinal,
                    });
                }
            }
            Value::Str(_) | Value::Base64(_) => {}
        }
        Ok(())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<IdMask> for Value {
    fn from(mask: IdMask) -> Self {
        Value::Base64(mask.to_bytes().to_vec())
    }
}

// ============================================================================
// Id Masks
// ============================================================================

/// A set of ids 0..=63 carried as an 8-byte bitmask.
///
/// Id `n` is bit `n % 8` (LSB first) of byte `n / 8`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdMask(pub u64);

impl IdMask {
    /// Empty mask.
    pub const EMPTY: IdMask = IdMask(0);

    /// Mask containing a single id.
    pub fn single(id: u8) -> Result<Self, EncodingError> {
        Self::from_ids([id])
    }

    /// Mask containing every id in `ids`.
    pub fn from_ids<I: IntoIterator<Item = u8>>(ids: I) -> Result<Self, EncodingError> {
        let mut mask = 0u64;
        for id in ids {
            if id > MAX_DEVICE_ID {
                return Err(EncodingError::IdOutOfRange {
                    id,
                    max: MAX_DEVICE_ID,
                });
            }
            mask |= 1u64 << id;
        }
        Ok(IdMask(mask))
    }

    /// Decode from wire bytes. Short input is zero-padded, extra bytes ignored.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; ID_MASK_BYTES];
        let n = bytes.len().min(ID_MASK_BYTES);
        buf[..n].copy_from_slice(&bytes[..n]);
        IdMask(u64::from_le_bytes(buf))
    }

    /// Wire bytes.
    pub fn to_bytes(&self) -> [u8; ID_MASK_BYTES] {
        self.0.to_le_bytes()
    }

    pub fn contains(&self, id: u8) -> bool {
        id <= MAX_DEVICE_ID && self.0 & (1u64 << id) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Ids set in the mask, ascending.
    pub fn ids(&self) -> Vec<u8> {
        (0..=MAX_DEVICE_ID).filter(|id| self.contains(*id)).collect()
    }
}

// ============================================================================
// Value Conversions
// ============================================================================

/// Raw 16-bit position to percent (truncating).
pub fn value_to_percent(raw: i64) -> u8 {
    scale_down(raw, PERCENT_FULL_SCALE) as u8
}

/// Raw 16-bit angle to degrees (truncating).
pub fn value_to_degrees(raw: i64) -> u16 {
    scale_down(raw, DEGREE_FULL_SCALE) as u16
}

/// Percent to raw 16-bit position.
pub fn percent_to_value(percent: u8) -> Result<u16, EncodingError> {
    scale_up(u32::from(percent), PERCENT_FULL_SCALE)
}

/// Degrees to raw 16-bit angle.
pub fn degrees_to_value(degrees: u16) -> Result<u16, EncodingError> {
    scale_up(u32::from(degrees), DEGREE_FULL_SCALE)
}

fn scale_down(raw: i64, scale: u32) -> u32 {
    let raw = raw.clamp(0, i64::from(RAW_FULL_SCALE)) as u32;
    raw * scale / RAW_FULL_SCALE
}

fn scale_up(value: u32, scale: u32) -> Result<u16, EncodingError> {
    if value > scale {
        return Err(EncodingError::ScaleOutOfRange { value, max: scale });
    }
    Ok((RAW_FULL_SCALE * value / scale) as u16)
}

// ============================================================================
// Device Flags
// ============================================================================

/// Status bits reported with Commeo device values, LSB first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFlags {
    pub unreachable: bool,
    pub overload: bool,
    pub obstructed: bool,
    pub alarm: bool,
    pub lost_sensor: bool,
    pub automatic_mode: bool,
    pub gateway_not_learned: bool,
    pub wind_alarm: bool,
    pub rain_alarm: bool,
    pub freezing_alarm: bool,
}

impl DeviceFlags {
    pub fn from_bits(bits: i64) -> Self {
        let bit = |n: u32| bits & (1 << n) != 0;
        DeviceFlags {
            unreachable: bit(0),
            overload: bit(1),
            obstructed: bit(2),
            alarm: bit(3),
            lost_sensor: bit(4),
            automatic_mode: bit(5),
            gateway_not_learned: bit(6),
            wind_alarm: bit(7),
            rain_alarm: bit(8),
            freezing_alarm: bit(9),
        }
    }

    /// True if any fault condition is reported.
    pub fn has_fault(&self) -> bool {
        self.unreachable || self.overload || self.obstructed || self.alarm
    }
}

// ============================================================================
// Protocol Enums
// ============================================================================

/// An enum carried as an `<int>` ordinal.
pub trait ProtocolEnum: Sized + Copy {
    /// Type name used in errors.
    const NAME: &'static str;
    /// Every ordinal this codec knows.
    const ORDINALS: &'static [i64];

    fn ordinal(self) -> i64;
    fn from_ordinal(value: i64) -> Option<Self>;
}

macro_rules! protocol_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl ProtocolEnum for $name {
            const NAME: &'static str = stringify!($name);
            const ORDINALS: &'static [i64] = &[$($value),+];

            fn ordinal(self) -> i64 {
                self as i64
            }

            fn from_ordinal(value: i64) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<$name> for Value {
            fn from(v: $name) -> Self {
                Value::Int(v.ordinal())
            }
        }
    };
}

protocol_enum! {
    /// Actuator type as configured on the gateway.
    DeviceType {
        Unknown = 0,
        Shutter = 1,
        Blind = 2,
        Awning = 3,
        Switch = 4,
        Dimmer = 5,
        NightLight = 6,
        DrawnLight = 7,
        Heating = 8,
        Cooling = 9,
        SwitchDay = 10,
        Gateway = 11,
    }
}

protocol_enum! {
    /// Slot state of a device entry.
    DeviceState {
        Unused = 0,
        Used = 1,
        Temporary = 2,
        Stalled = 3,
    }
}

protocol_enum! {
    /// Actuator motion as reported by values and events.
    MovementState {
        Unknown = 0,
        StoppedOff = 1,
        UpOn = 2,
        DownOn = 3,
    }
}

protocol_enum! {
    /// Drive command for Commeo actuators and groups.
    DriveCommand {
        Stop = 0,
        DriveUp = 1,
        DriveDown = 2,
        DrivePos1 = 3,
        SavePos1 = 4,
        DrivePos2 = 5,
        SavePos2 = 6,
        DrivePos = 7,
        StepUp = 8,
        StepDown = 9,
        AutoOn = 10,
        AutoOff = 11,
    }
}

impl DriveCommand {
    /// Whether repeating the command changes the outcome.
    pub fn is_idempotent(self) -> bool {
        !matches!(
            self,
            DriveCommand::SavePos1 | DriveCommand::SavePos2 | DriveCommand::StepUp | DriveCommand::StepDown
        )
    }
}

protocol_enum! {
    /// Priority class of a drive command.
    CommandType {
        Forced = 0,
        Manual = 1,
        Time = 2,
        Glass = 3,
    }
}

protocol_enum! {
    /// Drive command for one-way Iveo actuators.
    IveoCommand {
        Stop = 0,
        Up = 1,
        Down = 2,
        Pos1 = 3,
        Pos2 = 5,
        LearnTelegramSent = 254,
        TeachTelegramSent = 255,
    }
}

protocol_enum! {
    /// Drive command for sensor simulations.
    SenSimCommand {
        Stop = 0,
        DriveUp = 1,
        DriveDown = 2,
        Position1 = 3,
        Position2 = 4,
    }
}

protocol_enum! {
    ScanState {
        Idle = 0,
        Run = 1,
        Verify = 2,
        EndSuccess = 3,
        EndFailed = 4,
    }
}

protocol_enum! {
    TeachState {
        Idle = 0,
        Run = 1,
        EndSuccess = 2,
    }
}

protocol_enum! {
    CommandResultState {
        Idle = 0,
        Send = 1,
    }
}

protocol_enum! {
    /// Gateway operating state.
    ServiceState {
        Bootloader = 0,
        Update = 1,
        Startup = 2,
        Ready = 3,
    }
}

protocol_enum! {
    SensorState {
        Invalid = 0,
        Available = 1,
        LowBattery = 2,
        CommunicationLoss = 3,
        TestMode = 4,
        ServiceMode = 5,
    }
}

protocol_enum! {
    RepeaterState {
        None = 0,
        SingleRepeat = 1,
        MultiRepeat = 2,
    }
}

protocol_enum! {
    LedMode {
        Off = 0,
        On = 1,
    }
}

protocol_enum! {
    Forwarding {
        Off = 0,
        On = 1,
    }
}

protocol_enum! {
    /// Whether the RF duty cycle currently blocks sending.
    DutyMode {
        NotBlocked = 0,
        Blocked = 1,
    }
}

protocol_enum! {
    DayMode {
        Unknown = 0,
        Night = 1,
        Dawning = 2,
        Day = 3,
        Dusk = 4,
    }
}

protocol_enum! {
    /// Configuration functions triggered on an actuator.
    DeviceFunction {
        Select = 0,
        Install = 1,
        Sensor = 2,
        ManProg = 3,
        AutoProg = 4,
        StorePosition = 5,
        DriveUp = 6,
        DriveDown = 7,
        KeyRelease = 8,
        DriveStop = 9,
    }
}

protocol_enum! {
    /// Severity of a gateway log event.
    LogType {
        Info = 0,
        Warning = 1,
        Error = 2,
    }
}

protocol_enum! {
    WindDigital {
        None = 0,
        NoAlarm = 1,
        Alarm = 2,
    }
}

protocol_enum! {
    RainDigital {
        None = 0,
        NoAlarm = 1,
        Alarm = 2,
    }
}

protocol_enum! {
    TempDigital {
        None = 0,
        Normal = 1,
        Freezing = 2,
        Heat = 3,
    }
}

protocol_enum! {
    LightDigital {
        None = 0,
        Dark = 1,
        Dawn = 2,
        Normal = 3,
        Light = 4,
    }
}

protocol_enum! {
    /// Key event reported by a sender (remote transmitter).
    SenderEvent {
        Unknown = 0,
        DriveUp = 1,
        DriveDown = 2,
        Stop = 3,
        Pos1 = 4,
        Pos2 = 5,
        SavePos1 = 6,
        SavePos2 = 7,
        Auto = 8,
        Man = 9,
        Name = 10,
        KeyRelease = 11,
        Select = 12,
        Delete = 13,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_mask_bit_layout() {
        let mask = IdMask::from_ids([0, 9, 63]).unwrap();
        let bytes = mask.to_bytes();
        assert_eq!(bytes[0], 0b0000_0001);
        assert_eq!(bytes[1], 0b0000_0010);
        assert_eq!(bytes[7], 0b1000_0000);
        assert_eq!(IdMask::from_bytes(&bytes).ids(), vec![0, 9, 63]);
    }

    #[test]
    fn test_id_mask_rejects_out_of_range() {
        assert_eq!(
            IdMask::single(64),
            Err(EncodingError::IdOutOfRange { id: 64, max: 63 })
        );
    }

    #[test]
    fn test_id_mask_short_input_padded() {
        let mask = IdMask::from_bytes(&[0x05]);
        assert_eq!(mask.ids(), vec![0, 2]);
        assert_eq!(mask.len(), 2);
    }

    #[test]
    fn test_percent_conversion() {
        assert_eq!(percent_to_value(0).unwrap(), 0);
        assert_eq!(percent_to_value(50).unwrap(), 32767);
        assert_eq!(percent_to_value(100).unwrap(), 65535);
        assert_eq!(value_to_percent(65535), 100);
        assert_eq!(value_to_percent(32767), 49);
        assert!(percent_to_value(101).is_err());
    }

    #[test]
    fn test_degree_conversion() {
        assert_eq!(degrees_to_value(360).unwrap(), 65535);
        assert_eq!(value_to_degrees(65535), 360);
        assert!(degrees_to_value(361).is_err());
    }

    #[test]
    fn test_device_flags_lsb_first() {
        let flags = DeviceFlags::from_bits(0b10_0000_0101);
        assert!(flags.unreachable);
        assert!(!flags.overload);
        assert!(flags.obstructed);
        assert!(flags.freezing_alarm);
        assert!(!flags.wind_alarm);
        assert!(flags.has_fault());
        assert!(!DeviceFlags::from_bits(0b10_0000).has_fault());
    }

    #[test]
    fn test_enum_ordinals() {
        assert_eq!(IveoCommand::from_ordinal(5), Some(IveoCommand::Pos2));
        assert_eq!(IveoCommand::from_ordinal(4), None);
        assert_eq!(IveoCommand::TeachTelegramSent.ordinal(), 255);
        assert_eq!(DeviceType::NAME, "DeviceType");
    }

    #[test]
    fn test_raw_enum_validation() {
        assert!(Value::raw_enum::<DriveCommand>(7).validate().is_ok());
        assert_eq!(
            Value::raw_enum::<DriveCommand>(12).validate(),
            Err(EncodingError::UnknownEnumOrdinal {
                enum_name: "DriveCommand",
                value: 12
            })
        );
        assert_eq!(
            Value::Int(i64::from(i32::MAX) + 1).validate(),
            Err(EncodingError::IntOutOfRange(i64::from(i32::MAX) + 1))
        );
    }
}
