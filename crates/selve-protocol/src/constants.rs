//! Protocol constants
//!
//! These constants define the envelope tags, method namespace, fault codes
//! and value scales used by the Selve gateway XML-RPC dialect.

// ============================================================================
// Envelope
// ============================================================================

/// Prefix shared by every gateway method name.
pub const METHOD_PREFIX: &str = "selve.GW.";
/// Namespace of unsolicited event calls sent by the gateway.
pub const EVENT_NAMESPACE: &str = "selve.GW.event.";

/// Opening tag of a method call frame (host → gateway, and gateway events).
pub const TAG_METHOD_CALL: &str = "methodCall";
/// Opening tag of a method response frame (gateway → host).
pub const TAG_METHOD_RESPONSE: &str = "methodResponse";
/// Method name element inside a call.
pub const TAG_METHOD_NAME: &str = "methodName";
/// Parameter/return value container.
pub const TAG_ARRAY: &str = "array";
/// Fault container inside a response.
pub const TAG_FAULT: &str = "fault";
/// Integer value element.
pub const TAG_INT: &str = "int";
/// String value element.
pub const TAG_STRING: &str = "string";
/// Base64 blob value element.
pub const TAG_BASE64: &str = "base64";

/// Maximum size of a single frame, including its envelope.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Line speed of the USB stick (8N1).
pub const BAUD_RATE: u32 = 115_200;

// ============================================================================
// Fault Codes (gateway → host)
// ============================================================================

pub const FAULT_UNKNOWN_ERROR: i32 = 1;
pub const FAULT_METHOD_NOT_SUPPORTED: i32 = 2;
pub const FAULT_METHOD_NOT_REACHABLE: i32 = 3;
pub const FAULT_PARAMETER_COUNT: i32 = 4;
pub const FAULT_PARAMETER_ORDER: i32 = 5;
pub const FAULT_EXECUTION_FAILED: i32 = 6;
pub const FAULT_PARAMETER_OUT_OF_RANGE: i32 = 7;
pub const FAULT_SYNTAX_ERROR: i32 = 8;
pub const FAULT_METHOD_TOO_LONG: i32 = 9;
pub const FAULT_ID_NOT_USED: i32 = 10;
pub const FAULT_ID_EXISTS: i32 = 11;
pub const FAULT_ADDRESS_IN_USE: i32 = 12;
pub const FAULT_NO_MEMBER: i32 = 13;
pub const FAULT_DUTY_CYCLE_REACHED: i32 = 14;
pub const FAULT_BOOTLOADER_NOT_SUPPORTED: i32 = 40;
pub const FAULT_BOOTLOADER_WRONG_FILE: i32 = 41;
pub const FAULT_BOOTLOADER_CHECKSUM: i32 = 42;
pub const FAULT_BOOTLOADER_SYNTAX: i32 = 43;

// ============================================================================
// Value Scales
// ============================================================================

/// Full-scale raw value for positions and angles.
pub const RAW_FULL_SCALE: u32 = 65535;
/// Percent scale.
pub const PERCENT_FULL_SCALE: u32 = 100;
/// Degree scale used by step commands.
pub const DEGREE_FULL_SCALE: u32 = 360;

// ============================================================================
// Id Ranges
// ============================================================================

/// Number of bytes in an id bitmask.
pub const ID_MASK_BYTES: usize = 8;
/// Highest valid id for Commeo and Iveo actuators.
pub const MAX_DEVICE_ID: u8 = 63;
/// Highest valid group id.
pub const MAX_GROUP_ID: u8 = 31;
/// Highest valid sender id.
pub const MAX_SENDER_ID: u8 = 63;
/// Highest valid sensor id.
pub const MAX_SENSOR_ID: u8 = 7;
/// Highest valid sensor simulation id.
pub const MAX_SENSIM_ID: u8 = 7;
