//! Inbound frames and typed response payloads (gateway → host).
//!
//! A method response carries its method name as the first `<string>` of the
//! return array. The codec moves it into [`MethodResponse::method`] so the
//! remaining [`MethodResponse::values`] hold only payload. Payload decoders
//! read values by position within their type class (the n-th int, the n-th
//! string, the n-th blob), which keeps them independent of how the gateway
//! interleaves types.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::commands::{write_values, EventFlags, Method, MethodCall};
use crate::constants::*;
use crate::error::{EncodingError, FaultCode, PayloadError, ProtocolError};
use crate::types::*;
use crate::xml::{self, Element};

// ============================================================================
// Frames
// ============================================================================

/// One complete frame received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A `<methodCall>`; from the gateway this is an event.
    Call(MethodCall),
    /// A successful `<methodResponse>`.
    Response(MethodResponse),
    /// A `<methodResponse>` carrying a `<fault>`.
    Fault(GatewayFault),
}

/// Return values of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResponse {
    /// Method named by the response envelope.
    pub method: Method,
    /// Payload values, without the envelope name.
    pub values: Vec<Value>,
}

/// A gateway-reported failure. Faults name no method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFault {
    pub code: FaultCode,
    pub message: String,
}

impl Frame {
    /// Decode one complete frame.
    pub fn decode(raw: &[u8]) -> Result<Frame, ProtocolError> {
        let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8 { raw: raw.to_vec() })?;
        let malformed = |reason: String| ProtocolError::Malformed {
            reason,
            raw: raw.to_vec(),
        };
        let root = Element::parse(text).map_err(malformed)?;

        match root.name.as_str() {
            TAG_METHOD_CALL => {
                let name = root
                    .child(TAG_METHOD_NAME)
                    .ok_or_else(|| malformed("methodCall without methodName".to_string()))?;
                let method = Method::from_name(&name.text).ok_or_else(|| ProtocolError::UnknownMethod {
                    name: name.text.clone(),
                    raw: raw.to_vec(),
                })?;
                let mut params = match root.child(TAG_ARRAY) {
                    Some(array) => parse_values(array, raw)?,
                    None => Vec::new(),
                };
                // Some firmware repeats the method name as the first string.
                if matches!(params.first(), Some(Value::Str(s)) if s.trim() == method.name()) {
                    params.remove(0);
                }
                Ok(Frame::Call(MethodCall { method, params }))
            }
            TAG_METHOD_RESPONSE => {
                if let Some(fault) = root.child(TAG_FAULT) {
                    let values = match fault.child(TAG_ARRAY) {
                        Some(array) => parse_values(array, raw)?,
                        None => Vec::new(),
                    };
                    let message = values.iter().find_map(Value::as_str).unwrap_or("").to_string();
                    let code = values
                        .iter()
                        .find_map(Value::as_int)
                        .ok_or_else(|| malformed("fault without code".to_string()))?;
                    let code = i32::try_from(code).map_err(|_| malformed(format!("fault code {} out of range", code)))?;
                    return Ok(Frame::Fault(GatewayFault {
                        code: FaultCode::from(code),
                        message,
                    }));
                }

                let array = root
                    .child(TAG_ARRAY)
                    .ok_or_else(|| malformed("methodResponse without array".to_string()))?;
                let mut values = parse_values(array, raw)?;
                let name = match values.first() {
                    Some(Value::Str(name)) => name.clone(),
                    _ => return Err(malformed("methodResponse without method name".to_string())),
                };
                values.remove(0);
                let method = Method::from_name(&name).ok_or_else(|| ProtocolError::UnknownMethod {
                    name,
                    raw: raw.to_vec(),
                })?;
                Ok(Frame::Response(MethodResponse { method, values }))
            }
            other => Err(malformed(format!("unexpected root element <{}>", other))),
        }
    }

    /// Encode a frame as the gateway would send it.
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        match self {
            Frame::Call(call) => call.encode(),
            Frame::Response(response) => response.encode(),
            Frame::Fault(fault) => Ok(fault.encode()),
        }
    }
}

fn parse_values(array: &Element, raw: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    array
        .children
        .iter()
        .map(|element| match element.name.as_str() {
            TAG_INT => element
                .text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ProtocolError::Malformed {
                    reason: format!("invalid int '{}'", element.text),
                    raw: raw.to_vec(),
                }),
            TAG_STRING => Ok(Value::Str(element.text.clone())),
            TAG_BASE64 => {
                let compact: String = element.text.split_whitespace().collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map(Value::Base64)
                    .map_err(|e| ProtocolError::Malformed {
                        reason: format!("invalid base64: {}", e),
                        raw: raw.to_vec(),
                    })
            }
            other => Err(ProtocolError::UnsupportedValueType {
                tag: other.to_string(),
                raw: raw.to_vec(),
            }),
        })
        .collect()
}

impl MethodResponse {
    pub fn new(method: Method, values: Vec<Value>) -> Self {
        MethodResponse { method, values }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        self.values.iter().try_for_each(Value::validate)?;
        let mut out = String::from("<methodResponse><array>");
        xml::write_text_element(&mut out, TAG_STRING, self.method.name());
        write_values(&mut out, &self.values);
        out.push_str("</array></methodResponse>");
        Ok(out.into_bytes())
    }

    /// Typed view of the payload.
    pub fn decode<T: Payload>(&self) -> Result<T, PayloadError> {
        decode_payload(self.method, &self.values)
    }

    /// Positional reader over the payload.
    pub fn returns(&self) -> Returns<'_> {
        Returns::new(self.method, &self.values)
    }
}

impl GatewayFault {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::from("<methodResponse><fault><array>");
        xml::write_text_element(&mut out, TAG_STRING, &self.message);
        xml::write_text_element(&mut out, TAG_INT, &i32::from(self.code).to_string());
        out.push_str("</array></fault></methodResponse>");
        out.into_bytes()
    }
}

impl std::fmt::Display for GatewayFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

// ============================================================================
// Positional Readers
// ============================================================================

/// Reads return values by position within their type class.
#[derive(Debug, Clone, Copy)]
pub struct Returns<'a> {
    method: &'static str,
    values: &'a [Value],
}

impl<'a> Returns<'a> {
    pub fn new(method: Method, values: &'a [Value]) -> Self {
        Returns {
            method: method.name(),
            values,
        }
    }

    fn missing(&self, kind: &'static str, index: usize) -> PayloadError {
        PayloadError::Missing {
            method: self.method,
            kind,
            index,
        }
    }

    pub fn nth_int(&self, index: usize) -> Result<i64, PayloadError> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                Value::Enum(raw) => Some(raw.ordinal),
                _ => None,
            })
            .nth(index)
            .ok_or_else(|| self.missing(TAG_INT, index))
    }

    pub fn nth_str(&self, index: usize) -> Result<&'a str, PayloadError> {
        self.opt_str(index).ok_or_else(|| self.missing(TAG_STRING, index))
    }

    pub fn opt_str(&self, index: usize) -> Option<&'a str> {
        self.values.iter().filter_map(Value::as_str).nth(index)
    }

    pub fn nth_blob(&self, index: usize) -> Result<&'a [u8], PayloadError> {
        self.values
            .iter()
            .filter_map(Value::as_blob)
            .nth(index)
            .ok_or_else(|| self.missing(TAG_BASE64, index))
    }

    pub fn nth_bool(&self, index: usize) -> Result<bool, PayloadError> {
        Ok(self.nth_int(index)? != 0)
    }

    pub fn nth_mask(&self, index: usize) -> Result<IdMask, PayloadError> {
        Ok(IdMask::from_bytes(self.nth_blob(index)?))
    }

    pub fn nth_id(&self, index: usize) -> Result<u8, PayloadError> {
        let value = self.nth_int(index)?;
        u8::try_from(value).map_err(|_| PayloadError::InvalidEnum {
            enum_name: "id",
            value,
        })
    }

    pub fn nth_enum<T: ProtocolEnum>(&self, index: usize) -> Result<T, PayloadError> {
        let value = self.nth_int(index)?;
        T::from_ordinal(value).ok_or(PayloadError::InvalidEnum {
            enum_name: T::NAME,
            value,
        })
    }

    /// Optional display name; empty strings become `None`.
    pub fn label(&self, index: usize) -> Option<String> {
        self.opt_str(index)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

// ============================================================================
// Typed Payloads
// ============================================================================

/// A typed view over the values of a response or event.
pub trait Payload: Sized {
    /// Methods whose values this type decodes. Empty means any.
    const METHODS: &'static [Method];

    fn from_returns(returns: &Returns<'_>) -> Result<Self, PayloadError>;
}

/// Decode `values` as `T`, checking `method` is one `T` accepts.
pub fn decode_payload<T: Payload>(method: Method, values: &[Value]) -> Result<T, PayloadError> {
    if !T::METHODS.is_empty() && !T::METHODS.contains(&method) {
        return Err(PayloadError::WrongMethod {
            expected: T::METHODS[0].name(),
            actual: method.name(),
        });
    }
    T::from_returns(&Returns::new(method, values))
}

/// Outcome flag returned by setters, deletes and drive commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executed(pub bool);

impl Payload for Executed {
    const METHODS: &'static [Method] = &[];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_bool(0).map(Executed)
    }
}

/// Ids reported by a `getIDs` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdList(pub IdMask);

impl Payload for IdList {
    const METHODS: &'static [Method] = &[
        Method::DeviceGetIds,
        Method::SensorGetIds,
        Method::SenSimGetIds,
        Method::SenderGetIds,
        Method::GroupGetIds,
        Method::IveoGetIds,
    ];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_mask(0).map(IdList)
    }
}

impl Payload for ServiceState {
    const METHODS: &'static [Method] = &[Method::ServiceGetState];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_enum(0)
    }
}

impl Payload for LedMode {
    const METHODS: &'static [Method] = &[Method::ServiceGetLed];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_enum(0)
    }
}

impl Payload for Forwarding {
    const METHODS: &'static [Method] = &[Method::ParamGetForward];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_enum(0)
    }
}

impl Payload for RepeaterState {
    const METHODS: &'static [Method] = &[Method::IveoGetRepeater];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        r.nth_enum(0)
    }
}

impl Payload for EventFlags {
    const METHODS: &'static [Method] = &[Method::ParamGetEvent];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(EventFlags {
            device: r.nth_bool(0)?,
            sensor: r.nth_bool(1)?,
            sender: r.nth_bool(2)?,
            logging: r.nth_bool(3)?,
            duty: r.nth_bool(4)?,
        })
    }
}

/// Gateway serial number and firmware/spec versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayVersion {
    pub serial: String,
    pub firmware: [i64; 3],
    pub build: i64,
    pub spec: [i64; 2],
}

impl GatewayVersion {
    pub fn firmware_string(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.firmware[0], self.firmware[1], self.firmware[2], self.build
        )
    }

    pub fn spec_string(&self) -> String {
        format!("{}.{}", self.spec[0], self.spec[1])
    }
}

impl Payload for GatewayVersion {
    const METHODS: &'static [Method] = &[Method::ServiceGetVersion];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(GatewayVersion {
            serial: r.nth_str(0)?.to_string(),
            firmware: [r.nth_int(0)?, r.nth_int(1)?, r.nth_int(2)?],
            spec: [r.nth_int(3)?, r.nth_int(4)?],
            build: r.nth_int(5)?,
        })
    }
}

/// RF duty cycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyCycle {
    pub mode: DutyMode,
    /// RF traffic in percent of the allowed budget.
    pub traffic: i64,
}

impl Payload for DutyCycle {
    const METHODS: &'static [Method] = &[Method::ParamGetDuty, Method::EventDutyCycle];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(DutyCycle {
            mode: r.nth_enum(0)?,
            traffic: r.nth_int(1)?,
        })
    }
}

/// RF addressing parameters of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfInfo {
    pub net_address: i64,
    pub reset_count: i64,
    pub rf_base_id: i64,
    pub sensor_net_address: i64,
    pub rf_sensor_id: i64,
    pub iveo_reset_count: i64,
    pub rf_iveo_id: i64,
}

impl Payload for RfInfo {
    const METHODS: &'static [Method] = &[Method::ParamGetRf];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(RfInfo {
            net_address: r.nth_int(0)?,
            reset_count: r.nth_int(1)?,
            rf_base_id: r.nth_int(2)?,
            sensor_net_address: r.nth_int(3)?,
            rf_sensor_id: r.nth_int(4)?,
            iveo_reset_count: r.nth_int(5)?,
            rf_iveo_id: r.nth_int(6)?,
        })
    }
}

/// Progress of a device scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub state: ScanState,
    pub new_devices: i64,
    pub found: IdMask,
}

impl Payload for ScanResult {
    const METHODS: &'static [Method] = &[Method::DeviceScanResult];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(ScanResult {
            state: r.nth_enum(0)?,
            new_devices: r.nth_int(1)?,
            found: r.nth_mask(0)?,
        })
    }
}

/// Static configuration of a Commeo actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub id: u8,
    pub rf_address: i64,
    pub device_type: DeviceType,
    pub state: DeviceState,
}

impl Payload for DeviceInfo {
    const METHODS: &'static [Method] = &[Method::DeviceGetInfo];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(DeviceInfo {
            name: r.label(0),
            id: r.nth_id(0)?,
            rf_address: r.nth_int(1)?,
            device_type: r.nth_enum(2)?,
            state: r.nth_enum(3)?,
        })
    }
}

/// Live values of a Commeo actuator. Positions are percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceValues {
    pub name: Option<String>,
    pub id: u8,
    pub movement: MovementState,
    pub position: u8,
    pub target: u8,
    pub flags: DeviceFlags,
    pub day_mode: DayMode,
}

impl Payload for DeviceValues {
    const METHODS: &'static [Method] = &[Method::DeviceGetValues, Method::EventDevice];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(DeviceValues {
            name: r.label(0),
            id: r.nth_id(0)?,
            movement: r.nth_enum(1)?,
            position: value_to_percent(r.nth_int(2)?),
            target: value_to_percent(r.nth_int(3)?),
            flags: DeviceFlags::from_bits(r.nth_int(4)?),
            day_mode: r.nth_enum(5)?,
        })
    }
}

/// Payload of `event.device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub values: DeviceValues,
    pub device_type: DeviceType,
}

impl Payload for DeviceReport {
    const METHODS: &'static [Method] = &[Method::EventDevice];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(DeviceReport {
            values: DeviceValues::from_returns(r)?,
            device_type: r.nth_enum(6)?,
        })
    }
}

/// A stored group. The display name is the group's own string field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: Option<String>,
    pub id: u8,
    pub members: IdMask,
}

impl Payload for GroupRecord {
    const METHODS: &'static [Method] = &[Method::GroupRead];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(GroupRecord {
            name: r.label(0),
            id: r.nth_id(0)?,
            members: r.nth_mask(0)?,
        })
    }
}

/// Digital and analog weather readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub wind: WindDigital,
    pub rain: RainDigital,
    pub temperature: TempDigital,
    pub light: LightDigital,
    pub temperature_analog: i64,
    pub wind_analog: i64,
    pub sun1_analog: i64,
    pub day_light_analog: i64,
    pub sun2_analog: i64,
    pub sun3_analog: i64,
}

impl SensorReadings {
    /// Read digital values from ints 1..=4 and analog values starting at
    /// `analog_start`.
    fn read(r: &Returns<'_>, analog_start: usize) -> Result<Self, PayloadError> {
        Ok(SensorReadings {
            wind: r.nth_enum(1)?,
            rain: r.nth_enum(2)?,
            temperature: r.nth_enum(3)?,
            light: r.nth_enum(4)?,
            temperature_analog: r.nth_int(analog_start)?,
            wind_analog: r.nth_int(analog_start + 1)?,
            sun1_analog: r.nth_int(analog_start + 2)?,
            day_light_analog: r.nth_int(analog_start + 3)?,
            sun2_analog: r.nth_int(analog_start + 4)?,
            sun3_analog: r.nth_int(analog_start + 5)?,
        })
    }
}

/// Values of a weather sensor, from `sensor.getValues` or `event.sensor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorValues {
    pub id: u8,
    pub state: SensorState,
    pub readings: SensorReadings,
}

impl Payload for SensorValues {
    const METHODS: &'static [Method] = &[Method::SensorGetValues, Method::EventSensor];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SensorValues {
            id: r.nth_id(0)?,
            state: r.nth_enum(5)?,
            readings: SensorReadings::read(r, 6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub name: Option<String>,
    pub id: u8,
    pub rf_address: i64,
}

impl Payload for SensorInfo {
    const METHODS: &'static [Method] = &[Method::SensorGetInfo];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SensorInfo {
            name: r.label(0),
            id: r.nth_id(0)?,
            rf_address: r.nth_int(1)?,
        })
    }
}

/// Progress of sensor teaching. `found_id` is -1 until a sensor answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTeachResult {
    pub state: TeachState,
    pub time_left: i64,
    pub found_id: i64,
}

impl Payload for SensorTeachResult {
    const METHODS: &'static [Method] = &[Method::SensorTeachResult];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SensorTeachResult {
            state: r.nth_enum(0)?,
            time_left: r.nth_int(1)?,
            found_id: r.nth_int(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenSimConfig {
    pub name: Option<String>,
    pub id: u8,
    pub active: bool,
}

impl Payload for SenSimConfig {
    const METHODS: &'static [Method] = &[Method::SenSimGetConfig];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenSimConfig {
            name: r.label(0),
            id: r.nth_id(0)?,
            active: r.nth_bool(1)?,
        })
    }
}

/// Simulated readings currently held by a sensor simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenSimValues {
    pub id: u8,
    pub readings: SensorReadings,
}

impl Payload for SenSimValues {
    const METHODS: &'static [Method] = &[Method::SenSimGetValues];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenSimValues {
            id: r.nth_id(0)?,
            readings: SensorReadings::read(r, 5)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenSimTest {
    pub id: u8,
    pub test_mode: bool,
}

impl Payload for SenSimTest {
    const METHODS: &'static [Method] = &[Method::SenSimGetTest];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenSimTest {
            id: r.nth_id(0)?,
            test_mode: r.nth_bool(1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub name: Option<String>,
    pub id: u8,
    pub rf_address: i64,
    pub channel: i64,
    pub reset_count: i64,
}

impl Payload for SenderInfo {
    const METHODS: &'static [Method] = &[Method::SenderGetInfo];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenderInfo {
            name: r.label(0),
            id: r.nth_id(0)?,
            rf_address: r.nth_int(1)?,
            channel: r.nth_int(2)?,
            reset_count: r.nth_int(3)?,
        })
    }
}

/// Last key event of a sender, from `sender.getValues` or `event.sender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderReport {
    pub name: Option<String>,
    pub id: u8,
    pub event: SenderEvent,
}

impl Payload for SenderReport {
    const METHODS: &'static [Method] = &[Method::SenderGetValues, Method::EventSender];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenderReport {
            name: r.label(0),
            id: r.nth_id(0)?,
            event: r.nth_enum(1)?,
        })
    }
}

/// Progress of sender teaching. `sender_id` is -1 until a sender answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderTeachResult {
    pub name: Option<String>,
    pub state: TeachState,
    pub time_left: i64,
    pub sender_id: i64,
    pub event: SenderEvent,
}

impl Payload for SenderTeachResult {
    const METHODS: &'static [Method] = &[Method::SenderTeachResult];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(SenderTeachResult {
            name: r.label(0),
            state: r.nth_enum(0)?,
            time_left: r.nth_int(1)?,
            sender_id: r.nth_int(2)?,
            event: r.nth_enum(3)?,
        })
    }
}

/// Outcome of a Commeo drive command, reported asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: i64,
    pub command_type: CommandType,
    pub executed: bool,
    pub succeeded: IdMask,
    pub failed: IdMask,
}

impl CommandResult {
    pub fn drive_command(&self) -> Option<DriveCommand> {
        DriveCommand::from_ordinal(self.command)
    }
}

impl Payload for CommandResult {
    const METHODS: &'static [Method] = &[Method::CommandResult];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(CommandResult {
            command: r.nth_int(0)?,
            command_type: r.nth_enum(1)?,
            executed: r.nth_bool(2)?,
            succeeded: r.nth_mask(0)?,
            failed: r.nth_mask(1)?,
        })
    }
}

/// Response to `command.groupMan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupManResult {
    pub executed: bool,
    pub ids: IdMask,
}

impl Payload for GroupManResult {
    const METHODS: &'static [Method] = &[Method::CommandGroupMan];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(GroupManResult {
            executed: r.nth_bool(0)?,
            ids: r.nth_mask(0).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IveoConfig {
    pub name: Option<String>,
    pub id: u8,
    pub activity: i64,
    pub device_type: DeviceType,
}

impl Payload for IveoConfig {
    const METHODS: &'static [Method] = &[Method::IveoGetConfig];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(IveoConfig {
            name: r.label(0),
            id: r.nth_id(0)?,
            activity: r.nth_int(1)?,
            device_type: r.nth_enum(2)?,
        })
    }
}

/// Outcome of an Iveo command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IveoResult {
    pub command: IveoCommand,
    pub state: CommandResultState,
    pub executed: IdMask,
}

impl Payload for IveoResult {
    const METHODS: &'static [Method] = &[Method::IveoCommandResult];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(IveoResult {
            command: r.nth_enum(0)?,
            state: r.nth_enum(1)?,
            executed: r.nth_mask(0)?,
        })
    }
}

/// Payload of `event.log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub code: String,
    pub stamp: String,
    pub value: String,
    pub description: String,
    pub log_type: LogType,
}

impl Payload for LogEntry {
    const METHODS: &'static [Method] = &[Method::EventLog];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(LogEntry {
            code: r.opt_str(0).unwrap_or("").to_string(),
            stamp: r.opt_str(1).unwrap_or("").to_string(),
            value: r.opt_str(2).unwrap_or("").to_string(),
            description: r.opt_str(3).unwrap_or("").to_string(),
            log_type: r.nth_enum(0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub version: Option<String>,
    pub state: Option<String>,
}

impl Payload for FirmwareVersion {
    const METHODS: &'static [Method] = &[Method::FirmwareGetVersion];

    fn from_returns(r: &Returns<'_>) -> Result<Self, PayloadError> {
        Ok(FirmwareVersion {
            version: r.label(0),
            state: r.label(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> MethodResponse {
        match Frame::decode(text.as_bytes()).unwrap() {
            Frame::Response(r) => r,
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_separates_envelope_name() {
        let r = response(
            "<methodResponse><array><string>selve.GW.group.read</string>\
             <string>Living Room</string><int>3</int><base64>BgAAAAAAAAA=</base64>\
             </array></methodResponse>",
        );
        assert_eq!(r.method, Method::GroupRead);
        assert_eq!(r.values.len(), 3);
        let group: GroupRecord = r.decode().unwrap();
        assert_eq!(group.name.as_deref(), Some("Living Room"));
        assert_eq!(group.id, 3);
        assert_eq!(group.members.ids(), vec![1, 2]);
    }

    #[test]
    fn test_group_without_label_has_no_name() {
        let r = response(
            "<methodResponse><array><string>selve.GW.group.read</string>\
             <int>4</int><base64>AAAAAAAAAAA=</base64></array></methodResponse>",
        );
        let group: GroupRecord = r.decode().unwrap();
        assert_eq!(group.name, None);
    }

    #[test]
    fn test_decode_fault() {
        let frame = Frame::decode(
            b"<methodResponse><fault><array><string>ID is not used</string>\
              <int>10</int></array></fault></methodResponse>",
        )
        .unwrap();
        assert_eq!(
            frame,
            Frame::Fault(GatewayFault {
                code: FaultCode::IdNotUsed,
                message: "ID is not used".to_string()
            })
        );
    }

    #[test]
    fn test_decode_event_call() {
        let frame = Frame::decode(
            b"<methodCall><methodName>selve.GW.event.dutyCycle</methodName>\
              <array><int>1</int><int>42</int></array></methodCall>",
        )
        .unwrap();
        let Frame::Call(call) = frame else {
            panic!("expected call");
        };
        assert!(call.method.is_event());
        let duty: DutyCycle = decode_payload(call.method, &call.params).unwrap();
        assert_eq!(duty.mode, DutyMode::Blocked);
        assert_eq!(duty.traffic, 42);
    }

    #[test]
    fn test_event_with_repeated_name_is_stripped() {
        let frame = Frame::decode(
            b"<methodCall><methodName>selve.GW.event.sender</methodName><array>\
              <string>selve.GW.event.sender</string><string>Remote</string><int>2</int><int>3</int>\
              </array></methodCall>",
        )
        .unwrap();
        let Frame::Call(call) = frame else {
            panic!("expected call");
        };
        let report: SenderReport = decode_payload(call.method, &call.params).unwrap();
        assert_eq!(report.name.as_deref(), Some("Remote"));
        assert_eq!(report.id, 2);
        assert_eq!(report.event, SenderEvent::Stop);
    }

    #[test]
    fn test_decode_unknown_method_keeps_raw() {
        let raw = b"<methodResponse><array><string>selve.GW.device.fly</string></array></methodResponse>";
        let err = Frame::decode(raw).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownMethod { ref name, .. } if name == "selve.GW.device.fly"));
        assert_eq!(err.raw(), raw);
    }

    #[test]
    fn test_decode_unsupported_type() {
        let err = Frame::decode(
            b"<methodResponse><array><string>selve.GW.service.ping</string><double>1.0</double></array></methodResponse>",
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedValueType { ref tag, .. } if tag == "double"));
    }

    #[test]
    fn test_device_values_layout() {
        let r = MethodResponse::new(
            Method::DeviceGetValues,
            vec![
                Value::Str("Kitchen".into()),
                Value::Int(5),
                Value::Int(3),
                Value::Int(65535),
                Value::Int(32767),
                Value::Int(0b1),
                Value::Int(3),
            ],
        );
        let v: DeviceValues = r.decode().unwrap();
        assert_eq!(v.id, 5);
        assert_eq!(v.movement, MovementState::DownOn);
        assert_eq!(v.position, 100);
        assert_eq!(v.target, 49);
        assert!(v.flags.unreachable);
        assert_eq!(v.day_mode, DayMode::Day);
    }

    #[test]
    fn test_wrong_method_rejected() {
        let r = MethodResponse::new(Method::DeviceGetInfo, vec![Value::Int(1)]);
        assert!(matches!(r.decode::<GroupRecord>(), Err(PayloadError::WrongMethod { .. })));
    }

    #[test]
    fn test_missing_value_reported() {
        let r = MethodResponse::new(Method::ParamGetDuty, vec![Value::Int(0)]);
        assert_eq!(
            r.decode::<DutyCycle>(),
            Err(PayloadError::Missing {
                method: "selve.GW.param.getDuty",
                kind: "int",
                index: 1
            })
        );
    }

    #[test]
    fn test_version_layout() {
        let r = MethodResponse::new(
            Method::ServiceGetVersion,
            vec![
                Value::Str("12345678".into()),
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Int(2),
                Value::Int(0),
                Value::Int(7),
            ],
        );
        let v: GatewayVersion = r.decode().unwrap();
        assert_eq!(v.serial, "12345678");
        assert_eq!(v.firmware_string(), "1.2.3.7");
        assert_eq!(v.spec_string(), "2.0");
    }

    #[test]
    fn test_response_encode_decode() {
        let original = MethodResponse::new(
            Method::SensorGetIds,
            vec![Value::from(IdMask::from_ids([0, 7]).unwrap())],
        );
        let bytes = original.encode().unwrap();
        assert_eq!(Frame::decode(&bytes).unwrap(), Frame::Response(original));
    }
}
