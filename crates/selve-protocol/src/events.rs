//! Unsolicited gateway notifications.
//!
//! The gateway pushes `selve.GW.event.*` calls on its own. Result-style
//! responses (`command.result`, `iveo.commandResult`, scan and teach results)
//! can also arrive without a matching request; they are classified here too.

use crate::commands::Method;
use crate::error::PayloadError;
use crate::responses::*;
use crate::types::Value;

/// A decoded unsolicited notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Device(DeviceReport),
    Sensor(SensorValues),
    Sender(SenderReport),
    Log(LogEntry),
    DutyCycle(DutyCycle),
    CommandResult(CommandResult),
    IveoResult(IveoResult),
    ScanResult(ScanResult),
    SensorTeach(SensorTeachResult),
    SenderTeach(SenderTeachResult),
}

impl GatewayEvent {
    /// Whether frames for `method` may be treated as events.
    pub fn accepts(method: Method) -> bool {
        method.is_event()
            || matches!(
                method,
                Method::CommandResult
                    | Method::IveoCommandResult
                    | Method::DeviceScanResult
                    | Method::SensorTeachResult
                    | Method::SenderTeachResult
            )
    }

    /// Decode values of `method` as an event. Returns `Ok(None)` for methods
    /// that never carry events.
    pub fn decode(method: Method, values: &[Value]) -> Result<Option<Self>, PayloadError> {
        let event = match method {
            Method::EventDevice => GatewayEvent::Device(decode_payload(method, values)?),
            Method::EventSensor => GatewayEvent::Sensor(decode_payload(method, values)?),
            Method::EventSender => GatewayEvent::Sender(decode_payload(method, values)?),
            Method::EventLog => GatewayEvent::Log(decode_payload(method, values)?),
            Method::EventDutyCycle => GatewayEvent::DutyCycle(decode_payload(method, values)?),
            Method::CommandResult => GatewayEvent::CommandResult(decode_payload(method, values)?),
            Method::IveoCommandResult => GatewayEvent::IveoResult(decode_payload(method, values)?),
            Method::DeviceScanResult => GatewayEvent::ScanResult(decode_payload(method, values)?),
            Method::SensorTeachResult => GatewayEvent::SensorTeach(decode_payload(method, values)?),
            Method::SenderTeachResult => GatewayEvent::SenderTeach(decode_payload(method, values)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::Device(_) => "device",
            GatewayEvent::Sensor(_) => "sensor",
            GatewayEvent::Sender(_) => "sender",
            GatewayEvent::Log(_) => "log",
            GatewayEvent::DutyCycle(_) => "duty_cycle",
            GatewayEvent::CommandResult(_) => "command_result",
            GatewayEvent::IveoResult(_) => "iveo_result",
            GatewayEvent::ScanResult(_) => "scan_result",
            GatewayEvent::SensorTeach(_) => "sensor_teach",
            GatewayEvent::SenderTeach(_) => "sender_teach",
        }
    }
}
