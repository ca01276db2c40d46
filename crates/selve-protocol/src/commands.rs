//! Method catalog and method-call builders (host → gateway).

use crate::constants::*;
use crate::error::EncodingError;
use crate::types::*;
use crate::xml;

// ============================================================================
// Method Catalog
// ============================================================================

/// Method namespace, the segment after `selve.GW.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Service,
    Param,
    Device,
    Sensor,
    SenSim,
    Sender,
    Group,
    Command,
    Iveo,
    Firmware,
    Event,
}

macro_rules! method_catalog {
    ($($variant:ident => $ns:ident, $name:literal, $idempotent:literal;)+) => {
        /// Every method the gateway understands.
        ///
        /// The idempotency flag tells an external retry layer whether a call
        /// may be repeated blindly. Drive commands refine it per call, see
        /// [`MethodCall::is_idempotent`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Method {
            $($variant),+
        }

        impl Method {
            /// All catalog entries.
            pub const ALL: &'static [Method] = &[$(Method::$variant),+];

            /// Full wire name, e.g. `selve.GW.group.read`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Method::$variant => concat!("selve.GW.", $name)),+
                }
            }

            pub fn namespace(self) -> Namespace {
                match self {
                    $(Method::$variant => Namespace::$ns),+
                }
            }

            /// Whether repeating the call is harmless.
            pub fn is_idempotent(self) -> bool {
                match self {
                    $(Method::$variant => $idempotent),+
                }
            }
        }
    };
}

method_catalog! {
    ServicePing => Service, "service.ping", true;
    ServiceGetState => Service, "service.getState", true;
    ServiceGetVersion => Service, "service.getVersion", true;
    ServiceReset => Service, "service.reset", false;
    ServiceFactoryReset => Service, "service.factoryReset", false;
    ServiceSetLed => Service, "service.setLED", true;
    ServiceGetLed => Service, "service.getLED", true;

    ParamSetForward => Param, "param.setForward", true;
    ParamGetForward => Param, "param.getForward", true;
    ParamSetEvent => Param, "param.setEvent", true;
    ParamGetEvent => Param, "param.getEvent", true;
    ParamGetDuty => Param, "param.getDuty", true;
    ParamGetRf => Param, "param.getRF", true;

    DeviceScanStart => Device, "device.scanStart", false;
    DeviceScanStop => Device, "device.scanStop", true;
    DeviceScanResult => Device, "device.scanResult", true;
    DeviceSave => Device, "device.save", false;
    DeviceGetIds => Device, "device.getIDs", true;
    DeviceGetInfo => Device, "device.getInfo", true;
    DeviceGetValues => Device, "device.getValues", true;
    DeviceSetFunction => Device, "device.setFunction", false;
    DeviceSetLabel => Device, "device.setLabel", true;
    DeviceSetType => Device, "device.setType", true;
    DeviceDelete => Device, "device.delete", false;
    DeviceWriteManual => Device, "device.writeManual", false;

    SensorTeachStart => Sensor, "sensor.teachStart", false;
    SensorTeachStop => Sensor, "sensor.teachStop", true;
    SensorTeachResult => Sensor, "sensor.teachResult", true;
    SensorGetIds => Sensor, "sensor.getIDs", true;
    SensorGetInfo => Sensor, "sensor.getInfo", true;
    SensorGetValues => Sensor, "sensor.getValues", true;
    SensorSetLabel => Sensor, "sensor.setLabel", true;
    SensorDelete => Sensor, "sensor.delete", false;
    SensorWriteManual => Sensor, "sensor.writeManual", false;

    SenSimStore => SenSim, "senSim.store", false;
    SenSimDelete => SenSim, "senSim.delete", false;
    SenSimGetConfig => SenSim, "senSim.getConfig", true;
    SenSimSetConfig => SenSim, "senSim.setConfig", true;
    SenSimSetLabel => SenSim, "senSim.setLabel", true;
    SenSimSetValues => SenSim, "senSim.setValues", true;
    SenSimGetValues => SenSim, "senSim.getValues", true;
    SenSimGetIds => SenSim, "senSim.getIDs", true;
    SenSimFactory => SenSim, "senSim.factory", false;
    SenSimDrive => SenSim, "senSim.drive", true;
    SenSimSetTest => SenSim, "senSim.setTest", true;
    SenSimGetTest => SenSim, "senSim.getTest", true;

    SenderTeachStart => Sender, "sender.teachStart", false;
    SenderTeachStop => Sender, "sender.teachStop", true;
    SenderTeachResult => Sender, "sender.teachResult", true;
    SenderGetIds => Sender, "sender.getIDs", true;
    SenderGetInfo => Sender, "sender.getInfo", true;
    SenderGetValues => Sender, "sender.getValues", true;
    SenderSetLabel => Sender, "sender.setLabel", true;
    SenderDelete => Sender, "sender.delete", false;
    SenderWriteManual => Sender, "sender.writeManual", false;

    GroupRead => Group, "group.read", true;
    GroupWrite => Group, "group.write", false;
    GroupGetIds => Group, "group.getIDs", true;
    GroupDelete => Group, "group.delete", false;

    CommandDevice => Command, "command.device", true;
    CommandGroup => Command, "command.group", true;
    CommandGroupMan => Command, "command.groupMan", true;
    CommandResult => Command, "command.result", true;

    IveoFactory => Iveo, "iveo.factory", false;
    IveoSetConfig => Iveo, "iveo.setConfig", true;
    IveoGetConfig => Iveo, "iveo.getConfig", true;
    IveoGetIds => Iveo, "iveo.getIDs", true;
    IveoSetRepeater => Iveo, "iveo.setRepeater", true;
    IveoGetRepeater => Iveo, "iveo.getRepeater", true;
    IveoSetLabel => Iveo, "iveo.setLabel", true;
    IveoCommandTeach => Iveo, "iveo.commandTeach", false;
    IveoCommandLearn => Iveo, "iveo.commandLearn", false;
    IveoCommandManual => Iveo, "iveo.commandManual", true;
    IveoCommandAutomatic => Iveo, "iveo.commandAutomatic", true;
    IveoCommandResult => Iveo, "iveo.commandResult", true;

    FirmwareGetVersion => Firmware, "firmware.getVersion", true;
    FirmwareUpdate => Firmware, "firmware.update", false;

    EventDevice => Event, "event.device", true;
    EventSensor => Event, "event.sensor", true;
    EventSender => Event, "event.sender", true;
    EventLog => Event, "event.log", true;
    EventDutyCycle => Event, "event.dutyCycle", true;
}

impl Method {
    /// Look up a method by its full wire name.
    pub fn from_name(name: &str) -> Option<Method> {
        let name = name.trim();
        if !name.starts_with(METHOD_PREFIX) {
            return None;
        }
        Method::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Whether this is an unsolicited event sent by the gateway.
    pub fn is_event(self) -> bool {
        self.namespace() == Namespace::Event
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Method Calls
// ============================================================================

/// A named remote operation and its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: Method,
    pub params: Vec<Value>,
}

/// Which gateway events should be forwarded to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventFlags {
    pub device: bool,
    pub sensor: bool,
    pub sender: bool,
    pub logging: bool,
    pub duty: bool,
}

impl EventFlags {
    pub const ALL: EventFlags = EventFlags {
        device: true,
        sensor: true,
        sender: true,
        logging: true,
        duty: true,
    };
    pub const NONE: EventFlags = EventFlags {
        device: false,
        sensor: false,
        sender: false,
        logging: false,
        duty: false,
    };
}

/// Simulated weather readings written to a sensor simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedReadings {
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

impl MethodCall {
    /// A call with no parameters.
    pub fn new(method: Method) -> Self {
        MethodCall {
            method,
            params: Vec::new(),
        }
    }

    /// Append a parameter.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Whether repeating this call is harmless. Drive commands depend on the
    /// drive code they carry.
    pub fn is_idempotent(&self) -> bool {
        let drive_index = match self.method {
            Method::CommandDevice | Method::CommandGroup => 1,
            Method::CommandGroupMan => 0,
            other => return other.is_idempotent(),
        };
        self.params
            .get(drive_index)
            .and_then(Value::as_int)
            .and_then(DriveCommand::from_ordinal)
            .map(DriveCommand::is_idempotent)
            .unwrap_or(false)
    }

    /// Check every parameter is representable.
    pub fn validate(&self) -> Result<(), EncodingError> {
        self.params.iter().try_for_each(Value::validate)
    }

    /// Serialize to a wire frame. Fails before producing any bytes if a
    /// parameter cannot be represented.
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        self.validate()?;
        let mut out = String::with_capacity(64 + self.params.len() * 24);
        out.push_str("<methodCall>");
        xml::write_text_element(&mut out, TAG_METHOD_NAME, self.method.name());
        if !self.params.is_empty() {
            out.push_str("<array>");
            write_values(&mut out, &self.params);
            out.push_str("</array>");
        }
        out.push_str("</methodCall>");
        Ok(out.into_bytes())
    }

    // ------------------------------------------------------------------------
    // service
    // ------------------------------------------------------------------------

    pub fn ping() -> Self {
        Self::new(Method::ServicePing)
    }

    pub fn get_state() -> Self {
        Self::new(Method::ServiceGetState)
    }

    pub fn get_version() -> Self {
        Self::new(Method::ServiceGetVersion)
    }

    pub fn reset() -> Self {
        Self::new(Method::ServiceReset)
    }

    pub fn factory_reset() -> Self {
        Self::new(Method::ServiceFactoryReset)
    }

    pub fn set_led(on: bool) -> Self {
        Self::new(Method::ServiceSetLed).arg(on)
    }

    pub fn get_led() -> Self {
        Self::new(Method::ServiceGetLed)
    }

    // ------------------------------------------------------------------------
    // param
    // ------------------------------------------------------------------------

    pub fn set_forward(on: bool) -> Self {
        Self::new(Method::ParamSetForward).arg(on)
    }

    pub fn get_forward() -> Self {
        Self::new(Method::ParamGetForward)
    }

    pub fn set_event(flags: EventFlags) -> Self {
        Self::new(Method::ParamSetEvent)
            .arg(flags.device)
            .arg(flags.sensor)
            .arg(flags.sender)
            .arg(flags.logging)
            .arg(flags.duty)
    }

    pub fn get_event() -> Self {
        Self::new(Method::ParamGetEvent)
    }

    pub fn get_duty() -> Self {
        Self::new(Method::ParamGetDuty)
    }

    pub fn get_rf() -> Self {
        Self::new(Method::ParamGetRf)
    }

    // ------------------------------------------------------------------------
    // device
    // ------------------------------------------------------------------------

    pub fn device_scan_start() -> Self {
        Self::new(Method::DeviceScanStart)
    }

    pub fn device_scan_stop() -> Self {
        Self::new(Method::DeviceScanStop)
    }

    pub fn device_scan_result() -> Self {
        Self::new(Method::DeviceScanResult)
    }

    pub fn device_save(id: u8) -> Self {
        Self::new(Method::DeviceSave).arg(id)
    }

    pub fn device_get_ids() -> Self {
        Self::new(Method::DeviceGetIds)
    }

    pub fn device_get_info(id: u8) -> Self {
        Self::new(Method::DeviceGetInfo).arg(id)
    }

    pub fn device_get_values(id: u8) -> Self {
        Self::new(Method::DeviceGetValues).arg(id)
    }

    pub fn device_set_function(id: u8, function: DeviceFunction) -> Self {
        Self::new(Method::DeviceSetFunction).arg(id).arg(function)
    }

    pub fn device_set_label(id: u8, label: &str) -> Self {
        Self::new(Method::DeviceSetLabel).arg(id).arg(label)
    }

    pub fn device_set_type(id: u8, device_type: DeviceType) -> Self {
        Self::new(Method::DeviceSetType).arg(id).arg(device_type)
    }

    pub fn device_delete(id: u8) -> Self {
        Self::new(Method::DeviceDelete).arg(id)
    }

    pub fn device_write_manual(id: u8, address: i64, name: &str, device_type: DeviceType) -> Self {
        Self::new(Method::DeviceWriteManual)
            .arg(id)
            .arg(address)
            .arg(name)
            .arg(device_type)
    }

    // ------------------------------------------------------------------------
    // sensor
    // ------------------------------------------------------------------------

    pub fn sensor_teach_start() -> Self {
        Self::new(Method::SensorTeachStart)
    }

    pub fn sensor_teach_stop() -> Self {
        Self::new(Method::SensorTeachStop)
    }

    pub fn sensor_teach_result() -> Self {
        Self::new(Method::SensorTeachResult)
    }

    pub fn sensor_get_ids() -> Self {
        Self::new(Method::SensorGetIds)
    }

    pub fn sensor_get_info(id: u8) -> Self {
        Self::new(Method::SensorGetInfo).arg(id)
    }

    pub fn sensor_get_values(id: u8) -> Self {
        Self::new(Method::SensorGetValues).arg(id)
    }

    pub fn sensor_set_label(id: u8, label: &str) -> Self {
        Self::new(Method::SensorSetLabel).arg(id).arg(label)
    }

    pub fn sensor_delete(id: u8) -> Self {
        Self::new(Method::SensorDelete).arg(id)
    }

    pub fn sensor_write_manual(id: u8, address: i64, name: &str) -> Self {
        Self::new(Method::SensorWriteManual)
            .arg(id)
            .arg(address)
            .arg(name)
    }

    // ------------------------------------------------------------------------
    // senSim
    // ------------------------------------------------------------------------

    /// Link actuator `actor_id` to sensor simulation `id`.
    pub fn sensim_store(id: u8, actor_id: u8) -> Self {
        Self::new(Method::SenSimStore).arg(id).arg(actor_id)
    }

    pub fn sensim_delete(id: u8, actor_id: u8) -> Self {
        Self::new(Method::SenSimDelete).arg(id).arg(actor_id)
    }

    pub fn sensim_get_config(id: u8) -> Self {
        Self::new(Method::SenSimGetConfig).arg(id)
    }

    pub fn sensim_set_config(id: u8, active: bool) -> Self {
        Self::new(Method::SenSimSetConfig).arg(id).arg(active)
    }

    pub fn sensim_set_label(id: u8, label: &str) -> Self {
        Self::new(Method::SenSimSetLabel).arg(id).arg(label)
    }

    pub fn sensim_set_values(id: u8, readings: &SimulatedReadings) -> Self {
        Self::new(Method::SenSimSetValues)
            .arg(id)
            .arg(readings.wind)
            .arg(readings.rain)
            .arg(readings.temperature)
            .arg(readings.light)
            .arg(readings.temperature_analog)
            .arg(readings.wind_analog)
            .arg(readings.sun1_analog)
            .arg(readings.day_light_analog)
            .arg(readings.sun2_analog)
            .arg(readings.sun3_analog)
    }

    pub fn sensim_get_values(id: u8) -> Self {
        Self::new(Method::SenSimGetValues).arg(id)
    }

    pub fn sensim_get_ids() -> Self {
        Self::new(Method::SenSimGetIds)
    }

    pub fn sensim_factory(id: u8) -> Self {
        Self::new(Method::SenSimFactory).arg(id)
    }

    pub fn sensim_drive(id: u8, command: SenSimCommand) -> Self {
        Self::new(Method::SenSimDrive).arg(id).arg(command)
    }

    pub fn sensim_set_test(id: u8, test_mode: bool) -> Self {
        Self::new(Method::SenSimSetTest).arg(id).arg(test_mode)
    }

    pub fn sensim_get_test(id: u8) -> Self {
        Self::new(Method::SenSimGetTest).arg(id)
    }

    // ------------------------------------------------------------------------
    // sender
    // ------------------------------------------------------------------------

    pub fn sender_teach_start() -> Self {
        Self::new(Method::SenderTeachStart)
    }

    pub fn sender_teach_stop() -> Self {
        Self::new(Method::SenderTeachStop)
    }

    pub fn sender_teach_result() -> Self {
        Self::new(Method::SenderTeachResult)
    }

    pub fn sender_get_ids() -> Self {
        Self::new(Method::SenderGetIds)
    }

    pub fn sender_get_info(id: u8) -> Self {
        Self::new(Method::SenderGetInfo).arg(id)
    }

    pub fn sender_get_values(id: u8) -> Self {
        Self::new(Method::SenderGetValues).arg(id)
    }

    pub fn sender_set_label(id: u8, label: &str) -> Self {
        Self::new(Method::SenderSetLabel).arg(id).arg(label)
    }

    pub fn sender_delete(id: u8) -> Self {
        Self::new(Method::SenderDelete).arg(id)
    }

    pub fn sender_write_manual(id: u8, address: i64, channel: i64, reset_count: i64, name: &str) -> Self {
        Self::new(Method::SenderWriteManual)
            .arg(id)
            .arg(address)
            .arg(channel)
            .arg(reset_count)
            .arg(name)
    }

    // ------------------------------------------------------------------------
    // group
    // ------------------------------------------------------------------------

    pub fn group_read(id: u8) -> Self {
        Self::new(Method::GroupRead).arg(id)
    }

    pub fn group_write(id: u8, members: IdMask, name: &str) -> Self {
        Self::new(Method::GroupWrite).arg(id).arg(members).arg(name)
    }

    pub fn group_get_ids() -> Self {
        Self::new(Method::GroupGetIds)
    }

    pub fn group_delete(id: u8) -> Self {
        Self::new(Method::GroupDelete).arg(id)
    }

    // ------------------------------------------------------------------------
    // command
    // ------------------------------------------------------------------------

    /// Drive a single Commeo actuator.
    pub fn command_device(id: u8, command: DriveCommand, command_type: CommandType, param: u16) -> Self {
        Self::new(Method::CommandDevice)
            .arg(id)
            .arg(command)
            .arg(command_type)
            .arg(param)
    }

    /// Drive every member of a stored group.
    pub fn command_group(id: u8, command: DriveCommand, command_type: CommandType, param: u16) -> Self {
        Self::new(Method::CommandGroup)
            .arg(id)
            .arg(command)
            .arg(command_type)
            .arg(param)
    }

    /// Drive an ad-hoc set of actuators.
    pub fn command_group_man(command: DriveCommand, command_type: CommandType, ids: IdMask, param: u16) -> Self {
        Self::new(Method::CommandGroupMan)
            .arg(command)
            .arg(command_type)
            .arg(ids)
            .arg(param)
    }

    pub fn command_result() -> Self {
        Self::new(Method::CommandResult)
    }

    // ------------------------------------------------------------------------
    // iveo
    // ------------------------------------------------------------------------

    pub fn iveo_factory(id: u8) -> Self {
        Self::new(Method::IveoFactory).arg(id)
    }

    pub fn iveo_set_config(id: u8, activity: i64, device_type: DeviceType) -> Self {
        Self::new(Method::IveoSetConfig)
            .arg(id)
            .arg(activity)
            .arg(device_type)
    }

    pub fn iveo_get_config(id: u8) -> Self {
        Self::new(Method::IveoGetConfig).arg(id)
    }

    pub fn iveo_get_ids() -> Self {
        Self::new(Method::IveoGetIds)
    }

    pub fn iveo_set_repeater(state: RepeaterState) -> Self {
        Self::new(Method::IveoSetRepeater).arg(state)
    }

    pub fn iveo_get_repeater() -> Self {
        Self::new(Method::IveoGetRepeater)
    }

    pub fn iveo_set_label(id: u8, label: &str) -> Self {
        Self::new(Method::IveoSetLabel).arg(id).arg(label)
    }

    pub fn iveo_teach(id: u8) -> Self {
        Self::new(Method::IveoCommandTeach).arg(id)
    }

    pub fn iveo_learn(id: u8) -> Self {
        Self::new(Method::IveoCommandLearn).arg(id)
    }

    pub fn iveo_manual(ids: IdMask, command: IveoCommand) -> Self {
        Self::new(Method::IveoCommandManual).arg(ids).arg(command)
    }

    pub fn iveo_automatic(ids: IdMask, command: IveoCommand) -> Self {
        Self::new(Method::IveoCommandAutomatic).arg(ids).arg(command)
    }

    pub fn iveo_command_result() -> Self {
        Self::new(Method::IveoCommandResult)
    }

    // ------------------------------------------------------------------------
    // firmware
    // ------------------------------------------------------------------------

    pub fn firmware_get_version() -> Self {
        Self::new(Method::FirmwareGetVersion)
    }

    /// Framing only; the update image transfer is not implemented.
    pub fn firmware_update() -> Self {
        Self::new(Method::FirmwareUpdate)
    }
}

/// Append each value as its typed element.
pub(crate) fn write_values(out: &mut String, values: &[Value]) {
    use base64::Engine;
    for value in values {
        match value {
            Value::Int(v) => xml::write_text_element(out, TAG_INT, &v.to_string()),
            Value::Enum(raw) => xml::write_text_element(out, TAG_INT, &raw.ordinal.to_string()),
            Value::Str(s) => xml::write_text_element(out, TAG_STRING, s),
            Value::Base64(b) => xml::write_text_element(
                out,
                TAG_BASE64,
                &base64::engine::general_purpose::STANDARD.encode(b),
            ),
        }
    }
}
