//! Mutation intents.
//!
//! These send commands and report whether the gateway accepted them. None of
//! them touch the registry: the resulting state arrives later through events
//! or the next refresh. The one exception is a confirmed delete, which
//! removes the entity.

use selve_protocol::*;
use tracing::info;

use crate::entity::EntityKind;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::Result;

impl Gateway {
    // ========================================================================
    // Commeo devices
    // ========================================================================

    /// Send a drive command to one device.
    pub async fn drive_device(&self, id: u8, command: DriveCommand, command_type: CommandType, param: u16) -> Result<bool> {
        EntityKind::Device.check_id(id)?;
        self.execute(MethodCall::command_device(id, command, command_type, param)).await
    }

    pub async fn stop(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::Stop, CommandType::Manual, 0).await
    }

    pub async fn move_up(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::DriveUp, CommandType::Manual, 0).await
    }

    pub async fn move_down(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::DriveDown, CommandType::Manual, 0).await
    }

    pub async fn move_to_pos1(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::DrivePos1, CommandType::Manual, 0).await
    }

    pub async fn move_to_pos2(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::DrivePos2, CommandType::Manual, 0).await
    }

    /// Drive to `percent` (0 = fully open, 100 = fully closed).
    pub async fn set_position(&self, id: u8, percent: u8) -> Result<bool> {
        let raw = percent_to_value(percent)?;
        self.drive_device(id, DriveCommand::DrivePos, CommandType::Manual, raw).await
    }

    /// Tilt up by `degrees`. Not idempotent.
    pub async fn step_up(&self, id: u8, degrees: u16) -> Result<bool> {
        let raw = degrees_to_value(degrees)?;
        self.drive_device(id, DriveCommand::StepUp, CommandType::Manual, raw).await
    }

    /// Tilt down by `degrees`. Not idempotent.
    pub async fn step_down(&self, id: u8, degrees: u16) -> Result<bool> {
        let raw = degrees_to_value(degrees)?;
        self.drive_device(id, DriveCommand::StepDown, CommandType::Manual, raw).await
    }

    pub async fn auto_on(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::AutoOn, CommandType::Manual, 0).await
    }

    pub async fn auto_off(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::AutoOff, CommandType::Manual, 0).await
    }

    /// Store the current position as intermediate position 1.
    pub async fn save_pos1(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::SavePos1, CommandType::Manual, 0).await
    }

    pub async fn save_pos2(&self, id: u8) -> Result<bool> {
        self.drive_device(id, DriveCommand::SavePos2, CommandType::Manual, 0).await
    }

    pub async fn set_device_type(&self, id: u8, device_type: DeviceType) -> Result<bool> {
        EntityKind::Device.check_id(id)?;
        self.execute(MethodCall::device_set_type(id, device_type)).await
    }

    pub async fn set_device_function(&self, id: u8, function: DeviceFunction) -> Result<bool> {
        EntityKind::Device.check_id(id)?;
        self.execute(MethodCall::device_set_function(id, function)).await
    }

    /// Persist a device found by a scan.
    pub async fn save_device(&self, id: u8) -> Result<bool> {
        EntityKind::Device.check_id(id)?;
        self.execute(MethodCall::device_save(id)).await
    }

    pub async fn write_device_manual(&self, id: u8, address: i64, name: &str, device_type: DeviceType) -> Result<bool> {
        EntityKind::Device.check_id(id)?;
        self.execute(MethodCall::device_write_manual(id, address, name, device_type)).await
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub async fn drive_group(&self, id: u8, command: DriveCommand, command_type: CommandType, param: u16) -> Result<bool> {
        EntityKind::Group.check_id(id)?;
        self.execute(MethodCall::command_group(id, command, command_type, param)).await
    }

    pub async fn group_up(&self, id: u8) -> Result<bool> {
        self.drive_group(id, DriveCommand::DriveUp, CommandType::Manual, 0).await
    }

    pub async fn group_down(&self, id: u8) -> Result<bool> {
        self.drive_group(id, DriveCommand::DriveDown, CommandType::Manual, 0).await
    }

    pub async fn group_stop(&self, id: u8) -> Result<bool> {
        self.drive_group(id, DriveCommand::Stop, CommandType::Manual, 0).await
    }

    pub async fn group_set_position(&self, id: u8, percent: u8) -> Result<bool> {
        let raw = percent_to_value(percent)?;
        self.drive_group(id, DriveCommand::DrivePos, CommandType::Manual, raw).await
    }

    /// Drive an ad-hoc set of devices at once.
    pub async fn drive_many(&self, ids: IdMask, command: DriveCommand, command_type: CommandType, param: u16) -> Result<GroupManResult> {
        self.call(MethodCall::command_group_man(command, command_type, ids, param)).await
    }

    /// Create or overwrite a group.
    pub async fn write_group(&self, id: u8, members: IdMask, name: &str) -> Result<bool> {
        EntityKind::Group.check_id(id)?;
        self.execute(MethodCall::group_write(id, members, name)).await
    }

    // ========================================================================
    // Iveo
    // ========================================================================

    pub async fn iveo_command(&self, ids: IdMask, command: IveoCommand) -> Result<bool> {
        self.execute(MethodCall::iveo_manual(ids, command)).await
    }

    pub async fn iveo_command_automatic(&self, ids: IdMask, command: IveoCommand) -> Result<bool> {
        self.execute(MethodCall::iveo_automatic(ids, command)).await
    }

    /// Send a teach telegram from Iveo channel `id`. Not idempotent.
    pub async fn iveo_teach(&self, id: u8) -> Result<bool> {
        EntityKind::Iveo.check_id(id)?;
        self.execute(MethodCall::iveo_teach(id)).await
    }

    pub async fn iveo_learn(&self, id: u8) -> Result<bool> {
        EntityKind::Iveo.check_id(id)?;
        self.execute(MethodCall::iveo_learn(id)).await
    }

    pub async fn iveo_set_config(&self, id: u8, activity: i64, device_type: DeviceType) -> Result<bool> {
        EntityKind::Iveo.check_id(id)?;
        self.execute(MethodCall::iveo_set_config(id, activity, device_type)).await
    }

    pub async fn repeater(&self) -> Result<RepeaterState> {
        self.call(MethodCall::iveo_get_repeater()).await
    }

    pub async fn set_repeater(&self, state: RepeaterState) -> Result<bool> {
        self.execute(MethodCall::iveo_set_repeater(state)).await
    }

    // ========================================================================
    // Sensor simulation (controllers)
    // ========================================================================

    pub async fn controller_drive(&self, id: u8, command: SenSimCommand) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        self.execute(MethodCall::sensim_drive(id, command)).await
    }

    pub async fn controller_set_values(&self, id: u8, readings: &SimulatedReadings) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        self.execute(MethodCall::sensim_set_values(id, readings)).await
    }

    pub async fn controller_set_active(&self, id: u8, active: bool) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        self.execute(MethodCall::sensim_set_config(id, active)).await
    }

    pub async fn controller_set_test(&self, id: u8, test_mode: bool) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        self.execute(MethodCall::sensim_set_test(id, test_mode)).await
    }

    pub async fn controller_test(&self, id: u8) -> Result<SenSimTest> {
        EntityKind::Controller.check_id(id)?;
        self.call(MethodCall::sensim_get_test(id)).await
    }

    /// Link actuator `actor_id` to controller `id`.
    pub async fn controller_link(&self, id: u8, actor_id: u8) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        EntityKind::Device.check_id(actor_id)?;
        self.execute(MethodCall::sensim_store(id, actor_id)).await
    }

    pub async fn controller_unlink(&self, id: u8, actor_id: u8) -> Result<bool> {
        EntityKind::Controller.check_id(id)?;
        EntityKind::Device.check_id(actor_id)?;
        self.execute(MethodCall::sensim_delete(id, actor_id)).await
    }

    // ========================================================================
    // Teaching and scanning
    // ========================================================================

    /// Start an RF scan for new Commeo devices. Not idempotent.
    pub async fn scan_start(&self) -> Result<bool> {
        self.execute(MethodCall::device_scan_start()).await
    }

    pub async fn scan_stop(&self) -> Result<bool> {
        self.execute(MethodCall::device_scan_stop()).await
    }

    pub async fn scan_result(&self) -> Result<ScanResult> {
        self.call(MethodCall::device_scan_result()).await
    }

    pub async fn sensor_teach_start(&self) -> Result<bool> {
        self.execute(MethodCall::sensor_teach_start()).await
    }

    pub async fn sensor_teach_stop(&self) -> Result<bool> {
        self.execute(MethodCall::sensor_teach_stop()).await
    }

    pub async fn sensor_teach_result(&self) -> Result<SensorTeachResult> {
        self.call(MethodCall::sensor_teach_result()).await
    }

    pub async fn sender_teach_start(&self) -> Result<bool> {
        self.execute(MethodCall::sender_teach_start()).await
    }

    pub async fn sender_teach_stop(&self) -> Result<bool> {
        self.execute(MethodCall::sender_teach_stop()).await
    }

    pub async fn sender_teach_result(&self) -> Result<SenderTeachResult> {
        self.call(MethodCall::sender_teach_result()).await
    }

    /// Last aggregated drive result from the gateway.
    pub async fn command_result(&self) -> Result<CommandResult> {
        self.call(MethodCall::command_result()).await
    }

    pub async fn iveo_command_result(&self) -> Result<IveoResult> {
        self.call(MethodCall::iveo_command_result()).await
    }

    // ========================================================================
    // Labels and deletion
    // ========================================================================

    pub async fn set_label(&self, kind: EntityKind, id: u8, label: &str) -> Result<bool> {
        kind.check_id(id)?;
        let call = match kind {
            EntityKind::Device => MethodCall::device_set_label(id, label),
            EntityKind::Iveo => MethodCall::iveo_set_label(id, label),
            EntityKind::Sensor => MethodCall::sensor_set_label(id, label),
            EntityKind::Sender => MethodCall::sender_set_label(id, label),
            EntityKind::Controller => MethodCall::sensim_set_label(id, label),
            // Groups are renamed by rewriting them.
            EntityKind::Group => {
                return Err(GatewayError::Unsupported {
                    operation: "set_label",
                    kind: kind.as_str(),
                })
            }
        };
        self.execute(call).await
    }

    /// Delete an entity on the gateway. On confirmation the registry entry is
    /// removed; Iveo channels and controllers are reset to factory state.
    pub async fn delete(&self, kind: EntityKind, id: u8) -> Result<bool> {
        kind.check_id(id)?;
        let call = match kind {
            EntityKind::Device => MethodCall::device_delete(id),
            EntityKind::Iveo => MethodCall::iveo_factory(id),
            EntityKind::Group => MethodCall::group_delete(id),
            EntityKind::Sensor => MethodCall::sensor_delete(id),
            EntityKind::Sender => MethodCall::sender_delete(id),
            EntityKind::Controller => MethodCall::sensim_factory(id),
        };
        let executed = self.execute(call).await?;
        if executed && self.router().remove_entity(kind, id).is_some() {
            info!("deleted {} {}", kind, id);
        }
        Ok(executed)
    }
}
