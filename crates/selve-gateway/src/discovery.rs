//! Discovery: rebuild the registry from the gateway's own indices.
//!
//! For each kind, `getIDs` lists the ids in use; every id is then read in
//! detail and merged. Ids the gateway no longer reports are pruned. Reads
//! run one after another so responses of the same method never overlap.
//! Running discovery twice without gateway-side changes leaves the registry
//! as it was.

use selve_protocol::*;
use tracing::{debug, info};

use crate::entity::{Entity, EntityKind, EntityUpdate};
use crate::error::{CommandError, GatewayError};
use crate::gateway::Gateway;
use crate::Result;

impl Gateway {
    /// Discover every entity of `kind`.
    pub async fn discover(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let IdList(ids) = self.call(kind.get_ids_call()).await?;
        debug!("gateway reports {} {} ids: {:?}", ids.len(), kind, ids.ids());

        for id in ids.ids() {
            if kind.check_id(id).is_err() {
                debug!("skipping out-of-range {} id {}", kind, id);
                continue;
            }
            match self.read_entity(kind, id).await {
                Ok(updates) => {
                    for update in &updates {
                        self.router().apply_update(update);
                    }
                }
                // Removed between getIDs and the detail read.
                Err(GatewayError::Command(CommandError::Rejected(FaultCode::IdNotUsed))) => {
                    debug!("{} {} vanished during discovery", kind, id);
                }
                Err(e) => return Err(e),
            }
        }

        let pruned = self.router().prune(kind, ids);
        if pruned > 0 {
            info!("removed {} stale {} entries", pruned, kind);
        }
        Ok(self.entities(kind))
    }

    /// Discover every kind. The gateway must report `Ready`.
    pub async fn discover_all(&self) -> Result<usize> {
        Self::require_ready(self.gateway_state().await?)?;
        let mut total = 0;
        for kind in EntityKind::ALL {
            total += self.discover(kind).await?.len();
        }
        Ok(total)
    }

    /// Re-read one entity and merge the result.
    pub async fn refresh(&self, kind: EntityKind, id: u8) -> Result<Entity> {
        kind.check_id(id)?;
        let updates = self.read_entity(kind, id).await?;
        let mut entity = None;
        for update in &updates {
            entity = Some(self.router().apply_update(update));
        }
        // Every kind reads at least one payload.
        entity.ok_or(GatewayError::Unsupported {
            operation: "refresh",
            kind: kind.as_str(),
        })
    }

    /// Detail reads for one entity, in merge order.
    async fn read_entity(&self, kind: EntityKind, id: u8) -> Result<Vec<EntityUpdate>> {
        let updates = match kind {
            EntityKind::Device => vec![
                EntityUpdate::DeviceInfo(self.call(MethodCall::device_get_info(id)).await?),
                EntityUpdate::DeviceValues(self.call(MethodCall::device_get_values(id)).await?),
            ],
            EntityKind::Iveo => vec![EntityUpdate::IveoConfig(
                self.call(MethodCall::iveo_get_config(id)).await?,
            )],
            EntityKind::Group => vec![EntityUpdate::Group(self.call(MethodCall::group_read(id)).await?)],
            EntityKind::Sensor => vec![
                EntityUpdate::SensorInfo(self.call(MethodCall::sensor_get_info(id)).await?),
                EntityUpdate::SensorValues(self.call(MethodCall::sensor_get_values(id)).await?),
            ],
            EntityKind::Sender => vec![
                EntityUpdate::SenderInfo(self.call(MethodCall::sender_get_info(id)).await?),
                EntityUpdate::SenderReport(self.call(MethodCall::sender_get_values(id)).await?),
            ],
            EntityKind::Controller => vec![
                EntityUpdate::ControllerConfig(self.call(MethodCall::sensim_get_config(id)).await?),
                EntityUpdate::ControllerValues(self.call(MethodCall::sensim_get_values(id)).await?),
            ],
        };
        Ok(updates)
    }
}
