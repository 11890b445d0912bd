use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::BondApi;
use super::cover::Cover;
use super::entity::BondControl;
use super::entity::BondEntity;
use super::error::BondError;
use super::fan::Fan;
use super::hub::BondDevice;
use super::hub::BondHub;
use super::hub::DeviceType;
use super::light::Light;
use super::switch::Switch;
use crate::config::BondConfig;
use crate::engine::EntityCommand;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// One entity, locked while it is refreshed or commanded
type SharedEntity = Arc<Mutex<Box<dyn BondControl>>>;

/// Type alias for the shared entities map, keyed by entity id
type EntitiesMap = Arc<Mutex<BTreeMap<String, SharedEntity>>>;

const INTEGRATION_NAME: &str = "bond";

/// Bond hub integration for bondd
///
/// Builds one entity per controllable function of each device behind the hub
/// and polls their assumed state on a fixed interval.
pub struct BondIntegration {
    api: Arc<dyn BondApi>,
    poll_interval: Duration,
    connect_retry: Duration,
    entities: EntitiesMap,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background task that connects to the hub, then polls it
    poll_task: Option<JoinHandle<()>>,
}

impl BondIntegration {
    /// Create a new Bond integration
    pub fn new(api: Arc<dyn BondApi>, config: &BondConfig) -> Self {
        Self {
            api,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            connect_retry: Duration::from_secs(config.connect_retry_secs),
            entities: Arc::new(Mutex::new(BTreeMap::new())),
            to_engine: None,
            poll_task: None,
        }
    }

    /// Entities exposed for one device, based on its type and advertised actions
    fn entities_for(hub: &Arc<BondHub>, device: &Arc<BondDevice>) -> Vec<Box<dyn BondControl>> {
        let mut entities: Vec<Box<dyn BondControl>> = Vec::new();

        match device.device_type() {
            Some(DeviceType::CeilingFan) => {
                entities.push(Box::new(BondEntity::new(
                    hub.clone(),
                    device.clone(),
                    Fan::default(),
                )));
                if device.supports_light() {
                    entities.push(Box::new(BondEntity::new(
                        hub.clone(),
                        device.clone(),
                        Light::default(),
                    )));
                }
            }
            Some(DeviceType::MotorizedShades) => {
                entities.push(Box::new(BondEntity::new(
                    hub.clone(),
                    device.clone(),
                    Cover::default(),
                )));
            }
            Some(DeviceType::Fireplace) | Some(DeviceType::Generic) => {
                entities.push(Box::new(BondEntity::new(
                    hub.clone(),
                    device.clone(),
                    Switch::default(),
                )));
            }
            None => {
                debug!(
                    "Ignoring device {} ({}) with unsupported type {}",
                    device.name, device.device_id, device.type_code
                );
            }
        }

        entities
    }

    /// Connect to the hub, retrying until it answers.
    async fn connect_with_retry(api: Arc<dyn BondApi>, retry: Duration) -> Arc<BondHub> {
        loop {
            match BondHub::connect(api.clone()).await {
                Ok(hub) => return Arc::new(hub),
                Err(e) => {
                    warn!("Failed to connect to Bond hub, retrying in {:?}: {}", retry, e);
                    tokio::time::sleep(retry).await;
                }
            }
        }
    }

    /// Register the hub and every supported device with the engine.
    async fn discover(hub: &Arc<BondHub>, entities: &EntitiesMap, tx: &FromIntegrationSender) {
        if let Err(e) = tx
            .send(FromIntegrationMessage::DeviceRegistered {
                device: hub.device_info(),
            })
            .await
        {
            warn!("Failed to send DeviceRegistered message: {}", e);
        }

        let mut entities = entities.lock().await;
        for device in hub.devices() {
            for entity in Self::entities_for(hub, device) {
                let entity_id = entity.entity_id();
                let msg = FromIntegrationMessage::EntityDiscovered {
                    entity_id: entity_id.clone(),
                    integration_name: INTEGRATION_NAME.to_string(),
                    unique_id: entity.unique_id().to_string(),
                    name: entity.name().to_string(),
                    platform: entity.platform().to_string(),
                    assumed_state: entity.assumed_state(),
                    device: entity.device_info(),
                };
                if let Err(e) = tx.send(msg).await {
                    warn!("Failed to send EntityDiscovered message: {}", e);
                } else {
                    info!("Registered entity: {}", entity_id);
                }
                entities.insert(entity_id, Arc::new(Mutex::new(entity)));
            }
        }
    }

    /// Refresh every entity once, in entity id order.
    ///
    /// A failed refresh marks the entity unavailable; polling carries on with
    /// the next entity.
    async fn poll_once(entities: &EntitiesMap, to_engine: &FromIntegrationSender) {
        let snapshot: Vec<(String, SharedEntity)> = {
            let guard = entities.lock().await;
            guard
                .iter()
                .map(|(id, entity)| (id.clone(), entity.clone()))
                .collect()
        };

        for (entity_id, entity) in snapshot {
            let mut entity = entity.lock().await;
            Self::refresh_and_report(&entity_id, entity.as_mut(), to_engine).await;
        }
    }

    async fn refresh_and_report(
        entity_id: &str,
        entity: &mut dyn BondControl,
        to_engine: &FromIntegrationSender,
    ) {
        let msg = match entity.update().await {
            Ok(()) => FromIntegrationMessage::EntityStateChanged {
                entity_id: entity_id.to_string(),
                attributes: entity.state_json(),
            },
            Err(e) => {
                warn!("Failed to refresh {}: {}", entity_id, e);
                FromIntegrationMessage::EntityUnavailable {
                    entity_id: entity_id.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send state for {}: {}", entity_id, e);
        }
    }

    /// Poll on a fixed interval; the first tick fires immediately.
    async fn run_poll_loop(
        entities: EntitiesMap,
        to_engine: FromIntegrationSender,
        period: Duration,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            debug!("Polling Bond entities");
            Self::poll_once(&entities, &to_engine).await;
        }
    }

    /// Execute a command on one entity, then refresh it so the engine sees the result.
    async fn execute_command(
        &self,
        entity_id: &str,
        command: &EntityCommand,
    ) -> Result<(), BondError> {
        let entity = self
            .entities
            .lock()
            .await
            .get(entity_id)
            .cloned()
            .ok_or_else(|| BondError::UnknownEntity(entity_id.to_string()))?;

        let mut entity = entity.lock().await;
        entity.execute(command).await?;
        info!("Executed {:?} on {}", command, entity_id);

        if let Some(to_engine) = &self.to_engine {
            Self::refresh_and_report(entity_id, entity.as_mut(), to_engine).await;
        }

        Ok(())
    }
}

#[async_trait]
impl Integration for BondIntegration {
    fn name(&self) -> &str {
        INTEGRATION_NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        // Store sender for sending events to engine
        self.to_engine = Some(tx.clone());

        let api = self.api.clone();
        let entities = self.entities.clone();
        let poll_interval = self.poll_interval;
        let connect_retry = self.connect_retry;
        self.poll_task = Some(tokio::spawn(async move {
            let hub = Self::connect_with_retry(api, connect_retry).await;
            Self::discover(&hub, &entities, &tx).await;

            info!(
                "Bond integration setup complete, polling every {:?}",
                poll_interval
            );
            Self::run_poll_loop(entities, tx, poll_interval).await;
        }));

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::EntityCommand { entity_id, command } => {
                info!("Handling command for {}: {:?}", entity_id, command);
                self.execute_command(&entity_id, &command)
                    .await
                    .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Bond integration shutting down");

        if let Some(task) = self.poll_task.take() {
            task.abort();
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("Bond task cancelled"),
                Err(e) => warn!("Bond task error: {}", e),
            }
        }

        Ok(())
    }
}
