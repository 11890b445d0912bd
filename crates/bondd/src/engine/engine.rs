use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::device::device_key;
use super::entity::EntityCommand;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::EntityState;
use super::state::State;
use crate::engine::IntegrationContext;

/// Errors returned when routing a command to an integration.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration channel not found: {0}")]
    IntegrationGone(String),
}

/// bondd engine
///
/// This structure handles the flow of events, sending commands to the
/// correct integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every compiled-in integration factory against the config and
    /// registers the ones that return an integration. Returns how many were
    /// registered.
    pub async fn register_integrations_from_config(&self, cfg: &crate::config::Config) -> usize {
        let ctx = IntegrationContext { config: cfg };
        let mut registered = 0;
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration).await;
            registered += 1;
        }

        registered
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub async fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.lock().await.push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let entity_id = msg.entity_id().to_string();

        // Route to the integration that owns this entity
        let integration_name = self
            .entity_integration_map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;

        let channels = self
            .integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| CommandError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| CommandError::IntegrationGone(integration_name.clone()))
    }

    /// Send a generic entity command
    pub fn send_entity_command(
        &self,
        entity_id: String,
        command: EntityCommand,
    ) -> Result<(), CommandError> {
        self.send_command(ToIntegrationMessage::EntityCommand { entity_id, command })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Close every integration channel and wait for the integration tasks to finish.
    pub async fn shutdown(&self) {
        self.integration_channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let handles = std::mem::take(&mut *self.integration_handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Apply a mutation to a copy of the state and publish it.
    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut state = State::clone(&self.state.load());
        f(&mut state);
        self.state.store(Arc::new(state));
    }

    /// Handle an event from an integration
    pub(crate) fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::DeviceRegistered { device } => {
                let Some(identifier) = device.primary_identifier().cloned() else {
                    warn!("Ignoring device '{}' without identifiers", device.name);
                    return;
                };
                info!("Device registered: {} ({})", device.name, device_key(&identifier));

                self.update_state(|state| {
                    let key = state
                        .device_key_for(&identifier)
                        .map(str::to_string)
                        .unwrap_or_else(|| device_key(&identifier));
                    state
                        .devices
                        .entry(key.clone())
                        .and_modify(|d| d.info = device.clone())
                        .or_insert_with(|| Device::new(key, device));
                });
            }
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                unique_id,
                name,
                platform,
                assumed_state,
                device,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(entity_id.clone(), integration_name);

                self.update_state(|state| {
                    let device_id = device.primary_identifier().cloned().map(|identifier| {
                        let key = state
                            .device_key_for(&identifier)
                            .map(str::to_string)
                            .unwrap_or_else(|| device_key(&identifier));
                        state
                            .devices
                            .entry(key.clone())
                            .or_insert_with(|| Device::new(key.clone(), device))
                            .add_entity(entity_id.clone());
                        key
                    });

                    // Attributes are not populated until the first state-change message arrives.
                    state.entities.insert(
                        entity_id,
                        EntityState {
                            unique_id,
                            name,
                            platform,
                            assumed_state,
                            available: true,
                            attributes: serde_json::Value::Null,
                            device_id,
                            unavailable_reason: None,
                        },
                    );
                });
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                self.update_state(|state| {
                    if let Some(removed) = state.entities.remove(&entity_id) {
                        if let Some(device) = removed
                            .device_id
                            .and_then(|key| state.devices.get_mut(&key))
                        {
                            device.remove_entity(&entity_id);
                        }
                    }
                });

                // Remove from routing map
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&entity_id);
            }
            FromIntegrationMessage::EntityStateChanged {
                entity_id,
                attributes,
            } => {
                debug!("Entity state changed: {} -> {}", entity_id, attributes);

                let known = self.state.load().entities.contains_key(&entity_id);
                if !known {
                    warn!("State change for unknown entity: {}", entity_id);
                    return;
                }

                self.update_state(|state| {
                    if let Some(entity) = state.entities.get_mut(&entity_id) {
                        if !entity.available {
                            info!("Entity available again: {}", entity_id);
                        }
                        entity.attributes = attributes;
                        entity.available = true;
                        entity.unavailable_reason = None;
                    }
                });
            }
            FromIntegrationMessage::EntityUnavailable { entity_id, reason } => {
                self.update_state(|state| {
                    if let Some(entity) = state.entities.get_mut(&entity_id) {
                        if entity.available {
                            warn!("Entity unavailable: {} ({})", entity_id, reason);
                        }
                        entity.available = false;
                        entity.unavailable_reason = Some(reason);
                    }
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::DeviceInfo;

    fn hub_info() -> DeviceInfo {
        DeviceInfo::new("Bond Hub", ("bond".to_string(), "bond123".to_string()))
    }

    fn shade_discovered() -> FromIntegrationMessage {
        FromIntegrationMessage::EntityDiscovered {
            entity_id: "cover.42".to_string(),
            integration_name: "bond".to_string(),
            unique_id: "42".to_string(),
            name: "Shade".to_string(),
            platform: "cover".to_string(),
            assumed_state: true,
            device: DeviceInfo::new("Shade", ("bond".to_string(), "42".to_string()))
                .via(("bond".to_string(), "bond123".to_string())),
        }
    }

    #[test]
    fn test_entity_discovery_groups_under_device() {
        let engine = Engine::new();
        engine.handle_event(FromIntegrationMessage::DeviceRegistered { device: hub_info() });
        engine.handle_event(shade_discovered());

        let state = engine.state_snapshot();
        assert_eq!(state.devices.len(), 2);

        let entity = &state.entities["cover.42"];
        assert_eq!(entity.device_id.as_deref(), Some("bond:42"));
        assert!(entity.assumed_state);
        assert!(entity.available);
        assert!(entity.attributes.is_null());

        let shade = &state.devices["bond:42"];
        assert_eq!(shade.entity_ids, vec!["cover.42".to_string()]);
        assert_eq!(
            shade.info.via_device,
            Some(("bond".to_string(), "bond123".to_string()))
        );
        assert!(state.entities_of_device("bond:bond123").is_empty());
    }

    #[test]
    fn test_state_change_and_availability() {
        let engine = Engine::new();
        engine.handle_event(shade_discovered());

        engine.handle_event(FromIntegrationMessage::EntityUnavailable {
            entity_id: "cover.42".to_string(),
            reason: "timeout".to_string(),
        });
        let state = engine.state_snapshot();
        assert!(!state.entities["cover.42"].available);
        assert_eq!(
            state.entities["cover.42"].unavailable_reason.as_deref(),
            Some("timeout")
        );

        engine.handle_event(FromIntegrationMessage::EntityStateChanged {
            entity_id: "cover.42".to_string(),
            attributes: serde_json::json!({"is_closed": false}),
        });
        let state = engine.state_snapshot();
        assert!(state.entities["cover.42"].available);
        assert_eq!(state.entities["cover.42"].unavailable_reason, None);
        assert_eq!(
            state.entities["cover.42"].attributes,
            serde_json::json!({"is_closed": false})
        );
    }

    #[test]
    fn test_state_change_for_unknown_entity_is_ignored() {
        let engine = Engine::new();
        engine.handle_event(FromIntegrationMessage::EntityStateChanged {
            entity_id: "fan.nope".to_string(),
            attributes: serde_json::json!({}),
        });
        assert!(engine.state_snapshot().entities.is_empty());
    }

    #[test]
    fn test_entity_removed() {
        let engine = Engine::new();
        engine.handle_event(shade_discovered());
        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "cover.42".to_string(),
        });

        let state = engine.state_snapshot();
        assert!(state.entities.is_empty());
        assert!(state.devices["bond:42"].entity_ids.is_empty());
        assert!(matches!(
            engine.send_entity_command("cover.42".to_string(), EntityCommand::Open),
            Err(CommandError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_command_for_unknown_entity() {
        let engine = Engine::new();
        let err = engine
            .send_entity_command("fan.missing".to_string(), EntityCommand::TurnOn)
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownEntity(id) if id == "fan.missing"));
    }

    /// Integration that forwards every received message to a test channel.
    struct RecordingIntegration {
        seen: mpsc::UnboundedSender<ToIntegrationMessage>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            tx.send(shade_discovered())
                .await
                .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let _ = self.seen.send(msg);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_command_routed_to_owning_integration() {
        let engine = Engine::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        engine
            .register_integration(
                "recording".to_string(),
                Box::new(RecordingIntegration { seen: seen_tx }),
            )
            .await;

        // Process the discovery message the integration sent during setup
        let msg = engine.message_rx.lock().await.recv().await.unwrap();
        engine.handle_event(msg);

        engine
            .send_entity_command("cover.42".to_string(), EntityCommand::Close)
            .unwrap();

        let routed = seen_rx.recv().await.unwrap();
        assert!(matches!(
            routed,
            ToIntegrationMessage::EntityCommand { ref entity_id, command: EntityCommand::Close }
                if entity_id == "cover.42"
        ));

        engine.shutdown().await;
        assert!(matches!(
            engine.send_entity_command("cover.42".to_string(), EntityCommand::Close),
            Err(CommandError::IntegrationGone(_))
        ));
    }

    #[tokio::test]
    async fn test_routing_survives_poisoned_locks() {
        let engine = Engine::new();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        engine
            .register_integration(
                "recording".to_string(),
                Box::new(RecordingIntegration { seen: seen_tx }),
            )
            .await;
        let msg = engine.message_rx.lock().await.recv().await.unwrap();
        engine.handle_event(msg);

        // Poison both routing locks by panicking while holding them
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _map = engine.entity_integration_map.lock().unwrap();
            let _channels = engine.integration_channels.lock().unwrap();
            panic!("panic while routing");
        }));
        assert!(poisoned.is_err());
        assert!(engine.entity_integration_map.is_poisoned());
        assert!(engine.integration_channels.is_poisoned());

        engine
            .send_entity_command("cover.42".to_string(), EntityCommand::Open)
            .unwrap();
        assert!(matches!(
            seen_rx.recv().await.unwrap(),
            ToIntegrationMessage::EntityCommand { command: EntityCommand::Open, .. }
        ));

        assert!(matches!(
            engine.send_entity_command("fan.missing".to_string(), EntityCommand::TurnOn),
            Err(CommandError::UnknownEntity(_))
        ));

        engine.shutdown().await;
    }
}
