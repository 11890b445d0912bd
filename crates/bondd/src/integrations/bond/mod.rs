//! Bond hub integration.
//!
//! Exposes the fans, shades, fireplaces and generic devices behind a Bond hub
//! as entities, using the hub's local HTTP API.

// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod bond;
mod client;
mod cover;
mod entity;
mod error;
mod fan;
mod hub;
mod light;
mod switch;

use std::sync::Arc;

use anyhow::Context;
pub use bond::BondIntegration;
pub use client::BondApi;
pub use client::DeviceState;
pub use entity::ApplyState;
pub use entity::BondEntity;
pub use error::BondError;
pub use hub::BondDevice;
pub use hub::BondHub;
use linkme::distributed_slice;
use tracing::info;

use crate::engine;

/// Domain used in device identifiers, e.g. `("bond", "ZZBL12345")`
pub const DOMAIN: &str = "bond";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_bond(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let bond_config = if let Some(c) = &ctx.config.integrations.bond {
        c
    } else {
        return Ok(None);
    };

    info!("Initializing Bond integration for hub at {}", bond_config.host);
    let client =
        client::ReqwestBondClient::new(bond_config).context("Failed to create Bond client")?;
    Ok(Some(Box::new(BondIntegration::new(
        Arc::new(client),
        bond_config,
    ))))
}
