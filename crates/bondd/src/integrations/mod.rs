#[cfg(feature = "integration_bond")]
pub mod bond;
