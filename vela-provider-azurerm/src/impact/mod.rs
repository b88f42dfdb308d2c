//! Impact Reporting resource types

pub mod connectors;

pub use connectors::{ConnectorModel, ImpactConnector};
