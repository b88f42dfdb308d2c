//! Resource types supported by the azurerm provider

use vela_core::lifecycle::{Lifecycle, ResourceHandler};

use crate::datafactory::LinkedCustomService;
use crate::impact::ImpactConnector;

/// Returns all resource types supported by this provider
pub fn resource_handlers() -> Vec<Box<dyn ResourceHandler>> {
    vec![
        Box::new(Lifecycle::new(LinkedCustomService)),
        Box::new(Lifecycle::new(ImpactConnector)),
    ]
}
