//! Data Factory resource types

pub mod linked_custom_service;
pub mod mapper;

pub use linked_custom_service::{LinkedCustomService, LinkedCustomServiceModel};
