//! Vela Core
//!
//! Core library for a declarative cloud resource provider: configuration
//! values and schemas, the remote client contract, and the generic
//! create/read/update/delete lifecycle shared by every resource type.

pub mod client;
pub mod differ;
pub mod lifecycle;
pub mod provider;
pub mod resource;
pub mod schema;
