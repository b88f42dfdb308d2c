//! Vela State Management
//!
//! Persists what Vela knows about the remote resources it manages: for each
//! configured resource, its remote identifier and the attributes last read or
//! written. State lives in a backend (currently a local JSON file) guarded by
//! a lock so two runs never write it concurrently.
//!
//! # Example
//!
//! ```ignore
//! use vela_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("vela.state.json"))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply changes, upsert resources ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
