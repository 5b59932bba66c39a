//! # viewsync core
//!
//! Host-side view synchronization logic, independent of any transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              any thread (RPC workers)                │
//! │  DispatchQueue::enqueue        SyncState getters     │
//! ├──────────────────────────────────────────────────────┤
//! │              host thread (single)                    │
//! │  SceneExecutor::tick                                 │
//! │   - drain DispatchQueue      - EntityRegistry        │
//! │   - host notifications       - SceneHost calls       │
//! ├──────────────────────────────────────────────────────┤
//! │  SyncState setters ──► ChangeBus ──► Subscription(s) │
//! └──────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod event;
pub mod executor;
pub mod headless;
pub mod host;
pub mod registry;
pub mod state;

pub use dispatch::{DispatchQueue, DrainReport, Job};
pub use entity::{EntityId, Position, Rgba, VisualEntity};
pub use error::{HostError, SceneError, SceneResult};
pub use event::{ChangeBus, ChangeEvent, Poll, Subscription};
pub use executor::{AddEntityRequest, SceneExecutor, DEFAULT_SPHERE_SIZE};
pub use headless::{HeadlessHandle, HeadlessHost, HeadlessObject};
pub use host::{HostNotification, HostObserver, ObserverToken, SceneHandle, SceneHost, SpawnSpec};
pub use registry::EntityRegistry;
pub use state::{SyncSnapshot, SyncState, NO_SELECTION};

/// Crate version, reported by `getVersion`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
