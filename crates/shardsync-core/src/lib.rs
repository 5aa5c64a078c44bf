//! # shardsync-core
//!
//! Foundation types for the shardsync coordinator.
//!
//! - **IDs**: [`ClusterId`] and role-prefixed [`SenderId`]
//! - **Clusters**: [`Cluster`], [`ShardInterval`], [`ConnectionStatus`] state machine
//! - **Registry**: [`ClusterRegistry`], the single owner of cluster state
//! - **Routing**: entity id → shard resolution
//! - **Wire**: [`SyncFrame`] records and typed [`EventPayload`] bodies
//! - **Errors**: [`SyncError`] taxonomy via `thiserror`

#![deny(unsafe_code)]

pub mod cluster;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod routing;
pub mod wire;

pub use cluster::{Cluster, ConnectionStatus, ShardInterval};
pub use errors::{FrameError, Result, SyncError};
pub use events::EventPayload;
pub use ids::{ClusterId, SenderId, SenderRole};
pub use registry::ClusterRegistry;
pub use wire::SyncFrame;
