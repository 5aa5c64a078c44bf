//! # shardsync-server
//!
//! The running coordinator around `shardsync-core`.
//!
//! - Cluster channels over WebSocket (or in memory for tests), one read loop each
//! - Connection lifecycle, shard routing and broadcast (`ConnectionManager`)
//! - Event dispatch to handlers registered by tag
//! - Shared rate-limit interval and recommended shard count
//! - Operator console, status endpoint, metrics and graceful shutdown

#![deny(unsafe_code)]

pub mod channel;
pub mod console;
pub mod context;
pub mod dispatch;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod ratelimit;
pub mod service;
pub mod shards;
pub mod shutdown;
pub mod status;

pub use channel::{Connector, MemoryConnector, MemoryPeer, WsConnector};
pub use console::{Console, ConsoleCommand, ConsoleError};
pub use context::SyncContext;
pub use dispatch::{DispatchOutcome, EventHandler, EventRegistry, InboundMessage};
pub use manager::{BroadcastReport, ConnectionManager, ManagerConfig, RestartReport};
pub use pool::WorkerPool;
pub use ratelimit::RatelimitCoordinator;
pub use service::SyncService;
pub use shards::{FixedShardCount, RecommendedShardsCache, ShardCountSource};
pub use shutdown::ShutdownCoordinator;
