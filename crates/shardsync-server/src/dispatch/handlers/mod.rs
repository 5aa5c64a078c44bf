//! Event handlers, one file per concern.

pub mod load;
pub mod ratelimit;
pub mod route;
pub mod supporters;

pub use load::LoadReportHandler;
pub use ratelimit::RatelimitFetchHandler;
pub use route::ServerRouteHandler;
pub use supporters::{StaticSupporters, SupporterFetchHandler, SupporterSource};

use shardsync_core::Result;
use shardsync_core::events::tags;

use crate::dispatch::registry::EventRegistry;

/// Register every built-in handler.
pub fn register_all(registry: &mut EventRegistry) -> Result<()> {
    registry.register(tags::HANDSHAKE, LoadReportHandler)?;
    registry.register(tags::SERVER_COUNT, LoadReportHandler)?;
    registry.register(tags::RATELIMIT_FETCH, RatelimitFetchHandler)?;
    registry.register(tags::SERVER_ROUTE, ServerRouteHandler)?;
    registry.register(tags::SUPPORTER_FETCH, SupporterFetchHandler)?;
    Ok(())
}
