//! `SUPPORTER_FETCH`: fetch supporter tiers, then broadcast `SUPPORTERS`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use shardsync_core::events::Supporters;
use shardsync_core::{ClusterId, EventPayload, Result, SenderId};
use shardsync_settings::SupporterSettings;
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::dispatch::registry::EventHandler;

/// Where supporter tiers come from.
#[async_trait]
pub trait SupporterSource: Send + Sync {
    /// Current tier per user id.
    async fn fetch(&self) -> Result<BTreeMap<u64, u32>>;
}

/// Fixed tiers, usually from the `supporters` settings section.
#[derive(Clone, Debug, Default)]
pub struct StaticSupporters {
    tiers: BTreeMap<u64, u32>,
}

impl StaticSupporters {
    /// Serve exactly these tiers.
    pub fn new(tiers: BTreeMap<u64, u32>) -> Self {
        Self { tiers }
    }

    /// Build from settings. Keys that are not user ids are skipped.
    pub fn from_settings(settings: &SupporterSettings) -> Self {
        let tiers = settings
            .tiers
            .iter()
            .filter_map(|(user, tier)| match user.parse::<u64>() {
                Ok(id) => Some((id, *tier)),
                Err(_) => {
                    warn!(user = %user, "skipping supporter with non-numeric id");
                    None
                }
            })
            .collect();
        Self { tiers }
    }
}

#[async_trait]
impl SupporterSource for StaticSupporters {
    async fn fetch(&self) -> Result<BTreeMap<u64, u32>> {
        Ok(self.tiers.clone())
    }
}

/// Starts a supporter refresh for a cluster.
///
/// The fetch and the broadcast run on the worker pool after the handler has
/// returned; the requesting cluster gets the result with everyone else.
pub struct SupporterFetchHandler;

#[async_trait]
impl EventHandler for SupporterFetchHandler {
    #[instrument(skip_all, fields(event = "SUPPORTER_FETCH", %sender))]
    async fn handle(
        &self,
        sender: &SenderId,
        _origin: Option<ClusterId>,
        _payload: EventPayload,
        ctx: &Arc<SyncContext>,
    ) -> Result<Option<EventPayload>> {
        if !sender.is_cluster() {
            debug!("supporter fetch from non-cluster sender ignored");
            return Ok(None);
        }
        let ctx = Arc::clone(ctx);
        let pool = ctx.pool.clone();
        let _ = pool.spawn(async move {
            let tiers = match ctx.supporters.fetch().await {
                Ok(tiers) => tiers,
                Err(e) => {
                    warn!(error = %e, "supporter fetch failed");
                    return;
                }
            };
            let count = tiers.len();
            match ctx.manager.broadcast(&EventPayload::Supporters(Supporters { tiers })) {
                Ok(report) => info!(
                    supporters = count,
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    "supporters broadcast"
                ),
                Err(e) => warn!(error = %e, "supporters broadcast failed"),
            }
        });
        Ok(None)
    }
}
