//! Entity id → shard resolution.
//!
//! Entity ids are 64-bit snowflakes whose high bits carry a millisecond
//! timestamp. Dropping the low 22 bits (worker, process and sequence fields)
//! and reducing modulo the shard total gives a stable, well-spread shard
//! index that agrees with how the upstream gateway assigns entities.

use crate::errors::{Result, SyncError};

/// Low bits of an entity id that do not take part in shard selection.
pub const SHARD_SHIFT: u32 = 22;

/// Resolve the shard that owns `entity_id` out of `total_shards`.
///
/// Pure: the same inputs always give the same shard, and the result is always
/// below `total_shards`.
pub fn shard_for_entity(entity_id: u64, total_shards: u32) -> Result<u32> {
    if total_shards == 0 {
        return Err(SyncError::NotConfigured);
    }
    let shard = (entity_id >> SHARD_SHIFT) % u64::from(total_shards);
    // shard < total_shards, which fits in u32
    Ok(u32::try_from(shard).unwrap_or_default())
}

/// Build an entity id that resolves to `shard` for any total above `shard`.
///
/// Useful for tests and the console when checking a specific shard.
pub fn entity_for_shard(shard: u32) -> u64 {
    u64::from(shard) << SHARD_SHIFT
}
