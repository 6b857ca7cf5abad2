use std::time::Duration;
use uuid::Uuid;

use super::{error::StoreError, schema::EntityFamily, store::ErasureTransaction};

pub const DEFAULT_BATCH_SIZE: u64 = 1000;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// BatchPolicy
///
/// How many rows one delete call may remove, and how long to pause before the
/// next call on the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_size: u64,
    pub pause: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pause: DEFAULT_BATCH_DELAY,
        }
    }
}

/// purge_family
///
/// Removes every row of `family` owned by the user, `batch_size` rows at a
/// time, and returns the total removed.
///
/// Stops only once a call removes fewer rows than the batch size: a full batch
/// always triggers one more call, so a family holding an exact multiple of the
/// batch size ends with a confirming call that removes nothing.
pub async fn purge_family(
    tx: &mut dyn ErasureTransaction,
    family: EntityFamily,
    user_id: Uuid,
    policy: &BatchPolicy,
) -> Result<u64, StoreError> {
    let batch_size = policy.batch_size.max(1);
    let mut total = 0u64;
    let mut batches = 0u32;

    loop {
        let removed = tx.delete_batch(family, user_id, batch_size).await?;
        total += removed;
        batches += 1;

        if removed < batch_size {
            break;
        }

        // Lets concurrent readers in between batches on the same table.
        if !policy.pause.is_zero() {
            tokio::time::sleep(policy.pause).await;
        }
    }

    tracing::debug!(
        user_id = %user_id,
        family = family.name(),
        removed = total,
        batches,
        "family purged"
    );
    Ok(total)
}
