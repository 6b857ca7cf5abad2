use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    schema::{PREVIEW_FAMILIES, USER_FAMILY},
    store::ErasureStore,
};
use crate::models::ErasurePreview;

/// report
///
/// Best-effort counts of what erasing the user would remove. Each family is
/// counted by its own query; one that fails is logged and listed under
/// `unavailable` while the rest are still reported. Never mutates state.
pub async fn report(store: &dyn ErasureStore, user_id: Uuid) -> ErasurePreview {
    let mut unavailable = Vec::new();

    let user_exists = match store.user_exists(user_id).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "preview: user lookup failed");
            unavailable.push(USER_FAMILY.to_string());
            false
        }
    };

    // Nothing to count for an account that is known to be gone.
    if !user_exists && unavailable.is_empty() {
        return ErasurePreview {
            user_id,
            user_exists,
            counts: BTreeMap::new(),
            unavailable,
        };
    }

    let mut counts = BTreeMap::new();
    for family in PREVIEW_FAMILIES {
        match store.count(family, user_id).await {
            Ok(count) => {
                counts.insert(family.name().to_string(), count);
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    family = family.name(),
                    error = %e,
                    "preview: count failed"
                );
                unavailable.push(family.name().to_string());
            }
        }
    }

    ErasurePreview {
        user_id,
        user_exists,
        counts,
        unavailable,
    }
}
