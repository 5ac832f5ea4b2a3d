//! Weighted fair scheduling across queue classes.

use imagepp_core::envelope::QueueClass;
use rand::Rng;

use crate::{ClaimedTask, QueueError, TaskQueue};

/// Order in which to poll the queue classes for one claim.
///
/// The first class is drawn with probability proportional to its weight
/// (critical 6, default 3, low 1). The others follow, heaviest first, so a
/// worker never idles while any class has due work.
pub fn poll_order<R: Rng>(rng: &mut R) -> Vec<QueueClass> {
    let total: u32 = QueueClass::ALL.iter().map(|q| q.weight()).sum();
    let mut pick = rng.random_range(0..total);

    let mut first = QueueClass::ALL[0];
    for class in QueueClass::ALL {
        if pick < class.weight() {
            first = class;
            break;
        }
        pick -= class.weight();
    }

    let mut order = Vec::with_capacity(QueueClass::ALL.len());
    order.push(first);
    order.extend(QueueClass::ALL.into_iter().filter(|q| *q != first));
    order
}

/// Claim one task, visiting queue classes in weighted order.
pub async fn claim_weighted(queue: &dyn TaskQueue) -> Result<Option<ClaimedTask>, QueueError> {
    let order = poll_order(&mut rand::rng());
    for class in order {
        if let Some(task) = queue.claim(class).await? {
            return Ok(Some(task));
        }
    }
    Ok(None)
}
