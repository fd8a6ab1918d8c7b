//! Callback-style iteration over every matching condition

use crate::service::ConditionService;
use condnum_core::{ConditionId, ConditionResult};

/// Feed every id matched by `(key, value)` to `consumer`, one page at a time
///
/// Pages of `page_size` ids are requested in order, each starting after the
/// last id of the previous page. Iteration ends on a short page, or early with
/// the first error from the service or the consumer. Returns the number of ids
/// consumed. A zero `page_size` consumes nothing.
pub async fn search_all<F>(
    service: &dyn ConditionService,
    key: &str,
    value: f64,
    page_size: u32,
    mut consumer: F,
) -> ConditionResult<u64>
where
    F: FnMut(ConditionId) -> ConditionResult<()>,
{
    if page_size == 0 {
        return Ok(0);
    }

    let mut consumed = 0u64;
    let mut cursor = None;
    loop {
        let page = service.search_page(key, value, page_size, cursor).await?;
        for id in &page {
            consumer(*id)?;
            consumed += 1;
        }
        if page.len() < page_size as usize {
            return Ok(consumed);
        }
        cursor = page.last().copied();
    }
}
