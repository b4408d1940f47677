// Pages through the trending query until the server runs dry
use tracing::{debug, info};

use crate::{
    models::Change,
    source::{ChangeSource, TrendingQuery},
    Result,
};

/// Fetch every change matching `query`
///
/// Pages are requested one after another starting at offset 0; a page shorter
/// than `page_size` is the last one. Any failing page (or malformed change)
/// aborts the whole fetch and nothing gathered so far is returned.
pub async fn fetch_all(source: &dyn ChangeSource, query: &TrendingQuery) -> Result<Vec<Change>> {
    let expression = query.expression();
    let mut changes: Vec<Change> = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = source
            .fetch_page(&expression, query.page_size, offset)
            .await?;
        let page_len = page.len();
        debug!("Fetched {} changes at offset {}", page_len, offset);

        for change in &page {
            change.validate()?;
        }
        changes.extend(page);

        if page_len < query.page_size as usize {
            break;
        }
        offset += query.page_size;
    }

    info!("Fetched {} candidate changes for '{}'", changes.len(), expression);
    Ok(changes)
}
