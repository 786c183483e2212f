//! Exchange calendar source.

use std::collections::HashSet;

use calsync_core::SyncWindow;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, SourceCalendar};
use crate::raw_event::RawEvent;

use super::client::ExchangeClient;
use super::config::ExchangeConfig;
use super::xml::{
    ItemId, find_item_body, get_item_body, parse_find_item_response, parse_get_item_response,
};

/// Reads calendar occurrences from an Exchange mailbox over EWS.
pub struct ExchangeCalendar {
    client: Mutex<ExchangeClient>,
    config: ExchangeConfig,
}

impl ExchangeCalendar {
    /// Creates a new Exchange source with the given configuration.
    pub fn new(config: ExchangeConfig) -> ProviderResult<Self> {
        let client = ExchangeClient::new(config.clone())?;
        Ok(Self {
            client: Mutex::new(client),
            config,
        })
    }

    /// Collects the ids of every occurrence in the window.
    ///
    /// A calendar view returns at most `page_size` items. When the server
    /// reports more, the next page starts at the last item seen and items
    /// already collected are skipped. A page that is not the last one but
    /// adds nothing is an error: at least `page_size` occurrences share
    /// one start.
    async fn find_items(&self, window: &SyncWindow) -> ProviderResult<Vec<ItemId>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page_start = window.start;

        loop {
            let body = find_item_body(page_start, window.end, self.config.page_size)?;
            let response = {
                let mut client = self.client.lock().await;
                client.call("FindItem", &body).await?
            };
            let page = parse_find_item_response(&response)?;

            let mut added = 0;
            let mut last_start = None;
            for (id, start) in page.items {
                if seen.insert(id.id.clone()) {
                    ids.push(id);
                    added += 1;
                }
                last_start = start.or(last_start);
            }

            debug!(
                start = %page_start,
                added,
                last = page.includes_last_item,
                "FindItem page"
            );

            if page.includes_last_item {
                break;
            }
            // An incomplete list would read as deletions downstream.
            match last_start {
                Some(start) if added > 0 => page_start = start.max(page_start),
                _ => {
                    return Err(ProviderError::invalid_response(format!(
                        "CalendarView paging made no progress past {}; raise page_size",
                        page_start
                    )));
                }
            }
        }

        Ok(ids)
    }

    async fn get_items(&self, ids: &[ItemId]) -> ProviderResult<Vec<RawEvent>> {
        let mut events = Vec::with_capacity(ids.len());
        for batch in ids.chunks(self.config.batch_size) {
            let body = get_item_body(batch)?;
            let response = {
                let mut client = self.client.lock().await;
                client.call("GetItem", &body).await?
            };
            events.extend(parse_get_item_response(&response)?);
        }
        Ok(events)
    }

    async fn fetch(&self, window: &SyncWindow) -> ProviderResult<Vec<RawEvent>> {
        let ids = self.find_items(window).await?;
        let mut events = self.get_items(&ids).await?;

        let total = events.len();
        events.retain(|event| {
            if event.cancelled {
                debug!(event = %event.id, "skipping cancelled occurrence");
            }
            !event.cancelled
        });

        info!(
            url = %self.config.url_str(),
            events = events.len(),
            cancelled = total - events.len(),
            "Fetched Exchange events"
        );
        Ok(events)
    }
}

impl SourceCalendar for ExchangeCalendar {
    fn name(&self) -> &str {
        "exchange"
    }

    fn list_events<'a>(
        &'a self,
        window: &'a SyncWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>> {
        Box::pin(async move {
            self.fetch(window)
                .await
                .map_err(|e| e.with_provider("exchange"))
        })
    }
}
