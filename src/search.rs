//! Paginated search aggregation.
//!
//! The select endpoint serves results in pages. Aggregation fetches page
//! zero first to learn the total, then fans out over the remaining pages
//! with bounded concurrency. Any page that still fails after retries
//! aborts the whole search; a partial result set would silently bias
//! whatever analysis runs on it.

use std::cmp::Ordering;
use std::collections::HashSet;

use futures::StreamExt;
use futures::stream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::{ArchiveClient, SelectPage};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::clean_value;
use crate::query::{Query, SortSpec};
use crate::retry::fetch_with_retry;
use crate::types::{Event, NeuronId, NeuronRecord};

/// Collects every record matching a query across all result pages.
pub struct SearchAggregator {
    client: ArchiveClient,
    page_size: u32,
    concurrency: usize,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl SearchAggregator {
    /// Creates an aggregator using the page size and concurrency from
    /// `config`.
    pub fn new(client: ArchiveClient, config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self {
            client,
            page_size: config.page_size,
            concurrency: config.search_concurrency,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Routes progress events through `event_tx` instead of the
    /// aggregator's own channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = event_tx;
        self
    }

    /// Ties the aggregator to an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribes to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Runs the full aggregation for `query`.
    ///
    /// Returns the de-duplicated records from every page, in page order,
    /// client-side sorted when the query asks for it. The page plan is
    /// fixed by the total reported on page zero; if later pages report a
    /// different total the archive changed under us, which is logged and
    /// the original plan kept.
    pub async fn run(&self, query: &Query) -> Result<Vec<NeuronRecord>> {
        let q = query.to_query_string();
        let q = q.as_deref();

        let first = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            result = self.fetch_page(q, 0) => result.map_err(|e| Error::SearchFailed {
                page: 0,
                source: Box::new(e),
            })?,
        };

        let total = first.total;
        let pages = u32::try_from(total.div_ceil(u64::from(self.page_size))).unwrap_or(u32::MAX);
        self.emit(Event::SearchStarted { total, pages });
        self.emit(Event::PageFetched {
            page: 0,
            records: first.records.len(),
        });
        tracing::info!(total, pages, "Search matched records");

        let mut fetched: Vec<(u32, SelectPage)> = vec![(0, first)];
        if pages > 1 {
            let results: Vec<(u32, Result<SelectPage>)> = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                results = stream::iter(1..pages)
                    .map(|page| async move { (page, self.fetch_page(q, page).await) })
                    .buffer_unordered(self.concurrency)
                    .collect::<Vec<_>>() => results,
            };

            let mut failure: Option<(u32, Error)> = None;
            for (page, result) in results {
                match result {
                    Ok(select) => {
                        self.emit(Event::PageFetched {
                            page,
                            records: select.records.len(),
                        });
                        if select.total != total {
                            tracing::warn!(
                                initial_total = total,
                                later_total = select.total,
                                page,
                                "Result count changed while paging; keeping the initial page plan"
                            );
                        }
                        fetched.push((page, select));
                    }
                    Err(e) => {
                        // Report the lowest failing page deterministically
                        if failure.as_ref().is_none_or(|(p, _)| page < *p) {
                            failure = Some((page, e));
                        }
                    }
                }
            }

            if let Some((page, cause)) = failure {
                return Err(Error::SearchFailed {
                    page,
                    source: Box::new(cause),
                });
            }
        }

        fetched.sort_by_key(|(page, _)| *page);

        // Size by what the pages actually carried, not the remote's claim
        let fetched_count: usize = fetched.iter().map(|(_, s)| s.records.len()).sum();
        let mut seen: HashSet<NeuronId> = HashSet::with_capacity(fetched_count);
        let mut records: Vec<NeuronRecord> = Vec::with_capacity(fetched_count);
        let mut duplicates = 0usize;
        for (_, select) in fetched {
            for record in select.records {
                if seen.insert(record.id) {
                    records.push(record);
                } else {
                    duplicates += 1;
                }
            }
        }
        if duplicates > 0 {
            tracing::debug!(duplicates, "Dropped records repeated across pages");
        }

        if let Some(sort) = &query.sort {
            sort_records(&mut records, sort);
        }

        self.emit(Event::SearchCompleted {
            records: records.len(),
        });
        Ok(records)
    }

    async fn fetch_page(&self, q: Option<&str>, page: u32) -> Result<SelectPage> {
        fetch_with_retry(self.client.retry_config(), || {
            self.client.select_page(q, page, self.page_size)
        })
        .await
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Stable client-side sort on a cleaned attribute value.
///
/// The archive's own sort support is spotty across fields, so ordering is
/// always applied here. Records missing the sort attribute go last in
/// either direction; ties keep their page order.
fn sort_records(records: &mut [NeuronRecord], sort: &SortSpec) {
    records.sort_by(|a, b| {
        let left = a.attribute(&sort.field).map(clean_value);
        let right = b.attribute(&sort.field).map(clean_value);
        match (left, right) {
            (Some(x), Some(y)) => {
                let ordering = x.cmp(&y);
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}
