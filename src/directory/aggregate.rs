//! Concurrent fan-out across all directory sources, merged into one set.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::{DirectoryError, Endpoint, EndpointSource};
use crate::transport::error_chain;

/// Fans one fetch out per configured source and merges the results.
///
/// Every fetch runs to completion before the merge starts. A failing source
/// is logged and skipped; only a run where every source fails is an error.
pub struct DirectoryAggregator {
    fetcher: Arc<dyn EndpointSource>,
    sources: Vec<String>,
}

impl DirectoryAggregator {
    pub fn new(fetcher: Arc<dyn EndpointSource>, sources: Vec<String>) -> Self {
        Self { fetcher, sources }
    }

    /// Fetch every source concurrently and return the deduplicated union.
    ///
    /// Duplicates are collapsed on `(hostname, base_url)`; the copy from the
    /// earliest source in the configured order survives.
    pub async fn aggregate(&self) -> Result<Vec<Endpoint>, DirectoryError> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|url| {
                let fetcher = self.fetcher.clone();
                tokio::spawn(async move {
                    let result = fetcher.fetch_endpoints(&url).await;
                    (url, result)
                })
            })
            .collect();

        // join_all keeps source order regardless of completion order.
        let outcomes = join_all(handles).await;

        let mut failures = Vec::new();
        let mut per_source = Vec::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok((_, Ok(endpoints))) => per_source.push(endpoints),
                Ok((url, Err(e))) => {
                    let error = error_chain(&e);
                    warn!(%url, %error, "Directory source failed, continuing without it");
                    failures.push(error);
                }
                Err(join_err) => {
                    let url = &self.sources[idx];
                    warn!(%url, error = %join_err, "Directory fetch task aborted");
                    failures.push(format!("{}: {}", url, join_err));
                }
            }
        }

        if per_source.is_empty() {
            return Err(DirectoryError::AllSourcesFailed {
                attempted: self.sources.len(),
                failures,
            });
        }

        let merged = merge_unique(per_source);
        info!(
            sources = self.sources.len(),
            failed = failures.len(),
            endpoints = merged.len(),
            "Endpoint discovery complete"
        );
        Ok(merged)
    }
}

/// Concatenate lists in order, dropping any endpoint whose identity was already seen.
pub fn merge_unique(lists: Vec<Vec<Endpoint>>) -> Vec<Endpoint> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut merged = Vec::new();
    for endpoint in lists.into_iter().flatten() {
        let (host, url) = endpoint.identity();
        if seen.insert((host.to_owned(), url.to_owned())) {
            merged.push(endpoint);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::endpoint;
    use crate::transport::TransportError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Canned {
        Ok(Vec<Endpoint>, Duration),
        Fail,
    }

    struct FakeSource {
        replies: HashMap<String, Canned>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(replies: Vec<(&str, Canned)>) -> Arc<Self> {
            Arc::new(Self {
                replies: replies
                    .into_iter()
                    .map(|(u, c)| (u.to_string(), c))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl EndpointSource for FakeSource {
        async fn fetch_endpoints(&self, url: &str) -> Result<Vec<Endpoint>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(url) {
                Some(Canned::Ok(eps, delay)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(eps.clone())
                }
                _ => Err(DirectoryError::Network {
                    url: url.to_string(),
                    source: TransportError::Timeout {
                        url: url.to_string(),
                    },
                }),
            }
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_duplicates_collapse_first_source_wins() {
        let mut a = endpoint(1, "shared:8080", 10.0, 10.0);
        a.display_name = "from-a".into();
        let mut b = endpoint(42, "shared:8080", 10.0, 10.0);
        b.display_name = "from-b".into();

        let only_a = endpoint(2, "only-a:8080", 1.0, 1.0);
        let only_b = endpoint(3, "only-b:8080", 2.0, 2.0);
        let fake = FakeSource::new(vec![
            ("http://a", Canned::Ok(vec![a, only_a], Duration::from_millis(50))),
            ("http://b", Canned::Ok(vec![b, only_b], Duration::ZERO)),
        ]);
        let agg = DirectoryAggregator::new(fake, urls(&["http://a", "http://b"]));
        let merged = agg.aggregate().await.unwrap();

        let shared: Vec<_> = merged.iter().filter(|e| e.hostname == "shared:8080").collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, 1);
        assert_eq!(shared[0].display_name, "from-a");
        assert_eq!(merged.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_run_concurrently_and_all_complete() {
        let delayed = |id, host, ms| {
            Canned::Ok(vec![endpoint(id, host, 0.0, 0.0)], Duration::from_millis(ms))
        };
        let fake = FakeSource::new(vec![
            ("http://slow", delayed(1, "slow:1", 900)),
            ("http://mid", delayed(2, "mid:1", 500)),
            ("http://fast", delayed(3, "fast:1", 100)),
        ]);
        let sources = urls(&["http://slow", "http://mid", "http://fast"]);
        let agg = DirectoryAggregator::new(fake.clone(), sources);

        let start = tokio::time::Instant::now();
        let merged = agg.aggregate().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
        assert_eq!(merged.len(), 3);
        // max(delays), not the sum
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
        // source order, not completion order
        assert_eq!(merged[0].hostname, "slow:1");
        assert_eq!(merged[2].hostname, "fast:1");
    }

    #[tokio::test]
    async fn test_one_failing_source_is_tolerated() {
        let fake = FakeSource::new(vec![
            ("http://ok", Canned::Ok(vec![endpoint(1, "a:1", 0.0, 0.0)], Duration::ZERO)),
            ("http://down", Canned::Fail),
        ]);
        let agg = DirectoryAggregator::new(fake, urls(&["http://down", "http://ok"]));
        let merged = agg.aggregate().await.unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_sources_is_error() {
        let fake = FakeSource::new(vec![("http://x", Canned::Fail), ("http://y", Canned::Fail)]);
        let agg = DirectoryAggregator::new(fake.clone(), urls(&["http://x", "http://y"]));
        match agg.aggregate().await {
            Err(DirectoryError::AllSourcesFailed { attempted, failures }) => {
                assert_eq!(attempted, 2);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0], "fetching http://x failed: request to http://x timed out");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_sources_is_error() {
        let fake = FakeSource::new(vec![]);
        let agg = DirectoryAggregator::new(fake, Vec::new());
        assert!(matches!(
            agg.aggregate().await,
            Err(DirectoryError::AllSourcesFailed { attempted: 0, .. })
        ));
    }

    #[test]
    fn test_merge_unique_keys_on_host_and_url() {
        let a = endpoint(1, "h:1", 0.0, 0.0);
        let mut same_host_other_url = endpoint(1, "h:1", 0.0, 0.0);
        same_host_other_url.base_url = "https://h:1/speedtest/upload.php".into();
        let merged = merge_unique(vec![vec![a.clone()], vec![a, same_host_other_url]]);
        assert_eq!(merged.len(), 2);
    }
}
