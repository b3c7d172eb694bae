use crate::{
    cache::OpinionCache,
    collectors::{CollectTarget, Collector},
    error::CollectorError,
    normalizer::NormalizedDomain,
    types::{SignalOpinion, SimilarityFinding},
};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Fans one analysis out to every enabled collector.
///
/// Each collector runs as its own task with its own time budget. The result
/// always holds exactly one opinion per collector, in registration order;
/// collectors that time out or error are represented by failed opinions.
pub struct SignalOrchestrator {
    collectors: Vec<Arc<dyn Collector>>,
    cache: OpinionCache,
    budget: Duration,
}

impl SignalOrchestrator {
    pub fn new(collectors: Vec<Arc<dyn Collector>>, cache: OpinionCache, budget: Duration) -> Self {
        Self {
            collectors,
            cache,
            budget,
        }
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    pub fn cache(&self) -> &OpinionCache {
        &self.cache
    }

    pub async fn gather(
        &self,
        domain: &NormalizedDomain,
        findings: &[SimilarityFinding],
    ) -> Vec<SignalOpinion> {
        let target = Arc::new(CollectTarget {
            domain: domain.clone(),
            findings: findings.to_vec(),
            budget: self.budget,
        });

        let runs = self.collectors.iter().map(|collector| {
            run_collector(
                Arc::clone(collector),
                Arc::clone(&target),
                self.cache.clone(),
                self.budget,
            )
        });

        join_all(runs).await
    }
}

async fn run_collector(
    collector: Arc<dyn Collector>,
    target: Arc<CollectTarget>,
    cache: OpinionCache,
    budget: Duration,
) -> SignalOpinion {
    let source = collector.source();
    let domain = target.domain.canonical.clone();

    if let Some(cached) = cache.get(source, &domain).await {
        debug!("Cache hit for {} opinion on {}", source, domain);
        metrics::counter!("collector_cache_hits_total", "source" => source.as_str()).increment(1);
        return cached;
    }

    let mut task = tokio::spawn(async move { collector.collect(&target).await });

    let outcome = match tokio::time::timeout(budget, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(CollectorError::Panicked(join_error.to_string())),
        Err(_) => {
            // Late results are discarded.
            task.abort();
            Err(CollectorError::Timeout(budget))
        }
    };

    match outcome {
        Ok(opinion) => {
            debug!(
                "{} opinion for {}: {} (confidence {:.2})",
                source, domain, opinion.level, opinion.confidence
            );
            cache.insert(&domain, &opinion).await;
            opinion
        }
        Err(e) => {
            warn!("{} collector failed for {}: {}", source, domain, e);
            metrics::counter!("collector_failures_total", "source" => source.as_str()).increment(1);
            SignalOpinion::failed(source, format!("{} signal unavailable: {}", source, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        normalizer::normalize,
        types::{SignalSource, ThreatLevel},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        source: SignalSource,
        level: ThreatLevel,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(source: SignalSource, level: ThreatLevel, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                source,
                level,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Collector for Fixed {
        fn source(&self) -> SignalSource {
            self.source
        }

        async fn collect(&self, _target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(SignalOpinion::new(self.source, self.level, 0.8))
        }
    }

    struct Broken;

    #[async_trait]
    impl Collector for Broken {
        fn source(&self) -> SignalSource {
            SignalSource::ScanEngine
        }

        async fn collect(&self, _target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
            Err(CollectorError::Status(503))
        }
    }

    struct Panicky;

    #[async_trait]
    impl Collector for Panicky {
        fn source(&self) -> SignalSource {
            SignalSource::DomainAge
        }

        async fn collect(&self, _target: &CollectTarget) -> Result<SignalOpinion, CollectorError> {
            panic!("collector bug");
        }
    }

    fn cache() -> OpinionCache {
        OpinionCache::new(Duration::from_secs(60), 1000)
    }

    #[tokio::test]
    async fn one_opinion_per_collector_in_order() {
        let orchestrator = SignalOrchestrator::new(
            vec![
                Fixed::new(SignalSource::AiJudgment, ThreatLevel::High, Duration::ZERO),
                Arc::new(Broken),
                Fixed::new(SignalSource::Reputation, ThreatLevel::Safe, Duration::ZERO),
                Arc::new(Panicky),
            ],
            cache(),
            Duration::from_millis(500),
        );

        let domain = normalize("example.com").unwrap();
        let opinions = orchestrator.gather(&domain, &[]).await;

        let sources: Vec<SignalSource> = opinions.iter().map(|o| o.source).collect();
        assert_eq!(
            sources,
            vec![
                SignalSource::AiJudgment,
                SignalSource::ScanEngine,
                SignalSource::Reputation,
                SignalSource::DomainAge
            ]
        );
        assert!(!opinions[0].failed);
        assert!(opinions[1].failed);
        assert!(opinions[1].reasons[0].contains("503"));
        assert!(!opinions[2].failed);
        assert!(opinions[3].failed);
    }

    #[tokio::test]
    async fn slow_collector_times_out_without_blocking_others() {
        let fast = Fixed::new(SignalSource::Reputation, ThreatLevel::Low, Duration::from_millis(10));
        let slow = Fixed::new(SignalSource::AiJudgment, ThreatLevel::High, Duration::from_secs(30));
        let orchestrator = SignalOrchestrator::new(
            vec![fast, slow],
            cache(),
            Duration::from_millis(100),
        );

        let started = std::time::Instant::now();
        let opinions = orchestrator.gather(&normalize("example.com").unwrap(), &[]).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!opinions[0].failed);
        assert_eq!(opinions[0].level, ThreatLevel::Low);
        assert!(opinions[1].failed);
        assert_eq!(opinions[1].level, ThreatLevel::Unknown);
        assert!(opinions[1].reasons[0].contains("timed out"));
    }

    #[tokio::test]
    async fn waits_for_every_collector_within_budget() {
        let quick = Fixed::new(SignalSource::Reputation, ThreatLevel::Safe, Duration::ZERO);
        let later = Fixed::new(SignalSource::DomainAge, ThreatLevel::Medium, Duration::from_millis(80));
        let orchestrator = SignalOrchestrator::new(
            vec![quick, later],
            cache(),
            Duration::from_millis(1000),
        );

        let opinions = orchestrator.gather(&normalize("example.com").unwrap(), &[]).await;
        assert!(opinions.iter().all(|o| !o.failed));
        assert_eq!(opinions[1].level, ThreatLevel::Medium);
    }

    #[tokio::test]
    async fn cached_opinions_skip_the_collector() {
        let collector = Fixed::new(SignalSource::Reputation, ThreatLevel::High, Duration::ZERO);
        let orchestrator = SignalOrchestrator::new(
            vec![collector.clone()],
            cache(),
            Duration::from_millis(500),
        );
        let domain = normalize("https://evil.example/login").unwrap();

        let first = orchestrator.gather(&domain, &[]).await;
        let second = orchestrator.gather(&normalize("EVIL.example").unwrap(), &[]).await;

        assert_eq!(first, second);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_retried_on_next_analysis() {
        let slow = Fixed::new(SignalSource::AiJudgment, ThreatLevel::High, Duration::from_secs(30));
        let orchestrator = SignalOrchestrator::new(
            vec![slow.clone()],
            cache(),
            Duration::from_millis(20),
        );
        let domain = normalize("example.com").unwrap();

        orchestrator.gather(&domain, &[]).await;
        orchestrator.gather(&domain, &[]).await;

        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_collectors_yields_no_opinions() {
        let orchestrator = SignalOrchestrator::new(Vec::new(), cache(), Duration::from_millis(10));
        assert!(orchestrator
            .gather(&normalize("example.com").unwrap(), &[])
            .await
            .is_empty());
    }
}
