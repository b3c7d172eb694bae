use crate::{
    aggregator::ScoreAggregator,
    brands::BrandRegistry,
    cache::OpinionCache,
    collectors::{
        AiJudgmentCollector, Collector, DomainAgeCollector, ReputationCollector, ScanEngineCollector,
    },
    config::Config,
    error::AppError,
    normalizer::{normalize, NormalizedDomain},
    orchestrator::SignalOrchestrator,
    similarity::SimilarityMatcher,
    types::{SignalSource, Verdict},
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

pub struct ThreatEngine {
    matcher: SimilarityMatcher,
    orchestrator: SignalOrchestrator,
    aggregator: ScoreAggregator,
}

impl ThreatEngine {
    pub fn new(
        matcher: SimilarityMatcher,
        orchestrator: SignalOrchestrator,
        aggregator: ScoreAggregator,
    ) -> Self {
        Self {
            matcher,
            orchestrator,
            aggregator,
        }
    }

    /// Builds the engine from configuration. Collectors that are disabled or
    /// lack credentials are left out; the engine works with any subset.
    pub fn from_config(config: &Config) -> Self {
        info!("Initializing Threat Engine...");

        let registry = Arc::new(BrandRegistry::load(config.brands_path.as_deref()));
        info!("Brand registry loaded with {} brands", registry.entries().len());

        let collectors = build_collectors(config);
        info!(
            "{} signal collectors enabled: {}",
            collectors.len(),
            collectors
                .iter()
                .map(|c| c.source().as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let cache = OpinionCache::new(config.cache_ttl(), config.cache_max_entries);
        let orchestrator = SignalOrchestrator::new(collectors, cache, config.collector_timeout());

        info!("Threat Engine initialized successfully");

        Self::new(
            SimilarityMatcher::new(registry),
            orchestrator,
            ScoreAggregator::default(),
        )
    }

    /// Engine over the built-in brand registry and the given collectors.
    pub fn with_collectors(collectors: Vec<Arc<dyn Collector>>, budget: Duration) -> Self {
        Self::new(
            SimilarityMatcher::new(Arc::new(BrandRegistry::builtin())),
            SignalOrchestrator::new(collectors, OpinionCache::new(Duration::from_secs(3600), 10_000), budget),
            ScoreAggregator::default(),
        )
    }

    pub fn collector_count(&self) -> usize {
        self.orchestrator.collector_count()
    }

    /// Analyzes a domain, URL or free-text message. Only unparseable input is an error.
    pub async fn analyze(&self, input: &str) -> Result<Verdict, AppError> {
        self.analyze_input(input).await.map(|(_, verdict)| verdict)
    }

    /// Like [`analyze`](Self::analyze), also returning the domain that was extracted.
    pub async fn analyze_input(&self, input: &str) -> Result<(NormalizedDomain, Verdict), AppError> {
        let domain = normalize(input).map_err(|e| {
            metrics::counter!("invalid_inputs_total").increment(1);
            debug!("Rejected input: {}", e);
            e
        })?;

        let verdict = self.analyze_domain(&domain).await;
        Ok((domain, verdict))
    }

    pub async fn analyze_domain(&self, domain: &NormalizedDomain) -> Verdict {
        let start_time = Instant::now();

        let findings = self.matcher.find_similarities(domain);
        debug!("{} similarity findings for {}", findings.len(), domain.canonical);

        let opinions = self.orchestrator.gather(domain, &findings).await;
        let failed = opinions.iter().filter(|o| o.failed).count();
        if failed > 0 && failed == opinions.len() {
            warn!("Every signal collector failed for {}", domain.canonical);
        }

        let verdict = self.aggregator.aggregate(&opinions, &findings);

        let elapsed = start_time.elapsed();
        metrics::counter!("analyses_total").increment(1);
        metrics::histogram!("analysis_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
        metrics::counter!("verdicts_total", "level" => verdict.level.as_str()).increment(1);

        info!(
            "Verdict for {}: {} (score {:.2}, confidence {:.2}) in {:?}",
            domain.canonical, verdict.level, verdict.score, verdict.confidence, elapsed
        );

        verdict
    }
}

fn build_collectors(config: &Config) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();

    if config.ai_judgment.enabled {
        match AiJudgmentCollector::from_config(&config.ai_judgment) {
            Some(c) => collectors.push(Arc::new(c)),
            None => unavailable(SignalSource::AiJudgment, "no API key configured"),
        }
    }

    if config.reputation.enabled {
        collectors.push(Arc::new(ReputationCollector::from_config(&config.reputation)));
    }

    if config.scan_engine.enabled {
        match ScanEngineCollector::from_config(&config.scan_engine) {
            Some(c) => collectors.push(Arc::new(c)),
            None => unavailable(SignalSource::ScanEngine, "no API key configured"),
        }
    }

    if config.domain_age.enabled {
        collectors.push(Arc::new(DomainAgeCollector::from_config(&config.domain_age)));
    }

    collectors
}

fn unavailable(source: SignalSource, why: &str) {
    warn!("{} collector unavailable: {}", source, why);
}
