//! End-to-end analysis scenarios against a scripted model backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use oncolit_analysis::{
    AnalysisErrorKind, Analyzer, BatchOptions, BatchStrategy, Confidence, Role,
};
use oncolit_ingestion::Article;
use oncolit_llm::ScriptedBackend;
use serde_json::json;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const GENE: &str = "Gene X";

fn article(pmid: &str, abstract_text: &str) -> Article {
    Article {
        pmid: pmid.to_string(),
        title: format!("Article {pmid}"),
        abstract_text: abstract_text.to_string(),
        publication_date: "2022-06-01".to_string(),
        ..Default::default()
    }
}

fn reply(cancer: &str, role: &str, confidence: &str) -> String {
    json!({
        "cancers": [{
            "type": cancer,
            "role": role,
            "evidence_mentioned": ["deletion"],
            "confidence": "high",
            "quote_from_abstract": "deletion promotes tumor growth"
        }],
        "study_types": {"clinical": false, "clinical_description": null,
                        "basic": true, "basic_description": "cell lines"},
        "mechanisms": {"tumor_suppressor_mechanisms": ["deletion"], "oncogenic_mechanisms": [],
                       "mutations_described": false, "mutation_details": null},
        "confidence": confidence,
        "reasoning": "Abstract states deletion promotes growth",
        "ambiguities": null,
        "needs_full_text": false
    })
    .to_string()
}

fn analyzer(backend: ScriptedBackend) -> Analyzer {
    Analyzer::new(Arc::new(backend))
}

#[tokio::test]
async fn test_valid_reply_classifies_tumor_suppressor() {
    let backend = ScriptedBackend::new(reply("breast cancer", "tumor_suppressor", "high"));
    let item = analyzer(backend)
        .analyze(&article("1", "Gene X deletion promotes tumor growth in breast cancer"), GENE)
        .await
        .unwrap();

    assert_eq!(item.analysis.cancers.len(), 1);
    assert_eq!(item.analysis.cancers[0].cancer_type, "breast cancer");
    assert_eq!(item.analysis.cancers[0].role, Role::TumorSuppressor);
    assert_eq!(item.year, "2022");
}

#[tokio::test]
async fn test_moderate_confidence_is_repaired_to_low() {
    let backend = ScriptedBackend::new(reply("breast cancer", "tumor_suppressor", "moderate"));
    let item = analyzer(backend)
        .analyze(&article("1", "Gene X deletion promotes tumor growth in breast cancer"), GENE)
        .await
        .unwrap();

    assert_eq!(item.analysis.confidence, Confidence::Low);
    assert_eq!(item.analysis.cancers[0].role, Role::TumorSuppressor);
}

#[tokio::test]
async fn test_prose_reply_fails_item_but_not_batch() {
    let backend = ScriptedBackend::new(reply("lung cancer", "oncogene", "medium"))
        .on("ITEM-2", "Gene X seems to be an oncogene in lung cancer.");
    let a = analyzer(backend);

    let err = a.analyze(&article("2", "ITEM-2 abstract"), GENE).await.unwrap_err();
    assert_eq!(err.kind(), AnalysisErrorKind::InvalidFormat);

    let articles = vec![
        article("1", "ITEM-1 abstract"),
        article("2", "ITEM-2 abstract"),
        article("3", "ITEM-3 abstract"),
    ];
    let results = a.batch_analyze(&articles, GENE, &BatchOptions::new(10)).await;
    let pmids: Vec<_> = results.iter().map(|r| r.pmid.as_str()).collect();
    assert_eq!(pmids, vec!["1", "3"]);
}

#[tokio::test]
async fn test_batch_of_three_with_bound_two_keeps_order() {
    let backend = ScriptedBackend::new(reply("glioma", "oncogene", "high"))
        .fail_on("ITEM-2", "upstream timeout")
        .with_delay(Duration::from_millis(5));
    let articles = vec![
        article("101", "ITEM-1 abstract"),
        article("102", "ITEM-2 abstract"),
        article("103", "ITEM-3 abstract"),
    ];

    for strategy in [BatchStrategy::Chunked, BatchStrategy::Windowed] {
        let options = BatchOptions::new(2).with_strategy(strategy);
        let results = analyzer(ScriptedBackend::new(reply("glioma", "oncogene", "high"))
            .fail_on("ITEM-2", "upstream timeout"))
            .batch_analyze(&articles, GENE, &options)
            .await;
        let pmids: Vec<_> = results.iter().map(|r| r.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["101", "103"], "{strategy}");
    }

    let run = analyzer(backend)
        .batch_analyze_run(&articles, GENE, &BatchOptions::new(2))
        .await;
    assert_eq!(run.requested(), 3);
    assert_eq!(run.succeeded(), 2);
    assert_eq!(run.failed_indices(), vec![1]);
}

#[tokio::test]
async fn test_failed_indices_are_skipped_in_order() {
    let mut backend = ScriptedBackend::new(reply("melanoma", "both", "medium"));
    for failing in [0, 3, 4, 8] {
        backend = backend.fail_on(format!("ITEM-{failing}-"), "boom");
    }
    let articles: Vec<_> = (0..10)
        .map(|i| article(&format!("{i}"), &format!("ITEM-{i}- abstract")))
        .collect();

    let run = analyzer(backend)
        .batch_analyze_run(&articles, GENE, &BatchOptions::new(3))
        .await;
    assert_eq!(run.failed_indices(), vec![0, 3, 4, 8]);

    let pmids: Vec<_> = run.into_successes().into_iter().map(|r| r.pmid).collect();
    assert_eq!(pmids, vec!["1", "2", "5", "6", "7", "9"]);
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let backend = Arc::new(
        ScriptedBackend::new(reply("colorectal cancer", "oncogene", "high"))
            .with_delay(Duration::from_millis(10)),
    );
    let a = Analyzer::new(backend.clone());
    let articles: Vec<_> = (0..12).map(|i| article(&i.to_string(), "abstract")).collect();

    for strategy in [BatchStrategy::Chunked, BatchStrategy::Windowed] {
        let results = a
            .batch_analyze(&articles, GENE, &BatchOptions::new(4).with_strategy(strategy))
            .await;
        assert_eq!(results.len(), 12);
    }
    assert_eq!(backend.calls(), 24);
    assert!(backend.peak_in_flight() <= 4, "peak {}", backend.peak_in_flight());
    assert!(backend.peak_in_flight() >= 2);
}

/// Records the backend call count each time the batch logs an item failure.
struct FailureLog {
    backend: Arc<ScriptedBackend>,
    calls_at_failure: Arc<Mutex<Vec<usize>>>,
}

impl<S: tracing::Subscriber> Layer<S> for FailureLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == tracing::Level::ERROR && meta.target() == "oncolit_analysis::batch" {
            self.calls_at_failure.lock().unwrap().push(self.backend.calls());
        }
    }
}

#[tokio::test]
async fn test_failures_are_logged_as_items_finish() {
    let backend = Arc::new(
        ScriptedBackend::new(reply("glioma", "oncogene", "high"))
            .fail_on("ITEM-0-", "boom")
            .fail_on("ITEM-2-", "boom"),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let layer = FailureLog { backend: backend.clone(), calls_at_failure: seen.clone() };
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));

    let articles: Vec<_> = (0..4)
        .map(|i| article(&i.to_string(), &format!("ITEM-{i}- abstract")))
        .collect();
    let run = Analyzer::new(backend.clone())
        .batch_analyze_run(&articles, GENE, &BatchOptions::new(1))
        .await;

    assert_eq!(run.failed_indices(), vec![0, 2]);
    // One item at a time: each failure is logged before the next call starts.
    assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
}
