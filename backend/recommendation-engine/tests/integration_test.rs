use mockall::mock;
use recommendation_engine::models::{
    Candidate, CandidateSource, ItemRecord, RatingRecord, UserId, UserPreferences,
};
use recommendation_engine::services::events::RecommendationEvent;
use recommendation_engine::services::recall::StrategyContext;
use recommendation_engine::services::registry::strategy_factory;
use recommendation_engine::services::similarity::{Entity, SimilarityMetric};
use recommendation_engine::{
    ActivityRecorder, CatalogSource, EngineConfig, EventSink, InMemoryCatalog, RecommendError,
    RecommendOptions, RecommendationEngine, ScoringStrategy, Snapshot,
};
use std::collections::HashSet;
use std::sync::Arc;

mock! {
    pub Catalog {}

    impl CatalogSource for Catalog {
        fn load_ratings(&self) -> anyhow::Result<Vec<RatingRecord>>;
        fn load_items(&self) -> anyhow::Result<Vec<ItemRecord>>;
        fn load_user_preferences(&self, user_id: UserId) -> anyhow::Result<UserPreferences>;
    }
}

mock! {
    pub Sink {}

    impl EventSink for Sink {
        fn on_recommendations(&self, event: &RecommendationEvent);
    }
}

fn books() -> Vec<ItemRecord> {
    vec![
        ItemRecord::new(1, "Pride and Prejudice", "Romance", 4.2)
            .with_feature("genre", "romance")
            .with_feature("tags", vec!["classic", "love"]),
        ItemRecord::new(2, "To Kill a Mockingbird", "Classic", 4.5)
            .with_feature("genre", "drama")
            .with_feature("tags", vec!["classic"]),
        ItemRecord::new(3, "1984", "Dystopian", 4.3)
            .with_feature("genre", "dystopian")
            .with_feature("tags", vec!["classic", "politics"]),
        ItemRecord::new(4, "The Great Gatsby", "Classic", 4.0)
            .with_feature("genre", "drama")
            .with_feature("tags", vec!["classic", "love"]),
        ItemRecord::new(5, "The Hobbit", "Fantasy", 4.7)
            .with_feature("genre", "fantasy")
            .with_feature("tags", vec!["adventure"]),
    ]
}

fn ratings() -> Vec<RatingRecord> {
    vec![
        RatingRecord::new(1, 1, 5),
        RatingRecord::new(1, 2, 3),
        RatingRecord::new(1, 3, 1),
        RatingRecord::new(2, 1, 5),
        RatingRecord::new(2, 2, 3),
        RatingRecord::new(2, 3, 1),
        RatingRecord::new(2, 4, 4),
        RatingRecord::new(3, 1, 2),
        RatingRecord::new(3, 5, 5),
    ]
}

fn engine_over(ratings: Vec<RatingRecord>, items: Vec<ItemRecord>) -> RecommendationEngine {
    RecommendationEngine::new(
        Arc::new(InMemoryCatalog::new(ratings, items)),
        EngineConfig::default(),
    )
}

fn mock_catalog(ratings: Vec<RatingRecord>, items: Vec<ItemRecord>) -> MockCatalog {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_load_ratings()
        .returning(move || Ok(ratings.clone()));
    catalog
        .expect_load_items()
        .returning(move || Ok(items.clone()));
    catalog
        .expect_load_user_preferences()
        .returning(|_| Ok(UserPreferences::new()));
    catalog
}

#[test]
fn test_cold_start_books_scenario() {
    let engine = engine_over(Vec::new(), books());
    let recs = engine
        .recommend(7, "hybrid", 3, &RecommendOptions::default())
        .unwrap();

    let snapshot = engine.snapshot().unwrap();
    let names: Vec<_> = recs
        .iter()
        .map(|r| snapshot.item(r.item_id).unwrap().name.clone())
        .collect();
    assert_eq!(names, vec!["The Hobbit", "To Kill a Mockingbird", "1984"]);
    assert!(recs.iter().all(|r| r.source == CandidateSource::ColdStart));
    assert_eq!(
        recs.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_identical_raters_are_mutual_neighbors() {
    let snapshot = Snapshot::build(&ratings(), &books());
    let similarity = snapshot.similarity();

    let sim = similarity.user_similarity(1, 2, SimilarityMetric::Pearson);
    assert!((sim - 1.0).abs() < 1e-9);

    let of_one = similarity.neighbors(Entity::User(1), 1, SimilarityMetric::Pearson);
    let of_two = similarity.neighbors(Entity::User(2), 1, SimilarityMetric::Pearson);
    assert_eq!(of_one[0].id, 2);
    assert_eq!(of_two[0].id, 1);
}

#[test]
fn test_out_of_range_rating_reported_rest_ingested() {
    let mut rows = ratings();
    rows.push(RatingRecord::new(4, 2, 6));
    let snapshot = Snapshot::build(&rows, &books());

    assert_eq!(snapshot.diagnostics.len(), 1);
    assert_eq!(snapshot.diagnostics[0].index, rows.len() - 1);
    assert_eq!(snapshot.matrix.len(), ratings().len());
    assert!(snapshot.matrix.row(4).is_empty());
}

#[test]
fn test_recommendations_never_duplicate_or_overflow() {
    let engine = engine_over(ratings(), books());
    for lambda in [0.0, 0.4, 1.0] {
        let options = RecommendOptions::default().with_diversity(lambda);
        for strategy in ["collaborative", "content", "hybrid", "cold-start"] {
            for user in [1, 2, 3, 50] {
                for top_n in [1, 2, 5, 20] {
                    let recs = engine.recommend(user, strategy, top_n, &options).unwrap();
                    assert!(recs.len() <= top_n);
                    let unique: HashSet<_> = recs.iter().map(|r| r.item_id).collect();
                    assert_eq!(unique.len(), recs.len());
                    let ranks: Vec<_> = recs.iter().map(|r| r.rank).collect();
                    assert_eq!(ranks, (1..=recs.len()).collect::<Vec<_>>());
                }
            }
        }
    }
}

#[test]
fn test_collaborative_pick_is_explained_by_neighbor() {
    let engine = engine_over(ratings(), books());
    let recs = engine
        .recommend(1, "collaborative", 1, &RecommendOptions::default())
        .unwrap();

    assert_eq!(recs[0].item_id, 4);
    assert_eq!(recs[0].source, CandidateSource::Collaborative);
    assert_eq!(recs[0].explanation.evidence_ref.as_deref(), Some("user:2"));
}

#[test]
fn test_snapshot_reused_until_invalidated() {
    let engine = RecommendationEngine::new(
        Arc::new(mock_catalog(ratings(), books())),
        EngineConfig::default(),
    );

    let first = engine.snapshot().unwrap();
    engine
        .recommend(1, "hybrid", 3, &RecommendOptions::default())
        .unwrap();
    let second = engine.snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!second.similarity_cache().is_empty());

    engine.invalidate();
    let third = engine.snapshot().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(third.similarity_cache().is_empty());
}

#[test]
fn test_source_failure_surfaces_as_error() {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_load_ratings()
        .returning(|| Err(anyhow::anyhow!("connection refused")));
    catalog.expect_load_items().returning(|| Ok(Vec::new()));
    catalog
        .expect_load_user_preferences()
        .returning(|_| Ok(UserPreferences::new()));

    let engine = RecommendationEngine::new(Arc::new(catalog), EngineConfig::default());
    let err = engine
        .recommend(1, "hybrid", 3, &RecommendOptions::default())
        .unwrap_err();
    assert!(matches!(err, RecommendError::Source(_)));
}

#[test]
fn test_unknown_strategy_does_not_touch_source() {
    let mut catalog = MockCatalog::new();
    catalog.expect_load_ratings().never();
    catalog.expect_load_items().never();

    let engine = RecommendationEngine::new(Arc::new(catalog), EngineConfig::default());
    let err = engine
        .recommend(1, "deep-learning", 3, &RecommendOptions::default())
        .unwrap_err();

    match err {
        RecommendError::UnknownStrategy { available, .. } => {
            assert_eq!(available, "cold-start, collaborative, content-based, hybrid");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_sink_notified_once_per_request() {
    let mut sink = MockSink::new();
    sink.expect_on_recommendations()
        .withf(|event| event.user_id == 1 && event.strategy == "hybrid")
        .times(2)
        .return_const(());

    let mut engine = engine_over(ratings(), books());
    engine.subscribe(Arc::new(sink));

    for _ in 0..2 {
        engine
            .recommend(1, "hybrid", 2, &RecommendOptions::default())
            .unwrap();
    }
}

#[test]
fn test_activity_recorder_tracks_deliveries() {
    let recorder = Arc::new(ActivityRecorder::new());
    let mut engine = engine_over(ratings(), books());
    engine.subscribe(recorder.clone());

    let recs = engine
        .recommend(3, "content-based", 2, &RecommendOptions::default())
        .unwrap();

    let activities = recorder.get_user_activities(3, 10);
    assert_eq!(activities.len(), recs.len());
    assert!(activities
        .iter()
        .all(|a| recs.iter().any(|r| r.item_id == a.item_id)));
}

struct NewestFirst;

impl ScoringStrategy for NewestFirst {
    fn name(&self) -> &str {
        "newest"
    }

    fn source(&self) -> CandidateSource {
        CandidateSource::Content
    }

    fn score(&self, ctx: &StrategyContext<'_>, _user_id: UserId) -> Vec<Candidate> {
        let mut items: Vec<_> = ctx.snapshot.active_items().map(|i| i.item_id).collect();
        items.reverse();
        items
            .into_iter()
            .enumerate()
            .map(|(i, id)| Candidate::new(id, 1.0 / (i as f64 + 1.0), CandidateSource::Content))
            .collect()
    }
}

#[test]
fn test_custom_strategy_registration() {
    let mut engine = engine_over(Vec::new(), books());
    engine
        .register_strategy(
            "newest",
            "Highest ids first",
            strategy_factory(|_| Box::new(NewestFirst)),
        )
        .unwrap();

    assert!(engine.list_strategies().contains(&"newest".to_string()));
    assert_eq!(
        engine.strategy_descriptions().get("newest").map(String::as_str),
        Some("Highest ids first")
    );

    let recs = engine
        .recommend(1, "newest", 2, &RecommendOptions::default().with_min_result_threshold(0))
        .unwrap();
    assert_eq!(recs.iter().map(|r| r.item_id).collect::<Vec<_>>(), vec![5, 4]);

    let duplicate = engine.register_strategy(
        "collaborative",
        "again",
        strategy_factory(|_| Box::new(NewestFirst)),
    );
    assert!(matches!(duplicate, Err(RecommendError::DuplicateStrategy(_))));
}

#[test]
fn test_recommend_with_snapshot_is_pure() {
    let engine = engine_over(Vec::new(), Vec::new());
    let snapshot = Snapshot::build(&ratings(), &books());
    let prefs = UserPreferences::new().with("category", "fantasy");

    let first = engine
        .recommend_with_snapshot(&snapshot, &prefs, 9, "hybrid", 2, &RecommendOptions::default())
        .unwrap();
    let second = engine
        .recommend_with_snapshot(&snapshot, &prefs, 9, "hybrid", 2, &RecommendOptions::default())
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].item_id, 5);
}

#[tokio::test]
async fn test_concurrent_requests_share_snapshot() {
    let engine = Arc::new(engine_over(ratings(), books()));
    let expected = engine
        .recommend(1, "hybrid", 3, &RecommendOptions::default())
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                engine.recommend(1, "hybrid", 3, &RecommendOptions::default())
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        let recs = result.unwrap().unwrap();
        assert_eq!(recs, expected);
    }
}
