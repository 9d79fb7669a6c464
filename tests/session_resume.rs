//! Checkpoint and resume behaviour of the planning pipeline.

use std::sync::Arc;
use std::time::Duration;

use brickwork::llm::testing::ScriptedBackend;
use brickwork::{
    BrickworkError, Config, Constitution, Dispatcher, DuelOutcome, InMemorySessionStore,
    PenaltyBox, PlanningPipeline, ProjectMode, ProviderEndpoint, SessionPhase, SessionStore,
    can_resume,
};

const GOAL: &str = "Build a login system";
const PASS: &str = "```yaml\nverdict: pass\nconfidence: 95\nreasoning: matches the instruction\n```";
const UNSTRUCTURED: &str = "no structure here";

fn config() -> Config {
    let mut config = Config::default();
    config
        .dispatch
        .endpoints
        .push(ProviderEndpoint::new("primary", "scripted", "model"));
    config
}

fn pipeline(backend: Arc<ScriptedBackend>, store: &InMemorySessionStore) -> PlanningPipeline {
    let dispatcher = Dispatcher::new(PenaltyBox::new()).with_backend("scripted", backend);
    PlanningPipeline::new(dispatcher, config(), Arc::new(store.clone()))
}

fn constitution() -> Constitution {
    Constitution::new("Web application", ProjectMode::Software)
}

fn unhelpful() -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new("s").with_fallback(UNSTRUCTURED))
}

#[tokio::test]
async fn test_unknown_session_is_not_resumable() {
    let store = InMemorySessionStore::new();
    let info = can_resume(&store, "nope").await.unwrap();
    assert!(!info.resumable);
    assert!(info.phase.is_none());
}

#[tokio::test]
async fn test_finished_planning_resumes_without_model_calls() {
    let store = InMemorySessionStore::new();
    let first = pipeline(unhelpful(), &store)
        .run("s-1", GOAL, &constitution())
        .await
        .unwrap();
    assert_eq!(first.resumed_from, None);

    let info = can_resume(&store, "s-1").await.unwrap();
    assert!(info.resumable);
    assert_eq!(info.phase, Some(SessionPhase::AwaitingReview));
    assert_eq!(info.description, SessionPhase::AwaitingReview.description());

    let idle = Arc::new(ScriptedBackend::new("idle"));
    let second = pipeline(idle.clone(), &store)
        .run("s-1", "a different goal", &constitution())
        .await
        .unwrap();
    assert_eq!(second.resumed_from, Some(SessionPhase::AwaitingReview));
    assert_eq!(second.plan, first.plan);
    assert_eq!(second.plan.goal, GOAL);
    assert_eq!(idle.calls(), 0);
}

#[tokio::test]
async fn test_fatal_exhaustion_is_recorded_then_resumed() {
    let store = InMemorySessionStore::new();

    let backend = unhelpful();
    let penalty_box = PenaltyBox::new();
    penalty_box.penalize("primary", Duration::from_secs(3600));
    let stalled = PlanningPipeline::new(
        Dispatcher::new(penalty_box).with_backend("scripted", backend.clone()),
        config(),
        Arc::new(store.clone()),
    );

    let err = stalled.run("s-2", GOAL, &constitution()).await.unwrap_err();
    assert!(matches!(err, BrickworkError::Decompose(_)));
    assert_eq!(backend.calls(), 0);

    let checkpoint = stalled.session("s-2").current().await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, SessionPhase::Genesis);
    assert_eq!(checkpoint.retry_count, Some(1));
    assert!(checkpoint.last_error.unwrap().contains("zero attempts"));

    // A healthy dispatcher picks up after genesis.
    let healthy = unhelpful();
    let outcome = pipeline(healthy.clone(), &store)
        .run("s-2", GOAL, &constitution())
        .await
        .unwrap();
    assert_eq!(outcome.resumed_from, Some(SessionPhase::Genesis));
    assert_eq!(healthy.calls_for("classify_domain"), 1);
    assert!(!outcome.plan.tasks.is_empty());
}

#[tokio::test]
async fn test_completed_stages_are_not_repeated() {
    let store = InMemorySessionStore::new();
    pipeline(unhelpful(), &store)
        .run("s-3", GOAL, &constitution())
        .await
        .unwrap();

    // Rewind the checkpoint to just after the council was proposed.
    let manager = pipeline(unhelpful(), &store).session("s-3");
    manager
        .checkpoint(SessionPhase::PrismB, Default::default())
        .await
        .unwrap();
    let mut partial = brickwork::SessionRecord::new();
    partial.insert("plan".into(), serde_json::Value::Null);
    partial.insert("verification".into(), serde_json::Value::Null);
    store.update("s-3", partial).await.unwrap();

    let backend = unhelpful();
    let outcome = pipeline(backend.clone(), &store)
        .run("s-3", GOAL, &constitution())
        .await
        .unwrap();
    assert_eq!(outcome.resumed_from, Some(SessionPhase::PrismB));
    assert_eq!(backend.calls_for("classify_domain"), 0);
    assert_eq!(backend.calls_for("propose_council"), 0);
    assert_eq!(backend.calls_for("generate_tasks"), 2);
    assert_eq!(backend.calls_for("saboteur_gaps"), 1);
}

#[tokio::test]
async fn test_execution_lifecycle_ends_unresumable() {
    let store = InMemorySessionStore::new();
    let backend = Arc::new(
        ScriptedBackend::new("s")
            .with_sticky_route("audit", PASS)
            .with_fallback(UNSTRUCTURED),
    );
    let pipeline = pipeline(backend.clone(), &store);

    assert!(pipeline.begin_execution("s-4").await.is_err());

    let outcome = pipeline.run("s-4", GOAL, &constitution()).await.unwrap();
    assert!(pipeline.complete("s-4").await.is_err());

    let started = pipeline.begin_execution("s-4").await.unwrap();
    assert_eq!(started.phase, SessionPhase::ExecutionStarted);
    let total = outcome.plan.tasks.iter().filter(|task| task.enabled).count() as u32;
    assert_eq!(started.total_steps, total);
    assert_eq!(started.completed_steps, 0);

    let task = &outcome.plan.tasks[0];
    let duel = pipeline
        .verify_artifact("s-4", &task.id, "the requirements document", None)
        .await
        .unwrap();
    assert_eq!(duel.outcome, DuelOutcome::Verified);
    assert_eq!(backend.calls_for("audit"), 1);

    // Verifying the same task twice does not double count.
    pipeline
        .verify_artifact("s-4", &task.id, "the requirements document", None)
        .await
        .unwrap();
    let checkpoint = pipeline.session("s-4").current().await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, SessionPhase::ExecutionInProgress);
    assert_eq!(checkpoint.completed_steps, 1);
    assert_eq!(checkpoint.current_node_id.as_deref(), Some(task.id.as_str()));

    assert!(pipeline
        .verify_artifact("s-4", "no-such-task", "x", None)
        .await
        .is_err());

    pipeline.complete("s-4").await.unwrap();
    let info = can_resume(&store, "s-4").await.unwrap();
    assert!(!info.resumable);
    assert_eq!(info.phase, Some(SessionPhase::Complete));
    assert!(pipeline
        .verify_artifact("s-4", &task.id, "late", None)
        .await
        .is_err());
}
