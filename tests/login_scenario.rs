//! "Build a login system" under software mode, through the full planning pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use brickwork::decompose::text::PhraseSet;
use brickwork::llm::testing::ScriptedBackend;
use brickwork::verify::checklist;
use brickwork::{
    Config, Constitution, DecompositionEngine, Dispatcher, InMemorySessionStore, PenaltyBox,
    PlanningPipeline, ProjectMode, ProviderEndpoint, RoutingPath, SessionPhase,
};

const GOAL: &str = "Build a login system";

const CLASSIFY: &str = "```yaml\ndomain: Web Security\nsubDomain: Authentication\nexpertise: [auth, sessions]\nconfidence: 0.92\n```";

const COUNCIL: &str = "```yaml\nreasoning: Auth needs backend and security review\nspecialists:\n  - id: backend\n    role: Backend Engineer\n    capabilities: [login, handler, session, token]\n  - id: security\n    role: Security Engineer\n    capabilities: [password, hashing, credential]\n```";

const TASKS: &str = "Plan:\n```yaml\ntasks:\n  - id: req\n    title: Define login requirements\n    instruction: Specify the password policy and session lifetime for user login.\n    complexity: 3\n  - id: store\n    title: Design credential storage\n    instruction: Design the credential table with salted password hashes.\n    complexity: 6\n    dependencies: [req]\n  - id: handler\n    title: Implement login handler\n    instruction: Implement the handler that validates credentials and issues a session token.\n    complexity: 7\n    dependencies: [store]\n  - id: ghost\n    title: Wire metrics\n    instruction: Add a login counter to the metrics module.\n    complexity: 2\n    dependencies: [handler, does-not-exist]\n```";

const GAPS: &str = "```yaml\ngaps:\n  - title: No brute-force protection\n    severity: critical\n    category: security\n    description: Repeated wrong passwords are never throttled.\n    affectedTasks: [handler]\n    suggestedFix: Add rate limiting to the login handler.\n```";

const UNSTRUCTURED: &str = "I cannot comply with a structured answer.";

fn auth_vocabulary() -> PhraseSet {
    PhraseSet::prefixes(&["auth", "login", "password", "credential", "session", "token"])
}

fn scripted() -> ScriptedBackend {
    ScriptedBackend::new("scripted")
        .with_route("classify_domain", CLASSIFY)
        .with_route("propose_council", COUNCIL)
        .with_route("generate_tasks", TASKS)
        .with_route("saboteur_gaps", GAPS)
        .with_fallback(UNSTRUCTURED)
}

fn config() -> Config {
    let mut config = Config::default();
    config
        .dispatch
        .endpoints
        .push(ProviderEndpoint::new("primary", "scripted", "model"));
    config
}

fn dispatcher(backend: Arc<ScriptedBackend>) -> Dispatcher {
    Dispatcher::new(PenaltyBox::new()).with_backend("scripted", backend)
}

#[tokio::test]
async fn test_login_plan_covers_authentication() {
    let backend = Arc::new(scripted());
    let store = Arc::new(InMemorySessionStore::new());
    let pipeline = PlanningPipeline::new(dispatcher(backend.clone()), config(), store);
    let constitution = Constitution::new("Web application", ProjectMode::Software)
        .with_tech_stack(["Rust", "PostgreSQL"]);

    let outcome = pipeline.run("login", GOAL, &constitution).await.unwrap();
    let plan = &outcome.plan;

    assert_eq!(plan.classification.domain, "Web Security");
    assert_eq!(plan.council.specialists.len(), 2);

    let text: String = plan
        .tasks
        .iter()
        .map(|task| task.search_text())
        .collect::<Vec<_>>()
        .join(" ");
    assert!(auth_vocabulary().is_match(&text));

    // The deterministic domain pass must not call authentication missing.
    let checklist_gaps = checklist::scan(&plan.tasks, ProjectMode::Software);
    assert!(checklist_gaps.iter().all(|gap| gap.title != "Missing authentication"));
    assert!(outcome
        .verification
        .gaps
        .iter()
        .all(|gap| gap.title != "Missing authentication"));

    // The model's critical gap became a brick ahead of the plan.
    assert!(outcome
        .verification
        .gaps
        .iter()
        .any(|gap| gap.title == "No brute-force protection"));
    assert!(plan.tasks.len() > 4);

    let session = pipeline.session("login");
    assert_eq!(
        session.current().await.unwrap().unwrap().phase,
        SessionPhase::AwaitingReview
    );
}

#[tokio::test]
async fn test_login_plan_is_structurally_sound() {
    let backend = Arc::new(scripted());
    let store = Arc::new(InMemorySessionStore::new());
    let pipeline = PlanningPipeline::new(dispatcher(backend), config(), store);
    let constitution = Constitution::new("Web application", ProjectMode::Software);

    let outcome = pipeline.run("login", GOAL, &constitution).await.unwrap();
    let tasks = &outcome.plan.tasks;

    let ids: HashSet<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
    assert_eq!(ids.len(), tasks.len(), "task ids are unique");
    for task in tasks {
        for dep in &task.dependencies {
            assert!(ids.contains(dep.as_str()), "{} depends on missing {dep}", task.id);
            assert_ne!(dep, &task.id);
        }
        let expected = if task.complexity <= 6 {
            RoutingPath::Fast
        } else {
            RoutingPath::Slow
        };
        assert_eq!(task.routing_path, expected, "routing of {}", task.id);
    }

    // Dependencies come before their dependents.
    let position = |id: &str| tasks.iter().position(|task| task.id == id);
    for task in tasks {
        for dep in &task.dependencies {
            assert!(position(dep) < position(&task.id));
        }
    }
}

#[tokio::test]
async fn test_login_fallback_templates_when_model_is_unhelpful() {
    let backend = Arc::new(ScriptedBackend::new("s").with_fallback(UNSTRUCTURED));
    let engine = DecompositionEngine::new(
        dispatcher(backend.clone()),
        vec![ProviderEndpoint::new("primary", "scripted", "model")],
    );
    let constitution = Constitution::new("Web application", ProjectMode::Software);

    let plan = engine.run_full_decomposition(GOAL, &constitution).await.unwrap();

    assert!(!plan.tasks.is_empty());
    assert!(plan
        .tasks
        .iter()
        .any(|task| task.title == "Define authentication requirements"));
    let gaps = checklist::scan(&plan.tasks, ProjectMode::Software);
    assert!(gaps.iter().all(|gap| gap.title != "Missing authentication"));
    // Initial generation was retried once before falling back.
    assert_eq!(backend.calls_for("generate_tasks"), 2);
}
