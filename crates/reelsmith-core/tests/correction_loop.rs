use std::sync::{Arc, Mutex};

use reelsmith_core::artifact::{ArtifactName, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
use reelsmith_core::correction::{
    read_correction_artifact, write_correction_artifact, CorrectionLog, CorrectionLoop,
    CorrectionOutcome, CorrectionPolicy, LoopObserver, LoopState, NoopObserver,
};
use reelsmith_core::domain::{ErrorClass, FailureReport, ScriptArtifact, StudioError};
use reelsmith_core::fakes::{failure_outcome, success_outcome, ScriptedModel, ScriptedRenderer};
use reelsmith_core::handbook::{Catalog, Locale};
use reelsmith_core::llm::LlmError;
use reelsmith_core::oracle::{Reviewer, VerificationOracle};
use reelsmith_core::{GenerationAgent, InfraRetryPolicy, Renderer};

const NO_RETRY: InfraRetryPolicy = InfraRetryPolicy {
    max_retries: 0,
    backoff_base_ms: 0,
};

fn script() -> ScriptArtifact {
    ScriptArtifact::parse(
        "[VISUAL SCRIPT]\n\
         SCENE 1 (20s): Plot y = x^2 and highlight a point.\n\
         SCENE 2 (40s): Draw the tangent line and label its slope.\n\
         [VOICEOVER SCRIPT]\n\
         The derivative tells us how steep a curve is at each point.\n",
    )
    .unwrap()
}

fn program(n: u32) -> Result<String, LlmError> {
    Ok(format!(
        "```python\nfrom manim import *\n\nclass MainScene(Scene):\n    def construct(self):\n        self.wait({n})\n```"
    ))
}

fn attribute_failure(n: u32) -> reelsmith_core::RenderOutcome {
    failure_outcome(
        ErrorClass::AttributeError,
        format!("Traceback (most recent call last):\nAttributeError: 'Circle' object has no attribute 'marker_{n}'"),
    )
}

struct Harness {
    coder: Arc<ScriptedModel>,
    renderer: Arc<ScriptedRenderer>,
    store: Arc<dyn ArtifactStore>,
    correction: CorrectionLoop,
}

fn harness(
    coder: ScriptedModel,
    outcomes: Vec<reelsmith_core::RenderOutcome>,
    reviewer: Reviewer,
    store: Arc<dyn ArtifactStore>,
) -> Harness {
    let coder = Arc::new(coder);
    let renderer = Arc::new(ScriptedRenderer::new(outcomes));
    let catalog = Catalog::new(Locale::En);
    let agent = GenerationAgent::new(coder.clone(), catalog, Arc::clone(&store)).with_infra_policy(NO_RETRY);
    let oracle = VerificationOracle::new(reviewer, catalog).with_infra_policy(NO_RETRY);
    let dyn_renderer: Arc<dyn Renderer> = renderer.clone();
    let correction = CorrectionLoop::new(agent, dyn_renderer, oracle)
        .with_policy(CorrectionPolicy { max_retries: 5 });
    Harness {
        coder,
        renderer,
        store,
        correction,
    }
}

fn memory() -> Arc<dyn ArtifactStore> {
    Arc::new(MemoryArtifactStore::new())
}

#[derive(Default)]
struct RecordingObserver {
    attempts: Mutex<Vec<(u32, u32)>>,
    rejected: Mutex<Vec<FailureReport>>,
}

impl LoopObserver for RecordingObserver {
    fn on_attempt(&self, attempt: u32, max: u32) {
        self.attempts.lock().unwrap().push((attempt, max));
    }

    fn on_rejected(&self, _attempt: u32, report: &FailureReport) {
        self.rejected.lock().unwrap().push(report.clone());
    }
}

fn user_prompt(coder: &ScriptedModel, index: usize) -> String {
    coder.requests()[index].user_text()
}

#[tokio::test]
async fn accepted_on_first_attempt_generates_no_report() {
    let h = harness(
        ScriptedModel::new(vec![program(1)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::Model(Arc::new(ScriptedModel::repeating("SUCCESS - matches the script."))),
        memory(),
    );
    let observer = RecordingObserver::default();

    let log = h.correction.run("run-1", &script(), &observer).await.unwrap();

    assert_eq!(log.state(), LoopState::Accepted);
    assert_eq!(log.attempts_used, 1);
    assert!(observer.rejected.lock().unwrap().is_empty());
    assert_eq!(*observer.attempts.lock().unwrap(), vec![(1, 5)]);
    assert!(!user_prompt(&h.coder, 0).contains("Render attempt"));
    assert!(h.store.exists(&ArtifactName::CandidateSource).await.unwrap());
}

#[tokio::test]
async fn recovers_on_fifth_attempt_with_local_feedback_only() {
    let outcomes = vec![
        attribute_failure(1),
        attribute_failure(2),
        attribute_failure(3),
        attribute_failure(4),
        success_outcome("animation_scene.mp4", 60.0),
    ];
    let h = harness(
        ScriptedModel::new((1..=5).map(program).collect()),
        outcomes,
        Reviewer::AutoApprove,
        memory(),
    );
    let observer = RecordingObserver::default();

    let log = h.correction.run("run-2", &script(), &observer).await.unwrap();

    assert!(log.is_accepted());
    assert_eq!(log.attempts_used, 5);
    assert_eq!(h.coder.calls(), 5);

    let rejected = observer.rejected.lock().unwrap();
    assert_eq!(rejected.len(), 4);
    for (i, report) in rejected.iter().enumerate() {
        let n = i as u32 + 1;
        assert_eq!(report.attempt, n);
        assert_eq!(report.error_class, Some(ErrorClass::AttributeError));
        assert!(report.text.contains(&format!("marker_{n}")));
        for other in (1..=4).filter(|o| *o != n) {
            assert!(!report.text.contains(&format!("marker_{other}")));
        }
    }

    // Prompt k+1 carries attempt k's error and nothing older.
    assert!(!user_prompt(&h.coder, 0).contains("marker_"));
    for k in 1..5usize {
        let prompt = user_prompt(&h.coder, k);
        assert!(prompt.contains(&format!("marker_{k}")), "prompt {k}");
        for older in 1..k {
            assert!(!prompt.contains(&format!("marker_{older}")), "prompt {k} leaks {older}");
        }
    }
}

#[tokio::test]
async fn exhausts_after_exactly_max_attempts() {
    let outcomes = (1..=5).map(attribute_failure).collect();
    let h = harness(
        ScriptedModel::new((1..=5).map(program).collect()),
        outcomes,
        Reviewer::AutoApprove,
        memory(),
    );

    let log = h.correction.run("run-3", &script(), &NoopObserver).await.unwrap();

    assert_eq!(log.state(), LoopState::Exhausted);
    assert_eq!(log.attempts_used, 5);
    assert_eq!(h.coder.calls(), 5);
    assert_eq!(h.renderer.calls().len(), 5);
    match &log.outcome {
        CorrectionOutcome::Exhausted { last_report } => {
            assert_eq!(last_report.attempt, 5);
            assert!(last_report.text.contains("marker_5"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(log.attempts.iter().all(|a| !a.accepted));
}

#[tokio::test]
async fn review_rejection_is_retried_with_notes() {
    let reviewer = ScriptedModel::new(vec![
        Ok("The labels overlap the graph. Not approved.".to_string()),
        Ok("APPROVED".to_string()),
    ]);
    let h = harness(
        ScriptedModel::new(vec![program(1), program(2)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::Model(Arc::new(reviewer)),
        memory(),
    );

    let log = h.correction.run("run-review", &script(), &NoopObserver).await.unwrap();

    assert!(log.is_accepted());
    assert_eq!(log.attempts_used, 2);
    assert_eq!(log.attempts[0].error_class, None);
    assert!(!log.attempts[0].accepted);
    assert!(user_prompt(&h.coder, 1).contains("labels overlap"));
}

#[tokio::test]
async fn missing_render_engine_aborts_without_regenerating() {
    let h = harness(
        ScriptedModel::new((1..=5).map(program).collect()),
        vec![failure_outcome(ErrorClass::ToolNotFound, "manim: command not found")],
        Reviewer::AutoApprove,
        memory(),
    );

    let err = h
        .correction
        .run("run-6", &script(), &NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, StudioError::ToolNotFound(_)));
    assert_eq!(h.coder.calls(), 1);
    assert_eq!(h.renderer.calls().len(), 1);
}

#[tokio::test]
async fn empty_candidate_consumes_an_attempt() {
    let h = harness(
        ScriptedModel::new(vec![Ok("   ".to_string()), program(2)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::AutoApprove,
        memory(),
    );

    let log = h.correction.run("run-empty", &script(), &NoopObserver).await.unwrap();

    assert!(log.is_accepted());
    assert_eq!(log.attempts_used, 2);
    assert_eq!(h.renderer.calls().len(), 1);
    assert!(user_prompt(&h.coder, 1).contains("returned no program"));
}

#[tokio::test]
async fn unavailable_model_aborts_the_loop() {
    let h = harness(
        ScriptedModel::new(vec![Err(LlmError::Authentication)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::AutoApprove,
        memory(),
    );

    let err = h
        .correction
        .run("run-auth", &script(), &NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, StudioError::Generation(_)));
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn reviewer_failure_surfaces_as_llm_error() {
    let h = harness(
        ScriptedModel::new(vec![program(1)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::Model(Arc::new(ScriptedModel::new(vec![Err(LlmError::Authentication)]))),
        memory(),
    );

    let err = h
        .correction
        .run("run-reviewer", &script(), &NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, StudioError::Llm(LlmError::Authentication)));
}

#[tokio::test]
async fn attempts_are_bounded_for_any_acceptance_point() {
    for accept_at in 1..=6u32 {
        let outcomes = (1..=5)
            .map(|n| {
                if n == accept_at {
                    success_outcome("animation_scene.mp4", 60.0)
                } else {
                    attribute_failure(n)
                }
            })
            .collect();
        let h = harness(
            ScriptedModel::new((1..=5).map(program).collect()),
            outcomes,
            Reviewer::AutoApprove,
            memory(),
        );

        let log = h.correction.run("run-p1", &script(), &NoopObserver).await.unwrap();

        assert!(log.attempts_used <= 5);
        if accept_at <= 5 {
            assert!(log.is_accepted(), "accept_at={accept_at}");
            assert_eq!(log.attempts_used, accept_at);
        } else {
            assert_eq!(log.state(), LoopState::Exhausted);
            assert_eq!(log.attempts_used, 5);
        }
    }
}

#[tokio::test]
async fn rerun_overwrites_canonical_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()).unwrap());

    for round in 0..2u32 {
        let h = harness(
            ScriptedModel::new(vec![program(10 + round), program(20 + round)]),
            vec![attribute_failure(1), success_outcome("animation_scene.mp4", 60.0)],
            Reviewer::AutoApprove,
            Arc::clone(&store),
        );
        let log = h.correction.run("run-p4", &script(), &NoopObserver).await.unwrap();
        write_correction_artifact(&log, store.as_ref()).await.unwrap();
    }

    let names: Vec<String> = store.list().await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["animation_scene.py", "correction.digest", "correction.json"]);
    let code = store.read_text(&ArtifactName::CandidateSource).await.unwrap();
    assert!(code.contains("self.wait(21)"));
}

#[tokio::test]
async fn correction_artifact_is_digest_verified() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    let h = harness(
        ScriptedModel::new(vec![program(1)]),
        vec![success_outcome("animation_scene.mp4", 60.0)],
        Reviewer::AutoApprove,
        memory(),
    );
    let log = h.correction.run("run-audit", &script(), &NoopObserver).await.unwrap();

    write_correction_artifact(&log, &store).await.unwrap();
    let loaded: CorrectionLog = read_correction_artifact(&store).await.unwrap();
    assert_eq!(loaded, log);

    let path = store.path_of(&ArtifactName::CorrectionLog);
    let tampered = std::fs::read_to_string(&path).unwrap().replace("run-audit", "run-other");
    std::fs::write(&path, tampered).unwrap();
    assert!(matches!(
        read_correction_artifact(&store).await,
        Err(StudioError::DigestMismatch { .. })
    ));
}
