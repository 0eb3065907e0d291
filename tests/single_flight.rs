//! Orchestrator Integration Tests
//!
//! Single-flight acceptance/rejection, outcome folding, progress
//! visibility, and pre-flight abort ordering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use common::{fixture, wait_until_idle, MockCompositor};
use slidecast::core::{RejectReason, Submission};
use slidecast::domain::{BuildOutcome, BuildStage, TriggerSource};

#[tokio::test]
async fn second_submit_is_rejected_while_running() {
    let gate = Arc::new(Semaphore::new(0));
    let fx = fixture(&[], MockCompositor::gated(gate.clone()));

    let accepted = fx.orchestrator.submit(TriggerSource::Manual);
    let Submission::Accepted(first_id) = accepted else {
        panic!("first submit should be accepted, got {accepted:?}");
    };

    // Wait for the build to reach the gated render call.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while fx.compositor.renders() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "render never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A second trigger bounces without touching the active record.
    assert_eq!(
        fx.orchestrator.submit(TriggerSource::Scheduled),
        Submission::Rejected(RejectReason::AlreadyRunning)
    );
    let status = fx.orchestrator.status();
    assert_eq!(status.running.as_ref().map(|r| r.id), Some(first_id));

    gate.add_permits(1);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    // Outcome folded back into Idle with the record retained.
    let status = fx.orchestrator.status();
    assert!(status.running.is_none());
    let last = status.last_build.expect("last build retained");
    assert_eq!(last.id, first_id);
    assert!(last.succeeded());
    assert!(last.ended_at.is_some());
}

#[tokio::test]
async fn orchestrator_accepts_again_after_completion() {
    let fx = fixture(&[], MockCompositor::new());

    let first = fx.orchestrator.submit(TriggerSource::Manual);
    assert!(matches!(first, Submission::Accepted(_)));
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    let second = fx.orchestrator.submit(TriggerSource::Scheduled);
    assert!(matches!(second, Submission::Accepted(_)));
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    assert_eq!(fx.compositor.renders(), 2);
    let last = fx.orchestrator.status().last_build.unwrap();
    assert_eq!(last.trigger, TriggerSource::Scheduled);
}

#[tokio::test]
async fn progress_is_visible_mid_build() {
    let gate = Arc::new(Semaphore::new(0));
    let fx = fixture(&[], MockCompositor::gated(gate.clone()));

    fx.orchestrator.submit(TriggerSource::Manual);

    // While the render is held open, a reader sees the Encoding stage.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(progress) = fx.orchestrator.status().progress {
            if progress.stage == BuildStage::Encoding {
                assert!(progress.seq > 0);
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "never saw Encoding");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    gate.add_permits(1);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    // Progress is cleared once the build is done.
    assert!(fx.orchestrator.status().progress.is_none());
}

#[tokio::test]
async fn progress_sequence_is_monotonic() {
    let fx = fixture(&[], MockCompositor::new());

    fx.orchestrator.submit(TriggerSource::Manual);

    let mut last_seq = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while fx.orchestrator.is_running() {
        if let Some(progress) = fx.orchestrator.status().progress {
            assert!(progress.seq >= last_seq, "sequence went backwards");
            last_seq = progress.seq;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn preflight_failure_aborts_before_compositing() {
    // Point the upload at a folder that does not exist in storage.
    let fx = fixture(
        &[("UPLOAD_PATH", "published/week.mp4")],
        MockCompositor::new(),
    );

    fx.orchestrator.submit(TriggerSource::Manual);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    // The compositor was never invoked.
    assert_eq!(fx.compositor.renders(), 0);

    let last = fx.orchestrator.status().last_build.unwrap();
    match last.outcome.unwrap() {
        BuildOutcome::Failure { stage, reason } => {
            assert_eq!(stage, BuildStage::Validating);
            assert!(reason.contains("upload destination"), "reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn preflight_enumerates_every_missing_resource() {
    let fx = fixture(
        &[
            ("IMAGE_PATH", "no-such-images/"),
            ("UPLOAD_PATH", "published/week.mp4"),
            ("APPEND_VIDEO_PATH", "missing/outro.mp4"),
        ],
        MockCompositor::new(),
    );

    fx.orchestrator.submit(TriggerSource::Manual);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    let last = fx.orchestrator.status().last_build.unwrap();
    let BuildOutcome::Failure { reason, .. } = last.outcome.unwrap() else {
        panic!("expected failure");
    };
    assert!(reason.contains("image folder"), "reason: {reason}");
    assert!(reason.contains("append video"), "reason: {reason}");
    assert!(reason.contains("upload destination"), "reason: {reason}");
}

#[tokio::test]
async fn build_failure_still_notifies_and_returns_to_idle() {
    let fx = fixture(&[("IMAGE_PATH", "no-such-images/")], MockCompositor::new());

    fx.orchestrator.submit(TriggerSource::Manual);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    // Failure reported over chat; orchestrator usable again.
    let messages = fx.chat.messages();
    assert!(
        messages.iter().any(|m| m.contains("failed")),
        "no failure message in {messages:?}"
    );
    assert!(matches!(
        fx.orchestrator.submit(TriggerSource::Manual),
        Submission::Accepted(_)
    ));
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn successful_build_reports_slides_and_marks_success() {
    let fx = fixture(&[], MockCompositor::new());

    fx.orchestrator.submit(TriggerSource::Manual);
    wait_until_idle(&fx.orchestrator, Duration::from_secs(5)).await;

    let last = fx.orchestrator.status().last_build.unwrap();
    match last.outcome.unwrap() {
        BuildOutcome::Success { slides, .. } => {
            assert_eq!(slides, vec!["1.jpg", "2.jpg", "3.jpg"]);
        }
        other => panic!("expected success, got {other:?}"),
    }

    assert!(fx.orchestrator.health().summary().last_success.is_some());
    let messages = fx.chat.messages();
    assert!(messages.iter().any(|m| m.contains("successfully")));
}
