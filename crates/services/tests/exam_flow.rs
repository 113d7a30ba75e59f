use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use exam_core::model::{
    ExamDefinition, ExamId, Question, QuestionId, Role, SessionStatus, SubmitReason, Submission,
    SubmissionReceipt, SubmissionSummary, User, UserId,
};
use exam_core::time::{fixed_clock, fixed_now};
use services::{
    CountdownEnd, ExamLoopService, SessionError, SessionRegistry, TickOutcome, manual_ticker,
    run_countdown,
};
use storage::repository::{
    ExamCatalog, InMemoryRepository, StorageError, SubmissionRepository, SubmissionSink,
};

/// Sink that counts calls and can be told to fail the first few.
struct CountingSink {
    inner: InMemoryRepository,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl CountingSink {
    fn new(inner: InMemoryRepository, failures: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionSink for CountingSink {
    async fn submit_answers(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Connection("grading backend unavailable".into()));
        }
        self.inner.submit_answers(submission).await
    }
}

fn student() -> User {
    User::new(UserId::new(3), "student@school.org", "Jane Student", Role::Student).unwrap()
}

fn algebra_midterm(minutes: u32) -> ExamDefinition {
    let questions = vec![
        Question::single_choice(
            QuestionId::new(1),
            "What is the value of x in the equation 2x + 5 = 13?",
            vec!["x = 3".into(), "x = 4".into(), "x = 5".into(), "x = 6".into()],
        )
        .unwrap(),
        Question::free_text(
            QuestionId::new(2),
            "Explain how to solve a quadratic equation using the quadratic formula.",
        )
        .unwrap(),
    ];
    ExamDefinition::new(ExamId::new(1), "Algebra Midterm", "Math", minutes, questions).unwrap()
}

async fn setup(
    minutes: u32,
    failures: usize,
) -> (ExamLoopService, Arc<CountingSink>, InMemoryRepository) {
    let repo = InMemoryRepository::new().with_clock(fixed_clock());
    repo.upsert_exam(&algebra_midterm(minutes)).await.unwrap();
    let sink = Arc::new(CountingSink::new(repo.clone(), failures));
    let service = ExamLoopService::new(fixed_clock(), Arc::new(repo.clone()), sink.clone());
    (service, sink, repo)
}

#[tokio::test]
async fn submit_twice_delivers_once() {
    let (service, sink, repo) = setup(60, 0).await;
    let mut session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    session.record_answer(QuestionId::new(1), "x = 4").unwrap();

    let first = service
        .submit(&mut session, SubmitReason::UserRequested)
        .await
        .unwrap();
    let second = service
        .submit(&mut session, SubmitReason::UserRequested)
        .await
        .unwrap();

    assert!(first.newly_submitted);
    assert!(!second.newly_submitted);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.receipt, second.receipt);
    assert_eq!(sink.calls(), 1);

    let receipt = first.receipt.expect("delivered");
    let stored = repo.get_submission(receipt.id).await.unwrap();
    assert_eq!(stored.submission.user_id, UserId::new(3));
    assert_eq!(
        stored.submission.answers.get(&QuestionId::new(1)).map(String::as_str),
        Some("x = 4")
    );
}

#[tokio::test]
async fn unknown_exam_is_not_found() {
    let (service, _, _) = setup(60, 0).await;
    let err = service
        .start_session(&student(), ExamId::new(42))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(id) if id == ExamId::new(42)));
}

#[tokio::test]
async fn only_students_may_start() {
    let (service, _, _) = setup(60, 0).await;
    let teacher =
        User::new(UserId::new(2), "teacher@school.org", "John Teacher", Role::Teacher).unwrap();
    let err = service
        .start_session(&teacher, ExamId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Forbidden { role: Role::Teacher }));
}

#[tokio::test]
async fn sink_failure_surfaces_and_retry_delivers_once() {
    let (service, sink, _) = setup(60, 1).await;
    let mut session = service.start_session(&student(), ExamId::new(1)).await.unwrap();

    let err = service
        .submit(&mut session, SubmitReason::UserRequested)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Sink(StorageError::Connection(_))));
    assert_eq!(session.status(), SessionStatus::Submitted);
    assert!(session.receipt().is_none());

    // A repeat submit does not call the sink again.
    let again = service
        .submit(&mut session, SubmitReason::UserRequested)
        .await
        .unwrap();
    assert!(again.receipt.is_none());
    assert_eq!(sink.calls(), 1);

    let receipt = service.finalize_submission(&mut session).await.unwrap();
    assert_eq!(session.receipt(), Some(&receipt));
    assert_eq!(sink.calls(), 2);

    let same = service.finalize_submission(&mut session).await.unwrap();
    assert_eq!(same, receipt);
    assert_eq!(sink.calls(), 2);
}

#[tokio::test]
async fn expiry_sink_failure_is_retried_once() {
    let (service, sink, repo) = setup(1, 1).await;
    let mut session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    session.record_answer(QuestionId::new(1), "x = 4").unwrap();

    for _ in 0..59 {
        assert!(matches!(
            service.tick(&mut session).await.unwrap(),
            TickOutcome::Running { .. }
        ));
    }
    let err = service.tick(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::Sink(StorageError::Connection(_))));
    assert_eq!(session.status(), SessionStatus::Submitted);
    assert_eq!(session.remaining_seconds(), 0);
    assert_eq!(
        session.summary().map(|s| s.reason),
        Some(SubmitReason::TimeExpired)
    );
    assert!(session.receipt().is_none());
    assert_eq!(sink.calls(), 1);

    // Later ticks stay idle and do not redeliver.
    assert_eq!(service.tick(&mut session).await.unwrap(), TickOutcome::Idle);
    assert_eq!(sink.calls(), 1);

    let receipt = service.finalize_submission(&mut session).await.unwrap();
    assert_eq!(session.receipt(), Some(&receipt));
    assert_eq!(service.finalize_submission(&mut session).await.unwrap(), receipt);
    assert_eq!(sink.calls(), 2);

    let stored = repo.get_submission(receipt.id).await.unwrap();
    assert_eq!(stored.submission.reason, SubmitReason::TimeExpired);
    assert_eq!(repo.submission_count().unwrap(), 1);
}

#[tokio::test]
async fn finalize_requires_submitted_session() {
    let (service, sink, _) = setup(60, 0).await;
    let mut session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    assert!(matches!(
        service.finalize_submission(&mut session).await,
        Err(SessionError::InvalidState)
    ));
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn ticking_to_zero_delivers_time_expired() {
    let (service, sink, _) = setup(1, 0).await;
    let mut session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    session.record_answer(QuestionId::new(2), "b² - 4ac").unwrap();

    let mut last = TickOutcome::Idle;
    for _ in 0..60 {
        last = service.tick(&mut session).await.unwrap();
    }

    assert_eq!(
        last,
        TickOutcome::Expired(SubmissionSummary {
            answered_count: 1,
            total_count: 2,
            reason: SubmitReason::TimeExpired,
        })
    );
    assert_eq!(session.remaining_seconds(), 0);
    assert_eq!(session.submitted_at(), Some(fixed_now()));
    assert!(session.receipt().is_some());
    assert_eq!(sink.calls(), 1);

    assert_eq!(service.tick(&mut session).await.unwrap(), TickOutcome::Idle);
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn countdown_runs_until_expiry() {
    let (service, sink, _) = setup(1, 0).await;
    let registry = SessionRegistry::new();
    let session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    let shared = registry.insert(session);

    let (handle, ticker) = manual_ticker();
    assert!(handle.fire_n(60));

    let end = run_countdown(&service, Arc::clone(&shared), ticker)
        .await
        .unwrap();
    assert_eq!(
        end,
        CountdownEnd::Expired(SubmissionSummary {
            answered_count: 0,
            total_count: 2,
            reason: SubmitReason::TimeExpired,
        })
    );
    assert!(shared.lock().await.receipt().is_some());
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn countdown_stops_when_ticker_closes() {
    let (service, sink, _) = setup(1, 0).await;
    let session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    let shared = SessionRegistry::new().insert(session);

    let (handle, ticker) = manual_ticker();
    handle.fire_n(3);
    drop(handle);

    let end = run_countdown(&service, Arc::clone(&shared), ticker)
        .await
        .unwrap();
    assert_eq!(end, CountdownEnd::TickerClosed);

    let guard = shared.lock().await;
    assert_eq!(guard.remaining_seconds(), 57);
    assert_eq!(guard.status(), SessionStatus::Active);
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn countdown_stops_after_user_submit() {
    let (service, sink, _) = setup(1, 0).await;
    let session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
    let shared = SessionRegistry::new().insert(session);

    service
        .submit(&mut *shared.lock().await, SubmitReason::UserRequested)
        .await
        .unwrap();

    let (handle, ticker) = manual_ticker();
    handle.fire();
    let end = run_countdown(&service, Arc::clone(&shared), ticker)
        .await
        .unwrap();
    assert_eq!(end, CountdownEnd::AlreadySubmitted);
    assert_eq!(sink.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_expiry_and_user_submit_delivers_once() {
    for _ in 0..20 {
        let (service, sink, _) = setup(1, 0).await;
        let session = service.start_session(&student(), ExamId::new(1)).await.unwrap();
        let shared = SessionRegistry::new().insert(session);

        let (handle, ticker) = manual_ticker();
        handle.fire_n(59);

        let countdown = {
            let service = service.clone();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { run_countdown(&service, shared, ticker).await })
        };
        let user = {
            let service = service.clone();
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut guard = shared.lock().await;
                service
                    .submit(&mut guard, SubmitReason::UserRequested)
                    .await
            })
        };

        handle.fire();
        let user_outcome = user.await.unwrap().unwrap();
        drop(handle);
        let end = countdown.await.unwrap().unwrap();

        assert_eq!(sink.calls(), 1);
        let guard = shared.lock().await;
        assert_eq!(guard.status(), SessionStatus::Submitted);
        let summary = guard.summary().unwrap();
        assert_eq!(user_outcome.summary, summary);
        match end {
            CountdownEnd::Expired(s) => {
                assert_eq!(s.reason, SubmitReason::TimeExpired);
                assert!(!user_outcome.newly_submitted);
            }
            CountdownEnd::AlreadySubmitted | CountdownEnd::TickerClosed => {
                assert_eq!(summary.reason, SubmitReason::UserRequested);
                assert!(user_outcome.newly_submitted);
            }
        }
    }
}
