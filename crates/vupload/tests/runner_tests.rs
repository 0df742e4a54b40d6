//! Runner tests: jobs driven end to end over a completion stream.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::*;

use vupload::broadcast::{JobProgressBroadcaster, JobStatus};
use vupload::error::{ErrorDomain, ErrorKind};
use vupload::job::{JobOutcome, Phase, UploadJob};
use vupload::pipeline::{
    recover_jobs, BroadcastProgress, NoopProgress, ProgressEvent, RecordingProgress, UploadRunner,
};
use vupload::staging::StagingArea;
use vupload::transport::{Completion, InMemoryTransport, Outcome, RequestDescriptor};

fn happy(request: &RequestDescriptor) -> Outcome {
    match request {
        RequestDescriptor::Create { .. } => create_response(),
        RequestDescriptor::Upload { .. } => upload_ok(),
        RequestDescriptor::Activate { .. } => activate_response("/videos/1001"),
        RequestDescriptor::Settings { video_uri, .. } => video_response(video_uri, "named"),
    }
}

/// Completes every pending operation of `transport` after `delay`, until aborted.
fn autopilot(
    transport: InMemoryTransport,
    tx: mpsc::UnboundedSender<Completion>,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        loop {
            for (id, request) in transport.started() {
                if let Some(completion) = transport.complete(&id, happy(&request)) {
                    if tx.send(completion).is_err() {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

#[tokio::test]
async fn test_run_all_with_shared_stream() {
    let harness = TestHarness::new();
    let first = harness.write_video("first.mp4");
    let second = harness.write_video("second.mp4");
    let third = harness.write_video("third.mp4");

    let (transport, mut rx) = InMemoryTransport::scripted(|request| match request {
        RequestDescriptor::Upload { file, .. } if file.ends_with("second.mp4") => {
            Outcome::new(503)
        }
        other => happy(other),
    });
    let runner = UploadRunner::new(Arc::new(transport)).with_store(harness.store.clone());

    let mut jobs = vec![
        UploadJob::new(&first, None),
        UploadJob::new(&second, None),
        UploadJob::new(&third, Some(SettingsBuilder::new().title("named").build())),
    ];

    let outcomes = runner
        .run_all(&mut jobs, &mut rx, &CancellationToken::new(), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(
        &outcomes[0],
        JobOutcome::Succeeded { video: None, .. }
    ));
    match &outcomes[1] {
        JobOutcome::Failed(e) => {
            assert_eq!(e.domain, ErrorDomain::Upload);
            assert_eq!(e.kind, ErrorKind::BadStatus { status: 503 });
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    match &outcomes[2] {
        JobOutcome::Succeeded { video, .. } => {
            assert_eq!(video.as_ref().unwrap().name.as_deref(), Some("named"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert!(jobs.iter().all(|job| job.is_completed()));
    assert!(!first.exists() && !second.exists() && !third.exists());
    assert_eq!(harness.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_progress_events_are_broadcast() {
    let harness = TestHarness::new();
    let file = harness.write_video("clip.mp4");
    let broadcaster = JobProgressBroadcaster::new(64);
    let mut events = broadcaster.subscribe();

    let (transport, mut rx) = InMemoryTransport::scripted(happy);
    let runner = UploadRunner::new(Arc::new(transport));
    let mut job = UploadJob::new(&file, None);

    runner
        .run(
            &mut job,
            &mut rx,
            &CancellationToken::new(),
            &BroadcastProgress::new(broadcaster),
        )
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(received.iter().all(|e| e.job_id == job.id()));
    assert!(received.iter().all(|e| e.filename == "clip.mp4"));
    let phases: Vec<Phase> = received
        .iter()
        .filter(|e| e.status == JobStatus::Running)
        .map(|e| e.phase)
        .collect();
    assert_eq!(phases, vec![Phase::Create, Phase::Upload, Phase::Activate]);

    let last = received.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.video_uri.as_deref(), Some("/videos/1001"));
}

#[tokio::test]
async fn test_cancel_token_stops_running_jobs() {
    let harness = TestHarness::new();
    let file = harness.write_video("clip.mp4");
    let (_tx, mut rx) = mpsc::unbounded_channel();
    let transport = Arc::new(harness.transport.clone());
    let runner = UploadRunner::new(transport).with_store(harness.store.clone());
    let progress = RecordingProgress::new();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut job = UploadJob::new(&file, None);
    let outcome = runner.run(&mut job, &mut rx, &cancel, &progress).await.unwrap();

    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(harness.transport.cancelled().len(), 1);
    assert_eq!(harness.transport.pending_count(), 0);
    assert!(!file.exists());
    assert_eq!(harness.store.count().unwrap(), 0);

    let events: Vec<ProgressEvent> = progress.events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        events,
        vec![
            ProgressEvent::Phase {
                phase: Phase::Create
            },
            ProgressEvent::Cancelled {
                phase: Phase::Create
            },
        ]
    );
}

#[tokio::test]
async fn test_checkpoints_while_running() {
    let harness = TestHarness::new();
    let file = harness.write_video("clip.mp4");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = UploadRunner::new(Arc::new(harness.transport.clone()))
        .with_store(harness.store.clone());

    let cancel = CancellationToken::new();
    let mut job = UploadJob::new(&file, None);
    let job_id = job.id().to_string();

    let store = harness.store.clone();
    let transport = harness.transport.clone();
    let observer = tokio::spawn(async move {
        // Create is persisted as soon as the runner starts it.
        loop {
            if store.load(&job_id).unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let (id, _) = transport.last_started().unwrap();
        tx.send(transport.complete(&id, create_response()).unwrap())
            .unwrap();

        loop {
            let stored = store.load(&job_id).unwrap().unwrap();
            if stored.phase() == Phase::Upload {
                break stored;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let run = runner.run(&mut job, &mut rx, &cancel, &NoopProgress);
    tokio::pin!(run);
    let stored = tokio::select! {
        stored = observer => stored.unwrap(),
        _ = &mut run => panic!("runner finished before the upload checkpoint"),
    };
    cancel.cancel();
    let outcome = run.await.unwrap();

    assert_eq!(stored.pending_operation().map(|id| id.as_str()), Some("op-2"));
    assert!(stored.create_result().is_some());
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(harness.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_resume_after_restart() {
    let harness = TestHarness::new();
    let mut job = harness.start_job("clip.mp4", None);
    harness.advance_to(&mut job, Phase::Upload);
    harness.store.save(&job).unwrap();
    harness
        .transport
        .set_progress(&harness.pending(&job), 0.5);

    let mut report = recover_jobs(&harness.store, &harness.transport).unwrap();
    assert_eq!(report.resumed.len(), 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pilot = autopilot(harness.transport.clone(), tx, Duration::from_millis(50));

    let runner = UploadRunner::new(Arc::new(harness.transport.clone()))
        .with_store(harness.store.clone())
        .with_progress_interval(Duration::from_millis(10));
    let progress = RecordingProgress::new();

    let outcomes = runner
        .run_all(
            &mut report.resumed,
            &mut rx,
            &CancellationToken::new(),
            &progress,
        )
        .await
        .unwrap();
    pilot.abort();

    assert_eq!(
        outcomes,
        vec![JobOutcome::Succeeded {
            video_uri: "/videos/1001".to_string(),
            video: None
        }]
    );
    // Resumed jobs are never started again: Create and Upload once each, then Activate.
    assert_eq!(
        harness.started_phases(),
        vec![Phase::Create, Phase::Upload, Phase::Activate]
    );

    let events: Vec<ProgressEvent> = progress.events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Phase {
            phase: Phase::Upload
        })
    );
    assert!(events.contains(&ProgressEvent::Transfer { fraction: 0.5 }));
    assert_eq!(harness.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_closed_stream_is_an_error() {
    let harness = TestHarness::new();
    let file = harness.write_video("clip.mp4");
    let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
    drop(tx);

    let runner = UploadRunner::new(Arc::new(harness.transport.clone()));
    let mut job = UploadJob::new(&file, None);

    let result = runner
        .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
        .await;

    assert!(matches!(
        result,
        Err(vupload::pipeline::RunnerError::CompletionsClosed)
    ));
    assert!(!job.is_completed());
}

#[tokio::test]
async fn test_rejected_create_leaves_no_staged_copy() {
    let harness = TestHarness::new();
    let original = harness.write_video("clip.mp4");
    let staging = StagingArea::new(harness.temp_path().join("staging"));
    let staged = staging.stage(&original).unwrap();

    let (transport, mut rx) = InMemoryTransport::scripted(|_| Outcome::new(401));
    let runner = UploadRunner::new(Arc::new(transport)).with_store(harness.store.clone());
    let mut job = UploadJob::new(&staged, None);

    let outcome = runner
        .run(&mut job, &mut rx, &CancellationToken::new(), &NoopProgress)
        .await
        .unwrap();

    match outcome {
        JobOutcome::Failed(e) => {
            assert_eq!(e.domain, ErrorDomain::Create);
            assert_eq!(e.kind, ErrorKind::BadStatus { status: 401 });
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    // Create never touches the file; the host cleans up its copy.
    assert!(staged.exists());
    assert!(staging.discard(&job));
    assert!(!staged.exists());
    assert!(original.exists());
    assert_eq!(harness.store.count().unwrap(), 0);
}
