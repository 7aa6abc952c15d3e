mod common;

use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use cm_admin::config::Polling;
use cm_admin::dashboard::Dashboard;
use cm_admin::error::ApiError;
use cm_admin::poller::{self, FailurePolicy, PollConfig, PollState};
use common::{mailing_json, RecordingApi};

fn boom() -> ApiError {
    ApiError::Business {
        status: 503,
        detail: "unavailable".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn polls_at_fixed_interval() {
    let count = Arc::new(AtomicU32::new(0));
    let c = count.clone();
    let handle = poller::spawn("counter", PollConfig::every(Duration::from_secs(5)), move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(handle.state(), PollState::Running { ticks: 3 });

    let mut state = handle.subscribe();
    handle.shutdown().await;
    assert_eq!(*state.borrow_and_update(), PollState::Stopped);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn next_poll_waits_for_the_previous_to_settle() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let s = starts.clone();
    let origin = Instant::now();
    let _handle = poller::spawn("slow", PollConfig::every(Duration::from_secs(5)), move || {
        let s = s.clone();
        async move {
            s.lock().unwrap().push(origin.elapsed().as_secs());
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_secs(17)).await;
    assert_eq!(*starts.lock().unwrap(), vec![0, 8, 16]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_polling() {
    let count = Arc::new(AtomicU32::new(0));
    let c = count.clone();
    let handle = poller::spawn("dropped", PollConfig::every(Duration::from_secs(1)), move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn stop_policy_ends_chain_on_first_failure() {
    let count = Arc::new(AtomicU32::new(0));
    let c = count.clone();
    let config = PollConfig::every(Duration::from_secs(5))
        .with_policy(FailurePolicy::Stop, Duration::from_secs(60));
    let handle = poller::spawn("fragile", config, move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Err(boom())
        }
    });

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(matches!(handle.state(), PollState::Failed { attempts: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn retry_policy_backs_off_then_recovers() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let s = starts.clone();
    let origin = Instant::now();
    let config = PollConfig::every(Duration::from_secs(5))
        .with_policy(FailurePolicy::Retry, Duration::from_secs(300));
    let handle = poller::spawn("flaky", config, move || {
        let s = s.clone();
        async move {
            let n = {
                let mut starts = s.lock().unwrap();
                starts.push(origin.elapsed().as_secs());
                starts.len()
            };
            if n <= 2 {
                Err(boom())
            } else {
                Ok(())
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(matches!(handle.state(), PollState::Failed { attempts: 2, .. }));

    tokio::time::sleep(Duration::from_secs(9)).await;
    // 0 fails, +5 fails, +10 succeeds
    assert_eq!(*starts.lock().unwrap(), vec![0, 5, 15]);
    assert_eq!(handle.state(), PollState::Running { ticks: 1 });
}

#[tokio::test(start_paused = true)]
async fn refresh_now_skips_the_delay() {
    let count = Arc::new(AtomicU32::new(0));
    let c = count.clone();
    let handle = poller::spawn("manual", PollConfig::every(Duration::from_secs(600)), move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    handle.refresh_now();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_without_consuming_the_handle() {
    let count = Arc::new(AtomicU32::new(0));
    let c = count.clone();
    let handle = poller::spawn("cancelled", PollConfig::every(Duration::from_secs(2)), move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    handle.cancel();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(handle.state(), PollState::Stopped);
}

fn dashboard_api() -> RecordingApi {
    RecordingApi::new()
        .ok("count_mailings", json!({"total": 12}))
        .ok("count_recipients", json!({"total": 3400}))
        .ok("count_satellites", json!({"total": 2}))
        .ok(
            "query_mailings",
            json!({"items": [mailing_json(7, "RUNNING")], "total": 1}),
        )
        .ok(
            "hourly_stats",
            json!({"items": [{"epoch_hour": 400000, "tries": 10, "sent": 9, "failed": 1}]}),
        )
        .ok("cpu", json!({"user": 10.0, "system": 5.0, "idle": 85.0}))
        .ok("memory", json!({"total": 4096, "available": 1024}))
        .ok("disk", json!({"total": 1000, "used": 400, "free": 600}))
}

#[tokio::test(start_paused = true)]
async fn dashboard_widgets_poll_independently() {
    let api = Arc::new(dashboard_api());
    let board = Dashboard::start(api.clone(), &Polling::default());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let summary = board.summary();
    assert_eq!(summary.mailings, Some(12));
    assert_eq!(summary.recipients, Some(3400));
    assert_eq!(summary.satellites, Some(2));
    assert_eq!(summary.running.as_ref().unwrap().items[0].id, 7);
    assert_eq!(board.active().mailings.unwrap().items.len(), 1);
    assert_eq!(board.hourly().sent.values, vec![(400000, 9)]);
    let gauges = board.gauges();
    assert_eq!(gauges.memory[0].y, 3072.0);
    assert_eq!(gauges.disk[1].y, 600.0);

    // realtime every 5 s, disk every 600 s
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(api.calls_to("cpu").len(), 5);
    assert_eq!(api.calls_to("disk").len(), 1);
    assert_eq!(api.calls_to("count_mailings").len(), 1);

    board.shutdown().await;
    let cpu_calls = api.calls_to("cpu").len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.calls_to("cpu").len(), cpu_calls);
}

#[tokio::test(start_paused = true)]
async fn moving_the_hourly_window_refetches() {
    let api = Arc::new(dashboard_api());
    let board = Dashboard::start(api.clone(), &Polling::default());
    tokio::time::sleep(Duration::from_secs(1)).await;
    let first = api.calls_to("hourly_stats");
    assert_eq!(first.len(), 1);
    assert!(first[0].param("to_date").is_none());

    board.hourly_prev();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = api.calls_to("hourly_stats");
    assert_eq!(calls.len(), 2);
    assert!(calls[1].param("from_date").is_some());
    assert!(calls[1].param("to_date").is_some());
    assert_eq!(board.hourly().offset, -24);

    board.hourly_next();
    board.hourly_next();
    assert_eq!(board.hourly().offset, 0);
}

#[tokio::test(start_paused = true)]
async fn resizing_the_hourly_window_refetches() {
    let api = Arc::new(dashboard_api());
    let board = Dashboard::start(api.clone(), &Polling::default());
    tokio::time::sleep(Duration::from_secs(1)).await;

    board.hourly_slice(6);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = api.calls_to("hourly_stats");
    assert_eq!(calls.len(), 2);
    assert!(calls[1].param("from_date").is_some());
    assert!(calls[1].param("to_date").is_none());
    assert_eq!(board.hourly().slice, 6);

    board.hourly_prev();
    assert_eq!(board.hourly().offset, -6);
    board.shutdown().await;
}
