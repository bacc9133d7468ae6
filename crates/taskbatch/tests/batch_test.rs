//! End-to-end batch runs through `TaskRunner`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskbatch::prelude::*;

fn runner(max_workers: usize, retries: u32) -> TaskRunner {
    TaskRunner::from_settings(
        "test",
        Settings {
            max_workers,
            retries,
            ..Default::default()
        },
    )
    .unwrap()
}

fn temp_file(contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("taskbatch-{}.txt", uuid::Uuid::now_v7()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[derive(Debug, thiserror::Error)]
#[error("backend rejected {0}")]
struct Rejected(String);

#[test_log::test]
fn count_source_doubles_every_index() {
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);

    {
        let runner = runner(2, 2);
        runner
            .submit_tasks(
                5usize,
                TaskFn::blocking(|t: &Target<usize>| Ok(t.data() * 2)),
                Callbacks::new().on_success(move |_: &Target<usize>, r: &usize| sink.lock().push(*r)),
                SubmitOptions::new(),
            )
            .unwrap();
        // Drop waits for all tasks and callbacks
    }

    let mut results = results.lock().clone();
    results.sort();
    assert_eq!(results, vec![0, 2, 4, 6, 8]);
}

#[test_log::test]
fn failing_items_retry_then_report_error_once() {
    let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let items: Vec<String> = (0..10).map(|i| format!("data-{i}")).collect();
    let tracked = Arc::clone(&attempts);
    let task = TaskFn::blocking(move |t: &Target<String>| {
        *tracked.lock().entry(t.data().clone()).or_insert(0) += 1;
        if t.data() == "data-3" || t.data() == "data-7" {
            return Err(Rejected(t.data().clone()).into());
        }
        Ok(t.data().to_uppercase())
    });

    let s = Arc::clone(&successes);
    let e = Arc::clone(&errors);
    let callbacks = Callbacks::new()
        .on_success(move |_: &Target<String>, _: &String| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |t: &Target<String>, err: &anyhow::Error| {
            assert!(err.downcast_ref::<Rejected>().is_some());
            e.lock().push(t.data().clone());
        });

    let runner = runner(3, 1);
    let handles = runner
        .submit_tasks(items, task, callbacks, SubmitOptions::new())
        .unwrap();
    assert_eq!(handles.len(), 10);
    for handle in handles {
        let _ = handle.wait();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 8);
    let mut failed = errors.lock().clone();
    failed.sort();
    assert_eq!(failed, vec!["data-3".to_string(), "data-7".to_string()]);

    let attempts = attempts.lock();
    assert_eq!(attempts["data-3"], 2);
    assert_eq!(attempts["data-7"], 2);
    assert_eq!(attempts["data-0"], 1);
}

#[test_log::test]
fn exhausted_task_returns_original_error() {
    let runner = runner(1, 0);
    let handles = runner
        .submit_tasks(
            vec!["x".to_string()],
            TaskFn::blocking(|t: &Target<String>| -> anyhow::Result<()> {
                Err(Rejected(t.data().clone()).into())
            }),
            Callbacks::new(),
            SubmitOptions::new().with_retries(2),
        )
        .unwrap();

    let err = handles.into_iter().next().unwrap().wait().unwrap_err();
    let rejected = err.downcast_ref::<Rejected>().unwrap();
    assert_eq!(rejected.0, "x");
}

#[test_log::test]
fn task_runs_at_most_retries_plus_one_times() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let runner = runner(1, 0);
    let handle = runner
        .submit_tasks(
            1usize,
            TaskFn::blocking(move |_: &Target<usize>| -> anyhow::Result<()> {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always down")
            }),
            Callbacks::new(),
            SubmitOptions::new()
                .with_retries(3)
                .with_retry_delay(Duration::from_millis(1)),
        )
        .unwrap()
        .pop()
        .unwrap();

    assert!(handle.wait().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test_log::test]
fn file_lines_are_split_into_fields() {
    let path = temp_file("a|1\n\nb|2\n");
    let rows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rows);

    let runner = runner(2, 0);
    let handles = runner
        .submit_tasks_from_file(
            &path,
            "|",
            TaskFn::blocking(|t: &Target<Vec<String>>| Ok(t.data().clone())),
            Callbacks::new().on_success(move |_: &Target<Vec<String>>, r: &Vec<String>| {
                sink.lock().push(r.clone())
            }),
            SubmitOptions::new(),
        )
        .unwrap();
    assert_eq!(handles.len(), 2);
    runner.shutdown(true);

    let mut rows = rows.lock().clone();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec!["a".to_string(), "1".to_string()],
            vec!["b".to_string(), "2".to_string()],
        ]
    );
    std::fs::remove_file(path).unwrap();
}

#[test_log::test]
fn file_source_uses_default_separator() {
    let path = temp_file("user----secret\n");
    let runner = runner(1, 0);

    let handles = runner
        .submit_tasks_from_file(
            &path,
            DEFAULT_SEPARATOR,
            TaskFn::blocking(|t: &Target<Vec<String>>| Ok(t.data().len())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let fields: Vec<usize> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(fields, vec![2]);
    std::fs::remove_file(path).unwrap();
}

#[test_log::test]
fn missing_file_submits_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let runner = runner(1, 0);
    let handles = runner
        .submit_tasks_from_file(
            std::env::temp_dir().join("taskbatch-does-not-exist.txt"),
            DEFAULT_SEPARATOR,
            TaskFn::blocking(move |_: &Target<Vec<String>>| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    assert!(handles.is_empty());
    runner.shutdown(true);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test_log::test]
fn async_tasks_run_on_worker_runtimes() {
    let runner = runner(2, 1);
    let handles = runner
        .submit_tasks(
            6usize,
            TaskFn::suspending(|t: Arc<Target<usize>>| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(*t.data() + 100)
            }),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let mut results: Vec<usize> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    results.sort();
    assert_eq!(results, vec![100, 101, 102, 103, 104, 105]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn handles_can_be_awaited() {
    let runner = runner(2, 0);
    let handles = runner
        .submit_tasks(
            3usize,
            TaskFn::blocking(|t: &Target<usize>| Ok(t.index())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let results = futures::future::join_all(handles).await;
    let indices: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test_log::test]
fn shuffle_preserves_items_and_assigns_sequential_indices() {
    let runner = TaskRunner::from_settings(
        "shuffled",
        Settings {
            max_workers: 4,
            shuffle: true,
            ..Default::default()
        },
    )
    .unwrap();

    let items: Vec<u32> = (0..50).collect();
    let handles = runner
        .submit_tasks(
            items.clone(),
            TaskFn::blocking(|t: &Target<u32>| Ok((t.index(), *t.data()))),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let pairs: Vec<(usize, u32)> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    let indices: Vec<usize> = pairs.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..50).collect::<Vec<_>>());

    let mut data: Vec<u32> = pairs.iter().map(|(_, d)| *d).collect();
    data.sort();
    assert_eq!(data, items);
}

#[test_log::test]
fn count_sources_are_never_shuffled() {
    let runner = TaskRunner::from_settings(
        "ranged",
        Settings {
            max_workers: 2,
            shuffle: true,
            ..Default::default()
        },
    )
    .unwrap();

    let handles = runner
        .submit_tasks(
            20usize,
            TaskFn::blocking(|t: &Target<usize>| Ok(*t.data() == t.index())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();
    assert!(handles.into_iter().all(|h| h.wait().unwrap()));
}

#[test_log::test]
fn ipv6_proxy_template_is_preferred_when_enabled() {
    let runner = TaskRunner::from_settings(
        "proxied",
        Settings {
            max_workers: 1,
            proxy: Some("http://v4-*****".to_string()),
            proxy_ipv6: Some("http://v6-*****".to_string()),
            use_ipv6: true,
            ..Default::default()
        },
    )
    .unwrap();

    let handles = runner
        .submit_tasks(
            vec![vec!["u".to_string(), "p".to_string()]],
            TaskFn::blocking(|t: &Target<Vec<String>>| Ok(t.proxy().map(str::to_string))),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let proxy = handles.into_iter().next().unwrap().wait().unwrap();
    assert_eq!(proxy.as_deref(), Some("http://v6-u_p"));
}

#[test_log::test]
fn invalid_json_source_fails_before_submitting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let runner = runner(1, 0);

    let err = runner
        .submit_tasks(
            serde_json::json!("abc"),
            TaskFn::blocking(move |_: &Target<serde_json::Value>| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap_err();

    assert!(matches!(err, Error::InvalidSource(_)));
    runner.shutdown(true);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test_log::test]
fn json_array_source_uses_items() {
    let runner = runner(2, 0);
    let handles = runner
        .submit_tasks(
            serde_json::json!(["a", 2]),
            TaskFn::blocking(|t: &Target<serde_json::Value>| Ok(t.data().clone())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap();

    let values: Vec<serde_json::Value> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(values, vec![serde_json::json!("a"), serde_json::json!(2)]);
}

#[test_log::test]
fn negative_count_is_rejected() {
    let runner = runner(1, 0);
    let err = runner
        .submit_tasks(
            -3i64,
            TaskFn::blocking(|_: &Target<i64>| Ok(())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSource(_)));
}

#[test_log::test]
fn panicking_task_is_reported_as_error() {
    let failures = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&failures);

    let runner = runner(1, 0);
    let handle = runner
        .submit_tasks(
            1usize,
            TaskFn::blocking(|_: &Target<usize>| -> anyhow::Result<()> { panic!("boom") }),
            Callbacks::new().on_error(move |_: &Target<usize>, _: &anyhow::Error| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
            SubmitOptions::new(),
        )
        .unwrap()
        .pop()
        .unwrap();

    let err = handle.wait().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::TaskPanicked(_))
    ));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[test_log::test]
fn submit_after_shutdown_is_rejected() {
    let runner = runner(1, 0);
    runner.shutdown(true);

    let err = runner
        .submit_tasks(
            vec![1u32],
            TaskFn::blocking(|_: &Target<u32>| Ok(())),
            Callbacks::new(),
            SubmitOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::PoolShutDown));
}
