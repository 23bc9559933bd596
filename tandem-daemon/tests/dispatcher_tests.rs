//! Document event dispatcher ordering and lifecycle.

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;

use tandem_core::{DocumentEvent, EditorId, EditorRef};
use tandem_daemon::{DaemonError, EventDispatcher, FileManager};

fn dispatcher() -> (Arc<EditorRef>, Arc<FileManager>, Arc<EventDispatcher>) {
    let editor = Arc::new(EditorRef::new(EditorId(1)));
    let files = Arc::new(FileManager::new());
    let dispatcher = Arc::new(EventDispatcher::spawn(&editor, files.clone()));
    (editor, files, dispatcher)
}

async fn next(rx: &mut tokio::sync::broadcast::Receiver<DocumentEvent>) -> DocumentEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("event")
}

/// Poll the file model until it holds `n` documents.
async fn wait_for_documents(files: &FileManager, n: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if files.len().await == n {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Producers take turns on a shared counter so the global enqueue order is known.
struct Turns {
    next: Mutex<usize>,
    cv: Condvar,
}

impl Turns {
    fn run(&self, turn: usize, f: impl FnOnce()) {
        let mut next = self
            .cv
            .wait_while(self.next.lock().unwrap(), |n| *n != turn)
            .unwrap();
        f();
        *next += 1;
        self.cv.notify_all();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interleaved_producers_are_observed_in_enqueue_order() {
    let (_editor, _files, dispatcher) = dispatcher();
    let mut rx = dispatcher.subscribe();

    let expected = vec![
        DocumentEvent::open("/p/f1"),
        DocumentEvent::change("/p/f1"),
        DocumentEvent::open("/p/f2"),
        DocumentEvent::close("/p/f1"),
        DocumentEvent::change("/p/f2"),
    ];
    // Thread A enqueues steps 0, 1, 3; thread B enqueues 2, 4.
    let plan: [&[usize]; 2] = [&[0, 1, 3], &[2, 4]];
    let turns = Arc::new(Turns {
        next: Mutex::new(0),
        cv: Condvar::new(),
    });

    let producers: Vec<_> = plan
        .iter()
        .map(|steps| {
            let steps = steps.to_vec();
            let turns = turns.clone();
            let dispatcher = dispatcher.clone();
            let events = expected.clone();
            std::thread::spawn(move || {
                for step in steps {
                    let event = events[step].clone();
                    turns.run(step, || dispatcher.dispatch(event).expect("dispatch"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer");
    }

    let mut observed = Vec::new();
    for _ in 0..expected.len() {
        observed.push(next(&mut rx).await);
    }
    assert_eq!(observed, expected);
}

#[tokio::test]
async fn many_events_keep_their_order() {
    let (_editor, _files, dispatcher) = dispatcher();
    let mut rx = dispatcher.subscribe();

    dispatcher.dispatch(DocumentEvent::open("/p/a")).unwrap();
    for _ in 0..200 {
        dispatcher.dispatch(DocumentEvent::change("/p/a")).unwrap();
    }
    dispatcher.dispatch(DocumentEvent::save("/p/a")).unwrap();
    dispatcher.dispatch(DocumentEvent::close("/p/a")).unwrap();

    assert_eq!(next(&mut rx).await, DocumentEvent::open("/p/a"));
    for _ in 0..200 {
        assert_eq!(next(&mut rx).await, DocumentEvent::change("/p/a"));
    }
    assert_eq!(next(&mut rx).await, DocumentEvent::save("/p/a"));
    assert_eq!(next(&mut rx).await, DocumentEvent::close("/p/a"));
}

#[tokio::test]
async fn file_model_is_updated_before_rebroadcast() {
    let (_editor, files, dispatcher) = dispatcher();
    let mut rx = dispatcher.subscribe();
    let path = Path::new("/p/main.rs");

    dispatcher.dispatch(DocumentEvent::open(path)).unwrap();
    next(&mut rx).await;
    assert_eq!(files.document(path).await.map(|d| d.version), Some(0));

    dispatcher.dispatch(DocumentEvent::change(path)).unwrap();
    next(&mut rx).await;
    assert_eq!(files.document(path).await.map(|d| d.version), Some(1));

    dispatcher.dispatch(DocumentEvent::selected(path)).unwrap();
    next(&mut rx).await;
    assert_eq!(files.document(path).await.map(|d| d.version), Some(1));

    dispatcher.dispatch(DocumentEvent::close(path)).unwrap();
    next(&mut rx).await;
    assert!(!files.is_open(path).await);
}

#[tokio::test]
async fn released_editor_still_drains_but_does_not_rebroadcast() {
    let (editor, files, dispatcher) = dispatcher();
    let mut rx = dispatcher.subscribe();

    editor.release();
    dispatcher.dispatch(DocumentEvent::open("/p/a")).unwrap();

    assert!(wait_for_documents(&files, 1).await, "event was dequeued");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn dropped_editor_is_treated_as_released() {
    let (editor, files, dispatcher) = dispatcher();
    let mut rx = dispatcher.subscribe();
    drop(editor);

    dispatcher.dispatch(DocumentEvent::open("/p/a")).unwrap();
    dispatcher.dispatch(DocumentEvent::change("/p/a")).unwrap();

    assert!(wait_for_documents(&files, 1).await);
    // Change is processed after open; wait for the version bump too.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while files.document(Path::new("/p/a")).await.map(|d| d.version) != Some(1) {
        assert!(tokio::time::Instant::now() < deadline, "change was dequeued");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn destroy_stops_the_consumer() {
    let (_editor, _files, dispatcher) = dispatcher();
    dispatcher.destroy("editor closed").await;

    assert!(dispatcher.is_destroyed());
    let err = dispatcher
        .dispatch(DocumentEvent::open("/p/a"))
        .unwrap_err();
    assert!(matches!(err, DaemonError::ChannelClosed(_)), "got: {err}");
}
