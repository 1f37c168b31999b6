//! In-memory [`NoteApi`] for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, BackupCount, Endpoint, NoteApi};

/// Scripted responses plus call counters.
///
/// Every call sleeps for `delay` first, so paused-time tests can hold a call
/// in flight while they poke at the component under test.
#[derive(Debug)]
pub(crate) struct MockApi {
    pub send_calls: AtomicUsize,
    pub test_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub purge_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    send_result: Mutex<Result<String, ApiError>>,
    fetch_result: Mutex<Result<String, ApiError>>,
    cleanup_result: Mutex<Result<String, ApiError>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            send_calls: AtomicUsize::new(0),
            test_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            purge_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            send_result: Mutex::new(Ok("sent".to_string())),
            fetch_result: Mutex::new(Ok("remote note".to_string())),
            cleanup_result: Mutex::new(Ok("deleted".to_string())),
        }
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn set_send_result(&self, result: Result<String, ApiError>) {
        *self.send_result.lock().unwrap() = result;
    }

    pub fn set_fetch_result(&self, result: Result<String, ApiError>) {
        *self.fetch_result.lock().unwrap() = result;
    }

    pub fn set_cleanup_result(&self, result: Result<String, ApiError>) {
        *self.cleanup_result.lock().unwrap() = result;
    }

    pub fn sends(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NoteApi for MockApi {
    async fn send_text(&self, _endpoint: &Endpoint, text: &str) -> Result<String, ApiError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(text.to_string());
        self.pause().await;
        self.send_result.lock().unwrap().clone()
    }

    async fn test_connection(&self, _endpoint: &Endpoint, text: &str) -> Result<String, ApiError> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(text.to_string());
        self.pause().await;
        self.send_result.lock().unwrap().clone()
    }

    async fn fetch_latest_note(&self, _endpoint: &Endpoint) -> Result<String, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.fetch_result.lock().unwrap().clone()
    }

    async fn delete_all_inbox(&self, _endpoint: &Endpoint) -> Result<String, ApiError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.cleanup_result.lock().unwrap().clone()
    }

    async fn purge_backups(&self, _endpoint: &Endpoint) -> Result<String, ApiError> {
        self.purge_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.cleanup_result.lock().unwrap().clone()
    }

    async fn backup_count(&self, _endpoint: &Endpoint) -> Result<BackupCount, ApiError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.cleanup_result
            .lock()
            .unwrap()
            .clone()
            .map(|message| BackupCount { count: 7, message })
    }
}

/// A configuration with every endpoint and token set.
pub(crate) fn configured() -> crate::config::Config {
    let mut config = crate::config::Config::default();
    config.server.send_url = "https://notes.example/api.php".to_string();
    config.server.receive_url = "https://notes.example/api.php".to_string();
    config.server.cleanup_url = "https://notes.example/cleanup.php".to_string();
    config.server.token = "note-token".to_string();
    config.server.cleanup_token = "cleanup-token".to_string();
    config
}
