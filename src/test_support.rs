//! Scripted fakes shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::download::Downloader;
use crate::error::{AppError, Result};
use crate::models::{ChapterRef, MangaKey, TrackedManga};
use crate::notify::{Message, Notifier};
use crate::source::Source;
use crate::storage::{MemoryStore, StateStore};

/// Untitled chapters with the given ids.
pub fn chapters(manga_id: &str, ids: &[&str]) -> Vec<ChapterRef> {
    ids.iter().map(|id| ChapterRef::new(manga_id, *id)).collect()
}

/// Source returning canned chapter lists.
pub struct FakeSource {
    id: String,
    chapters: HashMap<String, Vec<ChapterRef>>,
    failing: HashSet<String>,
    pages: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            chapters: HashMap::new(),
            failing: HashSet::new(),
            pages: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_chapters(mut self, manga_id: &str, ids: &[&str]) -> Self {
        self.chapters
            .insert(manga_id.to_string(), chapters(manga_id, ids));
        self
    }

    pub fn failing(mut self, manga_id: &str) -> Self {
        self.failing.insert(manga_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Page URLs returned for every chapter.
    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.pages = pages;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(manga_id) {
            return Err(AppError::source_unavailable(
                &self.id,
                manga_id,
                "scripted failure",
            ));
        }
        Ok(self.chapters.get(manga_id).cloned().unwrap_or_default())
    }

    async fn fetch_pages(&self, _chapter: &ChapterRef) -> Result<Vec<String>> {
        Ok(self.pages.clone())
    }
}

/// Store key for a manga served by the `demo` source.
pub fn demo_key(manga_id: &str) -> MangaKey {
    MangaKey::new("demo", manga_id)
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_puts: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn tracked(&self) -> Result<Vec<TrackedManga>> {
        self.inner.tracked().await
    }

    async fn track(&self, manga: TrackedManga) -> Result<()> {
        self.inner.track(manga).await
    }

    async fn untrack(&self, key: &MangaKey) -> Result<bool> {
        self.inner.untrack(key).await
    }

    async fn get(&self, key: &MangaKey) -> Result<Vec<ChapterRef>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &MangaKey, chapters: &[ChapterRef]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        self.inner.put(key, chapters).await
    }

    async fn touch(&self, key: &MangaKey, checked_at: DateTime<Utc>) -> Result<()> {
        self.inner.touch(key, checked_at).await
    }
}

/// What a scripted download attempt does.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Succeed,
    Transient,
    Fatal,
    Panic,
    /// Never completes; only the attempt timeout ends it
    Hang,
}

/// Downloader that plays back a script of outcomes.
pub struct FakeDownloader {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl FakeDownloader {
    /// Play `steps` in order, then succeed.
    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: Step::Succeed,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::scripted(Vec::new()).with_fallback(step)
    }

    fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, _manga: &TrackedManga, chapter: &ChapterRef) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Lock released before a scripted panic so the mutex is not poisoned.
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match step {
            Step::Succeed => Ok(PathBuf::from("/tmp/fake").join(&chapter.id)),
            Step::Transient => Err(AppError::DownloadTransient("503".to_string())),
            Step::Fatal => Err(AppError::DownloadFatal("404".to_string())),
            Step::Panic => panic!("scripted downloader panic"),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Notifier recording every message it is asked to send.
pub struct FakeNotifier {
    name: String,
    fail: bool,
    delay: Option<Duration>,
    sent: Mutex<Vec<Message>>,
}

impl FakeNotifier {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &Message) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(AppError::notify(&self.name, "channel rejected message"));
        }
        Ok(())
    }
}

/// A request seen by [`HttpStub`].
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StubRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal HTTP/1.1 server on localhost answering from a fixed route table.
///
/// Unknown paths get a 404. Every connection serves one request.
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

impl HttpStub {
    pub async fn start(routes: Vec<(&str, u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<HashMap<String, (u16, Vec<u8>)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body)))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let _ = serve_one(stream, &routes, &seen).await;
                });
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_one(
    mut stream: TcpStream,
    routes: &HashMap<String, (u16, Vec<u8>)>,
    seen: &Mutex<Vec<StubRequest>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = buf[head_end..].to_vec();

    let route_path = path.split('?').next().unwrap_or_default();
    let (status, payload) = routes
        .get(route_path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));

    seen.lock().unwrap().push(StubRequest {
        method,
        path,
        headers,
        body,
    });

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        payload.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    Ok(())
}
