//! Integration tests for streaming output, the sync/async split and the
//! parse cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use weft::{
    CacheOption, ContextValue, Engine, EngineOptions, FileSystem, FilterImpl, MemoryFileSystem,
    WeftError,
};

fn scope(pairs: &[(&str, ContextValue)]) -> ContextValue {
    ContextValue::Object(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    )
}

/// Counts file reads so cache behavior is observable.
struct CountingFs {
    inner: MemoryFileSystem,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl FileSystem for CountingFs {
    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    fn exists_sync(&self, path: &str) -> bool {
        self.inner.exists_sync(path)
    }

    async fn read_file(&self, path: &str) -> Result<String, WeftError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_file(path).await
    }

    fn read_file_sync(&self, path: &str) -> Result<String, WeftError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_file_sync(path)
    }

    fn resolve(&self, dir: &str, file: &str, ext: &str) -> String {
        self.inner.resolve(dir, file, ext)
    }

    fn dirname(&self, file: &str) -> Option<String> {
        self.inner.dirname(file)
    }

    fn contains(&self, root: &str, path: &str) -> bool {
        self.inner.contains(root, path)
    }
}

fn counting_engine<'a>(
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
    cache: CacheOption,
) -> (Engine, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let engine = Engine::with_options(EngineOptions {
        root: vec!["/t".to_string()],
        cache,
        fs: Arc::new(CountingFs {
            inner: MemoryFileSystem::with_files(files),
            reads: reads.clone(),
        }),
        ..EngineOptions::default()
    })
    .unwrap();
    (engine, reads)
}

/// A filter that genuinely suspends, like any I/O-backed host filter.
struct PauseFilter;

#[async_trait]
impl FilterImpl for PauseFilter {
    async fn call(
        &self,
        input: ContextValue,
        _args: &[ContextValue],
        _kwargs: &[(String, ContextValue)],
    ) -> Result<ContextValue, WeftError> {
        tokio::task::yield_now().await;
        Ok(input)
    }
}

#[tokio::test]
async fn test_stream_preserves_chunk_order() {
    let engine = Engine::new();
    let templates = engine.parse("a{{ x }}b").unwrap();
    let stream = engine.render_stream(&templates, scope(&[("x", ContextValue::Integer(1))]));
    let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
    assert_eq!(chunks, vec!["a", "1", "b"]);
}

#[tokio::test]
async fn test_stream_concatenation_matches_buffered_render() {
    let engine = Engine::new();
    let templates = engine
        .parse("{% each i in (1..20) %}{{ i }};{% endeach %}")
        .unwrap();
    let buffered = engine.render(&templates, scope(&[])).await.unwrap();
    let stream = engine.render_stream(&templates, scope(&[]));
    let streamed: String = stream.map(Result::unwrap).collect::<Vec<_>>().await.concat();
    assert_eq!(streamed, buffered);
}

#[tokio::test]
async fn test_dropping_the_stream_cancels_the_render() {
    let engine = Engine::new();
    let templates = engine
        .parse("{% each i in (1..100000) %}x{% endeach %}")
        .unwrap();
    let mut stream = engine.render_stream(&templates, scope(&[]));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, "x");
    // the render only runs while polled, so dropping it here abandons
    // the remaining iterations
    drop(stream);
}

#[tokio::test]
async fn test_stream_surfaces_render_errors() {
    let engine = Engine::with_options(EngineOptions {
        strict_variables: true,
        ..EngineOptions::default()
    })
    .unwrap();
    let templates = engine.parse("a{{ missing }}z").unwrap();
    let items: Vec<Result<String, WeftError>> =
        engine.render_stream(&templates, scope(&[])).collect().await;
    assert!(items
        .iter()
        .any(|item| matches!(item, Err(WeftError::UndefinedVariable(name)) if name == "missing")));
    assert!(!items.iter().any(|item| matches!(item, Ok(chunk) if chunk == "z")));
}

#[test]
fn test_sync_render_rejects_suspending_filters() {
    let mut engine = Engine::new();
    engine.register_filter("pause", Arc::new(PauseFilter));
    let err = engine
        .parse_and_render_sync("{{ x | pause }}", scope(&[("x", ContextValue::Integer(1))]))
        .unwrap_err();
    assert!(matches!(err, WeftError::Async(_)));
}

#[tokio::test]
async fn test_async_render_drives_suspending_filters() {
    let mut engine = Engine::new();
    engine.register_filter("pause", Arc::new(PauseFilter));
    let out = engine
        .parse_and_render("{{ x | pause }}", scope(&[("x", ContextValue::Integer(1))]))
        .await
        .unwrap();
    assert_eq!(out, "1");
}

#[tokio::test]
async fn test_parse_cache_reads_each_file_once() {
    // RUST_LOG=weft=debug shows the cache hit/miss lines
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let (engine, reads) = counting_engine([("/t/a", "A-{{ x }}")], CacheOption::Limit(4));
    for x in 0..3 {
        let out = engine
            .render_file("a", scope(&[("x", ContextValue::Integer(x))]))
            .await
            .unwrap();
        assert_eq!(out, format!("A-{x}"));
    }
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_renders_share_one_parse() {
    let (engine, reads) = counting_engine([("/t/a", "A")], CacheOption::Limit(4));
    let (first, second) = tokio::join!(
        engine.render_file("a", scope(&[])),
        engine.render_file("a", scope(&[])),
    );
    assert_eq!(first.unwrap(), "A");
    assert_eq!(second.unwrap(), "A");
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_limit_evicts_least_recently_used() {
    let (engine, reads) = counting_engine([("/t/a", "A"), ("/t/b", "B")], CacheOption::Limit(1));
    engine.render_file("a", scope(&[])).await.unwrap();
    engine.render_file("b", scope(&[])).await.unwrap();
    engine.render_file("a", scope(&[])).await.unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_zero_capacity_cache_retains_nothing() {
    let (engine, reads) = counting_engine([("/t/a", "A")], CacheOption::Limit(0));
    engine.render_file("a", scope(&[])).await.unwrap();
    engine.render_file("a", scope(&[])).await.unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_sync_renders_use_the_cache_too() {
    let (engine, reads) = counting_engine([("/t/a", "A")], CacheOption::Limit(4));
    engine.render_file_sync("a", scope(&[])).unwrap();
    engine.render_file_sync("a", scope(&[])).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_parse_is_not_cached() {
    let (engine, reads) = counting_engine(
        [("/t/bad", "{% if x %}never closed")],
        CacheOption::Limit(4),
    );
    assert!(engine.render_file("bad", scope(&[])).await.is_err());
    assert!(engine.render_file("bad", scope(&[])).await.is_err());
    // both attempts re-read the file, the failure never sticks
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}
