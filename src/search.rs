//! Search context: the last query, its results, and the observers that
//! render them.
//!
//! [`SearchContext::search`] is the only writer. After each completed
//! search every registered observer is called, synchronously and in
//! registration order, with a shared view of the context.

use async_trait::async_trait;
use chrono::Utc;

use crate::config::Config;
use crate::error::Result;
use crate::index::DocumentIndex;
use crate::models::SearchResult;
use crate::ui::RefreshTarget;

/// Receives the context after every completed search.
///
/// Implementations must return quickly; there is no isolation between
/// observers.
pub trait SearchObserver {
    fn on_search_results_updated(&mut self, context: &SearchContext);
}

impl<F> SearchObserver for F
where
    F: FnMut(&SearchContext),
{
    fn on_search_results_updated(&mut self, context: &SearchContext) {
        (self)(context)
    }
}

/// Returned by [`SearchContext::register`]; pass to
/// [`SearchContext::unregister`] to detach the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

pub struct SearchContext {
    index: DocumentIndex,
    last_query: String,
    last_results: Vec<SearchResult>,
    observers: Vec<(ObserverToken, Box<dyn SearchObserver>)>,
    next_token: u64,
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("last_query", &self.last_query)
            .field("last_results", &self.last_results.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SearchContext {
    pub fn new(index: DocumentIndex) -> Self {
        Self {
            index,
            last_query: String::new(),
            last_results: Vec::new(),
            observers: Vec::new(),
            next_token: 0,
        }
    }

    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn last_results(&self) -> &[SearchResult] {
        &self.last_results
    }

    pub fn register(&mut self, observer: impl SearchObserver + 'static) -> ObserverToken {
        let token = ObserverToken(self.next_token);
        self.next_token += 1;
        self.observers.push((token, Box::new(observer)));
        token
    }

    /// Returns whether the token was still registered.
    pub fn unregister(&mut self, token: ObserverToken) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(t, _)| *t != token);
        self.observers.len() != before
    }

    /// Runs `query`, stores it with its results, and notifies observers.
    ///
    /// On failure the previous query and results are left untouched and no
    /// observer is called.
    pub async fn search(&mut self, query: &str) -> Result<Vec<String>> {
        let results = self.index.search(query).await?;

        self.last_query = query.to_string();
        self.last_results = results;
        self.notify();

        Ok(self
            .last_results
            .iter()
            .map(|r| r.file.filename.clone())
            .collect())
    }

    /// Repeats the last query against the current index.
    pub async fn rerun(&mut self) -> Result<Vec<String>> {
        let query = self.last_query.clone();
        self.search(&query).await
    }

    pub fn notify(&mut self) {
        tracing::debug!(
            observers = self.observers.len(),
            results = self.last_results.len(),
            "notifying search observers"
        );

        // Observers see `&self`, so they are detached while they run.
        let mut observers = std::mem::take(&mut self.observers);
        for (_, observer) in observers.iter_mut() {
            observer.on_search_results_updated(self);
        }
        self.observers = observers;
    }
}

#[async_trait(?Send)]
impl RefreshTarget for SearchContext {
    async fn index_refreshed(&mut self) {
        if let Err(e) = self.rerun().await {
            tracing::error!(error = %e, query = %self.last_query, "re-running search failed");
        }
    }
}

/// Prints results the way `nv search` shows them.
pub fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    let now = Utc::now();
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. {}  ({})",
            i + 1,
            result.filename(),
            result.format_modified(now)
        );
        let excerpt = result.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
        if !excerpt.is_empty() {
            println!("    excerpt: \"{}\"", excerpt);
        }
    }
}

/// One-shot search for the CLI.
pub async fn run_search(config: &Config, query: &str, json: bool) -> anyhow::Result<()> {
    let index = DocumentIndex::open(&config.db.path, config.search_options()).await?;
    let results = index.search(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }

    index.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchOptions;
    use crate::models::FileRef;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    async fn context_with(docs: &[(&str, &str)]) -> (TempDir, SearchContext) {
        let tmp = TempDir::new().unwrap();
        let index = DocumentIndex::open(&tmp.path().join("nv.db"), SearchOptions::default())
            .await
            .unwrap();
        for (name, body) in docs {
            let file = FileRef::new(*name, "fp", Utc::now());
            index.upsert(&file, body.as_bytes()).await.unwrap();
        }
        (tmp, SearchContext::new(index))
    }

    #[tokio::test]
    async fn test_search_notifies_observers_in_order() {
        let (_tmp, mut ctx) = context_with(&[("apples in zoo.md", "new york\nseattle")]).await;
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = seen.clone();
        ctx.register(move |c: &SearchContext| {
            first.borrow_mut().push(("first", c.last_results().len()));
        });
        let second = seen.clone();
        ctx.register(move |c: &SearchContext| {
            second.borrow_mut().push(("second", c.last_results().len()));
        });

        let names = ctx.search("seattle").await.unwrap();

        assert_eq!(names, vec!["apples in zoo.md"]);
        assert_eq!(*seen.borrow(), vec![("first", 1), ("second", 1)]);
        assert_eq!(ctx.last_query(), "seattle");
        assert!(ctx.last_results()[0].snippet.contains("**seattle**"));
    }

    #[tokio::test]
    async fn test_unregistered_observer_is_not_called() {
        let (_tmp, mut ctx) = context_with(&[]).await;
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        let token = ctx.register(move |_: &SearchContext| *counter.borrow_mut() += 1);
        ctx.search("").await.unwrap();
        assert!(ctx.unregister(token));
        assert!(!ctx.unregister(token));
        ctx.search("").await.unwrap();

        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn test_rerun_uses_last_query() {
        let (_tmp, mut ctx) = context_with(&[("a.md", "walrus")]).await;
        ctx.search("walrus").await.unwrap();

        let file = FileRef::new("b.md", "fp", Utc::now());
        ctx.index.upsert(&file, b"walrus too").await.unwrap();
        ctx.index_refreshed().await;

        assert_eq!(ctx.last_query(), "walrus");
        assert_eq!(ctx.last_results().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_search_keeps_previous_results() {
        let (_tmp, mut ctx) = context_with(&[("a.md", "walrus")]).await;
        ctx.search("walrus").await.unwrap();

        ctx.index.close().await;
        assert!(ctx.search("other").await.is_err());

        assert_eq!(ctx.last_query(), "walrus");
        assert_eq!(ctx.last_results().len(), 1);
    }
}
