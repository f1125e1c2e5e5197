//! Page/location signal. The [`Router`] records the visitor's history and
//! publishes a [`NavigationEvent`] to every subscribed observer on initial
//! load, programmatic navigation, and back navigation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// How the visitor arrived at the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    Load,
    Push,
    Replace,
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub kind: NavigationKind,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// Subscriber notified after every navigation.
pub trait NavigationObserver: Send + Sync {
    fn on_navigate(&self, event: &NavigationEvent);
}

/// Single-tab history with explicit subscriptions.
#[derive(Default)]
pub struct Router {
    history: RwLock<Vec<String>>,
    observers: RwLock<Vec<Arc<dyn NavigationObserver>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn NavigationObserver>) {
        self.observers.write().push(observer);
    }

    /// Initial page load. Resets the history to this one entry.
    pub fn load(&self, location: &str) -> NavigationEvent {
        let path = path_of(location);
        *self.history.write() = vec![path.clone()];
        self.publish(NavigationKind::Load, path)
    }

    /// Programmatic navigation that adds a history entry.
    pub fn push(&self, location: &str) -> NavigationEvent {
        let path = path_of(location);
        self.history.write().push(path.clone());
        self.publish(NavigationKind::Push, path)
    }

    /// Programmatic navigation that rewrites the current entry.
    pub fn replace(&self, location: &str) -> NavigationEvent {
        let path = path_of(location);
        {
            let mut history = self.history.write();
            match history.last_mut() {
                Some(last) => *last = path.clone(),
                None => history.push(path.clone()),
            }
        }
        self.publish(NavigationKind::Replace, path)
    }

    /// Back navigation. `None` when there is no earlier entry.
    pub fn back(&self) -> Option<NavigationEvent> {
        let path = {
            let mut history = self.history.write();
            if history.len() < 2 {
                return None;
            }
            history.pop();
            history.last().cloned()?
        };
        Some(self.publish(NavigationKind::Pop, path))
    }

    pub fn current_path(&self) -> Option<String> {
        self.history.read().last().cloned()
    }

    fn publish(&self, kind: NavigationKind, path: String) -> NavigationEvent {
        let event = NavigationEvent {
            kind,
            path,
            timestamp: Utc::now(),
        };
        debug!(kind = ?event.kind, path = %event.path, "navigation");

        // Observers may navigate again; don't hold the lock while notifying.
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_navigate(&event);
        }
        event
    }
}

/// Extract the path (with query) from an absolute URL or a site-relative location.
pub fn path_of(location: &str) -> String {
    let parsed = Url::parse(location).or_else(|_| {
        Url::parse("http://localhost/").and_then(|base| base.join(location))
    });
    match parsed {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(NavigationKind, String)>>,
    }

    impl NavigationObserver for Recorder {
        fn on_navigate(&self, event: &NavigationEvent) {
            self.seen.lock().push((event.kind, event.path.clone()));
        }
    }

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("https://roofing.example.com/pricing?plan=pro"), "/pricing?plan=pro");
        assert_eq!(path_of("/contact"), "/contact");
        assert_eq!(path_of("services/roof-repair"), "/services/roof-repair");
        assert_eq!(path_of("https://example.com"), "/");
    }

    #[test]
    fn test_observers_see_every_navigation() {
        let router = Router::new();
        let recorder = Arc::new(Recorder::default());
        router.subscribe(recorder.clone());

        router.load("https://example.com/");
        router.push("/pricing");
        router.replace("/pricing?plan=pro");
        router.push("/contact");
        let back = router.back().unwrap();

        assert_eq!(back.path, "/pricing?plan=pro");
        assert_eq!(router.current_path().as_deref(), Some("/pricing?plan=pro"));

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], (NavigationKind::Load, "/".to_string()));
        assert_eq!(seen[2].0, NavigationKind::Replace);
        assert_eq!(seen[4].0, NavigationKind::Pop);
    }

    #[test]
    fn test_back_at_first_entry() {
        let router = Router::new();
        assert!(router.back().is_none());
        router.load("/");
        assert!(router.back().is_none());
        assert_eq!(router.current_path().as_deref(), Some("/"));
    }
}
