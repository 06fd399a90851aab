//! Redisplay gate for recycled display containers.
//!
//! A container in a scrolling list is detached and reattached
//! independently of whether the request bound to it changed. Detaching
//! clears what it shows. On reattach the gate decides whether the bound
//! request still has its committed result, or whether the last known
//! request should be replayed from the memory cache without decoding
//! again.
//!
//! The gate is a plain single-owner value driven from the container's
//! own context.

use std::fmt;

use crate::request::TransformOptions;

/// Key and options of the request bound to a container.
#[derive(Debug, Clone)]
pub struct DisplayCache {
    key: String,
    options: TransformOptions,
}

impl DisplayCache {
    /// Create a new display cache entry.
    #[must_use]
    pub fn new(key: impl Into<String>, options: TransformOptions) -> Self {
        Self {
            key: key.into(),
            options,
        }
    }

    /// Request key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Request options.
    #[must_use]
    pub const fn options(&self) -> &TransformOptions {
        &self.options
    }
}

/// How a container handled a "display is about to be set" call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    /// The result was shown.
    Accepted,
    /// The call was a no-op that suppressed the default behavior.
    Suppressed,
}

/// What [`RedisplayGate::on_reattached`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReattachOutcome {
    /// A fresh result is bound; nothing to do.
    Fresh,
    /// The committed result still belongs to the bound request.
    Unchanged,
    /// No request was ever bound.
    NothingToReplay,
    /// A replay was already attempted since the last detach or commit.
    AlreadyReplayed,
    /// The cached result was displayed again.
    Redisplayed,
    /// A replay was attempted but the cache had nothing.
    CacheMiss,
}

/// Observes replays right before the cached image is applied.
pub trait RedisplayListener {
    /// Called before a cached result is committed to the container.
    fn on_pre_commit(&self, cache_key: &str, cache_options: &TransformOptions);
}

/// Default listener: log replays at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRedisplay;

impl RedisplayListener for LogRedisplay {
    fn on_pre_commit(&self, cache_key: &str, _cache_options: &TransformOptions) {
        log::debug!("restoring {cache_key} on reattach");
    }
}

/// Replays a cached result into a container.
pub trait Redisplay {
    /// Display `cache` again from the memory cache, calling
    /// `listener.on_pre_commit` before the image is applied. Returns
    /// `false` on a cache miss.
    fn redisplay(&mut self, cache: &DisplayCache, listener: &dyn RedisplayListener) -> bool;
}

impl<F> Redisplay for F
where
    F: FnMut(&DisplayCache, &dyn RedisplayListener) -> bool,
{
    fn redisplay(&mut self, cache: &DisplayCache, listener: &dyn RedisplayListener) -> bool {
        self(cache, listener)
    }
}

/// Per-container redisplay state machine.
pub struct RedisplayGate<L = LogRedisplay> {
    listener: L,
    has_fresh_result: bool,
    last_known: Option<DisplayCache>,
    /// Key of the request whose result was last committed.
    committed_key: Option<String>,
    replay_attempted: bool,
}

impl<L: RedisplayListener> RedisplayGate<L> {
    /// Create a gate that reports replays to `listener`.
    #[must_use]
    pub const fn new(listener: L) -> Self {
        Self {
            listener,
            has_fresh_result: false,
            last_known: None,
            committed_key: None,
            replay_attempted: false,
        }
    }

    /// The listener used for every replay.
    #[must_use]
    pub const fn listener(&self) -> &L {
        &self.listener
    }

    /// Whether the container shows a result for its bound request.
    #[must_use]
    pub const fn has_fresh_result(&self) -> bool {
        self.has_fresh_result
    }

    /// The request most recently bound to the container.
    #[must_use]
    pub const fn last_known(&self) -> Option<&DisplayCache> {
        self.last_known.as_ref()
    }

    /// A request was bound to the container.
    pub fn bind(&mut self, cache: DisplayCache) {
        self.last_known = Some(cache);
    }

    /// A result was committed to the container.
    pub fn on_result_committed(&mut self) {
        self.has_fresh_result = true;
        self.committed_key = self.last_known.as_ref().map(|cache| cache.key.clone());
        self.replay_attempted = false;
    }

    /// The container was told a display is about to be set.
    pub fn on_display_set(&mut self, outcome: DisplayOutcome) {
        if outcome == DisplayOutcome::Accepted {
            self.on_result_committed();
        }
    }

    /// The container was detached from its window.
    pub fn on_detached(&mut self) {
        self.has_fresh_result = false;
        self.replay_attempted = false;
    }

    /// The container was reattached to a window.
    pub fn on_reattached(&mut self, redisplay: &mut impl Redisplay) -> ReattachOutcome {
        if self.has_fresh_result {
            return ReattachOutcome::Fresh;
        }
        let Some(cache) = &self.last_known else {
            return ReattachOutcome::NothingToReplay;
        };
        if self.committed_key.as_deref() == Some(cache.key()) {
            self.has_fresh_result = true;
            return ReattachOutcome::Unchanged;
        }
        if self.replay_attempted {
            return ReattachOutcome::AlreadyReplayed;
        }

        self.replay_attempted = true;
        log::debug!("replaying {} on reattach", cache.key());
        if redisplay.redisplay(cache, &self.listener) {
            self.committed_key = Some(cache.key.clone());
            self.has_fresh_result = true;
            ReattachOutcome::Redisplayed
        } else {
            ReattachOutcome::CacheMiss
        }
    }
}

impl Default for RedisplayGate {
    fn default() -> Self {
        Self::new(LogRedisplay)
    }
}

impl<L: fmt::Debug> fmt::Debug for RedisplayGate<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisplayGate")
            .field("listener", &self.listener)
            .field("has_fresh_result", &self.has_fresh_result)
            .field("last_known", &self.last_known.as_ref().map(DisplayCache::key))
            .field("committed_key", &self.committed_key)
            .field("replay_attempted", &self.replay_attempted)
            .finish()
    }
}
