//! The interaction seam between job logic and a live page.
//!
//! Find/act primitives are fail-soft: "not found" is `None`/an empty vec
//! and a failed action is `false`, never an error. Callers decide whether
//! to continue, log-and-skip, or fall back. Only `export` and `capture`
//! return `Result`, because the download coordinator needs to tell an
//! export failure (triggers the capture fallback) from a capture failure
//! (skips the slot).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {async_trait::async_trait, serde::Deserialize};

use crate::error::BrowserError;

/// An element query: CSS selector plus an optional rendered-text filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub css: String,
    pub text: Option<String>,
}

impl Query {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Rendered bounding box, in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A visible element located by a [`Query`].
///
/// `handle` is a page-scoped tag assigned when the element was found; it
/// stays valid as long as the element remains in the DOM.
#[derive(Debug, Clone)]
pub struct UiElement {
    pub handle: u32,
    pub tag: String,
    pub text: Option<String>,
    pub value: Option<String>,
    pub bounds: Bounds,
}

/// Actions that can be applied to a located element.
#[derive(Debug, Clone)]
pub enum Action {
    Click,
    /// Clear the current value, then type the given text.
    ClearAndType(String),
    /// Directly select a value on a `<select>` control.
    SelectValue(String),
}

/// One live attachment to a browser page.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Current page URL, if the page is still reachable.
    async fn current_url(&self) -> Option<String>;

    /// First visible element matching the query, in DOM order.
    async fn find_visible(&self, query: &Query) -> Option<UiElement>;

    /// All visible elements matching the query, in DOM order.
    async fn find_all_visible(&self, query: &Query) -> Vec<UiElement>;

    /// Apply an action to an element. Returns `false` if the element
    /// vanished or the dispatch failed.
    async fn act(&self, element: &UiElement, action: Action) -> bool;

    /// Send an activation keystroke to the focused element.
    async fn press_enter(&self) -> bool;

    /// Read the current value of an input element.
    async fn input_value(&self, element: &UiElement) -> Option<String>;

    /// Route file transfers for this page into `dir`. Idempotent.
    async fn prepare_exports(&self, dir: &Path) -> bool;

    /// Trigger a native export on `element` and wait (bounded) for the
    /// transfer to finish. Returns the path of the transferred file inside
    /// the export directory.
    async fn export(&self, element: &UiElement, timeout: Duration) -> Result<PathBuf, BrowserError>;

    /// Capture the rendered pixels of `element` as PNG bytes.
    async fn capture(&self, element: &UiElement) -> Result<Vec<u8>, BrowserError>;

    /// Detach from the page. Safe to call more than once; only the first
    /// call has an effect.
    async fn close(&self);
}

/// Factory for sessions; the scheduler's seam to the connector.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    type Surface: Surface + Send + Sync + 'static;

    async fn connect(&self, identity: &str) -> Result<Self::Surface, BrowserError>;
}
