//! Scripted in-memory [`Surface`] for exercising the engine without a
//! browser. One script entry per generation cycle; a cycle becomes
//! current when the submit keystroke fires.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    easel_browser::{Action, Bounds, BrowserError, Connect, Query, Surface, UiElement},
};

use crate::types::{AspectRatio, Selectors};

/// One export slot the scripted cycle produces.
#[derive(Debug, Clone)]
pub(crate) struct MockExport {
    pub x: f64,
    pub export_ok: bool,
    pub capture_ok: bool,
}

impl MockExport {
    pub fn ok(x: f64) -> Self {
        Self { x, export_ok: true, capture_ok: true }
    }

    /// Native export fails, capture works.
    pub fn capture_only(x: f64) -> Self {
        Self { x, export_ok: false, capture_ok: true }
    }

    /// Both paths fail; the slot should be skipped.
    pub fn dead(x: f64) -> Self {
        Self { x, export_ok: false, capture_ok: false }
    }
}

/// What one generation cycle does.
#[derive(Debug, Clone)]
pub(crate) struct IterationScript {
    /// Whether results and affordances appear at all.
    pub generates: bool,
    pub exports: Vec<MockExport>,
}

#[derive(Debug)]
struct MockState {
    selectors: Selectors,
    script: Vec<IterationScript>,
    garbled_input: bool,
    triggered: AtomicUsize,
    panel_open: AtomicBool,
    mutations: AtomicUsize,
    typed: Mutex<Option<String>>,
    selected_ratio: Mutex<Option<String>>,
    export_dir: Mutex<Option<PathBuf>>,
    transfer_seq: AtomicUsize,
    closed: AtomicUsize,
}

/// Cloneable handle; clones share the same scripted state, so a connector
/// can keep one for later inspection.
#[derive(Debug, Clone)]
pub(crate) struct MockSurface {
    state: Arc<MockState>,
}

fn element(handle: u32, tag: &str, text: Option<&str>, bounds: Bounds) -> UiElement {
    UiElement {
        handle,
        tag: tag.into(),
        text: text.map(String::from),
        value: None,
        bounds,
    }
}

fn box_at(x: f64, y: f64, edge: f64) -> Bounds {
    Bounds { x, y, width: edge, height: edge }
}

impl MockSurface {
    pub fn scripted(script: Vec<IterationScript>) -> Self {
        Self {
            state: Arc::new(MockState {
                selectors: Selectors::default(),
                script,
                garbled_input: false,
                triggered: AtomicUsize::new(0),
                panel_open: AtomicBool::new(false),
                mutations: AtomicUsize::new(0),
                typed: Mutex::new(None),
                selected_ratio: Mutex::new(None),
                export_dir: Mutex::new(None),
                transfer_seq: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the prompt input report a value different from what was typed.
    pub fn with_garbled_input(self) -> Self {
        let state = Arc::try_unwrap(self.state).expect("garble before cloning");
        Self {
            state: Arc::new(MockState { garbled_input: true, ..state }),
        }
    }

    pub fn mutations(&self) -> usize {
        self.state.mutations.load(Ordering::SeqCst)
    }

    pub fn selected_ratio(&self) -> Option<String> {
        self.state.selected_ratio.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Scripts for all cycles triggered so far that actually generate.
    fn generated(&self) -> Vec<&IterationScript> {
        let triggered = self.state.triggered.load(Ordering::SeqCst).min(self.state.script.len());
        self.state.script[..triggered].iter().filter(|s| s.generates).collect()
    }

    /// The most recently triggered cycle, if it generates.
    fn current(&self) -> Option<&IterationScript> {
        let triggered = self.state.triggered.load(Ordering::SeqCst);
        if triggered == 0 || self.state.script.is_empty() {
            return None;
        }
        let index = (triggered - 1).min(self.state.script.len() - 1);
        self.state.script.get(index).filter(|s| s.generates)
    }

    fn current_export(&self, x: f64) -> Option<MockExport> {
        self.current()?.exports.iter().find(|e| e.x == x).cloned()
    }

    fn elements_for(&self, css: &str) -> Vec<UiElement> {
        let s = &self.state.selectors;
        if css == s.prompt_input {
            return vec![element(1, "textarea", None, box_at(0.0, 0.0, 200.0))];
        }
        if css == s.settings_toggle {
            return vec![element(2, "button", Some("settings"), box_at(10.0, 10.0, 24.0))];
        }
        if css == s.ratio_option {
            if !self.state.panel_open.load(Ordering::SeqCst) {
                return Vec::new();
            }
            return AspectRatio::ALL
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    element(10 + i as u32, "button", Some(r.label()), box_at(20.0 * i as f64, 40.0, 18.0))
                })
                .collect();
        }
        if css == s.result_image {
            return self
                .generated()
                .iter()
                .flat_map(|script| script.exports.iter())
                .enumerate()
                .map(|(i, e)| {
                    element(100 + i as u32, "img", None, box_at(e.x, 100.0, 400.0))
                })
                .collect();
        }
        if css == s.export_control {
            let Some(current) = self.current() else { return Vec::new() };
            return current
                .exports
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    element(200 + i as u32, "button", None, box_at(e.x, 520.0, 32.0))
                })
                .collect();
        }
        Vec::new()
    }
}

#[async_trait]
impl Surface for MockSurface {
    async fn current_url(&self) -> Option<String> {
        Some("https://labs.google/fx/tools/whisk/project".into())
    }

    async fn find_visible(&self, query: &Query) -> Option<UiElement> {
        self.find_all_visible(query).await.into_iter().next()
    }

    async fn find_all_visible(&self, query: &Query) -> Vec<UiElement> {
        let mut elements = self.elements_for(&query.css);
        if let Some(text) = &query.text {
            elements.retain(|el| el.text.as_deref().is_some_and(|t| t.contains(text.as_str())));
        }
        elements
    }

    async fn act(&self, element: &UiElement, action: Action) -> bool {
        self.state.mutations.fetch_add(1, Ordering::SeqCst);
        match action {
            Action::Click => {
                if element.text.as_deref() == Some("settings") {
                    self.state.panel_open.store(true, Ordering::SeqCst);
                }
                if let Some(text) = &element.text {
                    if AspectRatio::ALL.iter().any(|r| r.label() == text) {
                        *self.state.selected_ratio.lock().unwrap() = Some(text.clone());
                        self.state.panel_open.store(false, Ordering::SeqCst);
                    }
                }
                true
            }
            Action::ClearAndType(text) => {
                *self.state.typed.lock().unwrap() = Some(text);
                true
            }
            Action::SelectValue(value) => {
                *self.state.selected_ratio.lock().unwrap() = Some(value);
                true
            }
        }
    }

    async fn press_enter(&self) -> bool {
        self.state.triggered.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn input_value(&self, _element: &UiElement) -> Option<String> {
        if self.state.garbled_input {
            return Some(String::new());
        }
        self.state.typed.lock().unwrap().clone()
    }

    async fn prepare_exports(&self, dir: &Path) -> bool {
        *self.state.export_dir.lock().unwrap() = Some(dir.to_path_buf());
        true
    }

    async fn export(&self, element: &UiElement, _timeout: Duration) -> Result<PathBuf, BrowserError> {
        let export = self
            .current_export(element.bounds.x)
            .ok_or_else(|| BrowserError::ExportFailed("no such slot".into()))?;
        if !export.export_ok {
            return Err(BrowserError::ExportFailed("scripted export failure".into()));
        }

        let dir = self
            .state
            .export_dir
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BrowserError::ExportFailed("transfers not routed".into()))?;
        let n = self.state.transfer_seq.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(format!("transfer_{n}.jpg"));
        tokio::fs::write(&path, b"jpg-bytes").await?;
        Ok(path)
    }

    async fn capture(&self, element: &UiElement) -> Result<Vec<u8>, BrowserError> {
        let export = self
            .current_export(element.bounds.x)
            .ok_or_else(|| BrowserError::CaptureFailed("no such visual".into()))?;
        if !export.capture_ok {
            return Err(BrowserError::CaptureFailed("scripted capture failure".into()));
        }
        Ok(b"png-bytes".to_vec())
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing out clones of one scripted surface, or refusing to
/// connect at all.
pub(crate) struct MockConnector {
    surface: MockSurface,
    fail: bool,
}

impl MockConnector {
    pub fn serving(surface: MockSurface) -> Self {
        Self { surface, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            surface: MockSurface::scripted(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl Connect for MockConnector {
    type Surface = MockSurface;

    async fn connect(&self, identity: &str) -> Result<MockSurface, BrowserError> {
        if self.fail {
            return Err(BrowserError::ManagerRejected(format!("no profile {identity}")));
        }
        Ok(self.surface.clone())
    }
}
