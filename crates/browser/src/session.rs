//! Live CDP session against a manager-owned browser profile.

use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use {
    async_trait::async_trait,
    chromiumoxide::{
        Browser, Page,
        cdp::browser_protocol::{
            browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams},
            input::{
                DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
                DispatchMouseEventType, MouseButton,
            },
            page::{CaptureScreenshotFormat, Viewport},
        },
        handler::HandlerConfig,
        page::ScreenshotParams,
    },
    futures::StreamExt,
    tokio::{sync::Mutex, task::JoinHandle, time::sleep},
    tracing::{debug, info, warn},
};

use crate::{
    dom,
    error::BrowserError,
    manager::ManagerClient,
    surface::{Action, Connect, Query, Surface, UiElement},
};

/// Fixed pause after navigating to the target app, letting it boot.
const NAVIGATION_SETTLE: Duration = Duration::from_secs(3);

/// Poll interval while waiting for a file transfer to land on disk.
const TRANSFER_POLL: Duration = Duration::from_millis(500);

/// How the session finds and recognises the target application.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Where to navigate when the attached page is somewhere else.
    pub app_url: String,
    /// Substring of the URL that identifies the target app.
    pub url_fragment: String,
    /// Per-request CDP timeout.
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            app_url: "https://labs.google/fx/tools/whisk".into(),
            url_fragment: "whisk".into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// One live attachment to a browser page. Owned by exactly one job; the
/// owner closes it once, on completion or failure.
pub struct Session {
    identity: String,
    page: Page,
    /// Keeps the CDP websocket alive for the lifetime of the session;
    /// browser-scoped commands (download routing) go through it.
    browser: Browser,
    handler_task: JoinHandle<()>,
    export_dir: Mutex<Option<PathBuf>>,
    closed: AtomicBool,
}

impl Session {
    /// Attach to the browser named by `identity`: ask the manager for a
    /// debug endpoint, connect over CDP, and adopt the first existing page.
    /// Navigates (once, with a settle delay) if the page is not already on
    /// the target app.
    pub async fn connect(
        manager: &ManagerClient,
        identity: &str,
        options: &SessionOptions,
    ) -> Result<Self, BrowserError> {
        let endpoint = manager.open(identity).await?;

        let handler_config = HandlerConfig {
            request_timeout: options.request_timeout,
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(&endpoint, handler_config)
            .await
            .map_err(|e| {
                BrowserError::ConnectFailed(format!("CDP connect to {endpoint} failed: {e}"))
            })?;

        let identity_owned = identity.to_string();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!(identity = identity_owned, ?event, "browser event");
            }
            debug!(identity = identity_owned, "browser event handler exited");
        });

        let pages = match browser.pages().await {
            Ok(pages) => pages,
            Err(e) => {
                handler_task.abort();
                return Err(BrowserError::Cdp(e.to_string()));
            }
        };

        let Some(page) = pages.into_iter().next() else {
            handler_task.abort();
            return Err(BrowserError::NoContext);
        };

        let session = Self {
            identity: identity.to_string(),
            page,
            browser,
            handler_task,
            export_dir: Mutex::new(None),
            closed: AtomicBool::new(false),
        };

        let current = session.current_url().await.unwrap_or_default();
        info!(identity, url = current, "attached to browser page");

        if !current.contains(&options.url_fragment) {
            info!(identity, app_url = options.app_url, "navigating to target app");
            session
                .page
                .goto(options.app_url.as_str())
                .await
                .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
            let _ = session.page.wait_for_navigation().await;
            sleep(NAVIGATION_SETTLE).await;
        }

        Ok(session)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        let press = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(BrowserError::Cdp)?;
        self.page.execute(press).await?;

        let release = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(BrowserError::Cdp)?;
        self.page.execute(release).await?;

        Ok(())
    }

    async fn type_chars(&self, text: &str) -> Result<(), BrowserError> {
        for c in text.chars() {
            for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
                let event = DispatchKeyEventParams::builder()
                    .r#type(kind)
                    .text(c.to_string())
                    .build()
                    .map_err(BrowserError::Cdp)?;
                self.page.execute(event).await?;
            }
        }
        Ok(())
    }

    async fn key_stroke(&self, key: &str, code: &str, text: &str, vk: i64) -> Result<(), BrowserError> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let event = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .code(code)
                .text(text)
                .windows_virtual_key_code(vk)
                .native_virtual_key_code(vk)
                .build()
                .map_err(BrowserError::Cdp)?;
            self.page.execute(event).await?;
        }
        Ok(())
    }
}

/// A completed transfer on disk, as opposed to an in-flight partial file.
fn is_transfer_artifact(name: &str) -> bool {
    !name.ends_with(".crdownload") && !name.ends_with(".tmp") && !name.starts_with('.')
}

async fn list_dir(dir: &Path) -> Result<HashSet<OsString>, BrowserError> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name());
    }
    Ok(names)
}

#[async_trait]
impl Surface for Session {
    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn find_visible(&self, query: &Query) -> Option<UiElement> {
        dom::find_all_visible(&self.page, query).await.into_iter().next()
    }

    async fn find_all_visible(&self, query: &Query) -> Vec<UiElement> {
        dom::find_all_visible(&self.page, query).await
    }

    async fn act(&self, element: &UiElement, action: Action) -> bool {
        match action {
            Action::Click => {
                let Some((x, y)) = dom::center_of(&self.page, element.handle).await else {
                    debug!(handle = element.handle, "element vanished before click");
                    return false;
                };
                match self.click_at(x, y).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(handle = element.handle, error = %e, "click dispatch failed");
                        false
                    }
                }
            }
            Action::ClearAndType(text) => {
                if !dom::focus_and_select_all(&self.page, element.handle).await {
                    debug!(handle = element.handle, "element vanished before typing");
                    return false;
                }
                match self.type_chars(&text).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(handle = element.handle, error = %e, "typing failed");
                        false
                    }
                }
            }
            Action::SelectValue(value) => {
                dom::select_value(&self.page, element.handle, &value).await
            }
        }
    }

    async fn press_enter(&self) -> bool {
        match self.key_stroke("Enter", "Enter", "\r", 13).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "enter dispatch failed");
                false
            }
        }
    }

    async fn input_value(&self, element: &UiElement) -> Option<String> {
        dom::read_value(&self.page, element.handle).await
    }

    async fn prepare_exports(&self, dir: &Path) -> bool {
        {
            let mut export_dir = self.export_dir.lock().await;
            if export_dir.as_deref() == Some(dir) {
                return true;
            }
            *export_dir = Some(dir.to_path_buf());
        }

        let params = match SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.to_string_lossy().to_string())
            .build()
        {
            Ok(params) => params,
            Err(e) => {
                warn!(error = e, "invalid download behaviour params");
                return false;
            }
        };

        match self.browser.execute(params).await {
            Ok(_) => {
                debug!(dir = %dir.display(), "export directory prepared");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to set download behaviour");
                false
            }
        }
    }

    async fn export(&self, element: &UiElement, timeout: Duration) -> Result<PathBuf, BrowserError> {
        let dir = self
            .export_dir
            .lock()
            .await
            .clone()
            .ok_or_else(|| BrowserError::ExportFailed("export directory not prepared".into()))?;

        let before = list_dir(&dir).await?;

        if !self.act(element, Action::Click).await {
            return Err(BrowserError::ExportFailed(
                "export control did not accept the click".into(),
            ));
        }

        // The transfer is observed on disk: a new, fully written file in the
        // export directory that was not there before the click.
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::ExportFailed(format!(
                    "no transfer finished within {}s",
                    timeout.as_secs()
                )));
            }
            sleep(TRANSFER_POLL).await;

            let now = list_dir(&dir).await?;
            let fresh = now.difference(&before).find(|name| {
                name.to_str().map(is_transfer_artifact).unwrap_or(false)
            });
            if let Some(name) = fresh {
                debug!(file = ?name, "transfer landed");
                return Ok(dir.join(name));
            }
        }
    }

    async fn capture(&self, element: &UiElement) -> Result<Vec<u8>, BrowserError> {
        let b = element.bounds;
        if b.width <= 0.0 || b.height <= 0.0 {
            return Err(BrowserError::CaptureFailed("element has no rendered area".into()));
        }

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                scale: 1.0,
            })
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::CaptureFailed(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Detach only: the manager owns the browser's lifetime, so we stop
        // processing its events and let the websocket drop with the session.
        self.handler_task.abort();
        info!(identity = self.identity, "detached from browser session");
    }
}

/// [`Connect`] implementation backed by the browser-manager + CDP.
pub struct CdpConnector {
    manager: ManagerClient,
    options: SessionOptions,
}

impl CdpConnector {
    pub fn new(manager: ManagerClient, options: SessionOptions) -> Self {
        Self { manager, options }
    }
}

#[async_trait]
impl Connect for CdpConnector {
    type Surface = Session;

    async fn connect(&self, identity: &str) -> Result<Session, BrowserError> {
        Session::connect(&self.manager, identity, &self.options).await
    }
}
