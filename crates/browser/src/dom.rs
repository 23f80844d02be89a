//! Visible-element lookup and low-level DOM helpers.
//!
//! Elements are located by evaluating JavaScript in the page and tagging
//! each match with a `data-easel-ref` attribute, so later actions can find
//! the same node again without relying on selector stability. "Visible"
//! means present in the DOM and laid out with a non-zero rendered size.

use {
    chromiumoxide::Page,
    serde::Deserialize,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    error::BrowserError,
    surface::{Bounds, Query, UiElement},
};

/// JavaScript to find visible elements matching a CSS selector and an
/// optional text filter, tagging each match with a stable ref attribute.
const FIND_VISIBLE_JS: &str = r#"
((css, text) => {
    let nodes;
    try {
        nodes = document.querySelectorAll(css);
    } catch (e) {
        return { error: String(e) };
    }

    if (!window.__easelRefSeq) window.__easelRefSeq = 1;
    const results = [];

    for (const el of nodes) {
        const rect = el.getBoundingClientRect();
        const style = getComputedStyle(el);
        if (rect.width <= 0 || rect.height <= 0) continue;
        if (style.visibility === 'hidden' || style.display === 'none') continue;

        const label = (el.innerText || el.textContent || '').trim();
        if (text) {
            const aria = el.getAttribute('aria-label') || '';
            if (!label.includes(text) && !aria.includes(text)) continue;
        }

        if (!el.dataset.easelRef) {
            el.dataset.easelRef = String(window.__easelRefSeq++);
        }

        results.push({
            handle: Number(el.dataset.easelRef),
            tag: el.tagName.toLowerCase(),
            text: label ? label.slice(0, 200) : null,
            value: ('value' in el) ? String(el.value ?? '') : null,
            bounds: { x: rect.x, y: rect.y, width: rect.width, height: rect.height }
        });
    }

    return { elements: results };
})
"#;

/// JavaScript to locate the centre of a previously tagged element.
const CENTER_BY_REF_JS: &str = r#"
((ref) => {
    const el = document.querySelector(`[data-easel-ref="${ref}"]`);
    if (!el) return null;
    const rect = el.getBoundingClientRect();
    return { x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 };
})
"#;

#[derive(Debug, Deserialize)]
struct ExtractResult {
    #[serde(default)]
    elements: Vec<RawElement>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    handle: u32,
    tag: String,
    text: Option<String>,
    value: Option<String>,
    bounds: Bounds,
}

impl From<RawElement> for UiElement {
    fn from(raw: RawElement) -> Self {
        UiElement {
            handle: raw.handle,
            tag: raw.tag,
            text: raw.text,
            value: raw.value,
            bounds: raw.bounds,
        }
    }
}

async fn eval(page: &Page, js: String) -> Result<Value, BrowserError> {
    page.evaluate(js.as_str())
        .await
        .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::JsEvalFailed(format!("failed to get result: {e:?}")))
}

fn json_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "null".into())
}

/// Find all visible elements matching `query`, in DOM order. Fail-soft:
/// evaluation problems are logged and yield an empty vec.
pub(crate) async fn find_all_visible(page: &Page, query: &Query) -> Vec<UiElement> {
    let text = match &query.text {
        Some(t) => json_str(t),
        None => "null".into(),
    };
    let js = format!("({FIND_VISIBLE_JS})({}, {})", json_str(&query.css), text);

    let value = match eval(page, js).await {
        Ok(v) => v,
        Err(e) => {
            warn!(css = query.css, error = %e, "element lookup failed");
            return Vec::new();
        }
    };

    match parse_extract(value) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(css = query.css, error = %e, "element lookup returned an error");
            Vec::new()
        }
    }
}

fn parse_extract(value: Value) -> Result<Vec<UiElement>, BrowserError> {
    let result: ExtractResult = serde_json::from_value(value)
        .map_err(|e| BrowserError::JsEvalFailed(format!("malformed extraction result: {e}")))?;

    if let Some(error) = result.error {
        return Err(BrowserError::JsEvalFailed(error));
    }

    Ok(result.elements.into_iter().map(UiElement::from).collect())
}

/// Centre of a tagged element, if it is still in the DOM.
pub(crate) async fn center_of(page: &Page, handle: u32) -> Option<(f64, f64)> {
    let js = format!("({CENTER_BY_REF_JS})({handle})");
    let value = match eval(page, js).await {
        Ok(v) => v,
        Err(e) => {
            debug!(handle, error = %e, "centre lookup failed");
            return None;
        }
    };

    if value.is_null() {
        return None;
    }
    Some((value["x"].as_f64()?, value["y"].as_f64()?))
}

/// Focus a tagged element and select its current content so the next typed
/// character replaces it.
pub(crate) async fn focus_and_select_all(page: &Page, handle: u32) -> bool {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector(`[data-easel-ref="{handle}"]`);
            if (!el) return false;
            el.focus();
            if (typeof el.select === 'function') {{
                el.select();
            }} else {{
                const sel = window.getSelection();
                const range = document.createRange();
                range.selectNodeContents(el);
                sel.removeAllRanges();
                sel.addRange(range);
            }}
            return true;
        }})()"#
    );

    matches!(eval(page, js).await, Ok(v) if v.as_bool() == Some(true))
}

/// Read the current value of a tagged input element.
pub(crate) async fn read_value(page: &Page, handle: u32) -> Option<String> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector(`[data-easel-ref="{handle}"]`);
            if (!el || !('value' in el)) return null;
            return String(el.value ?? '');
        }})()"#
    );

    eval(page, js)
        .await
        .ok()
        .and_then(|v| v.as_str().map(String::from))
}

/// Set the value of a tagged `<select>` control directly, firing the usual
/// input/change events.
pub(crate) async fn select_value(page: &Page, handle: u32, value: &str) -> bool {
    let js = format!(
        r#"((v) => {{
            const el = document.querySelector(`[data-easel-ref="{handle}"]`);
            if (!el) return false;
            el.value = v;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return el.value === v;
        }})({})"#,
        json_str(value)
    );

    matches!(eval(page, js).await, Ok(v) if v.as_bool() == Some(true))
}
