//! Configuration schema.
//!
//! Everything is optional in the file; missing sections fall back to
//! defaults that match the hosted target app, so a bare `easel.toml` with
//! just a `[manager]` section is a working setup. Unrecognised keys are
//! ignored, so a file written by a newer version still loads.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EaselConfig {
    pub manager: ManagerSection,
    pub target: TargetSection,
    pub defaults: DefaultsSection,
    pub selectors: SelectorSection,
}

/// Browser-manager service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    /// Base URL of the browser-manager REST API.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:50213".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Where the target web app lives and how to recognise it by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    pub app_url: String,
    /// Substring of the page URL that identifies the app.
    pub url_fragment: String,
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            app_url: "https://labs.google/fx/tools/whisk".into(),
            url_fragment: "whisk".into(),
        }
    }
}

/// Job defaults and the values remembered from the last run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub last_identity: Option<String>,
    pub last_prompt: Option<String>,
    /// Aspect ratio label, e.g. "16:9".
    pub last_ratio: String,
    /// Artifacts expected per generation cycle.
    pub last_count: u32,
    pub output_dir: String,
    pub file_prefix: String,
    /// Place each job's artifacts in its own subfolder.
    pub per_job_subfolder: bool,
    /// Use element capture when a native export fails.
    pub enhanced_capture: bool,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_concurrent: usize,
    pub generation_timeout_secs: u64,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            last_identity: None,
            last_prompt: None,
            last_ratio: "1:1".into(),
            last_count: 2,
            output_dir: "output".into(),
            file_prefix: "easel".into(),
            per_job_subfolder: true,
            enhanced_capture: true,
            min_delay_secs: 5,
            max_delay_secs: 8,
            max_concurrent: 2,
            generation_timeout_secs: 300,
        }
    }
}

/// CSS entry points into the target app's UI. Overridable because the app
/// ships new markup without notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub prompt_input: String,
    /// Control that opens the generation settings panel.
    pub settings_toggle: String,
    /// Candidate elements for aspect-ratio options; matched by label.
    pub ratio_option: String,
    pub result_image: String,
    pub export_control: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            prompt_input: "textarea".into(),
            settings_toggle: "button[aria-label*='settings' i]".into(),
            ratio_option: "button".into(),
            result_image: "img[src]".into(),
            export_control: "button[aria-label*='download' i]".into(),
        }
    }
}
