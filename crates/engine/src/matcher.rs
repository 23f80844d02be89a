//! Label matching for option selection.
//!
//! The target app renders option labels inconsistently across UI versions
//! ("16:9", "16 : 9", "Landscape 16:9"). Matching is an ordered list of
//! strategies tried in priority order; the first hit wins.

use easel_browser::UiElement;

/// One matching strategy over a set of candidate elements.
pub trait LabelMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pick the candidate matching `wanted`, or `None`.
    fn pick<'a>(&self, wanted: &str, candidates: &'a [UiElement]) -> Option<&'a UiElement>;
}

/// Trimmed label equals the wanted text exactly.
pub struct ExactLabel;

impl LabelMatcher for ExactLabel {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn pick<'a>(&self, wanted: &str, candidates: &'a [UiElement]) -> Option<&'a UiElement> {
        candidates
            .iter()
            .find(|el| el.text.as_deref().map(str::trim) == Some(wanted))
    }
}

/// Both sides lowered and stripped of whitespace and separator punctuation,
/// then matched by substring.
pub struct NormalizedContains;

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ':' | '-' | '_' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl LabelMatcher for NormalizedContains {
    fn name(&self) -> &'static str {
        "normalized"
    }

    fn pick<'a>(&self, wanted: &str, candidates: &'a [UiElement]) -> Option<&'a UiElement> {
        let wanted = normalize(wanted);
        if wanted.is_empty() {
            return None;
        }
        candidates
            .iter()
            .find(|el| el.text.as_deref().map(normalize).is_some_and(|t| t.contains(&wanted)))
    }
}

/// The standard strategy order.
pub fn default_matchers() -> Vec<Box<dyn LabelMatcher>> {
    vec![Box::new(ExactLabel), Box::new(NormalizedContains)]
}

/// Try each matcher in order; returns the winning strategy's name and the
/// matched element.
pub fn select_match<'a>(
    matchers: &[Box<dyn LabelMatcher>],
    wanted: &str,
    candidates: &'a [UiElement],
) -> Option<(&'static str, &'a UiElement)> {
    matchers
        .iter()
        .find_map(|m| m.pick(wanted, candidates).map(|el| (m.name(), el)))
}
