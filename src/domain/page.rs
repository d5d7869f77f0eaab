//! Compiled pages and their frontmatter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A `meta` value may be a single string or a list (e.g. `keywords`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    One(String),
    Many(Vec<String>),
}

/// Frontmatter attached to every page.
///
/// Authors edit content without running the site, so every field tolerates
/// being absent. Fields beyond the core set land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Frontmatter {
    pub archived: bool,
    pub draft: bool,
    pub unlisted: bool,
    pub title: String,
    pub description: String,
    pub meta: BTreeMap<String, MetaValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Frontmatter {
    /// Caller-defined string field, e.g. a decision's `status`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.extra_str("status")
    }

    pub fn decision_number(&self) -> Option<u64> {
        self.extra.get("decisionNumber").and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        })
    }

    /// Slug of the replacing decision when `status` reads `superseded, <slug>`.
    pub fn superseded_by(&self) -> Option<&str> {
        let (state, target) = self.status()?.split_once(',')?;
        if !state.trim().eq_ignore_ascii_case("superseded") {
            return None;
        }
        let target = target.trim();
        (!target.is_empty()).then_some(target)
    }

    /// The `date` exactly as written; blank counts as absent.
    pub fn date_display(&self) -> Option<String> {
        let raw = self.date.as_deref()?;
        (!raw.trim().is_empty()).then(|| raw.to_string())
    }
}

/// Output of the page compiler before cache decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMdx {
    /// Serialized, render-ready page body.
    pub code: String,
    pub frontmatter: Frontmatter,
}

/// A compiled page as served to the route layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPage {
    pub code: String,
    pub slug: String,
    pub edit_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_display: Option<String>,
    pub frontmatter: Frontmatter,
}

impl CompiledPage {
    pub fn from_compiled(compiled: CompiledMdx, slug: impl Into<String>, edit_link: String) -> Self {
        let date_display = compiled.frontmatter.date_display();
        Self {
            code: compiled.code,
            slug: slug.into(),
            edit_link,
            date_display,
            frontmatter: compiled.frontmatter,
        }
    }
}
