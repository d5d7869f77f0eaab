//! Cache key namespace.
//!
//! Keys are plain strings so administrative purges can match them with a
//! regular expression:
//!
//! - `{contentDir}:{slug}:downloaded`: raw file set
//! - `{contentDir}:{slug}:compiled`: compiled page
//! - `mdx-page:{contentDir}:{slug}:compiled`: resolved page (façade)

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Downloaded,
    Compiled,
    Page,
}

/// Identifies one cached artifact for a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub kind: KeyKind,
    pub content_dir: String,
    pub slug: String,
}

impl ContentKey {
    pub fn downloaded(content_dir: &str, slug: &str) -> Self {
        Self::new(KeyKind::Downloaded, content_dir, slug)
    }

    pub fn compiled(content_dir: &str, slug: &str) -> Self {
        Self::new(KeyKind::Compiled, content_dir, slug)
    }

    pub fn page(content_dir: &str, slug: &str) -> Self {
        Self::new(KeyKind::Page, content_dir, slug)
    }

    fn new(kind: KeyKind, content_dir: &str, slug: &str) -> Self {
        Self {
            kind,
            content_dir: content_dir.to_string(),
            slug: slug.to_string(),
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            kind,
            content_dir,
            slug,
        } = self;
        match kind {
            KeyKind::Downloaded => write!(f, "{content_dir}:{slug}:downloaded"),
            KeyKind::Compiled => write!(f, "{content_dir}:{slug}:compiled"),
            KeyKind::Page => write!(f, "mdx-page:{content_dir}:{slug}:compiled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_namespaced_strings() {
        assert_eq!(
            ContentKey::downloaded("docs", "routing").to_string(),
            "docs:routing:downloaded"
        );
        assert_eq!(
            ContentKey::compiled("docs", "routing").to_string(),
            "docs:routing:compiled"
        );
        assert_eq!(
            ContentKey::page("decisions", "README").to_string(),
            "mdx-page:decisions:README:compiled"
        );
    }

    #[test]
    fn layers_never_share_a_key() {
        let downloaded = ContentKey::downloaded("docs", "a").to_string();
        let compiled = ContentKey::compiled("docs", "a").to_string();
        let page = ContentKey::page("docs", "a").to_string();
        assert_ne!(downloaded, compiled);
        assert_ne!(compiled, page);
    }
}
