//! Markdown page compiler: YAML frontmatter, GFM body, sanitised HTML.

use std::sync::Arc;

use ammonia::Builder as AmmoniaBuilder;
use async_trait::async_trait;
use comrak::{Options, markdown_to_html};
use once_cell::sync::Lazy;
use tracing::{debug, instrument};

use crate::application::error::ContentError;
use crate::application::source::PageCompiler;
use crate::domain::content::SourceFile;
use crate::domain::page::{CompiledMdx, Frontmatter};
use crate::infra::github::ENTRY_FILENAMES;

const FENCE: &str = "---";
const PAGE_EXTENSIONS: [&str; 2] = [".mdx", ".md"];

struct Pipeline {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
}

static PIPELINE: Lazy<Arc<Pipeline>> = Lazy::new(|| {
    Arc::new(Pipeline {
        options: default_options(),
        sanitizer: build_sanitizer(),
    })
});

/// Compiles `.mdx`/`.md` pages on the blocking pool.
#[derive(Clone)]
pub struct MarkdownCompiler {
    pipeline: Arc<Pipeline>,
}

impl MarkdownCompiler {
    pub fn new() -> Self {
        Self {
            pipeline: Arc::clone(&PIPELINE),
        }
    }
}

impl Default for MarkdownCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;
    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();
    builder.add_generic_attributes(&["class", "id"]);
    builder.add_tags(&["input", "section"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_generic_attribute_prefixes(&["data-"]);
    builder
}

/// Pick the file that defines the page.
///
/// Directory pages use their index or README; otherwise a lone Markdown file
/// is the page.
pub fn find_entry(files: &[SourceFile]) -> Option<&SourceFile> {
    ENTRY_FILENAMES
        .iter()
        .find_map(|name| files.iter().find(|file| file.file_name() == *name))
        .or_else(|| {
            let mut pages = files.iter().filter(|file| {
                PAGE_EXTENSIONS
                    .iter()
                    .any(|ext| file.file_name().ends_with(ext))
            });
            match (pages.next(), pages.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        })
}

/// Split `source` into its YAML frontmatter block (if any) and body.
pub fn split_frontmatter(source: &str) -> (Option<&str>, &str) {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let Some(rest) = source.strip_prefix(FENCE) else {
        return (None, source);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return (None, source);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, source)
}

fn parse_frontmatter(slug: &str, yaml: Option<&str>) -> Result<Frontmatter, ContentError> {
    match yaml {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)
            .map_err(|err| ContentError::compile(slug, format!("invalid frontmatter: {err}"))),
        _ => Ok(Frontmatter::default()),
    }
}

impl Pipeline {
    fn compile(&self, slug: &str, files: &[SourceFile]) -> Result<Option<CompiledMdx>, ContentError> {
        let Some(entry) = find_entry(files) else {
            debug!(slug, files = files.len(), "no entry file");
            return Ok(None);
        };

        let (yaml, body) = split_frontmatter(&entry.content);
        let frontmatter = parse_frontmatter(slug, yaml)?;
        let html = markdown_to_html(body, &self.options);
        let code = self.sanitizer.clean(&html).to_string();
        Ok(Some(CompiledMdx { code, frontmatter }))
    }
}

#[async_trait]
impl PageCompiler for MarkdownCompiler {
    #[instrument(skip(self, files), fields(files = files.len()))]
    async fn compile(
        &self,
        slug: &str,
        files: &[SourceFile],
    ) -> Result<Option<CompiledMdx>, ContentError> {
        let pipeline = Arc::clone(&self.pipeline);
        let owned_slug = slug.to_string();
        let owned_files = files.to_vec();
        tokio::task::spawn_blocking(move || pipeline.compile(&owned_slug, &owned_files))
            .await
            .map_err(|err| ContentError::compile(slug, format!("compile task failed: {err}")))?
    }
}
