//! HTML page rendering.
//!
//! Phase 2 of the build. Renders one `index.html` per source folder from its
//! manifest, and one aggregated table of contents for the whole tree.
//!
//! ## Index Page Layout
//!
//! Each block is controlled by a folder-level manifest flag:
//!
//! ```text
//! <head>                         title + stylesheet
//! page_top                       config.toml, show_page_top
//! entete_general.html            show_site_header (falls back to the root copy)
//! breadcrumb                     show_navigation, below the root only
//! entete.html                    show_header
//! table title                    table_title, resolved against folder_title
//! index table                    one link per visible entry
//! pied.html                      show_footer
//! pied_general.html              show_site_footer (falls back to the root copy)
//! page_bottom                    config.toml, show_page_bottom
//! <!-- Generated by docsite -->
//! ```
//!
//! ## Output Structure
//!
//! ```text
//! site/
//! ├── index.html                 # Root folder
//! ├── style.css
//! ├── TDM/index.html             # Table of contents (toc_dir, kept as is)
//! └── cours_ete/
//!     ├── index.html
//!     └── lecon_1.pdf            # Copied by phase 3
//! ```
//!
//! Pages carry no timestamp, so rebuilding an unchanged tree produces
//! byte-identical output.
//!
//! Uses [maud](https://maud.lambda.xyz/) for HTML. Labels go through
//! [`crate::markup::render_label`] and are inserted pre-escaped; fragments are
//! hand-written HTML and are inserted raw.

use crate::config::SiteConfig;
use crate::manifest::{Manifest, Tagged};
use crate::markup::{escape_accents, escape_html, render_label};
use crate::naming;
use crate::template::{self, Resolver, TemplateError};
use crate::types::{Fragment, Partition};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Template error in {folder}: {source}")]
    Template {
        folder: PathBuf,
        source: TemplateError,
    },
    #[error("{0} is outside the source root")]
    OutsideRoot(PathBuf),
}

const CSS_STATIC: &str = include_str!("../static/style.css");

/// Placeholder substituted in fragments.
pub const BASE_PATH_VAR: &str = "{{BASE_PATH}}";

/// The stylesheet written to `<output>/style.css`.
pub fn stylesheet() -> &'static str {
    CSS_STATIC
}

/// Everything a renderer needs besides the folder itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub config: &'a SiteConfig,
    pub source_root: &'a Path,
    pub resolver: Resolver,
}

impl<'a> RenderContext<'a> {
    pub fn new(config: &'a SiteConfig, source_root: &'a Path) -> Self {
        Self {
            config,
            source_root,
            resolver: Resolver::from(&config.templates),
        }
    }

    fn base_path(&self) -> &str {
        self.config.base_path.trim_end_matches('/')
    }

    fn toc_href(&self) -> String {
        format!("{}/{}/index.html", self.base_path(), self.config.toc_dir)
    }

    fn relative<'p>(&self, folder: &'p Path) -> Result<&'p Path, GenerateError> {
        folder
            .strip_prefix(self.source_root)
            .map_err(|_| GenerateError::OutsideRoot(folder.to_path_buf()))
    }
}

/// Source-relative folder names from the root down to `rel`.
fn segments(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect()
}

/// Output directory of a source folder.
pub fn output_dir_for(output_root: &Path, rel: &Path) -> PathBuf {
    output_root.join(naming::normalize_path(rel))
}

/// Title of a folder: its manifest value, else the site title at the root or
/// the folder's own name below it.
pub fn folder_title(manifest: &Manifest, rel: &Path, config: &SiteConfig) -> String {
    if let Some(title) = &manifest.folder_title {
        return title.clone();
    }
    match segments(rel).pop() {
        Some(name) => name,
        None => config.site_title.clone(),
    }
}

// ============================================================================
// Shared blocks
// ============================================================================

fn base_document(title: &str, base_path: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="fr" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (PreEscaped(escape_accents(&escape_html(title)))) }
                link rel="stylesheet" href={ (base_path) "/style.css" };
            }
            body {
                (content)
                (PreEscaped(format!("<!-- Generated by docsite {} -->", env!("CARGO_PKG_VERSION"))))
            }
        }
    }
}

/// Wrap a block in marker comments when `show_structure` is on.
fn with_markers(ctx: &RenderContext, name: &str, content: Markup) -> Markup {
    if !ctx.config.show_structure {
        return content;
    }
    html! {
        div {
            (PreEscaped(format!("<!-- {name} -->")))
            (content)
            (PreEscaped(format!("<!-- end {name} -->")))
        }
    }
}

/// Read a fragment for `folder`, falling back to the source root for the
/// site-wide ones. Missing or unreadable fragments render as nothing.
pub fn load_fragment(ctx: &RenderContext, folder: &Path, fragment: Fragment) -> Option<String> {
    let local = folder.join(fragment.file_name());
    let path = if local.is_file() {
        local
    } else if fragment.is_site_wide() {
        ctx.source_root.join(fragment.file_name())
    } else {
        return None;
    };
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(&path) {
        Ok(raw) => Some(raw.replace(BASE_PATH_VAR, ctx.base_path())),
        Err(e) => {
            warn!(fragment = %path.display(), "cannot read fragment: {e}");
            None
        }
    }
}

fn fragment_block(ctx: &RenderContext, folder: &Path, fragment: Fragment) -> Markup {
    match load_fragment(ctx, folder, fragment) {
        Some(raw) => with_markers(ctx, fragment.file_name(), html! { (PreEscaped(raw)) }),
        None => html! {},
    }
}

fn raw_lines(lines: &[String]) -> Markup {
    html! {
        @for line in lines {
            (PreEscaped(line))
        }
    }
}

/// Resolved navigation label of `name`, looked up in its parent's manifest.
fn nav_label(ctx: &RenderContext, parent: &Path, parent_rel: &Path, name: &str) -> String {
    let manifest = Manifest::load(parent);
    let title = folder_title(&manifest, parent_rel, ctx.config);
    manifest
        .folders
        .iter()
        .find(|e| e.source_name == name)
        .and_then(|e| match ctx.resolver.resolve_entry(e, &title) {
            Ok(resolved) => resolved.nav_name,
            Err(err) => {
                warn!(folder = %name, "navigation label: {err}");
                None
            }
        })
        .unwrap_or_else(|| name.to_string())
}

/// Breadcrumb bar: home, then every ancestor above the current folder, and
/// a link to the table of contents on the right.
fn breadcrumb(ctx: &RenderContext, rel: &Path) -> Markup {
    let names = segments(rel);
    let base = ctx.base_path();

    let mut crumbs = Vec::new();
    let mut source = ctx.source_root.to_path_buf();
    let mut source_rel = PathBuf::new();
    let mut href = base.to_string();
    for name in names.iter().take(names.len().saturating_sub(1)) {
        let label = nav_label(ctx, &source, &source_rel, name);
        source.push(name);
        source_rel.push(name);
        href = format!("{href}/{}", naming::normalize_name(name));
        crumbs.push((format!("{href}/index.html"), label));
    }

    let nav = html! {
        nav.navigation {
            div.nav-left {
                a.nav-button href={ (base) "/index.html" } { (ctx.config.labels.home) }
                @for (link, label) in &crumbs {
                    " → "
                    a.nav-button href=(link) { (PreEscaped(render_label(label))) }
                }
            }
            div.nav-right {
                a.nav-button href=(ctx.toc_href()) { (ctx.config.labels.toc) }
            }
        }
    };
    with_markers(ctx, "navigation", nav)
}

// ============================================================================
// Index page
// ============================================================================

/// One visible row of an index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub partition: Partition,
    pub href: String,
    /// HTML label, escaped and decorated.
    pub label: String,
}

/// Whether the entry's source still exists. Stale entries are logged and
/// skipped; the manifest itself is left untouched.
fn is_present(folder: &Path, tagged: &Tagged) -> bool {
    if folder.join(&tagged.entry.source_name).exists() {
        return true;
    }
    warn!(
        folder = %folder.display(),
        entry = %tagged.entry.source_name,
        "stale {} entry skipped", tagged.partition
    );
    false
}

/// Rows of the index table of `folder`, in display order.
pub fn index_rows(
    ctx: &RenderContext,
    folder: &Path,
    manifest: &Manifest,
    title: &str,
) -> Result<Vec<IndexRow>, GenerateError> {
    let decoration = &ctx.config.decoration;
    let folder_decorates = manifest.apply_decoration.unwrap_or(true);
    let mut rows = Vec::new();

    for tagged in manifest.ordered() {
        let entry = tagged.entry;
        if !entry.show_in_index || !is_present(folder, &tagged) {
            continue;
        }
        let resolved = ctx
            .resolver
            .resolve_entry(entry, title)
            .map_err(|source| GenerateError::Template {
                folder: folder.to_path_buf(),
                source,
            })?;

        let mut label = render_label(resolved.display_name.as_deref().unwrap_or(&entry.source_name));
        if entry.apply_decoration && folder_decorates {
            label = match tagged.partition {
                Partition::Folders => format!(
                    "{}{label}{}",
                    decoration.folder_prefix, decoration.folder_suffix
                ),
                Partition::Files => {
                    format!("{}{label}{}", decoration.file_prefix, decoration.file_suffix)
                }
            };
        }

        let href = match tagged.partition {
            Partition::Folders => format!("{}/index.html", entry.output_name),
            Partition::Files => entry.output_name.clone(),
        };
        rows.push(IndexRow {
            partition: tagged.partition,
            href,
            label,
        });
    }
    Ok(rows)
}

fn index_table(ctx: &RenderContext, rows: &[IndexRow]) -> Markup {
    let plain = !ctx.config.underline_index_links;
    html! {
        div.table-container {
            table.index {
                tbody {
                    tr {
                        td {
                            @for row in rows {
                                a.index-item.plain[plain] data-kind=(row.partition.to_string()) href=(row.href) {
                                    (PreEscaped(&row.label))
                                }
                                br;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Render the `index.html` of one source folder.
pub fn render_index_page(ctx: &RenderContext, folder: &Path) -> Result<String, GenerateError> {
    let rel = ctx.relative(folder)?;
    let depth = segments(rel).len();
    let manifest = Manifest::load(folder);
    let title = folder_title(&manifest, rel, ctx.config);
    let flag = |value: Option<bool>| value.unwrap_or(true);

    let table_title_template = manifest.table_title.as_deref().unwrap_or("{{folder_title}}");
    let folder_name = segments(rel).pop().unwrap_or_default();
    let table_title = ctx
        .resolver
        .resolve_text(
            table_title_template,
            &template::entry_variables(&folder_name, &title),
        )
        .map_err(|source| GenerateError::Template {
            folder: folder.to_path_buf(),
            source,
        })?;

    let rows = index_rows(ctx, folder, &manifest, &title)?;
    debug!(folder = %rel.display(), rows = rows.len(), "rendering index page");

    let content = html! {
        @if flag(manifest.show_page_top) { (raw_lines(&ctx.config.page_top)) }
        @if flag(manifest.show_site_header) { (fragment_block(ctx, folder, Fragment::SiteHeader)) }
        @if flag(manifest.show_navigation) && depth >= 1 { (breadcrumb(ctx, rel)) }
        @if flag(manifest.show_header) { (fragment_block(ctx, folder, Fragment::Header)) }
        @if !table_title.is_empty() {
            div.table-title { (PreEscaped(render_label(&table_title))) }
        }
        (index_table(ctx, &rows))
        @if flag(manifest.show_footer) { (fragment_block(ctx, folder, Fragment::Footer)) }
        @if flag(manifest.show_site_footer) { (fragment_block(ctx, folder, Fragment::SiteFooter)) }
        @if flag(manifest.show_page_bottom) { (raw_lines(&ctx.config.page_bottom)) }
    };

    Ok(base_document(&title, ctx.base_path(), content).into_string())
}

// ============================================================================
// Table of contents
// ============================================================================

/// One node of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub label: String,
    pub href: String,
    pub partition: Partition,
    pub children: Vec<TocNode>,
}

/// Walk the tree from `folder`, following manifest order and `show_in_toc`.
pub fn toc_tree(
    ctx: &RenderContext,
    folder: &Path,
    url_prefix: &str,
) -> Result<Vec<TocNode>, GenerateError> {
    let rel = ctx.relative(folder)?;
    let manifest = Manifest::load(folder);
    let title = folder_title(&manifest, rel, ctx.config);
    let mut nodes = Vec::new();

    for tagged in manifest.ordered() {
        let entry = tagged.entry;
        if !entry.show_in_toc || !is_present(folder, &tagged) {
            continue;
        }
        let resolved = ctx
            .resolver
            .resolve_entry(entry, &title)
            .map_err(|source| GenerateError::Template {
                folder: folder.to_path_buf(),
                source,
            })?;
        let text = resolved
            .toc_name
            .or(resolved.display_name)
            .unwrap_or_else(|| entry.source_name.clone());
        let label = render_label(&text);

        let node = match tagged.partition {
            Partition::Folders => {
                let prefix = format!("{url_prefix}/{}", entry.output_name);
                let children = toc_tree(ctx, &folder.join(&entry.source_name), &prefix)?;
                TocNode {
                    label,
                    href: format!("{}{prefix}/index.html", ctx.base_path()),
                    partition: Partition::Folders,
                    children,
                }
            }
            Partition::Files => TocNode {
                label,
                href: format!("{}{url_prefix}/{}", ctx.base_path(), entry.output_name),
                partition: Partition::Files,
                children: Vec::new(),
            },
        };
        nodes.push(node);
    }
    Ok(nodes)
}

fn toc_items(nodes: &[TocNode]) -> Markup {
    html! {
        @for node in nodes {
            li {
                @if node.children.is_empty() {
                    a.folder-link[node.partition == Partition::Folders] href=(node.href) {
                        (PreEscaped(&node.label))
                    }
                } @else {
                    details {
                        summary {
                            a.folder-link href=(node.href) { (PreEscaped(&node.label)) }
                        }
                        ul { (toc_items(&node.children)) }
                    }
                }
            }
        }
    }
}

/// Render the table of contents page.
///
/// Header, footer and navigation are opt-in through the manifest of the TOC
/// settings folder (`<root>/<toc_dir>/STRUCTURE.toml`). Without a local
/// header, a plain `<h1>` with the configured title is emitted.
pub fn render_toc_page(ctx: &RenderContext) -> Result<String, GenerateError> {
    let settings_dir = ctx.source_root.join(&ctx.config.toc_dir);
    let settings = Manifest::load(&settings_dir);
    let flag = |value: Option<bool>| value.unwrap_or(false);
    let toc_title = &ctx.config.labels.toc_title;

    let nodes = toc_tree(ctx, ctx.source_root, "")?;
    debug!(entries = nodes.len(), "rendering table of contents");

    let content = html! {
        @if flag(settings.show_page_top) { (raw_lines(&ctx.config.page_top)) }
        @if flag(settings.show_site_header) { (fragment_block(ctx, &settings_dir, Fragment::SiteHeader)) }
        @if flag(settings.show_header) {
            (fragment_block(ctx, &settings_dir, Fragment::Header))
        } @else {
            h1 { (PreEscaped(escape_accents(&escape_html(toc_title)))) }
        }
        @if flag(settings.show_navigation) {
            (breadcrumb(ctx, Path::new(&ctx.config.toc_dir)))
        }
        div.table-container {
            table.index {
                tbody { tr { td {
                    ul.tree { (toc_items(&nodes)) }
                } } }
            }
        }
        @if flag(settings.show_footer) { (fragment_block(ctx, &settings_dir, Fragment::Footer)) }
        @if flag(settings.show_site_footer) { (fragment_block(ctx, &settings_dir, Fragment::SiteFooter)) }
        @if flag(settings.show_page_bottom) { (raw_lines(&ctx.config.page_bottom)) }
    };

    Ok(base_document(toc_title, ctx.base_path(), content).into_string())
}
