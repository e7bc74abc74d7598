//! # docsite
//!
//! A static site builder for collections of office documents. The source
//! tree is the data: folders become index pages, documents become rows in
//! those pages, and a per-folder `STRUCTURE.toml` manifest records the order,
//! labels and visibility of every entry.
//!
//! # Architecture: Phased Build
//!
//! A build is a sequence of complete traversals of the source tree:
//!
//! ```text
//! 0. Reset    output/ wiped, style.css written
//! 1. Scan     convert DOCX → PDF, reconcile each manifest with the disk
//! 2. Render   one index.html per folder, then the table of contents
//! 3. Copy     publishable files to normalized output paths
//! ```
//!
//! Manifests are the only state carried between runs. The scan only ever
//! *appends* to them: an editor's ordering, labels and flags survive every
//! rebuild, and a second build over an unchanged tree is a no-op on the
//! manifests and byte-identical in the output.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Build orchestration, the `check` dry view, TOC-only rendering |
//! | [`manifest`] | `STRUCTURE.toml` model: entries, positions, defaults, load/save |
//! | [`scan`] | Directory listing and reconciliation of a listing with a manifest |
//! | [`convert`] | Regeneration policy and the external document [`convert::Converter`] |
//! | [`generate`] | Index and table-of-contents pages rendered with Maud |
//! | [`template`] | `{{variable}}` interpolation with a bounded fixed-point resolver |
//! | [`markup`] | Label mini-markup and accent escaping |
//! | [`naming`] | Output-name normalization (accents, spaces, case) |
//! | [`config`] | `config.toml` loading: stock defaults, merge, validation |
//! | [`types`] | Manifest partitions and page fragments |
//! | [`repair`] | Batch fix-up of existing manifests |
//! | [`sync`] | Mirror a generated site into a collaborator's git repository |
//! | [`logging`] | Console and run-log `tracing` subscriber |
//! | [`output`] | CLI summaries for every command |
//!
//! # Design Decisions
//!
//! ## Manifests As Data
//!
//! Manifests are TOML read with serde, never executed. Unknown keys are kept
//! and written back, so hand-added annotations survive a rebuild.
//!
//! ## Conversion Behind A Trait
//!
//! DOCX → PDF goes through [`convert::Converter`]. The production
//! implementation drives a headless office suite as a child process with a
//! timeout; tests use a recording mock and never spawn anything.
//!
//! ## Append-Only Positions
//!
//! New entries get positions strictly greater than every existing one, so
//! freshly added documents always land at the end and existing rows never
//! move.

pub mod config;
pub mod convert;
pub mod generate;
pub mod logging;
pub mod manifest;
pub mod markup;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod repair;
pub mod scan;
pub mod sync;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
