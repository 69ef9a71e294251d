//! `tessera_core` composes a root template and every partial it references,
//! however deeply nested, into one output without blocking on template I/O.
//!
//! ## Composition Pipeline
//!
//! ```text
//! Composer::render(context, search_paths, "layout")
//!   → TemplateLocator (partial name → registered template id)
//!   → TemplateLoader (async body load, one task per node)
//!   → Evaluator (renders the body; each `partial(...)` call returns a placeholder)
//!   → child nodes load and render concurrently
//!   → each resolved child replaces its placeholder in the parent
//!   → the root resolves last and its content is the composed output
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `tessera.toml`: template search paths, extension, render limits and data files.
//! - [`registry`]: The pre-populated set of known template ids and the locator that resolves partial names against it.
//!
//! ## Key Types
//!
//! - [`Composer`]: Runs render passes. One pass owns its node arena and id counter.
//! - [`TemplateNode`]: One instance of a partial being rendered, addressed by [`NodeId`].
//! - [`RenderContext`]: Variable bindings a template renders against.
//! - [`TemplateLoader`]: Async template body source ([`FsLoader`], [`MemoryLoader`]).
//! - [`Evaluator`]: Template evaluation primitive ([`JinjaEvaluator`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tessera_core::Composer;
//! use tessera_core::ComposerOptions;
//! use tessera_core::MemoryLoader;
//! use tessera_core::RenderContext;
//!
//! # async fn run() -> tessera_core::TesseraResult<()> {
//! let loader = MemoryLoader::new()
//! 	.with("app/views/layout.html.jinja", "<body>{{ partial(\"header\") }}</body>")
//! 	.with("app/views/header.html.jinja", "<h1>Hi</h1>");
//! let composer = Composer::new(loader.registry(), loader, ComposerOptions::default());
//!
//! let output = composer
//! 	.render(RenderContext::new(), &["app/views"], "layout")
//! 	.await?;
//! assert_eq!(output, "<body><h1>Hi</h1></body>");
//! # Ok(())
//! # }
//! ```

pub use composer::*;
pub use error::*;
pub use evaluator::*;
pub use loader::*;
pub use node::*;
pub use registry::TemplateLocator;
pub use registry::TemplateRegistry;

mod composer;
pub mod config;
#[allow(unused_assignments)]
mod error;
mod evaluator;
mod loader;
mod node;
pub mod registry;
