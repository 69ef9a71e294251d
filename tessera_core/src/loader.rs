use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::registry::TemplateRegistry;

/// Asynchronous source of template bodies, keyed by resolved template id.
///
/// Loads are dispatched concurrently from a pass-scoped task set, so the
/// returned future must be `Send` and the loader itself shareable.
pub trait TemplateLoader: Send + Sync + 'static {
	fn load(&self, template_id: &str) -> impl Future<Output = io::Result<String>> + Send;
}

/// Loads template bodies from disk, relative to a project root.
#[derive(Debug, Clone)]
pub struct FsLoader {
	root: PathBuf,
}

impl FsLoader {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}
}

impl TemplateLoader for FsLoader {
	async fn load(&self, template_id: &str) -> io::Result<String> {
		tokio::fs::read_to_string(self.root.join(template_id)).await
	}
}

/// Serves template bodies from memory. Useful for embedding templates in a
/// binary and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
	templates: HashMap<String, String>,
}

impl MemoryLoader {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a template body under the given id.
	#[must_use]
	pub fn with(mut self, template_id: impl Into<String>, body: impl Into<String>) -> Self {
		self.templates.insert(template_id.into(), body.into());
		self
	}

	/// A registry containing every template this loader can serve.
	pub fn registry(&self) -> TemplateRegistry {
		self.templates.keys().cloned().collect()
	}
}

impl TemplateLoader for MemoryLoader {
	async fn load(&self, template_id: &str) -> io::Result<String> {
		self.templates.get(template_id).cloned().ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::NotFound,
				format!("no template body for `{template_id}`"),
			)
		})
	}
}
