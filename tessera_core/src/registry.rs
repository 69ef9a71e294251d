use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use derive_more::Deref;
use ignore::WalkBuilder;

use crate::TesseraError;
use crate::TesseraResult;

/// Default directory searched last when locating a partial.
pub const DEFAULT_FALLBACK_ROOT: &str = "app/views";

/// Default template extension. Registry keys end with `.html.<extension>`.
pub const DEFAULT_EXTENSION: &str = "jinja";

/// The read-only set of known template ids.
///
/// Populated once before any render pass begins so that locating a partial
/// never touches storage. Ids are `/`-separated paths relative to the project
/// root, e.g. `app/views/layouts/main.html.jinja`.
#[derive(Debug, Clone, Default, Deref)]
pub struct TemplateRegistry(BTreeSet<String>);

impl TemplateRegistry {
	/// Walk each of `dirs` (relative to `root`) and register every file whose
	/// name ends with `.html.<extension>`. Missing directories are skipped.
	/// `.gitignore` rules are respected.
	pub fn scan(root: &Path, dirs: &[impl AsRef<Path>], extension: &str) -> TesseraResult<Self> {
		let suffix = template_suffix(extension);
		let mut ids = BTreeSet::new();

		for dir in dirs {
			let base = root.join(dir.as_ref());
			if !base.is_dir() {
				tracing::debug!(dir = %base.display(), "skipping missing template directory");
				continue;
			}

			for entry in WalkBuilder::new(&base).require_git(false).build() {
				let entry = entry.map_err(|e| TesseraError::Io(std::io::Error::other(e)))?;
				if !entry.file_type().is_some_and(|t| t.is_file()) {
					continue;
				}

				let Ok(relative) = entry.path().strip_prefix(root) else {
					continue;
				};
				let id = normalize_id(relative);
				if id.ends_with(&suffix) {
					ids.insert(id);
				}
			}
		}

		tracing::debug!(count = ids.len(), "template registry populated");
		Ok(Self(ids))
	}

	/// Register one more template id.
	pub fn insert(&mut self, id: impl Into<String>) -> bool {
		self.0.insert(id.into())
	}
}

impl<S: Into<String>> FromIterator<S> for TemplateRegistry {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self(iter.into_iter().map(Into::into).collect())
	}
}

/// Resolves logical partial names to registered template ids.
#[derive(Debug, Clone)]
pub struct TemplateLocator {
	registry: Arc<TemplateRegistry>,
	fallback_root: String,
	suffix: String,
}

impl TemplateLocator {
	pub fn new(registry: Arc<TemplateRegistry>, fallback_root: &str, extension: &str) -> Self {
		Self {
			registry,
			fallback_root: trim_dir(fallback_root).to_string(),
			suffix: template_suffix(extension),
		}
	}

	pub fn registry(&self) -> &TemplateRegistry {
		&self.registry
	}

	pub fn fallback_root(&self) -> &str {
		&self.fallback_root
	}

	/// Resolve `partial_name` against, in order: the directory of the
	/// originating node (when there is one), the pass search root, and the
	/// fallback root. The first registered candidate wins.
	pub fn resolve(
		&self,
		search_root: &str,
		partial_name: &str,
		origin_dir: Option<&str>,
	) -> TesseraResult<String> {
		let mut dirs: Vec<&str> = Vec::with_capacity(3);
		if let Some(dir) = origin_dir {
			dirs.push(trim_dir(dir));
		}
		dirs.push(trim_dir(search_root));
		dirs.push(&self.fallback_root);

		for dir in &dirs {
			let key = format!("{dir}/{partial_name}{}", self.suffix);
			tracing::trace!(%key, "probing template registry");
			if self.registry.contains(&key) {
				return Ok(key);
			}
		}

		Err(TesseraError::PartialNotFound {
			name: partial_name.to_string(),
			searched: dirs.into_iter().map(String::from).collect(),
		})
	}
}

/// Directory portion of a template id, without a trailing slash.
pub fn dirname(template_id: &str) -> &str {
	template_id.rfind('/').map_or("", |idx| &template_id[..idx])
}

fn template_suffix(extension: &str) -> String {
	format!(".html.{}", extension.trim_start_matches('.'))
}

/// Strip trailing slashes and leading `./` so candidate keys line up with
/// registry ids.
fn trim_dir(dir: &str) -> &str {
	let mut trimmed = dir.trim_end_matches('/');
	while let Some(rest) = trimmed.strip_prefix("./") {
		trimmed = rest.trim_start_matches('/');
	}
	if trimmed.is_empty() { dir } else { trimmed }
}

fn normalize_id(path: &Path) -> String {
	let id = path.to_string_lossy().replace('\\', "/");
	let mut trimmed = id.as_str();
	while let Some(rest) = trimmed.strip_prefix("./") {
		trimmed = rest;
	}
	trimmed.to_string()
}
