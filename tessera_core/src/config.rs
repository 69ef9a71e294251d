use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::RenderContext;
use crate::TesseraError;
use crate::TesseraResult;
use crate::composer::DEFAULT_MAX_DEPTH;
use crate::registry::DEFAULT_EXTENSION;
use crate::registry::DEFAULT_FALLBACK_ROOT;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["tessera.toml", ".tessera.toml", ".config/tessera.toml"];

/// Configuration loaded from a `tessera.toml` file.
///
/// ```toml
/// [templates]
/// paths = ["app/views"]
/// extension = "jinja"
/// fallback = "app/views"
///
/// [render]
/// max_depth = 32
/// timeout_ms = 10000
///
/// [data]
/// site = "data/site.json"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct TesseraConfig {
	/// Where templates live and how they are named.
	#[serde(default)]
	pub templates: TemplatesConfig,
	/// Limits applied to every render pass.
	#[serde(default)]
	pub render: RenderConfig,
	/// Map of namespace name to relative data file path. Each file is loaded
	/// into the root render context under its namespace.
	#[serde(default)]
	pub data: HashMap<String, PathBuf>,
}

/// The `[templates]` section.
#[derive(Debug, Deserialize)]
pub struct TemplatesConfig {
	/// Ordered search paths relative to the project root. The first one is
	/// the root of each render pass; all of them are scanned into the
	/// registry.
	#[serde(default = "default_template_paths")]
	pub paths: Vec<PathBuf>,
	/// Template extension. Registered ids end with `.html.<extension>`.
	#[serde(default = "default_extension")]
	pub extension: String,
	/// Directory searched when neither the including template's directory nor
	/// the pass root contain a partial.
	#[serde(default = "default_fallback")]
	pub fallback: String,
}

impl Default for TemplatesConfig {
	fn default() -> Self {
		Self {
			paths: default_template_paths(),
			extension: default_extension(),
			fallback: default_fallback(),
		}
	}
}

impl TemplatesConfig {
	/// Search paths as `/`-separated strings, the form the locator expects.
	pub fn search_paths(&self) -> Vec<String> {
		self.paths
			.iter()
			.map(|path| path.to_string_lossy().replace('\\', "/"))
			.collect()
	}

	/// Every directory that should be scanned into the registry: the search
	/// paths followed by the fallback root.
	pub fn scan_dirs(&self) -> Vec<PathBuf> {
		let mut dirs = self.paths.clone();
		let fallback = PathBuf::from(&self.fallback);
		if !dirs.contains(&fallback) {
			dirs.push(fallback);
		}
		dirs
	}
}

/// The `[render]` section.
#[derive(Debug, Deserialize)]
pub struct RenderConfig {
	/// Maximum partial nesting depth.
	#[serde(default = "default_max_depth")]
	pub max_depth: usize,
	/// Deadline for one render pass in milliseconds. No deadline when absent.
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			max_depth: default_max_depth(),
			timeout_ms: None,
		}
	}
}

fn default_template_paths() -> Vec<PathBuf> {
	vec![PathBuf::from(DEFAULT_FALLBACK_ROOT)]
}

fn default_extension() -> String {
	DEFAULT_EXTENSION.to_string()
}

fn default_fallback() -> String {
	DEFAULT_FALLBACK_ROOT.to_string()
}

fn default_max_depth() -> usize {
	DEFAULT_MAX_DEPTH
}

impl TesseraConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if there is none.
	pub fn load(root: &Path) -> TesseraResult<Option<TesseraConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: TesseraConfig =
			toml::from_str(&content).map_err(|e| TesseraError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}

	/// Read each data file into a render context keyed by namespace.
	pub fn load_data(&self, root: &Path) -> TesseraResult<RenderContext> {
		let mut context = RenderContext::new();

		let mut namespaces: Vec<_> = self.data.iter().collect();
		namespaces.sort_by(|a, b| a.0.cmp(b.0));

		for (namespace, rel_path) in namespaces {
			let content = std::fs::read_to_string(root.join(rel_path)).map_err(|e| {
				TesseraError::DataFile {
					path: rel_path.display().to_string(),
					reason: e.to_string(),
				}
			})?;
			let format = rel_path
				.extension()
				.and_then(|e| e.to_str())
				.unwrap_or("")
				.to_ascii_lowercase();
			let value = parse_data_file(&content, &format, &rel_path.display().to_string())?;
			context.insert(namespace.clone(), value);
		}

		Ok(context)
	}
}

/// Parse a data file's content into a `serde_json::Value` based on its
/// format.
fn parse_data_file(
	content: &str,
	format: &str,
	path_display: &str,
) -> TesseraResult<serde_json::Value> {
	match format {
		"text" | "txt" => Ok(serde_json::Value::String(content.to_string())),
		"json" => {
			serde_json::from_str(content).map_err(|e| {
				TesseraError::DataFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		"toml" => {
			let value: toml::Value = toml::from_str(content).map_err(|e| {
				TesseraError::DataFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})?;
			serde_json::to_value(value).map_err(|e| {
				TesseraError::DataFile {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		other => Err(TesseraError::UnsupportedDataFormat(other.to_string())),
	}
}
