use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum TesseraError {
	#[error(transparent)]
	#[diagnostic(code(tessera::io_error))]
	Io(#[from] std::io::Error),

	#[error("partial template \"{name}\" not found in {}", .searched.join(", "))]
	#[diagnostic(
		code(tessera::partial_not_found),
		help("add a `{name}.html.*` template to one of the searched directories")
	)]
	PartialNotFound { name: String, searched: Vec<String> },

	#[error("failed to load template `{template}`: {reason}")]
	#[diagnostic(code(tessera::template_load))]
	TemplateLoad { template: String, reason: String },

	#[error("failed to render template `{template}`: {reason}")]
	#[diagnostic(code(tessera::template_render))]
	TemplateRender { template: String, reason: String },

	#[error("partial `{name}` exceeds the maximum nesting depth of {max_depth}")]
	#[diagnostic(
		code(tessera::depth_exceeded),
		help("check for a partial that includes itself, or raise `render.max_depth`")
	)]
	DepthExceeded { name: String, max_depth: usize },

	#[error("render pass did not complete within {millis}ms")]
	#[diagnostic(
		code(tessera::timeout),
		help("raise `render.timeout_ms` or check the template loader")
	)]
	Timeout { millis: u128 },

	#[error("template `{template}` produced placeholder `{token}` which it does not own")]
	#[diagnostic(
		code(tessera::stray_placeholder),
		help("the partial marker must not appear in literal template text")
	)]
	StrayPlaceholder { template: String, token: String },

	#[error("render pass ended with {pending} unresolved node(s)")]
	#[diagnostic(code(tessera::incomplete))]
	Incomplete { pending: usize },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(tessera::config_parse),
		help("check that tessera.toml is valid TOML with [templates], [render] and/or [data] sections")
	)]
	ConfigParse(String),

	#[error("failed to load data file `{path}`: {reason}")]
	#[diagnostic(code(tessera::data_file))]
	DataFile { path: String, reason: String },

	#[error("unsupported data file format: `{0}`")]
	#[diagnostic(
		code(tessera::unsupported_format),
		help("supported formats: text, json, toml")
	)]
	UnsupportedDataFormat(String),
}

pub type TesseraResult<T> = Result<T, TesseraError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
