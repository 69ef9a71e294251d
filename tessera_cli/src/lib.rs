use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Compose templates and their nested partials into a single document.",
	long_about = "tessera renders a root template and every partial it references, however \
	              deeply nested, loading templates concurrently and stitching each rendered \
	              partial back into its parent.\n\nQuick start:\n  tessera list            \
	              Show every registered template\n  tessera render layout   Compose \
	              app/views/layout.html.jinja"
)]
pub struct TesseraCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose (debug level) logging on stderr.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Compose a root template and all of its partials.
	///
	/// The template name is resolved against the first search path, then the
	/// fallback root, using the `.html.<extension>` suffix from
	/// `tessera.toml`. Data files configured under `[data]` and `--set`
	/// bindings form the root render context.
	Render {
		/// Logical name of the root template, e.g. `layout` or `users/show`.
		template: String,

		/// Override the configured search paths. The first one is the root
		/// of the render pass. May be repeated.
		#[arg(long = "search-path", short = 's')]
		search_paths: Vec<String>,

		/// Bind a string value in the root context, as `KEY=VALUE`. May be
		/// repeated; later bindings win.
		#[arg(long = "set", value_parser = parse_binding)]
		bindings: Vec<(String, String)>,

		/// Write the composed output to this file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// List every template id in the registry.
	///
	/// Scans the configured search paths and fallback root for
	/// `*.html.<extension>` files.
	List {
		/// Output format for the listing.
		#[arg(long, value_enum, default_value_t = ListOutputFormat::Text)]
		format: ListOutputFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ListOutputFormat {
	/// One template id per line.
	Text,
	/// A JSON array of template ids.
	Json,
}

/// Parse a `KEY=VALUE` binding.
pub fn parse_binding(raw: &str) -> Result<(String, String), String> {
	let Some((key, value)) = raw.split_once('=') else {
		return Err(format!("expected `KEY=VALUE`, got `{raw}`"));
	};

	let key = key.trim();
	if key.is_empty() {
		return Err(format!("binding `{raw}` has an empty key"));
	}

	Ok((key.to_string(), value.to_string()))
}
