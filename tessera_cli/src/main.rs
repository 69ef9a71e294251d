use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use clap::Parser;
use owo_colors::OwoColorize;
use tessera_cli::Commands;
use tessera_cli::ListOutputFormat;
use tessera_cli::TesseraCli;
use tessera_core::Composer;
use tessera_core::ComposerOptions;
use tessera_core::FsLoader;
use tessera_core::RenderContext;
use tessera_core::TemplateRegistry;
use tessera_core::config::TemplatesConfig;
use tessera_core::config::TesseraConfig;
use tracing_subscriber::EnvFilter;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = TesseraCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Render {
			template,
			search_paths,
			bindings,
			output,
		}) => run_render(&args, template, search_paths, bindings, output.as_ref()),
		Some(Commands::List { format }) => run_list(&args, *format),
		None => {
			eprintln!("No subcommand specified. Run `tessera --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<tessera_core::TesseraError>() {
			Ok(tessera_err) => {
				let report: miette::Report = (*tessera_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Logs go to stderr so stdout carries only the composed output.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_env("TESSERA_LOG")
		.unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.init();
}

fn resolve_root(args: &TesseraCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Load the optional config and scan the registry it describes, plus any
/// search paths given on the command line.
fn load_project(
	args: &TesseraCli,
	search_paths: &[String],
) -> Result<(PathBuf, Option<TesseraConfig>, TemplateRegistry), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = TesseraConfig::load(&root)?;
	let default_templates = TemplatesConfig::default();
	let templates = config.as_ref().map_or(&default_templates, |c| &c.templates);

	let mut dirs = templates.scan_dirs();
	for path in search_paths.iter().map(PathBuf::from) {
		if !dirs.contains(&path) {
			dirs.push(path);
		}
	}

	let registry = TemplateRegistry::scan(&root, &dirs, &templates.extension)?;
	tracing::debug!(root = %root.display(), templates = registry.len(), "scanned project");

	Ok((root, config, registry))
}

fn run_render(
	args: &TesseraCli,
	template: &str,
	search_paths: &[String],
	bindings: &[(String, String)],
	output: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
	let (root, config, registry) = load_project(args, search_paths)?;

	let mut context = match &config {
		Some(config) => config.load_data(&root)?,
		None => RenderContext::new(),
	};
	for (key, value) in bindings {
		context.insert(key.clone(), serde_json::Value::String(value.clone()));
	}

	let search_paths = if search_paths.is_empty() {
		config.as_ref().map_or_else(
			|| TemplatesConfig::default().search_paths(),
			|c| c.templates.search_paths(),
		)
	} else {
		search_paths.to_vec()
	};

	let options = ComposerOptions::from_config(config.as_ref());
	let composer = Composer::new(registry, FsLoader::new(&root), options);

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?;
	let composed = runtime.block_on(composer.render(context, search_paths.as_slice(), template))?;

	match output {
		Some(path) => {
			std::fs::write(path, &composed)?;
			eprintln!(
				"{} {}",
				colored!("Composed", green),
				path.display()
			);
		}
		None => print!("{composed}"),
	}

	Ok(())
}

fn run_list(
	args: &TesseraCli,
	format: ListOutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let (_, _, registry) = load_project(args, &[])?;

	match format {
		ListOutputFormat::Text => {
			if registry.is_empty() {
				println!("No templates found.");
			}
			for id in registry.iter() {
				println!("{id}");
			}
		}
		ListOutputFormat::Json => {
			let ids: Vec<&String> = registry.iter().collect();
			println!("{}", serde_json::to_string_pretty(&ids)?);
		}
	}

	Ok(())
}
