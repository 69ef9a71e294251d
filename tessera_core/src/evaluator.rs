use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use minijinja::AutoEscape;
use minijinja::Environment;
use minijinja::Error;
use minijinja::ErrorKind;
use minijinja::UndefinedBehavior;
use minijinja::Value;

use crate::RenderContext;
use crate::TesseraError;
use crate::TesseraResult;
use crate::node::NodeId;

/// Name under which the node-scoped partial callable is exposed to templates.
pub const PARTIAL_FUNCTION: &str = "partial";

/// A nested partial reference discovered while evaluating a template.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCall {
	pub id: NodeId,
	pub name: String,
	/// Explicit context for the partial. `None` inherits the caller's context.
	pub context: Option<RenderContext>,
}

#[derive(Debug)]
struct Discovery {
	next_id: usize,
	calls: Vec<PartialCall>,
}

/// The partial callable handed to an [`Evaluator`] for one node.
///
/// Every call allocates the next id of the render pass and returns that
/// node's placeholder token straight away; the composer turns the recorded
/// calls into child nodes once evaluation has finished.
#[derive(Debug, Clone)]
pub struct PartialCollector {
	inner: Arc<Mutex<Discovery>>,
}

impl PartialCollector {
	pub fn new(next_id: usize) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Discovery {
				next_id,
				calls: Vec::new(),
			})),
		}
	}

	/// Record a reference to `name` and return its placeholder token.
	pub fn call(&self, name: impl Into<String>, context: Option<RenderContext>) -> String {
		let mut discovery = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		let id = NodeId(discovery.next_id);
		discovery.next_id += 1;
		discovery.calls.push(PartialCall {
			id,
			name: name.into(),
			context,
		});
		id.placeholder()
	}

	/// The id the next call would receive.
	pub fn next_id(&self) -> usize {
		self.inner
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.next_id
	}

	/// Take the recorded calls, leaving the collector empty.
	pub fn drain(&self) -> Vec<PartialCall> {
		let mut discovery = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		std::mem::take(&mut discovery.calls)
	}
}

/// Evaluates a template body against a context.
///
/// Implementations must make `partials` reachable from the template so that
/// nested references can be recorded; evaluation itself is synchronous.
pub trait Evaluator: Send + Sync {
	fn evaluate(
		&self,
		template_id: &str,
		body: &str,
		context: &RenderContext,
		partials: &PartialCollector,
	) -> TesseraResult<String>;
}

/// [`Evaluator`] backed by minijinja. Templates call
/// `{{ partial("header") }}` or `{{ partial("row", {"item": item}) }}`.
#[derive(Debug, Clone)]
pub struct JinjaEvaluator {
	strict: bool,
}

impl Default for JinjaEvaluator {
	fn default() -> Self {
		Self::new()
	}
}

impl JinjaEvaluator {
	pub fn new() -> Self {
		Self { strict: false }
	}

	/// Fail on undefined variables instead of rendering them as empty.
	#[must_use]
	pub fn strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}
}

impl Evaluator for JinjaEvaluator {
	fn evaluate(
		&self,
		template_id: &str,
		body: &str,
		context: &RenderContext,
		partials: &PartialCollector,
	) -> TesseraResult<String> {
		let render_error = |e: Error| {
			TesseraError::TemplateRender {
				template: template_id.to_string(),
				reason: e.to_string(),
			}
		};

		let mut env = Environment::new();
		env.set_keep_trailing_newline(true);
		env.set_auto_escape_callback(|name| {
			if name.contains(".html.") || name.ends_with(".html") {
				AutoEscape::Html
			} else {
				AutoEscape::None
			}
		});
		env.set_undefined_behavior(if self.strict {
			UndefinedBehavior::Strict
		} else {
			UndefinedBehavior::Chainable
		});
		env.add_template(template_id, body).map_err(render_error)?;
		let template = env.get_template(template_id).map_err(render_error)?;

		let collector = partials.clone();
		let partial = Value::from_function(move |name: String, ctx: Option<Value>| {
			let context = ctx
				.filter(|value| !value.is_undefined() && !value.is_none())
				.map(context_from_value)
				.transpose()?;
			Ok::<_, Error>(Value::from_safe_string(collector.call(name, context)))
		});

		let ctx = Value::from_iter(
			context
				.iter()
				.map(|(key, value)| (key.clone(), Value::from_serialize(value)))
				.chain(std::iter::once((PARTIAL_FUNCTION.to_string(), partial))),
		);

		template.render(ctx).map_err(render_error)
	}
}

fn context_from_value(value: Value) -> Result<RenderContext, Error> {
	let json = serde_json::to_value(&value)
		.map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
	RenderContext::from_value(json).ok_or_else(|| {
		Error::new(
			ErrorKind::InvalidOperation,
			"partial context must be a map",
		)
	})
}
