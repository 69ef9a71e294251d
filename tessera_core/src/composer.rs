use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::RenderContext;
use crate::TesseraError;
use crate::TesseraResult;
use crate::config::TesseraConfig;
use crate::evaluator::Evaluator;
use crate::evaluator::JinjaEvaluator;
use crate::evaluator::PartialCall;
use crate::evaluator::PartialCollector;
use crate::loader::TemplateLoader;
use crate::node::NodeId;
use crate::node::NodeState;
use crate::node::TemplateNode;
use crate::node::RenderedContent;
use crate::registry::DEFAULT_EXTENSION;
use crate::registry::DEFAULT_FALLBACK_ROOT;
use crate::registry::TemplateLocator;
use crate::registry::TemplateRegistry;

/// Default maximum partial nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Tunables for a [`Composer`].
#[derive(Debug, Clone)]
pub struct ComposerOptions {
	/// Directory searched after the originating node's directory and the
	/// pass root.
	pub fallback_root: String,
	/// Template extension; registry keys end with `.html.<extension>`.
	pub extension: String,
	/// Deepest allowed nesting level. The root is at depth 0.
	pub max_depth: usize,
	/// Deadline for a whole render pass.
	pub timeout: Option<Duration>,
}

impl Default for ComposerOptions {
	fn default() -> Self {
		Self {
			fallback_root: DEFAULT_FALLBACK_ROOT.to_string(),
			extension: DEFAULT_EXTENSION.to_string(),
			max_depth: DEFAULT_MAX_DEPTH,
			timeout: None,
		}
	}
}

impl ComposerOptions {
	pub fn from_config(config: Option<&TesseraConfig>) -> Self {
		let Some(config) = config else {
			return Self::default();
		};

		Self {
			fallback_root: config.templates.fallback.clone(),
			extension: config.templates.extension.clone(),
			max_depth: config.render.max_depth,
			timeout: config.render.timeout_ms.map(Duration::from_millis),
		}
	}
}

/// Completion notifications of a streamed render pass.
///
/// A successful pass yields exactly one `Data` followed by one `End`. A failed
/// pass yields a single `Failed` and neither of the others.
#[derive(Debug)]
pub enum RenderEvent {
	Data(String),
	End,
	Failed(TesseraError),
}

/// Receiving half of a streamed render pass.
#[derive(Debug)]
pub struct RenderStream {
	events: mpsc::Receiver<RenderEvent>,
}

impl RenderStream {
	/// Wait for the next event. Returns `None` once the pass has finished and
	/// every event has been delivered.
	pub async fn next(&mut self) -> Option<RenderEvent> {
		self.events.recv().await
	}
}

/// Entry point of the engine: composes a root template and every partial it
/// transitively references into one output.
pub struct Composer<L> {
	locator: TemplateLocator,
	loader: Arc<L>,
	evaluator: Arc<dyn Evaluator>,
	options: ComposerOptions,
}

impl<L> std::fmt::Debug for Composer<L> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Composer")
			.field("locator", &self.locator)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl<L: TemplateLoader> Composer<L> {
	/// Create a composer evaluating templates with [`JinjaEvaluator`].
	pub fn new(registry: TemplateRegistry, loader: L, options: ComposerOptions) -> Self {
		let locator = TemplateLocator::new(
			Arc::new(registry),
			&options.fallback_root,
			&options.extension,
		);

		Self {
			locator,
			loader: Arc::new(loader),
			evaluator: Arc::new(JinjaEvaluator::new()),
			options,
		}
	}

	/// Swap in a different template evaluator.
	#[must_use]
	pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
		self.evaluator = Arc::new(evaluator);
		self
	}

	pub fn locator(&self) -> &TemplateLocator {
		&self.locator
	}

	pub fn options(&self) -> &ComposerOptions {
		&self.options
	}

	/// Run one render pass and return the fully composed output.
	///
	/// The first of `search_paths` becomes the pass root. Any failure in any
	/// node fails the whole pass and abandons loads still in flight.
	pub async fn render(
		&self,
		context: RenderContext,
		search_paths: &[impl AsRef<str>],
		root_template: &str,
	) -> TesseraResult<String> {
		let template_root = search_paths
			.first()
			.map_or(self.locator.fallback_root(), AsRef::as_ref);
		let mut pass = RenderPass::new(template_root);
		let mut loads = JoinSet::new();

		let root = pass.partial(self, root_template, context, None)?;
		self.start_load(&mut pass, root, &mut loads);

		let result = match self.options.timeout {
			Some(deadline) => {
				tokio::time::timeout(deadline, self.drive(&mut pass, &mut loads))
					.await
					.unwrap_or(Err(TesseraError::Timeout {
						millis: deadline.as_millis(),
					}))
			}
			None => self.drive(&mut pass, &mut loads).await,
		};

		if let Err(error) = &result {
			if !loads.is_empty() {
				tracing::warn!(in_flight = loads.len(), %error, "render pass failed, cancelling loads");
			}
			loads.abort_all();
		}

		result
	}

	/// Run a render pass in the background and report completion through a
	/// [`RenderStream`].
	pub fn stream(
		self: &Arc<Self>,
		context: RenderContext,
		search_paths: Vec<String>,
		root_template: impl Into<String>,
	) -> RenderStream {
		let (sender, events) = mpsc::channel(2);
		let composer = Arc::clone(self);
		let root_template = root_template.into();

		tokio::spawn(async move {
			match composer.render(context, search_paths.as_slice(), &root_template).await {
				Ok(output) => {
					if sender.send(RenderEvent::Data(output)).await.is_ok() {
						let _ = sender.send(RenderEvent::End).await;
					}
				}
				Err(error) => {
					let _ = sender.send(RenderEvent::Failed(error)).await;
				}
			}
		});

		RenderStream { events }
	}

	fn start_load(
		&self,
		pass: &mut RenderPass,
		id: NodeId,
		loads: &mut JoinSet<(NodeId, io::Result<String>)>,
	) {
		let node = pass.node_mut(id);
		node.state = NodeState::Loading;
		tracing::debug!(%id, template = %node.template_id, "loading template");

		let loader = Arc::clone(&self.loader);
		let template_id = node.template_id.clone();
		loads.spawn(async move { (id, loader.load(&template_id).await) });
	}

	/// Feed finished loads into the tree until the root resolves.
	async fn drive(
		&self,
		pass: &mut RenderPass,
		loads: &mut JoinSet<(NodeId, io::Result<String>)>,
	) -> TesseraResult<String> {
		while let Some(joined) = loads.join_next().await {
			let (id, body) = joined.map_err(|e| {
				TesseraError::TemplateLoad {
					template: "<unknown>".to_string(),
					reason: e.to_string(),
				}
			})?;
			let body = body.map_err(|e| {
				TesseraError::TemplateLoad {
					template: pass.node(id).template_id.clone(),
					reason: e.to_string(),
				}
			})?;

			if let Some(output) = self.render_node(pass, id, &body, loads)? {
				return Ok(output);
			}
		}

		Err(TesseraError::Incomplete {
			pending: pass.unresolved(),
		})
	}

	/// Evaluate a loaded node, create its children and start their loads.
	/// Returns the composed output when this completes the root.
	fn render_node(
		&self,
		pass: &mut RenderPass,
		id: NodeId,
		body: &str,
		loads: &mut JoinSet<(NodeId, io::Result<String>)>,
	) -> TesseraResult<Option<String>> {
		let collector = PartialCollector::new(pass.next_id);
		let node = pass.node_mut(id);
		node.state = NodeState::Rendering;
		let rendered = self
			.evaluator
			.evaluate(&node.template_id, body, &node.context, &collector)?;

		pass.next_id = collector.next_id();
		let calls = collector.drain();
		let mut children = Vec::with_capacity(calls.len());
		for call in calls {
			children.push(pass.child(self, id, call)?);
		}
		pass.fill_content(id, &rendered, &children)?;

		tracing::debug!(%id, children = children.len(), "rendered template");
		for child in children {
			self.start_load(pass, child, loads);
		}

		if pass.node(id).pending == 0 {
			return Ok(pass.resolve(id));
		}

		pass.node_mut(id).state = NodeState::AwaitingChildren;
		Ok(None)
	}
}

/// Per-pass state: the node arena indexed by id, the id counter and the
/// search root.
#[derive(Debug)]
struct RenderPass {
	template_root: String,
	next_id: usize,
	nodes: Vec<TemplateNode>,
}

impl RenderPass {
	fn new(template_root: &str) -> Self {
		Self {
			template_root: template_root.to_string(),
			next_id: 0,
			nodes: Vec::new(),
		}
	}

	fn node(&self, id: NodeId) -> &TemplateNode {
		&self.nodes[id.index()]
	}

	fn node_mut(&mut self, id: NodeId) -> &mut TemplateNode {
		&mut self.nodes[id.index()]
	}

	fn root(&self) -> Option<&TemplateNode> {
		self.nodes.first()
	}

	fn unresolved(&self) -> usize {
		self.nodes
			.iter()
			.filter(|node| node.state != NodeState::Resolved)
			.count()
	}

	/// Create a node for `name`. Without a parent this establishes the root,
	/// which must be the first node of the pass.
	fn partial<L: TemplateLoader>(
		&mut self,
		composer: &Composer<L>,
		name: &str,
		context: RenderContext,
		parent: Option<NodeId>,
	) -> TesseraResult<NodeId> {
		let id = NodeId(self.next_id);
		self.next_id += 1;
		self.insert(composer, id, name, context, parent)
	}

	/// Create the node for a partial call recorded while rendering `parent`.
	fn child<L: TemplateLoader>(
		&mut self,
		composer: &Composer<L>,
		parent: NodeId,
		call: PartialCall,
	) -> TesseraResult<NodeId> {
		let context = call
			.context
			.unwrap_or_else(|| self.node(parent).context.clone());
		self.insert(composer, call.id, &call.name, context, Some(parent))
	}

	fn insert<L: TemplateLoader>(
		&mut self,
		composer: &Composer<L>,
		id: NodeId,
		name: &str,
		context: RenderContext,
		parent: Option<NodeId>,
	) -> TesseraResult<NodeId> {
		let (origin_dir, depth) = match parent {
			Some(parent) => {
				let parent = self.node(parent);
				(Some(parent.dirname()), parent.depth + 1)
			}
			None => (None, 0),
		};

		if depth > composer.options.max_depth {
			return Err(TesseraError::DepthExceeded {
				name: name.to_string(),
				max_depth: composer.options.max_depth,
			});
		}

		let template_id = composer
			.locator
			.resolve(&self.template_root, name, origin_dir)?;

		debug_assert_eq!(id.index(), self.nodes.len(), "node ids are dense");
		debug_assert!(
			parent.is_some() || self.root().is_none(),
			"only the first node of a pass is parentless"
		);

		tracing::debug!(%id, template = %template_id, parent = ?parent, "created node");
		self.nodes
			.push(TemplateNode::new(id, template_id, context, parent, depth));
		if let Some(parent) = parent {
			self.node_mut(parent).add_child(id);
		}

		Ok(id)
	}

	/// Split a freshly rendered node into slots for `children`. A marker that
	/// belongs to none of them fails the pass.
	fn fill_content(
		&mut self,
		id: NodeId,
		rendered: &str,
		children: &[NodeId],
	) -> TesseraResult<()> {
		let node = self.node_mut(id);
		let content = RenderedContent::split(rendered, children).map_err(|token| {
			TesseraError::StrayPlaceholder {
				template: node.template_id.clone(),
				token,
			}
		})?;
		node.content = Some(content);

		Ok(())
	}

	/// Mark `id` resolved and cascade its output upward. Returns the composed
	/// output when the cascade reaches the root.
	fn resolve(&mut self, id: NodeId) -> Option<String> {
		let mut current = id;

		loop {
			let node = self.node_mut(current);
			node.state = NodeState::Resolved;
			let content = node.content.take().unwrap_or_default();
			debug_assert!(content.open_slots().next().is_none(), "resolved with open slots");
			let output = content.into_output();
			tracing::debug!(id = %current, template = %node.template_id, "resolved node");

			let Some(parent) = node.parent else {
				return Some(output);
			};

			if !self.node_mut(parent).settle_child(current, &output) {
				return None;
			}
			current = parent;
		}
	}
}
