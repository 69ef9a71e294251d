use std::collections::BTreeSet;
use std::fmt;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;
use serde::Serialize;

use crate::registry::dirname;

/// Literal marker that prefixes every placeholder token. The id of the node
/// follows it immediately, e.g. `###partial###3`.
pub const PLACEHOLDER_MARKER: &str = "###partial###";

/// Variable bindings a template is rendered against.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderContext(serde_json::Map<String, serde_json::Value>);

impl RenderContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a binding, replacing any previous value for `key`.
	#[must_use]
	pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	/// Build a context from a JSON value. Only objects are accepted.
	pub fn from_value(value: serde_json::Value) -> Option<Self> {
		match value {
			serde_json::Value::Object(map) => Some(Self(map)),
			_ => None,
		}
	}
}

impl From<serde_json::Map<String, serde_json::Value>> for RenderContext {
	fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
		Self(map)
	}
}

/// Identifier of a node within one render pass. Doubles as the suffix of the
/// node's placeholder token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
	pub fn index(self) -> usize {
		self.0
	}

	/// The token standing in for this node's output inside its parent.
	pub fn placeholder(self) -> String {
		format!("{PLACEHOLDER_MARKER}{}", self.0)
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Lifecycle of a [`TemplateNode`]. A failure anywhere aborts the whole pass,
/// so there is no failed state stored on the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
	Created,
	Loading,
	Rendering,
	AwaitingChildren,
	Resolved,
}

/// One instance of a partial (or the root) being rendered.
#[derive(Debug, Clone)]
pub struct TemplateNode {
	pub id: NodeId,
	pub template_id: String,
	pub context: RenderContext,
	pub parent: Option<NodeId>,
	pub children: BTreeSet<NodeId>,
	/// Rendered output with one slot per child placeholder. Taken once the
	/// node has been substituted into its parent.
	pub content: Option<RenderedContent>,
	pub state: NodeState,
	/// Number of children that have not yet substituted their output.
	pub pending: usize,
	/// Nesting level; the root is at depth 0.
	pub depth: usize,
}

impl TemplateNode {
	pub fn new(
		id: NodeId,
		template_id: String,
		context: RenderContext,
		parent: Option<NodeId>,
		depth: usize,
	) -> Self {
		Self {
			id,
			template_id,
			context,
			parent,
			children: BTreeSet::new(),
			content: None,
			state: NodeState::Created,
			pending: 0,
			depth,
		}
	}

	/// Preferred search location for this node's own partials.
	pub fn dirname(&self) -> &str {
		dirname(&self.template_id)
	}

	pub fn is_root(&self) -> bool {
		self.parent.is_none()
	}

	pub fn add_child(&mut self, child: NodeId) {
		if self.children.insert(child) {
			self.pending += 1;
		}
	}

	/// Fill the slots of `child` with its final output and mark the child as
	/// no longer pending. Returns `true` when this was the last outstanding
	/// child.
	pub fn settle_child(&mut self, child: NodeId, output: &str) -> bool {
		if let Some(content) = self.content.as_mut() {
			content.settle(child, output);
		}
		self.pending = self.pending.saturating_sub(1);
		self.pending == 0
	}
}

/// Piece of a rendered node: literal text or the slot of one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
	Text(String),
	Child(NodeId),
}

/// Output of one evaluation, split at the placeholders of the node's own
/// children. Slots are fixed when the node renders, so settling a child never
/// rescans text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedContent {
	segments: Vec<Segment>,
}

impl RenderedContent {
	/// Split `content` at every placeholder, matching each one against
	/// `children` (in call order). Digits after a matched id stay literal
	/// text, so `{{ partial("a") }}1` keeps its trailing `1`.
	///
	/// A marker that matches none of `children` is returned as the error.
	pub fn split(content: &str, children: &[NodeId]) -> Result<Self, String> {
		let mut segments = Vec::new();
		let mut expected = 0;
		let mut last = 0;

		while let Some(offset) = content[last..].find(PLACEHOLDER_MARKER) {
			let start = last + offset;
			let digits_start = start + PLACEHOLDER_MARKER.len();
			let rest = &content[digits_start..];
			let digits_len = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
			let digits = &rest[..digits_len];

			let Some((position, child)) = match_child(digits, children, expected) else {
				return Err(format!("{PLACEHOLDER_MARKER}{digits}"));
			};

			if start > last {
				segments.push(Segment::Text(content[last..start].to_string()));
			}
			segments.push(Segment::Child(child));
			expected = position + 1;
			last = digits_start + child.to_string().len();
		}

		if last < content.len() {
			segments.push(Segment::Text(content[last..].to_string()));
		}

		Ok(Self { segments })
	}

	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	/// Fill every slot of `child` with `output`.
	pub fn settle(&mut self, child: NodeId, output: &str) {
		for segment in &mut self.segments {
			if *segment == Segment::Child(child) {
				*segment = Segment::Text(output.to_string());
			}
		}
	}

	/// Ids of children whose slots are still open.
	pub fn open_slots(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.segments.iter().filter_map(|segment| {
			match segment {
				Segment::Child(id) => Some(*id),
				Segment::Text(_) => None,
			}
		})
	}

	/// Concatenate the segments. Open slots are written back as placeholders.
	pub fn into_output(self) -> String {
		self.segments
			.into_iter()
			.map(|segment| {
				match segment {
					Segment::Text(text) => text,
					Segment::Child(id) => id.placeholder(),
				}
			})
			.collect()
	}
}

/// The child whose id is a prefix of `digits`. The next child in call order
/// wins a tie, otherwise the longest id does.
fn match_child(digits: &str, children: &[NodeId], expected: usize) -> Option<(usize, NodeId)> {
	let is_prefix = |id: &NodeId| digits.starts_with(&id.to_string());

	if let Some(id) = children.get(expected).filter(|id| is_prefix(*id)) {
		return Some((expected, *id));
	}

	children
		.iter()
		.copied()
		.enumerate()
		.filter(|(_, id)| is_prefix(id))
		.max_by_key(|(_, id)| id.to_string().len())
}
