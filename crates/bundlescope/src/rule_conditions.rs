//! Serializable projection of rule-matching conditions
//!
//! Module rules handed over by the host carry condition trees built from pattern
//! matchers, logical combinators and lists. The trees are shared, caller-owned and
//! still used for matching, so they are never rebuilt: [`make_rules_serializable`]
//! only attaches a textual projection to pattern leaves, in place, behind the same
//! `Arc`. Matching behavior is untouched.
//!
//! Trees are expected to be acyclic but nothing guarantees it. Augmentation,
//! serialization, matching and `Debug` all track visited nodes by address, so a
//! cycle terminates instead of overflowing the stack.

use std::{cell::RefCell, fmt, sync::Arc, sync::OnceLock};

use log::trace;
use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{
    Serialize, Serializer,
    ser::{Error as _, SerializeMap, SerializeSeq},
};

/// Shared handle to a condition node. Identity is the `Arc` allocation.
pub type ConditionRef = Arc<Condition>;

type Matcher = dyn Fn(&str) -> bool + Send + Sync;

/// A regular-expression leaf
pub struct PatternLeaf {
    regex: Regex,
    /// Textual projection, attached on first augmentation
    projection: OnceLock<String>,
}

impl PatternLeaf {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// The serializable projection, if this leaf has been augmented
    pub fn projection(&self) -> Option<&str> {
        self.projection.get().map(String::as_str)
    }

    fn augment(&self) {
        self.projection
            .get_or_init(|| format!("/{}/", self.regex.as_str()));
    }
}

impl fmt::Debug for PatternLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternLeaf")
            .field("regex", &self.regex.as_str())
            .field("projection", &self.projection.get())
            .finish()
    }
}

/// A leaf the serializer does not understand, such as a host callback or a plain
/// path prefix. It is matched through its closure and never augmented.
pub struct OpaqueLeaf {
    label: Option<String>,
    matcher: Arc<Matcher>,
}

impl OpaqueLeaf {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Debug for OpaqueLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueLeaf")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Children of a combinator. Interior mutability lets callers wire nodes after
/// construction, which is also how a (malformed) cycle can appear.
#[derive(Default)]
pub struct Children(RwLock<Vec<ConditionRef>>);

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Children")
            .field("len", &self.0.read().len())
            .finish()
    }
}

impl Children {
    fn snapshot(&self) -> Vec<ConditionRef> {
        self.0.read().clone()
    }
}

/// A condition node
pub enum Condition {
    Pattern(PatternLeaf),
    And(Children),
    Or(Children),
    Not(RwLock<ConditionRef>),
    List(Children),
    Opaque(OpaqueLeaf),
}

impl Condition {
    pub fn pattern(regex: Regex) -> ConditionRef {
        Arc::new(Self::Pattern(PatternLeaf {
            regex,
            projection: OnceLock::new(),
        }))
    }

    /// Compile `pattern` into a pattern leaf
    pub fn regex(pattern: &str) -> Result<ConditionRef, regex::Error> {
        Regex::new(pattern).map(Self::pattern)
    }

    pub fn and(children: Vec<ConditionRef>) -> ConditionRef {
        Arc::new(Self::And(Children(RwLock::new(children))))
    }

    pub fn or(children: Vec<ConditionRef>) -> ConditionRef {
        Arc::new(Self::Or(Children(RwLock::new(children))))
    }

    pub fn not(child: ConditionRef) -> ConditionRef {
        Arc::new(Self::Not(RwLock::new(child)))
    }

    pub fn list(children: Vec<ConditionRef>) -> ConditionRef {
        Arc::new(Self::List(Children(RwLock::new(children))))
    }

    /// Leaf matched by a host-provided closure
    pub fn opaque<F>(label: Option<String>, matcher: F) -> ConditionRef
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Arc::new(Self::Opaque(OpaqueLeaf {
            label,
            matcher: Arc::new(matcher),
        }))
    }

    /// Path-prefix leaf, the way bundlers treat plain string conditions
    pub fn prefix(prefix: impl Into<String>) -> ConditionRef {
        let prefix = prefix.into();
        let expected = prefix.clone();
        Self::opaque(Some(prefix), move |input| input.starts_with(&expected))
    }

    /// Append a child to a combinator. Returns `false` for leaves.
    pub fn push_child(&self, child: ConditionRef) -> bool {
        match self {
            Self::And(children) | Self::Or(children) | Self::List(children) => {
                children.0.write().push(child);
                true
            }
            Self::Not(slot) => {
                *slot.write() = child;
                true
            }
            Self::Pattern(_) | Self::Opaque(_) => false,
        }
    }

    /// Direct children, cloned out of their locks
    pub fn children(&self) -> Vec<ConditionRef> {
        match self {
            Self::And(children) | Self::Or(children) | Self::List(children) => {
                children.snapshot()
            }
            Self::Not(slot) => vec![Arc::clone(&slot.read())],
            Self::Pattern(_) | Self::Opaque(_) => Vec::new(),
        }
    }

    /// Runtime matching. A node reached again through a cycle does not match.
    pub fn matches(&self, input: &str) -> bool {
        let mut ancestors = FxHashSet::default();
        self.matches_within(input, &mut ancestors)
    }

    fn matches_within(&self, input: &str, ancestors: &mut FxHashSet<usize>) -> bool {
        let address = self.address();
        if !ancestors.insert(address) {
            trace!("Condition cycle reached while matching {input}");
            return false;
        }

        let matched = match self {
            Self::Pattern(leaf) => leaf.regex.is_match(input),
            Self::And(children) => children
                .snapshot()
                .iter()
                .all(|child| child.matches_within(input, ancestors)),
            Self::Or(children) | Self::List(children) => children
                .snapshot()
                .iter()
                .any(|child| child.matches_within(input, ancestors)),
            Self::Not(slot) => {
                let child = Arc::clone(&slot.read());
                !child.matches_within(input, ancestors)
            }
            Self::Opaque(leaf) => (leaf.matcher)(input),
        };

        ancestors.remove(&address);
        matched
    }

    fn address(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }
}

/// Attach serializable projections to every pattern leaf reachable from
/// `condition`. A `None` condition is a no-op; repeated calls change nothing.
pub fn make_condition_serializable(condition: Option<&ConditionRef>) {
    let mut visited = FxHashSet::default();
    augment_condition(condition, &mut visited);
}

fn augment_condition(condition: Option<&ConditionRef>, visited: &mut FxHashSet<usize>) {
    let Some(node) = condition else {
        return;
    };

    if !visited.insert(node.address()) {
        trace!("Skipping already visited condition node");
        return;
    }

    match node.as_ref() {
        Condition::Pattern(leaf) => leaf.augment(),
        Condition::Opaque(_) => {}
        Condition::And(_) | Condition::Or(_) | Condition::Not(_) | Condition::List(_) => {
            for child in node.children() {
                augment_condition(Some(&child), visited);
            }
        }
    }
}

/// A module rule as supplied by the host
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_query: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_fragment: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<ConditionRef>,
    /// Only present on hosts that support layers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_layer: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ConditionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<RuleSetRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleSetRule>>,
}

impl RuleSetRule {
    fn conditions(&self) -> [Option<&ConditionRef>; 9] {
        [
            self.test.as_ref(),
            self.resource_query.as_ref(),
            self.resource.as_ref(),
            self.resource_fragment.as_ref(),
            self.scheme.as_ref(),
            self.issuer.as_ref(),
            self.issuer_layer.as_ref(),
            self.include.as_ref(),
            self.exclude.as_ref(),
        ]
    }
}

/// Make every condition of every rule serializable, descending into `oneOf` and
/// nested `rules`. Conditions shared between rules are visited once.
pub fn make_rules_serializable(rules: &[RuleSetRule]) {
    let mut visited = FxHashSet::default();
    augment_rules(rules, &mut visited);
}

fn augment_rules(rules: &[RuleSetRule], visited: &mut FxHashSet<usize>) {
    for rule in rules {
        for condition in rule.conditions() {
            augment_condition(condition, visited);
        }

        if let Some(one_of) = &rule.one_of {
            augment_rules(one_of, visited);
        }
        if let Some(nested) = &rule.rules {
            augment_rules(nested, visited);
        }
    }
}

/// Serialization view that tracks the nodes on the current path so a cycle is
/// reported as an error instead of overflowing the stack.
struct ConditionView<'a> {
    node: &'a Condition,
    ancestors: &'a RefCell<FxHashSet<usize>>,
}

struct ChildrenView<'a> {
    children: &'a [ConditionRef],
    ancestors: &'a RefCell<FxHashSet<usize>>,
}

impl Serialize for ChildrenView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.children.len()))?;
        for child in self.children {
            seq.serialize_element(&ConditionView {
                node: child,
                ancestors: self.ancestors,
            })?;
        }
        seq.end()
    }
}

impl Serialize for ConditionView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let address = self.node.address();
        if !self.ancestors.borrow_mut().insert(address) {
            return Err(S::Error::custom("condition tree contains a cycle"));
        }

        let result = match self.node {
            Condition::Pattern(leaf) => match leaf.projection() {
                Some(projection) => serializer.serialize_str(projection),
                // A matcher without projection has no serializable fields
                None => serializer.serialize_map(Some(0))?.end(),
            },
            Condition::Opaque(leaf) => match leaf.label() {
                Some(label) => serializer.serialize_str(label),
                None => serializer.serialize_none(),
            },
            Condition::List(_) => {
                let children = self.node.children();
                ChildrenView {
                    children: &children,
                    ancestors: self.ancestors,
                }
                .serialize(serializer)
            }
            Condition::And(_) | Condition::Or(_) => {
                let key = if matches!(self.node, Condition::And(_)) {
                    "and"
                } else {
                    "or"
                };
                let children = self.node.children();
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    key,
                    &ChildrenView {
                        children: &children,
                        ancestors: self.ancestors,
                    },
                )?;
                map.end()
            }
            Condition::Not(slot) => {
                let child = Arc::clone(&slot.read());
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    "not",
                    &ConditionView {
                        node: &child,
                        ancestors: self.ancestors,
                    },
                )?;
                map.end()
            }
        };

        self.ancestors.borrow_mut().remove(&address);
        result
    }
}

/// `Debug` view with the same ancestor tracking as [`ConditionView`]
struct DebugView<'a> {
    node: &'a Condition,
    ancestors: &'a RefCell<FxHashSet<usize>>,
}

impl fmt::Debug for DebugView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self.node.address();
        if !self.ancestors.borrow_mut().insert(address) {
            return f.write_str("<cycle>");
        }

        let name = match self.node {
            Condition::Pattern(leaf) => {
                self.ancestors.borrow_mut().remove(&address);
                return f.debug_tuple("Pattern").field(leaf).finish();
            }
            Condition::Opaque(leaf) => {
                self.ancestors.borrow_mut().remove(&address);
                return f.debug_tuple("Opaque").field(leaf).finish();
            }
            Condition::And(_) => "And",
            Condition::Or(_) => "Or",
            Condition::Not(_) => "Not",
            Condition::List(_) => "List",
        };

        let mut tuple = f.debug_tuple(name);
        for child in self.node.children() {
            tuple.field(&DebugView {
                node: &child,
                ancestors: self.ancestors,
            });
        }
        let result = tuple.finish();

        self.ancestors.borrow_mut().remove(&address);
        result
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ancestors = RefCell::new(FxHashSet::default());
        DebugView {
            node: self,
            ancestors: &ancestors,
        }
        .fmt(f)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ancestors = RefCell::new(FxHashSet::default());
        ConditionView {
            node: self,
            ancestors: &ancestors,
        }
        .serialize(serializer)
    }
}
