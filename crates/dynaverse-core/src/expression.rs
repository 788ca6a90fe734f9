//! Request expression building.
//!
//! The service evaluates expressions server-side; this module only
//! assembles the expression strings and their `#name`/`:value`
//! substitution maps. The surface is a small closed set: an update-action
//! builder, a condition tree, and a projection list, compiled together
//! into one [`Expression`].

use std::collections::HashMap;

use dynaverse_model::AttributeValue;

/// A compiled set of request expressions with their substitution maps.
///
/// Only the fields relevant to a given operation are consulted: a put
/// reads `condition`, an update reads `update` + `condition`, a query
/// reads `key_condition` + `filter` + `projection`, and so on.
#[derive(Debug, Clone, Default)]
pub struct Expression {
    /// Condition that must hold for a write to apply.
    pub condition: Option<String>,
    /// Update actions for an update operation.
    pub update: Option<String>,
    /// Key condition for a query.
    pub key_condition: Option<String>,
    /// Post-read filter for a query or scan.
    pub filter: Option<String>,
    /// Attributes to project into the result.
    pub projection: Option<String>,
    /// Substitution tokens for attribute names.
    pub names: HashMap<String, String>,
    /// Substitution tokens for attribute values.
    pub values: HashMap<String, AttributeValue>,
}

impl Expression {
    /// Start building an expression.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }
}

/// One comparison operator usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A condition tree over attribute names and values.
#[derive(Debug, Clone)]
pub struct Condition(ConditionNode);

#[derive(Debug, Clone)]
enum ConditionNode {
    Compare(Comparator, String, AttributeValue),
    BeginsWith(String, AttributeValue),
    AttributeExists(String),
    AttributeNotExists(String),
    And(Box<ConditionNode>, Box<ConditionNode>),
}

impl Condition {
    /// `name = value`.
    pub fn eq(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Eq,
            name.into(),
            value.into(),
        ))
    }

    /// `name <> value`.
    pub fn ne(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Ne,
            name.into(),
            value.into(),
        ))
    }

    /// `name < value`.
    pub fn lt(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Lt,
            name.into(),
            value.into(),
        ))
    }

    /// `name <= value`.
    pub fn le(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Le,
            name.into(),
            value.into(),
        ))
    }

    /// `name > value`.
    pub fn gt(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Gt,
            name.into(),
            value.into(),
        ))
    }

    /// `name >= value`.
    pub fn ge(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::Compare(
            Comparator::Ge,
            name.into(),
            value.into(),
        ))
    }

    /// `begins_with(name, value)`.
    pub fn begins_with(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self(ConditionNode::BeginsWith(name.into(), value.into()))
    }

    /// `attribute_exists(name)`.
    pub fn attribute_exists(name: impl Into<String>) -> Self {
        Self(ConditionNode::AttributeExists(name.into()))
    }

    /// `attribute_not_exists(name)`.
    pub fn attribute_not_exists(name: impl Into<String>) -> Self {
        Self(ConditionNode::AttributeNotExists(name.into()))
    }

    /// Conjunction of two conditions.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self(ConditionNode::And(Box::new(self.0), Box::new(other.0)))
    }

    fn compile(&self, alloc: &mut Allocator) -> String {
        Self::compile_node(&self.0, alloc)
    }

    fn compile_node(node: &ConditionNode, alloc: &mut Allocator) -> String {
        match node {
            ConditionNode::Compare(op, name, value) => {
                let n = alloc.name(name);
                let v = alloc.value(value.clone());
                format!("{n} {} {v}", op.symbol())
            }
            ConditionNode::BeginsWith(name, value) => {
                let n = alloc.name(name);
                let v = alloc.value(value.clone());
                format!("begins_with({n}, {v})")
            }
            ConditionNode::AttributeExists(name) => {
                format!("attribute_exists({})", alloc.name(name))
            }
            ConditionNode::AttributeNotExists(name) => {
                format!("attribute_not_exists({})", alloc.name(name))
            }
            ConditionNode::And(left, right) => {
                let l = Self::compile_node(left, alloc);
                let r = Self::compile_node(right, alloc);
                format!("({l}) AND ({r})")
            }
        }
    }
}

/// Accumulated update actions, compiled into one update expression.
#[derive(Debug, Clone, Default)]
pub struct Update {
    sets: Vec<(String, AttributeValue)>,
    removes: Vec<String>,
    adds: Vec<(String, AttributeValue)>,
    deletes: Vec<(String, AttributeValue)>,
}

impl Update {
    /// Start an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET name = value`.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.sets.push((name.into(), value.into()));
        self
    }

    /// `REMOVE name`.
    #[must_use]
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.removes.push(name.into());
        self
    }

    /// `ADD name value` (numeric increment or set extension).
    #[must_use]
    pub fn add(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.adds.push((name.into(), value.into()));
        self
    }

    /// `DELETE name value` (set element removal).
    #[must_use]
    pub fn delete(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.deletes.push((name.into(), value.into()));
        self
    }

    /// Returns `true` when no actions were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
            && self.removes.is_empty()
            && self.adds.is_empty()
            && self.deletes.is_empty()
    }

    fn compile(&self, alloc: &mut Allocator) -> String {
        let mut clauses = Vec::with_capacity(4);
        if !self.sets.is_empty() {
            let actions: Vec<String> = self
                .sets
                .iter()
                .map(|(name, value)| {
                    let n = alloc.name(name);
                    let v = alloc.value(value.clone());
                    format!("{n} = {v}")
                })
                .collect();
            clauses.push(format!("SET {}", actions.join(", ")));
        }
        if !self.removes.is_empty() {
            let actions: Vec<String> = self.removes.iter().map(|name| alloc.name(name)).collect();
            clauses.push(format!("REMOVE {}", actions.join(", ")));
        }
        if !self.adds.is_empty() {
            let actions: Vec<String> = self
                .adds
                .iter()
                .map(|(name, value)| {
                    let n = alloc.name(name);
                    let v = alloc.value(value.clone());
                    format!("{n} {v}")
                })
                .collect();
            clauses.push(format!("ADD {}", actions.join(", ")));
        }
        if !self.deletes.is_empty() {
            let actions: Vec<String> = self
                .deletes
                .iter()
                .map(|(name, value)| {
                    let n = alloc.name(name);
                    let v = alloc.value(value.clone());
                    format!("{n} {v}")
                })
                .collect();
            clauses.push(format!("DELETE {}", actions.join(", ")));
        }
        clauses.join(" ")
    }
}

/// Allocates `#nN`/`:vN` substitution tokens, deduplicating names.
#[derive(Debug, Default)]
struct Allocator {
    names: Vec<(String, String)>,
    values: HashMap<String, AttributeValue>,
}

impl Allocator {
    fn name(&mut self, attr: &str) -> String {
        if let Some((token, _)) = self.names.iter().find(|(_, a)| a == attr) {
            return token.clone();
        }
        let token = format!("#n{}", self.names.len());
        self.names.push((token.clone(), attr.to_owned()));
        token
    }

    fn value(&mut self, value: AttributeValue) -> String {
        let token = format!(":v{}", self.values.len());
        self.values.insert(token.clone(), value);
        token
    }

    fn into_maps(self) -> (HashMap<String, String>, HashMap<String, AttributeValue>) {
        (self.names.into_iter().collect(), self.values)
    }
}

/// Builds an [`Expression`] from its parts.
#[derive(Debug, Default)]
pub struct Builder {
    update: Option<Update>,
    condition: Option<Condition>,
    key_condition: Option<Condition>,
    filter: Option<Condition>,
    projection: Vec<String>,
}

impl Builder {
    /// Attach update actions.
    #[must_use]
    pub fn with_update(mut self, update: Update) -> Self {
        self.update = Some(update);
        self
    }

    /// Attach a write condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Attach a query key condition.
    #[must_use]
    pub fn with_key_condition(mut self, condition: Condition) -> Self {
        self.key_condition = Some(condition);
        self
    }

    /// Attach a post-read filter.
    #[must_use]
    pub fn with_filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Project only the named attributes.
    #[must_use]
    pub fn with_projection<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Compile every part into a single [`Expression`].
    #[must_use]
    pub fn build(self) -> Expression {
        let mut alloc = Allocator::default();
        let update = self
            .update
            .filter(|u| !u.is_empty())
            .map(|u| u.compile(&mut alloc));
        let condition = self.condition.map(|c| c.compile(&mut alloc));
        let key_condition = self.key_condition.map(|c| c.compile(&mut alloc));
        let filter = self.filter.map(|c| c.compile(&mut alloc));
        let projection = if self.projection.is_empty() {
            None
        } else {
            let tokens: Vec<String> = self.projection.iter().map(|a| alloc.name(a)).collect();
            Some(tokens.join(", "))
        };
        let (names, values) = alloc.into_maps();
        Expression {
            condition,
            update,
            key_condition,
            filter,
            projection,
            names,
            values,
        }
    }
}
