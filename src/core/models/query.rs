use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr, Not};

use chrono::{DateTime, Utc};

use crate::core::models::entity_ref::EntityRef;

///
/// RelatedTo
///
/// Matches entries having at least one target whose reference is in
/// `references`, optionally restricted to one relation name. Several
/// references form an implicit OR; an empty set matches nothing.
///

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTo {
    pub references: BTreeSet<EntityRef>,
    pub relation: Option<String>,
}

impl RelatedTo {
    pub fn reference(reference: EntityRef) -> Self {
        Self {
            references: BTreeSet::from([reference]),
            relation: None,
        }
    }

    pub fn any_of(references: impl IntoIterator<Item = EntityRef>) -> Self {
        Self {
            references: references.into_iter().collect(),
            relation: None,
        }
    }

    /// Restrict the match to targets stored under `relation`.
    #[must_use]
    pub fn named(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }
}

impl From<EntityRef> for RelatedTo {
    fn from(reference: EntityRef) -> Self {
        Self::reference(reference)
    }
}

impl From<Vec<EntityRef>> for RelatedTo {
    fn from(references: Vec<EntityRef>) -> Self {
        Self::any_of(references)
    }
}

impl From<BTreeSet<EntityRef>> for RelatedTo {
    fn from(references: BTreeSet<EntityRef>) -> Self {
        Self {
            references,
            relation: None,
        }
    }
}

///
/// Predicate
///
/// Filter AST over entries. Interpretation (normalization, SQL
/// compilation, in-memory evaluation) lives in the query planner and
/// the stores.
///

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    True,
    False,
    RelatedTo(RelatedTo),
    EventType(String),
    EventTypePrefix(String),
    /// `timestamp >= instant`
    Since(DateTime<Utc>),
    /// `timestamp < instant`
    Until(DateTime<Utc>),
    /// Case-sensitive substring match on the message.
    MessageContains(String),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl Predicate {
    pub fn related_to(target: impl Into<RelatedTo>) -> Self {
        Self::RelatedTo(target.into())
    }

    pub fn related_as(relation: impl Into<String>, target: impl Into<RelatedTo>) -> Self {
        Self::RelatedTo(target.into().named(relation))
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl Not for Predicate {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl From<RelatedTo> for Predicate {
    fn from(related: RelatedTo) -> Self {
        Self::RelatedTo(related)
    }
}

///
/// Relations
///
/// Argument list for `related_to`: positional constraints match any
/// relation name, named constraints pin the relation. Every constraint
/// becomes its own `RelatedTo`, so all of them AND together and each needs
/// its own matching target.
///

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    constraints: Vec<RelatedTo>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional constraint: related under any name.
    #[must_use]
    pub fn any(mut self, target: impl Into<RelatedTo>) -> Self {
        let mut related = target.into();
        related.relation = None;
        self.constraints.push(related);
        self
    }

    /// Named constraint: related under `relation`.
    #[must_use]
    pub fn named(mut self, relation: impl Into<String>, target: impl Into<RelatedTo>) -> Self {
        self.constraints.push(target.into().named(relation));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn into_predicates(self) -> impl Iterator<Item = Predicate> {
        self.constraints.into_iter().map(Predicate::RelatedTo)
    }
}

///
/// EntryQuery
///
/// Description of a result set: every filter is ANDed, results come back
/// in the default order. Chaining adds filters, never replaces them.
///

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub filters: Vec<Predicate>,
    pub limit: Option<usize>,
}

impl EntryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    #[must_use]
    pub fn related_to(mut self, relations: Relations) -> Self {
        self.filters.extend(relations.into_predicates());
        self
    }

    #[must_use]
    pub fn event_type(self, event_type: impl Into<String>) -> Self {
        self.filter(Predicate::EventType(event_type.into()))
    }

    #[must_use]
    pub fn event_type_prefix(self, prefix: impl Into<String>) -> Self {
        self.filter(Predicate::EventTypePrefix(prefix.into()))
    }

    #[must_use]
    pub fn since(self, instant: DateTime<Utc>) -> Self {
        self.filter(Predicate::Since(instant))
    }

    #[must_use]
    pub fn until(self, instant: DateTime<Utc>) -> Self {
        self.filter(Predicate::Until(instant))
    }

    #[must_use]
    pub fn message_contains(self, needle: impl Into<String>) -> Self {
        self.filter(Predicate::MessageContains(needle.into()))
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
