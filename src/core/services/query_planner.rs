use crate::core::models::entry::Entry;
use crate::core::models::query::{EntryQuery, Predicate};

/// A normalized query, ready to hand to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub predicate: Predicate,
    pub limit: Option<usize>,
}

impl QueryPlan {
    /// True when no entry can possibly match; stores need not be asked.
    pub fn is_unsatisfiable(&self) -> bool {
        self.predicate == Predicate::False || self.limit == Some(0)
    }

    /// Evaluate the plan's predicate against one entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        evaluate(&self.predicate, entry)
    }
}

fn evaluate(predicate: &Predicate, entry: &Entry) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::RelatedTo(related) => entry.targets.iter().any(|t| {
            related.references.contains(&t.reference)
                && related
                    .relation
                    .as_deref()
                    .is_none_or(|name| t.relation_name == name)
        }),
        Predicate::EventType(event_type) => entry.event_type == *event_type,
        Predicate::EventTypePrefix(prefix) => entry.event_type.starts_with(prefix.as_str()),
        Predicate::Since(instant) => entry.timestamp >= *instant,
        Predicate::Until(instant) => entry.timestamp < *instant,
        Predicate::MessageContains(needle) => entry.message.contains(needle.as_str()),
        Predicate::And(items) => items.iter().all(|p| evaluate(p, entry)),
        Predicate::Or(items) => items.iter().any(|p| evaluate(p, entry)),
        Predicate::Not(inner) => !evaluate(inner, entry),
    }
}

/// Turns an `EntryQuery` into a `QueryPlan`.
///
/// All filters are ANDed, then the tree is normalized so that stores only
/// see flat connectives with no neutral or absorbing elements left.
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn plan(&self, query: &EntryQuery) -> QueryPlan {
        let predicate = Self::normalize(Predicate::And(query.filters.clone()));
        tracing::debug!(?predicate, limit = ?query.limit, "planned entry query");

        QueryPlan {
            predicate,
            limit: query.limit,
        }
    }

    /// Normalize a predicate tree.
    ///
    /// - nested `And`/`Or` are flattened, repeated operands dropped
    /// - `True` vanishes from `And`, `False` from `Or`
    /// - `False` absorbs an `And`, `True` absorbs an `Or`
    /// - empty `And` is `True`, empty `Or` is `False`
    /// - `RelatedTo` over an empty reference set is `False`
    /// - double negation cancels
    pub fn normalize(predicate: Predicate) -> Predicate {
        match predicate {
            Predicate::RelatedTo(related) if related.references.is_empty() => Predicate::False,
            Predicate::And(items) => {
                let mut operands = Vec::new();
                for item in items {
                    match Self::normalize(item) {
                        Predicate::True => {}
                        Predicate::False => return Predicate::False,
                        Predicate::And(inner) => push_all(&mut operands, inner),
                        other => push_unique(&mut operands, other),
                    }
                }
                collapse(operands, Predicate::True, Predicate::And)
            }
            Predicate::Or(items) => {
                let mut operands = Vec::new();
                for item in items {
                    match Self::normalize(item) {
                        Predicate::False => {}
                        Predicate::True => return Predicate::True,
                        Predicate::Or(inner) => push_all(&mut operands, inner),
                        other => push_unique(&mut operands, other),
                    }
                }
                collapse(operands, Predicate::False, Predicate::Or)
            }
            Predicate::Not(inner) => match Self::normalize(*inner) {
                Predicate::True => Predicate::False,
                Predicate::False => Predicate::True,
                Predicate::Not(double) => *double,
                other => Predicate::Not(Box::new(other)),
            },
            other => other,
        }
    }
}

fn push_unique(operands: &mut Vec<Predicate>, predicate: Predicate) {
    if !operands.contains(&predicate) {
        operands.push(predicate);
    }
}

fn push_all(operands: &mut Vec<Predicate>, predicates: Vec<Predicate>) {
    for predicate in predicates {
        push_unique(operands, predicate);
    }
}

fn collapse(
    mut operands: Vec<Predicate>,
    empty: Predicate,
    connective: fn(Vec<Predicate>) -> Predicate,
) -> Predicate {
    match operands.len() {
        0 => empty,
        1 => operands.remove(0),
        _ => connective(operands),
    }
}
