//! Structured query predicates over JSON documents.
//!
//! Field names are dotted paths into the stored JSON (`group.id`,
//! `status`). A missing field never equals anything, so `Ne` matches it.

use std::cmp::Ordering;

use serde_json::Value;

/// A predicate over a document's JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    All,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Gt(String, Value),
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

impl Selector {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::Ne(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::Lt(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::Gt(field.to_string(), value.into())
    }

    /// Whether `doc` satisfies this predicate.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => lookup(doc, field) == Some(value),
            Self::Ne(field, value) => lookup(doc, field) != Some(value),
            Self::Lt(field, value) => {
                lookup(doc, field).and_then(|v| compare(v, value)) == Some(Ordering::Less)
            }
            Self::Gt(field, value) => {
                lookup(doc, field).and_then(|v| compare(v, value)) == Some(Ordering::Greater)
            }
            Self::And(all) => all.iter().all(|s| s.matches(doc)),
            Self::Or(any) => any.iter().any(|s| s.matches(doc)),
        }
    }
}

/// Sort order for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    /// Order two documents by this sort's field. Incomparable values tie.
    pub fn order(&self, a: &Value, b: &Value) -> Ordering {
        let ord = match (lookup(a, &self.field), lookup(b, &self.field)) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if self.descending { ord.reverse() } else { ord }
    }
}

/// Skip/limit window over query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub skip: usize,
    /// `None` returns everything after `skip`.
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
        }
    }
}

fn lookup<'v>(doc: &'v Value, field: &str) -> Option<&'v Value> {
    field.split('.').try_fold(doc, |v, key| v.get(key))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "name": "shop",
            "status": "RUNNING",
            "time_update": 1000,
            "group": { "id": "/shop" }
        })
    }

    #[test]
    fn equality_and_negation() {
        assert!(Selector::eq("name", "shop").matches(&doc()));
        assert!(!Selector::eq("name", "blog").matches(&doc()));
        assert!(Selector::ne("name", "blog").matches(&doc()));
        assert!(Selector::ne("missing", "x").matches(&doc()));
        assert!(!Selector::eq("missing", "x").matches(&doc()));
    }

    #[test]
    fn nested_fields() {
        assert!(Selector::eq("group.id", "/shop").matches(&doc()));
    }

    #[test]
    fn ordering_predicates() {
        assert!(Selector::lt("time_update", 2000).matches(&doc()));
        assert!(!Selector::lt("time_update", 1000).matches(&doc()));
        assert!(Selector::gt("time_update", 999).matches(&doc()));
        assert!(!Selector::lt("name", 5).matches(&doc()));
    }

    #[test]
    fn boolean_combinators() {
        let running_shop = Selector::And(vec![
            Selector::eq("name", "shop"),
            Selector::eq("status", "RUNNING"),
        ]);
        assert!(running_shop.matches(&doc()));

        let idle_or_shop = Selector::Or(vec![
            Selector::eq("status", "IDLE"),
            Selector::eq("name", "shop"),
        ]);
        assert!(idle_or_shop.matches(&doc()));
        assert!(!Selector::Or(vec![]).matches(&doc()));
        assert!(Selector::And(vec![]).matches(&doc()));
    }

    #[test]
    fn sort_orders_numbers_and_strings() {
        let a = json!({ "n": 1, "s": "b" });
        let b = json!({ "n": 2, "s": "a" });
        assert_eq!(Sort::asc("n").order(&a, &b), Ordering::Less);
        assert_eq!(Sort::desc("n").order(&a, &b), Ordering::Greater);
        assert_eq!(Sort::asc("s").order(&a, &b), Ordering::Greater);
    }
}
