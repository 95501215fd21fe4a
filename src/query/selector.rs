//! Operation selectors for `find_operation`, `has`, `clear` and `copy_from`.

use crate::query::operation::Operation;
use regex::Regex;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Picks operations out of a builder
#[derive(Clone)]
pub enum Selector {
    /// Every operation
    All,
    /// Operations with this exact name
    Name(String),
    /// Operations whose name matches
    Regex(Regex),
    /// Operations of one concrete type
    Type(TypeId),
    Predicate(Arc<dyn Fn(&dyn Operation) -> bool + Send + Sync>),
}

impl Selector {
    pub fn name(name: impl Into<String>) -> Self {
        Selector::Name(name.into())
    }

    /// # Errors
    ///
    /// Returns the regex error for an invalid pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Selector::Regex)
    }

    pub fn of_type<T: Operation + 'static>() -> Self {
        Selector::Type(TypeId::of::<T>())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&dyn Operation) -> bool + Send + Sync + 'static,
    {
        Selector::Predicate(Arc::new(f))
    }

    pub fn matches(&self, op: &dyn Operation) -> bool {
        match self {
            Selector::All => true,
            Selector::Name(name) => op.name() == name,
            Selector::Regex(re) => re.is_match(op.name()),
            Selector::Type(id) => op.as_any().type_id() == *id,
            Selector::Predicate(f) => f(op),
        }
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::name(name)
    }
}

impl From<Regex> for Selector {
    fn from(re: Regex) -> Self {
        Selector::Regex(re)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str("All"),
            Selector::Name(name) => write!(f, "Name({:?})", name),
            Selector::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            Selector::Type(id) => write!(f, "Type({:?})", id),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
