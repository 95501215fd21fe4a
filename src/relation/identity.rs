//! Key column lists for models and relations
//!
//! An [`Identity`] names the columns that identify a row (a model's id columns) or
//! that link two tables (a relation's owner-side and related-side columns). Composite
//! keys are compared and joined column by column, in declaration order.

/// An ordered list of key columns
///
/// # Example
///
/// ```
/// use lifeguard_graph::relation::identity::Identity;
///
/// let identity = Identity::from("id");
/// assert_eq!(identity.arity(), 1);
///
/// let identity = Identity::from(["id", "tenant_id"]);
/// assert_eq!(identity.arity(), 2);
/// assert!(identity.contains("tenant_id"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(Vec<String>);

impl Identity {
    /// Number of columns in the key
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Column names in key order
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, col: &str) -> bool {
        self.0.iter().any(|c| c == col)
    }

    /// `true` for composite keys
    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }
}

impl From<&str> for Identity {
    fn from(col: &str) -> Self {
        Identity(vec![col.to_string()])
    }
}

impl From<String> for Identity {
    fn from(col: String) -> Self {
        Identity(vec![col])
    }
}

impl From<Vec<String>> for Identity {
    fn from(cols: Vec<String>) -> Self {
        Identity(cols)
    }
}

impl<const N: usize> From<[&str; N]> for Identity {
    fn from(cols: [&str; N]) -> Self {
        Identity(cols.iter().map(|c| c.to_string()).collect())
    }
}
