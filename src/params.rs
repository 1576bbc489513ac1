use crate::Value;

/// Arguments bound to one statement.
///
/// Catalog queries run without arguments; caller statements bind either
/// `?` placeholders in order or `:name` style placeholders.
#[derive(Clone, Debug, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    /// The name may carry its `:`, `@` or `$` prefix or omit it.
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Params {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Self::named(pairs)
    }
}

/// SQL text plus its arguments, as handed to a [`Connection`](crate::Connection).
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new<P: Into<Params>>(sql: impl Into<String>, params: P) -> Self {
        Self {
            sql: sql.into(),
            params: params.into(),
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql, ())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql, ())
    }
}
