//! Query expressions and their compilation into predicates.
//!
//! A query goes through two stages:
//!
//! 1. **Parse** - a BSON query document becomes an [`Expr`] tree ([`Expr::parse`]). Trees can
//!    also be built directly with the [`Filter`] helpers, which is the only way to embed an
//!    in-process `$where` closure.
//! 2. **Compile** - a [`QueryVisitor`] lowers the tree. [`QueryCompiler`] resolves each path
//!    against a schema and produces a single [`Predicate`].
//!
//! # Query documents
//!
//! ```ignore
//! doc! {
//!     "title": "Hello",                          // equality through the field type
//!     "views": { "$gte": 10, "$lt": 100 },       // field operators
//!     "meta": { "lang": "en" },                  // nested paths (`meta.lang`)
//!     "$or": [{ "draft": true }, { "tags": { "$size": 0 } }],
//!     "$not": { "author": "anon", "views": 0 },  // passes when any clause fails
//!     "$where": "is_featured",                   // named predicate registered on the schema
//! }
//! ```
//!
//! Unknown operators, and operators the path's type does not support, fail compilation with
//! [`StoreError::InvalidQuery`].

use std::{fmt, sync::Arc};

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    record::Record,
    schema::Schema,
    types::{QueryOperator, string::compile_pattern},
};

/// Compiled query: `true` when the record matches.
pub type Predicate = Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// Target of a `$where` clause.
#[derive(Clone)]
pub enum WhereClause {
    /// A predicate registered on the schema under this name.
    Named(String),
    /// An in-process predicate.
    Inline(Predicate),
}

impl fmt::Debug for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereClause::Named(name) => f.debug_tuple("Named").field(name).finish(),
            WhereClause::Inline(_) => f.write_str("Inline(<predicate>)"),
        }
    }
}

/// A query expression tree.
///
/// # Example
///
/// ```ignore
/// use docvault_core::query::{Expr, Filter};
///
/// let expr = Filter::eq("status", "active")
///     .and(Filter::gt("age", 18))
///     .or(Filter::exists("admin"));
/// ```
#[derive(Debug, Clone)]
pub enum Expr {
    /// Every expression must match. An empty list matches everything.
    And(Vec<Expr>),
    /// Some expression must match. An empty list matches nothing.
    Or(Vec<Expr>),
    /// No expression may match.
    Nor(Vec<Expr>),
    /// Matches when at least one expression fails.
    Not(Vec<Expr>),
    /// Arbitrary predicate over the record.
    Where(WhereClause),
    /// Plain equality through the path's field type.
    Match {
        path: String,
        value: Bson,
    },
    /// Named field operator.
    Operator {
        path: String,
        op: QueryOperator,
        arg: Bson,
    },
}

impl Expr {
    /// Parses a query document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for unknown operators and malformed special forms.
    pub fn parse(query: &Document) -> StoreResult<Expr> {
        Ok(Expr::And(parse_clauses(query)?))
    }

    /// Combines this expression with another using logical AND.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(vec![self])
    }
}

fn query_list(key: &str, value: &Bson) -> StoreResult<Vec<Expr>> {
    let Bson::Array(items) = value else {
        return Err(StoreError::InvalidQuery(format!("`{key}` expects a list of queries")));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(query) => Expr::parse(query),
            _ => Err(StoreError::InvalidQuery(format!("`{key}` expects a list of queries"))),
        })
        .collect()
}

fn parse_clauses(query: &Document) -> StoreResult<Vec<Expr>> {
    let mut clauses = Vec::with_capacity(query.len());

    for (key, value) in query {
        match key.as_str() {
            "$and" => clauses.extend(query_list(key, value)?),
            "$or" => clauses.push(Expr::Or(query_list(key, value)?)),
            "$nor" => clauses.push(Expr::Nor(query_list(key, value)?)),
            "$not" => match value {
                Bson::Document(inner) => clauses.push(Expr::Not(parse_clauses(inner)?)),
                _ => return Err(StoreError::InvalidQuery("`$not` expects a query".into())),
            },
            "$where" => match value {
                Bson::String(name) => clauses.push(Expr::Where(WhereClause::Named(name.clone()))),
                _ => {
                    return Err(StoreError::InvalidQuery(
                        "`$where` expects the name of a registered predicate".into(),
                    ));
                }
            },
            special if special.starts_with('$') => {
                return Err(StoreError::InvalidQuery(format!("Unknown query operator `{special}`")));
            }
            path => parse_path(path, value, &mut clauses)?,
        }
    }

    Ok(clauses)
}

fn parse_path(path: &str, value: &Bson, clauses: &mut Vec<Expr>) -> StoreResult<()> {
    let Bson::Document(inner) = value else {
        clauses.push(Expr::Match { path: path.to_string(), value: value.clone() });
        return Ok(());
    };

    for (key, value) in inner {
        if key.starts_with('$') {
            clauses.push(Expr::Operator {
                path: path.to_string(),
                op: key.parse()?,
                arg: value.clone(),
            });
        } else {
            parse_path(&format!("{path}.{key}"), value, clauses)?;
        }
    }

    Ok(())
}

/// Conversion into a query expression.
pub trait IntoQuery {
    fn into_query(self) -> StoreResult<Expr>;
}

impl IntoQuery for Expr {
    fn into_query(self) -> StoreResult<Expr> {
        Ok(self)
    }
}

impl IntoQuery for Document {
    fn into_query(self) -> StoreResult<Expr> {
        Expr::parse(&self)
    }
}

impl IntoQuery for &Document {
    fn into_query(self) -> StoreResult<Expr> {
        Expr::parse(self)
    }
}

/// Helpers for building expressions without a query document.
///
/// # Example
///
/// ```ignore
/// use docvault_core::query::Filter;
///
/// let expr = Filter::and([
///     Filter::in_list("tags", vec!["rust", "db"]),
///     Filter::where_fn(|record| record.get_value("title").is_some()),
/// ]);
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::Match { path: path.into(), value: value.into() }
    }

    /// Applies any named operator.
    pub fn op(path: impl Into<String>, op: QueryOperator, arg: impl Into<Bson>) -> Expr {
        Expr::Operator { path: path.into(), op, arg: arg.into() }
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Ne, value)
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Gt, value)
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Gte, value)
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Lt, value)
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Lte, value)
    }

    pub fn in_list(path: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::In, values)
    }

    pub fn not_in(path: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Filter::op(path, QueryOperator::Nin, values)
    }

    pub fn exists(path: impl Into<String>) -> Expr {
        Filter::op(path, QueryOperator::Exists, true)
    }

    pub fn not_exists(path: impl Into<String>) -> Expr {
        Filter::op(path, QueryOperator::Exists, false)
    }

    pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Expr {
        Filter::op(path, QueryOperator::Regex, pattern.into())
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Nor(exprs.into_iter().collect())
    }

    /// Matches when any of `exprs` fails.
    pub fn not(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Not(exprs.into_iter().collect())
    }

    /// A `$where` clause naming a predicate registered on the schema.
    pub fn where_named(name: impl Into<String>) -> Expr {
        Expr::Where(WhereClause::Named(name.into()))
    }

    /// A `$where` clause running `predicate` against each record.
    pub fn where_fn<F>(predicate: F) -> Expr
    where
        F: Fn(&dyn Record) -> bool + Send + Sync + 'static,
    {
        Expr::Where(WhereClause::Inline(Arc::new(predicate)))
    }
}

/// Lowers an [`Expr`] tree.
pub trait QueryVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_where(&mut self, clause: &WhereClause) -> Result<Self::Output, Self::Error>;
    fn visit_match(&mut self, path: &str, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_operator(
        &mut self,
        path: &str,
        op: QueryOperator,
        arg: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Nor(exprs) => self.visit_nor(exprs),
            Expr::Not(exprs) => self.visit_not(exprs),
            Expr::Where(clause) => self.visit_where(clause),
            Expr::Match { path, value } => self.visit_match(path, value),
            Expr::Operator { path, op, arg } => self.visit_operator(path, *op, arg),
        }
    }
}

/// Compiles expressions into predicates, resolving paths through a schema.
pub struct QueryCompiler<'a> {
    schema: &'a Schema,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn compile(&mut self, expr: &Expr) -> StoreResult<Predicate> {
        self.visit_expr(expr)
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> StoreResult<Vec<Predicate>> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
}

impl QueryVisitor for QueryCompiler<'_> {
    type Output = Predicate;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> StoreResult<Predicate> {
        let stack = self.visit_all(exprs)?;
        Ok(Arc::new(move |record: &dyn Record| stack.iter().all(|predicate| predicate(record))))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> StoreResult<Predicate> {
        let stack = self.visit_all(exprs)?;
        Ok(Arc::new(move |record: &dyn Record| stack.iter().any(|predicate| predicate(record))))
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> StoreResult<Predicate> {
        let stack = self.visit_all(exprs)?;
        Ok(Arc::new(move |record: &dyn Record| !stack.iter().any(|predicate| predicate(record))))
    }

    fn visit_not(&mut self, exprs: &[Expr]) -> StoreResult<Predicate> {
        let stack = self.visit_all(exprs)?;
        Ok(Arc::new(move |record: &dyn Record| stack.iter().any(|predicate| !predicate(record))))
    }

    fn visit_where(&mut self, clause: &WhereClause) -> StoreResult<Predicate> {
        match clause {
            WhereClause::Inline(predicate) => Ok(predicate.clone()),
            WhereClause::Named(name) => self.schema.predicate_named(name).ok_or_else(|| {
                StoreError::InvalidQuery(format!("No predicate named `{name}` is registered"))
            }),
        }
    }

    fn visit_match(&mut self, path: &str, value: &Bson) -> StoreResult<Predicate> {
        let field = self.schema.field_or_mixed(path);
        let path = path.to_string();
        let value = value.clone();

        Ok(Arc::new(move |record: &dyn Record| field.matches(record.get_value(&path).as_ref(), &value)))
    }

    fn visit_operator(
        &mut self,
        path: &str,
        op: QueryOperator,
        arg: &Bson,
    ) -> StoreResult<Predicate> {
        let field = self.schema.field_or_mixed(path);

        if !field.query_operators().contains(&op) {
            return Err(StoreError::InvalidQuery(format!(
                "`{op}` is not supported by `{path}` ({})",
                field.kind()
            )));
        }

        let path = path.to_string();

        if op == QueryOperator::Regex {
            let pattern = compile_pattern(arg)?;
            return Ok(Arc::new(move |record: &dyn Record| {
                record.get_value(&path).as_ref().and_then(Bson::as_str).is_some_and(|text| pattern.is_match(text))
            }));
        }

        let arg = arg.clone();

        Ok(Arc::new(move |record: &dyn Record| field.query(op, record.get_value(&path).as_ref(), &arg)))
    }
}
