//! Expression and clause definitions consumed by the operators.
//!
//! The planner that produces these structures is external; operators are
//! constructed directly from them. Column references follow the
//! `stream.column` convention, where an unqualified name matches any stream.

use std::collections::BTreeSet;
use std::fmt;

/// Stream name used for columns that carry no explicit qualifier
pub const DEFAULT_STREAM: &str = "$$default";

/// Expressions evaluated against rows and collections
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified: `col` or `stream.col`
    Column(String),
    /// Metadata reference: `meta(key)` or `meta(stream.key)`
    Meta(String),
    /// Literal values
    Literal(LiteralValue),
    /// Binary operations: expr op expr
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operations: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Scalar or aggregate function calls: func_name(args...)
    Function { name: String, args: Vec<Expr> },
    /// Stateful analytic call whose result is cached on the row
    Analytic(AnalyticCall),
    /// CASE expressions, simple (`CASE x WHEN ...`) when `operand` is set
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>, // (condition, result)
        else_clause: Option<Box<Expr>>,
    },
    /// List expressions for IN operators: (expr1, expr2, expr3)
    List(Vec<Expr>),
    /// `*` when `None`, `stream.*` otherwise
    Wildcard(Option<String>),
    /// Map member access: expr->field
    FieldAccess { expr: Box<Expr>, field: String },
    /// Array element access: expr[index]
    Index { expr: Box<Expr>, index: Box<Expr> },
    /// Array slice: expr[start:end], either bound optional
    Slice {
        expr: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn column(name: &str) -> Self {
        Expr::Column(name.to_string())
    }

    pub fn function(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_string(),
            args,
        }
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn integer(value: i64) -> Self {
        Expr::Literal(LiteralValue::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(LiteralValue::Float(value))
    }

    pub fn string(value: &str) -> Self {
        Expr::Literal(LiteralValue::String(value.to_string()))
    }

    /// Collect the distinct stream qualifiers of column references, in order of first appearance
    pub fn stream_qualifiers(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        self.walk(&mut |expr: &Expr| {
            if let Expr::Column(name) = expr {
                if let (Some(stream), _) = split_column(name) {
                    if seen.insert(stream.to_string()) {
                        ordered.push(stream.to_string());
                    }
                }
            }
        });
        ordered
    }

    /// Visit this expression and every nested sub-expression, parents first
    pub fn walk<F: FnMut(&Expr)>(&self, visit: &mut F) {
        visit(self);
        match self {
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::UnaryOp { expr, .. }
            | Expr::FieldAccess { expr, .. } => expr.walk(visit),
            Expr::Function { args, .. } | Expr::List(args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Analytic(call) => {
                for arg in &call.args {
                    arg.walk(visit);
                }
            }
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                if let Some(operand) = operand {
                    operand.walk(visit);
                }
                for (condition, result) in when_clauses {
                    condition.walk(visit);
                    result.walk(visit);
                }
                if let Some(else_expr) = else_clause {
                    else_expr.walk(visit);
                }
            }
            Expr::Index { expr, index } => {
                expr.walk(visit);
                index.walk(visit);
            }
            Expr::Slice { expr, start, end } => {
                expr.walk(visit);
                if let Some(start) = start {
                    start.walk(visit);
                }
                if let Some(end) = end {
                    end.walk(visit);
                }
            }
            Expr::Column(_) | Expr::Meta(_) | Expr::Literal(_) | Expr::Wildcard(_) => {}
        }
    }
}

/// Split `stream.column` into its qualifier and column name.
///
/// Names without a dot are unqualified. Only the first dot separates the
/// qualifier, so `a.b.c` yields `(Some("a"), "b.c")`.
pub fn split_column(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((stream, column)) if !stream.is_empty() && !column.is_empty() => {
            (Some(stream), column)
        }
        _ => (None, name),
    }
}

/// Literal values in SQL
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,

    // Set operations
    In,
    NotIn,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::In => "IN",
            BinaryOperator::NotIn => "NOT IN",
        };
        write!(f, "{}", symbol)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    IsNull,
    IsNotNull,
}

/// A stateful analytic function call such as `lag(temperature) OVER (PARTITION BY device)`.
///
/// `id` is assigned by the planner and must be unique within a rule; it addresses
/// the call's state in the rule's analytic state store and names the calculated
/// column the result is cached under.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticCall {
    pub id: u32,
    pub name: String,
    pub args: Vec<Expr>,
    pub partition_by: Vec<Expr>,
    /// State only advances on rows where this evaluates to true
    pub when: Option<Box<Expr>>,
}

impl AnalyticCall {
    pub fn new(id: u32, name: &str, args: Vec<Expr>) -> Self {
        Self {
            id,
            name: name.to_lowercase(),
            args,
            partition_by: Vec::new(),
            when: None,
        }
    }

    pub fn with_partition(mut self, partition_by: Vec<Expr>) -> Self {
        self.partition_by = partition_by;
        self
    }

    pub fn with_when(mut self, when: Expr) -> Self {
        self.when = Some(Box::new(when));
        self
    }

    /// Calculated column holding this call's result on the current row
    pub fn cache_key(&self) -> String {
        format!("$$a_{}_{}", self.name, self.id)
    }
}

/// Rank-style window function applied over a collection, e.g. `row_number() OVER (PARTITION BY a)`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRankCall {
    pub name: String,
    pub partition_by: Vec<Expr>,
    /// Column the computed position is written to
    pub output_field: String,
}

/// Fields of a SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    /// Simple column reference: column_name or stream.column_name
    Column(String),
    /// Aliased column: column_name AS alias
    AliasedColumn { column: String, alias: String },
    /// Expression with optional alias: expr [AS alias]
    Expression { expr: Expr, alias: Option<String> },
    /// Wildcard selection: *
    Wildcard,
    /// Wildcard over one stream: stream.*
    QualifiedWildcard(String),
    /// Wildcard with exclusions: * EXCEPT(a, b)
    WildcardExcept(Vec<String>),
}

/// JOIN clause of a multi-stream query
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Type of join (INNER, LEFT, RIGHT, FULL OUTER, CROSS)
    pub join_type: JoinType,
    /// Right side of the join
    pub right_source: String,
    /// Optional alias for the right source
    pub right_alias: Option<String>,
    /// JOIN condition (ON clause)
    pub condition: Option<Expr>,
}

impl JoinClause {
    pub fn new(join_type: JoinType, right_source: &str, condition: Option<Expr>) -> Self {
        Self {
            join_type,
            right_source: right_source.to_string(),
            right_alias: None,
            condition,
        }
    }

    /// Name rows of the right stream are emitted under
    pub fn right_name(&self) -> &str {
        self.right_alias.as_deref().unwrap_or(&self.right_source)
    }
}

/// Types of JOIN operations supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN - only matching records from both sides
    Inner,
    /// LEFT JOIN - all records from left, matching from right
    Left,
    /// RIGHT JOIN - all records from right, matching from left
    Right,
    /// FULL OUTER JOIN - all records from both sides
    FullOuter,
    /// CROSS JOIN - cartesian product, condition ignored
    Cross,
}

/// ORDER BY expression
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}
