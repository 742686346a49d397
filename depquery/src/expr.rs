//! Minimal query expression tree and the `rdeps -> allrdeps` structural
//! rewrite (§4.G step 4, §9 "Query-expression mapper"). Parsing a query
//! string into this tree is out of scope (spec §1); callers build the
//! tree directly or via whatever front-end they own.

use crate::model::Label;

/// A target-pattern literal or set-algebra/function-call query node.
/// `deps`/`rdeps`/`allrdeps`/`rbuildfiles` are the functions this core
/// adds on top of set algebra (§6 `getFunctions`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    Pattern(String),
    /// `set(a, b, c)`: labels named explicitly rather than matched by a
    /// pattern, resolved directly against the graph — tolerant of a label
    /// that doesn't currently exist, unlike `getTarget`'s hard not-found.
    Set(Vec<Label>),
    Union(Box<QueryExpr>, Box<QueryExpr>),
    Intersect(Box<QueryExpr>, Box<QueryExpr>),
    Except(Box<QueryExpr>, Box<QueryExpr>),
    Deps {
        expr: Box<QueryExpr>,
        depth: Option<u32>,
    },
    Rdeps {
        universe: Box<QueryExpr>,
        expr: Box<QueryExpr>,
        depth: Option<u32>,
    },
    AllRdeps {
        expr: Box<QueryExpr>,
        depth: Option<u32>,
    },
    RBuildFiles(Vec<String>),
}

/// Target patterns are compared after absolutization against
/// `parser_prefix`: already-absolute patterns (`//...`, `@repo//...`) are
/// left alone, anything else is anchored under the prefix.
fn absolutize(pattern: &str, parser_prefix: &str) -> String {
    if pattern.starts_with("//") || pattern.starts_with('@') {
        pattern.to_owned()
    } else {
        let prefix = parser_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("//{pattern}")
        } else {
            format!("//{prefix}/{pattern}")
        }
    }
}

/// Rewrites every `rdeps(<literal>, T, depth)` where `<literal>` equals
/// the singleton universe scope (after absolutization) into
/// `allrdeps(T, depth)`. `allrdeps` uses an undirected universe-wide
/// reverse walk and avoids recomputing universe membership; the rewrite
/// is skipped entirely when the universe has more than one element
/// (§4.G step 4).
pub fn optimize(expr: QueryExpr, universe_scope: &[String], parser_prefix: &str) -> QueryExpr {
    let singleton_universe = match universe_scope {
        [only] => Some(absolutize(only, parser_prefix)),
        _ => None,
    };
    rewrite(expr, singleton_universe.as_deref(), parser_prefix)
}

fn rewrite(expr: QueryExpr, singleton_universe: Option<&str>, parser_prefix: &str) -> QueryExpr {
    match expr {
        QueryExpr::Union(l, r) => QueryExpr::Union(
            Box::new(rewrite(*l, singleton_universe, parser_prefix)),
            Box::new(rewrite(*r, singleton_universe, parser_prefix)),
        ),
        QueryExpr::Intersect(l, r) => QueryExpr::Intersect(
            Box::new(rewrite(*l, singleton_universe, parser_prefix)),
            Box::new(rewrite(*r, singleton_universe, parser_prefix)),
        ),
        QueryExpr::Except(l, r) => QueryExpr::Except(
            Box::new(rewrite(*l, singleton_universe, parser_prefix)),
            Box::new(rewrite(*r, singleton_universe, parser_prefix)),
        ),
        QueryExpr::Deps { expr, depth } => QueryExpr::Deps {
            expr: Box::new(rewrite(*expr, singleton_universe, parser_prefix)),
            depth,
        },
        QueryExpr::AllRdeps { expr, depth } => QueryExpr::AllRdeps {
            expr: Box::new(rewrite(*expr, singleton_universe, parser_prefix)),
            depth,
        },
        QueryExpr::Rdeps {
            universe,
            expr,
            depth,
        } => {
            let expr = Box::new(rewrite(*expr, singleton_universe, parser_prefix));
            if let (QueryExpr::Pattern(p), Some(singleton)) =
                (universe.as_ref(), singleton_universe)
            {
                if absolutize(p, parser_prefix) == singleton {
                    return QueryExpr::AllRdeps { expr, depth };
                }
            }
            QueryExpr::Rdeps {
                universe: Box::new(rewrite(*universe, singleton_universe, parser_prefix)),
                expr,
                depth,
            }
        }
        other @ (QueryExpr::Pattern(_) | QueryExpr::Set(_) | QueryExpr::RBuildFiles(_)) => other,
    }
}
