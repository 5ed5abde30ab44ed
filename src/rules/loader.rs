//! Rule loading: CSV rows → compiled, whitelisted expression trees.

use std::path::Path;

use log::warn;

use super::ast::{Aggregate, CompiledExpr, CompiledTerm, Expr, Term};
use super::parser::parse;
use crate::error::AgentError;
use crate::metrics::MetricRegistry;
use crate::severity::Severity;

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    /// Node path this rule binds to; a trailing `/if` marks a per-interface rule.
    pub path: String,
    pub severity: Severity,
    pub expr: CompiledExpr,
}

impl CompiledRule {
    pub fn is_per_interface(&self) -> bool {
        self.path.ends_with("/if")
    }

    /// The node path this rule binds to, stripped of the `/if` suffix.
    pub fn bound_path(&self) -> &str {
        self.path.strip_suffix("/if").unwrap_or(&self.path)
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawRuleRow {
    name: String,
    path: String,
    severity: String,
    rule: String,
}

/// Loads and compiles rule rows against `registry`. Malformed rows, unparseable
/// rule text, and whitelist violations are logged and skipped; the load never
/// aborts on a single bad row.
pub fn load<P: AsRef<Path>>(
    path: P,
    registry: &MetricRegistry,
) -> Result<(Vec<CompiledRule>, Vec<AgentError>), AgentError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        AgentError::Fatal(format!("cannot open rule file {}: {e}", path.display()))
    })?;

    let mut rules = Vec::new();
    let mut errors = Vec::new();

    for (line, record) in reader.deserialize::<RawRuleRow>().enumerate() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                let err = AgentError::LoadError {
                    file: path.display().to_string(),
                    line,
                    reason: e.to_string(),
                };
                warn!("{err}");
                errors.push(err);
                continue;
            }
        };

        let severity = match row.severity.parse::<Severity>() {
            Ok(s) => s,
            Err(reason) => {
                let err = AgentError::LoadError {
                    file: path.display().to_string(),
                    line,
                    reason: format!("rule {:?}: {reason}", row.name),
                };
                warn!("{err}");
                errors.push(err);
                continue;
            }
        };

        match compile_rule(&row.name, &row.rule, registry) {
            Ok(expr) => rules.push(CompiledRule {
                name: row.name,
                path: row.path,
                severity,
                expr,
            }),
            Err(reason) => {
                let err = AgentError::ParseError { name: row.name, reason };
                warn!("{err}");
                errors.push(err);
            }
        }
    }

    Ok((rules, errors))
}

fn compile_rule(name: &str, text: &str, registry: &MetricRegistry) -> Result<CompiledExpr, String> {
    let ast = parse(text).map_err(|e| format!("rule {name:?}: {}", e.0))?;
    compile_expr(&ast, registry)
}

fn compile_expr(expr: &Expr, registry: &MetricRegistry) -> Result<CompiledExpr, String> {
    Ok(match expr {
        Expr::Or(l, r) => CompiledExpr::Or(
            Box::new(compile_expr(l, registry)?),
            Box::new(compile_expr(r, registry)?),
        ),
        Expr::And(l, r) => CompiledExpr::And(
            Box::new(compile_expr(l, registry)?),
            Box::new(compile_expr(r, registry)?),
        ),
        Expr::Not(inner) => CompiledExpr::Not(Box::new(compile_expr(inner, registry)?)),
        Expr::Cmp(l, op, r) => {
            CompiledExpr::Cmp(compile_term(l, registry)?, *op, compile_term(r, registry)?)
        }
        Expr::Bare(t) => CompiledExpr::Bare(compile_term(t, registry)?),
    })
}

fn compile_term(term: &Term, registry: &MetricRegistry) -> Result<CompiledTerm, String> {
    match term {
        Term::Number(n) => Ok(CompiledTerm::Literal((*n).into())),
        Term::Str(s) => Ok(CompiledTerm::Literal(s.clone().into())),
        Term::Ident { call: Some(_), base, .. } => {
            Err(format!("arbitrary calls are forbidden (identifier {base:?})"))
        }
        Term::Ident { base, suffixes, call: None } => {
            if registry.get(base).is_none() {
                return Err(format!("unknown identifier {base:?}"));
            }
            let (aggregate, rest) = match suffixes.split_last() {
                Some((last, rest)) => match Aggregate::from_suffix(last) {
                    Some(agg) => (Some(agg), rest),
                    None => return Err(format!("unknown aggregate suffix {last:?} on {base:?}")),
                },
                None => (None, suffixes.as_slice()),
            };
            if !rest.is_empty() {
                return Err(format!(
                    "unsupported attribute access on {base:?}: only a single trailing aggregate suffix is permitted"
                ));
            }
            Ok(CompiledTerm::Metric { path: base.clone(), aggregate })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry_with(names: &[&str]) -> MetricRegistry {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,owner_class,value_type,unit,is_list,is_counter,warn,crit").unwrap();
        for n in names {
            writeln!(f, "{n},bm/cpu,float,,0,0,,").unwrap();
        }
        MetricRegistry::load(f.path()).unwrap().0
    }

    fn rule_file(rows: &[(&str, &str, &str, &str)]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,path,severity,rule").unwrap();
        for (name, path, sev, rule) in rows {
            writeln!(f, "{name},{path},{sev},\"{rule}\"").unwrap();
        }
        f
    }

    #[test]
    fn accepts_rule_over_known_metric() {
        let registry = registry_with(&["cpu_idle"]);
        let f = rule_file(&[("R1", "node/bm/cpu", "orange", "cpu_idle.top < 5")]);
        let (rules, errors) = load(f.path(), &registry).unwrap();
        assert!(errors.is_empty());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].severity, Severity::Orange);
    }

    #[test]
    fn rejects_rule_with_unknown_identifier_without_aborting() {
        let registry = registry_with(&["cpu_idle"]);
        let f = rule_file(&[
            ("R1", "node/bm/cpu", "orange", "cpu_idle < 5 and os.system(\"rm -rf /\")"),
            ("R2", "node/bm/cpu", "red", "cpu_idle.top < 1"),
        ]);
        let (rules, errors) = load(f.path(), &registry).unwrap();
        assert_eq!(rules.len(), 1, "R1 must be dropped, R2 must still load");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AgentError::ParseError { .. }));
    }

    #[test]
    fn rejects_bad_severity_row_without_aborting() {
        let registry = registry_with(&["cpu_idle"]);
        let f = rule_file(&[("R1", "node/bm/cpu", "purple", "cpu_idle.top < 5")]);
        let (rules, errors) = load(f.path(), &registry).unwrap();
        assert!(rules.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn per_interface_path_is_detected() {
        let registry = registry_with(&["rx_bytes"]);
        let f = rule_file(&[("R1", "node/bm/net/if", "orange", "rx_bytes.mean < 1")]);
        let (rules, _) = load(f.path(), &registry).unwrap();
        assert!(rules[0].is_per_interface());
        assert_eq!(rules[0].bound_path(), "node/bm/net");
    }
}
