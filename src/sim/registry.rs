//! Curve registry
//!
//! Every rebuild hands each line a short function name and registers a
//! family of derived functions under it, so formulas can refer to other
//! curves: `g(x)`, `g′(x)`, `g″(x)`, `G(x)`, `gint(a, b)`, `gh(x)`,
//! `gsum(i, j)`, `gpsum(i, j)`.

use std::collections::HashMap;

use crate::expr::{Builtin, Callable, CompileError, CurveOp, FunctionTable};
use crate::settings::LineDefaults;

use super::line::Line;

/// Function names handed out to lines, in order.
///
/// Single letters only, none of them a variable (`x y t h a n`), the
/// constant `e`, or a prefix that would spell a built-in.
pub const LINE_NAMES: [&str; 15] = [
    "f", "g", "k", "l", "m", "p", "q", "r", "s", "u", "v", "w", "b", "c", "d",
];

/// Name of the line at `index`, if the table reaches that far
pub fn line_name(index: usize) -> Option<&'static str> {
    LINE_NAMES.get(index).copied()
}

/// Function namespace: built-ins plus the curve functions of one rebuild
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: HashMap<String, Callable>,
}

impl Namespace {
    pub fn builtins() -> Self {
        let entries = Builtin::ALL
            .iter()
            .map(|b| (b.name().to_string(), Callable::Builtin(*b)))
            .collect();
        Self { entries }
    }

    /// Built-ins plus curve functions for the first `count` lines
    pub fn for_lines(count: usize) -> Self {
        let mut ns = Self::builtins();
        for index in 0..count {
            let Some(base) = line_name(index) else {
                log::warn!("No function name for line {index}; it can't be referenced");
                break;
            };
            for op in CurveOp::ALL {
                ns.entries
                    .insert(op.name_for(base), Callable::Curve { index, op });
            }
        }
        ns
    }

    pub fn get(&self, name: &str) -> Option<Callable> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FunctionTable for Namespace {
    fn resolve(&self, name: &str) -> Option<Callable> {
        self.get(name)
    }
}

/// Rename, reset and recompile every line.
///
/// Names are registered before anything compiles, so a line may reference
/// any other line (or itself). Lines that fail to compile stay out of
/// collisions; their errors are returned with the line index.
pub fn rebuild(lines: &mut [Line], defaults: &LineDefaults) -> (Namespace, Vec<(usize, CompileError)>) {
    for (index, line) in lines.iter_mut().enumerate() {
        line.name = line_name(index);
        line.hits = 0;
    }

    let namespace = Namespace::for_lines(lines.len());

    let mut errors = Vec::new();
    for (index, line) in lines.iter_mut().enumerate() {
        if let Err(e) = line.compile(&namespace, defaults) {
            log::warn!("Line {index}: {e}");
            errors.push((index, e));
        }
    }
    log::debug!(
        "Rebuilt {} lines, {} names registered, {} failed",
        lines.len(),
        namespace.len(),
        errors.len()
    );
    (namespace, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{EvalContext, EvalError, VARIABLES};

    #[test]
    fn test_names_avoid_variables_and_builtins() {
        for name in LINE_NAMES {
            assert!(!VARIABLES.contains(&name), "{name} is a variable");
            assert_ne!(name, "e");
            for op in CurveOp::ALL {
                let full = op.name_for(name);
                assert!(Builtin::lookup(&full).is_none(), "{full} shadows a builtin");
            }
        }
    }

    #[test]
    fn test_names_are_unique() {
        let ns = Namespace::for_lines(LINE_NAMES.len());
        assert_eq!(
            ns.len(),
            Builtin::ALL.len() + LINE_NAMES.len() * CurveOp::ALL.len()
        );
    }

    #[test]
    fn test_namespace_resolves_curve_ops() {
        let ns = Namespace::for_lines(2);
        assert_eq!(
            ns.get("g′"),
            Some(Callable::Curve {
                index: 1,
                op: CurveOp::Derivative
            })
        );
        assert_eq!(ns.get("fsum").map(|c| matches!(c, Callable::Curve { .. })), Some(true));
        assert!(ns.get("k").is_none());
        assert!(matches!(ns.get("sin"), Some(Callable::Builtin(_))));
    }

    #[test]
    fn test_rebuild_resets_hits_and_links_lines() {
        let mut lines = vec![Line::new("x^2"), Line::new("f(x) + 1"), Line::new("g′(x)")];
        lines[0].hits = 9;
        let (_, errors) = rebuild(&mut lines, &LineDefaults::default());
        assert!(errors.is_empty());
        assert_eq!(lines[0].hits, 0);
        assert_eq!(lines[1].name, Some("g"));

        let ctx = EvalContext::new(&lines, 0.0);
        assert_eq!(lines[1].y_at(&ctx, 3.0, 0.0), Ok(10.0));
        let slope = lines[2].y_at(&ctx, 3.0, 0.0).unwrap();
        assert!((slope - 6.0).abs() < 1e-4);
    }

    /// Evaluates `formula` on a second line after `f` is set to `base`
    fn with_base(base: &str, formula: &str, x: f64) -> (f64, Option<EvalError>) {
        let mut lines = vec![Line::new(base), Line::new(formula)];
        let (_, errors) = rebuild(&mut lines, &LineDefaults::default());
        assert!(errors.is_empty(), "{errors:?}");
        let ctx = EvalContext::new(&lines, 0.0);
        let y = lines[1].y_at(&ctx, x, 0.0).unwrap();
        (y, ctx.take_local_error())
    }

    #[test]
    fn test_second_derivative() {
        let (y, err) = with_base("x^3", "f″(x)", 2.0);
        assert!((y - 12.0).abs() < 1e-3, "{y}");
        assert!(err.is_none());
    }

    #[test]
    fn test_integrals() {
        let (y, _) = with_base("x", "F(x)", 2.0);
        assert!((y - 2.0).abs() < 1e-9);
        let (y, _) = with_base("x^2", "F(x)", -3.0);
        assert!((y + 9.0).abs() < 1e-9);
        let (y, _) = with_base("x", "fint(0, 2)", 0.0);
        assert!((y - 2.0).abs() < 1e-9);
        let (y, _) = with_base("x", "fint(2, 0)", 0.0);
        assert!((y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sum_and_product() {
        assert_eq!(with_base("x", "fsum(1, 4)", 0.0).0, 10.0);
        assert_eq!(with_base("x", "fpsum(1, 4)", 0.0).0, 24.0);
        let (y, _) = with_base("x", "fsum(1, 4) + 100fpsum(1, 4) + 10000fint(0, 2)", 0.0);
        assert!((y - 22410.0).abs() < 1e-6);
    }

    #[test]
    fn test_series_edge_cases() {
        // Reversed and NaN ranges give the identity
        assert_eq!(with_base("x", "fsum(4, 1)", 0.0), (0.0, None));
        assert_eq!(with_base("x", "fpsum(4, 1)", 0.0), (1.0, None));
        assert_eq!(with_base("x", "fsum(0, 0/0)", 0.0), (0.0, None));
        assert_eq!(with_base("x", "fpsum(0/0, 3)", 0.0), (1.0, None));
        // A fractional start steps by one
        assert_eq!(with_base("x", "fsum(0.5, 3)", 0.0).0, 4.5);

        let (y, err) = with_base("x", "1 + fsum(0, 1000000)", 0.0);
        assert_eq!(y, 1.0);
        assert_eq!(err, Some(EvalError::SeriesTooLong("fsum".to_string())));
    }

    #[test]
    fn test_hit_scaled() {
        let mut lines = vec![Line::new("x"), Line::new("fh(x)")];
        rebuild(&mut lines, &LineDefaults::default());
        let ctx = EvalContext::new(&lines, 0.0);
        assert_eq!(lines[1].y_at(&ctx, 2.0, 0.0), Ok(0.0));

        lines[0].hits = 3;
        let ctx = EvalContext::new(&lines, 0.0);
        assert_eq!(lines[1].y_at(&ctx, 2.0, 0.0), Ok(6.0));
    }

    #[test]
    fn test_rebuild_keeps_going_after_a_failure() {
        let mut lines = vec![Line::new("nope(x)"), Line::new("2")];
        let (_, errors) = rebuild(&mut lines, &LineDefaults::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 0);
        assert!(!lines[0].is_ready());
        assert!(lines[1].is_ready());
    }

    #[test]
    fn test_self_reference_is_bounded() {
        let mut lines = vec![Line::new("f(x) + 1")];
        rebuild(&mut lines, &LineDefaults::default());
        let ctx = EvalContext::new(&lines, 0.0);
        // Recursion bottoms out at the depth limit and yields a finite value
        let y = lines[0].y_at(&ctx, 0.0, 0.0).unwrap();
        assert!(y.is_finite());
        assert!(ctx.take_local_error().is_some());
    }
}
