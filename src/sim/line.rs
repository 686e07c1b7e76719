//! Curves ("lines") the marbles bounce off
//!
//! A line is six formulas sharing one hit counter: the curve itself, a
//! gating condition, a bounce coefficient and a bounding box.

use serde::{Deserialize, Serialize};

use crate::Color;
use crate::expr::{CompileError, CurveLookup, EvalContext, EvalError, Expression, FunctionTable};
use crate::persistence::LineDefinition;
use crate::settings::LineDefaults;

/// Editable formula field of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineField {
    Formula,
    GraphIf,
    Bounce,
    MinX,
    MaxX,
    MinY,
    MaxY,
}

impl LineField {
    pub const ALL: [LineField; 7] = [
        LineField::Formula,
        LineField::GraphIf,
        LineField::Bounce,
        LineField::MinX,
        LineField::MaxX,
        LineField::MinY,
        LineField::MaxY,
    ];

    fn default_text(self, defaults: &LineDefaults) -> &str {
        match self {
            LineField::Formula => &defaults.formula,
            LineField::GraphIf => &defaults.graph_if,
            LineField::Bounce => &defaults.bounce,
            LineField::MinX => &defaults.min_x,
            LineField::MaxX => &defaults.max_x,
            LineField::MinY => &defaults.min_y,
            LineField::MaxY => &defaults.max_y,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Line {
    /// `y = f(x, t, h)`
    pub formula: Expression,
    /// Collisions only count where this holds
    pub graph_if: Expression,
    /// Speed multiplier applied on reflection
    pub bounce: Expression,
    pub min_x: Expression,
    pub max_x: Expression,
    pub min_y: Expression,
    pub max_y: Expression,
    /// Collisions since the last rebuild
    pub hits: u64,
    pub color: Color,
    pub hit_color: Color,
    /// Function name assigned at the last rebuild
    pub name: Option<&'static str>,
}

impl Default for Line {
    fn default() -> Self {
        Self::new("")
    }
}

impl Line {
    /// A line with the given formula; every other field takes its default
    pub fn new(formula: impl Into<String>) -> Self {
        Self {
            formula: Expression::new(formula),
            graph_if: Expression::default(),
            bounce: Expression::default(),
            min_x: Expression::default(),
            max_x: Expression::default(),
            min_y: Expression::default(),
            max_y: Expression::default(),
            hits: 0,
            color: Color::BLUE,
            hit_color: Color::RED,
            name: None,
        }
    }

    pub fn from_definition(def: &LineDefinition) -> Self {
        Self {
            formula: Expression::new(def.formula.as_str()),
            graph_if: Expression::new(def.graph_if.as_str()),
            bounce: Expression::new(def.bounce.as_str()),
            min_x: Expression::new(def.min_x.as_str()),
            max_x: Expression::new(def.max_x.as_str()),
            min_y: Expression::new(def.min_y.as_str()),
            max_y: Expression::new(def.max_y.as_str()),
            hits: 0,
            color: def.color,
            hit_color: def.hit_color,
            name: None,
        }
    }

    pub fn to_definition(&self) -> LineDefinition {
        LineDefinition {
            formula: self.formula.source().to_string(),
            graph_if: self.graph_if.source().to_string(),
            bounce: self.bounce.source().to_string(),
            min_x: self.min_x.source().to_string(),
            max_x: self.max_x.source().to_string(),
            min_y: self.min_y.source().to_string(),
            max_y: self.max_y.source().to_string(),
            color: self.color,
            hit_color: self.hit_color,
        }
    }

    pub fn field(&self, field: LineField) -> &Expression {
        match field {
            LineField::Formula => &self.formula,
            LineField::GraphIf => &self.graph_if,
            LineField::Bounce => &self.bounce,
            LineField::MinX => &self.min_x,
            LineField::MaxX => &self.max_x,
            LineField::MinY => &self.min_y,
            LineField::MaxY => &self.max_y,
        }
    }

    pub fn field_mut(&mut self, field: LineField) -> &mut Expression {
        match field {
            LineField::Formula => &mut self.formula,
            LineField::GraphIf => &mut self.graph_if,
            LineField::Bounce => &mut self.bounce,
            LineField::MinX => &mut self.min_x,
            LineField::MaxX => &mut self.max_x,
            LineField::MinY => &mut self.min_y,
            LineField::MaxY => &mut self.max_y,
        }
    }

    /// Compile every field, blank ones from `defaults`.
    ///
    /// All fields are attempted; the first failure is returned.
    pub fn compile(
        &mut self,
        functions: &dyn FunctionTable,
        defaults: &LineDefaults,
    ) -> Result<(), CompileError> {
        let mut first_error = None;
        for field in LineField::ALL {
            let fallback = field.default_text(defaults);
            if let Err(e) = self.field_mut(field).compile_or(fallback, functions) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Every field compiled, so the line takes part in collisions
    pub fn is_ready(&self) -> bool {
        LineField::ALL.iter().all(|f| self.field(*f).is_compiled())
    }

    /// Curve height at `x` for time `t`
    pub fn y_at(&self, ctx: &EvalContext<'_>, x: f64, t: f64) -> Result<f64, EvalError> {
        self.formula.evaluate(ctx, x, t, self.hits as f64)
    }

    /// `graph_if` at a point
    pub fn is_active_at(&self, ctx: &EvalContext<'_>, x: f64, y: f64, t: f64) -> Result<bool, EvalError> {
        self.graph_if.evaluate_bool(ctx, x, y, t, self.hits as f64)
    }

    /// Whether `(x, y)` lies inside the line's own bounding box
    pub fn contains(&self, ctx: &EvalContext<'_>, x: f64, y: f64, t: f64) -> Result<bool, EvalError> {
        let h = self.hits as f64;
        let min_x = self.min_x.evaluate(ctx, x, t, h)?;
        let max_x = self.max_x.evaluate(ctx, x, t, h)?;
        let min_y = self.min_y.evaluate(ctx, x, t, h)?;
        let max_y = self.max_y.evaluate(ctx, x, t, h)?;
        Ok(x >= min_x && x <= max_x && y >= min_y && y <= max_y)
    }

    /// Bounce coefficient at an impact point
    pub fn bounce_at(&self, ctx: &EvalContext<'_>, x: f64, y: f64, t: f64) -> Result<f64, EvalError> {
        self.bounce.evaluate_with_y(ctx, x, t, self.hits as f64, y)
    }
}

impl CurveLookup for [Line] {
    fn formula(&self, index: usize) -> Option<&Expression> {
        self.get(index)
            .map(|line| &line.formula)
            .filter(|f| f.is_compiled())
    }

    fn hits(&self, index: usize) -> u64 {
        self.get(index).map_or(0, |line| line.hits)
    }
}

impl CurveLookup for Vec<Line> {
    fn formula(&self, index: usize) -> Option<&Expression> {
        self.as_slice().formula(index)
    }

    fn hits(&self, index: usize) -> u64 {
        self.as_slice().hits(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoCurves;

    fn compiled(formula: &str) -> Line {
        let mut line = Line::new(formula);
        line.compile(&NoCurves, &LineDefaults::default()).unwrap();
        line
    }

    #[test]
    fn test_blank_fields_take_defaults() {
        let line = compiled("");
        assert!(line.is_ready());
        assert_eq!(line.formula.source(), "");

        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert_eq!(line.y_at(&ctx, 3.0, 0.0), Ok(0.0));
        assert_eq!(line.is_active_at(&ctx, 3.0, 0.0, 0.0), Ok(true));
        assert_eq!(line.bounce_at(&ctx, 3.0, 0.0, 0.0), Ok(1.0));
        assert_eq!(line.contains(&ctx, 10.0, -10.0, 0.0), Ok(true));
        assert_eq!(line.contains(&ctx, 10.5, 0.0, 0.0), Ok(false));
    }

    #[test]
    fn test_y_at_uses_hits() {
        let mut line = compiled("x + h");
        line.hits = 3;
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert_eq!(line.y_at(&ctx, 2.0, 0.0), Ok(5.0));
    }

    #[test]
    fn test_compile_reports_first_error_but_compiles_rest() {
        let mut line = Line::new("x +");
        line.bounce.set_source("0.5");
        assert!(line.compile(&NoCurves, &LineDefaults::default()).is_err());
        assert!(!line.formula.is_compiled());
        assert!(line.bounce.is_compiled());
        assert!(!line.is_ready());
    }

    #[test]
    fn test_bounds() {
        let mut line = Line::new("0");
        line.min_x.set_source("-1");
        line.max_x.set_source("1");
        line.compile(&NoCurves, &LineDefaults::default()).unwrap();
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert_eq!(line.contains(&ctx, 0.5, 0.0, 0.0), Ok(true));
        assert_eq!(line.contains(&ctx, 1.5, 0.0, 0.0), Ok(false));
    }

    #[test]
    fn test_lookup_skips_uncompiled() {
        let lines = vec![compiled("1"), Line::new("2")];
        assert!(lines.formula(0).is_some());
        assert!(lines.formula(1).is_none());
        assert!(lines.formula(7).is_none());
        assert_eq!(lines.hits(7), 0);
    }
}
