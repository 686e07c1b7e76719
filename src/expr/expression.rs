//! A single user formula: source text, compiled tree and parameter environment

use std::cell::{Cell, RefCell};

use super::builtins::{Builtin, FactorialCache};
use super::calculus::{central_difference, integrate, second_difference};
use super::normalize::normalize;
use super::parser::{BinaryOp, Callable, CurveOp, FunctionTable, Node, UnaryOp, Var, parse};
use super::{CompileError, EvalError, Value, ValueKind};

/// Nested curve calls deeper than this fail locally instead of overflowing
pub const MAX_CALL_DEPTH: u32 = 32;

/// Longest index range accepted by `…sum` / `…psum`
pub const MAX_SERIES_TERMS: f64 = 100_000.0;

/// Named parameters visible to a formula (`pi`, `e`, spawn index `n`, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: Vec<(String, Value)>,
}

impl Environment {
    /// Environment holding only the constants π and e
    pub fn with_constants() -> Self {
        let mut env = Self::default();
        env.set("pi", Value::Number(std::f64::consts::PI));
        env.set("e", Value::Number(std::f64::consts::E));
        env
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Per-call variable bindings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bindings {
    pub x: f64,
    pub y: Option<f64>,
    pub t: f64,
    pub h: f64,
}

impl Bindings {
    pub fn new(x: f64, t: f64, h: f64) -> Self {
        Self { x, y: None, t, h }
    }

    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// The oscillating helper variable `a = 10·sin(t)`
    #[inline]
    pub fn a(&self) -> f64 {
        10.0 * self.t.sin()
    }
}

/// Access to the compiled curves, used by synthesized curve functions
pub trait CurveLookup {
    /// Compiled formula of the curve at `index`, if it compiled
    fn formula(&self, index: usize) -> Option<&Expression>;
    fn hits(&self, index: usize) -> u64;
}

impl<T: CurveLookup + ?Sized> CurveLookup for &T {
    fn formula(&self, index: usize) -> Option<&Expression> {
        (**self).formula(index)
    }

    fn hits(&self, index: usize) -> u64 {
        (**self).hits(index)
    }
}

/// No curves; resolves built-in functions only
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCurves;

impl CurveLookup for NoCurves {
    fn formula(&self, _index: usize) -> Option<&Expression> {
        None
    }

    fn hits(&self, _index: usize) -> u64 {
        0
    }
}

impl FunctionTable for NoCurves {
    fn resolve(&self, name: &str) -> Option<Callable> {
        Builtin::lookup(name).map(Callable::Builtin)
    }
}

/// Everything an evaluation needs beyond its own bindings
pub struct EvalContext<'a> {
    curves: &'a dyn CurveLookup,
    /// Simulated time seen by curve calls
    time: f64,
    depth: Cell<u32>,
    local_error: RefCell<Option<EvalError>>,
    /// Memo for `fact`, reused by every evaluation under this context
    factorials: RefCell<FactorialCache>,
}

impl<'a> EvalContext<'a> {
    pub fn new(curves: &'a dyn CurveLookup, time: f64) -> Self {
        Self {
            curves,
            time,
            depth: Cell::new(0),
            local_error: RefCell::new(None),
            factorials: RefCell::new(FactorialCache::new()),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Most recent function-call error that was replaced by 0
    pub fn take_local_error(&self) -> Option<EvalError> {
        self.local_error.borrow_mut().take()
    }

    fn record_local(&self, err: EvalError) {
        log::debug!("function call failed, using 0: {err}");
        *self.local_error.borrow_mut() = Some(err);
    }

    fn curve_call(
        &self,
        name: &str,
        index: usize,
        op: CurveOp,
        args: &[Value],
    ) -> Result<f64, EvalError> {
        let nums = numeric_args(name, args)?;

        let depth = self.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit(name.to_string()));
        }
        self.depth.set(depth + 1);
        let result = self.curve_op(name, index, op, &nums);
        self.depth.set(depth);
        result
    }

    fn curve_op(&self, name: &str, index: usize, op: CurveOp, nums: &[f64]) -> Result<f64, EvalError> {
        let formula = self
            .curves
            .formula(index)
            .ok_or_else(|| EvalError::NotCompiled(name.to_string()))?;
        let hits = self.curves.hits(index) as f64;
        let f = |x: f64| formula.evaluate(self, x, self.time, hits);

        match op {
            CurveOp::Value => f(nums[0]),
            CurveOp::Derivative => central_difference(f, nums[0]),
            CurveOp::SecondDerivative => second_difference(f, nums[0]),
            CurveOp::Antiderivative => integrate(f, 0.0, nums[0]),
            CurveOp::Integral => integrate(f, nums[0], nums[1]),
            CurveOp::HitScaled => Ok(hits * nums[0]),
            CurveOp::Sum | CurveOp::Product => {
                let (from, to) = (nums[0], nums[1]);
                if to - from > MAX_SERIES_TERMS {
                    return Err(EvalError::SeriesTooLong(name.to_string()));
                }
                let mut acc = if op == CurveOp::Sum { 0.0 } else { 1.0 };
                if from.is_nan() || to.is_nan() || from > to {
                    return Ok(acc);
                }
                let terms = (to - from).floor() as u64 + 1;
                for k in 0..terms {
                    let term = f(from + k as f64)?;
                    if op == CurveOp::Sum {
                        acc += term;
                    } else {
                        acc *= term;
                    }
                }
                Ok(acc)
            }
        }
    }
}

fn numeric_args(name: &str, args: &[Value]) -> Result<Vec<f64>, EvalError> {
    args.iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Number(n) => Ok(*n),
            Value::Boolean(_) => Err(EvalError::ArgumentType {
                name: name.to_string(),
                position: i + 1,
            }),
        })
        .collect()
}

/// A user formula
#[derive(Debug, Clone, Default)]
pub struct Expression {
    source: String,
    /// `None` until compiled, or after a failed compile
    compiled: Option<Node>,
    params: Environment,
}

impl Expression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: None,
            params: Environment::default(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace the text; the old compiled form no longer applies
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.compiled = None;
    }

    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn params(&self) -> &Environment {
        &self.params
    }

    pub fn set_param(&mut self, name: &str, value: f64) {
        self.params.set(name, Value::Number(value));
    }

    /// Compile against `functions`; on failure the compiled form stays cleared
    pub fn compile(&mut self, functions: &dyn FunctionTable) -> Result<(), CompileError> {
        self.compile_text(&normalize(&self.source), functions)
    }

    /// Compile `fallback` instead when the source is blank. The source text
    /// itself is left alone.
    pub fn compile_or(&mut self, fallback: &str, functions: &dyn FunctionTable) -> Result<(), CompileError> {
        if self.is_blank() {
            self.compile_text(&normalize(fallback), functions)
        } else {
            self.compile(functions)
        }
    }

    fn compile_text(&mut self, text: &str, functions: &dyn FunctionTable) -> Result<(), CompileError> {
        self.compiled = None;
        let node = parse(text, functions)?;
        self.compiled = Some(node);
        self.params = Environment::with_constants();
        Ok(())
    }

    /// Numeric value at `(x, t, h)`. An uncompiled expression is 0.
    pub fn evaluate(&self, ctx: &EvalContext<'_>, x: f64, t: f64, h: f64) -> Result<f64, EvalError> {
        self.value(ctx, &Bindings::new(x, t, h))?.as_number()
    }

    /// Like `evaluate`, with `y` bound (bounce coefficients)
    pub fn evaluate_with_y(
        &self,
        ctx: &EvalContext<'_>,
        x: f64,
        t: f64,
        h: f64,
        y: f64,
    ) -> Result<f64, EvalError> {
        self.value(ctx, &Bindings::new(x, t, h).with_y(y))?.as_number()
    }

    /// Boolean value at `(x, y, t, h)`
    pub fn evaluate_bool(
        &self,
        ctx: &EvalContext<'_>,
        x: f64,
        y: f64,
        t: f64,
        h: f64,
    ) -> Result<bool, EvalError> {
        if self.compiled.is_none() {
            return Err(EvalError::NotCompiled(self.source.clone()));
        }
        self.value(ctx, &Bindings::new(x, t, h).with_y(y))?.as_bool()
    }

    /// Raw value with arbitrary bindings
    pub fn value(&self, ctx: &EvalContext<'_>, bindings: &Bindings) -> Result<Value, EvalError> {
        match &self.compiled {
            Some(node) => eval_node(node, &self.params, bindings, ctx),
            None => Ok(Value::Number(0.0)),
        }
    }
}

fn mismatch(expected: ValueKind, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

fn eval_node(
    node: &Node,
    env: &Environment,
    b: &Bindings,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    match node {
        Node::Number(v) => Ok(Value::Number(*v)),
        Node::Bool(v) => Ok(Value::Boolean(*v)),
        Node::Var(var) => match var {
            Var::X => Ok(Value::Number(b.x)),
            Var::T => Ok(Value::Number(b.t)),
            Var::H => Ok(Value::Number(b.h)),
            Var::A => Ok(Value::Number(b.a())),
            Var::Y => b
                .y
                .map(Value::Number)
                .ok_or_else(|| EvalError::UnboundVariable("y".to_string())),
            Var::Named(name) => env
                .get(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
        },
        Node::Unary { op, operand } => {
            let v = eval_node(operand, env, b, ctx)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-v.as_number()?)),
                UnaryOp::Plus => Ok(Value::Number(v.as_number()?)),
                UnaryOp::Not => Ok(Value::Boolean(!v.as_bool()?)),
            }
        }
        Node::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, env, b, ctx),
        Node::Call {
            name,
            callable,
            args,
        } => {
            let args = args
                .iter()
                .map(|arg| eval_node(arg, env, b, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            let result = match callable {
                Callable::Builtin(builtin) => builtin.call(&args, &mut ctx.factorials.borrow_mut()),
                Callable::Curve { index, op } => {
                    ctx.curve_call(name, *index, *op, &args).map(Value::Number)
                }
            };
            Ok(result.unwrap_or_else(|err| {
                ctx.record_local(err);
                Value::Number(0.0)
            }))
        }
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Node,
    rhs: &Node,
    env: &Environment,
    b: &Bindings,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    let left = eval_node(lhs, env, b, ctx)?;

    // Short-circuit boolean operators
    if let BinaryOp::And | BinaryOp::Or = op {
        let l = left.as_bool()?;
        if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
            return Ok(Value::Boolean(l));
        }
        return Ok(Value::Boolean(eval_node(rhs, env, b, ctx)?.as_bool()?));
    }

    let right = eval_node(rhs, env, b, ctx)?;

    if let BinaryOp::Eq | BinaryOp::Ne = op {
        let equal = match (left, right) {
            (Value::Number(l), Value::Number(r)) => l == r,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (l, r) => return Err(mismatch(l.kind(), &r)),
        };
        return Ok(Value::Boolean(if op == BinaryOp::Eq { equal } else { !equal }));
    }

    let l = left.as_number()?;
    let r = right.as_number()?;
    Ok(match op {
        BinaryOp::Add => Value::Number(l + r),
        BinaryOp::Sub => Value::Number(l - r),
        BinaryOp::Mul => Value::Number(l * r),
        BinaryOp::Div => Value::Number(l / r),
        // Sign follows the divisor
        BinaryOp::Rem => Value::Number(l - r * (l / r).floor()),
        BinaryOp::Pow => Value::Number(l.powf(r)),
        BinaryOp::Lt => Value::Boolean(l < r),
        BinaryOp::Le => Value::Boolean(l <= r),
        BinaryOp::Gt => Value::Boolean(l > r),
        BinaryOp::Ge => Value::Boolean(l >= r),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne => {
            unreachable!("handled above")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{E, FRAC_PI_2, PI};

    fn compiled(text: &str) -> Expression {
        let mut expr = Expression::new(text);
        expr.compile(&NoCurves).unwrap();
        expr
    }

    fn eval(text: &str, x: f64, t: f64) -> f64 {
        let ctx = EvalContext::new(&NoCurves, t);
        compiled(text).evaluate(&ctx, x, t, 0.0).unwrap()
    }

    #[test]
    fn test_variables() {
        assert_eq!(eval("x", 3.0, 0.0), 3.0);
        assert_eq!(eval("a", 0.0, 0.0), 0.0);
        assert!((eval("a", 0.0, FRAC_PI_2) - 10.0).abs() < 1e-12);
        assert_eq!(eval("2x+t", 3.0, 1.0), 7.0);
    }

    #[test]
    fn test_constants_after_compile() {
        let expr = compiled("pi + e");
        assert_eq!(expr.params().get("pi"), Some(Value::Number(PI)));
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert!((expr.evaluate(&ctx, 0.0, 0.0, 0.0).unwrap() - (PI + E)).abs() < 1e-12);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2**3**2", 0.0, 0.0), 512.0);
        assert_eq!(eval("-2**2", 0.0, 0.0), -4.0);
        assert_eq!(eval("-7 % 3", 0.0, 0.0), 2.0);
        assert_eq!(eval("if(x > 1, 10, 20)", 2.0, 0.0), 10.0);
        assert_eq!(eval("fact(5)", 0.0, 0.0), 120.0);
    }

    #[test]
    fn test_blank_evaluates_to_zero() {
        let expr = Expression::new("");
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert_eq!(expr.evaluate(&ctx, 5.0, 1.0, 2.0).unwrap(), 0.0);
    }

    #[test]
    fn test_bool_evaluation() {
        let expr = compiled("x > 0 && y < 1");
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert!(expr.evaluate_bool(&ctx, 1.0, 0.0, 0.0, 0.0).unwrap());
        assert!(!expr.evaluate_bool(&ctx, 1.0, 2.0, 0.0, 0.0).unwrap());
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let ctx = EvalContext::new(&NoCurves, 0.0);
        let err = compiled("x > 1").evaluate(&ctx, 2.0, 0.0, 0.0).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::Boolean
            }
        );

        let err = compiled("x + 1")
            .evaluate_bool(&ctx, 0.0, 0.0, 0.0, 0.0)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_call_errors_are_local() {
        let ctx = EvalContext::new(&NoCurves, 0.0);
        let value = compiled("1 + sin(x > 0)").evaluate(&ctx, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(value, 1.0);
        let err = ctx.take_local_error().unwrap();
        assert!(!err.is_fatal());
        assert!(ctx.take_local_error().is_none());
    }

    #[test]
    fn test_unbound_y() {
        let ctx = EvalContext::new(&NoCurves, 0.0);
        let expr = compiled("y + 1");
        assert_eq!(
            expr.evaluate(&ctx, 0.0, 0.0, 0.0),
            Err(EvalError::UnboundVariable("y".to_string()))
        );
        assert_eq!(expr.evaluate_with_y(&ctx, 0.0, 0.0, 0.0, 2.0), Ok(3.0));
    }

    #[test]
    fn test_params() {
        let mut expr = compiled("n * 2");
        let ctx = EvalContext::new(&NoCurves, 0.0);
        assert!(expr.evaluate(&ctx, 0.0, 0.0, 0.0).is_err());
        expr.set_param("n", 4.0);
        assert_eq!(expr.evaluate(&ctx, 0.0, 0.0, 0.0), Ok(8.0));
    }

    #[test]
    fn test_huge_factorial_is_infinite() {
        assert_eq!(eval("fact(30000)", 0.0, 0.0), f64::INFINITY);
        assert_eq!(eval("fact(1000000)", 0.0, 0.0), f64::INFINITY);
        assert_eq!(eval("fact(x) / fact(x - 1)", 50.0, 0.0), 50.0);
    }

    #[test]
    fn test_deep_formula_is_compile_error() {
        let mut expr = Expression::new(format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000)));
        let err = expr.compile(&NoCurves).unwrap_err();
        assert!(err.message.contains("nests too deeply"));
        assert!(!expr.is_compiled());

        let mut expr = Expression::new("!".repeat(100_000) + "true");
        assert!(expr.compile(&NoCurves).is_err());
    }

    #[test]
    fn test_failed_compile_clears() {
        let mut expr = compiled("x");
        expr.set_source("x +");
        assert!(!expr.is_compiled());
        let err = expr.compile(&NoCurves).unwrap_err();
        assert_eq!(err.text, "x +");
        assert!(!expr.is_compiled());
    }
}
