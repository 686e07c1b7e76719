//! Built-in math functions available to every formula

use std::ops::RangeInclusive;

use super::{EvalError, Value};

/// Number of memoized factorial entries
pub const FACTORIAL_CACHE_SIZE: usize = 100;

/// Largest `n` whose factorial is finite as an `f64`
const MAX_FINITE_FACTORIAL: i64 = 170;

/// Memoized factorial table over `0..FACTORIAL_CACHE_SIZE`
#[derive(Debug, Clone)]
pub struct FactorialCache {
    /// `table[k] == k!` for every `k <= computed`
    table: [f64; FACTORIAL_CACHE_SIZE],
    computed: usize,
}

impl Default for FactorialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FactorialCache {
    pub const fn new() -> Self {
        Self {
            table: [1.0; FACTORIAL_CACHE_SIZE],
            computed: 0,
        }
    }

    /// Entries filled so far
    pub fn computed(&self) -> usize {
        self.computed
    }

    /// `n!`, with `n <= 0` giving 1
    pub fn get(&mut self, n: i64) -> f64 {
        if n <= 0 {
            return 1.0;
        }
        if n > MAX_FINITE_FACTORIAL {
            return f64::INFINITY;
        }
        let n = n as usize;
        let cached = n.min(FACTORIAL_CACHE_SIZE - 1);
        while self.computed < cached {
            let next = self.computed + 1;
            self.table[next] = self.table[self.computed] * next as f64;
            self.computed = next;
        }
        (cached + 1..=n).fold(self.table[cached], |acc, k| acc * k as f64)
    }

    /// Factorial of a formula value, truncated toward zero
    pub fn factorial(&mut self, n: f64) -> f64 {
        self.get(n.trunc() as i64)
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    Cot,
    Sec,
    Csc,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Pow,
    Log,
    Ln,
    Exp,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Cbrt,
    Abs,
    Min,
    Max,
    If,
    Fact,
}

impl Builtin {
    pub const ALL: [Builtin; 26] = [
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Cot,
        Builtin::Sec,
        Builtin::Csc,
        Builtin::Asin,
        Builtin::Acos,
        Builtin::Atan,
        Builtin::Sinh,
        Builtin::Cosh,
        Builtin::Tanh,
        Builtin::Pow,
        Builtin::Log,
        Builtin::Ln,
        Builtin::Exp,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Round,
        Builtin::Sqrt,
        Builtin::Cbrt,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::If,
        Builtin::Fact,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Cot => "cot",
            Builtin::Sec => "sec",
            Builtin::Csc => "csc",
            Builtin::Asin => "asin",
            Builtin::Acos => "acos",
            Builtin::Atan => "atan",
            Builtin::Sinh => "sinh",
            Builtin::Cosh => "cosh",
            Builtin::Tanh => "tanh",
            Builtin::Pow => "pow",
            Builtin::Log => "log",
            Builtin::Ln => "ln",
            Builtin::Exp => "exp",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Round => "round",
            Builtin::Sqrt => "sqrt",
            Builtin::Cbrt => "cbrt",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::If => "if",
            Builtin::Fact => "fact",
        }
    }

    pub fn arity(&self) -> RangeInclusive<usize> {
        match self {
            Builtin::Pow => 2..=2,
            Builtin::Log => 1..=2,
            Builtin::Min | Builtin::Max => 2..=usize::MAX,
            Builtin::If => 3..=3,
            _ => 1..=1,
        }
    }

    pub fn call(&self, args: &[Value], factorials: &mut FactorialCache) -> Result<Value, EvalError> {
        if let Builtin::If = self {
            // Condition may be a boolean or a number (non-zero is true)
            let cond = match args[0] {
                Value::Boolean(b) => b,
                Value::Number(n) => n != 0.0,
            };
            return Ok(if cond { args[1] } else { args[2] });
        }

        let nums = args
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::Number(n) => Ok(*n),
                Value::Boolean(_) => Err(EvalError::ArgumentType {
                    name: self.name().to_string(),
                    position: i + 1,
                }),
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let x = nums[0];

        let result = match self {
            Builtin::Sin => x.sin(),
            Builtin::Cos => x.cos(),
            Builtin::Tan => x.tan(),
            Builtin::Cot => 1.0 / x.tan(),
            Builtin::Sec => 1.0 / x.cos(),
            Builtin::Csc => 1.0 / x.sin(),
            Builtin::Asin => x.asin(),
            Builtin::Acos => x.acos(),
            Builtin::Atan => x.atan(),
            Builtin::Sinh => x.sinh(),
            Builtin::Cosh => x.cosh(),
            Builtin::Tanh => x.tanh(),
            Builtin::Pow => x.powf(nums[1]),
            Builtin::Log => match nums.get(1) {
                Some(base) => x.log(*base),
                None => x.ln(),
            },
            Builtin::Ln => x.ln(),
            Builtin::Exp => x.exp(),
            Builtin::Floor => x.floor(),
            Builtin::Ceil => x.ceil(),
            Builtin::Round => x.round(),
            Builtin::Sqrt => x.sqrt(),
            Builtin::Cbrt => x.cbrt(),
            Builtin::Abs => x.abs(),
            Builtin::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
            Builtin::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Builtin::Fact => factorials.factorial(x),
            Builtin::If => unreachable!("handled above"),
        };
        Ok(Value::Number(result))
    }

    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }
}
