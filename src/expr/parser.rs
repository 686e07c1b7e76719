//! Tokenizer and precedence-climbing parser
//!
//! Function names are resolved while parsing, so a compiled `Node` tree
//! never carries an unknown call. Arity is checked here too.

use super::builtins::Builtin;
use super::normalize::{OPERATORS, is_word_char};
use super::{CompileError, VARIABLES};

/// Which synthesized operator a curve call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveOp {
    /// `f(x)`
    Value,
    /// `f′(x)`
    Derivative,
    /// `f″(x)`
    SecondDerivative,
    /// `F(x)`, integral from 0 to x
    Antiderivative,
    /// `fint(a, b)`
    Integral,
    /// `fh(x)`, hit count times x
    HitScaled,
    /// `fsum(a, b)`
    Sum,
    /// `fpsum(a, b)`
    Product,
}

impl CurveOp {
    pub const ALL: [CurveOp; 8] = [
        CurveOp::Value,
        CurveOp::Derivative,
        CurveOp::SecondDerivative,
        CurveOp::Antiderivative,
        CurveOp::Integral,
        CurveOp::HitScaled,
        CurveOp::Sum,
        CurveOp::Product,
    ];

    pub fn arity(&self) -> usize {
        match self {
            CurveOp::Integral | CurveOp::Sum | CurveOp::Product => 2,
            _ => 1,
        }
    }

    /// Namespace name for this operator on a curve called `base`
    pub fn name_for(&self, base: &str) -> String {
        match self {
            CurveOp::Value => base.to_string(),
            CurveOp::Derivative => format!("{base}′"),
            CurveOp::SecondDerivative => format!("{base}″"),
            CurveOp::Antiderivative => capitalize(base),
            CurveOp::Integral => format!("{base}int"),
            CurveOp::HitScaled => format!("{base}h"),
            CurveOp::Sum => format!("{base}sum"),
            CurveOp::Product => format!("{base}psum"),
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A resolved function reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callable {
    Builtin(Builtin),
    Curve { index: usize, op: CurveOp },
}

impl Callable {
    fn accepts(&self, count: usize) -> bool {
        match self {
            Callable::Builtin(b) => b.arity().contains(&count),
            Callable::Curve { op, .. } => op.arity() == count,
        }
    }

    fn arity_text(&self) -> String {
        match self {
            Callable::Builtin(b) => {
                let arity = b.arity();
                if arity.start() == arity.end() {
                    arity.start().to_string()
                } else if *arity.end() == usize::MAX {
                    format!("at least {}", arity.start())
                } else {
                    format!("{} to {}", arity.start(), arity.end())
                }
            }
            Callable::Curve { op, .. } => op.arity().to_string(),
        }
    }
}

/// Name → function resolution used at compile time
pub trait FunctionTable {
    fn resolve(&self, name: &str) -> Option<Callable>;
}

/// Variables bound on every evaluation call
#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    X,
    Y,
    T,
    H,
    A,
    /// Looked up in the expression's parameter environment (`n`, `pi`, `e`)
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "**" => BinaryOp::Pow,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
            BinaryOp::Pow => 7,
        }
    }

    fn right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }
}

/// Unary operators bind looser than `**`, so `-x**2` is `-(x**2)`
const UNARY_PRECEDENCE: u8 = 6;

/// Compiled expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Bool(bool),
    Var(Var),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        name: String,
        callable: Callable,
        args: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(&'static str),
    Open,
    Close,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| format!("bad number `{literal}`"))?;
            tokens.push(Token::Number(value));
        } else if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if let Some(op) = OPERATORS.iter().find(|op| {
            op.chars()
                .enumerate()
                .all(|(k, oc)| chars.get(i + k) == Some(&oc))
        }) {
            tokens.push(Token::Op(*op));
            i += op.len();
        } else {
            return Err(format!("unexpected character `{c}`"));
        }
    }

    Ok(tokens)
}

/// Deepest tree a formula may parse into
pub const MAX_NESTING: usize = 128;

const TOO_DEEP: &str = "formula nests too deeply";

/// A parsed subtree and its height
type Parsed = (Node, usize);

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// Live `expression` frames
    depth: usize,
    functions: &'a dyn FunctionTable,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if *t == want => Ok(()),
            Some(t) => Err(format!("expected {want:?}, found {t:?}")),
            None => Err(format!("expected {want:?}, found end of input")),
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Parsed, String> {
        if self.depth >= MAX_NESTING {
            return Err(TOO_DEEP.to_string());
        }
        self.depth += 1;
        let parsed = self.climb(min_precedence);
        self.depth -= 1;
        parsed
    }

    fn climb(&mut self, min_precedence: u8) -> Result<Parsed, String> {
        let (mut lhs, mut height) = self.prefix()?;

        while let Some(Token::Op(symbol)) = self.peek() {
            let Some(op) = BinaryOp::from_symbol(symbol) else {
                return Err(format!("`{symbol}` is not a binary operator"));
            };
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let next_min = if op.right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let (rhs, rhs_height) = self.expression(next_min)?;
            // Long left-associative chains grow without recursing
            height = height.max(rhs_height) + 1;
            if height > MAX_NESTING {
                return Err(TOO_DEEP.to_string());
            }
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok((lhs, height))
    }

    fn prefix(&mut self) -> Result<Parsed, String> {
        match self.advance() {
            Some(Token::Number(v)) => Ok((Node::Number(v), 1)),
            Some(Token::Open) => {
                let inner = self.expression(0)?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            Some(Token::Op(symbol)) => {
                let op = match symbol {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Plus,
                    "!" => UnaryOp::Not,
                    _ => return Err(format!("unexpected `{symbol}`")),
                };
                let (operand, height) = self.expression(UNARY_PRECEDENCE)?;
                if height >= MAX_NESTING {
                    return Err(TOO_DEEP.to_string());
                }
                Ok((
                    Node::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    height + 1,
                ))
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::Open) {
                    self.pos += 1;
                    self.call(name)
                } else {
                    Ok((variable(&name)?, 1))
                }
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn call(&mut self, name: String) -> Result<Parsed, String> {
        let callable = self
            .functions
            .resolve(&name)
            .ok_or_else(|| format!("unknown function `{name}`"))?;

        let mut args = Vec::new();
        let mut height = 0;
        if self.peek() == Some(&Token::Close) {
            self.pos += 1;
        } else {
            loop {
                let (arg, arg_height) = self.expression(0)?;
                args.push(arg);
                height = height.max(arg_height);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::Close) => break,
                    Some(t) => return Err(format!("expected `,` or `)`, found {t:?}")),
                    None => return Err(format!("unclosed call to `{name}`")),
                }
            }
        }

        if !callable.accepts(args.len()) {
            return Err(format!(
                "{name}() takes {} argument(s), got {}",
                callable.arity_text(),
                args.len()
            ));
        }
        if height >= MAX_NESTING {
            return Err(TOO_DEEP.to_string());
        }

        Ok((
            Node::Call {
                name,
                callable,
                args,
            },
            height + 1,
        ))
    }
}

fn variable(name: &str) -> Result<Node, String> {
    let var = match name {
        "x" => Var::X,
        "y" => Var::Y,
        "t" => Var::T,
        "h" => Var::H,
        "a" => Var::A,
        "true" => return Ok(Node::Bool(true)),
        "false" => return Ok(Node::Bool(false)),
        "pi" | "e" => Var::Named(name.to_string()),
        _ if VARIABLES.contains(&name) => Var::Named(name.to_string()),
        _ => return Err(format!("unknown name `{name}`")),
    };
    Ok(Node::Var(var))
}

/// Parse normalized text into a tree, resolving calls through `functions`
pub fn parse(text: &str, functions: &dyn FunctionTable) -> Result<Node, CompileError> {
    let fail = |message: String| CompileError {
        text: text.to_string(),
        message,
    };

    let tokens = tokenize(text).map_err(fail)?;
    if tokens.is_empty() {
        return Err(fail("empty formula".to_string()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        functions,
    };
    let (node, _) = parser.expression(0).map_err(fail)?;
    if let Some(extra) = parser.peek() {
        return Err(fail(format!("unexpected {extra:?} after expression")));
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(Vec<(&'static str, Callable)>);

    impl FunctionTable for Only {
        fn resolve(&self, name: &str) -> Option<Callable> {
            Builtin::lookup(name)
                .map(Callable::Builtin)
                .or_else(|| self.0.iter().find(|(n, _)| *n == name).map(|(_, c)| *c))
        }
    }

    fn builtins() -> Only {
        Only(Vec::new())
    }

    #[test]
    fn test_precedence() {
        let node = parse("1+2*3", &builtins()).unwrap();
        match node {
            Node::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Node::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative_and_unary() {
        let node = parse("-2**3**2", &builtins()).unwrap();
        let Node::Unary { op: UnaryOp::Neg, operand } = node else {
            panic!("expected negation at the root");
        };
        let Node::Binary { op: BinaryOp::Pow, rhs, .. } = *operand else {
            panic!("expected power under negation");
        };
        assert!(matches!(*rhs, Node::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn test_calls_resolve() {
        let table = Only(vec![(
            "f′",
            Callable::Curve {
                index: 0,
                op: CurveOp::Derivative,
            },
        )]);
        let node = parse("sin(x) + f′(t)", &table).unwrap();
        assert!(matches!(node, Node::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_unknown_function() {
        let err = parse("g(x)", &builtins()).unwrap_err();
        assert_eq!(err.text, "g(x)");
        assert!(err.message.contains("unknown function"));
    }

    #[test]
    fn test_unknown_variable() {
        let err = parse("x + q", &builtins()).unwrap_err();
        assert!(err.message.contains("unknown name `q`"));
    }

    #[test]
    fn test_arity_checked() {
        let err = parse("pow(x)", &builtins()).unwrap_err();
        assert!(err.message.contains("pow() takes 2"));
        assert!(parse("max(1, 2, 3)", &builtins()).is_ok());
        assert!(parse("log(x, 2)", &builtins()).is_ok());
    }

    #[test]
    fn test_malformed() {
        assert!(parse("", &builtins()).is_err());
        assert!(parse("(x + 1", &builtins()).is_err());
        assert!(parse("x +", &builtins()).is_err());
        assert!(parse("x 1", &builtins()).is_err());
        assert!(parse("x = 1", &builtins()).is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let parens = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&parens, &builtins()).unwrap_err();
        assert!(err.message.contains("nests too deeply"));

        let negations = format!("{}x", "-".repeat(100_000));
        assert!(parse(&negations, &builtins()).is_err());

        let chain = vec!["x"; 100_000].join(" + ");
        assert!(parse(&chain, &builtins()).is_err());

        let powers = vec!["2"; 100_000].join(" ** ");
        assert!(parse(&powers, &builtins()).is_err());
    }

    #[test]
    fn test_moderate_nesting_accepted() {
        let parens = format!("{}x{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&parens, &builtins()).is_ok());
        let chain = vec!["x"; 100].join(" + ");
        assert!(parse(&chain, &builtins()).is_ok());
    }

    #[test]
    fn test_curve_op_names() {
        assert_eq!(CurveOp::Value.name_for("f"), "f");
        assert_eq!(CurveOp::Derivative.name_for("f"), "f′");
        assert_eq!(CurveOp::SecondDerivative.name_for("f"), "f″");
        assert_eq!(CurveOp::Antiderivative.name_for("f"), "F");
        assert_eq!(CurveOp::Integral.name_for("f"), "fint");
        assert_eq!(CurveOp::HitScaled.name_for("f"), "fh");
        assert_eq!(CurveOp::Sum.name_for("f"), "fsum");
        assert_eq!(CurveOp::Product.name_for("f"), "fpsum");
    }
}
