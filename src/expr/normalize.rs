//! Formula text rewriting
//!
//! Two passes, always in this order:
//! 1. `expand_readability` - literal shorthand replacements, applied to every
//!    raw edit so the user sees the result.
//! 2. `normalize_spacing` - implicit multiplication, leading zeros and
//!    operator padding, applied right before compiling.
//!
//! Both passes are idempotent.

/// Ordered literal replacements. `''` must run before `'`.
const READABILITY: [(&str, &str); 9] = [
    ("''", "″"),
    ("\"", "″"),
    ("“", "″"),
    ("”", "″"),
    ("'", "′"),
    ("’", "′"),
    ("^", "**"),
    ("√", "sqrt"),
    ("π", "pi"),
];

/// Letters that always stand alone as variables, so `xt` reads as `x*t`
const VARIABLE_LETTERS: [char; 4] = ['x', 't', 'a', 'h'];

/// Operators padded with a single space on each side
const PADDED_OPS: [&str; 8] = ["<", ">", "<=", ">=", "==", "!=", "&&", "||"];

/// Run both passes
pub fn normalize(text: &str) -> String {
    normalize_spacing(&expand_readability(text))
}

/// Turn user-friendly shorthand into parseable syntax
pub fn expand_readability(text: &str) -> String {
    READABILITY
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Space,
    Number(String),
    Word(String),
    Op(&'static str),
    Open,
    Close,
    Comma,
    Other(char),
}

impl Piece {
    fn is_variable(&self) -> bool {
        match self {
            Piece::Word(w) => {
                let mut chars = w.chars();
                matches!((chars.next(), chars.next()), (Some(c), None) if VARIABLE_LETTERS.contains(&c))
            }
            _ => false,
        }
    }

    /// A token that can be the right-hand side of an implied product
    fn starts_operand(&self) -> bool {
        matches!(self, Piece::Number(_) | Piece::Word(_) | Piece::Open)
    }

    fn implies_product_with(&self, next: &Piece) -> bool {
        match self {
            Piece::Number(_) => matches!(next, Piece::Word(_) | Piece::Open),
            Piece::Close => next.starts_operand(),
            _ if self.is_variable() => next.starts_operand(),
            _ => false,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Piece::Space => out.push(' '),
            Piece::Number(n) => out.push_str(n),
            Piece::Word(w) => out.push_str(w),
            Piece::Op(op) if PADDED_OPS.contains(op) => {
                out.push(' ');
                out.push_str(op);
                out.push(' ');
            }
            Piece::Op(op) => out.push_str(op),
            Piece::Open => out.push('('),
            Piece::Close => out.push(')'),
            Piece::Comma => out.push(','),
            Piece::Other(c) => out.push(*c),
        }
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '′' || c == '″'
}

/// Two-character operators first so `**` never splits into `*`,`*`
pub(crate) const OPERATORS: [&str; 15] = [
    "**", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
];

fn split(text: &str) -> Vec<Piece> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            pieces.push(Piece::Space);
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
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
            let mut number: String = chars[start..i].iter().collect();
            let glued = start > 0 && (chars[start - 1].is_ascii_digit() || chars[start - 1] == '.');
            if number.starts_with('.') && !glued {
                number.insert(0, '0');
            }
            pieces.push(Piece::Number(number));
        } else if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.chars().count() > 1 && word.chars().all(|w| VARIABLE_LETTERS.contains(&w)) {
                pieces.extend(word.chars().map(|w| Piece::Word(w.to_string())));
            } else {
                pieces.push(Piece::Word(word));
            }
        } else if c == '(' {
            pieces.push(Piece::Open);
            i += 1;
        } else if c == ')' {
            pieces.push(Piece::Close);
            i += 1;
        } else if c == ',' {
            pieces.push(Piece::Comma);
            i += 1;
        } else if let Some(op) = OPERATORS.iter().find(|op| {
            op.chars()
                .enumerate()
                .all(|(k, oc)| chars.get(i + k) == Some(&oc))
        }) {
            pieces.push(Piece::Op(*op));
            i += op.len();
        } else {
            pieces.push(Piece::Other(c));
            i += 1;
        }
    }

    pieces
}

/// Insert implied multiplication, add leading zeros and pad comparisons
pub fn normalize_spacing(text: &str) -> String {
    let pieces = split(text);
    let mut out = String::with_capacity(text.len() + 8);

    for (i, piece) in pieces.iter().enumerate() {
        piece.write_to(&mut out);
        if let Some(next) = pieces.get(i + 1) {
            if piece.implies_product_with(next) {
                out.push('*');
            }
        }
    }

    collapse_spaces(&out)
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
