//! Height-function expression language
//!
//! A small, closed arithmetic language over one variable `d` (the sample
//! distance). Nothing in it can reach the host: it is tokenized, parsed into
//! an AST once, and evaluated with checked arithmetic for every ring.
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/') unary)*
//! unary   = ('-' | '+') unary | power
//! power   = primary (('^' | '**') unary)?
//! primary = number | 'd' | constant | func '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `-d^2` is `-(d^2)` and `2^3^2` is `2^(3^2)`, as in most calculators.
//! Function names may carry a `math.` prefix (`math.sqrt(d)`). Expressions
//! nested deeper than 256 levels are rejected at compile time.

use std::fmt;
use std::str::FromStr;
use terrastamp_core::{Error, Result};

/// The variable name for the sample distance
pub const VARIABLE: &str = "d";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char), // + - * / ^
    Comma,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sqrt,
    Exp,
    Ln,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
    Atan2,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "ln" | "log" => Func::Ln,
            "log10" => Func::Log10,
            "log2" => Func::Log2,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "abs" | "fabs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "min" => Func::Min,
            "max" => Func::Max,
            "pow" => Func::Pow,
            "atan2" => Func::Atan2,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max | Func::Pow | Func::Atan2 => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> std::result::Result<f64, String> {
        let a = args[0];
        let v = match self {
            Func::Sqrt => {
                if a < 0.0 {
                    return Err(format!("sqrt of negative value {}", a));
                }
                a.sqrt()
            }
            Func::Exp => a.exp(),
            Func::Ln | Func::Log10 | Func::Log2 => {
                if a <= 0.0 {
                    return Err(format!("logarithm of non-positive value {}", a));
                }
                match self {
                    Func::Ln => a.ln(),
                    Func::Log10 => a.log10(),
                    _ => a.log2(),
                }
            }
            Func::Sin => a.sin(),
            Func::Cos => a.cos(),
            Func::Tan => a.tan(),
            Func::Asin | Func::Acos => {
                if !(-1.0..=1.0).contains(&a) {
                    return Err(format!("inverse trigonometric argument {} outside [-1, 1]", a));
                }
                if self == Func::Asin {
                    a.asin()
                } else {
                    a.acos()
                }
            }
            Func::Atan => a.atan(),
            Func::Sinh => a.sinh(),
            Func::Cosh => a.cosh(),
            Func::Tanh => a.tanh(),
            Func::Abs => a.abs(),
            Func::Floor => a.floor(),
            Func::Ceil => a.ceil(),
            Func::Round => a.round(),
            Func::Min => a.min(args[1]),
            Func::Max => a.max(args[1]),
            Func::Pow => power(a, args[1])?,
            Func::Atan2 => a.atan2(args[1]),
        };
        Ok(v)
    }
}

/// A node in the expression AST
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var,
    Neg(Box<Expr>),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

fn power(base: f64, exp: f64) -> std::result::Result<f64, String> {
    if base == 0.0 && exp < 0.0 {
        return Err("division by zero (zero raised to a negative power)".to_string());
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(format!("negative base {} raised to fractional power {}", base, exp));
    }
    Ok(base.powf(exp))
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            c @ ('+' | '-' | '*' | '/' | '^') => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when a digit follows, so `2*e` stays a constant
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| Error::expression(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(name));
            }
            c => {
                return Err(Error::expression(format!(
                    "unexpected character '{}' at position {}",
                    c, i
                )));
            }
        }
    }

    Ok(tokens)
}

/// Deepest AST, and deepest parser nesting, that `compile` accepts
const MAX_DEPTH: usize = 256;

/// A parsed subtree and its depth
type Parsed = (Expr, usize);

fn check_depth(depth: usize) -> Result<usize> {
    if depth > MAX_DEPTH {
        return Err(Error::expression(format!(
            "expression nested deeper than {} levels",
            MAX_DEPTH
        )));
    }
    Ok(depth)
}

fn binop(op: char, (left, l): Parsed, (right, r): Parsed) -> Result<Parsed> {
    let depth = check_depth(l.max(r) + 1)?;
    let expr = Expr::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    };
    Ok((expr, depth))
}

/// Recursive descent parser
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse(mut self) -> Result<Expr> {
        let (expr, _) = self.parse_expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(t) => Err(Error::expression(format!("unexpected trailing token {:?}", t))),
        }
    }

    fn parse_expr(&mut self) -> Result<Parsed> {
        let mut left = self.parse_term()?;

        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = binop(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Parsed> {
        let mut left = self.parse_unary()?;

        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = binop(op, left, right)?;
        }

        Ok(left)
    }

    // Every recursive path through the grammar passes here
    fn parse_unary(&mut self) -> Result<Parsed> {
        self.nesting += 1;
        check_depth(self.nesting)?;

        let parsed = match self.peek() {
            Some(Token::Op('-')) => {
                self.advance();
                self.parse_unary()
                    .and_then(|(inner, depth)| Ok((Expr::Neg(Box::new(inner)), check_depth(depth + 1)?)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        };

        self.nesting -= 1;
        parsed
    }

    fn parse_power(&mut self) -> Result<Parsed> {
        let base = self.parse_primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.advance();
            let exponent = self.parse_unary()?;
            return binop('^', base, exponent);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Parsed> {
        match self.advance() {
            Some(Token::Number(n)) => Ok((Expr::Num(n), 1)),
            Some(Token::LParen) => {
                let parsed = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(parsed),
                    _ => Err(Error::expression("expected closing parenthesis")),
                }
            }
            Some(Token::Ident(raw)) => {
                let name = raw.strip_prefix("math.").unwrap_or(&raw);
                if let Some(Token::LParen) = self.peek() {
                    self.advance();
                    return self.parse_call(name);
                }
                let expr = match name {
                    VARIABLE => Expr::Var,
                    "pi" => Expr::Num(std::f64::consts::PI),
                    "e" => Expr::Num(std::f64::consts::E),
                    "tau" => Expr::Num(std::f64::consts::TAU),
                    _ => {
                        return Err(Error::expression(format!(
                            "unknown identifier '{}' (the only variable is '{}')",
                            raw, VARIABLE
                        )))
                    }
                };
                Ok((expr, 1))
            }
            other => Err(Error::expression(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Parsed> {
        let func = Func::lookup(name)
            .ok_or_else(|| Error::expression(format!("unknown function '{}'", name)))?;

        let (first, mut depth) = self.parse_expr()?;
        let mut args = vec![first];
        while let Some(Token::Comma) = self.peek() {
            self.advance();
            let (arg, arg_depth) = self.parse_expr()?;
            depth = depth.max(arg_depth);
            args.push(arg);
        }
        match self.advance() {
            Some(Token::RParen) => {}
            _ => return Err(Error::expression(format!("expected ')' after arguments of '{}'", name))),
        }

        if args.len() != func.arity() {
            return Err(Error::expression(format!(
                "'{}' takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            )));
        }

        Ok((Expr::Call { func, args }, check_depth(depth + 1)?))
    }
}

fn eval(expr: &Expr, d: f64) -> std::result::Result<f64, String> {
    let value = match expr {
        Expr::Num(n) => *n,
        Expr::Var => d,
        Expr::Neg(inner) => -eval(inner, d)?,
        Expr::BinOp { op, left, right } => {
            let l = eval(left, d)?;
            let r = eval(right, d)?;
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    l / r
                }
                '^' => power(l, r)?,
                _ => return Err(format!("unknown operator '{}'", op)),
            }
        }
        Expr::Call { func, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, d))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            func.apply(&values)?
        }
    };

    if !value.is_finite() {
        return Err(format!("non-finite intermediate result {}", value));
    }
    Ok(value)
}

/// A compiled height function `f(d)`.
///
/// # Example
/// ```ignore
/// let f = Expression::compile("d^2 + d + 1")?;
/// assert_eq!(f.evaluate(2.0)?, 7.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression. Fails with `InvalidExpression` on syntax errors.
    pub fn compile(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::expression("empty expression"));
        }
        let ast = Parser::new(tokenize(source)?).parse()?;
        Ok(Self {
            source: source.trim().to_string(),
            ast,
        })
    }

    /// Evaluate at distance `d`.
    pub fn evaluate(&self, d: f64) -> Result<f64> {
        eval(&self.ast, d).map_err(Error::expression)
    }

    /// The source text this expression was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(src: &str, d: f64) -> f64 {
        Expression::compile(src).unwrap().evaluate(d).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(at("d*d", 5.0), 25.0);
        assert_relative_eq!(at("d+1", 10.0), 11.0);
        assert_relative_eq!(at("2 + 3 * d", 2.0), 8.0);
        assert_relative_eq!(at("(2 + 3) * d", 2.0), 10.0);
        assert_relative_eq!(at("d / 4 - 1", 8.0), 1.0);
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        assert_relative_eq!(at("-d^2", 3.0), -9.0);
        assert_relative_eq!(at("-d**2", 3.0), -9.0);
        assert_relative_eq!(at("2^3^2", 0.0), 512.0);
        assert_relative_eq!(at("2^-1", 0.0), 0.5);
    }

    #[test]
    fn test_python_style_input() {
        // The shape of height functions written for the original tool
        assert_relative_eq!(at("d**2 + d + 1", 2.0), 7.0);
        assert_relative_eq!(at("math.sqrt(d) * 2", 16.0), 8.0);
        assert_relative_eq!(at("math.pi * d", 1.0), std::f64::consts::PI);
        assert_relative_eq!(at("-0.5 * math.exp(-d / 10)", 0.0), -0.5);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_relative_eq!(at("max(d, 3)", 1.0), 3.0);
        assert_relative_eq!(at("min(d, 3)", 1.0), 1.0);
        assert_relative_eq!(at("pow(d, 3)", 2.0), 8.0);
        assert_relative_eq!(at("log10(d)", 1000.0), 3.0, epsilon = 1e-12);
        assert_relative_eq!(at("cos(pi)", 0.0), -1.0);
        assert_relative_eq!(at("abs(-d)", 4.0), 4.0);
        assert_relative_eq!(at("2*e", 0.0), 2.0 * std::f64::consts::E);
        assert_relative_eq!(at("1.5e2 + d", 0.0), 150.0);
        assert_relative_eq!(at("2.5E-1", 0.0), 0.25);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "(d + 1", "d +", "x * 2", "sqrt(d, 2)", "foo(d)", "d $ 2", "d d", "max(d)"] {
            let res = Expression::compile(bad);
            assert!(
                matches!(res, Err(Error::InvalidExpression { .. })),
                "'{}' should fail to compile, got {:?}",
                bad,
                res
            );
        }
    }

    #[test]
    fn test_evaluation_faults() {
        let div = Expression::compile("1 / d").unwrap();
        assert!(div.evaluate(0.0).is_err());
        assert_relative_eq!(div.evaluate(4.0).unwrap(), 0.25);

        assert!(Expression::compile("sqrt(d - 10)").unwrap().evaluate(5.0).is_err());
        assert!(Expression::compile("ln(d)").unwrap().evaluate(0.0).is_err());
        assert!(Expression::compile("asin(d)").unwrap().evaluate(2.0).is_err());
        assert!(Expression::compile("(-d)^0.5").unwrap().evaluate(4.0).is_err());
        assert!(Expression::compile("exp(d)").unwrap().evaluate(1000.0).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}d{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(Expression::compile(&deep), Err(Error::InvalidExpression { .. })));

        let negations = format!("{}d", "-".repeat(100_000));
        assert!(matches!(Expression::compile(&negations), Err(Error::InvalidExpression { .. })));

        let long_sum = vec!["d"; 10_000].join(" + ");
        assert!(matches!(Expression::compile(&long_sum), Err(Error::InvalidExpression { .. })));

        let calls = format!("{}d{}", "abs(".repeat(1_000), ")".repeat(1_000));
        assert!(matches!(Expression::compile(&calls), Err(Error::InvalidExpression { .. })));
    }

    #[test]
    fn test_moderate_nesting_compiles() {
        let nested = format!("{}d{}", "(".repeat(100), ")".repeat(100));
        assert_relative_eq!(at(&nested, 3.0), 3.0);

        let sum = vec!["d"; 100].join(" + ");
        assert_relative_eq!(at(&sum, 0.5), 50.0);
    }

    #[test]
    fn test_display_keeps_source() {
        let e: Expression = " d * 2 ".parse().unwrap();
        assert_eq!(e.to_string(), "d * 2");
    }
}
