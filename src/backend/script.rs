//! Script expressions for `script_score` queries in the in-memory backend.
//!
//! Supports the numeric subset of Painless that feature scripts use:
//!
//! - literals: `1`, `2.5`, `1e3`, `true`, `false`
//! - `_score`, `doc['field'].value`, `doc['field'].size()`, `doc['field'].empty`
//! - `params.name`, `params['name']`
//! - `+ - * / %`, comparisons, `&& || !`, `cond ? a : b`, parentheses
//! - `Math.log`, `log10`, `log1p`, `sqrt`, `abs`, `exp`, `floor`, `ceil`,
//!   `pow`, `min`, `max`
//!
//! An optional leading `return` and trailing `;` are accepted.
//!
//! ```
//! use ltr_feature_logger::backend::script::{CompiledScript, ScriptContext};
//! use serde_json::{Map, json};
//!
//! let script = CompiledScript::compile("return doc['popularity'].value * 2;").unwrap();
//! let doc = json!({"popularity": 21.0});
//! let params = Map::new();
//! let ctx = ScriptContext::new(1.0, doc.as_object().unwrap(), &params);
//! assert_eq!(script.execute(&ctx).unwrap(), 42.0);
//! ```

use serde_json::{Map, Value};

use crate::error::BackendError;

/// Variables visible to a running script.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    /// Score of the wrapped query.
    pub score: f64,
    /// Source of the document being scored.
    pub doc: &'a Map<String, Value>,
    /// Script parameters.
    pub params: &'a Map<String, Value>,
}

impl<'a> ScriptContext<'a> {
    pub fn new(score: f64, doc: &'a Map<String, Value>, params: &'a Map<String, Value>) -> Self {
        ScriptContext { score, doc, params }
    }
}

/// A parsed script, ready to be executed against many documents.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    source: String,
    expr: Expr,
}

impl CompiledScript {
    pub fn compile(source: &str) -> Result<Self, BackendError> {
        let tokens = tokenize(source)?;
        let mut parser = ScriptParser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_script()?;
        Ok(CompiledScript {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the script and return its score.
    ///
    /// Scores must be finite and non-negative.
    pub fn execute(&self, ctx: &ScriptContext<'_>) -> Result<f64, BackendError> {
        match eval(&self.expr, ctx)? {
            Val::Num(n) if n.is_nan() => Err(BackendError::Script(format!(
                "script [{}] produced NaN",
                self.source
            ))),
            Val::Num(n) if n.is_infinite() => Err(BackendError::Script(format!(
                "script [{}] produced a non-finite score [{n}]",
                self.source
            ))),
            Val::Num(n) if n < 0.0 => Err(BackendError::Script(format!(
                "script score function must not produce negative scores, but got: [{n}]"
            ))),
            Val::Num(n) => Ok(n),
            Val::Bool(_) => Err(BackendError::Script(format!(
                "script [{}] must return a number",
                self.source
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Question,
    Colon,
    Semicolon,
}

const OPERATORS: [&str; 14] = [
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
];

fn tokenize(source: &str) -> Result<Vec<Token>, BackendError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
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
            let n = text
                .parse::<f64>()
                .map_err(|_| BackendError::Script(format!("invalid number [{text}]")))?;
            // numeric type suffixes (1.0d, 2f, 3L)
            if i < chars.len() && matches!(chars[i], 'd' | 'D' | 'f' | 'F' | 'l' | 'L') {
                i += 1;
            }
            tokens.push(Token::Number(n));
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(BackendError::Script("unterminated string literal".to_string())),
                    Some('\\') => {
                        if let Some(escaped) = chars.get(i + 1) {
                            text.push(*escaped);
                        }
                        i += 2;
                    }
                    Some(ch) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '?' => Some(Token::Question),
            ':' => Some(Token::Colon),
            ';' => Some(Token::Semicolon),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            i += 1;
            continue;
        }
        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match OPERATORS.iter().copied().find(|op| rest.starts_with(op)) {
            Some(op) => {
                tokens.push(Token::Op(op));
                i += op.len();
            }
            None => {
                return Err(BackendError::Script(format!(
                    "unexpected character [{c}] in script"
                )));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MathFn {
    Log,
    Log10,
    Log1p,
    Sqrt,
    Abs,
    Exp,
    Floor,
    Ceil,
    Pow,
    Min,
    Max,
}

impl MathFn {
    fn from_name(name: &str) -> Option<(Self, usize)> {
        let resolved = match name {
            "log" => (MathFn::Log, 1),
            "log10" => (MathFn::Log10, 1),
            "log1p" => (MathFn::Log1p, 1),
            "sqrt" => (MathFn::Sqrt, 1),
            "abs" => (MathFn::Abs, 1),
            "exp" => (MathFn::Exp, 1),
            "floor" => (MathFn::Floor, 1),
            "ceil" => (MathFn::Ceil, 1),
            "pow" => (MathFn::Pow, 2),
            "min" => (MathFn::Min, 2),
            "max" => (MathFn::Max, 2),
            _ => return None,
        };
        Some(resolved)
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            MathFn::Log => args[0].ln(),
            MathFn::Log10 => args[0].log10(),
            MathFn::Log1p => args[0].ln_1p(),
            MathFn::Sqrt => args[0].sqrt(),
            MathFn::Abs => args[0].abs(),
            MathFn::Exp => args[0].exp(),
            MathFn::Floor => args[0].floor(),
            MathFn::Ceil => args[0].ceil(),
            MathFn::Pow => args[0].powf(args[1]),
            MathFn::Min => args[0].min(args[1]),
            MathFn::Max => args[0].max(args[1]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Bool(bool),
    Score,
    DocValue(String),
    DocSize(String),
    DocEmpty(String),
    Param(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Math(MathFn, Vec<Expr>),
}

/// Deepest nesting of parentheses, calls, conditionals and unary operators.
const MAX_NESTING: usize = 256;

struct ScriptParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl ScriptParser {
    fn parse_script(&mut self) -> Result<Expr, BackendError> {
        if self.peek_ident("return") {
            self.pos += 1;
        }
        let expr = self.parse_conditional()?;
        if self.peek() == Some(&Token::Semicolon) {
            self.pos += 1;
        }
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(self.unexpected(token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(ident)) if ident == name)
    }

    fn peek_op(&self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), BackendError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.unexpected(&token)),
            None => Err(BackendError::Script(format!(
                "unexpected end of script, expected {expected:?}"
            ))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, BackendError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(self.unexpected(&token)),
            None => Err(BackendError::Script(
                "unexpected end of script, expected identifier".to_string(),
            )),
        }
    }

    fn expect_string(&mut self) -> Result<String, BackendError> {
        match self.next() {
            Some(Token::Str(text)) => Ok(text),
            Some(token) => Err(self.unexpected(&token)),
            None => Err(BackendError::Script(
                "unexpected end of script, expected string".to_string(),
            )),
        }
    }

    fn unexpected(&self, token: &Token) -> BackendError {
        BackendError::Script(format!("unexpected token {token:?} in script"))
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        if self.depth >= MAX_NESTING {
            return Err(BackendError::Script(format!(
                "script nesting exceeds {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_conditional(&mut self) -> Result<Expr, BackendError> {
        self.nested(Self::parse_conditional_inner)
    }

    fn parse_conditional_inner(&mut self) -> Result<Expr, BackendError> {
        let condition = self.parse_or()?;
        if self.peek() != Some(&Token::Question) {
            return Ok(condition);
        }
        self.pos += 1;
        let then = self.parse_conditional()?;
        self.expect(Token::Colon)?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, BackendError> {
        let mut left = self.parse_and()?;
        while self.peek_op(&["||"]).is_some() {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, BackendError> {
        let mut left = self.parse_comparison()?;
        while self.peek_op(&["&&"]).is_some() {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, BackendError> {
        let left = self.parse_additive()?;
        let Some(op) = self.peek_op(&["==", "!=", "<", "<=", ">", ">="]) else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        let op = match op {
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            _ => BinaryOp::Ge,
        };
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, BackendError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.peek_op(&["+", "-"]) {
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, BackendError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_op(&["*", "/", "%"]) {
            self.pos += 1;
            let right = self.parse_unary()?;
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, BackendError> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, BackendError> {
        match self.peek_op(&["-", "!", "+"]) {
            Some("-") => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some("!") => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(_) => {
                self.pos += 1;
                self.parse_unary()
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, BackendError> {
        let token = self
            .next()
            .ok_or_else(|| BackendError::Script("unexpected end of script".to_string()))?;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::LParen => {
                let expr = self.parse_conditional()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(ident) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "_score" => Ok(Expr::Score),
                "doc" => self.parse_doc_access(),
                "params" => self.parse_param_access(),
                "Math" => self.parse_math_call(),
                other => Err(BackendError::Script(format!(
                    "cannot resolve symbol [{other}]"
                ))),
            },
            other => Err(self.unexpected(&other)),
        }
    }

    fn parse_doc_access(&mut self) -> Result<Expr, BackendError> {
        self.expect(Token::LBracket)?;
        let field = self.expect_string()?;
        self.expect(Token::RBracket)?;
        self.expect(Token::Dot)?;
        let accessor = self.expect_ident()?;
        match accessor.as_str() {
            "value" => Ok(Expr::DocValue(field)),
            "empty" => Ok(Expr::DocEmpty(field)),
            "size" | "isEmpty" => {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                if accessor == "size" {
                    Ok(Expr::DocSize(field))
                } else {
                    Ok(Expr::DocEmpty(field))
                }
            }
            other => Err(BackendError::Script(format!(
                "unsupported doc accessor [{other}] on field [{field}]"
            ))),
        }
    }

    fn parse_param_access(&mut self) -> Result<Expr, BackendError> {
        match self.next() {
            Some(Token::Dot) => Ok(Expr::Param(self.expect_ident()?)),
            Some(Token::LBracket) => {
                let name = self.expect_string()?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Param(name))
            }
            Some(token) => Err(self.unexpected(&token)),
            None => Err(BackendError::Script("unexpected end of script after [params]".to_string())),
        }
    }

    fn parse_math_call(&mut self) -> Result<Expr, BackendError> {
        self.expect(Token::Dot)?;
        let name = self.expect_ident()?;
        let (function, arity) = MathFn::from_name(&name)
            .ok_or_else(|| BackendError::Script(format!("unknown function [Math.{name}]")))?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_conditional()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        if args.len() != arity {
            return Err(BackendError::Script(format!(
                "[Math.{name}] expects {arity} arguments, got {}",
                args.len()
            )));
        }
        Ok(Expr::Math(function, args))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Val {
    Num(f64),
    Bool(bool),
}

fn eval(expr: &Expr, ctx: &ScriptContext<'_>) -> Result<Val, BackendError> {
    match expr {
        Expr::Number(n) => Ok(Val::Num(*n)),
        Expr::Bool(b) => Ok(Val::Bool(*b)),
        Expr::Score => Ok(Val::Num(ctx.score)),
        Expr::DocValue(field) => {
            let values = field_values(ctx.doc, field);
            let first = values.first().ok_or_else(|| {
                BackendError::Script(format!(
                    "A document doesn't have a value for a field! Use doc[{field}].size()==0 to check if a document is missing a field!"
                ))
            })?;
            match first {
                Value::Number(n) => n
                    .as_f64()
                    .map(Val::Num)
                    .ok_or_else(|| BackendError::Script(format!("field [{field}] is not numeric"))),
                Value::Bool(b) => Ok(Val::Bool(*b)),
                _ => Err(BackendError::Script(format!(
                    "field [{field}] is not numeric"
                ))),
            }
        }
        Expr::DocSize(field) => Ok(Val::Num(field_values(ctx.doc, field).len() as f64)),
        Expr::DocEmpty(field) => Ok(Val::Bool(field_values(ctx.doc, field).is_empty())),
        Expr::Param(name) => match ctx.params.get(name) {
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Val::Num)
                .ok_or_else(|| BackendError::Script(format!("param [{name}] is not numeric"))),
            Some(Value::Bool(b)) => Ok(Val::Bool(*b)),
            Some(_) => Err(BackendError::Script(format!(
                "param [{name}] is not numeric"
            ))),
            None => Err(BackendError::Script(format!("missing param [{name}]"))),
        },
        Expr::Neg(inner) => Ok(Val::Num(-number(eval(inner, ctx)?)?)),
        Expr::Not(inner) => Ok(Val::Bool(!boolean(eval(inner, ctx)?)?)),
        Expr::Conditional(condition, then, otherwise) => {
            if boolean(eval(condition, ctx)?)? {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            Ok(Val::Bool(boolean(eval(left, ctx)?)? && boolean(eval(right, ctx)?)?))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            Ok(Val::Bool(boolean(eval(left, ctx)?)? || boolean(eval(right, ctx)?)?))
        }
        Expr::Binary(op @ (BinaryOp::Eq | BinaryOp::Ne), left, right) => {
            let equal = eval(left, ctx)? == eval(right, ctx)?;
            Ok(Val::Bool(if *op == BinaryOp::Eq { equal } else { !equal }))
        }
        Expr::Binary(op, left, right) => {
            let l = number(eval(left, ctx)?)?;
            let r = number(eval(right, ctx)?)?;
            Ok(match op {
                BinaryOp::Add => Val::Num(l + r),
                BinaryOp::Sub => Val::Num(l - r),
                BinaryOp::Mul => Val::Num(l * r),
                BinaryOp::Div => Val::Num(l / r),
                BinaryOp::Rem => Val::Num(l % r),
                BinaryOp::Lt => Val::Bool(l < r),
                BinaryOp::Le => Val::Bool(l <= r),
                BinaryOp::Gt => Val::Bool(l > r),
                BinaryOp::Ge => Val::Bool(l >= r),
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => {
                    unreachable!("handled above")
                }
            })
        }
        Expr::Math(function, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, ctx).and_then(number))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Val::Num(function.apply(&args)))
        }
    }
}

fn number(value: Val) -> Result<f64, BackendError> {
    match value {
        Val::Num(n) => Ok(n),
        Val::Bool(_) => Err(BackendError::Script(
            "cannot use a boolean as a number".to_string(),
        )),
    }
}

fn boolean(value: Val) -> Result<bool, BackendError> {
    match value {
        Val::Bool(b) => Ok(b),
        Val::Num(_) => Err(BackendError::Script(
            "cannot use a number as a boolean".to_string(),
        )),
    }
}

/// Look up `field` in a document source, following dotted paths into
/// nested objects.
pub fn lookup<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(value) = doc.get(field) {
        return Some(value);
    }
    let (head, rest) = field.split_once('.')?;
    match doc.get(head)? {
        Value::Object(nested) => lookup(nested, rest),
        _ => None,
    }
}

/// Non-null values of `field`, with arrays flattened.
pub fn field_values<'a>(doc: &'a Map<String, Value>, field: &str) -> Vec<&'a Value> {
    let mut values = Vec::new();
    if let Some(value) = lookup(doc, field) {
        flatten(value, &mut values);
    }
    values
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Null => {}
        Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn run(source: &str, doc: Value) -> Result<f64, BackendError> {
        let script = CompiledScript::compile(source)?;
        let params = json!({"weight": 2.0, "enabled": true});
        let ctx = ScriptContext::new(
            3.0,
            doc.as_object().unwrap(),
            params.as_object().unwrap(),
        );
        script.execute(&ctx)
    }

    #[test]
    fn test_doc_value() {
        assert_eq!(run("return doc['popularity'].value", json!({"popularity": 8.5})).unwrap(), 8.5);
        assert_eq!(run("doc['popularity'].value;", json!({"popularity": [4, 9]})).unwrap(), 4.0);
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(run("1 + 2 * 3", json!({})).unwrap(), 7.0);
        assert_eq!(run("(1 + 2) * 3", json!({})).unwrap(), 9.0);
        assert_eq!(run("10 % 4 - -1", json!({})).unwrap(), 3.0);
        assert_eq!(run("_score * params.weight", json!({})).unwrap(), 6.0);
        assert_eq!(run("params['weight'] + 1.5d", json!({})).unwrap(), 3.5);
    }

    #[test]
    fn test_math_functions() {
        let value = run("Math.log(1 + doc['votes'].value)", json!({"votes": 0})).unwrap();
        assert_eq!(value, 0.0);
        assert_eq!(run("Math.max(2, Math.pow(2, 3))", json!({})).unwrap(), 8.0);
        assert!(CompiledScript::compile("Math.pow(2)").is_err());
        assert!(CompiledScript::compile("Math.nope(2)").is_err());
    }

    #[test]
    fn test_conditional_is_lazy() {
        let source = "doc['rating'].size() == 0 ? 0 : doc['rating'].value";
        assert_eq!(run(source, json!({})).unwrap(), 0.0);
        assert_eq!(run(source, json!({"rating": 7})).unwrap(), 7.0);
        assert_eq!(run("doc['rating'].empty ? 1 : 2", json!({"rating": null})).unwrap(), 1.0);
        assert_eq!(run("params.enabled && !false ? 5 : 0", json!({})).unwrap(), 5.0);
    }

    #[test]
    fn test_nested_field() {
        let doc = json!({"stats": {"views": 12}});
        assert_eq!(run("doc['stats.views'].value", doc).unwrap(), 12.0);
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let err = run("return doc['popularity'].value", json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, BackendError::Script(msg) if msg.contains("doesn't have a value")));
    }

    #[test]
    fn test_negative_score_is_an_error() {
        let err = run("-1", json!({})).unwrap_err();
        assert!(matches!(err, BackendError::Script(msg) if msg.contains("negative")));
    }

    #[test]
    fn test_infinite_score_is_an_error() {
        let err = run("1 / doc['votes'].value", json!({"votes": 0})).unwrap_err();
        assert!(matches!(err, BackendError::Script(msg) if msg.contains("non-finite")));

        let err = run("Math.exp(1000)", json!({})).unwrap_err();
        assert!(matches!(err, BackendError::Script(_)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = CompiledScript::compile(&deep).unwrap_err();
        assert!(matches!(err, BackendError::Script(msg) if msg.contains("nesting")));

        let negations = format!("{}1", "-".repeat(10_000));
        assert!(CompiledScript::compile(&negations).is_err());

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(run(&shallow, json!({})).unwrap(), 1.0);
    }

    #[test]
    fn test_compile_errors() {
        assert!(CompiledScript::compile("return doc['a'.value").is_err());
        assert!(CompiledScript::compile("foo + 1").is_err());
        assert!(CompiledScript::compile("1 +").is_err());
        assert!(CompiledScript::compile("1 2").is_err());
        assert!(CompiledScript::compile("'open").is_err());
        assert!(CompiledScript::compile("1 # 2").is_err());
    }

    #[test]
    fn test_boolean_result_is_an_error() {
        assert!(run("1 < 2", json!({})).is_err());
    }
}
