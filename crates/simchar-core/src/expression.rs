//! Row-wise arithmetic over record columns, e.g. `atan(vx/vz)`.
//!
//! Expressions are parsed once and evaluated lazily per record. A division by
//! exactly zero, or any other non-finite intermediate result, makes the row
//! undefined (`NaN`) instead of failing the whole column.

use crate::domain::{AnalysisError, AnalysisResult, Field};
use crate::records::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Column(Field),
    Negate(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        function: Function,
        args: Vec<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Atan,
    Atan2,
    Sqrt,
    Abs,
    Exp,
    Log,
    Sin,
    Cos,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "atan" => Some(Self::Atan),
            "atan2" => Some(Self::Atan2),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            "exp" => Some(Self::Exp),
            "log" => Some(Self::Log),
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            _ => None,
        }
    }

    const fn arity(self) -> usize {
        match self {
            Self::Atan2 => 2,
            _ => 1,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sin => "sin",
            Self::Cos => "cos",
        }
    }
}

impl Expression {
    pub fn parse(source: &str) -> AnalysisResult<Self> {
        let source = source.trim();
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            position: 0,
        };
        let root = parser.parse_sum()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected trailing token {token:?}")));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub(crate) fn divergence_angle(velocity: Field) -> Self {
        Self {
            source: format!("atan({velocity}/vz)"),
            root: Node::Call {
                function: Function::Atan,
                args: vec![Node::Binary {
                    op: BinaryOp::Div,
                    lhs: Box::new(Node::Column(velocity)),
                    rhs: Box::new(Node::Column(Field::Vz)),
                }],
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the outermost operation returns an angle in radians.
    pub fn is_angle(&self) -> bool {
        matches!(
            self.root,
            Node::Call {
                function: Function::Atan | Function::Atan2,
                ..
            }
        )
    }

    /// Evaluates the expression for one record; undefined rows yield `NaN`.
    pub fn evaluate(&self, record: &Record) -> f64 {
        let value = evaluate_node(&self.root, record);
        if value.is_finite() { value } else { f64::NAN }
    }
}

fn evaluate_node(node: &Node, record: &Record) -> f64 {
    match node {
        Node::Number(value) => *value,
        Node::Column(field) => record.value(*field),
        Node::Negate(inner) => -evaluate_node(inner, record),
        Node::Binary { op, lhs, rhs } => {
            let lhs = evaluate_node(lhs, record);
            let rhs = evaluate_node(rhs, record);
            match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Sub => lhs - rhs,
                BinaryOp::Mul => lhs * rhs,
                BinaryOp::Div if rhs == 0.0 => f64::NAN,
                BinaryOp::Div => lhs / rhs,
            }
        }
        Node::Call { function, args } => {
            let first = evaluate_node(&args[0], record);
            match function {
                Function::Atan => first.atan(),
                Function::Atan2 => first.atan2(evaluate_node(&args[1], record)),
                Function::Sqrt => first.sqrt(),
                Function::Abs => first.abs(),
                Function::Exp => first.exp(),
                Function::Log => first.ln(),
                Function::Sin => first.sin(),
                Function::Cos => first.cos(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Comma,
}

fn tokenize(source: &str) -> AnalysisResult<Vec<Token>> {
    let invalid = |reason: String| AnalysisError::InvalidExpression {
        expression: source.to_string(),
        reason,
    };

    let chars = source.char_indices().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let (offset, ch) = chars[index];
        match ch {
            c if c.is_whitespace() => index += 1,
            '+' => {
                tokens.push(Token::Plus);
                index += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                index += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                index += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                index += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                index += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                index += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = offset;
                let mut end = index;
                while end < chars.len() {
                    let current = chars[end].1;
                    let exponent_sign = matches!(current, '+' | '-')
                        && end > index
                        && matches!(chars[end - 1].1, 'e' | 'E');
                    if current.is_ascii_digit()
                        || current == '.'
                        || matches!(current, 'e' | 'E')
                        || exponent_sign
                    {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let stop = chars.get(end).map_or(source.len(), |(offset, _)| *offset);
                let literal = &source[start..stop];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("invalid number literal '{literal}'")))?;
                tokens.push(Token::Number(value));
                index = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = offset;
                let mut end = index;
                while end < chars.len() && (chars[end].1.is_ascii_alphanumeric() || chars[end].1 == '_')
                {
                    end += 1;
                }
                let stop = chars.get(end).map_or(source.len(), |(offset, _)| *offset);
                tokens.push(Token::Ident(source[start..stop].to_string()));
                index = end;
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
    }

    if tokens.is_empty() {
        return Err(invalid("expression is empty".to_string()));
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn error(&self, reason: String) -> AnalysisError {
        AnalysisError::InvalidExpression {
            expression: self.source.to_string(),
            reason,
        }
    }

    fn expect(&mut self, expected: Token) -> AnalysisResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn parse_sum(&mut self) -> AnalysisResult<Node> {
        let mut node = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(node),
            };
            self.position += 1;
            let rhs = self.parse_product()?;
            node = Node::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_product(&mut self) -> AnalysisResult<Node> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(node),
            };
            self.position += 1;
            let rhs = self.parse_unary()?;
            node = Node::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> AnalysisResult<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.position += 1;
                Ok(Node::Negate(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.position += 1;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> AnalysisResult<Node> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Node::Number(value)),
            Some(Token::LeftParen) => {
                let inner = self.parse_sum()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LeftParen)) {
                    self.position += 1;
                    return self.parse_call(&name);
                }
                Field::from_name(&name)
                    .map(Node::Column)
                    .ok_or_else(|| AnalysisError::unknown_variable(name))
            }
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error("unexpected end of input".to_string())),
        }
    }

    fn parse_call(&mut self, name: &str) -> AnalysisResult<Node> {
        let function = Function::from_name(name)
            .ok_or_else(|| self.error(format!("unknown function '{name}'")))?;

        let mut args = vec![self.parse_sum()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.position += 1;
            args.push(self.parse_sum()?);
        }
        self.expect(Token::RightParen)?;

        if args.len() != function.arity() {
            return Err(self.error(format!(
                "{}() takes {} argument(s), got {}",
                function.name(),
                function.arity(),
                args.len()
            )));
        }

        Ok(Node::Call { function, args })
    }
}
