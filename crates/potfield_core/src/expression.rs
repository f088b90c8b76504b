//! Potentials written as text, e.g. `"-k / sqrt(x^2 + y^2 + s)"`.
//!
//! Expressions are parsed into an AST, compiled to bytecode for a small
//! stack machine, and evaluated either on `f64` (the potential) or on dual
//! numbers (its exact gradient).

use crate::autodiff::{gradient, Dual};
use crate::error::FieldError;
use crate::traits::{EvalResult, Field, Potential, Scalar};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;

/// Unary functions callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    fn apply<T: Scalar>(self, value: T) -> T {
        match self {
            Function::Sin => value.sin(),
            Function::Cos => value.cos(),
            Function::Exp => value.exp(),
            Function::Ln => value.ln(),
            Function::Sqrt => value.sqrt(),
        }
    }
}

/// OpCodes for the stack machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    LoadConst(f64),
    /// Pushes a state variable by index (0 = first coordinate).
    LoadVar(usize),
    LoadParam(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a - b.
    Sub,
    Mul,
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    Neg,
    Call(Function),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stateless stack machine; the caller owns the stack buffer.
pub struct VM;

impl VM {
    /// Runs `bytecode` and returns the value left on the stack, or `None`
    /// when the bytecode underflows the stack.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> Option<T> {
        stack.clear();
        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(value) => stack.push(T::from_f64(value)),
                OpCode::LoadVar(idx) => stack.push(*vars.get(idx)?),
                OpCode::LoadParam(idx) => stack.push(*params.get(idx)?),
                OpCode::Neg => {
                    let a = stack.pop()?;
                    stack.push(-a);
                }
                OpCode::Call(function) => {
                    let a = stack.pop()?;
                    stack.push(function.apply(a));
                }
                binary => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(match binary {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        OpCode::Pow => a.powf(b),
                        _ => return None,
                    });
                }
            }
        }
        if stack.len() == 1 {
            stack.pop()
        } else {
            None
        }
    }
}

// --- AST & Parser ---

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>),
    Negate(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Resolves names to variable/parameter slots and emits bytecode.
pub struct Compiler {
    var_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    bail!("Unknown variable or parameter: {name}");
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => bail!("Unknown binary operator: {op}"),
                });
            }
            Expr::Negate(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, arg) => {
                let function =
                    Function::lookup(name).ok_or_else(|| anyhow!("Unknown function: {name}"))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

/// Parses an infix expression into an AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        bail!("Unexpected trailing token {token:?}");
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign = (d == '-' || d == '+') && literal.ends_with(['e', 'E']);
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse()
                .map_err(|_| anyhow!("Invalid number literal: {literal}"))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => bail!("Unexpected character '{other}'"),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

/// Deepest nesting `parse` accepts, counted both as parser recursion and as
/// depth of the resulting tree.
pub const MAX_NESTING: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

/// A parsed subtree and its depth.
type Node = (Expr, usize);

fn checked_depth(depth: usize) -> Result<usize> {
    if depth > MAX_NESTING {
        bail!("Expression nests deeper than {MAX_NESTING} levels");
    }
    Ok(depth)
}

fn binary((left, left_depth): Node, op: char, (right, right_depth): Node) -> Result<Node> {
    let depth = checked_depth(left_depth.max(right_depth) + 1)?;
    Ok((Expr::Binary(Box::new(left), op, Box::new(right)), depth))
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Node> {
        let mut left = self.parse_product()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some('+'),
            Some(Token::Minus) => Some('-'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_product()?;
            left = binary(left, op, right)?;
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Node> {
        let mut left = self.parse_unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some('*'),
            Some(Token::Slash) => Some('/'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_unary()?;
            left = binary(left, op, right)?;
        }
        Ok(left)
    }

    // Every recursive path passes through here.
    fn parse_unary(&mut self) -> Result<Node> {
        self.nesting = checked_depth(self.nesting + 1)?;
        let node = self.parse_unary_inner();
        self.nesting -= 1;
        node
    }

    // Unary minus binds looser than '^': -x^2 == -(x^2).
    fn parse_unary_inner(&mut self) -> Result<Node> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let (operand, depth) = self.parse_unary()?;
            return Ok((Expr::Negate(Box::new(operand)), checked_depth(depth + 1)?));
        }
        self.parse_power()
    }

    // Right-associative: a^b^c == a^(b^c).
    fn parse_power(&mut self) -> Result<Node> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return binary(base, '^', exponent);
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.consume() {
            Some(Token::Number(n)) => Ok((Expr::Number(n), 1)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let (arg, depth) = self.parse_expression()?;
                    self.expect_closing()?;
                    Ok((Expr::Call(name, Box::new(arg)), checked_depth(depth + 1)?))
                } else {
                    Ok((Expr::Variable(name), 1))
                }
            }
            Some(Token::LParen) => {
                let node = self.parse_expression()?;
                self.expect_closing()?;
                Ok(node)
            }
            Some(token) => bail!("Unexpected token {token:?}"),
            None => bail!("Unexpected end of expression"),
        }
    }

    fn expect_closing(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => bail!("Expected ')'"),
        }
    }
}

// --- ExpressionPotential ---

/// A potential compiled from text. Its field is exact: the gradient is
/// taken with dual numbers, not finite differences.
#[derive(Debug, Clone)]
pub struct ExpressionPotential {
    bytecode: Bytecode,
    var_names: Vec<String>,
    params: Vec<f64>,
    dual_params: Vec<Dual>,
}

/// Compiles `expression` over the coordinates `var_names` with named
/// parameters bound to `params`.
pub fn compile_potential(
    expression: &str,
    var_names: &[String],
    param_names: &[String],
    params: &[f64],
) -> Result<ExpressionPotential> {
    if var_names.is_empty() {
        bail!("A potential needs at least one variable.");
    }
    if param_names.len() != params.len() {
        bail!(
            "Parameter count mismatch: {} names, {} values.",
            param_names.len(),
            params.len()
        );
    }
    let parsed = parse(expression)?;
    let bytecode = Compiler::new(var_names, param_names).compile(&parsed)?;
    Ok(ExpressionPotential {
        bytecode,
        var_names: var_names.to_vec(),
        params: params.to_vec(),
        dual_params: params.iter().map(|&p| Dual::constant(p)).collect(),
    })
}

impl ExpressionPotential {
    pub fn dimension(&self) -> usize {
        self.var_names.len()
    }

    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    fn check_dimension(&self, x: &[f64]) -> EvalResult<()> {
        if x.len() != self.dimension() {
            return Err(FieldError::dimension("expression potential", self.dimension(), x.len()).into());
        }
        Ok(())
    }
}

impl Potential for ExpressionPotential {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        self.check_dimension(x)?;
        let mut stack = Vec::with_capacity(self.bytecode.ops.len());
        VM::execute(&self.bytecode, x, &self.params, &mut stack)
            .ok_or_else(|| "malformed potential bytecode".into())
    }
}

impl Field for ExpressionPotential {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        self.check_dimension(x)?;
        if out.len() != x.len() {
            return Err(FieldError::dimension("field output", x.len(), out.len()).into());
        }
        gradient(
            |vars: &[Dual]| {
                let mut stack = Vec::with_capacity(self.bytecode.ops.len());
                VM::execute(&self.bytecode, vars, &self.dual_params, &mut stack)
                    .ok_or("malformed potential bytecode")
            },
            x,
            out,
        )?;
        for value in out.iter_mut() {
            *value = -*value;
        }
        Ok(())
    }
}
