//! Expression evaluation against a scope

use crate::template::extensions::TemplateExtensions;
use crate::template::parser::{BinaryOp, Expr, UnaryOp};
use crate::template::{
    is_truthy, value_to_text, TemplateError, PARENT_PARAMS_KEY, PIPE_RESULTS_KEY,
};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Longest string `*` may produce, in bytes
const MAX_REPEAT_LEN: usize = 1 << 20;

/// Evaluates parsed expressions against a scope and the registered extensions
pub struct Evaluator<'a> {
    scope: &'a Map<String, Value>,
    extensions: &'a TemplateExtensions,
}

impl<'a> Evaluator<'a> {
    pub fn new(scope: &'a Map<String, Value>, extensions: &'a TemplateExtensions) -> Self {
        Self { scope, extensions }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, TemplateError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        other => value_to_text(&other),
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::Attr(target, name) => {
                let target = self.eval(target)?;
                match &target {
                    Value::Object(map) => map.get(name).cloned().ok_or_else(|| {
                        TemplateError::Index(format!("no attribute '{}'", name))
                    }),
                    other => Err(TemplateError::Type(format!(
                        "cannot read attribute '{}' of {}",
                        name,
                        type_name(other)
                    ))),
                }
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
            Expr::Call { name, args, kwargs } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(key, arg)| Ok((key.clone(), self.eval(arg)?)))
                    .collect::<Result<Vec<_>, TemplateError>>()?;
                self.call(name, args, kwargs)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                    UnaryOp::Neg => match Num::from_value(&value) {
                        Some(Num::Int(i)) => i
                            .checked_neg()
                            .map(Value::from)
                            .ok_or_else(|| TemplateError::Type("integer overflow".into())),
                        Some(Num::Float(f)) => float_value(-f),
                        None => Err(type_error("-", &value, &Value::Null)),
                    },
                    UnaryOp::Pos => match Num::from_value(&value) {
                        Some(_) => Ok(value),
                        None => Err(type_error("+", &value, &Value::Null)),
                    },
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left)?;
                if is_truthy(&left) {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, TemplateError> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.extensions.value(name) {
            return Ok(value);
        }
        Err(TemplateError::UnknownName(name.to_string()))
    }

    fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, TemplateError> {
        if let Some(function) = self.extensions.function(name) {
            if !kwargs.is_empty() {
                return Err(TemplateError::Type(format!(
                    "extension '{}' does not accept keyword arguments",
                    name
                )));
            }
            return function(args.as_slice()).map_err(|message| TemplateError::Extension {
                name: name.to_string(),
                message,
            });
        }

        match name {
            "at_path" => {
                let [value, path] = bind(name, args, kwargs, &["value", "path"], &[])?;
                at_path(&value, &value_to_text(&path))
            }
            "has_failed" => {
                let [pipe_id] = bind(name, args, kwargs, &["pipe_id"], &[])?;
                let failed = self
                    .pipe_result(&value_to_text(&pipe_id))
                    .and_then(|result| result.get("failed"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Ok(Value::Bool(failed))
            }
            "get_pipe_result" => {
                let [pipe_id, key] = bind(
                    name,
                    args,
                    kwargs,
                    &["pipe_id", "data_key"],
                    &[Value::String("value".into())],
                )?;
                Ok(self
                    .pipe_result(&value_to_text(&pipe_id))
                    .and_then(|result| result.get("data"))
                    .and_then(|data| data.get(value_to_text(&key)))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            "get_parent_param" => {
                let [param] = bind(name, args, kwargs, &["name"], &[])?;
                Ok(self
                    .scope
                    .get(PARENT_PARAMS_KEY)
                    .and_then(|params| params.get(value_to_text(&param)))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            "get_env" => {
                let [var] = bind(name, args, kwargs, &["name"], &[])?;
                Ok(std::env::var(value_to_text(&var))
                    .map(Value::String)
                    .unwrap_or(Value::Null))
            }
            "fail" => {
                let [message] = bind(
                    name,
                    args,
                    kwargs,
                    &["message"],
                    &[Value::String("fail() was called".into())],
                )?;
                Err(TemplateError::Failed(value_to_text(&message)))
            }
            "length" => {
                let [value] = bind(name, args, kwargs, &["value"], &[])?;
                let len = match &value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => {
                        return Err(TemplateError::Type(format!(
                            "{} has no length",
                            type_name(other)
                        )))
                    }
                };
                Ok(Value::from(len as u64))
            }
            "default" => {
                let [value, fallback] = bind(name, args, kwargs, &["value", "fallback"], &[])?;
                Ok(if value.is_null() { fallback } else { value })
            }
            "lower" | "upper" => {
                let [value] = bind(name, args, kwargs, &["value"], &[])?;
                let text = value_to_text(&value);
                Ok(Value::String(if name == "lower" {
                    text.to_lowercase()
                } else {
                    text.to_uppercase()
                }))
            }
            "string" => {
                let [value] = bind(name, args, kwargs, &["value"], &[])?;
                Ok(Value::String(value_to_text(&value)))
            }
            "matches" => {
                let [text, pattern] = bind(name, args, kwargs, &["text", "pattern"], &[])?;
                let regex = Regex::new(&value_to_text(&pattern))
                    .map_err(|e| TemplateError::Type(format!("invalid pattern: {}", e)))?;
                Ok(Value::Bool(regex.is_match(&value_to_text(&text))))
            }
            _ => Err(TemplateError::UnknownFunction(name.to_string())),
        }
    }

    fn pipe_result(&self, pipe_id: &str) -> Option<&Value> {
        self.scope
            .get(PIPE_RESULTS_KEY)
            .and_then(|results| results.get(pipe_id))
    }
}

/// Bind positional and keyword arguments to a fixed parameter list
///
/// `defaults` fill the trailing parameters that were not supplied.
fn bind<const N: usize>(
    function: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    params: &[&str; N],
    defaults: &[Value],
) -> Result<[Value; N], TemplateError> {
    if args.len() > N {
        return Err(TemplateError::Type(format!(
            "{}() takes at most {} arguments ({} given)",
            function,
            N,
            args.len()
        )));
    }

    let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    slots.resize(N, None);

    for (key, value) in kwargs {
        match params.iter().position(|p| *p == key) {
            Some(i) if slots[i].is_none() => slots[i] = Some(value),
            Some(_) => {
                return Err(TemplateError::Type(format!(
                    "{}() got multiple values for '{}'",
                    function, key
                )))
            }
            None => {
                return Err(TemplateError::Type(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    function, key
                )))
            }
        }
    }

    let first_default = N - defaults.len();
    let mut bound = Vec::with_capacity(N);
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(value) => bound.push(value),
            None if i >= first_default => bound.push(defaults[i - first_default].clone()),
            None => {
                return Err(TemplateError::Type(format!(
                    "{}() missing argument '{}'",
                    function, params[i]
                )))
            }
        }
    }

    bound
        .try_into()
        .map_err(|_| TemplateError::Type(format!("{}(): argument mismatch", function)))
}

/// Walk a dotted path through nested maps and lists
pub fn at_path(value: &Value, path: &str) -> Result<Value, TemplateError> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| TemplateError::Index(format!("path '{}' not found at '{}'", path, segment)))?;
    }
    Ok(current.clone())
}

fn index_value(target: &Value, index: &Value) -> Result<Value, TemplateError> {
    match (target, index) {
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| TemplateError::Index(format!("no key '{}'", key))),
        (Value::Array(items), Value::Number(_)) => {
            let i = index
                .as_i64()
                .ok_or_else(|| TemplateError::Type("list index must be an integer".into()))?;
            resolve_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| TemplateError::Index(format!("list index {} out of range", i)))
        }
        (Value::String(s), Value::Number(_)) => {
            let i = index
                .as_i64()
                .ok_or_else(|| TemplateError::Type("string index must be an integer".into()))?;
            let chars: Vec<char> = s.chars().collect();
            resolve_index(i, chars.len())
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| TemplateError::Index(format!("string index {} out of range", i)))
        }
        (target, index) => Err(TemplateError::Type(format!(
            "cannot index {} with {}",
            type_name(target),
            type_name(index)
        ))),
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved >= 0 && (resolved as usize) < len {
        Some(resolved as usize)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Num::Int(i)),
                None => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn float_value(f: f64) -> Result<Value, TemplateError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TemplateError::Type("result is not a finite number".into()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> TemplateError {
    TemplateError::Type(format!(
        "unsupported operand types for '{}': {} and {}",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (Num::from_value(left), Num::from_value(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (Num::from_value(left), Num::from_value(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
        (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, TemplateError> {
    match container {
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(type_error("in", other, container)),
        },
        Value::Array(items) => Ok(items.iter().any(|candidate| values_equal(candidate, item))),
        Value::Object(map) => Ok(map.contains_key(&value_to_text(item))),
        other => Err(type_error("in", item, other)),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right).ok_or_else(|| type_error("<", left, right))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::In => contains(right, left).map(Value::Bool),
        BinaryOp::NotIn => contains(right, left).map(|found| Value::Bool(!found)),
        BinaryOp::Concat => Ok(Value::String(format!(
            "{}{}",
            value_to_text(left),
            value_to_text(right)
        ))),
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Mul => match (left, right) {
            (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
                let times = n
                    .as_u64()
                    .ok_or_else(|| type_error("*", left, right))?;
                let times = usize::try_from(times)
                    .ok()
                    .filter(|times| {
                        s.len()
                            .checked_mul(*times)
                            .map_or(false, |len| len <= MAX_REPEAT_LEN)
                    })
                    .ok_or_else(|| TemplateError::Type("string repetition too large".into()))?;
                Ok(Value::String(s.repeat(times)))
            }
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        _ => "%",
    };
    let (a, b) = match (Num::from_value(left), Num::from_value(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(type_error(symbol, left, right)),
    };

    let zero_division = || TemplateError::Type("division by zero".into());
    let overflow = || TemplateError::Type("integer overflow".into());

    match (op, a, b) {
        (BinaryOp::Div, _, _) => {
            if b.as_f64() == 0.0 {
                return Err(zero_division());
            }
            float_value(a.as_f64() / b.as_f64())
        }
        (BinaryOp::Add, Num::Int(x), Num::Int(y)) => x.checked_add(y).map(Value::from).ok_or_else(overflow),
        (BinaryOp::Sub, Num::Int(x), Num::Int(y)) => x.checked_sub(y).map(Value::from).ok_or_else(overflow),
        (BinaryOp::Mul, Num::Int(x), Num::Int(y)) => x.checked_mul(y).map(Value::from).ok_or_else(overflow),
        (BinaryOp::FloorDiv, Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                return Err(zero_division());
            }
            let quotient = x.checked_div_euclid(y).ok_or_else(overflow)?;
            let remainder = x.checked_rem_euclid(y).ok_or_else(overflow)?;
            if y < 0 && remainder != 0 {
                quotient.checked_sub(1).map(Value::from).ok_or_else(overflow)
            } else {
                Ok(Value::from(quotient))
            }
        }
        (BinaryOp::Mod, Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                return Err(zero_division());
            }
            let remainder = x.checked_rem(y).ok_or_else(overflow)?;
            // Result takes the sign of the divisor
            if remainder != 0 && (remainder < 0) != (y < 0) {
                Ok(Value::from(remainder + y))
            } else {
                Ok(Value::from(remainder))
            }
        }
        (_, a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => float_value(x + y),
                BinaryOp::Sub => float_value(x - y),
                BinaryOp::Mul => float_value(x * y),
                BinaryOp::FloorDiv if y == 0.0 => Err(zero_division()),
                BinaryOp::FloorDiv => float_value((x / y).floor()),
                _ if y == 0.0 => Err(zero_division()),
                _ => float_value(x - y * (x / y).floor()),
            }
        }
    }
}
