//! Expression evaluation

use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

use crate::compiler::emit::NAMESPACE_ROOT;
use crate::errors::OpError;
use crate::runtime::namespace::OpCall;

use super::builtins;
use super::errors::{ErrorInfo, FLOW_ERROR, REFERENCE_ERROR, TYPE_ERROR};
use super::statements::property_key;
use super::types::ast::{BinaryOp, Expr, UnaryOp};
use super::types::Val;
use super::{Abrupt, Interpreter};

pub type ExprFuture<'a> = Pin<Box<dyn Future<Output = Result<Val, Abrupt>> + Send + 'a>>;

impl Interpreter {
    pub fn eval_expr<'a>(&'a mut self, expr: &'a Expr) -> ExprFuture<'a> {
        Box::pin(async move {
            match expr {
                Expr::LitBool { v, .. } => Ok(Val::Bool(*v)),
                Expr::LitNum { v, .. } => Ok(Val::Num(*v)),
                Expr::LitStr { v, .. } => Ok(Val::Str(v.clone())),
                Expr::LitNull { .. } => Ok(Val::Null),
                Expr::LitUndefined { .. } => Ok(Val::Undefined),

                Expr::LitList { elements, .. } => {
                    Ok(Val::List(self.eval_args(elements).await?))
                }

                Expr::LitObj { properties, .. } => {
                    let mut map = std::collections::BTreeMap::new();
                    for (key, value) in properties {
                        let value = self.eval_expr(value).await?;
                        map.insert(key.clone(), value);
                    }
                    Ok(Val::Obj(map))
                }

                Expr::Ident { name, .. } => self
                    .lookup(name)
                    .ok_or_else(|| self.throw(REFERENCE_ERROR, format!("{} is not defined", name))),

                Expr::Member {
                    object, property, ..
                } => {
                    let object = self.eval_expr(object).await?;
                    self.read_property(&object, property)
                }

                Expr::Index { object, index, .. } => {
                    let object = self.eval_expr(object).await?;
                    let key = property_key(&self.eval_expr(index).await?);
                    self.read_property(&object, &key)
                }

                Expr::Call { callee, args, .. } => self.eval_call(callee, args).await,

                Expr::Unary { op, operand, .. } => {
                    let value = self.eval_expr(operand).await?;
                    Ok(match op {
                        UnaryOp::Not => Val::Bool(!value.is_truthy()),
                        UnaryOp::Neg => Val::Num(-value.to_number()),
                    })
                }

                Expr::BinaryOp {
                    op, left, right, ..
                } => {
                    let left = self.eval_expr(left).await?;
                    match op {
                        BinaryOp::And if !left.is_truthy() => return Ok(left),
                        BinaryOp::Or if left.is_truthy() => return Ok(left),
                        BinaryOp::And | BinaryOp::Or => return self.eval_expr(right).await,
                        _ => {}
                    }
                    let right = self.eval_expr(right).await?;
                    Ok(binary(*op, &left, &right))
                }
            }
        })
    }

    async fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Val>, Abrupt> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg).await?);
        }
        Ok(values)
    }

    fn lookup(&self, name: &str) -> Option<Val> {
        if let Some(value) = self.locals.get(name).or_else(|| self.globals.get(name)) {
            return Some(value.clone());
        }
        match name {
            "NaN" => Some(Val::Num(f64::NAN)),
            "Infinity" => Some(Val::Num(f64::INFINITY)),
            _ => None,
        }
    }

    fn is_variable(&self, name: &str) -> bool {
        self.locals.contains_key(name) || self.globals.contains_key(name)
    }

    fn read_property(&self, object: &Val, key: &str) -> Result<Val, Abrupt> {
        if object.is_nullish() {
            return Err(self.throw(
                TYPE_ERROR,
                format!(
                    "cannot read properties of {} (reading '{}')",
                    object.type_name(),
                    key
                ),
            ));
        }
        Ok(object.get_property(key))
    }

    async fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Val, Abrupt> {
        let path = callee.member_path().unwrap_or_default();
        let path: Vec<&str> = path.iter().map(String::as_str).collect();

        match path.as_slice() {
            [root, rest @ ..] if *root == NAMESPACE_ROOT && !rest.is_empty() && !self.is_variable(root) => {
                let values = self.eval_args(args).await?;
                return self.call_operation(rest, values).await;
            }
            ["runFlow"] if !self.is_variable("runFlow") => {
                let values = self.eval_args(args).await?;
                return self.call_run_flow(values).await;
            }
            [name] if builtins::GLOBAL_FUNCTIONS.contains(name) && !self.is_variable(name) => {
                let values = self.eval_args(args).await?;
                if let Some(result) = builtins::call_global(name, &values) {
                    return result.map_err(|info| self.throw_info(info));
                }
            }
            ["JSON", method] if !self.is_variable("JSON") => {
                let values = self.eval_args(args).await?;
                return match builtins::call_json(method, &values) {
                    Some(result) => result.map_err(|info| self.throw_info(info)),
                    None => Err(self.throw(TYPE_ERROR, format!("JSON.{} is not a function", method))),
                };
            }
            ["Object", "keys"] if !self.is_variable("Object") => {
                let values = self.eval_args(args).await?;
                let first = values.into_iter().next().unwrap_or(Val::Undefined);
                return builtins::object_keys(&first).map_err(|info| self.throw_info(info));
            }
            _ => {}
        }

        if let Expr::Member {
            object, property, ..
        } = callee
        {
            let receiver = self.eval_expr(object).await?;
            let values = self.eval_args(args).await?;
            return match builtins::call_method(&receiver, property, &values) {
                Some(result) => result.map_err(|info| self.throw_info(info)),
                None => Err(self.throw(
                    TYPE_ERROR,
                    format!("{}.{} is not a function", receiver.type_name(), property),
                )),
            };
        }

        let name = path.join(".");
        let name = if name.is_empty() { "expression".to_string() } else { name };
        Err(self.throw(TYPE_ERROR, format!("{} is not a function", name)))
    }

    /// Call a registered operation. A trailing block context argument is
    /// split off and travels with the call.
    async fn call_operation(&mut self, segments: &[&str], mut args: Vec<Val>) -> Result<Val, Abrupt> {
        let dotted = segments.join(".");
        let Some(op) = self.namespace.lookup(segments) else {
            return Err(self.throw(
                TYPE_ERROR,
                format!("{}.{} is not a function", NAMESPACE_ROOT, dotted),
            ));
        };
        let block = match args.last().and_then(builtins::val_to_block) {
            Some(block) => {
                args.pop();
                block
            }
            None => self.attribute(),
        };
        let call = OpCall::new(&dotted, args, block);
        match op.call(&call).await {
            Ok(value) => Ok(value),
            Err(err @ OpError::Terminated { .. }) => Err(Abrupt::Terminate(err)),
            Err(err) => Err(self.throw_info(ErrorInfo::from_op(&err))),
        }
    }

    /// `runFlow(name, block)`
    async fn call_run_flow(&mut self, args: Vec<Val>) -> Result<Val, Abrupt> {
        let name = args.first().map(Val::to_display).unwrap_or_default();
        let block = args.get(1).and_then(builtins::val_to_block);
        let program = match self.load_sibling(&name) {
            Ok(program) => program,
            Err(e) => {
                let mut info = ErrorInfo::new(FLOW_ERROR, format!("cannot run flow {}: {}", name, e));
                info.block = block;
                return Err(self.throw_info(info));
            }
        };
        self.run_subflow(program).await?;
        Ok(Val::Undefined)
    }
}

fn is_textual(value: &Val) -> bool {
    matches!(value, Val::Str(_) | Val::List(_) | Val::Obj(_) | Val::Error(_))
}

fn binary(op: BinaryOp, left: &Val, right: &Val) -> Val {
    match op {
        BinaryOp::Eq => Val::Bool(left.loose_eq(right)),
        BinaryOp::Ne => Val::Bool(!left.loose_eq(right)),
        BinaryOp::Lt => Val::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Le => Val::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Val::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Val::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => {
            if is_textual(left) || is_textual(right) {
                Val::Str(left.to_display() + &right.to_display())
            } else {
                Val::Num(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
        BinaryOp::Mod => Val::Num(left.to_number() % right.to_number()),
        // Short-circuiting operators never get here.
        BinaryOp::And | BinaryOp::Or => Val::Undefined,
    }
}

/// Strings compare as text, everything else as numbers.
fn compare(left: &Val, right: &Val) -> Option<Ordering> {
    match (left, right) {
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}
