//! Statement execution

use std::future::Future;
use std::pin::Pin;

use super::errors::{REFERENCE_ERROR, TYPE_ERROR};
use super::types::ast::{MemberAccess, Stmt};
use super::types::values::format_number;
use super::types::Val;
use super::{Abrupt, Completion, Interpreter};

pub type StmtFuture<'a> = Pin<Box<dyn Future<Output = Result<Completion, Abrupt>> + Send + 'a>>;

impl Interpreter {
    pub fn exec_stmt<'a>(&'a mut self, stmt: &'a Stmt) -> StmtFuture<'a> {
        Box::pin(async move {
            self.before_stmt(stmt).await;

            match stmt {
                Stmt::Block { body, .. } => {
                    for inner in body {
                        match self.exec_stmt(inner).await? {
                            Completion::Normal => {}
                            other => return Ok(other),
                        }
                    }
                    Ok(Completion::Normal)
                }

                Stmt::Declare { declarators, .. } => {
                    for declarator in declarators {
                        let value = match &declarator.init {
                            Some(init) => self.eval_expr(init).await?,
                            None => Val::Undefined,
                        };
                        // Re-running a declaration (inside a loop) overwrites.
                        self.locals.insert(declarator.name.clone(), value);
                    }
                    Ok(Completion::Normal)
                }

                Stmt::Assign {
                    var, path, value, ..
                } => {
                    let value = self.eval_expr(value).await?;
                    if path.is_empty() {
                        self.assign_var(var, value)?;
                    } else {
                        let mut keys = Vec::with_capacity(path.len());
                        for access in path {
                            keys.push(match access {
                                MemberAccess::Prop { property, .. } => property.clone(),
                                MemberAccess::Index { expr, .. } => {
                                    property_key(&self.eval_expr(expr).await?)
                                }
                            });
                        }
                        self.assign_path(var, &keys, value)?;
                    }
                    Ok(Completion::Normal)
                }

                Stmt::Destructure {
                    bindings, value, ..
                } => {
                    let value = self.eval_expr(value).await?;
                    if value.is_nullish() {
                        return Err(self.throw(
                            TYPE_ERROR,
                            format!("cannot destructure {}", value.type_name()),
                        ));
                    }
                    for binding in bindings {
                        self.assign_var(&binding.name, value.get_property(&binding.key))?;
                    }
                    Ok(Completion::Normal)
                }

                Stmt::If {
                    test,
                    then_s,
                    else_s,
                    ..
                } => {
                    if self.eval_expr(test).await?.is_truthy() {
                        self.exec_stmt(then_s).await
                    } else if let Some(else_s) = else_s {
                        self.exec_stmt(else_s).await
                    } else {
                        Ok(Completion::Normal)
                    }
                }

                Stmt::While { test, body, .. } => {
                    loop {
                        if !self.eval_expr(test).await?.is_truthy() {
                            break;
                        }
                        match self.exec_stmt(body).await? {
                            Completion::Break => break,
                            Completion::Normal | Completion::Continue => {}
                        }
                        self.rearm_hook();
                    }
                    Ok(Completion::Normal)
                }

                Stmt::ForOf {
                    binding,
                    iterable,
                    body,
                    ..
                } => {
                    let items = match self.eval_expr(iterable).await? {
                        Val::List(items) => items,
                        Val::Str(s) => s.chars().map(|c| Val::Str(c.to_string())).collect(),
                        other => {
                            return Err(self.throw(
                                TYPE_ERROR,
                                format!("{} is not iterable", other.type_name()),
                            ))
                        }
                    };
                    for item in items {
                        self.locals.insert(binding.clone(), item);
                        match self.exec_stmt(body).await? {
                            Completion::Break => break,
                            Completion::Normal | Completion::Continue => {}
                        }
                        self.rearm_hook();
                    }
                    Ok(Completion::Normal)
                }

                Stmt::Try {
                    body,
                    catch_var,
                    catch_body,
                    ..
                } => match self.exec_stmt(body).await {
                    Err(Abrupt::Throw(error)) => {
                        self.locals.insert(catch_var.clone(), error);
                        self.exec_stmt(catch_body).await
                    }
                    other => other,
                },

                Stmt::Expr { expr, .. } => {
                    self.eval_expr(expr).await?;
                    Ok(Completion::Normal)
                }

                Stmt::Break { .. } => Ok(Completion::Break),
                Stmt::Continue { .. } => Ok(Completion::Continue),
                Stmt::Empty { .. } => Ok(Completion::Normal),
            }
        })
    }

    /// Assign to an existing variable: locals first, then application globals.
    fn assign_var(&mut self, name: &str, value: Val) -> Result<(), Abrupt> {
        if let Some(slot) = self.locals.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        if let Some(slot) = self.globals.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        Err(self.throw(REFERENCE_ERROR, format!("{} is not defined", name)))
    }

    fn assign_path(&mut self, name: &str, keys: &[String], value: Val) -> Result<(), Abrupt> {
        let target = match self.locals.get_mut(name) {
            Some(slot) => Some(slot),
            None => self.globals.get_mut(name),
        };
        let result = match target {
            Some(target) => set_path(target, keys, value),
            None => return Err(self.throw(REFERENCE_ERROR, format!("{} is not defined", name))),
        };
        result.map_err(|message| self.throw(TYPE_ERROR, message))
    }
}

/// Property name for a computed key.
pub(crate) fn property_key(key: &Val) -> String {
    match key {
        Val::Num(n) => format_number(*n),
        other => other.to_display(),
    }
}

fn set_path(target: &mut Val, keys: &[String], value: Val) -> Result<(), String> {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Val::Obj(map) => {
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return Ok(());
            }
            match map.get_mut(key) {
                Some(child) => set_path(child, rest, value),
                None => Err(format!("cannot set properties of undefined (reading '{}')", key)),
            }
        }
        Val::List(items) => {
            let index: usize = key
                .parse()
                .map_err(|_| format!("invalid list index '{}'", key))?;
            if index >= items.len() {
                if !rest.is_empty() {
                    return Err(format!("cannot set properties of undefined (reading '{}')", key));
                }
                items.resize(index + 1, Val::Undefined);
            }
            set_path(&mut items[index], rest, value)
        }
        other => Err(format!(
            "cannot set property '{}' of {}",
            key,
            other.type_name()
        )),
    }
}
