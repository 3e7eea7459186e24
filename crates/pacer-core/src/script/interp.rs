//! Tree-walking evaluator.

use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::Script;
use super::ast::{BinOp, Expr, FunctionDef, Stmt, StmtKind, Target};
use super::builtins::{self, Host};
use super::error::{ErrorKind, ScriptError};
use super::ops;
use super::value::{Builtin, Fault, ListMethod, ListRef, Module, Value};
use crate::capability::Capabilities;
use crate::execute::KillSwitch;

/// Maximum nesting of user function calls.
pub const MAX_CALL_DEPTH: usize = 64;

/// Maximum nesting of statements and expressions being evaluated at once,
/// across all call frames.
pub const MAX_EVAL_DEPTH: usize = 1000;

/// Modules bound in every fresh global namespace.
const PRELUDE: [Module; 4] = [Module::Hal, Module::Gui, Module::Console, Module::Time];

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Default)]
struct Frame {
    locals: FxHashMap<String, Value>,
    globals: FxHashSet<String>,
}

/// Interpreter holding the global namespace of one program.
///
/// Globals persist across [`Interpreter::run`] calls, so names bound by the
/// setup phase are visible to every loop iteration.
#[derive(Debug)]
pub struct Interpreter {
    globals: FxHashMap<String, Value>,
    frames: Vec<Frame>,
    depth: usize,
    kill: KillSwitch,
}

impl Interpreter {
    /// Create an interpreter with the prelude bound.
    pub fn new(kill: KillSwitch) -> Self {
        let globals = PRELUDE
            .iter()
            .map(|module| (module.name().to_string(), Value::Module(*module)))
            .collect();
        Self {
            globals,
            frames: Vec::new(),
            depth: 0,
            kill,
        }
    }

    /// Kill switch checked before every statement.
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill
    }

    /// Look up a global binding.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Run a compiled script against `caps`.
    pub fn run(&mut self, script: &Script, caps: &mut dyn Capabilities) -> Result<(), ScriptError> {
        self.frames.clear();
        self.depth = 0;
        self.exec_block(script.statements(), caps)?;
        Ok(())
    }

    fn check_kill(&self, line: usize) -> Result<(), ScriptError> {
        if self.kill.is_killed() {
            return Err(ScriptError::interrupted(line));
        }
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt], caps: &mut dyn Capabilities) -> Result<Flow, ScriptError> {
        for stmt in body {
            match self.exec(stmt, caps)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn descend(&mut self, line: usize) -> Result<(), ScriptError> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(ScriptError::new(
                line,
                ErrorKind::Recursion,
                "maximum recursion depth exceeded",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt, caps: &mut dyn Capabilities) -> Result<Flow, ScriptError> {
        self.descend(stmt.line)?;
        let flow = self.exec_stmt(stmt, caps);
        self.depth -= 1;
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt, caps: &mut dyn Capabilities) -> Result<Flow, ScriptError> {
        let line = stmt.line;
        self.check_kill(line)?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, line, caps)?;
            }
            StmtKind::Assign(target, expr) => {
                let value = self.eval(expr, line, caps)?;
                self.assign(target, value, line, caps)?;
            }
            StmtKind::AugAssign(target, op, expr) => {
                let current = match target {
                    Target::Name(name) => self.lookup(name, line)?,
                    Target::Index(base, index) => {
                        let base = self.eval(base, line, caps)?;
                        let index = self.eval(index, line, caps)?;
                        let current = get_item(&base, &index).map_err(|f| f.at(line))?;
                        let rhs = self.eval(expr, line, caps)?;
                        let updated = ops::binary(*op, &current, &rhs).map_err(|f| f.at(line))?;
                        set_item(&base, &index, updated).map_err(|f| f.at(line))?;
                        return Ok(Flow::Normal);
                    }
                };
                let rhs = self.eval(expr, line, caps)?;
                let updated = match (&current, &rhs) {
                    // `+=` on a list extends it in place.
                    (Value::List(items), Value::List(extra)) if *op == BinOp::Add => {
                        let extra = extra.borrow().clone();
                        items.borrow_mut().extend(extra);
                        current.clone()
                    }
                    _ => ops::binary(*op, &current, &rhs).map_err(|f| f.at(line))?,
                };
                self.assign(target, updated, line, caps)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test, line, caps)?.truthy() {
                        return self.exec_block(body, caps);
                    }
                }
                return self.exec_block(orelse, caps);
            }
            StmtKind::While(test, body) => loop {
                self.check_kill(line)?;
                if !self.eval(test, line, caps)?.truthy() {
                    break;
                }
                match self.exec_block(body, caps)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            },
            StmtKind::For(name, iterable, body) => {
                let iterable = self.eval(iterable, line, caps)?;
                return self.exec_for(name, iterable, body, line, caps);
            }
            StmtKind::Def(def) => {
                self.bind(&def.name, Value::Function(Arc::clone(def)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, line, caps)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Import(modules) => {
                for (module, binding) in modules {
                    let resolved = Module::from_import(module).ok_or_else(|| {
                        ScriptError::new(line, ErrorKind::Import, format!("No module named '{module}'"))
                    })?;
                    self.bind(binding, Value::Module(resolved));
                }
            }
            StmtKind::FromImport(module, names) => {
                let resolved = Module::from_import(module).ok_or_else(|| {
                    ScriptError::new(line, ErrorKind::Import, format!("No module named '{module}'"))
                })?;
                for (name, binding) in names {
                    let value = resolved.attr(name).ok_or_else(|| {
                        ScriptError::new(
                            line,
                            ErrorKind::Import,
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    })?;
                    self.bind(binding, value);
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }

        Ok(Flow::Normal)
    }

    fn exec_for(
        &mut self,
        name: &str,
        iterable: Value,
        body: &[Stmt],
        line: usize,
        caps: &mut dyn Capabilities,
    ) -> Result<Flow, ScriptError> {
        let mut run_body = |this: &mut Self, item: Value| -> Result<Option<Flow>, ScriptError> {
            this.check_kill(line)?;
            this.bind(name, item);
            match this.exec_block(body, caps)? {
                Flow::Break => Ok(Some(Flow::Normal)),
                Flow::Normal | Flow::Continue => Ok(None),
                flow @ Flow::Return(_) => Ok(Some(flow)),
            }
        };

        match iterable {
            Value::Range(start, stop, step) => {
                let mut current = start;
                while (step > 0 && current < stop) || (step < 0 && current > stop) {
                    if let Some(flow) = run_body(self, Value::Int(current))? {
                        return Ok(flow);
                    }
                    match current.checked_add(step) {
                        Some(next) => current = next,
                        None => break,
                    }
                }
            }
            Value::List(items) => {
                // Iterate a snapshot; mutation inside the body is not observed.
                let snapshot = items.borrow().clone();
                for item in snapshot {
                    if let Some(flow) = run_body(self, item)? {
                        return Ok(flow);
                    }
                }
            }
            Value::Str(text) => {
                for ch in text.chars() {
                    let mut buf = [0u8; 4];
                    if let Some(flow) = run_body(self, Value::str(ch.encode_utf8(&mut buf)))? {
                        return Ok(flow);
                    }
                }
            }
            other => {
                return Err(ScriptError::new(
                    line,
                    ErrorKind::Type,
                    format!("'{}' object is not iterable", other.type_name()),
                ));
            }
        }

        Ok(Flow::Normal)
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<Value, ScriptError> {
        if let Some(frame) = self.frames.last()
            && !frame.globals.contains(name)
            && let Some(value) = frame.locals.get(name)
        {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::global(name) {
            return Ok(Value::Builtin(builtin));
        }
        Err(ScriptError::new(
            line,
            ErrorKind::Name,
            format!("name '{name}' is not defined"),
        ))
    }

    fn assign(
        &mut self,
        target: &Target,
        value: Value,
        line: usize,
        caps: &mut dyn Capabilities,
    ) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            Target::Index(base, index) => {
                let base = self.eval(base, line, caps)?;
                let index = self.eval(index, line, caps)?;
                set_item(&base, &index, value).map_err(|f| f.at(line))
            }
        }
    }

    fn eval(&mut self, expr: &Expr, line: usize, caps: &mut dyn Capabilities) -> Result<Value, ScriptError> {
        self.descend(line)?;
        let value = self.eval_expr(expr, line, caps);
        self.depth -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr, line: usize, caps: &mut dyn Capabilities) -> Result<Value, ScriptError> {
        let value = match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::str(s),
            Expr::Name(name) => self.lookup(name, line)?,
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, line, caps)?);
                }
                Value::list(values)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand, line, caps)?;
                ops::unary(*op, &operand).map_err(|f| f.at(line))?
            }
            Expr::Binary(left, op, right) => {
                let left = self.eval(left, line, caps)?;
                let right = self.eval(right, line, caps)?;
                ops::binary(*op, &left, &right).map_err(|f| f.at(line))?
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, line, caps)?;
                for (op, operand) in rest {
                    let right = self.eval(operand, line, caps)?;
                    if !ops::compare(*op, &left, &right).map_err(|f| f.at(line))? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::And(left, right) => {
                let left = self.eval(left, line, caps)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(right, line, caps)?
            }
            Expr::Or(left, right) => {
                let left = self.eval(left, line, caps)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(right, line, caps)?
            }
            Expr::IfElse { test, body, orelse } => {
                if self.eval(test, line, caps)?.truthy() {
                    self.eval(body, line, caps)?
                } else {
                    self.eval(orelse, line, caps)?
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, line, caps)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, line, caps)?);
                }
                self.call(callee, values, line, caps)?
            }
            Expr::Attr(base, name) => {
                let base = self.eval(base, line, caps)?;
                get_attr(&base, name).map_err(|f| f.at(line))?
            }
            Expr::Index(base, index) => {
                let base = self.eval(base, line, caps)?;
                let index = self.eval(index, line, caps)?;
                get_item(&base, &index).map_err(|f| f.at(line))?
            }
        };
        Ok(value)
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        line: usize,
        caps: &mut dyn Capabilities,
    ) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(def) => self.call_function(&def, args, line, caps),
            Value::Builtin(builtin) => {
                let mut host = Host {
                    caps: &mut *caps,
                    kill: &self.kill,
                };
                builtins::call(builtin, args, &mut host).map_err(|f| f.at(line))
            }
            Value::Method(items, method) => call_method(&items, method, args).map_err(|f| f.at(line)),
            other => Err(ScriptError::new(
                line,
                ErrorKind::Type,
                format!("'{}' object is not callable", other.type_name()),
            )),
        }
    }

    fn call_function(
        &mut self,
        def: &Arc<FunctionDef>,
        args: Vec<Value>,
        line: usize,
        caps: &mut dyn Capabilities,
    ) -> Result<Value, ScriptError> {
        if args.len() != def.params.len() {
            return Err(ScriptError::new(
                line,
                ErrorKind::Type,
                format!(
                    "{}() takes {} positional argument(s) but {} were given",
                    def.name,
                    def.params.len(),
                    args.len()
                ),
            ));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ScriptError::new(
                line,
                ErrorKind::Recursion,
                "maximum recursion depth exceeded",
            ));
        }

        let mut frame = Frame::default();
        for (param, arg) in def.params.iter().zip(args) {
            frame.locals.insert(param.clone(), arg);
        }
        self.frames.push(frame);
        let result = self.exec_block(&def.body, caps);
        self.frames.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

fn get_attr(base: &Value, name: &str) -> Result<Value, Fault> {
    let found = match (base, name) {
        (Value::Module(module), _) => module.attr(name),
        (Value::List(items), "append") => Some(Value::Method(Rc::clone(items), ListMethod::Append)),
        (Value::List(items), "pop") => Some(Value::Method(Rc::clone(items), ListMethod::Pop)),
        (Value::Image(image), "shape") => {
            let (h, w, c) = image.shape();
            Some(Value::list(vec![
                Value::Int(h as i64),
                Value::Int(w as i64),
                Value::Int(c as i64),
            ]))
        }
        (Value::Image(image), "width") => Some(Value::Int(i64::from(image.width))),
        (Value::Image(image), "height") => Some(Value::Int(i64::from(image.height))),
        _ => None,
    };

    found.ok_or_else(|| {
        let message = match base {
            Value::Module(module) => format!("module '{}' has no attribute '{name}'", module.name()),
            other => format!("'{}' object has no attribute '{name}'", other.type_name()),
        };
        Fault::new(ErrorKind::Attribute, message)
    })
}

fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize, Fault> {
    let raw = index.as_i64().ok_or_else(|| {
        Fault::type_error(format!(
            "{what} indices must be integers, not '{}'",
            index.type_name()
        ))
    })?;
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if raw < 0 { raw + len } else { raw };
    if resolved < 0 || resolved >= len {
        return Err(Fault::new(
            ErrorKind::Index,
            format!("{what} index out of range"),
        ));
    }
    usize::try_from(resolved).map_err(|_| Fault::new(ErrorKind::Index, format!("{what} index out of range")))
}

fn get_item(base: &Value, index: &Value) -> Result<Value, Fault> {
    match base {
        Value::List(items) => {
            let items = items.borrow();
            let position = normalize_index(index, items.len(), "list")?;
            Ok(items[position].clone())
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let position = normalize_index(index, chars.len(), "string")?;
            Ok(Value::str(&chars[position].to_string()))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_item(base: &Value, index: &Value, value: Value) -> Result<(), Fault> {
    match base {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let position = normalize_index(index, items.len(), "list")?;
            items[position] = value;
            Ok(())
        }
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn call_method(items: &ListRef, method: ListMethod, args: Vec<Value>) -> Result<Value, Fault> {
    match method {
        ListMethod::Append => {
            let [item]: [Value; 1] = args
                .try_into()
                .map_err(|_| Fault::type_error("append() takes exactly one argument"))?;
            items.borrow_mut().push(item);
            Ok(Value::None)
        }
        ListMethod::Pop => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(Fault::new(ErrorKind::Index, "pop from empty list"));
            }
            let position = match args.as_slice() {
                [] => items.len() - 1,
                [index] => normalize_index(index, items.len(), "pop")?,
                _ => return Err(Fault::type_error("pop() takes at most 1 argument")),
            };
            Ok(items.remove(position))
        }
    }
}
