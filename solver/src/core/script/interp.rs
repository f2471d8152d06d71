//! Tree-walking evaluator for parsed verification scripts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::script::ast::{CmpOp, Expr, FStringPart, ImportNames, Stmt, StmtKind, Target, UnaryOp};
use crate::core::script::builtins::call_builtin;
use crate::core::script::error::{ScriptError, ScriptResult, type_error};
use crate::core::script::expr::{RelOp, Relation, Symbolic};
use crate::core::script::parser::parse_expression;
use crate::core::script::toolkit::{
    MATH_EXPORTS, SYMPY_EXPORTS, call_method, call_toolkit, get_attribute, module_attr,
    normalize_index, sympy_attr,
};
use crate::core::script::value::{
    Builtin, Module, UserFunction, Value, binary_op, values_equal, values_identical,
};

const MAX_CALL_DEPTH: usize = 50;
const MAX_OUTPUT_LINES: usize = 200;

#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Value>,
    /// Comprehension scopes can read the enclosing scope; function scopes cannot.
    transparent: bool,
}

#[derive(Debug)]
pub struct Interpreter {
    frames: Vec<Frame>,
    steps: u64,
    step_budget: u64,
    depth: usize,
    line: usize,
    output: Vec<String>,
    auto_symbols: bool,
}

fn resolve_module(name: &str) -> ScriptResult<Module> {
    match name {
        "sympy" => Ok(Module::Sympy),
        "math" => Ok(Module::Math),
        other => Err(ScriptError::Import(other.to_string())),
    }
}

impl Interpreter {
    /// Fresh interpreter with `sp` pre-bound to the symbolic toolkit.
    pub fn new(step_budget: u64) -> Self {
        let mut globals = Frame::default();
        globals
            .vars
            .insert("sp".to_string(), Value::Module(Module::Sympy));
        Self {
            frames: vec![globals],
            steps: 0,
            step_budget,
            depth: 0,
            line: 0,
            output: Vec::new(),
            auto_symbols: false,
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> ScriptResult<()> {
        match self.exec_block(program)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(ScriptError::Syntax {
                line: self.line,
                message: "'return' outside function".to_string(),
            }),
            Flow::Break | Flow::Continue => Err(ScriptError::Syntax {
                line: self.line,
                message: "'break' or 'continue' outside loop".to_string(),
            }),
        }
    }

    /// Module-level binding after the script ran.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.frames.first().and_then(|frame| frame.vars.get(name))
    }

    /// Lines written by `print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn print(&mut self, line: String) {
        if self.output.len() < MAX_OUTPUT_LINES {
            self.output.push(line);
        }
    }

    pub(crate) fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.step_budget {
            return Err(ScriptError::Budget(self.step_budget));
        }
        Ok(())
    }

    /// Evaluate a `sympify` string: unknown names become symbols and script
    /// variables are not visible.
    pub(crate) fn eval_sympify(&mut self, source: &str) -> ScriptResult<Value> {
        let expr = parse_expression(&source.replace('^', "**"))?;
        let saved = std::mem::replace(&mut self.auto_symbols, true);
        let result = self.eval(&expr);
        self.auto_symbols = saved;
        match result? {
            value @ (Value::Int(_) | Value::Float(_)) => Ok(Value::Expr(value.to_symbolic()?)),
            value => Ok(value),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if self.auto_symbols {
            return Ok(sympy_attr(name).unwrap_or_else(|| Value::Expr(Symbolic::symbol(name))));
        }
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.vars.get(name) {
                return Ok(value.clone());
            }
            if !frame.transparent {
                break;
            }
        }
        if let Some(value) = self.global(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::ALL.iter().find(|b| b.name() == name) {
            return Ok(Value::Builtin(*builtin));
        }
        Err(ScriptError::Name(name.to_string()))
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        self.tick()?;
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.target_value(target)?;
                let rhs = self.eval(value)?;
                let updated = binary_op(*op, &current, &rhs)?;
                self.assign(target, updated)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.truthy()? {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For { target, iter, body } => {
                let items = self.eval(iter)?.iterate()?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let defaults = def
                    .params
                    .iter()
                    .map(|p| p.default.as_ref().map(|d| self.eval(d)).transpose())
                    .collect::<ScriptResult<Vec<_>>>()?;
                let function = UserFunction {
                    def: Rc::clone(def),
                    defaults,
                };
                self.set(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import { module, alias } => {
                let resolved = resolve_module(module)?;
                self.set(alias.as_deref().unwrap_or(module), Value::Module(resolved));
            }
            StmtKind::ImportFrom { module, names } => {
                let resolved = resolve_module(module)?;
                match names {
                    ImportNames::Star => {
                        let exports: &[&str] = match resolved {
                            Module::Sympy => &SYMPY_EXPORTS,
                            Module::Math => &MATH_EXPORTS,
                        };
                        for name in exports {
                            let value = module_attr(resolved, name)?;
                            self.set(name, value);
                        }
                    }
                    ImportNames::Names(names) => {
                        for (name, alias) in names {
                            let value = module_attr(resolved, name)?;
                            self.set(alias.as_deref().unwrap_or(name), value);
                        }
                    }
                }
            }
            StmtKind::Assert { test, message } => {
                if !self.eval(test)?.truthy()? {
                    let message = match message {
                        Some(expr) => self.eval(expr)?.to_string(),
                        None => String::new(),
                    };
                    return Err(ScriptError::Assertion(message));
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                self.set(name, value);
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = value.iterate()?;
                if items.len() != targets.len() {
                    return Err(ScriptError::Value(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Target::Subscript(container, index) => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                match &container {
                    Value::List(items) => {
                        let len = items.borrow().len();
                        let i = normalize_index(&index, len)?;
                        items.borrow_mut()[i] = value;
                        Ok(())
                    }
                    Value::Dict(pairs) => {
                        let mut pairs = pairs.borrow_mut();
                        match pairs.iter_mut().find(|(k, _)| values_equal(k, &index)) {
                            Some(slot) => slot.1 = value,
                            None => pairs.push((index, value)),
                        }
                        Ok(())
                    }
                    other => Err(type_error(format!(
                        "'{}' object does not support item assignment",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn target_value(&mut self, target: &Target) -> ScriptResult<Value> {
        match target {
            Target::Name(name) => self.lookup(name),
            Target::Subscript(container, index) => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                subscript(&container, &index)
            }
            Target::Tuple(_) => Err(type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Name(name) => self.lookup(name),
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Lit(text) => out.push_str(text),
                        FStringPart::Expr(expr) => out.push_str(&self.eval(expr)?.to_string()),
                    }
                }
                Ok(Value::str(out))
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    match pairs.iter_mut().find(|(k, _)| values_equal(k, &key)) {
                        Some(slot) => slot.1 = value,
                        None => pairs.push((key, value)),
                    }
                }
                Ok(Value::Dict(Rc::new(RefCell::new(pairs))))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary_op(*op, &lhs, &rhs)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if !lhs.truthy()? {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy()? {
                    return Ok(lhs);
                }
                self.eval(rhs)
            }
            Expr::Compare(first, chain) => {
                let mut left = self.eval(first)?;
                let mut result = Value::Bool(true);
                for (i, (op, right)) in chain.iter().enumerate() {
                    let right = self.eval(right)?;
                    result = compare(*op, &left, &right)?;
                    if i + 1 < chain.len() && !result.truthy()? {
                        return Ok(result);
                    }
                    left = right;
                }
                Ok(result)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let args = self.eval_all(args)?;
                let mut named = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    named.push((name.clone(), self.eval(value)?));
                }
                self.call(callee, args, named)
            }
            Expr::Attribute(object, attr) => {
                let object = self.eval(object)?;
                get_attribute(&object, attr)
            }
            Expr::Subscript(container, index) => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                subscript(&container, &index)
            }
            Expr::Comprehension {
                element,
                target,
                iter,
                conditions,
            } => {
                let items = self.eval(iter)?.iterate()?;
                self.frames.push(Frame {
                    vars: HashMap::new(),
                    transparent: true,
                });
                let result = self.comprehension(element, target, items, conditions);
                self.frames.pop();
                result
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> ScriptResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn comprehension(
        &mut self,
        element: &Expr,
        target: &Target,
        items: Vec<Value>,
        conditions: &[Expr],
    ) -> ScriptResult<Value> {
        let mut out = Vec::new();
        'items: for item in items {
            self.tick()?;
            self.assign(target, item)?;
            for condition in conditions {
                if !self.eval(condition)?.truthy()? {
                    continue 'items;
                }
            }
            out.push(self.eval(element)?);
        }
        Ok(Value::list(out))
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Builtin(builtin) => call_builtin(self, builtin, args, kwargs),
            Value::Toolkit(function) => call_toolkit(self, function, args, kwargs),
            Value::Method(receiver, name) => call_method(self, &receiver, &name, args, kwargs),
            Value::Function(function) => self.call_function(&function, args, kwargs),
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        let def = &function.def;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::Recursion);
        }
        if args.len() > def.params.len() {
            return Err(type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        let mut vars: HashMap<String, Value> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| (param.name.clone(), arg))
            .collect();
        for (key, value) in kwargs {
            if !def.params.iter().any(|p| p.name == key) {
                return Err(type_error(format!(
                    "{}() got an unexpected keyword argument '{key}'",
                    def.name
                )));
            }
            if vars.contains_key(&key) {
                return Err(type_error(format!(
                    "{}() got multiple values for argument '{key}'",
                    def.name
                )));
            }
            vars.insert(key, value);
        }
        for (param, default) in def.params.iter().zip(&function.defaults) {
            if vars.contains_key(&param.name) {
                continue;
            }
            match default {
                Some(value) => {
                    vars.insert(param.name.clone(), value.clone());
                }
                None => {
                    return Err(type_error(format!(
                        "{}() missing required argument: '{}'",
                        def.name, param.name
                    )));
                }
            }
        }
        self.frames.push(Frame {
            vars,
            transparent: false,
        });
        self.depth += 1;
        let result = self.exec_block(&def.body);
        self.depth -= 1;
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }
}

fn unary(op: UnaryOp, value: &Value) -> ScriptResult<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy()?)),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map_or(Value::Float(-(*i as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(*b))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Expr(e)) => Ok(Value::Expr(Symbolic::neg(e.clone()))),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_) | Value::Expr(_))) => Ok(v.clone()),
        (op, v) => Err(type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    let ordering = match op {
        CmpOp::Eq => return Ok(Value::Bool(values_equal(left, right))),
        CmpOp::Ne => return Ok(Value::Bool(!values_equal(left, right))),
        CmpOp::Is => return Ok(Value::Bool(values_identical(left, right))),
        CmpOp::IsNot => return Ok(Value::Bool(!values_identical(left, right))),
        CmpOp::In => return contains(right, left).map(Value::Bool),
        CmpOp::NotIn => return contains(right, left).map(|found| Value::Bool(!found)),
        CmpOp::Lt => RelOp::Lt,
        CmpOp::Le => RelOp::Le,
        CmpOp::Gt => RelOp::Gt,
        CmpOp::Ge => RelOp::Ge,
    };
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let verdict = match ordering {
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Gt => a > b,
            _ => a >= b,
        };
        return Ok(Value::Bool(verdict));
    }
    if left.is_symbolic() || right.is_symbolic() {
        let relation = Relation::build(ordering, left.to_symbolic()?, right.to_symbolic()?);
        return Ok(match relation {
            Ok(verdict) => Value::Bool(verdict),
            Err(relation) => Value::Rel(relation),
        });
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Bool(match ordering {
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Gt => a > b,
            _ => a >= b,
        })),
        _ => Err(type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_ref())),
        (Value::Dict(pairs), _) => Ok(pairs.borrow().iter().any(|(k, _)| values_equal(k, item))),
        (Value::List(_) | Value::Tuple(_), _) => {
            Ok(container.iterate()?.iter().any(|v| values_equal(v, item)))
        }
        (other, _) => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn subscript(container: &Value, index: &Value) -> ScriptResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[normalize_index(index, items.len())?].clone())
        }
        Value::Tuple(items) => Ok(items[normalize_index(index, items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let c = chars[normalize_index(index, chars.len())?];
            Ok(Value::str(c.to_string()))
        }
        Value::Dict(pairs) => pairs
            .borrow()
            .iter()
            .find(|(k, _)| values_equal(k, index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ScriptError::Value(format!("KeyError: {}", index.repr()))),
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::parser::parse_program;

    fn run(source: &str) -> Interpreter {
        let program = parse_program(source).expect("parse");
        let mut interp = Interpreter::new(100_000);
        interp.run(&program).expect("run");
        interp
    }

    fn global_str(interp: &Interpreter, name: &str) -> String {
        interp.global(name).expect("bound").to_string()
    }

    #[test]
    fn loops_functions_and_comprehensions() {
        let interp = run(
            "def square(n, offset=0):\n    return n * n + offset\n\
             total = 0\n\
             for i in range(5):\n    if i == 3:\n        continue\n    total += square(i)\n\
             squares = [square(v, offset=1) for v in range(3) if v > 0]\n",
        );
        assert_eq!(global_str(&interp, "total"), "21");
        assert_eq!(global_str(&interp, "squares"), "[2, 5]");
    }

    #[test]
    fn sp_is_prebound_and_symbols_unpack() {
        let interp = run("x, y = sp.symbols('x y')\nexpr = (x + y)**2\nexpanded = sp.expand(expr)\n");
        assert_eq!(global_str(&interp, "expanded"), "x**2 + 2*x*y + y**2");
    }

    #[test]
    fn print_output_is_captured() {
        let interp = run("x = sp.Symbol('x')\nprint('d/dx =', sp.diff(x**3, x))\n");
        assert_eq!(interp.output(), ["d/dx = 3*x**2"]);
    }

    #[test]
    fn sympify_creates_symbols_without_seeing_script_variables() {
        let interp = run("x = 5\nexpr = sp.sympify('x^2 + 1')\nis_poly = expr == sp.Symbol('x')**2 + 1\n");
        assert_eq!(global_str(&interp, "is_poly"), "True");
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let program = parse_program("def f(n):\n    return f(n + 1)\nf(0)\n").expect("parse");
        let mut interp = Interpreter::new(100_000);
        assert_eq!(interp.run(&program), Err(ScriptError::Recursion));
    }

    #[test]
    fn step_budget_stops_long_loops() {
        let program = parse_program("t = 0\nfor i in range(50000):\n    t += i\n").expect("parse");
        let mut interp = Interpreter::new(1_000);
        assert_eq!(interp.run(&program), Err(ScriptError::Budget(1_000)));
    }

    #[test]
    fn symbolic_inequalities_stay_unresolved() {
        let program = parse_program("x = sp.Symbol('x')\nif x > 0:\n    pass\n").expect("parse");
        let mut interp = Interpreter::new(1_000);
        let err = interp.run(&program).expect_err("relational truth value");
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn chained_comparison_and_membership() {
        let interp = run("a = 1 < 2 <= 2\nb = 3 in [1, 2, 3]\nc = 'ab' not in 'xyz'\n");
        assert_eq!(global_str(&interp, "a"), "True");
        assert_eq!(global_str(&interp, "b"), "True");
        assert_eq!(global_str(&interp, "c"), "True");
    }
}
