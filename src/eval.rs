// ABOUTME: Tree-walking evaluator executing Slate ASTs over a scope chain

use crate::ast::{BinaryOp, LambdaDef, Node};
use crate::error::{Control, RuntimeError};
use crate::scope::Scope;
use crate::token::Literal;
use crate::value::{ClassObject, InstanceObject, Value, SUPER_INIT};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub type EvalResult = Result<Control, RuntimeError>;

/// Extracts the plain value of a sub-evaluation; any control-flow signal is
/// propagated to the caller untouched.
macro_rules! eval_value {
    ($outcome:expr) => {
        match $outcome? {
            Control::Value(value) => value,
            signal => return Ok(signal),
        }
    };
}

/// Walks ASTs over a scope chain. `print` output goes to the injected sink,
/// which is stdout in the driver and a capture buffer in tests.
pub struct Interpreter {
    globals: Rc<Scope>,
    out: RefCell<Box<dyn Write>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        Interpreter {
            globals: Scope::global(),
            out: RefCell::new(out),
        }
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    /// Evaluates top-level statements in order. The first runtime error
    /// halts the remaining statements; bindings established before the
    /// failure survive.
    pub fn run(&self, nodes: &[Node]) -> Result<(), RuntimeError> {
        let globals = self.globals.clone();
        for node in nodes {
            self.eval(node, &globals)?;
        }
        Ok(())
    }

    pub fn eval(&self, node: &Node, scope: &Rc<Scope>) -> EvalResult {
        match node {
            Node::Literal(literal) => Ok(Control::Value(literal_value(literal))),
            Node::Identifier(name) => scope
                .lookup(name)
                .map(Control::Value)
                .ok_or_else(|| RuntimeError::UnresolvedIdentifier(name.clone())),

            Node::Block(nodes) => self.eval_block(nodes, scope),
            Node::ListExpression(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval_value!(self.eval(item, scope)));
                }
                Ok(Control::Value(Value::list(values)))
            }
            Node::SuperStatement(args) => self.eval_super(args, scope),

            Node::VariableDeclaration(name) => {
                scope.declare_variable(name, Value::Nil)?;
                Ok(Control::Value(Value::Nil))
            }
            Node::VariableInstantiation { name, init } => {
                let value = eval_value!(self.eval(init, scope));
                scope.declare_variable(name, value)?;
                Ok(Control::Value(Value::Nil))
            }
            Node::ConstantInstantiation { name, init } => {
                let value = eval_value!(self.eval(init, scope));
                scope.declare_constant(name, value)?;
                Ok(Control::Value(Value::Nil))
            }

            Node::VariableAssignment { name, rhs } => {
                let value = eval_value!(self.eval(rhs, scope));
                scope.assign(name, value.clone())?;
                Ok(Control::Value(value))
            }
            Node::SubscriptAssignment { list, index, rhs } => {
                self.eval_subscript_assignment(list, index, rhs, scope)
            }
            Node::MemberAssignment {
                receiver,
                member,
                rhs,
            } => {
                let target = eval_value!(self.eval(receiver, scope));
                let Value::Instance(instance) = target else {
                    return Err(RuntimeError::type_error(
                        format!("member '{}'", member),
                        "an instance",
                        &target,
                    ));
                };
                let value = eval_value!(self.eval(rhs, scope));
                instance
                    .borrow_mut()
                    .fields
                    .insert(member.clone(), value.clone());
                Ok(Control::Value(value))
            }

            Node::If {
                condition,
                then_block,
                else_block,
            } => {
                let chosen = eval_value!(self.eval(condition, scope));
                let Value::Bool(chosen) = chosen else {
                    return Err(RuntimeError::type_error("if condition", "boolean", &chosen));
                };
                if chosen {
                    self.eval(then_block, scope)
                } else if let Some(else_block) = else_block {
                    self.eval(else_block, scope)
                } else {
                    Ok(Control::Value(Value::Nil))
                }
            }
            Node::While { condition, body } => self.eval_while(condition, body, scope),
            Node::For {
                binding,
                counter,
                iterable,
                body,
            } => self.eval_for(binding, counter.as_deref(), iterable, body, scope),

            Node::Break => Ok(Control::Break),
            Node::Continue => Ok(Control::Continue),
            Node::Return(expr) => {
                let value = match expr {
                    Some(expr) => eval_value!(self.eval(expr, scope)),
                    None => Value::Nil,
                };
                Ok(Control::Return(value))
            }
            Node::Print(expr) => {
                let value = eval_value!(self.eval(expr, scope));
                writeln!(self.out.borrow_mut(), "{}", value)
                    .map_err(|e| RuntimeError::Output(e.to_string()))?;
                Ok(Control::Value(Value::Nil))
            }

            Node::Lambda(def) => Ok(Control::Value(Value::Lambda(def.clone()))),
            Node::ClassDeclaration {
                name,
                super_name,
                methods,
                class_methods,
            } => self.eval_class_declaration(name, super_name.as_deref(), methods, class_methods, scope),

            Node::MemberReference { receiver, member } => {
                let target = eval_value!(self.eval(receiver, scope));
                Ok(Control::Value(member_reference(&target, member)?))
            }
            Node::BoundMethod { .. } => Err(RuntimeError::Custom(
                "a bound method can only be called".to_string(),
            )),

            Node::Not(operand) => {
                let value = eval_value!(self.eval(operand, scope));
                let Value::Bool(b) = value else {
                    return Err(RuntimeError::type_error("operand of '!'", "boolean", &value));
                };
                Ok(Control::Value(Value::Bool(!b)))
            }
            Node::Negation(operand) => {
                let value = eval_value!(self.eval(operand, scope));
                let Value::Number(n) = value else {
                    return Err(RuntimeError::type_error("operand of '-'", "number", &value));
                };
                Ok(Control::Value(Value::Number(-n)))
            }
            Node::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, scope),
            Node::Subscript { list, index } => {
                let target = eval_value!(self.eval(list, scope));
                let Value::List(items) = target else {
                    return Err(RuntimeError::type_error("subscript target", "a list", &target));
                };
                let index = eval_value!(self.eval(index, scope));
                let index = list_index(&index, items.borrow().len())?;
                let value = items.borrow()[index].clone();
                Ok(Control::Value(value))
            }
            Node::Invocation { callee, args } => self.eval_invocation(callee, args, scope),
            Node::Range { lo, hi, inclusive } => {
                let start = eval_value!(self.eval(lo, scope));
                let end = eval_value!(self.eval(hi, scope));
                match (&start, &end) {
                    (Value::Number(_), Value::Number(_)) | (Value::Char(_), Value::Char(_)) => {
                        Ok(Control::Value(Value::Range {
                            start: Box::new(start),
                            end: Box::new(end),
                            inclusive: *inclusive,
                        }))
                    }
                    _ => Err(RuntimeError::Custom(format!(
                        "Range bounds must be two numbers or two characters, got {} and {}",
                        start.type_name(),
                        end.type_name()
                    ))),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// A block runs in a fresh child scope and yields its last value.
    fn eval_block(&self, nodes: &[Node], scope: &Rc<Scope>) -> EvalResult {
        let child = Scope::block(scope);
        let mut last = Value::Nil;
        for node in nodes {
            last = eval_value!(self.eval(node, &child));
        }
        Ok(Control::Value(last))
    }

    fn eval_while(&self, condition: &Node, body: &Node, scope: &Rc<Scope>) -> EvalResult {
        loop {
            let test = eval_value!(self.eval(condition, scope));
            let Value::Bool(test) = test else {
                return Err(RuntimeError::type_error("while condition", "boolean", &test));
            };
            if !test {
                break;
            }
            match self.eval(body, scope)? {
                Control::Break => break,
                Control::Continue | Control::Value(_) => {}
                signal @ Control::Return(_) => return Ok(signal),
            }
        }
        Ok(Control::Value(Value::Nil))
    }

    fn eval_for(
        &self,
        binding: &str,
        counter: Option<&str>,
        iterable: &Node,
        body: &Node,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let iterable = eval_value!(self.eval(iterable, scope));
        match iterable {
            Value::List(items) => self.for_over_list(binding, counter, &items, body, scope),
            Value::Str(text) => self.for_over_string(binding, counter, &text, body, scope),
            Value::Range {
                start,
                end,
                inclusive,
            } => self.for_over_range(binding, counter, &start, &end, inclusive, body, scope),
            other => Err(RuntimeError::type_error(
                "for iterable",
                "a list, string, or range",
                &other,
            )),
        }
    }

    /// Runs one loop iteration in its own scope with the element (and the
    /// optional counter) bound, and reports back how the body ended.
    fn for_iteration(
        &self,
        binding: &str,
        counter: Option<&str>,
        element: Value,
        index: usize,
        body: &Node,
        scope: &Rc<Scope>,
    ) -> Result<(Rc<Scope>, Control), RuntimeError> {
        let child = Scope::block(scope);
        child.declare_variable(binding, element)?;
        if let Some(counter) = counter {
            child.declare_variable(counter, Value::Number(index as f32))?;
        }
        let outcome = self.eval(body, &child)?;
        Ok((child, outcome))
    }

    /// List iteration is mutating: after an iteration finishes (normally or
    /// via `continue`), the loop variable's final binding is written back
    /// into the list slot. `break` leaves the current slot untouched.
    fn for_over_list(
        &self,
        binding: &str,
        counter: Option<&str>,
        items: &Rc<RefCell<Vec<Value>>>,
        body: &Node,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let mut index = 0;
        while index < items.borrow().len() {
            let element = items.borrow()[index].clone();
            let (child, outcome) =
                self.for_iteration(binding, counter, element, index, body, scope)?;
            match outcome {
                Control::Break => return Ok(Control::Value(Value::Nil)),
                signal @ Control::Return(_) => return Ok(signal),
                Control::Continue | Control::Value(_) => {}
            }
            if let Some(updated) = child.local_variable(binding) {
                let mut slots = items.borrow_mut();
                if index < slots.len() {
                    slots[index] = updated;
                }
            }
            index += 1;
        }
        Ok(Control::Value(Value::Nil))
    }

    /// Strings iterate one character per step; the source string is rebuilt
    /// from the per-iteration snapshots once the loop ends, also after a
    /// `break`.
    fn for_over_string(
        &self,
        binding: &str,
        counter: Option<&str>,
        text: &Rc<RefCell<String>>,
        body: &Node,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let chars: Vec<char> = text.borrow().chars().collect();
        let mut buffer = chars.clone();
        let mut result = Control::Value(Value::Nil);

        for (index, c) in chars.into_iter().enumerate() {
            let (child, outcome) =
                self.for_iteration(binding, counter, Value::Char(c), index, body, scope)?;
            match outcome {
                Control::Break => break,
                signal @ Control::Return(_) => {
                    result = signal;
                    break;
                }
                Control::Continue | Control::Value(_) => {}
            }
            if let Some(updated) = child.local_variable(binding) {
                let Value::Char(updated) = updated else {
                    return Err(RuntimeError::type_error(
                        "string loop variable",
                        "a character",
                        &updated,
                    ));
                };
                buffer[index] = updated;
            }
        }

        *text.borrow_mut() = buffer.into_iter().collect();
        Ok(result)
    }

    /// Ranges step by one: numeric addition for numbers, code-point
    /// increment for characters. There is nothing to write back into.
    #[allow(clippy::too_many_arguments)]
    fn for_over_range(
        &self,
        binding: &str,
        counter: Option<&str>,
        start: &Value,
        end: &Value,
        inclusive: bool,
        body: &Node,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        match (start, end) {
            (Value::Number(start), Value::Number(end)) => {
                let end = *end;
                let within = |current: f32| if inclusive { current <= end } else { current < end };
                let mut current = *start;
                let mut index = 0;
                while within(current) {
                    let (_, outcome) = self.for_iteration(
                        binding,
                        counter,
                        Value::Number(current),
                        index,
                        body,
                        scope,
                    )?;
                    match outcome {
                        Control::Break => break,
                        signal @ Control::Return(_) => return Ok(signal),
                        Control::Continue | Control::Value(_) => {}
                    }
                    current += 1.0;
                    index += 1;
                }
            }
            (Value::Char(start), Value::Char(end)) => {
                let end = *end as u32;
                let within = |current: u32| if inclusive { current <= end } else { current < end };
                let mut current = *start as u32;
                let mut index = 0;
                while within(current) {
                    let Some(c) = char::from_u32(current) else {
                        return Err(RuntimeError::Custom(
                            "Character range crossed an invalid code point".to_string(),
                        ));
                    };
                    let (_, outcome) =
                        self.for_iteration(binding, counter, Value::Char(c), index, body, scope)?;
                    match outcome {
                        Control::Break => break,
                        signal @ Control::Return(_) => return Ok(signal),
                        Control::Continue | Control::Value(_) => {}
                    }
                    current += 1;
                    index += 1;
                }
            }
            _ => {
                return Err(RuntimeError::Custom(
                    "Range bounds must be two numbers or two characters".to_string(),
                ))
            }
        }
        Ok(Control::Value(Value::Nil))
    }

    /// `or`/`and` short-circuit over strictly boolean operands; equality is
    /// defined for every value pair; the remaining operators want numbers.
    fn eval_binary(&self, op: BinaryOp, lhs: &Node, rhs: &Node, scope: &Rc<Scope>) -> EvalResult {
        if matches!(op, BinaryOp::Or | BinaryOp::And) {
            let left = eval_value!(self.eval(lhs, scope));
            let Value::Bool(left) = left else {
                return Err(RuntimeError::type_error(
                    format!("left operand of '{}'", op.symbol()),
                    "boolean",
                    &left,
                ));
            };
            if (op == BinaryOp::Or && left) || (op == BinaryOp::And && !left) {
                return Ok(Control::Value(Value::Bool(left)));
            }
            let right = eval_value!(self.eval(rhs, scope));
            let Value::Bool(right) = right else {
                return Err(RuntimeError::type_error(
                    format!("right operand of '{}'", op.symbol()),
                    "boolean",
                    &right,
                ));
            };
            return Ok(Control::Value(Value::Bool(right)));
        }

        let left = eval_value!(self.eval(lhs, scope));
        let right = eval_value!(self.eval(rhs, scope));

        let value = match op {
            BinaryOp::Equal => Value::Bool(left == right),
            BinaryOp::NotEqual => Value::Bool(left != right),
            _ => {
                let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                    let offender = if matches!(left, Value::Number(_)) {
                        &right
                    } else {
                        &left
                    };
                    return Err(RuntimeError::type_error(
                        format!("operand of '{}'", op.symbol()),
                        "number",
                        offender,
                    ));
                };
                match op {
                    BinaryOp::Add => Value::Number(a + b),
                    BinaryOp::Subtract => Value::Number(a - b),
                    BinaryOp::Multiply => Value::Number(a * b),
                    BinaryOp::Divide => Value::Number(a / b),
                    BinaryOp::Less => Value::Bool(a < b),
                    BinaryOp::Greater => Value::Bool(a > b),
                    BinaryOp::LessEqual => Value::Bool(a <= b),
                    BinaryOp::GreaterEqual => Value::Bool(a >= b),
                    _ => unreachable!("remaining operators handled above"),
                }
            }
        };
        Ok(Control::Value(value))
    }

    fn eval_subscript_assignment(
        &self,
        list: &Node,
        index: &Node,
        rhs: &Node,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let target = eval_value!(self.eval(list, scope));
        let Value::List(items) = target else {
            return Err(RuntimeError::type_error("subscript target", "a list", &target));
        };
        let index = eval_value!(self.eval(index, scope));
        let index = list_index(&index, items.borrow().len())?;
        let value = eval_value!(self.eval(rhs, scope));
        // The right-hand side may have shrunk the list it is stored into.
        let mut slots = items.borrow_mut();
        if index >= slots.len() {
            return Err(RuntimeError::IndexOutOfBounds {
                index: index as i64,
                len: slots.len(),
            });
        }
        slots[index] = value.clone();
        drop(slots);
        Ok(Control::Value(value))
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    /// Builds the class object. The superclass's method table is copied in:
    /// its `init` is re-bound under the `<SUPER>` slot, everything else
    /// keeps its name, and the subclass's own methods overwrite. Class
    /// methods are inherited unrenamed. The class becomes a constant in the
    /// defining scope.
    fn eval_class_declaration(
        &self,
        name: &str,
        super_name: Option<&str>,
        methods: &[Rc<LambdaDef>],
        class_methods: &[Rc<LambdaDef>],
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let super_class = match super_name {
            Some(super_name) => {
                let found = scope
                    .lookup(super_name)
                    .ok_or_else(|| RuntimeError::UnresolvedIdentifier(super_name.to_string()))?;
                let Value::Class(super_class) = found else {
                    return Err(RuntimeError::type_error("superclass", "a class", &found));
                };
                Some(super_class)
            }
            None => None,
        };

        let mut method_table: IndexMap<String, Rc<LambdaDef>> = IndexMap::new();
        let mut class_method_table: IndexMap<String, Rc<LambdaDef>> = IndexMap::new();
        if let Some(super_class) = &super_class {
            for (method_name, def) in &super_class.methods {
                match method_name.as_str() {
                    // The superclass's own initializer becomes this class's
                    // super-slot; the superclass's super-slot stays behind,
                    // reachable once dispatch has moved up a level.
                    "init" => {
                        method_table.insert(SUPER_INIT.to_string(), def.clone());
                    }
                    SUPER_INIT => {}
                    _ => {
                        method_table.insert(method_name.clone(), def.clone());
                    }
                }
            }
            for (method_name, def) in &super_class.class_methods {
                class_method_table.insert(method_name.clone(), def.clone());
            }
        }
        for def in methods {
            let method_name = def.name.clone().expect("methods are named");
            method_table.insert(method_name, def.clone());
        }
        for def in class_methods {
            let method_name = def.name.clone().expect("methods are named");
            class_method_table.insert(method_name, def.clone());
        }

        let class = Rc::new(ClassObject {
            name: name.to_string(),
            super_class,
            methods: method_table,
            class_methods: class_method_table,
        });
        scope.declare_constant(name, Value::Class(class))?;
        Ok(Control::Value(Value::Nil))
    }

    /// Runs the superclass initializer stored in the `<SUPER>` slot, with
    /// the receiver viewed as the superclass for the duration of the call.
    fn eval_super(&self, args: &[Node], scope: &Rc<Scope>) -> EvalResult {
        let receiver = scope
            .lookup_constant("self")
            .ok_or(RuntimeError::SuperOutsideInitializer)?;
        let Value::Instance(instance) = receiver else {
            return Err(RuntimeError::SuperOutsideInitializer);
        };

        let current_class = instance.borrow().class.clone();
        let init = current_class
            .methods
            .get(SUPER_INIT)
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuperInitializer(current_class.name.clone()))?;
        let super_class = current_class
            .super_class
            .clone()
            .ok_or_else(|| RuntimeError::NoSuperInitializer(current_class.name.clone()))?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(eval_value!(self.eval(arg, scope)));
        }

        // Up-cast for the duration of the call, and restore the receiver's
        // class even when the initializer fails.
        instance.borrow_mut().class = super_class;
        let outcome = self.call_frame(
            &init,
            values,
            scope,
            Some(Value::Instance(instance.clone())),
            false,
        );
        instance.borrow_mut().class = current_class;

        if let Control::Return(value) = outcome? {
            if !value.is_nil() {
                return Err(RuntimeError::InitializerReturn);
            }
        }
        Ok(Control::Value(Value::Nil))
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    fn eval_invocation(&self, callee: &Node, args: &[Node], scope: &Rc<Scope>) -> EvalResult {
        if let Node::BoundMethod { receiver, member } = callee {
            return self.invoke_bound(receiver, member, args, scope);
        }

        let callee = eval_value!(self.eval(callee, scope));
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(eval_value!(self.eval(arg, scope)));
        }

        match callee {
            Value::Lambda(def) => self.call_lambda(&def, values, scope),
            Value::Class(class) => self.construct(&class, values, scope),
            other => Err(RuntimeError::NotCallable(other.type_name().to_string())),
        }
    }

    /// Sets up the call scope — no parent, arguments bound, `self` for
    /// methods, the callee's own name for named lambdas — and evaluates the
    /// body, returning its raw outcome so callers can tell an explicit
    /// `return` apart from the body's trailing value.
    fn call_frame(
        &self,
        def: &Rc<LambdaDef>,
        args: Vec<Value>,
        scope: &Rc<Scope>,
        receiver: Option<Value>,
        bind_own_name: bool,
    ) -> EvalResult {
        let call_scope = Scope::call(scope);
        bind_arguments(def, args, &call_scope)?;
        if let Some(receiver) = receiver {
            call_scope.declare_constant("self", receiver)?;
        } else if bind_own_name {
            if let Some(name) = &def.name {
                if !call_scope.has_local(name) {
                    call_scope.declare_constant(name, Value::Lambda(def.clone()))?;
                }
            }
        }
        self.eval(&def.body, &call_scope)
    }

    fn call_lambda(&self, def: &Rc<LambdaDef>, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        match self.call_frame(def, args, scope, None, true)? {
            Control::Return(value) | Control::Value(value) => Ok(Control::Value(value)),
            signal => Ok(signal),
        }
    }

    fn call_method(
        &self,
        def: &Rc<LambdaDef>,
        receiver: Value,
        args: Vec<Value>,
        scope: &Rc<Scope>,
    ) -> EvalResult {
        match self.call_frame(def, args, scope, Some(receiver), false)? {
            Control::Return(value) | Control::Value(value) => Ok(Control::Value(value)),
            signal => Ok(signal),
        }
    }

    /// Calling a class builds a fresh instance and runs `init` when the
    /// class has one. An initializer may only `return` nil.
    fn construct(&self, class: &Rc<ClassObject>, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        let instance = Rc::new(RefCell::new(InstanceObject {
            class: class.clone(),
            fields: IndexMap::new(),
        }));
        let value = Value::Instance(instance);

        if let Some(init) = class.methods.get("init") {
            let outcome = self.call_frame(init, args, scope, Some(value.clone()), false)?;
            if let Control::Return(returned) = outcome {
                if !returned.is_nil() {
                    return Err(RuntimeError::InitializerReturn);
                }
            }
        } else if !args.is_empty() {
            return Err(RuntimeError::arity_error(&class.name, "0", args.len()));
        }

        Ok(Control::Value(value))
    }

    /// Dispatch for `receiver.name(args)` by receiver kind: instance and
    /// class methods, and the built-in methods of lists and strings.
    fn invoke_bound(
        &self,
        receiver: &Node,
        member: &str,
        args: &[Node],
        scope: &Rc<Scope>,
    ) -> EvalResult {
        let receiver = eval_value!(self.eval(receiver, scope));
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(eval_value!(self.eval(arg, scope)));
        }

        match receiver {
            Value::Instance(instance) => {
                let class = instance.borrow().class.clone();
                let method = class.methods.get(member).cloned().ok_or_else(|| {
                    RuntimeError::undefined_method(member, format!("class {}", class.name))
                })?;
                self.call_method(&method, Value::Instance(instance.clone()), values, scope)
            }
            Value::Class(class) => {
                if let Some(method) = class.class_methods.get(member) {
                    match self.call_frame(method, values, scope, None, false)? {
                        Control::Return(value) | Control::Value(value) => {
                            Ok(Control::Value(value))
                        }
                        signal => Ok(signal),
                    }
                } else if class.methods.contains_key(member) {
                    Err(RuntimeError::RequiresInstance {
                        method: member.to_string(),
                    })
                } else {
                    Err(RuntimeError::undefined_method(
                        member,
                        format!("class {}", class.name),
                    ))
                }
            }
            Value::List(items) => list_method(&items, member, values),
            Value::Str(text) => string_method(&text, member, values),
            other => Err(RuntimeError::type_error(
                format!("method '{}'", member),
                "an instance, class, list, or string",
                &other,
            )),
        }
    }
}

// ----------------------------------------------------------------------
// Free helpers
// ----------------------------------------------------------------------

/// Builds a runtime value for a literal. Strings allocate fresh storage per
/// evaluation so repeated evaluations of one literal never alias.
fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::Char(c) => Value::Char(*c),
        Literal::Str(s) => Value::string(s.clone()),
    }
}

/// Positional binding with the varargs tail collected into a list. Arity
/// must match exactly, or reach the fixed-parameter count for varargs.
fn bind_arguments(def: &LambdaDef, args: Vec<Value>, scope: &Scope) -> Result<(), RuntimeError> {
    if def.varargs {
        let fixed = def.params.len() - 1;
        if args.len() < fixed {
            return Err(RuntimeError::arity_error(
                def.describe(),
                format!("at least {}", fixed),
                args.len(),
            ));
        }
        let mut args = args;
        let rest = args.split_off(fixed);
        for (param, arg) in def.params[..fixed].iter().zip(args) {
            scope.declare_variable(param, arg)?;
        }
        scope.declare_variable(&def.params[fixed], Value::list(rest))?;
    } else {
        if args.len() != def.params.len() {
            return Err(RuntimeError::arity_error(
                def.describe(),
                def.params.len().to_string(),
                args.len(),
            ));
        }
        for (param, arg) in def.params.iter().zip(args) {
            scope.declare_variable(param, arg)?;
        }
    }
    Ok(())
}

/// A list index must be a number; it is truncated to an integer and bounds
/// checked.
fn list_index(value: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Number(n) = value else {
        return Err(RuntimeError::type_error("list index", "number", value));
    };
    let index = *n as i64;
    if index < 0 || index as usize >= len {
        return Err(RuntimeError::IndexOutOfBounds { index, len });
    }
    Ok(index as usize)
}

fn member_reference(target: &Value, member: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Instance(instance) => {
            let instance = instance.borrow();
            instance.fields.get(member).cloned().ok_or_else(|| {
                RuntimeError::undefined_member(
                    member,
                    format!("instance of {}", instance.class.name),
                )
            })
        }
        Value::Str(text) => match member {
            "length" => Ok(Value::Number(text.borrow().chars().count() as f32)),
            _ => Err(RuntimeError::undefined_member(member, "a string")),
        },
        Value::List(items) => match member {
            "length" => Ok(Value::Number(items.borrow().len() as f32)),
            "capacity" => Ok(Value::Number(items.borrow().capacity() as f32)),
            _ => Err(RuntimeError::undefined_member(member, "a list")),
        },
        other => Err(RuntimeError::type_error(
            format!("member '{}'", member),
            "an instance, string, or list",
            other,
        )),
    }
}

/// Built-in list methods: `add`, `insert`, `find`, `remove`.
fn list_method(
    items: &Rc<RefCell<Vec<Value>>>,
    member: &str,
    args: Vec<Value>,
) -> EvalResult {
    match member {
        "add" => {
            let [value] = expect_args::<1>("add", args)?;
            items.borrow_mut().push(value);
            Ok(Control::Value(Value::Nil))
        }
        "insert" => {
            let [index, value] = expect_args::<2>("insert", args)?;
            let Value::Number(n) = index else {
                return Err(RuntimeError::type_error("insert index", "number", &index));
            };
            let len = items.borrow().len();
            let slot = n as i64;
            // Inserting right past the last element is allowed.
            if slot < 0 || slot as usize > len {
                return Err(RuntimeError::IndexOutOfBounds { index: slot, len });
            }
            items.borrow_mut().insert(slot as usize, value);
            Ok(Control::Value(Value::Nil))
        }
        "find" => {
            let [needle] = expect_args::<1>("find", args)?;
            let found = items
                .borrow()
                .iter()
                .position(|item| *item == needle)
                .map(|i| i as f32)
                .unwrap_or(-1.0);
            Ok(Control::Value(Value::Number(found)))
        }
        "remove" => {
            let [index] = expect_args::<1>("remove", args)?;
            let slot = list_index(&index, items.borrow().len())?;
            let removed = items.borrow_mut().remove(slot);
            Ok(Control::Value(removed))
        }
        _ => Err(RuntimeError::undefined_method(member, "a list")),
    }
}

/// Built-in string method: `concat` appends the textual form of every
/// argument, mutating the receiver in place.
fn string_method(
    text: &Rc<RefCell<String>>,
    member: &str,
    args: Vec<Value>,
) -> EvalResult {
    match member {
        "concat" => {
            if args.is_empty() {
                return Err(RuntimeError::arity_error("concat", "at least 1", 0));
            }
            // Render first: an argument may alias the receiver.
            let mut appended = String::new();
            for arg in &args {
                appended.push_str(&arg.to_string());
            }
            text.borrow_mut().push_str(&appended);
            Ok(Control::Value(Value::Str(text.clone())))
        }
        _ => Err(RuntimeError::undefined_method(member, "a string")),
    }
}

fn expect_args<const N: usize>(method: &str, args: Vec<Value>) -> Result<[Value; N], RuntimeError> {
    let actual = args.len();
    args.try_into()
        .map_err(|_| RuntimeError::arity_error(method, N.to_string(), actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::parse;

    #[derive(Clone, Default)]
    struct CaptureBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for CaptureBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CaptureBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn run(source: &str) -> (String, Result<(), RuntimeError>, Interpreter) {
        let buffer = CaptureBuffer::default();
        let interpreter = Interpreter::with_output(Box::new(buffer.clone()));
        let nodes = parse(Lexer::new(source).lex()).expect("test program parses");
        let result = interpreter.run(&nodes);
        (buffer.contents(), result, interpreter)
    }

    fn output(source: &str) -> String {
        let (output, result, _) = run(source);
        result.expect("test program evaluates");
        output
    }

    fn failure(source: &str) -> RuntimeError {
        let (_, result, _) = run(source);
        result.expect_err("test program should fail")
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(output("print 1 + 2 * 3"), "7\n");
        assert_eq!(output("print 10 / 4"), "2.5\n");
        assert_eq!(output("print -(1 + 2)"), "-3\n");
    }

    #[test]
    fn test_arithmetic_requires_numbers() {
        let err = failure("print 1 + true");
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(output("print 1 < 2"), "true\n");
        assert_eq!(output("print 2 <= 1"), "false\n");
        assert_eq!(output("print 3 > 2"), "true\n");
        assert_eq!(output("print 2 >= 3"), "false\n");
    }

    #[test]
    fn test_equality_checks_types_first() {
        assert_eq!(output("print 1 == 1"), "true\n");
        assert_eq!(output("print 1 == \"1\""), "false\n");
        assert_eq!(output("print 1 != \"1\""), "true\n");
        assert_eq!(output("print nil == nil"), "true\n");
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(output("print true or undefined"), "true\n");
        assert_eq!(output("print false and undefined"), "false\n");
        assert_eq!(output("print false or true"), "true\n");
    }

    #[test]
    fn test_logical_operators_require_booleans() {
        let err = failure("print 1 or true");
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));

        let err = failure("print true and 1");
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_if_condition_must_be_boolean() {
        let err = failure("if 1\n    print 1");
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unresolved_identifier() {
        let err = failure("print nope");
        assert_eq!(err, RuntimeError::UnresolvedIdentifier("nope".to_string()));
    }

    #[test]
    fn test_duplicate_declaration_in_one_scope() {
        let err = failure("var x = 1\nvar x = 2");
        assert_eq!(err, RuntimeError::Redeclaration("x".to_string()));
    }

    #[test]
    fn test_block_scope_allows_shadowing() {
        assert_eq!(
            output("var x = 1\nif true\n    var x = 2\n    print x\nprint x"),
            "2\n1\n"
        );
    }

    #[test]
    fn test_subscript_and_subscript_assignment() {
        assert_eq!(output("var xs = [10, 20, 30]\nprint xs[1]"), "20\n");
        assert_eq!(output("var xs = [1]\nxs[0] = 5\nprint xs"), "[5]\n");
        // Indices truncate toward zero.
        assert_eq!(output("var xs = [10, 20, 30]\nprint xs[1.9]"), "20\n");
    }

    #[test]
    fn test_subscript_out_of_bounds() {
        let err = failure("var xs = [1]\nprint xs[3]");
        assert_eq!(err, RuntimeError::IndexOutOfBounds { index: 3, len: 1 });
    }

    #[test]
    fn test_list_members() {
        assert_eq!(output("print [1, 2, 3].length"), "3\n");
        let err = failure("print [].middle");
        assert!(matches!(err, RuntimeError::UndefinedMember { .. }));
    }

    #[test]
    fn test_string_length_member() {
        assert_eq!(output("print \"hello\".length"), "5\n");
    }

    #[test]
    fn test_list_builtin_methods() {
        assert_eq!(output("var xs = [1]\nxs.add(2)\nprint xs"), "[1, 2]\n");
        assert_eq!(
            output("var xs = [1, 3]\nxs.insert(1, 2)\nprint xs"),
            "[1, 2, 3]\n"
        );
        assert_eq!(output("print [4, 5, 6].find(5)"), "1\n");
        assert_eq!(output("print [4, 5, 6].find(7)"), "-1\n");
        assert_eq!(
            output("var xs = [1, 2, 3]\nprint xs.remove(1)\nprint xs"),
            "2\n[1, 3]\n"
        );
    }

    #[test]
    fn test_string_concat_appends_textual_forms() {
        assert_eq!(
            output("var s = \"a\"\ns.concat(1, true, nil)\nprint s"),
            "a1truenil\n"
        );
    }

    #[test]
    fn test_string_concat_with_itself() {
        assert_eq!(output("var s = \"ab\"\ns.concat(s)\nprint s"), "abab\n");
    }

    #[test]
    fn test_string_literals_do_not_alias() {
        assert_eq!(
            output("var a = \"x\"\nvar b = \"x\"\na.concat(\"!\")\nprint b"),
            "x\n"
        );
    }

    #[test]
    fn test_lambda_call_and_arity() {
        assert_eq!(output("var f = |x| x * 2\nprint f(3)"), "6\n");

        let err = failure("var f = |x| x\nf(1, 2)");
        assert_eq!(
            err,
            RuntimeError::arity_error("<lambda>", "1", 2)
        );
    }

    #[test]
    fn test_varargs_collect_into_list() {
        assert_eq!(
            output("fn f(a, *rest)\n    return rest\nprint f(1, 2, 3)"),
            "[2, 3]\n"
        );
        assert_eq!(output("fn f(*all)\n    return all\nprint f()"), "[]\n");

        let err = failure("fn f(a, b, *rest)\n    return rest\nf(1)");
        assert_eq!(err, RuntimeError::arity_error("f", "at least 2", 1));
    }

    #[test]
    fn test_function_returns_last_expression_without_return() {
        assert_eq!(output("fn three()\n    1 + 2\nprint three()"), "3\n");
    }

    #[test]
    fn test_range_values() {
        assert_eq!(output("print 1..5"), "1..5\n");
        assert_eq!(output("print 'a'..='c'"), "a..=c\n");

        let err = failure("print 1..'c'");
        assert!(matches!(err, RuntimeError::Custom(_)));
    }

    #[test]
    fn test_assignment_yields_the_assigned_value() {
        assert_eq!(output("var a\nvar b\na = b = 2\nprint a"), "2\n");
    }

    #[test]
    fn test_error_containment_keeps_earlier_bindings() {
        let (_, result, interpreter) = run("var a = 1\nprint nope\nvar b = 2");
        assert!(result.is_err());
        assert_eq!(
            interpreter.globals().lookup("a"),
            Some(Value::Number(1.0))
        );
        assert_eq!(interpreter.globals().lookup("b"), None);
    }
}
