// ABOUTME: Runtime value types shared between the evaluator, scopes, and printing

use crate::ast::LambdaDef;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Method-table key under which a subclass stores its superclass's original
/// initializer. `super(...)` dispatches through this slot.
pub const SUPER_INIT: &str = "<SUPER>";

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f32),
    Char(char),
    Str(Rc<RefCell<String>>),
    List(Rc<RefCell<Vec<Value>>>),
    Range {
        start: Box<Value>,
        end: Box<Value>,
        inclusive: bool,
    },
    Lambda(Rc<LambdaDef>),
    Class(Rc<ClassObject>),
    Instance(Rc<RefCell<InstanceObject>>),
}

#[derive(Debug)]
pub struct ClassObject {
    pub name: String,
    pub super_class: Option<Rc<ClassObject>>,
    /// Instance methods, inherited entries first, in copy order.
    pub methods: IndexMap<String, Rc<LambdaDef>>,
    /// Methods callable on the class itself, without an instance.
    pub class_methods: IndexMap<String, Rc<LambdaDef>>,
}

#[derive(Debug)]
pub struct InstanceObject {
    /// The class the instance currently dispatches through. Temporarily
    /// retargeted to the superclass while a `super(...)` initializer runs.
    pub class: Rc<ClassObject>,
    /// Insertion-ordered: display and equality follow assignment order.
    pub fields: IndexMap<String, Value>,
}

impl Value {
    pub fn string(text: impl Into<String>) -> Value {
        Value::Str(Rc::new(RefCell::new(text.into())))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Char(_) => "character",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Range { .. } => "range",
            Value::Lambda(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (
                Value::Range {
                    start: a_start,
                    end: a_end,
                    inclusive: a_inclusive,
                },
                Value::Range {
                    start: b_start,
                    end: b_end,
                    inclusive: b_inclusive,
                },
            ) => a_inclusive == b_inclusive && a_start == b_start && a_end == b_end,
            // Functions and classes compare by identity.
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                // Instances of different classes are never equal; otherwise
                // compare field-by-field in insertion order.
                Rc::ptr_eq(&a.class, &b.class)
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(
                        |((a_name, a_value), (b_name, b_value))| {
                            a_name == b_name && a_value == b_value
                        },
                    )
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Number(n) => {
                // Integral numbers display without a trailing `.0`.
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => write!(f, "{}", s.borrow()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Range {
                start,
                end,
                inclusive,
            } => {
                if *inclusive {
                    write!(f, "{}..={}", start, end)
                } else {
                    write!(f, "{}..{}", start, end)
                }
            }
            Value::Lambda(def) => {
                write!(f, "fn(")?;
                for (i, param) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if def.varargs && i == def.params.len() - 1 {
                        write!(f, "*")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
            Value::Class(class) => write!(f, "{}", class),
            Value::Instance(instance) => {
                let instance = instance.borrow();
                write!(f, "{}(", instance.class.name)?;
                for (i, (name, value)) in instance.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for ClassObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(super_class) = &self.super_class {
            write!(f, "({})", super_class.name)?;
        }
        writeln!(f, " {{")?;
        for name in self.methods.keys() {
            if name != SUPER_INIT {
                writeln!(f, "  {}", name)?;
            }
        }
        for name in self.class_methods.keys() {
            writeln!(f, "  class.{}", name)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn lambda(name: Option<&str>, params: &[&str], varargs: bool) -> Rc<LambdaDef> {
        Rc::new(LambdaDef {
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            varargs,
            body: Node::Block(vec![]),
        })
    }

    fn class(name: &str, super_class: Option<Rc<ClassObject>>) -> Rc<ClassObject> {
        Rc::new(ClassObject {
            name: name.to_string(),
            super_class,
            methods: IndexMap::new(),
            class_methods: IndexMap::new(),
        })
    }

    #[test]
    fn test_number_display() {
        assert_eq!(format!("{}", Value::Number(42.0)), "42");
        assert_eq!(format!("{}", Value::Number(-2.5)), "-2.5");
        assert_eq!(format!("{}", Value::Number(0.0)), "0");
    }

    #[test]
    fn test_nil_bool_char_display() {
        assert_eq!(format!("{}", Value::Nil), "nil");
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Bool(false)), "false");
        assert_eq!(format!("{}", Value::Char('x')), "x");
    }

    #[test]
    fn test_string_displays_raw_characters() {
        assert_eq!(format!("{}", Value::string("hello")), "hello");
    }

    #[test]
    fn test_list_display() {
        let list = Value::list(vec![
            Value::Number(1.0),
            Value::string("a"),
            Value::Bool(true),
        ]);
        assert_eq!(format!("{}", list), "[1, a, true]");
        assert_eq!(format!("{}", Value::list(vec![])), "[]");
    }

    #[test]
    fn test_range_display() {
        let exclusive = Value::Range {
            start: Box::new(Value::Number(1.0)),
            end: Box::new(Value::Number(5.0)),
            inclusive: false,
        };
        assert_eq!(format!("{}", exclusive), "1..5");

        let inclusive = Value::Range {
            start: Box::new(Value::Char('a')),
            end: Box::new(Value::Char('z')),
            inclusive: true,
        };
        assert_eq!(format!("{}", inclusive), "a..=z");
    }

    #[test]
    fn test_lambda_display_marks_varargs() {
        let plain = Value::Lambda(lambda(Some("add"), &["a", "b"], false));
        assert_eq!(format!("{}", plain), "fn(a, b)");

        let varargs = Value::Lambda(lambda(None, &["a", "b", "c"], true));
        assert_eq!(format!("{}", varargs), "fn(a, b, *c)");
    }

    #[test]
    fn test_class_display_lists_methods_but_not_the_super_slot() {
        let base = class("A", None);
        let mut methods = IndexMap::new();
        methods.insert(SUPER_INIT.to_string(), lambda(Some("init"), &[], false));
        methods.insert("init".to_string(), lambda(Some("init"), &["x"], false));
        let mut class_methods = IndexMap::new();
        class_methods.insert("make".to_string(), lambda(Some("make"), &[], false));
        let sub = ClassObject {
            name: "B".to_string(),
            super_class: Some(base),
            methods,
            class_methods,
        };
        assert_eq!(format!("{}", sub), "B(A) {\n  init\n  class.make\n}");
    }

    #[test]
    fn test_instance_display_in_field_order() {
        let class = class("Point", None);
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Number(1.0));
        fields.insert("y".to_string(), Value::Number(2.0));
        let instance = Value::Instance(Rc::new(RefCell::new(InstanceObject { class, fields })));
        assert_eq!(format!("{}", instance), "Point(x: 1, y: 2)");
    }

    #[test]
    fn test_mismatched_types_are_not_equal() {
        assert_ne!(Value::Number(1.0), Value::string("1"));
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Char('1'), Value::Number(1.0));
    }

    #[test]
    fn test_list_equality_is_elementwise() {
        let a = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        let c = Value::list(vec![Value::Number(2.0), Value::Number(1.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_range_equality_includes_inclusivity() {
        let make = |inclusive| Value::Range {
            start: Box::new(Value::Number(1.0)),
            end: Box::new(Value::Number(3.0)),
            inclusive,
        };
        assert_eq!(make(true), make(true));
        assert_ne!(make(true), make(false));
    }

    #[test]
    fn test_lambda_equality_is_identity() {
        let def = lambda(None, &["x"], false);
        assert_eq!(Value::Lambda(def.clone()), Value::Lambda(def.clone()));
        assert_ne!(
            Value::Lambda(def),
            Value::Lambda(lambda(None, &["x"], false))
        );
    }

    #[test]
    fn test_instances_of_different_classes_are_never_equal() {
        let a = class("A", None);
        let b = class("B", None);
        let make = |class: Rc<ClassObject>| {
            Value::Instance(Rc::new(RefCell::new(InstanceObject {
                class,
                fields: IndexMap::new(),
            })))
        };
        assert_ne!(make(a.clone()), make(b));
        assert_eq!(make(a.clone()), make(a));
    }

    #[test]
    fn test_instance_equality_respects_field_order() {
        let point = class("Point", None);
        let make = |pairs: &[(&str, f32)]| {
            let mut fields = IndexMap::new();
            for (name, value) in pairs {
                fields.insert(name.to_string(), Value::Number(*value));
            }
            Value::Instance(Rc::new(RefCell::new(InstanceObject {
                class: point.clone(),
                fields,
            })))
        };
        assert_eq!(
            make(&[("x", 1.0), ("y", 2.0)]),
            make(&[("x", 1.0), ("y", 2.0)])
        );
        assert_ne!(
            make(&[("x", 1.0), ("y", 2.0)]),
            make(&[("y", 2.0), ("x", 1.0)])
        );
    }
}
