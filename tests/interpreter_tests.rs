// ABOUTME: End-to-end tests running whole Slate programs through the pipeline

use slate::error::RuntimeError;
use slate::eval::Interpreter;
use slate::{parse_source, PRELUDE};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

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

/// Runs a program with the prelude loaded and captures its print output.
fn run(source: &str) -> (String, Result<(), RuntimeError>, Interpreter) {
    let buffer = CaptureBuffer::default();
    let interpreter = Interpreter::with_output(Box::new(buffer.clone()));
    let prelude = parse_source(PRELUDE).expect("prelude parses");
    interpreter.run(&prelude).expect("prelude evaluates");
    let nodes = match parse_source(source) {
        Ok(nodes) => nodes,
        Err(errors) => panic!("parse errors: {:?}", errors),
    };
    let result = interpreter.run(&nodes);
    (buffer.contents(), result, interpreter)
}

fn output(source: &str) -> String {
    let (output, result, _) = run(source);
    result.expect("program evaluates");
    output
}

fn failure(source: &str) -> RuntimeError {
    let (_, result, _) = run(source);
    result.expect_err("program should fail")
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_arithmetic_print() {
    assert_eq!(output("print 1 + 2 * 3"), "7\n");
}

#[test]
fn test_recursive_factorial() {
    let source = "\
fn fact(n)
    if n == 0
        return 1
    n * fact(n - 1)
print fact(5)
";
    assert_eq!(output(source), "120\n");
}

#[test]
fn test_for_over_inclusive_range() {
    assert_eq!(output("for i in 1..=3\n    print i"), "1\n2\n3\n");
}

#[test]
fn test_list_mutation_through_for() {
    let source = "\
var L = [1, 2, 3]
for x in L
    x = x * 10
print L
";
    assert_eq!(output(source), "[10, 20, 30]\n");
}

#[test]
fn test_class_with_super() {
    let source = "\
class A
    fn init(x)
        self.x = x
class B(A)
    fn init(x, y)
        super(x)
        self.y = y
var b = B(1, 2)
print b
";
    assert_eq!(output(source), "B(x: 1, y: 2)\n");
}

#[test]
fn test_prelude_string_concat() {
    assert_eq!(output("print String.concat(\"a\", 1, true)"), "a1true\n");
}

#[test]
fn test_prelude_string_join() {
    assert_eq!(
        output("print String.join(\", \", 1, 2, 3)"),
        "1, 2, 3\n"
    );
}

// ============================================================================
// Language laws
// ============================================================================

#[test]
fn test_precedence_ladder() {
    assert_eq!(output("print 1 + 2 * 3 == 7"), "true\n");
    assert_eq!(output("print 1 < 2 == true"), "true\n");
    assert_eq!(output("print true and 1 == 1"), "true\n");
    assert_eq!(output("print false or true and true"), "true\n");
}

#[test]
fn test_assignment_binds_loosest() {
    assert_eq!(output("var a\na = 1 + 2\nprint a"), "3\n");
}

#[test]
fn test_functions_see_globals_but_not_caller_locals() {
    let visible = "\
var g = 10
fn peek()
    return g + 1
print peek()
";
    assert_eq!(output(visible), "11\n");

    let hidden = "\
fn sneak()
    return hidden
fn outer()
    var hidden = 5
    return sneak()
outer()
";
    assert_eq!(
        failure(hidden),
        RuntimeError::UnresolvedIdentifier("hidden".to_string())
    );
}

#[test]
fn test_function_can_rebind_globals() {
    let source = "\
var count = 0
fn bump()
    count = count + 1
bump()
bump()
print count
";
    assert_eq!(output(source), "2\n");
}

#[test]
fn test_constants_are_write_once() {
    assert_eq!(
        failure("const x = 1\nx = 2"),
        RuntimeError::ConstantAssignment("x".to_string())
    );
    assert_eq!(
        failure("const x = 1\nconst x = 2"),
        RuntimeError::Redeclaration("x".to_string())
    );
}

#[test]
fn test_chain_constant_shadows_global_variable_on_assignment() {
    // A constant found on the scope chain wins over a rebindable global
    // variable of the same name.
    let source = "\
var x = 1
fn f()
    const x = 2
    x = 3
f()
";
    assert_eq!(
        failure(source),
        RuntimeError::ConstantAssignment("x".to_string())
    );
}

#[test]
fn test_string_mutation_through_for() {
    let source = "\
var s = \"abc\"
for c in s
    c = 'z'
print s
";
    assert_eq!(output(source), "zzz\n");
}

#[test]
fn test_string_for_with_counter_updates_single_slot() {
    let source = "\
var s = \"abc\"
for c, i in s
    if i == 1
        c = 'x'
print s
";
    assert_eq!(output(source), "axc\n");
}

#[test]
fn test_equality_laws() {
    assert_eq!(output("print [1, 2] == [1, 2]"), "true\n");
    assert_eq!(output("print [1, 2] == [2, 1]"), "false\n");
    assert_eq!(output("print 1..2 == 1..2"), "true\n");
    assert_eq!(output("print 1..2 == 1..=2"), "false\n");
    assert_eq!(output("print \"ab\" == \"ab\""), "true\n");
    assert_eq!(output("print 'a' == 'a'"), "true\n");
}

#[test]
fn test_runtime_error_halts_later_statements_but_keeps_bindings() {
    let (printed, result, interpreter) = run("var a = 1\nprint a\nboom\nprint 99");
    assert!(result.is_err());
    assert_eq!(printed, "1\n");
    assert_eq!(
        interpreter.globals().lookup("a"),
        Some(slate::value::Value::Number(1.0))
    );
}

// ============================================================================
// Expressions and values
// ============================================================================

#[test]
fn test_lambda_literals() {
    assert_eq!(output("var f = |x| x * 2\nprint f(3)"), "6\n");

    let block_bodied = "\
var f = |x|
    var y = x + 1
    return y * 2
print f(2)
";
    assert_eq!(output(block_bodied), "6\n");
}

#[test]
fn test_lambda_display_forms() {
    assert_eq!(output("print |x| x"), "fn(x)\n");
    assert_eq!(output("fn f(a, *rest)\n    return rest\nprint f"), "fn(a, *rest)\n");
}

#[test]
fn test_varargs_invocation() {
    let source = "\
fn tail(first, *rest)
    return rest
print tail(1, 2, 3)
print tail(1)
";
    assert_eq!(output(source), "[2, 3]\n[]\n");
}

#[test]
fn test_named_function_recurses_through_call_scope_binding() {
    // `inner`'s defining scope is gone by the time it runs, so the
    // recursive reference can only resolve through the name binding
    // inserted into each call scope.
    let source = "\
fn outer()
    fn inner(n)
        if n == 0
            return 0
        return inner(n - 1)
    return inner
var f = outer()
print f(3)
";
    assert_eq!(output(source), "0\n");
}

#[test]
fn test_member_access_on_builtin_receivers() {
    assert_eq!(output("print \"hello\".length"), "5\n");
    assert_eq!(output("print [1, 2, 3].length"), "3\n");
}

#[test]
fn test_nested_data_display() {
    assert_eq!(
        output("print [1, [2, 3], \"x\", 'c', 1..2]"),
        "[1, [2, 3], x, c, 1..2]\n"
    );
}

#[test]
fn test_shared_list_aliases_observe_mutation() {
    let source = "\
var a = [1]
var b = a
b.add(2)
print a
";
    assert_eq!(output(source), "[1, 2]\n");
}

#[test]
fn test_elif_chain() {
    let source = "\
fn describe(x)
    if x == 1
        return \"one\"
    elif x == 2
        return \"two\"
    else
        return \"many\"
print describe(1)
print describe(2)
print describe(9)
";
    assert_eq!(output(source), "one\ntwo\nmany\n");
}

#[test]
fn test_parse_errors_are_collected_not_executed() {
    let errors = parse_source("var = 1").unwrap_err();
    assert!(!errors.is_empty());

    let errors = parse_source("break").unwrap_err();
    assert!(errors.contains(&slate::error::ParseError::BreakOutsideLoop));
}
