#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use treelox as lox;

    use lox::error::{LoxError, RuntimeError};
    use lox::lox::Lox;

    /// `print` sink the test keeps a handle to after the session takes it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).expect("output is UTF-8")
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session() -> (Lox, SharedBuffer) {
        let out = SharedBuffer::default();
        (Lox::with_output(out.clone()), out)
    }

    fn run(source: &str) -> (Result<(), LoxError>, String) {
        let (mut lox, out) = session();
        let result = lox.run(source);
        (result, out.contents())
    }

    fn run_ok(source: &str) -> String {
        let (result, output) = run(source);
        if let Err(e) = result {
            panic!("program failed: {}\noutput so far:\n{}", e, output);
        }
        output
    }

    fn runtime_error(source: &str) -> RuntimeError {
        match run(source).0 {
            Err(LoxError::Runtime(e)) => e,
            Err(other) => panic!("expected a runtime error, got static: {}", other),
            Ok(()) => panic!("expected a runtime error, program succeeded"),
        }
    }

    fn static_errors(source: &str) -> Vec<LoxError> {
        let (result, output) = run(source);
        assert_eq!(output, "", "nothing runs when a static error is found");
        match result {
            Err(LoxError::Static(errors)) => errors,
            Err(other) => panic!("expected static errors, got: {}", other),
            Ok(()) => panic!("expected static errors, program succeeded"),
        }
    }

    // ─────────────────────────── arithmetic and values ───────────────────────────

    #[test]
    fn test_arithmetic_and_number_printing() {
        assert_eq!(run_ok("print 1 + 2;"), "3\n");
        assert_eq!(run_ok("print 10 / 2;"), "5\n");
        assert_eq!(run_ok("print 10 / 4;"), "2.5\n");
        assert_eq!(run_ok("print -(3 - 5) * 2;"), "4\n");
        assert_eq!(run_ok("print 1 < 2 == true;"), "true\n");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run_ok("print \"foo\" + \"bar\";"), "foobar\n");
        assert_eq!(run_ok("print \"a\" + 1;"), "a1\n");
        assert_eq!(run_ok("print \"v\" + 2.5;"), "v2.5\n");
    }

    #[test]
    fn test_number_plus_string_is_a_type_error() {
        let err = runtime_error("print 1 + \"a\";");
        assert!(matches!(err, RuntimeError::TypeMismatch { line: 1, .. }));
    }

    #[test]
    fn test_division_by_zero() {
        let err = runtime_error("print 10 / 0;");
        assert!(matches!(err, RuntimeError::DivisionByZero { line: 1 }));
        assert_eq!(err.to_string(), "Division by zero.\n[line 1]");
    }

    #[test]
    fn test_truthiness_and_logical_operators() {
        let output = run_ok(
            "print nil or \"default\";\n\
             print 0 and \"zero is truthy\";\n\
             print !nil;\n\
             print false or nil;",
        );
        assert_eq!(output, "default\nzero is truthy\ntrue\nnil\n");
    }

    #[test]
    fn test_equality_never_crosses_kinds() {
        let output = run_ok("print nil == false; print 1 == \"1\"; print \"a\" == \"a\";");
        assert_eq!(output, "false\nfalse\ntrue\n");
    }

    // ─────────────────────────────── variables ───────────────────────────────

    #[test]
    fn test_undefined_variable() {
        match runtime_error("var a = 1;\nprint b;") {
            RuntimeError::UndefinedVariable { name, line } => {
                assert_eq!(name, "b");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_assigning_undefined_variable() {
        let err = runtime_error("missing = 1;");
        assert!(matches!(err, RuntimeError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_block_scoping_and_shadowing() {
        let output = run_ok(
            "var a = \"global\";\n\
             {\n\
               var a = \"outer\";\n\
               {\n\
                 var a = \"inner\";\n\
                 print a;\n\
               }\n\
               print a;\n\
             }\n\
             print a;",
        );
        assert_eq!(output, "inner\nouter\nglobal\n");
    }

    #[test]
    fn test_closure_sees_binding_at_declaration() {
        let output = run_ok(
            "var a = \"global\";\n\
             {\n\
               fun show() { print a; }\n\
               show();\n\
               var a = \"block\";\n\
               show();\n\
             }",
        );
        assert_eq!(output, "global\nglobal\n");
    }

    #[test]
    fn test_global_redeclaration_is_allowed() {
        assert_eq!(run_ok("var a = 1; var a = 2; print a;"), "2\n");
    }

    #[test]
    fn test_duplicate_local_declaration_is_static_error() {
        let errors = static_errors("{ var a = 1; var a = 2; print a; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .to_string()
            .contains("Already a variable with this name in this scope."));
    }

    #[test]
    fn test_reading_local_in_own_initializer() {
        let errors = static_errors("var a = 1; { var a = a; }");
        assert!(errors[0]
            .to_string()
            .contains("Can't read local variable in its own initializer."));
    }

    // ─────────────────────────────── control flow ───────────────────────────────

    #[test]
    fn test_if_else() {
        assert_eq!(
            run_ok("if (1 > 2) print \"yes\"; else print \"no\";"),
            "no\n"
        );
    }

    #[test]
    fn test_for_loop_with_continue_runs_increment() {
        let output = run_ok(
            "for (var i = 0; i < 3; i = i + 1) {\n\
               if (i == 1) continue;\n\
               print i;\n\
             }",
        );
        assert_eq!(output, "0\n2\n");
    }

    #[test]
    fn test_while_loop_with_break() {
        let output = run_ok(
            "var i = 0;\n\
             while (true) {\n\
               if (i == 2) break;\n\
               print i;\n\
               i = i + 1;\n\
             }\n\
             print \"done\";",
        );
        assert_eq!(output, "0\n1\ndone\n");
    }

    #[test]
    fn test_break_only_leaves_innermost_loop() {
        let output = run_ok(
            "for (var i = 0; i < 2; i = i + 1) {\n\
               for (var j = 0; j < 10; j = j + 1) {\n\
                 if (j == 1) break;\n\
                 print i + j;\n\
               }\n\
             }",
        );
        assert_eq!(output, "0\n1\n");
    }

    #[test]
    fn test_return_unwinds_through_loops() {
        let output = run_ok(
            "fun first() {\n\
               for (var i = 0; i < 10; i = i + 1) {\n\
                 while (true) { return i + 7; }\n\
               }\n\
             }\n\
             print first();",
        );
        assert_eq!(output, "7\n");
    }

    #[test]
    fn test_misplaced_jumps_are_static_errors() {
        let errors = static_errors("return 1;");
        assert!(errors[0]
            .to_string()
            .contains("Can't return from top-level code."));

        let errors = static_errors("break;");
        assert!(errors[0]
            .to_string()
            .contains("Can't use 'break' outside of a loop."));

        let errors = static_errors("while (true) { fun f() { continue; } }");
        assert!(errors[0]
            .to_string()
            .contains("Can't use 'continue' outside of a loop."));
    }

    // ─────────────────────────────── functions ───────────────────────────────

    #[test]
    fn test_recursion() {
        let output = run_ok(
            "fun fib(n) {\n\
               if (n < 2) return n;\n\
               return fib(n - 1) + fib(n - 2);\n\
             }\n\
             print fib(10);",
        );
        assert_eq!(output, "55\n");
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        assert_eq!(run_ok("fun f() {} print f();"), "nil\n");
    }

    #[test]
    fn test_independent_closure_counters() {
        let output = run_ok(
            "fun makeCounter() {\n\
               var i = 0;\n\
               fun count() { i = i + 1; return i; }\n\
               return count;\n\
             }\n\
             var a = makeCounter();\n\
             var b = makeCounter();\n\
             print a();\n\
             print a();\n\
             print b();",
        );
        assert_eq!(output, "1\n2\n1\n");
    }

    #[test]
    fn test_closures_share_captured_scope() {
        let output = run_ok(
            "var inc;\n\
             var get;\n\
             {\n\
               var n = 0;\n\
               fun i() { n = n + 1; }\n\
               fun g() { return n; }\n\
               inc = i;\n\
               get = g;\n\
             }\n\
             inc();\n\
             inc();\n\
             print get();",
        );
        assert_eq!(output, "2\n");
    }

    #[test]
    fn test_closures_from_one_call_share_state() {
        let output = run_ok(
            "class Pair {\n\
               init(inc, get) { this.inc = inc; this.get = get; }\n\
             }\n\
             fun makePair() {\n\
               var n = 0;\n\
               fun inc() { n = n + 1; }\n\
               fun get() { return n; }\n\
               return Pair(inc, get);\n\
             }\n\
             var first = makePair();\n\
             first.inc();\n\
             first.inc();\n\
             print first.get();\n\
             var second = makePair();\n\
             second.inc();\n\
             print second.get();\n\
             print first.get();",
        );
        assert_eq!(output, "2\n1\n2\n");
    }

    #[test]
    fn test_function_display_forms() {
        let output = run_ok("fun hello() {} print hello; print clock;");
        assert_eq!(output, "<fn hello>\n<native fn clock>\n");
    }

    #[test]
    fn test_clock_returns_seconds() {
        assert_eq!(run_ok("print clock() > 0;"), "true\n");
    }

    #[test]
    fn test_calling_non_callable() {
        let err = runtime_error("\"not a function\"();");
        assert!(matches!(err, RuntimeError::NotCallable { line: 1 }));
    }

    #[test]
    fn test_arity_mismatch() {
        match runtime_error("fun f(a) {}\nf(1, 2);") {
            RuntimeError::ArityMismatch {
                expected,
                got,
                line,
            } => {
                assert_eq!((expected, got, line), (1, 2, 2));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    // ─────────────────────────────── classes ───────────────────────────────

    #[test]
    fn test_class_and_instance_display() {
        let output = run_ok("class Bagel {} print Bagel; print Bagel();");
        assert_eq!(output, "Bagel\nBagel instance\n");
    }

    #[test]
    fn test_fields_and_bound_methods() {
        let output = run_ok(
            "class Cake {\n\
               init(flavor) { this.flavor = flavor; }\n\
               taste() { return \"The \" + this.flavor + \" cake\"; }\n\
             }\n\
             var method = Cake(\"lemon\").taste;\n\
             print method;\n\
             print method();",
        );
        assert_eq!(output, "<fn taste>\nThe lemon cake\n");
    }

    #[test]
    fn test_fields_shadow_methods() {
        let output = run_ok(
            "class Box { value() { return \"method\"; } }\n\
             var b = Box();\n\
             b.value = \"field\";\n\
             print b.value;",
        );
        assert_eq!(output, "field\n");
    }

    #[test]
    fn test_superclass_method_via_super() {
        let output = run_ok(
            "class A { greet() { return \"A\"; } }\n\
             class B < A { greet() { return super.greet() + \"B\"; } }\n\
             print B().greet();",
        );
        assert_eq!(output, "AB\n");
    }

    #[test]
    fn test_inherited_methods_and_initializer() {
        let output = run_ok(
            "class Base { init(n) { this.n = n; } show() { print this.n; } }\n\
             class Derived < Base {}\n\
             Derived(9).show();",
        );
        assert_eq!(output, "9\n");
    }

    #[test]
    fn test_initializer_with_bare_return_yields_instance() {
        let output = run_ok(
            "class P {\n\
               init(x) {\n\
                 this.x = x;\n\
                 return;\n\
               }\n\
             }\n\
             var p = P(3);\n\
             print p;\n\
             print p.x;\n\
             print p.init(4) == p;\n\
             print p.x;",
        );
        assert_eq!(output, "P instance\n3\ntrue\n4\n");
    }

    #[test]
    fn test_class_misuse_is_static_error() {
        let errors = static_errors("class A < A {}");
        assert!(errors[0]
            .to_string()
            .contains("A class can't inherit from itself."));

        let errors = static_errors("print this;");
        assert!(errors[0]
            .to_string()
            .contains("Can't use 'this' outside of a class."));

        let errors = static_errors("class A { f() { return super.f(); } }");
        assert!(errors[0]
            .to_string()
            .contains("Can't use 'super' in a class with no superclass."));

        let errors = static_errors("class A { init() { return 1; } }");
        assert!(errors[0]
            .to_string()
            .contains("Can't return a value from an initializer."));
    }

    #[test]
    fn test_superclass_must_be_a_class() {
        let err = runtime_error("var NotAClass = 1;\nclass C < NotAClass {}");
        assert!(matches!(err, RuntimeError::NotAClass { line: 2 }));
    }

    #[test]
    fn test_undefined_property() {
        match runtime_error("class C {}\nprint C().missing;") {
            RuntimeError::UndefinedProperty { name, line } => {
                assert_eq!(name, "missing");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_properties_only_on_instances() {
        let err = runtime_error("var x = 1; print x.y;");
        assert!(matches!(err, RuntimeError::NoProperties { .. }));

        let err = runtime_error("var x = 1; x.y = 2;");
        assert!(matches!(err, RuntimeError::NoFields { .. }));
    }

    // ─────────────────────────────── sessions ───────────────────────────────

    #[test]
    fn test_output_before_runtime_error_is_kept() {
        let (result, output) = run("print 1;\nprint nil + 1;\nprint 2;");
        assert_eq!(output, "1\n");

        let err = result.expect_err("second statement fails");
        assert_eq!(err.exit_code(), 70);
        assert!(err.to_string().ends_with("[line 2]"));
    }

    #[test]
    fn test_syntax_errors_exit_with_65() {
        let (result, output) = run("print ;");
        assert_eq!(output, "");

        let err = result.expect_err("missing expression");
        assert!(err.is_static());
        assert_eq!(err.exit_code(), 65);
        assert!(err.to_string().contains("Expected expression"));
    }

    #[test]
    fn test_evaluate_single_expression() {
        let (mut lox, _) = session();
        assert_eq!(lox.evaluate("1 + 2 * 3").expect("valid"), "7");
        assert_eq!(lox.evaluate("\"ab\" + \"cd\"").expect("valid"), "abcd");
        assert_eq!(lox.evaluate("!(1 == 1)").expect("valid"), "false");
    }

    #[test]
    fn test_negative_zero_keeps_its_sign() {
        let (mut lox, _) = session();
        assert_eq!(lox.run_line("-0").expect("echo"), Some("-0".to_string()));
        assert_eq!(run_ok("print 0 * -1;"), "-0\n");
    }

    #[test]
    fn test_unreadable_script_is_an_io_error() {
        let missing = std::env::temp_dir().join("treelox-no-such-script.lox");

        let err = lox::lox::read_source(&missing).expect_err("file does not exist");
        assert!(matches!(err, LoxError::Io(_)));
        assert_eq!(err.exit_code(), 74);
    }

    #[test]
    fn test_non_utf8_script_is_rejected() {
        let path = std::env::temp_dir().join(format!("treelox-latin1-{}.lox", std::process::id()));
        std::fs::write(&path, [b'p', b'r', b'i', b'n', b't', b' ', 0xE9, b';']).expect("write");

        let result = lox::lox::read_source(&path);
        let _ = std::fs::remove_file(&path);

        let err = result.expect_err("invalid UTF-8");
        assert!(matches!(err, LoxError::Utf8(_)));
        assert_eq!(err.exit_code(), 74);
    }

    #[test]
    fn test_script_runs_from_a_file() {
        let path = std::env::temp_dir().join(format!("treelox-script-{}.lox", std::process::id()));
        std::fs::write(&path, "var greeting = \"hi\";\nprint greeting;\n").expect("write");

        let source = lox::lox::read_source(&path);
        let _ = std::fs::remove_file(&path);

        let (mut session, out) = session();
        session.run(&source.expect("readable")).expect("runs");
        assert_eq!(out.contents(), "hi\n");
    }

    #[test]
    fn test_repl_keeps_globals_between_lines() {
        let (mut lox, out) = session();

        assert_eq!(lox.run_line("var a = 1;").expect("define"), None);
        assert_eq!(lox.run_line("var a = 2;").expect("redefine"), None);
        assert_eq!(lox.run_line("a").expect("echo"), Some("2".to_string()));

        lox.run_line("print a + 1;").expect("print");
        assert_eq!(out.contents(), "3\n");
    }

    #[test]
    fn test_repl_functions_resolve_across_lines() {
        let (mut lox, _) = session();

        lox.run_line("fun twice(x) { var y = x * 2; return y; }")
            .expect("define");
        assert_eq!(
            lox.run_line("twice(21)").expect("call"),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_repl_duplicate_local_still_rejected() {
        let (mut lox, _) = session();

        let err = lox
            .run_line("{ var b = 1; var b = 2; }")
            .expect_err("duplicate local");
        assert!(err.is_static());

        // The session survives the error.
        assert_eq!(lox.run_line("1 + 1").expect("echo"), Some("2".to_string()));
    }
}
