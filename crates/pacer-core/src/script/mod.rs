//! Interpreter for the robot control language.
//!
//! Submitted programs are written in a small Python subset: assignments,
//! arithmetic, `if`/`while`/`for`, functions, lists and imports of the
//! built-in modules (`HAL`, `GUI`, `console`, `time`, `math`). Programs can
//! only reach the outside world through a [`Capabilities`] object passed to
//! [`Interpreter::run`]; there is no access to the host namespace.
//!
//! [`Capabilities`]: crate::Capabilities

mod ast;
mod builtins;
mod error;
mod interp;
mod lexer;
mod ops;
mod parser;
mod value;

pub use error::{ErrorKind, ScriptError};
pub use interp::{Interpreter, MAX_CALL_DEPTH, MAX_EVAL_DEPTH};
pub use value::{Value, format_float};

use ast::Stmt;

/// A parsed program fragment, ready to run.
#[derive(Debug, Clone, Default)]
pub struct Script {
    statements: Vec<Stmt>,
}

impl Script {
    /// Parse `source`. Reported line numbers start at `first_line`.
    pub fn compile(source: &str, first_line: usize) -> Result<Self, ScriptError> {
        Ok(Self {
            statements: parser::parse(source, first_line)?,
        })
    }

    /// Whether the script has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    fn statements(&self) -> &[Stmt] {
        &self.statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capabilities, Image};
    use crate::error::Result;
    use crate::execute::KillSwitch;

    #[derive(Default)]
    struct Bench {
        console: Vec<String>,
        linear: Vec<f64>,
        angular: Vec<f64>,
        shown: usize,
    }

    impl Capabilities for Bench {
        fn read_image(&mut self) -> Result<Image> {
            Ok(Image::blank(4, 3, 3))
        }

        fn set_linear_velocity(&mut self, v: f64) -> Result<()> {
            self.linear.push(v);
            Ok(())
        }

        fn set_angular_velocity(&mut self, w: f64) -> Result<()> {
            self.angular.push(w);
            Ok(())
        }

        fn show_image(&mut self, _image: &Image) -> Result<()> {
            self.shown += 1;
            Ok(())
        }

        fn console_write(&mut self, text: &str) {
            self.console.push(text.to_string());
        }
    }

    fn run(source: &str) -> (Bench, std::result::Result<(), ScriptError>) {
        let mut bench = Bench::default();
        let mut interp = Interpreter::new(KillSwitch::new());
        let result = Script::compile(source, 1).and_then(|script| interp.run(&script, &mut bench));
        (bench, result)
    }

    fn output(source: &str) -> Vec<String> {
        let (bench, result) = run(source);
        result.unwrap();
        bench.console
    }

    #[test]
    fn test_print_arithmetic() {
        assert_eq!(
            output("print(1 + 2 * 3, 7 / 2, 7 // 2, 2 ** 3, -7 % 3)\n"),
            vec!["7 3.5 3 8 2"]
        );
    }

    #[test]
    fn test_functions_and_recursion() {
        let source = "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nprint(fib(15))\n";
        assert_eq!(output(source), vec!["610"]);
    }

    #[test]
    fn test_loops_break_continue() {
        let source = "total = 0\nfor i in range(10):\n    if i % 2 == 0:\n        continue\n    if i > 7:\n        break\n    total += i\nprint(total)\n";
        assert_eq!(output(source), vec!["16"]);
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(output("n = 0\nwhile n < 5:\n    n += 1\nprint(n)\n"), vec!["5"]);
    }

    #[test]
    fn test_lists() {
        let source = "xs = [3, 1]\nxs.append(2)\nxs[0] = 9\nprint(xs, len(xs), xs.pop(), max(xs))\n";
        assert_eq!(output(source), vec!["[9, 1] 3 2 9"]);
    }

    #[test]
    fn test_globals_and_locals() {
        let source = "count = 0\ndef bump():\n    global count\n    count += 1\ndef shadow():\n    count = 100\nbump()\nbump()\nshadow()\nprint(count)\n";
        assert_eq!(output(source), vec!["2"]);
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        assert_eq!(
            output("print(0 or 'x', 1 and 2, not 0, 3 if False else 4)\n"),
            vec!["x 2 True 4"]
        );
    }

    #[test]
    fn test_capabilities_dispatch() {
        let source = "from HAL import HAL\nfrom GUI import GUI\nimg = HAL.getImage()\nGUI.showImage(img)\nHAL.motors.sendV(2)\nHAL.motors.sendW(-0.5)\nconsole.print(img.shape)\n";
        let (bench, result) = run(source);
        result.unwrap();
        assert_eq!(bench.linear, vec![2.0]);
        assert_eq!(bench.angular, vec![-0.5]);
        assert_eq!(bench.shown, 1);
        assert_eq!(bench.console, vec!["[3, 4, 3]"]);
    }

    #[test]
    fn test_math_module() {
        assert_eq!(
            output("import math\nprint(math.sqrt(16), math.floor(2.7), round(math.pi, 2))\n"),
            vec!["4.0 2 3.14"]
        );
    }

    #[test]
    fn test_globals_persist_between_runs() {
        let mut bench = Bench::default();
        let mut interp = Interpreter::new(KillSwitch::new());
        let setup = Script::compile("x = 10\n", 1).unwrap();
        let step = Script::compile("x += 1\n", 2).unwrap();
        interp.run(&setup, &mut bench).unwrap();
        interp.run(&step, &mut bench).unwrap();
        interp.run(&step, &mut bench).unwrap();
        assert!(matches!(interp.global("x"), Some(Value::Int(12))));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let (_, result) = run("x = 1\ny = x / 0\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivision);
        assert_eq!(err.line, 2);

        let (_, result) = run("print(undefined)\n");
        assert_eq!(result.unwrap_err().to_string(), "line 1: NameError: name 'undefined' is not defined");
    }

    #[test]
    fn test_line_offset_applies_to_runtime_errors() {
        let mut bench = Bench::default();
        let mut interp = Interpreter::new(KillSwitch::new());
        let script = Script::compile("a = 1\nb = a + 'x'\n", 5).unwrap();
        let err = interp.run(&script, &mut bench).unwrap_err();
        assert_eq!(err.line, 6);
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_unknown_import() {
        let (_, result) = run("import os\n");
        assert_eq!(result.unwrap_err().kind, ErrorKind::Import);
    }

    #[test]
    fn test_recursion_limit() {
        // Debug builds use large frames; give the walk some headroom.
        let kind = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(|| {
                let (_, result) = run("def f(n):\n    return f(n + 1)\nf(0)\n");
                result.unwrap_err().kind
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(kind, ErrorKind::Recursion);
    }

    #[test]
    fn test_nested_recursion_hits_eval_limit() {
        let negations = "-(".repeat(40);
        let closing = ")".repeat(40);
        let source = format!("def f(n):\n    return {negations}f(n + 1){closing}\nf(0)\n");
        let kind = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || run(&source).1.unwrap_err().kind)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(kind, ErrorKind::Recursion);
    }

    #[test]
    fn test_self_referencing_list() {
        assert_eq!(
            output("a = [1]\na.append(a)\nprint(a)\nprint(a == a, len(a))\n"),
            vec!["[1, [...]]", "True 2"]
        );

        let (_, result) = run("a = [1]\na.append(a)\nb = [1]\nb.append(b)\nsame = a == b\n");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Recursion);
        assert_eq!(err.line, 5);
    }

    #[test]
    fn test_deeply_nested_source_is_a_syntax_error() {
        let source = format!("x = {}1{}\n", "(".repeat(200_000), ")".repeat(200_000));
        let (_, result) = run(&source);
        assert_eq!(result.unwrap_err().kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_kill_switch_stops_infinite_loop() {
        let kill = KillSwitch::new();
        let remote = kill.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            remote.kill();
        });

        let mut bench = Bench::default();
        let mut interp = Interpreter::new(kill);
        let script = Script::compile("while True:\n    pass\n", 1).unwrap();
        let err = interp.run(&script, &mut bench).unwrap_err();
        stopper.join().unwrap();
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_empty_script() {
        let script = Script::compile("# nothing\n\n", 1).unwrap();
        assert!(script.is_empty());
    }
}
