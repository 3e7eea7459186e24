//! Programs driven by the cyclic executor.

use crate::capability::Capabilities;
use crate::execute::KillSwitch;
use crate::partition::{PartitionResult, loop_first_line};
use crate::script::{Interpreter, Script, ScriptError};

/// Source of a partitioned program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    /// Code run once before the loop.
    pub setup_code: String,
    /// Loop body, already dedented.
    pub loop_code: String,
    /// Line of the submitted program holding the first loop line.
    pub loop_first_line: usize,
}

impl ProgramSource {
    /// Source whose loop header had a line of its own after the setup code.
    pub fn new(setup_code: impl Into<String>, loop_code: impl Into<String>) -> Self {
        let setup_code = setup_code.into();
        Self {
            loop_first_line: loop_first_line(&setup_code, false),
            setup_code,
            loop_code: loop_code.into(),
        }
    }
}

impl From<&PartitionResult> for ProgramSource {
    fn from(program: &PartitionResult) -> Self {
        Self {
            setup_code: program.setup_code.clone(),
            loop_code: program.loop_code.clone(),
            loop_first_line: program.loop_first_line,
        }
    }
}

/// A two-phase program: setup once, then one loop body per cycle.
///
/// Implementations keep state between calls; names bound during setup are
/// visible to every iteration.
pub trait Program {
    /// Run the setup phase.
    fn setup(&mut self, caps: &mut dyn Capabilities) -> Result<(), ScriptError>;

    /// Run one loop iteration.
    fn iterate(&mut self, caps: &mut dyn Capabilities) -> Result<(), ScriptError>;

    /// Whether there is a loop body at all.
    fn has_loop(&self) -> bool;
}

/// A [`Program`] compiled from control-language source.
#[derive(Debug)]
pub struct ScriptProgram {
    interpreter: Interpreter,
    setup: Script,
    body: Script,
}

impl ScriptProgram {
    /// Compile both phases.
    ///
    /// Line numbers in diagnostics refer to the submitted program: the loop
    /// body is numbered from `source.loop_first_line`.
    pub fn compile(source: &ProgramSource, kill: KillSwitch) -> Result<Self, ScriptError> {
        let setup = Script::compile(&source.setup_code, 1)?;
        let body = Script::compile(&source.loop_code, source.loop_first_line)?;
        Ok(Self {
            interpreter: Interpreter::new(kill),
            setup,
            body,
        })
    }
}

impl Program for ScriptProgram {
    fn setup(&mut self, caps: &mut dyn Capabilities) -> Result<(), ScriptError> {
        self.interpreter.run(&self.setup, caps)
    }

    fn iterate(&mut self, caps: &mut dyn Capabilities) -> Result<(), ScriptError> {
        self.interpreter.run(&self.body, caps)
    }

    fn has_loop(&self) -> bool {
        !self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Image;
    use crate::error::Result;
    use crate::partition::split;

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl Capabilities for Lines {
        fn read_image(&mut self) -> Result<Image> {
            Ok(Image::blank(1, 1, 1))
        }

        fn set_linear_velocity(&mut self, _v: f64) -> Result<()> {
            Ok(())
        }

        fn set_angular_velocity(&mut self, _w: f64) -> Result<()> {
            Ok(())
        }

        fn show_image(&mut self, _image: &Image) -> Result<()> {
            Ok(())
        }

        fn console_write(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
    }

    #[test]
    fn test_state_flows_from_setup_into_loop() {
        let source = ProgramSource::new("n = 0\n", "n += 1\nprint(n)\n");
        let mut program = ScriptProgram::compile(&source, KillSwitch::new()).unwrap();
        let mut caps = Lines::default();
        program.setup(&mut caps).unwrap();
        program.iterate(&mut caps).unwrap();
        program.iterate(&mut caps).unwrap();
        assert_eq!(caps.0, vec!["1", "2"]);
        assert!(program.has_loop());
    }

    #[test]
    fn test_loop_errors_use_original_line_numbers() {
        let source = ProgramSource::new("a = 1\nb = 2\n", "c = 3\nd = missing\n");
        let mut program = ScriptProgram::compile(&source, KillSwitch::new()).unwrap();
        let mut caps = Lines::default();
        program.setup(&mut caps).unwrap();
        let err = program.iterate(&mut caps).unwrap_err();
        // setup (2 lines) + header = 3; body starts on line 4.
        assert_eq!(err.line, 5);
    }

    #[test]
    fn test_inline_loop_errors_use_header_line() {
        let partitioned = split("a = 1\nwhile True: b = missing\n", 0);
        let mut program = ScriptProgram::compile(&ProgramSource::from(&partitioned), KillSwitch::new()).unwrap();
        let mut caps = Lines::default();
        program.setup(&mut caps).unwrap();
        let err = program.iterate(&mut caps).unwrap_err();
        assert_eq!(err.line, 2);

        let partitioned = split("a = 1\nwhile True:\n    b = missing\n", 0);
        let mut program = ScriptProgram::compile(&ProgramSource::from(&partitioned), KillSwitch::new()).unwrap();
        program.setup(&mut caps).unwrap();
        assert_eq!(program.iterate(&mut caps).unwrap_err().line, 3);
    }

    #[test]
    fn test_empty_loop_body() {
        let program = ScriptProgram::compile(&ProgramSource::new("x = 1\n", ""), KillSwitch::new()).unwrap();
        assert!(!program.has_loop());
    }

    #[test]
    fn test_syntax_error_reported_at_compile() {
        let err = ScriptProgram::compile(&ProgramSource::new("x = (\n", ""), KillSwitch::new())
            .err()
            .unwrap();
        assert_eq!(err.kind, crate::script::ErrorKind::Syntax);
    }
}
