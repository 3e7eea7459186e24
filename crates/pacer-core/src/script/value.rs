//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::ast::FunctionDef;
use super::error::{ErrorKind, ScriptError};
use crate::capability::Image;

/// Shared, mutable list storage.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Lists nested deeper than this render as `[...]`.
pub const MAX_RENDER_DEPTH: usize = 100;

/// An error raised by an operation before a source line is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: ErrorKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn at(self, line: usize) -> ScriptError {
        ScriptError::new(line, self.kind, self.message)
    }
}

pub type Outcome<T> = Result<T, Fault>;

/// Built-in modules available to programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Hal,
    Motors,
    Gui,
    Console,
    Time,
    Math,
}

impl Module {
    /// Resolve an importable module name.
    pub fn from_import(name: &str) -> Option<Self> {
        match name {
            "HAL" => Some(Self::Hal),
            "GUI" => Some(Self::Gui),
            "console" => Some(Self::Console),
            "time" => Some(Self::Time),
            "math" => Some(Self::Math),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hal => "HAL",
            Self::Motors => "motors",
            Self::Gui => "GUI",
            Self::Console => "console",
            Self::Time => "time",
            Self::Math => "math",
        }
    }

    /// Look up a module attribute.
    pub fn attr(self, name: &str) -> Option<Value> {
        let builtin = match (self, name) {
            // `from HAL import HAL` and `from GUI import GUI` bind the
            // module object itself.
            (Self::Hal, "HAL") => return Some(Value::Module(Self::Hal)),
            (Self::Gui, "GUI") => return Some(Value::Module(Self::Gui)),
            (Self::Hal, "motors") => return Some(Value::Module(Self::Motors)),
            (Self::Hal, "getImage") => Builtin::GetImage,
            (Self::Hal, "setV") | (Self::Motors, "sendV") => Builtin::SendV,
            (Self::Hal, "setW") | (Self::Motors, "sendW") => Builtin::SendW,
            (Self::Gui, "showImage") => Builtin::ShowImage,
            (Self::Console, "print") => Builtin::Print,
            (Self::Time, "sleep") => Builtin::Sleep,
            (Self::Time, "time") => Builtin::Time,
            (Self::Math, "pi") => return Some(Value::Float(std::f64::consts::PI)),
            (Self::Math, "e") => return Some(Value::Float(std::f64::consts::E)),
            (Self::Math, "inf") => return Some(Value::Float(f64::INFINITY)),
            (Self::Math, other) => Builtin::math(other)?,
            _ => return None,
        };
        Some(Value::Builtin(builtin))
    }
}

/// Native functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Abs,
    Min,
    Max,
    Int,
    Float,
    Str,
    Bool,
    Len,
    Range,
    Round,
    GetImage,
    SendV,
    SendW,
    ShowImage,
    Sleep,
    Time,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Atan,
    Atan2,
    Hypot,
    Exp,
    Log,
    Floor,
    Ceil,
    Fabs,
    Radians,
    Degrees,
}

impl Builtin {
    /// Global built-in functions, available without an import.
    pub fn global(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Self::Print,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "bool" => Self::Bool,
            "len" => Self::Len,
            "range" => Self::Range,
            "round" => Self::Round,
            _ => return None,
        })
    }

    fn math(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Self::Sqrt,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "hypot" => Self::Hypot,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "fabs" => Self::Fabs,
            "radians" => Self::Radians,
            "degrees" => Self::Degrees,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Len => "len",
            Self::Range => "range",
            Self::Round => "round",
            Self::GetImage => "getImage",
            Self::SendV => "sendV",
            Self::SendW => "sendW",
            Self::ShowImage => "showImage",
            Self::Sleep => "sleep",
            Self::Time => "time",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Hypot => "hypot",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Fabs => "fabs",
            Self::Radians => "radians",
            Self::Degrees => "degrees",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMethod {
    Append,
    Pop,
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    /// Lazy `range(start, stop, step)`.
    Range(i64, i64, i64),
    Image(Rc<Image>),
    Function(Arc<FunctionDef>),
    Builtin(Builtin),
    Module(Module),
    Method(ListRef, ListMethod),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Self::Str(Rc::from(text))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Range(..) => "range",
            Self::Image(_) => "image",
            Self::Function(_) => "function",
            Self::Builtin(_) | Self::Method(..) => "builtin_function_or_method",
            Self::Module(_) => "module",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Range(start, stop, step) => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// Numeric view: bools and ints widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view: bools widen, floats do not.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// `repr()` form: strings quoted.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, true, &mut Vec::new());
        out
    }

    /// Append the text form to `out`. `open` holds the lists being rendered
    /// further up; a list that contains itself renders as `[...]`, as does
    /// nesting deeper than [`MAX_RENDER_DEPTH`].
    fn render(&self, out: &mut String, quoted: bool, open: &mut Vec<*const RefCell<Vec<Value>>>) {
        match self {
            Self::Str(s) if quoted => {
                out.push('\'');
                out.push_str(&s.replace('\\', "\\\\").replace('\'', "\\'"));
                out.push('\'');
            }
            Self::List(items) => {
                let id = Rc::as_ptr(items);
                if open.contains(&id) || open.len() >= MAX_RENDER_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                open.push(id);
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render(out, true, open);
                }
                out.push(']');
                open.pop();
            }
            other => {
                use fmt::Write;
                let _ = write!(out, "{other}");
            }
        }
    }
}

/// Number of items in `range(start, stop, step)`.
pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Python-style float formatting.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => text,
        };
    }

    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
            Self::List(_) => {
                let mut out = String::new();
                self.render(&mut out, false, &mut Vec::new());
                f.write_str(&out)
            }
            Self::Range(start, stop, 1) => write!(f, "range({start}, {stop})"),
            Self::Range(start, stop, step) => write!(f, "range({start}, {stop}, {step})"),
            Self::Image(image) => {
                let (h, w, c) = image.shape();
                write!(f, "<image {h}x{w}x{c}>")
            }
            Self::Function(def) => write!(f, "<function {}>", def.name),
            Self::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
            Self::Module(module) => write!(f, "<module '{}'>", module.name()),
            Self::Method(_, ListMethod::Append) => f.write_str("<built-in method append>"),
            Self::Method(_, ListMethod::Pop) => f.write_str("<built-in method pop>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1e-7), "1e-07");
        assert_eq!(format_float(1.5e20), "1.5e+20");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn test_display_and_repr() {
        let list = Value::list(vec![Value::Int(1), Value::str("a"), Value::None]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
        assert_eq!(Value::str("a").to_string(), "a");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Range(0, 5, 1).to_string(), "range(0, 5)");
    }

    #[test]
    fn test_self_referencing_list_renders_ellipsis() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_string(), "[1, [...]]");
        assert_eq!(list.repr(), "[1, [...]]");
    }

    #[test]
    fn test_deep_list_rendering_is_bounded() {
        let mut value = Value::Int(0);
        for _ in 0..1_000 {
            value = Value::list(vec![value]);
        }
        let text = value.to_string();
        assert!(text.starts_with("[[["));
        assert!(text.contains("[...]"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Float(0.1).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(!Value::Range(3, 3, 1).truthy());
    }

    #[test]
    fn test_range_len() {
        assert_eq!(range_len(0, 10, 1), 10);
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -2), 5);
        assert_eq!(range_len(5, 0, 1), 0);
    }

    #[test]
    fn test_module_attributes() {
        assert!(matches!(
            Module::Hal.attr("motors"),
            Some(Value::Module(Module::Motors))
        ));
        assert!(matches!(
            Module::Motors.attr("sendV"),
            Some(Value::Builtin(Builtin::SendV))
        ));
        assert!(matches!(Module::Math.attr("sqrt"), Some(Value::Builtin(Builtin::Sqrt))));
        assert!(Module::Gui.attr("getImage").is_none());
        assert!(Module::from_import("os").is_none());
    }
}
