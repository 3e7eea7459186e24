//! Native functions and the capability bridge.

use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::ast::CmpOp;
use super::error::ErrorKind;
use super::ops;
use super::value::{Builtin, Fault, Outcome, Value, range_len};
use crate::capability::Capabilities;
use crate::error::Error;
use crate::execute::KillSwitch;

/// Longest single wait inside `time.sleep` between kill checks.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// What a native call may touch besides its arguments.
pub struct Host<'a> {
    pub caps: &'a mut dyn Capabilities,
    pub kill: &'a KillSwitch,
}

/// Call a native function.
pub fn call(builtin: Builtin, args: Vec<Value>, host: &mut Host<'_>) -> Outcome<Value> {
    match builtin {
        Builtin::Print => {
            let line = args
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            host.caps.console_write(&line);
            Ok(Value::None)
        }
        Builtin::GetImage => {
            arity(builtin, &args, 0, 0)?;
            let image = host.caps.read_image().map_err(capability_fault)?;
            Ok(Value::Image(Rc::new(image)))
        }
        Builtin::SendV => {
            arity(builtin, &args, 1, 1)?;
            let v = number(builtin, &args[0])?;
            host.caps.set_linear_velocity(v).map_err(capability_fault)?;
            Ok(Value::None)
        }
        Builtin::SendW => {
            arity(builtin, &args, 1, 1)?;
            let w = number(builtin, &args[0])?;
            host.caps.set_angular_velocity(w).map_err(capability_fault)?;
            Ok(Value::None)
        }
        Builtin::ShowImage => {
            arity(builtin, &args, 1, 1)?;
            match &args[0] {
                Value::Image(image) => {
                    host.caps.show_image(image).map_err(capability_fault)?;
                    Ok(Value::None)
                }
                other => Err(Fault::type_error(format!(
                    "showImage() expects an image, got '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Sleep => {
            arity(builtin, &args, 1, 1)?;
            let seconds = number(builtin, &args[0])?;
            if seconds < 0.0 || seconds.is_nan() {
                return Err(Fault::value_error("sleep length must be non-negative"));
            }
            sleep(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX), host.kill)?;
            Ok(Value::None)
        }
        Builtin::Time => {
            arity(builtin, &args, 0, 0)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            Ok(Value::Float(now.as_secs_f64()))
        }
        _ => pure(builtin, args),
    }
}

/// Sleep in short slices so a kill request is honoured promptly.
fn sleep(duration: Duration, kill: &KillSwitch) -> Outcome<()> {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if kill.is_killed() {
            return Err(Fault::new(ErrorKind::Interrupted, "execution stopped"));
        }
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => SLEEP_SLICE,
        };
        if remaining.is_zero() {
            return Ok(());
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

fn capability_fault(err: Error) -> Fault {
    match err {
        Error::Aborted => Fault::new(ErrorKind::Interrupted, "execution stopped"),
        other => Fault::new(ErrorKind::Capability, other.to_string()),
    }
}

fn arity(builtin: Builtin, args: &[Value], min: usize, max: usize) -> Outcome<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(Fault::type_error(format!(
            "{}() takes {expected} argument(s) ({} given)",
            builtin.name(),
            args.len()
        )));
    }
    Ok(())
}

fn number(builtin: Builtin, value: &Value) -> Outcome<f64> {
    value.as_f64().ok_or_else(|| {
        Fault::type_error(format!(
            "{}() argument must be a number, not '{}'",
            builtin.name(),
            value.type_name()
        ))
    })
}

fn integer(builtin: Builtin, value: &Value) -> Outcome<i64> {
    value.as_i64().ok_or_else(|| {
        Fault::type_error(format!(
            "{}() argument must be an integer, not '{}'",
            builtin.name(),
            value.type_name()
        ))
    })
}

fn math_domain() -> Fault {
    Fault::value_error("math domain error")
}

fn float_to_int(value: f64) -> Outcome<i64> {
    if value.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if value.is_infinite() {
        return Err(Fault::new(
            ErrorKind::Overflow,
            "cannot convert float infinity to integer",
        ));
    }
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    if value >= i64::MAX as f64 || value < i64::MIN as f64 {
        return Err(Fault::new(ErrorKind::Overflow, "integer overflow"));
    }
    Ok(value as i64)
}

/// Functions that only look at their arguments.
fn pure(builtin: Builtin, args: Vec<Value>) -> Outcome<Value> {
    match builtin {
        Builtin::Abs => {
            arity(builtin, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => {
                    let i = integer(builtin, other)?;
                    i.checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| Fault::new(ErrorKind::Overflow, "integer overflow"))
                }
            }
        }
        Builtin::Min | Builtin::Max => extremum(builtin, args),
        Builtin::Int => {
            arity(builtin, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Float(f)) => float_to_int(*f).map(Value::Int),
                Some(Value::Str(s)) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
                    Fault::value_error(format!("invalid literal for int() with base 10: '{s}'"))
                }),
                Some(other) => integer(builtin, other).map(Value::Int),
            }
        }
        Builtin::Float => {
            arity(builtin, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s).map(Value::Float),
                Some(other) => number(builtin, other).map(Value::Float),
            }
        }
        Builtin::Str => {
            arity(builtin, &args, 0, 1)?;
            Ok(Value::str(
                &args.first().map(Value::to_string).unwrap_or_default(),
            ))
        }
        Builtin::Bool => {
            arity(builtin, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        Builtin::Len => {
            arity(builtin, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count() as i64,
                Value::List(items) => items.borrow().len() as i64,
                Value::Range(start, stop, step) => range_len(*start, *stop, *step),
                Value::Image(image) => i64::from(image.height),
                other => {
                    return Err(Fault::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len))
        }
        Builtin::Range => {
            arity(builtin, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|arg| integer(builtin, arg))
                .collect::<Outcome<Vec<i64>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(Fault::type_error("range expected 1 to 3 arguments")),
            };
            if step == 0 {
                return Err(Fault::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(start, stop, step))
        }
        Builtin::Round => {
            arity(builtin, &args, 1, 2)?;
            let digits = match args.get(1) {
                None | Some(Value::None) => None,
                Some(other) => Some(integer(builtin, other)?),
            };
            match (&args[0], digits) {
                (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
                (Value::Float(f), Some(digits)) => {
                    let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
                    let rounded = (f * scale).round_ties_even() / scale;
                    Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
                }
                (other, _) => integer(builtin, other).map(Value::Int),
            }
        }
        Builtin::Sqrt => unary_math(builtin, &args, |x| (x >= 0.0).then(|| x.sqrt())),
        Builtin::Sin => unary_math(builtin, &args, |x| x.is_finite().then(|| x.sin())),
        Builtin::Cos => unary_math(builtin, &args, |x| x.is_finite().then(|| x.cos())),
        Builtin::Tan => unary_math(builtin, &args, |x| x.is_finite().then(|| x.tan())),
        Builtin::Atan => unary_math(builtin, &args, |x| Some(x.atan())),
        Builtin::Exp => unary_math(builtin, &args, |x| Some(x.exp())),
        Builtin::Log => unary_math(builtin, &args, |x| (x > 0.0).then(|| x.ln())),
        Builtin::Fabs => unary_math(builtin, &args, |x| Some(x.abs())),
        Builtin::Radians => unary_math(builtin, &args, |x| Some(x.to_radians())),
        Builtin::Degrees => unary_math(builtin, &args, |x| Some(x.to_degrees())),
        Builtin::Atan2 | Builtin::Hypot => {
            arity(builtin, &args, 2, 2)?;
            let a = number(builtin, &args[0])?;
            let b = number(builtin, &args[1])?;
            Ok(Value::Float(if builtin == Builtin::Atan2 {
                a.atan2(b)
            } else {
                a.hypot(b)
            }))
        }
        Builtin::Floor | Builtin::Ceil => {
            arity(builtin, &args, 1, 1)?;
            if let Some(i) = args[0].as_i64() {
                return Ok(Value::Int(i));
            }
            let x = number(builtin, &args[0])?;
            let rounded = if builtin == Builtin::Floor {
                x.floor()
            } else {
                x.ceil()
            };
            float_to_int(rounded).map(Value::Int)
        }
        other => Err(Fault::type_error(format!(
            "{}() needs a host and cannot be called here",
            other.name()
        ))),
    }
}

fn unary_math(builtin: Builtin, args: &[Value], f: impl Fn(f64) -> Option<f64>) -> Outcome<Value> {
    arity(builtin, args, 1, 1)?;
    let x = number(builtin, &args[0])?;
    f(x).map(Value::Float).ok_or_else(math_domain)
}

fn parse_float(text: &str) -> Outcome<f64> {
    let trimmed = text.trim();
    let parsed = match trimmed.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    };
    parsed.ok_or_else(|| Fault::value_error(format!("could not convert string to float: '{text}'")))
}

fn extremum(builtin: Builtin, args: Vec<Value>) -> Outcome<Value> {
    let candidates = match args.as_slice() {
        [] => {
            return Err(Fault::type_error(format!(
                "{}() expected at least 1 argument, got 0",
                builtin.name()
            )));
        }
        [Value::List(items)] => items.borrow().clone(),
        [Value::Range(start, stop, step)] => {
            if range_len(*start, *stop, *step) == 0 {
                Vec::new()
            } else if (builtin == Builtin::Min) == (*step > 0) {
                vec![Value::Int(*start)]
            } else {
                let last = i128::from(*start)
                    + i128::from(range_len(*start, *stop, *step) - 1) * i128::from(*step);
                vec![Value::Int(i64::try_from(last).unwrap_or(*start))]
            }
        }
        _ => args,
    };

    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        Fault::value_error(format!("{}() arg is an empty sequence", builtin.name()))
    })?;
    let replace_when = if builtin == Builtin::Min {
        CmpOp::Lt
    } else {
        CmpOp::Gt
    };
    for candidate in iter {
        if ops::compare(replace_when, &candidate, &best)? {
            best = candidate;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Image;
    use crate::error::Result;

    #[derive(Default)]
    struct Fake {
        console: Vec<String>,
        linear: Vec<f64>,
        frames: usize,
        fail_reads: bool,
    }

    impl Capabilities for Fake {
        fn read_image(&mut self) -> Result<Image> {
            if self.fail_reads {
                return Err(Error::Aborted);
            }
            Ok(Image::blank(2, 2, 3))
        }

        fn set_linear_velocity(&mut self, v: f64) -> Result<()> {
            self.linear.push(v);
            Ok(())
        }

        fn set_angular_velocity(&mut self, _w: f64) -> Result<()> {
            Ok(())
        }

        fn show_image(&mut self, _image: &Image) -> Result<()> {
            self.frames += 1;
            Ok(())
        }

        fn console_write(&mut self, text: &str) {
            self.console.push(text.to_string());
        }
    }

    fn run(builtin: Builtin, args: Vec<Value>) -> Outcome<Value> {
        let mut fake = Fake::default();
        let kill = KillSwitch::new();
        call(builtin, args, &mut Host { caps: &mut fake, kill: &kill })
    }

    #[test]
    fn test_print_joins_with_spaces() {
        let mut fake = Fake::default();
        let kill = KillSwitch::new();
        let mut host = Host { caps: &mut fake, kill: &kill };
        call(Builtin::Print, vec![Value::str("v ="), Value::Float(2.0)], &mut host).unwrap();
        assert_eq!(fake.console, vec!["v = 2.0".to_string()]);
    }

    #[test]
    fn test_capability_calls() {
        let mut fake = Fake::default();
        let kill = KillSwitch::new();
        let mut host = Host { caps: &mut fake, kill: &kill };
        let image = call(Builtin::GetImage, vec![], &mut host).unwrap();
        call(Builtin::ShowImage, vec![image], &mut host).unwrap();
        call(Builtin::SendV, vec![Value::Int(3)], &mut host).unwrap();
        assert_eq!(fake.frames, 1);
        assert_eq!(fake.linear, vec![3.0]);
    }

    #[test]
    fn test_aborted_capability_interrupts() {
        let mut fake = Fake {
            fail_reads: true,
            ..Fake::default()
        };
        let kill = KillSwitch::new();
        let fault = call(Builtin::GetImage, vec![], &mut Host { caps: &mut fake, kill: &kill }).unwrap_err();
        assert_eq!(fault.kind, ErrorKind::Interrupted);
    }

    #[test]
    fn test_sleep_honours_kill() {
        let mut fake = Fake::default();
        let kill = KillSwitch::new();
        kill.kill();
        let started = Instant::now();
        let fault = call(Builtin::Sleep, vec![Value::Int(10)], &mut Host { caps: &mut fake, kill: &kill }).unwrap_err();
        assert_eq!(fault.kind, ErrorKind::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_conversions() {
        assert!(matches!(run(Builtin::Int, vec![Value::Float(-2.7)]), Ok(Value::Int(-2))));
        assert!(matches!(run(Builtin::Int, vec![Value::str(" 42 ")]), Ok(Value::Int(42))));
        assert_eq!(run(Builtin::Int, vec![Value::str("x")]).unwrap_err().kind, ErrorKind::Value);
        assert!(matches!(run(Builtin::Float, vec![Value::str("1.5")]), Ok(Value::Float(f)) if f == 1.5));
        assert_eq!(run(Builtin::Str, vec![Value::Float(2.0)]).unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_round_half_even() {
        assert!(matches!(run(Builtin::Round, vec![Value::Float(2.5)]), Ok(Value::Int(2))));
        assert!(matches!(run(Builtin::Round, vec![Value::Float(3.5)]), Ok(Value::Int(4))));
        assert!(
            matches!(run(Builtin::Round, vec![Value::Float(1.234), Value::Int(1)]), Ok(Value::Float(f)) if (f - 1.2).abs() < 1e-12)
        );
    }

    #[test]
    fn test_min_max() {
        let args = vec![Value::Int(3), Value::Float(1.5), Value::Int(2)];
        assert_eq!(run(Builtin::Min, args.clone()).unwrap().to_string(), "1.5");
        assert_eq!(run(Builtin::Max, args).unwrap().to_string(), "3");
        assert_eq!(run(Builtin::Max, vec![Value::Range(0, 10, 3)]).unwrap().to_string(), "9");
        assert_eq!(
            run(Builtin::Min, vec![Value::list(vec![])]).unwrap_err().kind,
            ErrorKind::Value
        );
    }

    #[test]
    fn test_math_domain() {
        assert_eq!(run(Builtin::Sqrt, vec![Value::Int(-1)]).unwrap_err().kind, ErrorKind::Value);
        assert!(matches!(run(Builtin::Sqrt, vec![Value::Int(9)]), Ok(Value::Float(f)) if f == 3.0));
        assert!(matches!(run(Builtin::Floor, vec![Value::Float(-0.5)]), Ok(Value::Int(-1))));
    }

    #[test]
    fn test_range_and_len() {
        let range = run(Builtin::Range, vec![Value::Int(2), Value::Int(8), Value::Int(2)]).unwrap();
        assert!(matches!(run(Builtin::Len, vec![range]), Ok(Value::Int(3))));
        assert_eq!(
            run(Builtin::Range, vec![Value::Int(0), Value::Int(1), Value::Int(0)]).unwrap_err().kind,
            ErrorKind::Value
        );
        assert_eq!(run(Builtin::Len, vec![Value::Int(1)]).unwrap_err().kind, ErrorKind::Type);
    }
}
