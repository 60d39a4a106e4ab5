//! Built-in function implementations
//!
//! This module provides the implementation of C library functions that are
//! directly handled by the interpreter rather than being defined in user code.
//! A user definition with the same name takes precedence.
//!
//! # Supported Built-ins
//!
//! - `printf(format, ...)`: Formatted output to the output buffer
//! - `putchar(c)`, `puts(s)`: Character and line output
//! - `malloc(size)`, `calloc(count, size)`: Heap allocation
//! - `free(ptr)`: Release a heap block
//! - `abs(n)`: Absolute value
//! - `exit(status)`: End the program with a status
//!
//! # Implementation Notes
//!
//! - `printf` supports flags `-`, `0`, `+` and space, a field width, a precision
//!   and the `hh`/`h`/`l`/`ll` length modifiers on `%d %i %u %x %X %c %s %f %p %%`
//! - Sizes passed to `malloc`/`calloc` are in bytes; the block gets one cell per
//!   byte, which always covers the requested objects
//! - `malloc` memory is uninitialized, `calloc` memory is zeroed
//! - `free` turns the block into a tombstone; later accesses are reported

use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::{BaseType, SourceLocation, Type};

/// Return type of a built-in, for type inference
pub(crate) fn builtin_return_type(name: &str) -> Option<Type> {
    match name {
        "malloc" | "calloc" => Some(Type::new(BaseType::Void).with_pointer()),
        "free" | "exit" => Some(Type::new(BaseType::Void)),
        "printf" | "putchar" | "puts" | "abs" => Some(Type::int()),
        _ => None,
    }
}

/// Largest width or precision a conversion may ask for
const MAX_FIELD_WIDTH: usize = 4096;

/// Parsed `%` conversion specification
#[derive(Debug, Default, Clone, PartialEq)]
struct FormatSpec {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    width: usize,
    precision: Option<usize>,
    /// Number of `l` modifiers; -1/-2 for `h`/`hh`
    length: i8,
    conversion: char,
}

/// Decimal digits of a width or precision, at most [`MAX_FIELD_WIDTH`]
fn read_field_width(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    what: &str,
    location: SourceLocation,
) -> Result<usize, RuntimeError> {
    let mut value = 0usize;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = value * 10 + digit as usize;
        if value > MAX_FIELD_WIDTH {
            return Err(RuntimeError::InvalidPrintfFormat {
                message: format!("{} larger than {}", what, MAX_FIELD_WIDTH),
                location,
            });
        }
        chars.next();
    }
    Ok(value)
}

impl Interpreter {
    /// Dispatch a built-in by name; `None` when no built-in has that name
    pub(crate) fn call_builtin(
        &mut self,
        name: &str,
        args: &[Value],
        location: SourceLocation,
    ) -> Option<Result<Value, RuntimeError>> {
        let result = match name {
            "printf" => self.builtin_printf(args, location),
            "putchar" => self.expect_args(name, args, 1, location).and_then(|_| {
                let c = self.int_arg(args[0], location)?;
                self.output.push(c as u8 as char);
                Ok(Value::Int(c as u8 as i64))
            }),
            "puts" => self.expect_args(name, args, 1, location).and_then(|_| {
                let addr = self.pointer_value(args[0], location)?;
                let text = self.read_c_string(addr, location)?;
                self.output.push_str(&text);
                self.output.push('\n');
                Ok(Value::Int(text.len() as i64 + 1))
            }),
            "malloc" => self.expect_args(name, args, 1, location).and_then(|_| {
                let size = self.int_arg(args[0], location)?;
                self.builtin_malloc(size, Value::Uninitialized, location)
            }),
            "calloc" => self.expect_args(name, args, 2, location).and_then(|_| {
                let count = self.int_arg(args[0], location)?;
                let size = self.int_arg(args[1], location)?;
                self.builtin_malloc(count.saturating_mul(size), Value::Int(0), location)
            }),
            "free" => self
                .expect_args(name, args, 1, location)
                .and_then(|_| self.builtin_free(args[0], location)),
            "abs" => self.expect_args(name, args, 1, location).and_then(|_| {
                let n = self.int_arg(args[0], location)?;
                Ok(Value::Int(n.wrapping_abs()))
            }),
            "exit" => self.expect_args(name, args, 1, location).and_then(|_| {
                let code = self.int_arg(args[0], location)?;
                tracing::debug!(code, "program called exit");
                Err(RuntimeError::ProgramExit { code })
            }),
            _ => return None,
        };
        Some(result)
    }

    fn expect_args(
        &self,
        function: &str,
        args: &[Value],
        expected: usize,
        location: SourceLocation,
    ) -> Result<(), RuntimeError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(RuntimeError::ArgumentCountMismatch {
                function: function.to_string(),
                expected,
                got: args.len(),
                location,
            })
        }
    }

    fn int_arg(&self, value: Value, location: SourceLocation) -> Result<i64, RuntimeError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Float(x) => Ok(x as i64),
            other => Err(RuntimeError::type_error(
                format!("expected an integer argument, got {}", other.kind_name()),
                location,
            )),
        }
    }

    pub(crate) fn builtin_malloc(
        &mut self,
        size: i64,
        fill: Value,
        location: SourceLocation,
    ) -> Result<Value, RuntimeError> {
        if size < 0 {
            return Err(RuntimeError::type_error(
                format!("allocation size {} is negative", size),
                location,
            ));
        }
        let addr = self
            .memory
            .heap
            .allocate(size as usize, fill)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        Ok(Value::Pointer(addr))
    }

    pub(crate) fn builtin_free(&mut self, ptr: Value, location: SourceLocation) -> Result<Value, RuntimeError> {
        let addr = match ptr {
            // free(NULL) is a no-op
            Value::Pointer(0) | Value::Int(0) => return Ok(Value::Int(0)),
            Value::Pointer(addr) => addr,
            other => {
                return Err(RuntimeError::type_error(
                    format!("free expects a pointer, got {}", other.kind_name()),
                    location,
                ))
            }
        };
        self.memory
            .heap
            .free(addr)
            .map_err(|e| RuntimeError::from_memory(e, location))?;
        Ok(Value::Int(0))
    }

    pub(crate) fn builtin_printf(&mut self, args: &[Value], location: SourceLocation) -> Result<Value, RuntimeError> {
        let Some((&format_arg, rest)) = args.split_first() else {
            return Err(RuntimeError::InvalidPrintfFormat {
                message: "printf requires at least one argument".to_string(),
                location,
            });
        };
        let format_addr = self.pointer_value(format_arg, location)?;
        let format_str = self.read_c_string(format_addr, location)?;

        let output = self.format_printf(&format_str, rest, location)?;
        let written = output.len();
        self.output.push_str(&output);
        Ok(Value::Int(written as i64))
    }

    fn format_printf(&self, format: &str, args: &[Value], location: SourceLocation) -> Result<String, RuntimeError> {
        let mut output = String::new();
        let mut chars = format.chars().peekable();
        let mut args = args.iter();

        while let Some(ch) = chars.next() {
            if ch != '%' {
                output.push(ch);
                continue;
            }

            let mut spec = FormatSpec::default();
            while let Some(&flag) = chars.peek() {
                match flag {
                    '-' => spec.left_align = true,
                    '0' => spec.zero_pad = true,
                    '+' => spec.plus_sign = true,
                    ' ' => spec.space_sign = true,
                    _ => break,
                }
                chars.next();
            }
            spec.width = read_field_width(&mut chars, "width", location)?;
            if chars.peek() == Some(&'.') {
                chars.next();
                spec.precision = Some(read_field_width(&mut chars, "precision", location)?);
            }
            while let Some(&modifier) = chars.peek() {
                spec.length = match (modifier, spec.length) {
                    ('l', n) if n < 2 => n + 1,
                    ('h', n) if n > -2 => n - 1,
                    ('l' | 'h', _) => {
                        return Err(RuntimeError::InvalidPrintfFormat {
                            message: format!("unsupported length modifier before '{}'", modifier),
                            location,
                        })
                    }
                    _ => break,
                };
                chars.next();
            }
            spec.conversion = chars.next().ok_or_else(|| RuntimeError::InvalidPrintfFormat {
                message: "format string ends inside a conversion".to_string(),
                location,
            })?;

            if spec.conversion == '%' {
                output.push('%');
                continue;
            }

            let arg = *args.next().ok_or_else(|| RuntimeError::InvalidPrintfFormat {
                message: format!("Not enough arguments for '%{}'", spec.conversion),
                location,
            })?;
            let text = self.format_conversion(&spec, arg, location)?;
            output.push_str(&text);
        }

        Ok(output)
    }

    fn format_conversion(&self, spec: &FormatSpec, arg: Value, location: SourceLocation) -> Result<String, RuntimeError> {
        let mismatch = |expected: &str| RuntimeError::InvalidPrintfFormat {
            message: format!(
                "%{} expects {}, got {}",
                spec.conversion,
                expected,
                arg.kind_name()
            ),
            location,
        };

        let (sign, body, numeric) = match spec.conversion {
            'd' | 'i' => {
                let n = match arg {
                    Value::Int(n) => n,
                    Value::Pointer(a) => a as i64,
                    _ => return Err(mismatch("an integer")),
                };
                let n = match spec.length {
                    l if l <= -2 => n as i8 as i64,
                    -1 => n as i16 as i64,
                    0 => n as i32 as i64,
                    _ => n,
                };
                let sign = if n < 0 {
                    "-"
                } else if spec.plus_sign {
                    "+"
                } else if spec.space_sign {
                    " "
                } else {
                    ""
                };
                (sign, Self::min_digits(n.unsigned_abs().to_string(), spec.precision), true)
            }
            'u' | 'x' | 'X' => {
                let n = arg.as_int().ok_or_else(|| mismatch("an integer"))?;
                let n = match spec.length {
                    l if l <= -2 => n as u8 as u64,
                    -1 => n as u16 as u64,
                    0 => n as u32 as u64,
                    _ => n as u64,
                };
                let digits = match spec.conversion {
                    'u' => n.to_string(),
                    'x' => format!("{:x}", n),
                    _ => format!("{:X}", n),
                };
                ("", Self::min_digits(digits, spec.precision), true)
            }
            'c' => {
                let c = arg.as_int().ok_or_else(|| mismatch("a character"))?;
                ("", (c as u8 as char).to_string(), false)
            }
            's' => {
                let text = match arg {
                    Value::Pointer(0) | Value::Int(0) => "(null)".to_string(),
                    Value::Pointer(addr) => self.read_c_string(addr, location)?,
                    _ => return Err(mismatch("a string")),
                };
                let text = match spec.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                ("", text, false)
            }
            'f' => {
                let x = arg.as_float().ok_or_else(|| mismatch("a floating-point value"))?;
                let precision = spec.precision.unwrap_or(6);
                let sign = if x.is_sign_negative() && x != 0.0 {
                    "-"
                } else if spec.plus_sign {
                    "+"
                } else if spec.space_sign {
                    " "
                } else {
                    ""
                };
                (sign, format!("{:.*}", precision, x.abs()), true)
            }
            'p' => match arg {
                Value::Pointer(0) | Value::Int(0) => ("", "(nil)".to_string(), false),
                Value::Pointer(addr) => ("", format!("0x{:x}", addr), false),
                _ => return Err(mismatch("a pointer")),
            },
            other => {
                return Err(RuntimeError::InvalidPrintfFormat {
                    message: format!("Unsupported format specifier: %{}", other),
                    location,
                })
            }
        };

        Ok(Self::pad(spec, sign, &body, numeric))
    }

    fn min_digits(digits: String, precision: Option<usize>) -> String {
        match precision {
            Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
            _ => digits,
        }
    }

    /// Apply the field width; zero padding goes between sign and digits
    fn pad(spec: &FormatSpec, sign: &str, body: &str, numeric: bool) -> String {
        let len = sign.len() + body.chars().count();
        if len >= spec.width {
            return format!("{}{}", sign, body);
        }
        let fill = spec.width - len;
        if spec.left_align {
            format!("{}{}{}", sign, body, " ".repeat(fill))
        } else if spec.zero_pad && numeric {
            format!("{}{}{}", sign, "0".repeat(fill), body)
        } else {
            format!("{}{}{}", " ".repeat(fill), sign, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
    use crate::parser::parse_source;

    fn run_with_output(source: &str) -> (Result<i64, RuntimeError>, String) {
        let unit = parse_source(source, "builtins.c").unwrap();
        let mut interp = Interpreter::new(&unit, InterpreterConfig::default());
        let result = interp.run();
        (result, interp.take_output())
    }

    fn printed(body: &str) -> String {
        let (result, output) = run_with_output(&format!("int main() {{ {} return 0; }}", body));
        result.unwrap();
        output
    }

    #[test]
    fn test_printf_conversions() {
        assert_eq!(printed(r#"printf("%d %i %u\n", -5, 7, -1);"#), "-5 7 4294967295\n");
        assert_eq!(printed(r#"printf("%x %X %c %s %%", 255, 255, 'A', "hi");"#), "ff FF A hi %");
        assert_eq!(printed(r#"printf("%f|%.2f", 1.5, 3.14159);"#), "1.500000|3.14");
        assert_eq!(printed(r#"printf("%ld", 5000000000);"#), "5000000000");
    }

    #[test]
    fn test_printf_width_and_flags() {
        assert_eq!(printed(r#"printf("[%5d][%-5d][%05d][%+d]", 42, 42, -42, 3);"#), "[   42][42   ][-0042][+3]");
        assert_eq!(printed(r#"printf("[%.3s][%4s][%.3d]", "abcdef", "x", 7);"#), "[abc][   x][007]");
        assert_eq!(printed(r#"printf("%s", (char *)0);"#), "(null)");
    }

    #[test]
    fn test_printf_errors() {
        let (result, _) = run_with_output(r#"int main() { printf("%d"); return 0; }"#);
        assert!(matches!(result, Err(RuntimeError::InvalidPrintfFormat { .. })));
        let (result, _) = run_with_output(r#"int main() { printf("%q", 1); return 0; }"#);
        assert!(matches!(result, Err(RuntimeError::InvalidPrintfFormat { .. })));
    }

    #[test]
    fn test_printf_rejects_oversized_fields() {
        let (result, output) = run_with_output(r#"int main() { printf("%99999999999999999999999d", 1); return 0; }"#);
        assert!(matches!(result, Err(RuntimeError::InvalidPrintfFormat { .. })), "got {:?}", result);
        assert!(output.is_empty());
        let (result, _) = run_with_output(r#"int main() { printf("%.99999999999999999999f", 1.0); return 0; }"#);
        assert!(matches!(result, Err(RuntimeError::InvalidPrintfFormat { .. })));
        assert_eq!(printed(r#"printf("[%4096d]", 1);"#).len(), 4098);
    }

    #[test]
    fn test_printf_length_modifiers() {
        assert_eq!(printed(r#"printf("%hhd %hd %lld", 300, 70000, 5000000000);"#), "44 4464 5000000000");
        let many_h = format!("int main() {{ printf(\"%{}d\", 1); return 0; }}", "h".repeat(200));
        let (result, _) = run_with_output(&many_h);
        match result {
            Err(RuntimeError::InvalidPrintfFormat { message, .. }) => assert!(message.contains("length modifier")),
            other => panic!("expected a format error, got {:?}", other),
        }
        let (result, _) = run_with_output(r#"int main() { printf("%llld", 1); return 0; }"#);
        assert!(matches!(result, Err(RuntimeError::InvalidPrintfFormat { .. })));
    }

    #[test]
    fn test_putchar_and_puts() {
        assert_eq!(printed(r#"putchar('o'); putchar(107); puts("!");"#), "ok!\n");
    }

    #[test]
    fn test_exit_status() {
        let (result, output) = run_with_output(r#"int main() { puts("bye"); exit(3); return 0; }"#);
        assert_eq!(result, Ok(3));
        assert_eq!(output, "bye\n");
    }

    #[test]
    fn test_heap_errors() {
        let (result, _) = run_with_output("int main() { int *p = malloc(4); free(p); free(p); return 0; }");
        assert!(matches!(result, Err(RuntimeError::DoubleFree { .. })));
        let (result, _) = run_with_output("int main() { int *p = malloc(4); free(p); return *p; }");
        assert!(matches!(result, Err(RuntimeError::UseAfterFree { .. })));
        let (result, _) = run_with_output("int main() { int x = 1; free(&x); return 0; }");
        assert!(matches!(result, Err(RuntimeError::InvalidFree { .. })));
    }

    #[test]
    fn test_calloc_zeroes_and_user_override() {
        let (result, _) = run_with_output("int main() { int *p = calloc(3, sizeof(int)); return p[0] + p[2]; }");
        assert_eq!(result, Ok(0));
        let (result, _) = run_with_output("int abs(int x) { return 100; } int main() { return abs(-1); }");
        assert_eq!(result, Ok(100));
    }
}
