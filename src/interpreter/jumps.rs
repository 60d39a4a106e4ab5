use crate::interpreter::engine::{ControlSignal, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::Value;
use crate::parser::ast::{AstNode, SwitchCase};

impl Interpreter {
    pub(crate) fn execute_return(&mut self, expr: Option<&AstNode>) -> Result<ControlSignal, RuntimeError> {
        let value = match expr {
            Some(ret_expr) => self.evaluate_expr(ret_expr)?,
            None => Value::Int(0),
        };
        Ok(ControlSignal::Return(value))
    }

    /// Jump to the first matching case (or `default`) and fall through until `break`
    pub(crate) fn execute_switch(
        &mut self,
        expr: &AstNode,
        cases: &[SwitchCase],
    ) -> Result<ControlSignal, RuntimeError> {
        let switch_val = self.evaluate_expr(expr)?;

        let mut match_index: Option<usize> = None;
        let mut default_index: Option<usize> = None;

        for (i, case) in cases.iter().enumerate() {
            match &case.value {
                Some(value) => {
                    let case_val = self.evaluate_expr(value)?;
                    if self.values_equal(&switch_val, &case_val) {
                        match_index = Some(i);
                        break;
                    }
                }
                None => default_index = Some(i),
            }
        }

        let Some(start) = match_index.or(default_index) else {
            return Ok(ControlSignal::Normal);
        };

        // The whole body shares one scope
        self.enter_scope();
        let mut signal = ControlSignal::Normal;
        for case in &cases[start..] {
            match self.execute_block(&case.body) {
                Ok(ControlSignal::Normal) => continue,
                Ok(ControlSignal::Break) => break,
                Ok(other) => {
                    signal = other;
                    break;
                }
                Err(err) => {
                    self.exit_scope();
                    return Err(err);
                }
            }
        }
        self.exit_scope();
        Ok(signal)
    }

    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Float(x), other) | (other, Value::Float(x)) => other.as_float() == Some(*x),
            _ => a.as_int().is_some() && a.as_int() == b.as_int(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::{Interpreter, InterpreterConfig};
    use crate::parser::parse_source;

    fn run(source: &str) -> i64 {
        let unit = parse_source(source, "switch.c").unwrap();
        Interpreter::new(&unit, InterpreterConfig::default()).run().unwrap()
    }

    const CLASSIFY: &str = "
        int classify(int n) {
            int r = 0;
            switch (n) {
                case 1: r += 1;
                case 2: r += 10; break;
                default: r = 99; break;
                case 3: r = 3;
            }
            return r;
        }";

    #[test]
    fn test_fallthrough_until_break() {
        assert_eq!(run(&format!("{} int main() {{ return classify(1); }}", CLASSIFY)), 11);
        assert_eq!(run(&format!("{} int main() {{ return classify(2); }}", CLASSIFY)), 10);
    }

    #[test]
    fn test_default_and_trailing_case() {
        assert_eq!(run(&format!("{} int main() {{ return classify(7); }}", CLASSIFY)), 99);
        assert_eq!(run(&format!("{} int main() {{ return classify(3); }}", CLASSIFY)), 3);
    }

    #[test]
    fn test_continue_inside_switch_targets_loop() {
        let source = "int main() { int n = 0; for (int i = 0; i < 4; i++) { switch (i) { case 1: continue; default: n++; } } return n; }";
        assert_eq!(run(source), 3);
    }

    #[test]
    fn test_enum_case_labels() {
        let source = "enum Color { RED, GREEN = 5, BLUE }; int main() { switch (6) { case RED: return 1; case BLUE: return 2; } return 0; }";
        assert_eq!(run(source), 2);
    }
}
