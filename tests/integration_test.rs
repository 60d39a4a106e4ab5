// Integration tests for the interpreter backend

use astcc::interpreter::{Interpreter, InterpreterConfig, RuntimeError};
use astcc::parser::parse_source;
use astcc::{Backend, CompileError, Pipeline, PipelineOptions};

fn run(source: &str) -> Result<(i64, String), RuntimeError> {
    let program = parse_source(source, "test.c").expect("Parsing failed");
    let mut interpreter = Interpreter::new(&program, InterpreterConfig::default());
    let status = interpreter.run()?;
    Ok((status, interpreter.take_output()))
}

fn status_of(source: &str) -> i64 {
    match run(source) {
        Ok((status, _)) => status,
        Err(e) => panic!("Execution failed: {}", e),
    }
}

fn output_of(source: &str) -> String {
    match run(source) {
        Ok((_, output)) => output,
        Err(e) => panic!("Execution failed: {}", e),
    }
}

#[test]
fn test_simple_arithmetic() {
    let source = r#"
        int main() {
            int x = 5;
            int y = 10;
            int z = x + y;
            return z;
        }
    "#;
    assert_eq!(status_of(source), 15);
}

#[test]
fn test_function_call() {
    let source = r#"
        int add(int a, int b) {
            return a + b;
        }

        int main() {
            int result = add(3, 4);
            return result;
        }
    "#;
    assert_eq!(status_of(source), 7);
}

#[test]
fn test_recursion() {
    let source = r#"
        int fact(int n) {
            if (n <= 1) return 1;
            return n * fact(n - 1);
        }

        int fib(int n) {
            return n < 2 ? n : fib(n - 1) + fib(n - 2);
        }

        int main() {
            return fact(5) + fib(10);
        }
    "#;
    assert_eq!(status_of(source), 120 + 55);
}

#[test]
fn test_struct_basics() {
    let source = r#"
        struct Point {
            int x;
            int y;
        };

        int main() {
            struct Point p;
            p.x = 10;
            p.y = 20;
            struct Point q = p;
            q.x = 1;
            return p.x + p.y + q.x;
        }
    "#;
    assert_eq!(status_of(source), 31);
}

#[test]
fn test_heap_struct_allocation() {
    let source = r#"
        struct Node {
            int value;
            struct Node *next;
        };

        int main() {
            struct Node *a = malloc(sizeof(struct Node));
            struct Node *b = malloc(sizeof(struct Node));
            a->value = 1;
            a->next = b;
            b->value = 2;
            b->next = NULL;

            int sum = 0;
            struct Node *cur = a;
            while (cur != NULL) {
                sum += cur->value;
                cur = cur->next;
            }
            free(a);
            free(b);
            return sum;
        }
    "#;
    assert_eq!(status_of(source), 3);
}

#[test]
fn test_heap_double_free_error() {
    let source = r#"
        int main() {
            int *p = malloc(sizeof(int));
            free(p);
            free(p);
            return 0;
        }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, RuntimeError::DoubleFree { .. }), "got {:?}", err);
}

#[test]
fn test_heap_use_after_free_error() {
    let source = r#"
        int main() {
            int *p = malloc(sizeof(int));
            *p = 4;
            free(p);
            return *p;
        }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, RuntimeError::UseAfterFree { .. }), "got {:?}", err);
}

#[test]
fn test_heap_null_dereference() {
    let source = r#"
        int main() {
            int *p = NULL;
            return *p;
        }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, RuntimeError::NullDereference { .. }), "got {:?}", err);
}

#[test]
fn test_heap_uninit() {
    let source = r#"
        int main() {
            int *p = malloc(4 * sizeof(int));
            int v = p[1];
            return v;
        }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, RuntimeError::UninitializedRead { .. }), "got {:?}", err);
}

#[test]
fn test_array_sum() {
    let source = r#"
        int main() {
            int arr[5];
            for (int i = 0; i < 5; i++) {
                arr[i] = i * i;
            }
            int *p = arr;
            int total = 0;
            for (int i = 0; i < 5; i++) {
                total += *(p + i);
            }
            return total;
        }
    "#;
    assert_eq!(status_of(source), 30);
}

#[test]
fn test_array_sizeof() {
    let source = r#"
        struct Pair { int a; long b; };

        int main() {
            int arr[10];
            char c;
            printf("%d %d %d %d\n", sizeof(arr), sizeof(c), sizeof(struct Pair), sizeof(int *));
            return 0;
        }
    "#;
    assert_eq!(output_of(source), "40 1 12 8\n");
}

#[test]
fn test_break_continue() {
    let source = r#"
        int main() {
            int sum = 0;
            for (int i = 0; i < 100; i++) {
                if (i % 2 == 0) continue;
                if (i > 10) break;
                sum += i;
            }
            int n = 0;
            do {
                n++;
            } while (n < 7);
            return sum + n;
        }
    "#;
    // 1 + 3 + 5 + 7 + 9
    assert_eq!(status_of(source), 25 + 7);
}

#[test]
fn test_char_array_string() {
    let source = r#"
        int length(char *s) {
            int n = 0;
            while (s[n] != '\0') n++;
            return n;
        }

        int main() {
            char *greeting = "hello, " "world";
            printf("%s has %d chars\n", greeting, length(greeting));
            putchar('!');
            puts("");
            return 0;
        }
    "#;
    assert_eq!(output_of(source), "hello, world has 12 chars\n!\n");
}

#[test]
fn test_switch() {
    let source = r#"
        int classify(int x) {
            int r = 0;
            switch (x) {
                case 1:
                    r = 10;
                    break;
                case 2:
                case 3:
                    r = 20;
                case 4:
                    r += 1;
                    break;
                default:
                    r = -1;
            }
            return r;
        }

        int main() {
            printf("%d %d %d %d %d\n", classify(1), classify(2), classify(3), classify(4), classify(9));
            return 0;
        }
    "#;
    assert_eq!(output_of(source), "10 21 21 1 -1\n");
}

#[test]
fn test_enum_typedef_union() {
    let source = r#"
        enum Color { RED, GREEN = 5, BLUE };
        typedef int score_t;
        union Bits { int i; char c; };

        int main() {
            score_t s = BLUE;
            union Bits b;
            b.i = 65;
            return s + RED + b.i;
        }
    "#;
    assert_eq!(status_of(source), 6 + 65);
}

#[test]
fn test_globals_are_zeroed_and_shared() {
    let source = r#"
        int counter;
        int limit = 3;

        void bump() {
            counter = counter + 1;
        }

        int main() {
            while (counter < limit) bump();
            return counter;
        }
    "#;
    assert_eq!(status_of(source), 3);
}

#[test]
fn test_char_truncation_and_unsigned_print() {
    let source = r#"
        int main() {
            char c = 200;
            unsigned int u = -1;
            printf("%d %u %x\n", c, u, 255);
            return 0;
        }
    "#;
    assert_eq!(output_of(source), "-56 4294967295 ff\n");
}

#[test]
fn test_short_circuit() {
    let source = r#"
        int hits;

        int touch(int v) {
            hits++;
            return v;
        }

        int main() {
            int a = touch(0) && touch(1);
            int b = touch(1) || touch(0);
            return hits * 10 + a + b;
        }
    "#;
    assert_eq!(status_of(source), 21);
}

#[test]
fn test_exit_status() {
    let source = r#"
        int main() {
            printf("before\n");
            exit(4);
            printf("after\n");
            return 0;
        }
    "#;
    assert_eq!(run(source).unwrap(), (4, "before\n".to_string()));
}

#[test]
fn test_division_by_zero() {
    let err = run("int main() { int z = 0; return 5 / z; }").unwrap_err();
    assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
}

#[test]
fn test_recursion_depth_limit() {
    let source = r#"
        int down(int n) { return down(n + 1); }
        int main() { return down(0); }
    "#;
    let program = parse_source(source, "deep.c").unwrap();
    let config = InterpreterConfig {
        max_call_depth: 64,
        ..InterpreterConfig::default()
    };
    let err = Interpreter::new(&program, config).run().unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow { depth: 64, .. }), "got {:?}", err);
}

#[test]
fn test_deep_recursion_within_default_limit() {
    let source = r#"
        int f(int n) {
            if (n == 0) return 0;
            return 1 + f(n - 1);
        }
        int main() { return f(400); }
    "#;
    assert_eq!(status_of(source), 400);
}

#[test]
fn test_default_call_depth_limit() {
    let source = r#"
        int down(int n) { return down(n + 1); }
        int main() { return down(0); }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow { depth: 512, .. }), "got {:?}", err);
}

#[test]
fn test_missing_entry_point() {
    let err = run("int helper() { return 1; }").unwrap_err();
    assert_eq!(
        err,
        RuntimeError::NoEntryPoint {
            name: "main".to_string()
        }
    );
}

#[test]
fn test_pipeline_reports_stage() {
    let pipeline = Pipeline::new(PipelineOptions::default().with_source_name("broken.c"));
    let err = pipeline.run_source("int main() { return 1 + ; }", Backend::Interpreter).unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
    assert_eq!(err.stage(), "parser");
}

#[test]
fn test_module_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.astc");
    let source = r#"
        int square(int x) { return x * x; }
        int main() { printf("%d\n", square(12)); return square(3); }
    "#;

    let pipeline = Pipeline::default();
    let unit = pipeline.compile_to_file(source, &path).unwrap();
    let module = pipeline.load_module(&path).unwrap();
    assert_eq!(module.unit, unit);
    assert_eq!(module.entry.as_deref(), Some("main"));

    let outcome = pipeline.interpret(&module.unit).unwrap();
    assert_eq!(outcome.status, 9);
    assert_eq!(outcome.output, "144\n");
}
