mod harness;
use harness::{compile_src, run, run_main_i32};

use ark_wasmc::runner::{call_exported, WasmValue};

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_main_i32("func main() -> i32 { return 2 + 3 * 4; }"), 14);
    assert_eq!(run_main_i32("func main() -> i32 { return (2 + 3) * 4; }"), 20);
    assert_eq!(run_main_i32("func main() -> i32 { return 10 - 3 - 2; }"), 5);
}

#[test]
fn integer_division_and_negation() {
    assert_eq!(run_main_i32("func main() -> i32 { return -7 / 2; }"), -3);
    assert_eq!(run_main_i32("func main() -> i32 { let x = 5; return -x * 2; }"), -10);
}

#[test]
fn while_reevaluates_condition() {
    let src = "
        func main() -> i32 {
            var i = 0;
            var n = 0;
            while i < 5 {
                i = i + 1;
                n = n + i;
            }
            return n;
        }";
    assert_eq!(run_main_i32(src), 15);
}

#[test]
fn uninitialized_var_is_reset_each_iteration() {
    let src = "
        func main() -> i32 {
            var total = 0;
            var i = 0;
            while i < 3 {
                var acc: i32;
                acc = acc + i;
                total = total + acc;
                i = i + 1;
            }
            return total;
        }";
    assert_eq!(run_main_i32(src), 3);
}

#[test]
fn if_else_chain() {
    let src = "
        func classify(x: i32) -> i32 {
            if x < 0 {
                return -1;
            } else if x == 0 {
                return 0;
            } else {
                return 1;
            }
        }
        func main() -> i32 {
            return classify(-5) + classify(0) * 10 + classify(7) * 100;
        }";
    assert_eq!(run_main_i32(src), 99);
}

#[test]
fn recursion() {
    let src = "
        func fact(n: i32) -> i32 {
            if n <= 1 { return 1; }
            return n * fact(n - 1);
        }
        func main() -> i32 { return fact(5); }";
    assert_eq!(run_main_i32(src), 120);
}

#[test]
fn shadowing_in_nested_block() {
    let src = "
        func main() -> i32 {
            let x = 1;
            {
                let x = 2;
                print x;
            }
            return x;
        }";
    let output = run(src);
    assert_eq!(output.stdout, "2\n");
    assert_eq!(output.single_i32(), Some(1));
}

#[test]
fn struct_fields_are_stored_in_cells() {
    let src = "
        struct P { a: i32, b: i32 }
        func main() -> P { return P(1, 2); }";
    let output = run(src);
    let base = output.single_i32().expect("pointer result") as u32;
    // No string data, so the first object sits at the start of the heap.
    assert_eq!(base, 8);
    assert_eq!(output.read_i32(base), Some(1));
    assert_eq!(output.read_i32(base + 4), Some(2));
}

#[test]
fn struct_member_read_and_write() {
    let src = "
        struct P { a: i32, b: i32 }
        struct Box2 { p: P, scale: i32 }
        func main() -> i32 {
            var b = Box2(P(1, 2), 3);
            b.p.b = 40;
            return b.p.a + b.p.b * b.scale;
        }";
    assert_eq!(run_main_i32(src), 121);
}

#[test]
fn strings_are_printed_from_memory() {
    let src = "
        func greet(name: string) { printString(name); }
        func main() {
            print 'hello';
            greet('world');
            let s = 'hello';
            print s;
        }";
    let output = run(src);
    assert_eq!(output.stdout, "hello\nworld\nhello\n");
    // 'hello' is interned once at the start of the string area.
    assert_eq!(output.read_i32(8), Some(5));
    assert_eq!(&output.memory[12..17], b"hello");
}

#[test]
fn arrays() {
    let src = "
        func sum(xs: [i32], n: i32) -> i32 {
            var i = 0;
            var total = 0;
            while i < n {
                total = total + xs[i];
                i = i + 1;
            }
            return total;
        }
        func main() -> i32 {
            let xs = [10, 20, 30];
            return sum(xs, 3) + xs[0];
        }";
    assert_eq!(run_main_i32(src), 70);
}

#[test]
fn nested_arrays_do_not_overlap() {
    let src = "
        func main() -> i32 {
            let grid = [[1, 2], [3]];
            return grid[1][0] * 10 + grid[0][1];
        }";
    assert_eq!(run_main_i32(src), 32);
}

#[test]
fn tuples() {
    let src = "
        func divmod(a: i32, b: i32) -> (i32, i32) {
            return (a / b, a - a / b * b);
        }
        func main() -> i32 {
            let r = divmod(17, 5);
            return r[0] * 10 + r[1] + divmod(9, 2)[1] * 100;
        }";
    assert_eq!(run_main_i32(src), 132);
}

#[test]
fn mixed_arithmetic_promotes_to_float() {
    let output = run("func main() -> f64 { let x = 3; return x / 2.0 + 1; }");
    assert_eq!(output.single_f32(), Some(2.5));

    let src = "func main() -> i32 { let x = 2.5; if x > 2 { return 1; } return 0; }";
    assert_eq!(run_main_i32(src), 1);
}

#[test]
fn logical_operators_short_circuit() {
    let src = "
        func boom() -> i32 { print 99; return 1; }
        func main() -> i32 {
            var hits = 0;
            if 0 && boom() { hits = 1; }
            if 1 || boom() { hits = hits + 10; }
            if 5 && 7 { hits = hits + 100; }
            return hits;
        }";
    let output = run(src);
    assert_eq!(output.stdout, "");
    assert_eq!(output.single_i32(), Some(110));
}

#[test]
fn comparison_results_are_zero_or_one() {
    let src = "func main() -> i32 { return (3 < 4) + (4 < 3) * 10 + (2 != 2) * 100 + (true == 1) * 1000; }";
    assert_eq!(run_main_i32(src), 1001);
}

#[test]
fn shared_initializer_is_evaluated_once() {
    let src = "
        func next() -> i32 { print 1; return 7; }
        func main() -> i32 { let a, b = next(); return a + b; }";
    let output = run(src);
    assert_eq!(output.stdout, "1\n");
    assert_eq!(output.single_i32(), Some(14));
}

#[test]
fn exported_function_is_callable() {
    let wasm = compile_src(
        "export func add(a: i32, b: i32) -> i32 { return a + b; } func main() { }",
    );
    let output = call_exported(&wasm, "add", &[WasmValue::I32(10), WasmValue::I32(20)])
        .expect("call failed");
    assert_eq!(output.single_i32(), Some(30));

    // Unmarked helpers stay internal.
    let wasm = compile_src("func helper() -> i32 { return 1; } func main() { }");
    assert!(call_exported(&wasm, "helper", &[]).is_err());
}

#[test]
fn heap_grows_past_the_first_page() {
    let src = "
        struct P { a: i32 }
        func main() -> i32 {
            var i = 0;
            var last = P(0);
            while i < 40000 {
                last = P(i);
                i = i + 1;
            }
            return last.a;
        }";
    let output = run(src);
    assert_eq!(output.single_i32(), Some(39999));
    // 40001 four-byte objects need three pages.
    assert!(output.memory.len() >= 3 * 65536);
}

#[test]
fn array_literals_grow_memory_too() {
    let src = "
        func main() -> i32 {
            var i = 0;
            var total = 0;
            while i < 10000 {
                let xs = [i, 1, 2];
                total = total + xs[1] + xs[2];
                i = i + 1;
            }
            return total;
        }";
    assert_eq!(run_main_i32(src), 30000);
}

#[test]
fn deeply_nested_expression_within_limit() {
    let depth = 60;
    let expr = format!("{}1{}", "(1 + ".repeat(depth), ")".repeat(depth));
    let src = format!("func main() -> i32 {{ return {}; }}", expr);
    assert_eq!(run_main_i32(&src), 61);
}
