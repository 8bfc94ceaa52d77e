use super::*;
use crate::lexer::Lexer;
use expect_test::{Expect, expect};

fn check(input: &str, expect: Expect) {
    let mut lexer = Lexer::new(input);
    let tokens = lexer.tokenize().unwrap();
    let mut parser = Parser::new(tokens);
    let result = parser.parse_statements();
    let output = match result {
        Ok(statements) => statements
            .iter()
            .map(format_stmt)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => format!("Error: {} at {}:{}", e.message, e.span.line, e.span.column),
    };
    expect.assert_eq(&output);
}

fn format_stmt(stmt: &SpannedStmt) -> String {
    match &stmt.node {
        Stmt::Let { name, value } => format!("let {name} = {}", format_expr(value)),
        Stmt::Return(value) => format!("return {}", format_expr(value)),
        Stmt::Expr(expr) => format_expr(expr),
    }
}

fn format_expr(expr: &SpannedExpr) -> String {
    match &expr.node {
        Expr::Integer(n) => n.to_string(),
        Expr::Decimal(n) => format!("{n:?}"),
        Expr::String(s) => format!("\"{s}\""),
        Expr::Boolean(b) => b.to_string(),
        Expr::Nil => "nil".to_string(),
        Expr::Identifier(name) => name.clone(),
        Expr::Prefix { op, right } => format!("({op}{})", format_expr(right)),
        Expr::Infix { left, op, right } => {
            format!("({} {op} {})", format_expr(left), format_expr(right))
        }
        Expr::Index { collection, index } => {
            format!("({}[{}])", format_expr(collection), format_expr(index))
        }
        Expr::Member { object, name } => format!("({}.{name})", format_expr(object)),
        Expr::Call { function, args } => {
            let args: Vec<_> = args.iter().map(format_expr).collect();
            format!("{function}({})", args.join(", "))
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => format!(
            "({} ? {} : {})",
            format_expr(condition),
            format_expr(then_branch),
            format_expr(else_branch)
        ),
        Expr::Sequence(items) => {
            let items: Vec<_> = items.iter().map(format_expr).collect();
            format!("(seq {})", items.join(", "))
        }
        Expr::List(elements) => {
            let elements: Vec<_> = elements.iter().map(format_expr).collect();
            format!("[{}]", elements.join(", "))
        }
        Expr::Dict(entries) => {
            let pairs: Vec<_> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", format_expr(k), format_expr(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
    }
}

#[test]
fn parse_arithmetic_precedence() {
    check("1 + 2 * 3", expect![[r#"(1 + (2 * 3))"#]]);
}

#[test]
fn parse_reduce_body() {
    check("acc + val", expect![[r#"(acc + val)"#]]);
}

#[test]
fn parse_prefix_binds_tighter_than_product() {
    check("-x * 2", expect![[r#"((-x) * 2)"#]]);
}

#[test]
fn parse_logical_operators() {
    check(
        "a > 0 && b < 1 || !c",
        expect![[r#"(((a > 0) && (b < 1)) || (!c))"#]],
    );
}

#[test]
fn parse_conditional_is_right_associative() {
    check(
        r#"x > 0 ? "pos" : x < 0 ? "neg" : "zero""#,
        expect![[r#"((x > 0) ? "pos" : ((x < 0) ? "neg" : "zero"))"#]],
    );
}

#[test]
fn parse_member_and_index_chain() {
    check("row.items[0].name", expect![[r#"(((row.items)[0]).name)"#]]);
}

#[test]
fn parse_named_calls() {
    check("len(val) + max(1, 2)", expect![[r#"(len(val) + max(1, 2))"#]]);
}

#[test]
fn parse_dict_with_expression_keys() {
    check(
        r#"{"a": 1, 'b': [1, 2]}"#,
        expect![[r#"{"a": 1, "b": [1, 2]}"#]],
    );
}

#[test]
fn parse_literal_dict_with_bare_keys() {
    check("#{a: 1, b: val}", expect![[r#"{"a": 1, "b": val}"#]]);
}

#[test]
fn parse_comma_sequence() {
    check("key, val1 + val2", expect![[r#"(seq key, (val1 + val2))"#]]);
}

#[test]
fn parse_statements_separated_by_semicolons() {
    check(
        "let x = val * 2; return x + 1",
        expect![[r#"
            let x = (val * 2)
            return (x + 1)"#]],
    );
}

#[test]
fn parse_newlines_end_statements() {
    check(
        "x\n-1\n(x)\n[x]",
        expect![[r#"
            x
            (-1)
            x
            [x]"#]],
    );
}

#[test]
fn parse_newlines_inside_brackets_and_after_operators() {
    check(
        "let y = x *\n  2\nf(\n  y,\n  [1,\n   2]\n)",
        expect![[r#"
            let y = (x * 2)
            f(y, [1, 2])"#]],
    );
}

#[test]
fn parse_bare_return_before_newline() {
    check(
        "return\nx",
        expect![[r#"
            return nil
            x"#]],
    );
}

#[test]
fn parse_smallest_integer() {
    check("-9223372036854775808", expect![[r#"-9223372036854775808"#]]);
    check(
        "9223372036854775808",
        expect![[r#"Error: Integer literal out of range at 1:1"#]],
    );
}

#[test]
fn parse_bare_return() {
    check("return", expect![[r#"return nil"#]]);
}

#[test]
fn parse_unclosed_group() {
    check("(1 + 2", expect![[r#"Error: Expected ')', got 'EOF' at 1:7"#]]);
}

#[test]
fn parse_call_on_expression_is_rejected() {
    check(
        "[1](2)",
        expect![[r#"Error: Only named functions can be called at 1:1"#]],
    );
}

#[test]
fn parse_let_without_name() {
    check(
        "let = 5",
        expect![[r#"Error: Expected variable name after 'let', got = at 1:5"#]],
    );
}

#[test]
fn parse_member_requires_identifier() {
    check(
        "a.1",
        expect![[r#"Error: Expected member name after '.', got 1 at 1:3"#]],
    );
}
