use crate::{config::Config, parser, util::fmt::tree, Error};

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
    TransformerProgram(&'static str),
    InterpreterProgram(&'static str),
}

pub enum Assertion {
    /// The printed output of the stage: a tree, a type map or a state.
    Output(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

fn format_error(error: impl Into<Error>) -> Vec<String> {
    vec![format!("{:#}", error.into())]
}

fn output<T>(result: Result<T, impl Into<Error>>, f: impl FnOnce(T) -> String) -> (String, Vec<String>) {
    match result {
        Ok(artifact) => (f(artifact), vec![]),
        Err(error) => (String::new(), format_error(error)),
    }
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let tokens_buf = &mut Vec::with_capacity(1024);
    let config = &Config::default();

    match test {
        Test::ParserProgram(input) => output(parser::parse_program(input, tokens_buf), |prog| {
            tree::print_program_string(&prog)
        }),
        Test::ParserExpr(input) => output(parser::parse_expr(input, tokens_buf), |expr| {
            tree::print_expr_string(&expr)
        }),
        Test::CheckerProgram(input) => output(crate::compile(input, config), |compiled| {
            compiled.types.to_string()
        }),
        Test::TransformerProgram(input) => output(crate::compile(input, config), |compiled| {
            tree::print_program_string(&compiled.transformed)
        }),
        Test::InterpreterProgram(input) => output(crate::run(input, config), |artifacts| {
            artifacts.state.to_string()
        }),
    }
}

#[track_caller]
pub fn run_assertion(assertion: Assertion, actual_output: &str, formatted_actual_errors: &[String]) {
    match assertion {
        Assertion::Output(expected) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(actual_output.trim(), expected.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (actual_output, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&actual_output, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::Output(::indoc::indoc! { $expected })
    };
    (@@assertion, types_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::Output(::indoc::indoc! { $expected })
    };
    (@@assertion, state_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::Output(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
    (@@get_test(transformer, program), $source:expr) => {
        crate::util::test_utils::Test::TransformerProgram($source)
    };
    (@@get_test(interpreter, program), $source:expr) => {
        crate::util::test_utils::Test::InterpreterProgram($source)
    };
}
pub(crate) use tree_tests;
