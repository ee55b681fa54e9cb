//! # Test Utilities
//!
//! Helpers for running "ui tests": Forth source paired with the output it
//! should produce.
//!
//! ## UI Tests
//!
//! Each line of a ui test is one of:
//!
//! * Configuration for the instance, as "frontmatter comments". These must
//!   appear before any other non-comment lines. Accepted keys are the
//!   numeric fields of [`Params`]:
//!     * `( stack_elems USIZE )`
//!     * `( return_stack_elems USIZE )`
//!     * `( float_stack_elems USIZE )`
//!     * `( heap_bytes USIZE )`
//!     * `( dict_entries USIZE )`
//!     * `( temp_strings USIZE )`
//!     * `( temp_string_len USIZE )`
//! * Comment lines, holding just a `( ... )` comment.
//! * Successful input lines, starting with `> ...`.
//! * Expected output lines, starting with `< ...`.
//!     * An input line may be followed by any number of output lines. A bare
//!       `<` expects no output at all.
//!     * If an input line has no output lines, any output is accepted.
//! * Failing input lines, starting with `x ...`. Evaluating the line must
//!   return an `Err`. Which error is not checked.
//!
//! ### Example
//!
//! ```rust,ignore
//! # use pez::testutil::blocking_runtest;
//! #
//! # blocking_runtest(r#"
//! ( configure the instance with frontmatter )
//! ( stack_elems 4 )
//!
//! ( input with no output )
//! > : star 42 emit ;
//!
//! ( input and output )
//! > star star
//! < **
//!
//! ( input that fails )
//! x 1 2 3 4 5
//! # "#)
//! ```

use crate::{config::Params, Error, Permissions, Pez};

/// Run the given ui test against a fresh instance with no permissions.
pub fn all_runtest(contents: &str) {
    blocking_runtest(contents);
}

/// Run the given ui test against a fresh instance.
///
/// Accepts any frontmatter listed above.
pub fn blocking_runtest(contents: &str) {
    let tokd = tokenize(contents, true);
    let mut pez = Pez::new(&tokd.settings, Permissions::empty(), ()).unwrap();
    blocking_steps_with(tokd.steps.as_slice(), &mut pez);
}

/// Run the given ui test against an existing instance.
///
/// Panics if the test has frontmatter.
pub fn blocking_runtest_with<T: 'static>(pez: &mut Pez<T>, contents: &str) {
    let tokd = tokenize(contents, false);
    blocking_steps_with(tokd.steps.as_slice(), pez);
}

fn check_output(res: Result<(), Error>, outcome: &Outcome, output: &str) {
    println!("< {output}");
    match (res, outcome) {
        (Ok(()), Outcome::OkAnyOutput) => {}
        (Ok(()), Outcome::OkWithOutput(exp)) => {
            let act = output
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n");
            let exp = exp
                .iter()
                .map(|e| e.trim_end())
                .collect::<Vec<_>>()
                .join("\n");
            assert_eq!(act.trim_end(), exp.trim_end());
        }
        (Err(_e), Outcome::FatalError) => {}
        (res, exp) => {
            eprintln!("Error!");
            eprintln!("Expected: {exp:?}");
            eprintln!("Got: {res:?}");
            if res.is_ok() {
                eprintln!("Output:\n{output}");
            }
            panic!();
        }
    }
}

// Runs the given steps against the given instance.
//
// Panics on any mismatch
fn blocking_steps_with<T: 'static>(steps: &[Step], pez: &mut Pez<T>) {
    for Step {
        input,
        output: outcome,
    } in steps
    {
        println!("> {input}");
        let res = pez.eval(input);
        check_output(res, outcome, &pez.output.as_str());
        pez.output.clear();
    }
}

#[derive(Debug)]
enum Outcome {
    OkAnyOutput,
    OkWithOutput(Vec<String>),
    FatalError,
}

#[derive(Debug)]
struct Step {
    input: String,
    output: Outcome,
}

#[derive(Default)]
struct Tokenized {
    settings: Params,
    steps: Vec<Step>,
}

fn tokenize(contents: &str, allow_frontmatter: bool) -> Tokenized {
    let mut output = Tokenized::default();
    let mut frontmatter_done = !allow_frontmatter;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (tok, remain) = line.split_once(' ').unwrap_or((line, ""));

        match tok {
            ">" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::OkAnyOutput,
                });
            }
            "<" => {
                frontmatter_done = true;
                let cur_step = output.steps.last_mut().unwrap();
                match &mut cur_step.output {
                    Outcome::OkAnyOutput => {
                        cur_step.output = Outcome::OkWithOutput(vec![remain.to_string()]);
                    }
                    Outcome::OkWithOutput(o) => o.push(remain.to_string()),
                    Outcome::FatalError => panic!("Fatal error can't set output"),
                }
            }
            "x" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::FatalError,
                });
            }
            "(" => {
                let mut split = remain.split_whitespace();
                let key = split.next();
                let settings = &mut output.settings;
                let field = match key {
                    Some("stack_elems") => &mut settings.stack_elems,
                    Some("return_stack_elems") => &mut settings.return_stack_elems,
                    Some("float_stack_elems") => &mut settings.float_stack_elems,
                    Some("heap_bytes") => &mut settings.heap_bytes,
                    Some("dict_entries") => &mut settings.dict_entries,
                    Some("temp_strings") => &mut settings.temp_strings,
                    Some("temp_string_len") => &mut settings.temp_string_len,
                    // Any other comment
                    _ => continue,
                };
                assert!(!frontmatter_done, "Unexpected frontmatter settings!");
                *field = split.next().unwrap().parse::<usize>().unwrap();
                assert_eq!(Some(")"), split.next());
            }
            _ => {}
        }
    }

    output
}
