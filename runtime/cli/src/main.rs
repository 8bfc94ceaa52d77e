mod output;

use clap::{Parser, Subcommand};
use lambdakit::{Env, LambdaError, Value, ops};
use log::{LevelFilter, debug};
use output::OutputMode;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "lambdakit")]
#[command(about = "Evaluate expression-string lambdas over sequences and mappings")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, global = true, default_value_t = OutputMode::Text)]
    format: OutputMode,

    /// Define a global from expression text before running (repeatable)
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME=SOURCE",
        global = true,
        value_parser = parse_define
    )]
    defines: Vec<(String, String)>,

    /// Log synthesis and compilation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate inline script text
    Eval {
        #[arg(allow_hyphen_values = true)]
        source: String,
    },
    /// Run a script file, or read the script from stdin when piped
    Run { file: Option<PathBuf> },
    /// Start an interactive session
    Repl,
    #[command(flatten)]
    Operation(Operation),
}

/// Every CONTAINER, INITIAL, KEY and VALUE argument is itself expression text
#[derive(Subcommand)]
enum Operation {
    /// Fold a container; binds acc/accumulator, key and val/value
    Reduce {
        #[arg(allow_hyphen_values = true)]
        expr: String,
        #[arg(allow_hyphen_values = true)]
        initial: String,
        #[arg(allow_hyphen_values = true)]
        container: String,
    },
    /// Combine aligned entries; binds key and val1..valN (val/value = val1)
    Map {
        #[arg(allow_hyphen_values = true)]
        expr: String,
        #[arg(required = true, allow_hyphen_values = true)]
        containers: Vec<String>,
    },
    /// Keep truthy entries; binds key and val/value
    Filter {
        #[arg(allow_hyphen_values = true)]
        expr: String,
        #[arg(allow_hyphen_values = true)]
        container: String,
    },
    /// Stable sort by a comparator; binds left/val1 and right/val2
    Sort {
        #[arg(allow_hyphen_values = true)]
        expr: String,
        #[arg(allow_hyphen_values = true)]
        container: String,
    },
    /// Reverse a Sequence
    Reverse {
        #[arg(allow_hyphen_values = true)]
        container: String,
    },
    /// Append a value, or a [key, value] pair to a Mapping
    Append {
        #[arg(allow_hyphen_values = true)]
        container: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Set an index or key
    Assoc {
        #[arg(allow_hyphen_values = true)]
        container: String,
        #[arg(allow_hyphen_values = true)]
        key: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Remove an index or key
    Pop {
        #[arg(allow_hyphen_values = true)]
        container: String,
        #[arg(allow_hyphen_values = true)]
        key: String,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Reduce { .. } => "reduce",
            Operation::Map { .. } => "map",
            Operation::Filter { .. } => "filter",
            Operation::Sort { .. } => "sort",
            Operation::Reverse { .. } => "reverse",
            Operation::Append { .. } => "append",
            Operation::Assoc { .. } => "assoc",
            Operation::Pop { .. } => "pop",
        }
    }

    /// `None` only for a reduce over an empty container
    fn apply(&self, env: &Env) -> Result<Option<Value>, LambdaError> {
        let value = match self {
            Operation::Reduce {
                expr,
                initial,
                container,
            } => return env.reduce(expr, env.eval(initial)?, &env.eval(container)?),
            Operation::Map { expr, containers } => {
                let values = containers
                    .iter()
                    .map(|source| env.eval(source))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Value> = values.iter().collect();
                env.map(expr, &refs)?
            }
            Operation::Filter { expr, container } => env.filter(expr, &env.eval(container)?)?,
            Operation::Sort { expr, container } => env.sort(expr, &env.eval(container)?)?,
            Operation::Reverse { container } => ops::reverse(&env.eval(container)?)?,
            Operation::Append { container, value } => {
                ops::append(&env.eval(container)?, env.eval(value)?)?
            }
            Operation::Assoc {
                container,
                key,
                value,
            } => ops::assoc(&env.eval(container)?, &env.eval(key)?, env.eval(value)?)?,
            Operation::Pop { container, key } => {
                ops::pop(&env.eval(container)?, &env.eval(key)?)?
            }
        };
        Ok(Some(value))
    }
}

#[derive(Debug, Clone, Copy)]
enum ExitCode {
    UsageError,
    ExpressionError,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::UsageError => 1,
            ExitCode::ExpressionError => 2,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are reported through the same path
            let _ = err.print();
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    init_logging(cli.verbose);

    let env = Env::new();
    let mode = cli.format;
    let result = define_globals(&env, &cli.defines, mode).and_then(|()| match &cli.command {
        Command::Eval { source } => run_source(&env, "eval", source, mode),
        Command::Run { file } => {
            let source = read_script(file.as_ref())?;
            run_source(&env, "run", &source, mode)
        }
        Command::Repl => run_repl(&env),
        Command::Operation(operation) => run_operation(&env, operation, mode),
    });

    match result {
        Ok(()) => process::exit(0),
        Err(code) => process::exit(code.into()),
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn parse_define(arg: &str) -> Result<(String, String), String> {
    let (name, source) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SOURCE, got '{arg}'"))?;

    let name = name.trim();
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("'{name}' is not a valid name"));
    }

    Ok((name.to_string(), source.to_string()))
}

fn define_globals(
    env: &Env,
    defines: &[(String, String)],
    mode: OutputMode,
) -> Result<(), ExitCode> {
    for (name, source) in defines {
        let value = env
            .eval(source)
            .map_err(|err| report(&err, Some(source), mode))?;
        debug!("defined {name} = {value}");
        env.define(name.as_str(), value);
    }
    Ok(())
}

fn read_script(file: Option<&PathBuf>) -> Result<String, ExitCode> {
    if let Some(path) = file {
        return fs::read_to_string(path).map_err(|e| {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::UsageError
        });
    }

    if atty::is(atty::Stream::Stdin) {
        eprintln!("Error: no script given; pass a FILE or pipe the script on stdin");
        return Err(ExitCode::UsageError);
    }

    let mut source = String::new();
    std::io::stdin().read_to_string(&mut source).map_err(|e| {
        eprintln!("Error reading from stdin: {}", e);
        ExitCode::UsageError
    })?;
    Ok(source)
}

fn run_source(
    env: &Env,
    command: &'static str,
    source: &str,
    mode: OutputMode,
) -> Result<(), ExitCode> {
    let start = Instant::now();
    let value = env
        .eval(source)
        .map_err(|err| report(&err, Some(source), mode))?;

    // Scripts print nothing for nil in text mode
    let shown = (mode == OutputMode::Json || value != Value::Nil).then_some(&value);
    emit(command, shown, start, mode)
}

fn run_operation(env: &Env, operation: &Operation, mode: OutputMode) -> Result<(), ExitCode> {
    let start = Instant::now();
    let value = operation
        .apply(env)
        .map_err(|err| report(&err, None, mode))?;

    emit(operation.name(), value.as_ref(), start, mode)
}

fn emit(
    command: &'static str,
    value: Option<&Value>,
    start: Instant,
    mode: OutputMode,
) -> Result<(), ExitCode> {
    let elapsed = start.elapsed();
    debug!("{command} finished in {elapsed:?}");

    match mode {
        OutputMode::Text => {
            if let Some(value) = value {
                println!("{}", output::format_result_text(value));
            }
        }
        OutputMode::Json => {
            let json = output::format_result_json(command, value, elapsed.as_millis() as u64)
                .map_err(|e| {
                    eprintln!("Error writing JSON: {e}");
                    ExitCode::ExpressionError
                })?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Print an error in the selected format and pick the exit code for it
fn report(err: &LambdaError, source: Option<&str>, mode: OutputMode) -> ExitCode {
    match mode {
        OutputMode::Json => match serde_json::to_string(&output::format_error_json(err)) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error writing JSON: {e}"),
        },
        OutputMode::Text => match source {
            Some(source) if atty::is(atty::Stream::Stderr) => {
                eprintln!("{}", err.format_colored(source))
            }
            Some(source) => eprintln!("{}", err.format_with_source(source)),
            None => eprintln!("Error: {err}"),
        },
    }

    if err.is_usage() {
        ExitCode::UsageError
    } else {
        ExitCode::ExpressionError
    }
}

fn run_repl(env: &Env) -> Result<(), ExitCode> {
    println!("lambdakit {} (Ctrl-D to exit)", env!("CARGO_PKG_VERSION"));

    let mut editor = DefaultEditor::new().map_err(|e| {
        eprintln!("Failed to initialize REPL: {}", e);
        ExitCode::ExpressionError
    })?;

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                editor.add_history_entry(&line).ok();

                match env.eval(&line) {
                    Ok(Value::Nil) => {}
                    Ok(value) => println!("{}", value),
                    Err(e) => eprintln!("{}", e.format_with_source(&line)),
                }
                debug!("{} live unit(s)", env.live_units());
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return Err(ExitCode::ExpressionError);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_define_splits_on_first_equals() {
        assert_eq!(
            parse_define("limit=a == b"),
            Ok(("limit".to_string(), "a == b".to_string()))
        );
    }

    #[test]
    fn parse_define_rejects_bad_names() {
        assert!(parse_define("no_equals").is_err());
        assert!(parse_define("1x=2").is_err());
        assert!(parse_define("=2").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
