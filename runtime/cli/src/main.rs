use log::debug;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use se_lang::{Interpreter, MachineConfig, SeError};
use std::env;
use std::fs;
use std::io::Read;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("SE_LOG", "warn"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut eval_script: Option<String> = None;
    let mut script_path: Option<String> = None;
    let mut repl = false;
    let mut disassemble = false;
    let mut config = MachineConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-r" | "--repl" => repl = true,
            "-d" | "--disassemble" => disassemble = true,
            "-e" | "--eval" => {
                i += 1;
                match args.get(i) {
                    Some(code) => eval_script = Some(code.clone()),
                    None => {
                        eprintln!("Error: -e requires a script argument");
                        process::exit(ExitCode::ArgumentError.code());
                    }
                }
            }
            "--max-depth" => {
                i += 1;
                match args.get(i).map(|n| n.parse::<usize>()) {
                    Some(Ok(depth)) if depth > 0 => config.max_call_depth = depth,
                    _ => {
                        eprintln!("Error: --max-depth requires a positive integer");
                        process::exit(ExitCode::ArgumentError.code());
                    }
                }
            }
            arg if !arg.starts_with('-') => {
                script_path = Some(arg.to_string());
            }
            unknown => {
                eprintln!("Unknown option: {unknown}");
                process::exit(ExitCode::ArgumentError.code());
            }
        }
        i += 1;
    }

    let interpreter = Interpreter::new(config);

    if repl {
        let result = run_repl(&interpreter);
        process::exit(result.map_or_else(|code| code.code(), |()| 0));
    }

    // -e > file > stdin
    let source = if let Some(script) = eval_script {
        script
    } else if let Some(path) = script_path {
        match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file '{path}': {e}");
                process::exit(ExitCode::ArgumentError.code());
            }
        }
    } else if !atty::is(atty::Stream::Stdin) {
        let mut source = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading from stdin: {e}");
            process::exit(ExitCode::ArgumentError.code());
        }
        source
    } else {
        print_help();
        process::exit(ExitCode::ArgumentError.code());
    };

    let result = if disassemble {
        disassemble_source(&interpreter, &source)
    } else {
        run_source(&interpreter, &source)
    };

    process::exit(result.map_or_else(|code| code.code(), |()| 0));
}

enum ExitCode {
    ArgumentError,
    ProgramError,
}

impl ExitCode {
    fn code(self) -> i32 {
        match self {
            ExitCode::ArgumentError => 1,
            ExitCode::ProgramError => 2,
        }
    }
}

fn print_help() {
    println!("se - closure expression language");
    println!();
    println!("USAGE:");
    println!("    se <SCRIPT>               Run a program file");
    println!("    se -e <CODE>              Evaluate inline code");
    println!("    se -d <SCRIPT>            Print the compiled program instead of running it");
    println!("    se -r                     Start REPL");
    println!("    se -h                     Show this help");
    println!("    cat file | se             Read program from stdin");
    println!();
    println!("OPTIONS:");
    println!("    -e, --eval <CODE>         Evaluate inline code");
    println!("    -d, --disassemble         Print compiled program nodes");
    println!("    -r, --repl                Start REPL");
    println!("        --max-depth <N>       Maximum call depth (default 256)");
    println!();
    println!("ENVIRONMENT:");
    println!("    SE_LOG                    Log filter, e.g. debug or se_lang=trace (default warn)");
}

fn report(error: &SeError, source: &str) -> ExitCode {
    eprintln!("{}", error.format_with_source(source));
    ExitCode::ProgramError
}

fn run_source(interpreter: &Interpreter, source: &str) -> Result<(), ExitCode> {
    let value = interpreter.run(source).map_err(|e| report(&e, source))?;
    println!("{value}");
    Ok(())
}

fn disassemble_source(interpreter: &Interpreter, source: &str) -> Result<(), ExitCode> {
    let program = interpreter.compile(source).map_err(|e| report(&e, source))?;
    print!("{}", program.disassemble());
    Ok(())
}

fn run_repl(interpreter: &Interpreter) -> Result<(), ExitCode> {
    println!("se REPL. Ctrl-D to exit.");

    let mut editor = DefaultEditor::new().map_err(|e| {
        eprintln!("Failed to initialize REPL: {e}");
        ExitCode::ProgramError
    })?;

    // Holds lines of an expression that is still missing its end.
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "> " } else { "... " };
        match editor.readline(prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    // A blank line gives up on an unfinished expression.
                    if !pending.is_empty() {
                        repl_eval(interpreter, &pending, false);
                        pending.clear();
                    }
                    continue;
                }

                editor.add_history_entry(&line).ok();
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&line);

                if repl_eval(interpreter, &pending, true) {
                    pending.clear();
                }
            }
            Err(ReadlineError::Interrupted) if !pending.is_empty() => pending.clear(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                if !pending.is_empty() {
                    repl_eval(interpreter, &pending, false);
                }
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {e}");
                return Err(ExitCode::ProgramError);
            }
        }
    }

    Ok(())
}

/// Evaluates one REPL entry. Returns false when the entry ends mid-expression
/// and `more_input` allows the next line to be appended to it.
fn repl_eval(interpreter: &Interpreter, source: &str, more_input: bool) -> bool {
    match interpreter.run(source) {
        Ok(value) => println!("{value}"),
        Err(e) if more_input && e.is_incomplete(source) => {
            debug!("repl: waiting for more input");
            return false;
        }
        Err(e) => {
            debug!("repl error: {e:?}");
            eprintln!("{}", e.format_with_source(source));
        }
    }
    true
}
