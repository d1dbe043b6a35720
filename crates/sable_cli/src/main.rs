use std::env;
use std::fs;
use std::process;

use sable_check::check_program;
use sable_parser::parse_program;
use serde_json::json;

fn print_usage() {
    eprintln!("sable - the sable language toolchain");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  sable <file.sb>                 Type-check a file");
    eprintln!("  sable check <file.sb>           Type-check a file");
    eprintln!("  sable check --json <file.sb>    Type-check with JSON diagnostics");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help     Show this help message");
    eprintln!("  -V, --version  Show version information");
}

struct Diagnostic {
    message: String,
    line: u32,
    lexeme: String,
}

fn check_file(path: &str, json_output: bool) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: could not read {path}: {err}");
            return 74;
        }
    };

    let diagnostics: Vec<Diagnostic> = match parse_program(&source) {
        Ok(stmts) => match check_program(&stmts) {
            Ok(_) => Vec::new(),
            Err(errors) => errors
                .into_iter()
                .map(|err| Diagnostic {
                    message: err.message,
                    line: err.line,
                    lexeme: err.lexeme,
                })
                .collect(),
        },
        Err(errors) => errors
            .into_iter()
            .map(|err| Diagnostic {
                message: err.message,
                line: err.line,
                lexeme: err.lexeme,
            })
            .collect(),
    };

    if json_output {
        let entries: Vec<serde_json::Value> = diagnostics
            .iter()
            .map(|diag| {
                json!({
                    "message": diag.message,
                    "line": diag.line,
                    "lexeme": diag.lexeme,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).expect("diagnostics serialize")
        );
    }

    if diagnostics.is_empty() {
        0
    } else {
        65
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        print_usage();
        process::exit(0);
    }
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let code = match args[1].as_str() {
        "check" => {
            let mut json_output = false;
            let mut path = None;
            for arg in &args[2..] {
                if arg == "--json" {
                    json_output = true;
                } else {
                    path = Some(arg.clone());
                }
            }
            match path {
                Some(path) => check_file(&path, json_output),
                None => {
                    print_usage();
                    1
                }
            }
        }
        "run" => {
            eprintln!("error: running programs requires the sable VM, which this build does not include");
            70
        }
        path => check_file(path, false),
    };

    process::exit(code);
}
