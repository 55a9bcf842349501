//! `rete-cli`: assert facts, define rules, and drive the match-resolve-act
//! loop from a script file or an interactive stdin REPL.

use clap::Parser;
use rete_cli::config::Cli;
use rete_cli::session::Session;
use rete_cli::watch_log::WatchLog;
use rete_cli::{demo, Command};
use rete_core::Environment;
use std::io::{self, BufRead, Write};

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut env = Environment::new();
    env.set_strategy(cli.strategy.into());
    for item in &cli.watch {
        env.watch((*item).into());
    }
    if cli.demo {
        demo::install(&mut env);
    }

    let watch_log = match WatchLog::open(&cli.db.to_string_lossy()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("failed to open watch log at {}: {err}", cli.db.display());
            std::process::exit(1);
        }
    };
    let mut session = Session::new(env, watch_log);

    if let Some(script) = &cli.script {
        run_script(&mut session, script);
    } else {
        run_repl(&mut session, cli.run_depth);
    }
}

fn run_script(session: &mut Session, path: &std::path::Path) {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("failed to read script {}: {err}", path.display());
            std::process::exit(1);
        }
    };
    for (lineno, line) in contents.lines().enumerate() {
        run_line(session, line, Some(lineno + 1));
    }
}

fn run_repl(session: &mut Session, _default_run_depth: i64) {
    let stdin = io::stdin();
    print!("rete-cli> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim() == "exit" || line.trim() == "quit" {
            break;
        }
        run_line(session, &line, None);
        print!("rete-cli> ");
        let _ = io::stdout().flush();
    }
}

fn run_line(session: &mut Session, line: &str, lineno: Option<usize>) {
    let parsed = match Command::parse(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return,
        Err(err) => {
            print_error(lineno, &err);
            return;
        }
    };
    match session.execute(parsed) {
        Ok(output) => println!("{output}"),
        Err(err) => print_error(lineno, &err),
    }
}

fn print_error(lineno: Option<usize>, err: impl std::fmt::Display) {
    match lineno {
        Some(n) => eprintln!("line {n}: {err}"),
        None => eprintln!("error: {err}"),
    }
}
