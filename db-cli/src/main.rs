#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! The command-line boundary (spec §6): parses the core count, ordering
//! policy, and prefetch depth; loads ambient configuration; starts (or
//! connects to) the tasking runtime and wire-protocol server; and runs a
//! one-shot `--execute` statement or drops into an interactive client REPL.

mod cli;
mod client;
mod engine;

use clap::Parser;
use cli::Args;
use db_config::DatabaseConfig;
use db_kernel::topology::WorkerOrder;
use db_runtime::{Runtime, RuntimeConfig};
use db_server::QueryEngine as _;
use db_storage::Database;
use engine::LocalEngine;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, RwLock};

fn main() {
    let args = Args::parse();
    db_otel::init_tracing(args.otlp_endpoint.as_deref());

    match run(args) {
        Ok(()) => std::process::exit(0),
        Err(message) => {
            eprintln!("tunadb: {message}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let mut config = db_config::load_config(args.config.as_deref().map(Path::new)).map_err(|e| e.to_string())?;
    apply_cli_overrides(&mut config, &args);
    config.validate().map_err(|e| e.to_string())?;

    if args.client_only {
        return run_client(&args);
    }
    if args.server_only && args.execute.is_some() {
        return Err("--server-only cannot be combined with --execute".to_string());
    }

    let database = Arc::new(RwLock::new(load_database(&config, &args)?));
    let order = WorkerOrder::from(db_config::OrderingPolicy::from(args.ordering.unwrap_or(cli::OrderingArg::System)));
    let runtime = Runtime::start(RuntimeConfig {
        worker_count: config.cores as u16,
        order,
        prefetch_depth: to_runtime_prefetch_depth(args.resolve_prefetch_depth()),
        steal_queue_capacity: 64,
    });

    let result = if let Some(statement) = &args.execute {
        run_execute(&database, statement, &args)
    } else {
        run_server(&runtime, database, &args)
    };

    runtime.shutdown();
    result
}

fn to_runtime_prefetch_depth(depth: db_config::PrefetchDepth) -> db_runtime::PrefetchDepth {
    match depth {
        db_config::PrefetchDepth::Auto => db_runtime::PrefetchDepth::Auto,
        db_config::PrefetchDepth::Fixed(n) => db_runtime::PrefetchDepth::Fixed(n as usize),
    }
}

fn apply_cli_overrides(config: &mut DatabaseConfig, args: &Args) {
    if args.cores > 0 {
        config.cores = args.cores;
    }
    if let Some(ordering) = args.ordering {
        config.ordering = ordering.into();
    }
    config.server_port = args.port;
    if let Some(depth) = args.prefetch_depth {
        config.prefetch_depth = db_config::PrefetchDepth::Fixed(depth);
    }
    if args.prefetch4me {
        config.prefetch_depth = db_config::PrefetchDepth::Auto;
    }
    if let Some(load) = &args.load {
        config.persistence_path = Some(load.clone());
    }
}

fn load_database(config: &DatabaseConfig, args: &Args) -> Result<Database, String> {
    let worker_count = if args.cores > 0 { args.cores } else { config.cores };
    match &config.persistence_path {
        Some(path) => {
            let mut file = std::fs::File::open(path).map_err(|e| format!("failed to open {path}: {e}"))?;
            Database::restore(&mut file, worker_count).map_err(|e| format!("failed to restore {path}: {e}"))
        }
        None => Ok(Database::new(worker_count)),
    }
}

fn run_execute(database: &Arc<RwLock<Database>>, statement: &str, args: &Args) -> Result<(), String> {
    let engine = LocalEngine::new(Arc::clone(database));
    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path).map_err(|e| e.to_string())?),
        None => Box::new(std::io::stdout()),
    };

    for _ in 0..args.iterations.max(1) {
        let result = engine.execute(statement).map_err(|e| e.to_string())?;
        client::render_result(&mut output, &result).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn run_server(runtime: &Runtime, database: Arc<RwLock<Database>>, args: &Args) -> Result<(), String> {
    let engine: Arc<dyn db_server::QueryEngine> = Arc::new(LocalEngine::new(database));
    db_server::serve(args.port, runtime, engine).map_err(|e| e.to_string())
}

fn run_client(args: &Args) -> Result<(), String> {
    let mut client = client::Client::connect(&args.host, args.port).map_err(|e| e.to_string())?;
    if let Some(statement) = &args.execute {
        let mut output: Box<dyn Write> = match &args.output {
            Some(path) => Box::new(std::fs::File::create(path).map_err(|e| e.to_string())?),
            None => Box::new(std::io::stdout()),
        };
        for _ in 0..args.iterations.max(1) {
            let result = client.query(statement).map_err(|e| e.to_string())?;
            client::render_result(&mut output, &result).map_err(|e| e.to_string())?;
        }
        return Ok(());
    }
    repl(&mut client)
}

fn repl(client: &mut client::Client) -> Result<(), String> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        print!("tunadb> ");
        std::io::stdout().flush().map_err(|e| e.to_string())?;
        if stdin.read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            break;
        }
        let statement = line.trim();
        if statement.is_empty() {
            continue;
        }
        if statement == ".stop" {
            client.stop().map_err(|e| e.to_string())?;
            break;
        }
        match client.query(statement) {
            Ok(result) => client::render_result(&mut std::io::stdout(), &result).map_err(|e| e.to_string())?,
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
