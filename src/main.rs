//! filer CLI - track files in a filesystem.
//!
//! Usage: filer [--config-paths | --show-config]

use std::process::ExitCode;

use filer::{config_paths, load_config, logging, Pipeline};

fn print_usage() {
    eprintln!("Usage: filer [OPTIONS]");
    eprintln!();
    eprintln!("Track files in the filesystem, maintaining a durable catalog of");
    eprintln!("content digests under the configured roots.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config-paths   Display the locations of config files which are checked");
    eprintln!("  --show-config    Display the configuration that will be used");
    eprintln!("  -h, --help       Show this help");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut show_paths = false;
    let mut show_config = false;
    for arg in &args {
        match arg.as_str() {
            "--config-paths" => show_paths = true,
            "--show-config" => show_config = true,
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("Error: unknown argument: {}", other);
                print_usage();
                return ExitCode::from(1);
            }
        }
    }

    if show_paths {
        println!("Configuration paths checked:");
        println!();
        for path in config_paths() {
            println!("  {}", path.display());
        }
        println!();
        return ExitCode::SUCCESS;
    }

    logging::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    if show_config {
        match serde_json::to_string_pretty(&config) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
        }
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, async move {
        let (pipeline, events) = Pipeline::new(config)?;
        pipeline.run(events).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
