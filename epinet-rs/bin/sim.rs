use epinet::prelude::*;
use log::{error, info, LevelFilter};
use std::env;
use std::process;

fn level_from(name: Option<&str>) -> LevelFilter {
    match name {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("warn") | Some("warning") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

fn config_path() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
    }
    None
}

pub fn main() {
    use simple_logger::SimpleLogger;

    let path = match config_path() {
        Some(path) => path,
        None => {
            eprintln!("usage: sim --config <runParameters.json>");
            process::exit(2);
        }
    };

    let config = match RunConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sim: {}", e);
            process::exit(2);
        }
    };

    SimpleLogger::new()
        .with_level(level_from(config.log_level.as_deref()))
        .init()
        .unwrap();

    info!("sim: loading {}", path);
    let mut simulation = match Simulation::load(config) {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("sim: {}", e);
            process::exit(1);
        }
    };

    match simulation.run() {
        Ok(()) => {
            info!("sim: completed");
        }
        Err(e) => {
            error!("sim: {}", e);
            process::exit(1);
        }
    }
}
