use epinet::disease::DiseaseModel;
use epinet::error::{Error, Result};
use epinet::prelude::Real;
use log::error;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

/// Configuration of the model analyzer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzerConfig {
    disease_model: PathBuf,
}

/// Load a disease model and report its structure: states with their
/// baselines, transmissions, progressions, and per-state progression
/// closure.
fn run(path: &str) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::resource(format!("{}: {}", path, e)))?;
    let config: AnalyzerConfig = serde_json::from_str(&text)
        .map_err(|e| Error::configuration(format!("analyzer parameters: {}", e)))?;

    let model_text = fs::read_to_string(&config.disease_model)
        .map_err(|e| Error::resource(format!("{}: {}", config.disease_model.display(), e)))?;
    let model = DiseaseModel::parse(&model_text)?;

    println!("states: {}", model.state_count());
    for (index, state) in model.states().iter().enumerate() {
        let initial = if index == model.initial_state() { " (initial)" } else { "" };
        println!(
            "  {}{}: susceptibility {}, infectivity {}",
            state.id, initial, state.susceptibility, state.infectivity
        );
    }

    println!("transmissions: {}", model.transmissions().len());
    for t in model.transmissions() {
        println!(
            "  {}: {} + contact {} -> {} (transmissibility {})",
            t.id,
            model.state(t.entry_state).id,
            model.state(t.contact_state).id,
            model.state(t.exit_state).id,
            t.transmissibility
        );
    }

    println!("progressions: {}", model.progressions().len());
    let mut totals: Vec<Real> = vec![0.0; model.state_count()];
    for p in model.progressions() {
        totals[p.entry_state] += p.probability;
        println!(
            "  {}: {} -> {} (probability {})",
            p.id,
            model.state(p.entry_state).id,
            model.state(p.exit_state).id,
            p.probability
        );
    }

    for (index, total) in totals.iter().enumerate() {
        if *total == 0.0 {
            println!("terminal state: {}", model.state(index).id);
        } else if (total - 1.0).abs() > 1e-6 {
            println!(
                "WARNING: progressions out of {} sum to {}",
                model.state(index).id,
                total
            );
        }
    }

    Ok(())
}

pub fn main() {
    use simple_logger::SimpleLogger;
    SimpleLogger::new().init().unwrap();

    let mut args = env::args().skip(1);
    let path = loop {
        match args.next() {
            Some(arg) if arg == "--config" => break args.next(),
            Some(_) => continue,
            None => break None,
        }
    };
    let path = match path {
        Some(path) => path,
        None => {
            eprintln!("usage: analyze --config <analyzerParameters.json>");
            process::exit(2);
        }
    };

    if let Err(e) = run(&path) {
        error!("analyze: {}", e);
        process::exit(1);
    }
}
