//! Intercalate CLI - Run structure searches from key=value input files.

use std::path::{Path, PathBuf};
use std::time::Instant;

use intercalate::{
    compute::{evolution::run_from_file, run_enumeration},
    schema::CombiConfig,
};

const EXAMPLE_INPUT: &str = "\
# Evolution parameters
n_generations = 5
pop_size = 10
n_best = 2
n_child = 4
n_mut = 2

# Structure
struct_filename = MoS2.xyz
size = 2x2
n_atoms = 3
n_change = 1
atom_symbol = Li
mag_moment = 0.5

# Evaluator, run inside each candidate folder. A relative path such as
# ./relax.sh is resolved against the folder of this file.
label = MoS2
evaluator_command = ./relax.sh
evaluator_timeout = 3600
parallel_evaluations = 2
random_seed = 42
";

const EXAMPLE_COMBI_INPUT: &str = "\
positions_filename = sites.xyz
struct_filename = MoS2.xyz
size = 2x2
n_atoms = 2
draw_range = 500
random_seed = 42
";

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <input.txt>");
    eprintln!("       {program} combi <combi_input.txt>");
    eprintln!();
    eprintln!("Search for low-energy intercalated bilayer structures.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  input.txt        Evolutionary search parameters");
    eprintln!("  combi_input.txt  Combinatorial enumeration parameters");
    eprintln!();
    eprintln!("Example input files are printed with the --example flag.");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("intercalate");

    match args.get(1).map(String::as_str) {
        Some("--example") => print_example_config(),
        Some("combi") => match args.get(2) {
            Some(path) => run_combi(&PathBuf::from(path)),
            None => {
                print_usage(program);
                std::process::exit(1);
            }
        },
        Some(path) => run_evolution(&PathBuf::from(path)),
        None => {
            print_usage(program);
            std::process::exit(1);
        }
    }
}

fn run_evolution(config_path: &Path) {
    println!("Intercalate Evolutionary Search");
    println!("===============================");
    println!("Input: {}", config_path.display());
    println!();

    let start = Instant::now();
    let report = run_from_file(config_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    println!();
    println!(
        "Generations: {} computed, {} already complete",
        report.completed, report.skipped
    );
    if let Some(best) = &report.best {
        let label = best.label.as_deref().unwrap_or("?");
        match best.energy {
            Some(energy) => println!("Best structure: {label} ({energy:.4} eV)"),
            None => println!("Best structure: {label}"),
        }
    }
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
}

fn run_combi(config_path: &Path) {
    let config = CombiConfig::from_file(config_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let base = config_path.parent().unwrap_or(Path::new("."));

    println!("Intercalate Combinatorial Enumeration");
    println!("=====================================");
    println!("Supercell: {}", config.size);
    println!("Interstitial atoms: {}", config.n_atoms);
    println!("Draws: {}", config.draw_range);
    println!();

    let start = Instant::now();
    let report = run_enumeration(&config, base).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    println!("Output: {}", report.output.display());
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
}

fn print_example_config() {
    println!("Example evolutionary search input (input.txt):");
    println!("{EXAMPLE_INPUT}");
    println!("Example enumeration input (combi_input.txt):");
    println!("{EXAMPLE_COMBI_INPUT}");
}
