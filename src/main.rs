//! Reverse Life CLI - Build dictionaries and solve puzzles from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use reverse_life::{
    compute::{
        BatchError, BatchRunner, DictionaryError, JsonLinesSink, MemorySink, Puzzle, ResultSink,
        TransitionLibrary, read_puzzles, synthesize_puzzles, training_pairs,
    },
    schema::RunConfig,
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <run.json>", args[0]);
        eprintln!();
        eprintln!("Search for Game of Life predecessors from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json  Path to run configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: RunConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: RunConfig) -> Result<(), BatchError> {
    let board = config.batch.board;
    let synthetic = &config.synthetic;
    let mut rng = StdRng::seed_from_u64(synthetic.seed);

    println!("Reverse Life");
    println!("============");
    println!("Board: {}x{}", board.width, board.height);
    println!(
        "Population: {} (max {} generations)",
        config.batch.search.population.size, config.batch.search.population.max_generations
    );
    println!("Attempts per puzzle: {}", config.batch.attempts);
    println!();

    // Puzzles from file, or synthesized per step count
    let puzzles: Vec<Puzzle> = match &config.puzzles {
        Some(path) => {
            let (puzzles, skipped) = read_puzzles(BufReader::new(File::open(path)?), &board)?;
            println!(
                "Loaded {} puzzles from {} ({} skipped)",
                puzzles.len(),
                path.display(),
                skipped.len()
            );
            puzzles
        }
        None => {
            let mut puzzles = Vec::new();
            for &steps in &synthetic.steps {
                let first_id = puzzles.len() as u64;
                puzzles.extend(synthesize_puzzles(
                    &board, steps, synthetic, first_id, &mut rng,
                )?);
            }
            println!("Synthesized {} puzzles", puzzles.len());
            puzzles
        }
    };

    // Dictionaries for every step count in play
    let library = Arc::new(match &config.batch.dictionary_dir {
        Some(dir) => TransitionLibrary::new(dir),
        None => TransitionLibrary::in_memory(),
    });
    let step_counts: BTreeSet<usize> = puzzles.iter().map(|p| p.steps).collect();
    for &steps in &step_counts {
        let start = Instant::now();
        let dictionary = match library.get_or_load(steps) {
            Ok(dictionary) => dictionary,
            Err(DictionaryError::Missing { .. }) => {
                let pairs = training_pairs(&board, steps, synthetic, &mut rng)?;
                library.get_or_build(steps, pairs.iter().map(|(s, e)| (s, e)))?
            }
            Err(e) => return Err(e.into()),
        };
        println!(
            "Dictionary k={}: {} end patches, {} observations ({:.2}s)",
            steps,
            dictionary.len(),
            dictionary.observations(),
            start.elapsed().as_secs_f32()
        );
    }
    println!();

    // Solve
    let sink: Box<dyn ResultSink> = match &config.output {
        Some(path) => Box::new(JsonLinesSink::create(path)?),
        None => Box::new(MemorySink::new()),
    };
    let runner = BatchRunner::new(config.batch.clone(), library)?;

    println!("Solving...");
    let start = Instant::now();
    let report = runner.run(&puzzles, sink.as_ref());
    let elapsed = start.elapsed();

    println!();
    println!("Results:");
    for score in report.scores(&puzzles) {
        let start_error = score
            .mean_start_mismatch
            .map_or_else(|| "n/a".to_string(), |m| format!("{:.2}", m));
        println!(
            "  k={}: {} puzzles, mean end mismatch {:.2}, mean start error {}",
            score.steps, score.puzzles, score.mean_end_mismatch, start_error
        );
    }
    for failure in &report.failures {
        println!("  puzzle {} failed: {}", failure.id, failure.error);
    }
    println!();
    println!(
        "Time: {:.2}s ({} solved, {} failed)",
        elapsed.as_secs_f32(),
        report.outcomes.len(),
        report.failures.len()
    );
    if let Some(path) = &config.output {
        println!("Records written to {}", path.display());
    }
    Ok(())
}

fn print_example_config() {
    let config = RunConfig::default();
    let json = serde_json::to_string_pretty(&config).unwrap_or_else(|e| {
        eprintln!("Error serializing config: {}", e);
        std::process::exit(1);
    });
    println!("{}", json);
}
