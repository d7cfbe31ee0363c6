use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use wordgrid::{
    find_fill, generate_puzzle_config, load_word_list, render_grid, write_puzzle,
    DEFAULT_GRID_SIZE,
};

fn main() -> ExitCode {
    env_logger::init();

    // Input and output paths come from the command line, with file fallbacks.
    let input = PathBuf::from(env::args().nth(1).unwrap_or_else(|| "words.txt".to_string()));
    let output = PathBuf::from(env::args().nth(2).unwrap_or_else(|| "puzzle.txt".to_string()));

    let word_list = match load_word_list(&input) {
        Ok(word_list) => word_list,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = generate_puzzle_config(&word_list, DEFAULT_GRID_SIZE);
    let result = find_fill(&config);

    println!("{:?}", result.statistics);
    println!("{}", render_grid(&result.grid));

    if let Err(err) = write_puzzle(&output, &config, &result) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    println!("written puzzle to {}", output.display());

    ExitCode::SUCCESS
}
