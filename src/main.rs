use std::path::PathBuf;
use std::process;

use bellchoir::app::{self, Output, PlayRequest};
use clap::{CommandFactory, Parser};

#[derive(Parser)]
#[command(name = "bellchoir")]
#[command(about = "Play a song one note at a time, one thread per pitch", long_about = None)]
struct Cli {
    /// Song file: one `<pitch> <length>` pair per line
    song: Option<PathBuf>,

    /// Settings file (JSON); defaults to the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the song to a WAV file instead of the audio device
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Log every worker and sink step
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let Some(song) = cli.song else {
        println!("{}", Cli::command().render_usage());
        return;
    };

    let request = PlayRequest {
        song,
        config: cli.config,
        output: match cli.wav {
            Some(path) => Output::Wav(path),
            None => Output::Device,
        },
    };

    match app::run(&request) {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}
