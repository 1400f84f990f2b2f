// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`     — trains the model on a parallel corpus
//   2. `translate` — loads the latest checkpoint and translates
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead};

use crate::domain::traits::SentenceTranslator;
use commands::{Commands, TrainArgs, TranslateArgs};

#[derive(Parser, Debug)]
#[command(
    name = "nmt-trainer",
    version = "0.1.0",
    about = "Train a transformer translation model on a parallel corpus, then translate."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Translate(args) => run_translate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!(
        "Starting training on '{}/{}.{{{},{}}}'",
        args.data_dir, args.train_prefix, args.src_lang, args.tgt_lang,
    );

    let use_case = TrainUseCase::new(args.into());
    use_case.execute()?;

    println!("Training complete. Checkpoints saved.");
    Ok(())
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    use crate::application::translate_use_case::TranslateUseCase;

    let use_case = TranslateUseCase::new(
        &args.checkpoints_dir,
        &args.model_dir,
        &args.model_basename,
        args.beam_size,
    )?;

    match args.text {
        Some(text) => println!("{}", use_case.translate(&text)?),
        None => {
            for line in io::stdin().lock().lines() {
                println!("{}", use_case.translate(&line?)?);
            }
        }
    }
    Ok(())
}
