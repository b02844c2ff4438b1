use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use log::error;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod cli;
mod libbanka;

use crate::libbanka::assets::FETCH_TIMEOUT;
use crate::libbanka::index::ExamScope;
use crate::libbanka::maintenance::PLACEHOLDER_EXPLANATION;
use crate::libbanka::propagate::Mode;

#[derive(Parser, Debug)]
#[command(name = "Soru Bankası")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "assets/data/exams.json",
        global = true
    )]
    bank: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy images onto repeated questions that lack them
    Propagate {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, default_value = "analysis/propagation_report.json")]
        report: PathBuf,
    },
    /// Like `propagate`, but also replace images that differ from the source
    Canonicalize {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, default_value = "analysis/canonicalization_report.json")]
        report: PathBuf,
    },
    /// Report how repeated questions compare to their sources, changing nothing
    Analyze {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, default_value = "analysis/repeat_image_analysis.json")]
        report: PathBuf,
        #[arg(long, default_value = "analysis/repeat_image_analysis.csv")]
        csv: PathBuf,
    },
    /// Assign a category to every question of a flat question file
    Categorize {
        #[arg(value_name = "FILE", default_value = "assets/data/imported_questions.json")]
        questions: PathBuf,
    },
    /// Delete an exam from the bank
    RemoveExam { exam_id: String },
    /// Fill in missing explanations with a placeholder
    FixExplanations {
        #[arg(long, default_value = PLACEHOLDER_EXPLANATION)]
        placeholder: String,
    },
    /// Add an imported question list to the bank as a new exam
    Merge {
        #[arg(value_name = "FILE", default_value = "assets/data/imported_questions.json")]
        from: PathBuf,
        #[arg(long)]
        exam_id: String,
        #[arg(long)]
        exam_name: String,
    },
    /// Download remote images and point the bank at the local copies
    Download {
        #[arg(long, value_name = "DIR", default_value = "assets/images/downloaded")]
        dir: PathBuf,
        #[arg(long, default_value_t = FETCH_TIMEOUT.as_secs())]
        timeout_secs: u64,
    },
    /// Print the image references of one exam
    Inspect {
        exam_id: String,
        #[arg(short, long)]
        question: Option<i64>,
    },
}

/// Which exams give images and which receive them.
#[derive(clap::Args, Debug, Clone, Default)]
struct Selection {
    /// Exams to take images from [default: every exam not targeted]
    #[arg(short, long, value_delimiter = ',')]
    source: Vec<String>,
    /// Exams to update [default: every exam not used as a source]
    #[arg(short, long, value_delimiter = ',')]
    target: Vec<String>,
    /// Exams never used as a source
    #[arg(short = 'x', long, value_delimiter = ',')]
    exclude: Vec<String>,
    /// Only trust local images that exist under this directory
    #[arg(long, value_name = "DIR")]
    verify_root: Option<PathBuf>,
}

impl Selection {
    fn sources(&self) -> ExamScope {
        if self.source.is_empty() {
            ExamScope::all_except(&self.target)
        } else {
            ExamScope::only(&self.source)
        }
    }

    fn targets(&self) -> ExamScope {
        if self.target.is_empty() {
            ExamScope::all_except(&self.source)
        } else {
            ExamScope::only(&self.target)
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("input file {0:?} not found")]
    MissingInput(PathBuf),
    #[error("malformed JSON in {path:?}: {source}")]
    MalformedJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot access file: {0}")]
    Io(#[from] io::Error),
    #[error("cannot replace file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("cannot serialize JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
}

fn run(args: Args) -> Result<(), Error> {
    let bank = args.bank.as_path();
    match args.command {
        Commands::Propagate { selection, report } => {
            cli::propagate(bank, &selection, &report, Mode::Propagate)
        }
        Commands::Canonicalize { selection, report } => {
            cli::propagate(bank, &selection, &report, Mode::Canonicalize)
        }
        Commands::Analyze {
            selection,
            report,
            csv,
        } => cli::analyze(bank, &selection, &report, &csv),
        Commands::Categorize { questions } => cli::categorize(&questions),
        Commands::RemoveExam { exam_id } => cli::remove_exam(bank, &exam_id),
        Commands::FixExplanations { placeholder } => cli::fix_explanations(bank, &placeholder),
        Commands::Merge {
            from,
            exam_id,
            exam_name,
        } => cli::merge(bank, &from, &exam_id, &exam_name),
        Commands::Download { dir, timeout_secs } => cli::download(bank, &dir, timeout_secs),
        Commands::Inspect { exam_id, question } => cli::inspect(bank, &exam_id, question),
    }
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    if let Err(err) = run(args) {
        if log::max_level() == log::LevelFilter::Off {
            eprintln!("{}", format!("{err}").red());
        } else {
            error!("{}", format!("{err}").red());
        }
        std::process::exit(1);
    }
}
