//! CLI for examguard: sit a proctored exam from the terminal.

mod commands;
mod navigator;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use examguard_core::ReconnectPolicy;
use examguard_core::config::{DEFAULT_API_BASE_URL, DEFAULT_VERIFIER_URL};

const DEFAULT_QUESTION: &str =
    "Explain the impact of distributed ledger technology on supply chain transparency.";

#[derive(Parser)]
#[command(name = "examguard")]
#[command(about = "examguard: keystroke-verified exam client")]
#[command(version = examguard_core::VERSION)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Collaborator endpoints and local state, shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base URL of the auth / exam API
    #[arg(long, global = true, env = "EXAMGUARD_API_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_url: String,

    /// WebSocket URL of the keystroke verifier
    #[arg(long, global = true, env = "EXAMGUARD_VERIFIER_URL", default_value = DEFAULT_VERIFIER_URL)]
    pub verifier_url: String,

    /// Directory holding the persisted session credential (default: ~/.examguard)
    #[arg(long, global = true, env = "EXAMGUARD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Verifier reconnect policy: "never" or e.g. "3x500ms"
    #[arg(long, global = true, default_value = "never")]
    pub reconnect: ReconnectPolicy,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session credential
    Login {
        /// Account email
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long, env = "EXAMGUARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the signed-in principal
    Whoami,

    /// Create an account (does not sign in)
    Register {
        /// Account email
        email: String,

        /// Display name
        #[arg(long)]
        full_name: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long, env = "EXAMGUARD_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Answer one question with live keystroke verification
    Exam {
        /// Exam identifier
        exam_id: String,

        /// Question identifier
        #[arg(long, default_value = "q1")]
        question_id: String,

        /// Question text shown to the candidate
        #[arg(long, default_value = DEFAULT_QUESTION)]
        question: String,
    },

    /// Print the forensic artifacts for a question
    Render {
        /// Question text
        #[arg(long, default_value = DEFAULT_QUESTION)]
        question: String,

        /// Output: html (bait field + poisoned question) or plan (watermarked raster layout JSON)
        #[arg(long, default_value = "html", value_parser = ["html", "plan"])]
        format: String,

        /// Exam identifier mixed into the watermark
        #[arg(long, default_value = "demo")]
        exam_id: String,

        /// Question identifier mixed into the watermark
        #[arg(long, default_value = "q1")]
        question_id: String,

        /// Principal id for the watermark (default: the signed-in principal)
        #[arg(long)]
        student_id: Option<i64>,

        /// Surface width in CSS pixels
        #[arg(long, default_value = "640")]
        width: f64,

        /// Surface height in CSS pixels
        #[arg(long, default_value = "192")]
        height: f64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match cli.command {
        Commands::Login { email, password } => {
            commands::auth::login(&cli.global, &email, password)
        }
        Commands::Logout => commands::auth::logout(&cli.global),
        Commands::Whoami => commands::auth::whoami(&cli.global),
        Commands::Register {
            email,
            full_name,
            password,
        } => commands::auth::register(&cli.global, &email, &full_name, password),
        Commands::Exam {
            exam_id,
            question_id,
            question,
        } => commands::exam::run(&cli.global, &exam_id, &question_id, &question),
        Commands::Render {
            question,
            format,
            exam_id,
            question_id,
            student_id,
            width,
            height,
        } => commands::render::run(
            &cli.global,
            commands::render::RenderCommandConfig {
                question: &question,
                format: &format,
                exam_id: &exam_id,
                question_id: &question_id,
                student_id,
                width,
                height,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}
