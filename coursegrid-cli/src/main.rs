mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "coursegrid")]
#[command(about = "Class schedule occurrence and conflict tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Schedule dataset (JSON); falls back to COURSEGRID_DATA
    #[arg(short, long, global = true)]
    data: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the occurrences of one or more sections
    Occurrences {
        /// Section ids, comma separated
        #[arg(short = 'S', long, value_delimiter = ',', required = true)]
        sections: Vec<i64>,

        /// First day of the window (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// Last day of the window, inclusive (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,

        /// Keep cancelled sessions in the output
        #[arg(long)]
        include_cancelled: bool,

        /// Output format: table, json or ics
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List the occurrences taught by a teacher
    Teacher {
        /// Teacher id
        id: i64,

        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,

        #[arg(long)]
        include_cancelled: bool,

        #[arg(short, long, default_value = "table")]
        format: String,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check whether enrolling a student in a section clashes with their timetable
    Conflict {
        #[arg(long)]
        student: i64,

        #[arg(long)]
        section: i64,

        #[arg(long)]
        semester: i64,
    },

    /// Parse a recurrence rule and print its normalized form
    ParseRule {
        /// Rule text, e.g. "INTERVAL=2;BYDAY=MO,WE;UNTIL=20240601"
        rule: String,
    },

    /// Show the display color assigned to an id
    Color {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("coursegrid_cli={0},coursegrid_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Occurrences {
            sections,
            start,
            end,
            include_cancelled,
            format,
            output,
        } => {
            commands::occurrences_command(commands::ListParams {
                data: cli.data,
                target: commands::Target::Sections(sections),
                start,
                end,
                include_cancelled,
                format,
                output,
            })
            .await
        }

        Commands::Teacher {
            id,
            start,
            end,
            include_cancelled,
            format,
            output,
        } => {
            commands::occurrences_command(commands::ListParams {
                data: cli.data,
                target: commands::Target::Teacher(id),
                start,
                end,
                include_cancelled,
                format,
                output,
            })
            .await
        }

        Commands::Conflict {
            student,
            section,
            semester,
        } => commands::conflict_command(cli.data, student, section, semester).await,

        Commands::ParseRule { rule } => commands::parse_rule_command(&rule),

        Commands::Color { id } => commands::color_command(id),
    }
}
