use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "spdx-notice",
    about = "Normalize an SPDX spreadsheet or RDF/XML document and resolve every license text",
    version
)]
pub struct Cli {
    /// SBOM to read (.xls, .xlsx, .rdf, .rdf.xml)
    pub input: PathBuf,

    /// Config file [default: ./.spdx-notice/config.toml, fallback ~/.config/spdx-notice/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Directory for generated files; overrides `[output] directory`
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Where the corresponding source code can be obtained; recorded in the creation info
    #[arg(long, value_name = "URL")]
    pub source_url: Option<String>,

    /// Show every package and debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}
