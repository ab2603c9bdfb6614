mod settings;

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crisis_scan_core::{
    assessment::{build_risk_user_prompt, parse_assessment, RISK_SYSTEM_PROMPT},
    report::{render_report, OutputFormat},
    BuiltinKeywords, FileKeywordRepository, KeywordRepository, KeywordScanner, ScanResult,
    Scanner,
};
use settings::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "crisis-scan",
    author,
    version,
    about = "Lexical crisis-language scanner for therapy transcripts"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory containing a keyword pack (keywords.txt)
    #[arg(long = "keywords-dir", value_name = "DIR", global = true)]
    keywords_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a transcript for crisis language
    Scan {
        /// Transcript file; reads stdin when omitted or `-`
        input: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = FormatArg::Human)]
        format: FormatArg,
    },
    /// Print the risk level of a stored risk flags blob
    Classify {
        /// Risk flags JSON file; reads stdin when omitted or `-`
        input: Option<PathBuf>,
    },
    /// List the active keyword set
    ListKeywords {
        /// Emit keywords as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Print the model prompt for a transcript's risk classification
    RiskPrompt {
        /// Transcript file; reads stdin when omitted or `-`
        input: Option<PathBuf>,
    },
    /// Validate a model risk assessment response
    ParseAssessment {
        /// Raw model output; reads stdin when omitted or `-`
        input: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Human,
    Json,
    Yaml,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Human => OutputFormat::Human,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Yaml => OutputFormat::Yaml,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.keywords_dir {
        settings.keywords_dir = Some(dir);
    }

    match cli.command {
        Commands::Scan { input, format } => scan(&settings, input.as_deref(), format.into())?,
        Commands::Classify { input } => classify(&settings, input.as_deref())?,
        Commands::ListKeywords { json } => list_keywords(&settings, json)?,
        Commands::RiskPrompt { input } => risk_prompt(input.as_deref())?,
        Commands::ParseAssessment { input } => parse_model_output(input.as_deref())?,
    }
    Ok(())
}

fn keyword_repository(settings: &Settings) -> Box<dyn KeywordRepository> {
    match &settings.keywords_dir {
        Some(dir) => Box::new(FileKeywordRepository::new(dir)),
        None => Box::new(BuiltinKeywords),
    }
}

fn build_scanner(settings: &Settings) -> Result<KeywordScanner> {
    let repo = keyword_repository(settings);
    let scanner = KeywordScanner::from_repository(repo.as_ref(), settings.scanner_config())
        .context("failed to initialise keyword scanner")?;
    info!(
        keywords = scanner.keywords().len(),
        context_window = scanner.config().context_window,
        "scanner ready"
    );
    Ok(scanner)
}

fn scan(settings: &Settings, input: Option<&Path>, format: OutputFormat) -> Result<()> {
    let scanner = build_scanner(settings)?;
    let transcript = read_input(input)?;
    let result = scanner.scan(&transcript);
    let level = scanner.classify(&result);
    let rendered = render_report(&result, level, format)?;
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn classify(settings: &Settings, input: Option<&Path>) -> Result<()> {
    let scanner = build_scanner(settings)?;
    let raw = read_input(input)?;
    let result = ScanResult::from_json(&raw).context("invalid risk flags blob")?;
    println!("{}", scanner.classify(&result));
    Ok(())
}

fn list_keywords(settings: &Settings, json: bool) -> Result<()> {
    let repo = keyword_repository(settings);
    let keywords = repo.load_keywords()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&keywords)?);
        return Ok(());
    }

    let source = settings
        .keywords_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "built-in set".to_string());
    println!("{} keyword(s) loaded from {}", keywords.len(), source);
    for keyword in keywords.iter() {
        println!("- [{:4}] {}", keyword.severity.as_str(), keyword.phrase);
    }
    Ok(())
}

fn risk_prompt(input: Option<&Path>) -> Result<()> {
    let transcript = read_input(input)?;
    println!("--- system ---");
    println!("{}", RISK_SYSTEM_PROMPT.trim());
    println!("--- user ---");
    println!("{}", build_risk_user_prompt(&transcript));
    Ok(())
}

fn parse_model_output(input: Option<&Path>) -> Result<()> {
    let raw = read_input(input)?;
    let assessment = parse_assessment(&raw).context("model risk assessment rejected")?;
    println!("{}", serde_json::to_string_pretty(&assessment)?);
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}
