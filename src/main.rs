//! report-renderer CLI - render report requests to PDF

use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;

use report_renderer::{ErrorResponse, PageSize, RenderedDocument, ReportService, ServiceConfig};

#[derive(Parser)]
#[command(name = "report-renderer")]
#[command(version)]
#[command(about = "Render structured report requests to PDF", long_about = None)]
struct Cli {
    /// Service configuration file (JSON)
    #[arg(short, long, global = true, env = "REPORT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory with .ttf/.otf fonts
    #[arg(long, global = true, value_name = "DIR")]
    fonts_dir: Option<PathBuf>,

    /// Logo image, registered as `logo`
    #[arg(long, global = true, value_name = "FILE")]
    logo: Option<PathBuf>,

    /// Page size: A4, A5, Letter, Legal or WIDTHxHEIGHT in points
    #[arg(long, global = true)]
    page_size: Option<PageSize>,

    /// Maximum pages per report
    #[arg(long, global = true)]
    max_pages: Option<usize>,

    /// Worker threads (0 = one per CPU)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Write each laid out page tree as JSON into this directory
    #[arg(long, global = true, value_name = "DIR")]
    debug_dir: Option<PathBuf>,

    /// Write uncompressed PDF streams
    #[arg(long, global = true)]
    no_compress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one report request
    Render {
        /// Request file, `-` for stdin
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output PDF (defaults to the report's file name)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Render several requests concurrently
    Batch {
        /// Request files
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },

    /// List the loaded fonts, images and themes
    Assets,
}

/// How a command failed; decides the exit code
enum Failure {
    /// Bad request content (exit 2)
    Client,
    /// Startup, I/O or render failure (exit 1)
    Server,
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Failure::Client => ExitCode::from(2),
            Failure::Server => ExitCode::from(1),
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let service = match build_service(&cli) {
        Ok(service) => service,
        Err(message) => {
            print_error("startup", &message);
            return ExitCode::from(1);
        }
    };

    let result = match &cli.command {
        Commands::Render { input, output } => cmd_render(&service, input, output.as_deref()),
        Commands::Batch { inputs, out_dir } => cmd_batch(&service, inputs, out_dir),
        Commands::Assets => {
            cmd_assets(&service);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => failure.exit_code(),
    }
}

fn build_service(cli: &Cli) -> Result<ReportService, String> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path).map_err(|e| e.to_string())?,
        None => ServiceConfig::default(),
    };
    config.apply_env().map_err(|e| e.to_string())?;

    if let Some(dir) = &cli.fonts_dir {
        config.fonts_dir = Some(dir.clone());
    }
    if let Some(logo) = &cli.logo {
        config.logo = Some(logo.clone());
    }
    if let Some(size) = cli.page_size {
        config.page_size = size;
    }
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(dir) = &cli.debug_dir {
        config.debug_dump_dir = Some(dir.clone());
    }
    if cli.no_compress {
        config.compress = false;
    }

    ReportService::from_config(&config).map_err(|e| e.to_string())
}

fn print_error(kind: &str, message: &str) {
    eprintln!("{}", json!({ "error": kind, "message": message }));
}

fn report_failure(source: &Path, response: &ErrorResponse) -> Failure {
    eprintln!("{}: {}", source.display(), response.to_json());
    if response.is_client_error() {
        Failure::Client
    } else {
        Failure::Server
    }
}

fn read_request(input: &Path) -> Result<Vec<u8>, Failure> {
    let read = if input.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).map(|_| buf)
    } else {
        fs::read(input)
    };
    read.map_err(|e| {
        print_error("io", &format!("failed to read {}: {}", input.display(), e));
        Failure::Server
    })
}

fn write_document(document: &RenderedDocument, path: &Path) -> Result<(), Failure> {
    fs::write(path, &document.bytes).map_err(|e| {
        print_error("io", &format!("failed to write {}: {}", path.display(), e));
        Failure::Server
    })?;
    println!(
        "{} ({} pages, {} bytes)",
        path.display(),
        document.page_count,
        document.len()
    );
    Ok(())
}

fn cmd_render(service: &ReportService, input: &Path, output: Option<&Path>) -> Result<(), Failure> {
    let payload = read_request(input)?;
    let document = service
        .handle_request(&payload)
        .map_err(|response| report_failure(input, &response))?;
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&document.filename));
    write_document(&document, &path)
}

fn cmd_batch(service: &ReportService, inputs: &[PathBuf], out_dir: &Path) -> Result<(), Failure> {
    fs::create_dir_all(out_dir).map_err(|e| {
        print_error("io", &format!("failed to create {}: {}", out_dir.display(), e));
        Failure::Server
    })?;

    let mut worst: Option<Failure> = None;
    let mut record = |failure: Failure| {
        worst = match (worst.take(), failure) {
            (Some(Failure::Server), _) | (_, Failure::Server) => Some(Failure::Server),
            _ => Some(Failure::Client),
        };
    };

    let mut pending = VecDeque::new();
    for input in inputs {
        let payload = match read_request(input) {
            Ok(payload) => payload,
            Err(failure) => {
                record(failure);
                continue;
            }
        };
        loop {
            match service.submit(payload.clone()) {
                Ok(report) => {
                    pending.push_back((input, report));
                    break;
                }
                Err(busy) if busy.status == 503 && !pending.is_empty() => {
                    if let Some((source, report)) = pending.pop_front() {
                        if let Err(failure) = finish_batch_item(source, report.wait(), out_dir) {
                            record(failure);
                        }
                    }
                }
                Err(response) => {
                    record(report_failure(input, &response));
                    break;
                }
            }
        }
    }

    for (source, report) in pending {
        if let Err(failure) = finish_batch_item(source, report.wait(), out_dir) {
            record(failure);
        }
    }

    info!("Batch finished: {} requests", inputs.len());
    match worst {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn finish_batch_item(
    source: &Path,
    outcome: Result<RenderedDocument, ErrorResponse>,
    out_dir: &Path,
) -> Result<(), Failure> {
    let document = outcome.map_err(|response| report_failure(source, &response))?;
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    write_document(&document, &out_dir.join(format!("{}.pdf", stem)))
}

fn cmd_assets(service: &ReportService) {
    let context = service.context();
    for (name, handle) in context.assets.iter() {
        println!("{:<32} {}", name, handle.kind());
    }
    let themes: Vec<&str> = context.themes.names().collect();
    println!("themes: {}", themes.join(", "));
}
