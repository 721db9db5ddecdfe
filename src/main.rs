//! llconv: convert Sipro headers and LogicLab `.pll` libraries.
//!
//! `llconv -o out/ defvar.h lib/*.pll` writes, per input file:
//!
//! - `.h`   → `<stem>.pll` and `<stem>.plclib`
//! - `.pll` → `<stem>.plclib`
//!
//! Issues found while parsing go to stderr and to `<stem>.log`.

use anyhow::{Context, Result};
use clap::Parser;
use llconv::{create_writer, parser, scanner, Format, Options};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn, Level};

#[derive(Parser)]
#[command(
    name = "llconv",
    version,
    about = "Convert PLC libraries (.h, .pll) to LogicLab formats (.pll, .plclib)"
)]
struct Cli {
    /// Input files (glob patterns supported)
    #[arg(required = true)]
    files: Vec<String>,

    /// Output directory, created if missing
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,

    /// Treat every issue as an error
    #[arg(short = 'f', long)]
    fussy: bool,

    /// Log progress and collected entities
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Conversion options, e.g. "schema-ver:2.8,sort"
    #[arg(long, default_value = "")]
    options: Options,
}

/// What happened across all input files.
#[derive(Debug, Default, PartialEq)]
struct Tally {
    issues: usize,
    failures: usize,
}

impl Tally {
    /// 2 if any file failed, 1 if any issue was reported, else 0.
    fn status(&self) -> u8 {
        if self.failures > 0 {
            2
        } else if self.issues > 0 {
            1
        } else {
            0
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(tally) => ExitCode::from(tally.status()),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_max_level(level)
        .init();
}

fn run(cli: &Cli) -> Result<Tally> {
    fs::create_dir_all(&cli.output)
        .with_context(|| format!("failed to create output directory: {}", cli.output.display()))?;
    if !cli.options.is_empty() {
        debug!("options: {}", cli.options);
    }

    let input_files = expand_globs(&cli.files)?;
    let mut tally = Tally::default();

    for path in &input_files {
        let Some(format) = Format::from_path(path) else {
            if cli.fussy {
                eprintln!("error: {}: unsupported file type", path.display());
                tally.failures += 1;
            } else {
                eprintln!("warning: {}: unsupported file type, skipped", path.display());
                tally.issues += 1;
            }
            continue;
        };

        info!("processing {}", path.display());
        let name = derive_output_name(path);
        let mut issues = Vec::new();
        if let Err(e) = convert(cli, path, format, &name, &mut issues) {
            eprintln!("error: {}: {:#}", path.display(), e);
            tally.failures += 1;
        }
        for issue in &issues {
            eprintln!("warning: {}: {}", path.display(), issue);
        }
        tally.issues += issues.len();
        write_log(&cli.output, &name, &issues)?;
    }

    Ok(tally)
}

/// Parse one file, validate it and write every output its format calls for.
fn convert(cli: &Cli, path: &Path, format: Format, name: &str, issues: &mut Vec<String>) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = scanner::decode(&bytes)?;

    let mut lib = parser::parse(format, name, text, issues, cli.fussy)?;
    lib.check()?;
    if cli.options.contains("sort") {
        lib.sort();
    }
    debug!("{}", lib);

    for ext in format.outputs() {
        let writer = create_writer(ext)?;
        let out_path = cli.output.join(format!("{}.{}", name, writer.file_extension()));
        let output = writer.write(&lib, &cli.options)?;
        fs::write(&out_path, output)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        info!("wrote {}", out_path.display());
    }
    Ok(())
}

/// Write the issues of one file to `<name>.log`, or drop a stale log.
fn write_log(output_dir: &Path, name: &str, issues: &[String]) -> Result<()> {
    let log_path = output_dir.join(format!("{}.log", name));
    if issues.is_empty() {
        if log_path.is_file() {
            if let Err(e) = fs::remove_file(&log_path) {
                warn!("cannot remove stale {}: {}", log_path.display(), e);
            }
        }
        return Ok(());
    }
    let mut content = issues.join("\n");
    content.push('\n');
    fs::write(&log_path, content).with_context(|| format!("failed to write {}", log_path.display()))
}

/// Expand glob patterns into a list of real file paths.
/// A bare directory contributes its `.h` and `.pll` files (non-recursive).
fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if path.is_dir() {
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed to read directory: {}", path.display()))?;
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_file() && Format::from_path(&p).is_some() {
                    files.push(p);
                }
            }
            continue;
        }
        let matches: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            eprintln!("warning: no files matched: {}", pattern);
        }
        files.extend(matches);
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// "dir/defvar.h" → "defvar"
fn derive_output_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "library".to_string())
}
