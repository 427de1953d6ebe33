use clap::{Args, Parser, Subcommand};
use ies2::batch::convert_directory;
use ies2::convert::{autodetect_output, convert_file, load_dictionary, ConvertOptions};
use ies2::localize::LocaleLayout;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ies2", version, about = "IES <-> XML converter for Granado Espada data tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one file; the direction follows the extensions
    Convert {
        input:  PathBuf,
        /// Defaults to the input with the other extension
        output: Option<PathBuf>,
        #[command(flatten)]
        codec:  CodecArgs,
    },
    /// Convert every .ies/.xml file of a directory
    Batch {
        input_dir: PathBuf,
        #[arg(short = 'O', long, default_value = "folder_output")]
        output_dir: PathBuf,
        /// Write the per-file outcome as JSON
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        codec: CodecArgs,
    },
}

#[derive(Args)]
struct CodecArgs {
    /// String encoding in ies files
    #[arg(short, long)]
    encoding: Option<String>,
    /// Use single-precision floats for the numbers array
    #[arg(short, long)]
    float: bool,
    /// dictionary_local.xml used to replace localized string placeholders
    #[arg(short, long = "dict")]
    dict: Option<PathBuf>,
    /// XML directory used as the source of attribute ordering
    #[arg(short, long)]
    order: Option<PathBuf>,
    /// JSON file with converter options; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not merge localized files with their base file
    #[arg(long)]
    no_locale_merge: bool,
    /// Do not emit <Schema> type hints when decoding
    #[arg(long)]
    no_schema: bool,
}

impl CodecArgs {
    fn into_options(self) -> Result<ConvertOptions, Box<dyn std::error::Error>> {
        let mut opts = match &self.config {
            Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
            None => ConvertOptions::default(),
        };
        if let Some(encoding) = self.encoding {
            opts.encoding = encoding;
        }
        opts.use_float |= self.float;
        if let Some(dict) = &self.dict {
            opts.dictionary = Some(load_dictionary(dict)?);
        }
        if self.order.is_some() {
            opts.order_dir = self.order;
        }
        if self.no_locale_merge {
            opts.locale_layout = LocaleLayout::Disabled;
        }
        if self.no_schema {
            opts.emit_schema = false;
        }
        // Surface a bad encoding name before touching any file.
        opts.text_codec()?;
        Ok(opts)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match Cli::parse().command {

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, codec } => {
            let started = Instant::now();
            let opts = codec.into_options()?;
            let output = output.unwrap_or_else(|| autodetect_output(&input));
            convert_file(&input, &output, &opts)?;
            info!("Converted {} -> {} in {:?}", input.display(), output.display(), started.elapsed());
        }

        // ── Batch ────────────────────────────────────────────────────────────
        Commands::Batch { input_dir, output_dir, report, codec } => {
            let opts = codec.into_options()?;
            let summary = convert_directory(&input_dir, &output_dir, &opts)?;
            for failed in summary.outcomes.iter().filter(|o| !o.is_ok()) {
                eprintln!("  failed  {}: {}", failed.input.display(), failed.error.as_deref().unwrap_or_default());
            }
            if let Some(path) = report {
                std::fs::write(&path, summary.to_json()?)?;
                info!("Report written to {}", path.display());
            }
            if summary.failed() > 0 {
                return Err(format!("{} of {} files failed", summary.failed(), summary.outcomes.len()).into());
            }
        }
    }
    Ok(())
}
