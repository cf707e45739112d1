use archive_export::anchor::{AnchorLocks, merge_files};
use archive_export::export::{self, ExportContext, ExportOrchestrator, MetsRecordExporter};
use archive_export::imaging::RustProbe;
use archive_export::pdf::LopdfAssembler;
use archive_export::storage::LocalStorage;
use archive_export::tree::DocumentTree;
use archive_export::{config, output};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archive-export")]
#[command(about = "Export digitised newspapers, magazines and photo archives")]
#[command(long_about = "\
Export digitised newspapers, magazines and photo archives

Each process is described by a document tree (JSON) and a process folder
holding its source files:

  process/
  ├── images/master/      # Master images (img001.tif, ...)
  ├── ocr/alto/           # ALTO files, same stem as the image
  ├── ocr/txt/            # Plain text OCR, same stem as the image
  └── ocr/pdf/            # One PDF per page, same stem as the image

The document type decides the export variant:

  Newspaper volume   → issue XML + PDF per issue, supplements, METS files
  Periodical volume  → volume XML + PDF, record METS
  Positive envelope  → one XML per positive
  Negative strip     → one XML for the strip
  Slide, generic     → one XML for the single image

Exported files are renamed to the unit identifier with a counter
(ABC-0001.tif, ...). Run 'archive-export gen-config' to generate a
documented export.toml.")]
#[command(version)]
struct Cli {
    /// Config file, or a directory containing export.toml
    #[arg(long, short, default_value = ".", global = true)]
    config: PathBuf,

    /// Debug logging when RUST_LOG is not set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export one process into its variant's target folder
    Export {
        /// Document tree (JSON)
        tree: PathBuf,
        /// Process folder holding the source files
        #[arg(long, default_value = ".")]
        process: PathBuf,
    },
    /// Merge the volumes of one anchor METS file into another
    MergeAnchor {
        /// Anchor file that receives the volumes
        existing: PathBuf,
        /// Anchor file whose volumes are added
        new: PathBuf,
    },
    /// Show the route and file naming of an export without writing
    Check {
        /// Document tree (JSON)
        tree: PathBuf,
    },
    /// Print a stock export.toml with all options documented
    GenConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "archive_export=debug"
    } else {
        "archive_export=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Export { tree, process } => {
            let config = config::load_config(&cli.config)?;
            let tree = DocumentTree::load(&tree)?;
            let (probe, pdf, storage) = (RustProbe::new(), LopdfAssembler::new(), LocalStorage::new());
            let locks = AnchorLocks::new();
            let ctx = ExportContext {
                config: &config,
                sources: config.sources.resolve(&process),
                probe: &probe,
                pdf: &pdf,
                storage: &storage,
                delegate: &MetsRecordExporter,
                anchor_locks: &locks,
            };
            let outcome = ExportOrchestrator::new(ctx).export(&tree);
            output::print_outcome(&outcome);
            if !outcome.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::MergeAnchor { existing, new } => {
            let locks = AnchorLocks::new();
            let outcome = locks.with_lock(&existing, || merge_files(&existing, &new))?;
            output::print_merge(&existing, &outcome);
        }
        Command::Check { tree } => {
            let config = config::load_config(&cli.config)?;
            let tree = DocumentTree::load(&tree)?;
            let plan = export::plan(&tree, &config)?;
            output::print_plan(&plan);
            println!("==> {} is ready to export", tree.process.title);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}
