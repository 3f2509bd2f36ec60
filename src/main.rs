use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use bej2json::byte_source::ByteSource;
use bej2json::dictionary::Dictionary;
use bej2json::error::DecodeError;
use bej2json::transcoder;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "BEJ-to-JSON decoder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a BEJ-encoded file into JSON using a schema and annotation dictionary
    Decode {
        /// Schema dictionary file
        #[arg(short = 's', long = "schema")]
        schema: PathBuf,

        /// Annotation dictionary file
        #[arg(short = 'a', long = "annotation")]
        annotation: PathBuf,

        /// BEJ-encoded input file
        #[arg(short = 'b', long = "bej")]
        bej: PathBuf,

        /// Enable progress logging on the diagnostic stream
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Replaces the final path component's last extension with `.json`, or
/// appends `.json` if the input has none.
fn derive_output_path(input: &Path) -> PathBuf {
    input.with_extension("json")
}

/// Rejects empty paths before they reach any I/O call, per the spec's
/// distinction between a bad argument and a failed open.
fn require_non_empty(path: &Path, which: &str) -> Result<(), DecodeError> {
    if path.as_os_str().is_empty() {
        return Err(DecodeError::InvalidArgument(format!("{which} path is empty")));
    }
    Ok(())
}

fn run_decode(schema: &Path, annotation: &Path, bej: &Path) -> Result<PathBuf> {
    require_non_empty(schema, "schema")?;
    require_non_empty(annotation, "annotation")?;
    require_non_empty(bej, "bej")?;

    let schema_dict =
        Dictionary::load(schema).with_context(|| format!("Failed to load schema dictionary {:?}", schema))?;
    let annotation_dict = Dictionary::load(annotation)
        .with_context(|| format!("Failed to load annotation dictionary {:?}", annotation))?;

    let bej_file = File::open(bej).with_context(|| format!("Failed to open BEJ input file {:?}", bej))?;
    let mut input = ByteSource::from_file(bej_file);

    let out_path = derive_output_path(bej);
    let out_file =
        File::create(&out_path).with_context(|| format!("Failed to create output file {:?}", out_path))?;
    let writer = BufWriter::new(out_file);

    transcoder::decode(&schema_dict, &annotation_dict, &mut input, writer)
        .with_context(|| format!("Failed to decode BEJ stream from {:?}", bej))?;

    Ok(out_path)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Decode {
            schema,
            annotation,
            bej,
            verbose,
        } => {
            init_logging(verbose);
            tracing::debug!(?schema, ?annotation, ?bej, "starting decode");

            match run_decode(&schema, &annotation, &bej) {
                Ok(out_path) => {
                    tracing::info!(output = ?out_path, "decode succeeded");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "decode failed");
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_output_path_replaces_extension() {
        assert_eq!(
            derive_output_path(Path::new("/tmp/record.bej")),
            PathBuf::from("/tmp/record.json")
        );
    }

    #[test]
    fn derive_output_path_appends_when_no_extension() {
        assert_eq!(
            derive_output_path(Path::new("/tmp/record")),
            PathBuf::from("/tmp/record.json")
        );
    }

    #[test]
    fn derive_output_path_replaces_only_last_extension() {
        assert_eq!(
            derive_output_path(Path::new("archive.tar.bej")),
            PathBuf::from("archive.tar.json")
        );
    }

    #[test]
    fn require_non_empty_rejects_empty_path() {
        assert!(require_non_empty(Path::new(""), "schema").is_err());
    }

    #[test]
    fn require_non_empty_accepts_real_path() {
        assert!(require_non_empty(Path::new("/tmp/x.bej"), "bej").is_ok());
    }
}
