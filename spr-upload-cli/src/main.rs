//! SPR Upload CLI Application
//!
//! Command-line front end for the spr-upload library. It loads the run
//! configuration and the compound set, runs the report pipeline and
//! optionally writes a JSON summary of the run.

use anyhow::{Context, Result};
use clap::Parser;
use spr_upload::{read_compound_set, ReportConfig, ReportPipeline};
use std::path::{Path, PathBuf};

mod summary;

/// SPR Upload - Build the assay upload workbook from a Biacore run
#[derive(Parser, Debug)]
#[command(name = "spr-upload")]
#[command(about = "Build the SPR assay upload workbook from Biacore exports", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the run configuration (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Compound set: tab-delimited text or CSV with Broad ID, Test [Cpd] uM and MW
    #[arg(short = 'm', long, value_name = "FILE")]
    compounds: PathBuf,

    /// Output workbook (default: path_output from the config, then <date>_<project>_spr_upload.xlsx)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write a JSON summary of the run to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("SPR Upload CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using spr-upload library v{}", spr_upload::VERSION);

    let pipeline = ReportPipeline::from_config_file(&args.config)
        .with_context(|| format!("Invalid configuration {:?}", args.config))?;

    let compounds = read_compound_set(&args.compounds)
        .with_context(|| format!("Failed to read compound set {:?}", args.compounds))?;

    let output = resolve_output(args.output.as_deref(), pipeline.config());
    let run = pipeline
        .run(&compounds, &output)
        .context("Upload report was not written")?;

    log::info!(
        "Wrote {} rows ({} compounds x {} flow channels) to {:?}",
        run.rows,
        run.compounds,
        run.flow_channels,
        run.output()
    );

    if let Some(path) = &args.summary {
        let instrument = pipeline.config().meta.instrument;
        summary::write_summary(path, &summary::SummaryFile::new(&run, instrument.as_str()))?;
    }

    Ok(())
}

/// Output path: the command line wins, then the config, then a name built from the run metadata
fn resolve_output(cli: Option<&Path>, config: &ReportConfig) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Some(path) = &config.paths.path_output {
        return path.clone();
    }
    PathBuf::from(format!(
        "{}_{}_spr_upload.xlsx",
        config.meta.experiment_date, config.meta.project_code
    ))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const CONFIG: &str = r#"
        [paths]
        path_ss_img = "ss_img"
        path_senso_img = "senso_img"
        path_ss_txt = "ss.txt"
        path_senso_txt = "senso.txt"
        path_report_pt = "report_points.xlsx"

        [meta]
        num_fc_used = 1
        experiment_date = 181029
        project_code = "PRJ1"
        operator = "jdoe"
        instrument = "BiacoreS200"
        protocol = "P-17"
        chip_lot = "LOT42"
        nucleotide = "GTP"
        raw_data_filename = "run.blr"
        directory_folder = "runs"
        fc2_protein_BIP = "BIP-2"
        fc2_protein_RU = 2000
        fc2_protein_MW = 50000
        fc3_protein_BIP = "BIP-3"
        fc3_protein_RU = 0
        fc3_protein_MW = 1
        fc4_protein_BIP = "BIP-4"
        fc4_protein_RU = 0
        fc4_protein_MW = 1
    "#;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "spr-upload", "-c", "config.toml", "-m", "cpds.txt", "-vv", "--summary", "run.json",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert_eq!(args.compounds, PathBuf::from("cpds.txt"));
        assert_eq!(args.verbose, 2);
        assert_eq!(args.summary, Some(PathBuf::from("run.json")));
        assert!(args.output.is_none());

        assert!(Args::try_parse_from(["spr-upload", "-c", "config.toml"]).is_err());
    }

    #[test]
    fn test_resolve_output() {
        let mut config = ReportConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(
            resolve_output(None, &config),
            PathBuf::from("181029_PRJ1_spr_upload.xlsx")
        );

        config.paths.path_output = Some(PathBuf::from("out/config.xlsx"));
        assert_eq!(resolve_output(None, &config), PathBuf::from("out/config.xlsx"));
        assert_eq!(
            resolve_output(Some(Path::new("cli.xlsx")), &config),
            PathBuf::from("cli.xlsx")
        );
    }
}
