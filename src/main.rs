use std::path::PathBuf;

use clap::{AppSettings, Parser};
use log::{debug, info};

use lc_river::{
    error::{ReadError, RiverError, WriteError},
    fold::{fold_to_river, Aggregation, BinningMode, FoldConfig},
    read::{lightcurve::FitsLightCurve, LightCurveRead},
    render::{render_river_png, RenderLimits},
    write::{write_river_fits, RiverOutputType},
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// The light-curve FITS file to fold.
    data: PathBuf,

    /// The river matrix to be written out; a .fits extension gets a FITS
    /// image, .png a rendered heatmap.
    #[clap(short, long)]
    output: PathBuf,

    /// The period to fold on [days].
    #[clap(short, long)]
    period: f64,

    /// The reference time defining phase zero, in the file's native day
    /// scale (e.g. BTJD). Defaults to the first good cadence.
    #[clap(short, long)]
    epoch: Option<f64>,

    /// The number of phase bins (columns). Derived from the cadence when
    /// not given.
    #[clap(long)]
    bins: Option<usize>,

    /// How many consecutive phase-sorted samples to aggregate per group.
    #[clap(long, default_value = "1")]
    bin_points: usize,

    /// How cell values are reduced: mean, median or sigma.
    #[clap(short, long, default_value = "mean")]
    aggregation: Aggregation,

    /// Binning semantics: phase-bins or point-groups.
    #[clap(long, default_value = "phase-bins")]
    binning: BinningMode,

    /// The flux column to fold.
    #[clap(long, default_value = "PDCSAP_FLUX")]
    flux_column: String,

    /// Lower colour-scale limit for .png output. Defaults to the 5th
    /// percentile of the matrix.
    #[clap(long)]
    vmin: Option<f64>,

    /// Upper colour-scale limit for .png output. Defaults to the 95th
    /// percentile of the matrix.
    #[clap(long)]
    vmax: Option<f64>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbosity);

    if let Err(e) = try_main(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main(args: Args) -> Result<(), RiverError> {
    let output_type = match args.output.extension().and_then(|os_str| os_str.to_str()) {
        Some("fits" | "fit") => RiverOutputType::Fits,
        Some("png") => RiverOutputType::Png,
        _ => return Err(WriteError::UnknownExtension(args.output.clone()).into()),
    };
    debug!("Output type: {output_type:?}");

    let reader: Box<dyn LightCurveRead> =
        match args.data.extension().and_then(|os_str| os_str.to_str()) {
            Some("fits" | "fit") => Box::new(FitsLightCurve::new(&args.data, &args.flux_column)?),
            _ => return Err(ReadError::UnknownExtension(args.data.clone()).into()),
        };
    let lc_context = reader.get_lc_context().clone();
    let light_curve = reader.read()?;

    match (&lc_context.object, &lc_context.telescope) {
        (Some(object), Some(telescope)) => info!("{object} ({telescope})"),
        (Some(object), None) => info!("{object}"),
        _ => (),
    }
    info!("{} good cadences", light_curve.times.len());
    info!(
        "Time span: {} - {}",
        lc_context.timestamps.first(),
        lc_context.timestamps.last()
    );

    let config = FoldConfig {
        period: args.period,
        epoch: args.epoch,
        bin_points: args.bin_points,
        bin_count: args.bins,
        aggregation: args.aggregation,
        binning: args.binning,
    };
    let river = fold_to_river(&light_curve.times, &light_curve.fluxes, &config)?;
    info!(
        "River matrix: {} cycles x {} phase bins ({} aggregation)",
        river.num_cycles(),
        river.num_bins(),
        river.aggregation
    );

    match output_type {
        RiverOutputType::Fits => write_river_fits(&args.output, &river, Some(&lc_context))?,
        RiverOutputType::Png => {
            let title = lc_context
                .object
                .as_ref()
                .map(|o| format!("{o} river plot"));
            render_river_png(
                &args.output,
                &river,
                title.as_deref(),
                RenderLimits {
                    vmin: args.vmin,
                    vmax: args.vmax,
                },
            )?;
        }
    }
    info!("Wrote {}", args.output.display());

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
