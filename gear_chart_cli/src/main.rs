use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use gear_chart::{build_chart, layout, parse_bikes, Bike, ChartParams};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::{render_chart_guard, ChartKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare bicycle gearing on a gain-ratio chart", long_about = None)]
struct Cli {
    /// Bike gears data file
    #[arg(value_hint = ValueHint::FilePath)]
    bikes: PathBuf,

    /// Output image width
    #[arg(short = 'x', long, default_value_t = ChartParams::default().width)]
    width: u32,

    /// Output image height
    #[arg(short = 'y', long, default_value_t = ChartParams::default().height)]
    height: u32,

    /// Supersampling antialiasing factor
    #[arg(short, long, default_value_t = ChartParams::default().supersampling)]
    supersampling: u32,

    /// Output PNG path
    #[arg(short, long, default_value = "gears.png", value_hint = ValueHint::FilePath)]
    output_image: PathBuf,

    /// Output SVG path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Write the per-gear table as CSV (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    table: Option<PathBuf>,

    /// Write the chart draw plan as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    plan: Option<PathBuf>,

    /// Disable image generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    handle_chart(cli)
}

fn handle_chart(args: Cli) -> Result<()> {
    let params = ChartParams {
        width: args.width,
        height: args.height,
        supersampling: args.supersampling,
    };
    params.validate()?;
    let timed = args.profile || args.verbose;

    let t_parse = Instant::now();
    let text = fs::read_to_string(&args.bikes)
        .with_context(|| format!("failed to read {}", args.bikes.display()))?;
    let bikes = parse_bikes(&text)
        .with_context(|| format!("failed to parse {}", args.bikes.display()))?;
    if timed {
        info!(
            "Parse stage: {:.1} ms",
            t_parse.elapsed().as_secs_f64() * 1000.0
        );
    }
    info!("Loaded {} bikes from {}", bikes.len(), args.bikes.display());
    for bike in &bikes {
        debug!(
            "{}: {} x {} gears, radius {}, crank {}",
            bike.name(),
            bike.front().len(),
            bike.rear().len(),
            bike.full_radius(),
            bike.crank()
        );
    }

    if let Some(path) = args.table.as_ref() {
        if path.as_os_str() == "-" {
            write_table_stdout(&bikes)?;
        } else {
            write_table_csv(&bikes, path)?;
            info!("Wrote gear table: {}", path.display());
        }
    }

    let t_layout = Instant::now();
    let output_chart = layout(&bikes, (params.width, params.height))
        .with_context(|| format!("failed to lay out {}", args.bikes.display()))?;
    if timed {
        info!(
            "Layout stage: {:.1} ms ({} grid lines, {} rows)",
            t_layout.elapsed().as_secs_f64() * 1000.0,
            output_chart.grid.len(),
            output_chart.rows.len()
        );
    }
    info!("Highest gain ratio: {:.2}", output_chart.max_ratio);

    if let Some(path) = args.plan.as_ref() {
        let json = serde_json::to_string_pretty(&output_chart)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote draw plan: {}", path.display());
    }

    if args.no_plot {
        return Ok(());
    }

    let t_plot = Instant::now();
    let (draw_w, draw_h) = params.draw_size();
    debug!("Drawing at {}x{} (x{})", draw_w, draw_h, params.supersampling);
    let draw_chart = build_chart(&bikes, &params)?;
    let png = ChartKind::Png {
        output: (params.width, params.height),
    };
    report_render(
        render_chart_guard(&draw_chart, &args.output_image, png),
        &args.output_image,
    );
    if let Some(path) = args.svg.as_ref() {
        report_render(
            render_chart_guard(&output_chart, path, ChartKind::Svg),
            path,
        );
    }
    if timed {
        info!(
            "Plot stage: {:.1} ms",
            t_plot.elapsed().as_secs_f64() * 1000.0
        );
    }

    Ok(())
}

fn report_render(result: Result<(), String>, path: &Path) {
    match result {
        Ok(()) => info!("Wrote chart: {}", path.display()),
        Err(err) => warn!("Skipping render ({}): {}", path.display(), err),
    }
}

fn write_table_stdout(bikes: &[Bike]) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_table_rows(bikes, &mut writer)
}

fn write_table_csv(bikes: &[Bike], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_table_rows(bikes, &mut writer)
}

fn write_table_rows<W: Write>(bikes: &[Bike], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "bike",
        "front_teeth",
        "rear_teeth",
        "front_rank",
        "rear_rank",
        "gear_ratio",
        "development_m",
        "gear_inches",
        "gain_ratio",
    ])?;

    for bike in bikes {
        for row in bike.gear_table() {
            writer.write_record([
                bike.name().to_string(),
                format!("{}", row.front_teeth),
                format!("{}", row.rear_teeth),
                row.front_rank.to_string(),
                row.rear_rank.to_string(),
                format!("{:.3}", row.gear_ratio),
                format!("{:.3}", row.development_m),
                format!("{:.1}", row.gear_inches),
                format!("{:.3}", row.gain_ratio),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_gear_in_ratio_order() {
        let bikes = parse_bikes("# Road\nfront: 50, 34\nrear: 11, 28\n\n# Fixed\nfront: 48\nrear: 16\n")
            .unwrap();
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_table_rows(&bikes, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 4 + 1);
        assert!(lines[0].starts_with("bike,front_teeth,rear_teeth"));
        assert!(lines[1].starts_with("Road,34,28,1,1,"));
        assert!(lines[4].starts_with("Road,50,11,2,2,"));
        assert!(lines[5].starts_with("Fixed,48,16,1,1,3.000,"));
    }

    #[test]
    fn cli_defaults_match_chart_params() {
        let cli = Cli::parse_from(["gear-chart", "bikes.txt"]);
        let defaults = ChartParams::default();
        assert_eq!(cli.width, defaults.width);
        assert_eq!(cli.height, defaults.height);
        assert_eq!(cli.supersampling, defaults.supersampling);
        assert_eq!(cli.output_image, PathBuf::from("gears.png"));
        assert!(cli.table.is_none());
    }

    #[test]
    fn cli_short_flags() {
        let cli = Cli::parse_from([
            "gear-chart", "bikes.txt", "-x", "800", "-y", "600", "-s", "4", "-o", "out.png",
        ]);
        assert_eq!((cli.width, cli.height, cli.supersampling), (800, 600, 4));
        assert_eq!(cli.output_image, PathBuf::from("out.png"));
    }
}
