use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use gcodetune::{
    apply_line_filter, init_logging, walk_layers, ArcOptimizer, ArcOptimizerConfig, Document,
    DocumentFilter, GradientMode, PauseAtLayer, RelativeExtrusionFilter, StretchConfig,
    StretchFilter, TempGradient, TranslateFilter,
};

#[derive(Parser)]
#[command(
    name = "gcodetune",
    version,
    about = "G-code post-processing toolkit for 3D printing"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose mode (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Args)]
struct IoArgs {
    /// Program filename to be modified. Defaults to standard input.
    infile: Option<PathBuf>,

    /// Modified program. Defaults to standard output.
    outfile: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Replace runs of straight moves with G2/G3 arcs
    Arcs {
        #[command(flatten)]
        io: IoArgs,

        /// Minimum number of buffered moves before an arc is attempted
        #[arg(long, default_value_t = 8)]
        min_segments: usize,

        /// Largest plausible arc radius in mm
        #[arg(long, default_value_t = 200.0)]
        max_radius: f64,

        /// Maximum distance of a point from the fitted circle in mm
        #[arg(long, default_value_t = 0.015)]
        alignment_error: f64,

        /// Maximum angular step deviation in degrees
        #[arg(long, default_value_t = 5.0)]
        phase_error: f64,

        /// Maximum relative extrusion ratio deviation inside a run
        #[arg(long, default_value_t = 0.15)]
        extrusion_error: f64,
    },

    /// Modify a program to account for stretch and improve hole size
    Stretch {
        #[command(flatten)]
        io: IoArgs,

        /// Distance over edge width within which nearby moves damp the
        /// stretch direction
        #[arg(long, default_value_t = 5.0)]
        cross_limit_distance_over_edge_width: f64,

        /// Distance over edge width at which the thread direction is
        /// sampled around each point
        #[arg(long, default_value_t = 2.0)]
        stretch_from_distance_over_edge_width: f64,

        /// Stretching strength for "loop" (extra shells)
        #[arg(long, default_value_t = 0.11)]
        loop_stretch_over_edge_width: f64,

        /// Stretching strength for "inner perimeter"
        #[arg(long, default_value_t = 0.32)]
        edge_inside_stretch_over_edge_width: f64,

        /// Stretching strength for "outer perimeter"
        #[arg(long, default_value_t = 0.1)]
        edge_outside_stretch_over_edge_width: f64,

        /// Stretching strength for open paths such as infill
        #[arg(long, default_value_t = 0.0)]
        path_stretch_over_edge_width: f64,

        /// Global stretch factor. This is the first setting you'll want
        /// to change to modify the hole size.
        #[arg(long, default_value_t = 1.0)]
        stretch_strength: f64,

        /// Reduce extrusion of displaced moves by the relative stretch
        #[arg(long)]
        attenuate_extrusion: bool,
    },

    /// Translate a program in the X/Y plane
    Translate {
        #[command(flatten)]
        io: IoArgs,

        /// Amount of X translation
        #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
        x: f64,

        /// Amount of Y translation
        #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
        y: f64,
    },

    /// Add a temperature gradient for unattended calibration prints
    Tempcal {
        /// Initial temperature (best set to the default slicing temperature)
        start_temp: f64,

        /// End temperature for the program, usually lower than the start
        end_temp: f64,

        #[command(flatten)]
        io: IoArgs,

        /// Minimum height above which the gradient is created
        #[arg(short = 'z', long, default_value_t = 0.1)]
        min_z_change: f64,

        /// Recompute the temperature for every layer instead of holding
        /// it over discrete steps
        #[arg(short, long)]
        continuous: bool,

        /// Number of steps for the discrete gradient
        #[arg(short, long, default_value_t = 10)]
        steps: u32,
    },

    /// Insert a pause (M226) at the start of selected printed layers
    Pause {
        #[command(flatten)]
        io: IoArgs,

        /// Printed layer numbers to pause at
        #[arg(short, long, required = true, value_delimiter = ',')]
        layer: Vec<usize>,
    },
}

fn read_document(io: &IoArgs) -> anyhow::Result<Document> {
    let text = match &io.infile {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading program from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading program from standard input")?;
            buffer
        }
    };
    Document::parse(&text).context("parsing G-code program")
}

fn write_document(doc: &Document, io: &IoArgs) -> anyhow::Result<()> {
    let rendered = doc.render();
    match &io.outfile {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("writing program to {}", path.display()))?,
        None => io::stdout()
            .write_all(rendered.as_bytes())
            .context("writing program to standard output")?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // default is info, as for the historical command line tools
    let verbosity = 1 + cli.verbose as i32 - cli.quiet as i32;
    init_logging(verbosity)?;

    match cli.command {
        Command::Arcs {
            io,
            min_segments,
            max_radius,
            alignment_error,
            phase_error,
            extrusion_error,
        } => {
            let mut doc = read_document(&io)?;
            let config = ArcOptimizerConfig {
                min_segments,
                max_radius,
                alignment_error,
                phase_error,
                extrusion_error,
                ..ArcOptimizerConfig::default()
            };
            let mut optimizer = ArcOptimizer::with_config(config);
            apply_line_filter(&mut doc, &mut optimizer)?;
            write_document(&doc, &io)
        }

        Command::Stretch {
            io,
            cross_limit_distance_over_edge_width,
            stretch_from_distance_over_edge_width,
            loop_stretch_over_edge_width,
            edge_inside_stretch_over_edge_width,
            edge_outside_stretch_over_edge_width,
            path_stretch_over_edge_width,
            stretch_strength,
            attenuate_extrusion,
        } => {
            let mut doc = read_document(&io)?;

            // stretching assumes relative extrusion, convert first
            let mut to_relative = RelativeExtrusionFilter::new();
            apply_line_filter(&mut doc, &mut to_relative)?;

            let config = StretchConfig {
                cross_limit_distance_over_edge_width,
                stretch_from_distance_over_edge_width,
                loop_stretch_over_edge_width,
                edge_inside_stretch_over_edge_width,
                edge_outside_stretch_over_edge_width,
                path_stretch_over_edge_width,
                stretch_strength,
                attenuate_extrusion,
            };
            let mut stretch = StretchFilter::with_config(config);
            stretch.apply(&mut doc)?;
            write_document(&doc, &io)
        }

        Command::Translate { io, x, y } => {
            let mut doc = read_document(&io)?;
            let mut translate = TranslateFilter::new(x, y);
            apply_line_filter(&mut doc, &mut translate)?;
            write_document(&doc, &io)
        }

        Command::Tempcal {
            start_temp,
            end_temp,
            io,
            min_z_change,
            continuous,
            steps,
        } => {
            let mut doc = read_document(&io)?;
            let mode = if continuous {
                GradientMode::Continuous
            } else {
                GradientMode::Steps(steps)
            };
            let mut gradient = TempGradient::new(start_temp, end_temp, min_z_change, mode);
            gradient.apply(&mut doc)?;
            write_document(&doc, &io)
        }

        Command::Pause { io, layer } => {
            let mut doc = read_document(&io)?;
            let mut pause = PauseAtLayer::new(layer);
            walk_layers(&mut doc, &mut pause, 2);
            write_document(&doc, &io)
        }
    }
}
