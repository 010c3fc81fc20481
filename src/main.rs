use std::{path::PathBuf, process::ExitCode};

use clap::{error::ErrorKind, CommandFactory, Parser as ClapParser, Subcommand};
use colored::Colorize;
use stencilc::{
    backend::Target,
    frontend::registry::STENCIL_REGISTRY,
    loops::{self, LoopOptions},
    settings::{CompilerSettings, DimFactors},
    stencils,
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compiles a registered stencil to C++
    Compile {
        /// Name of the stencil to compile
        #[arg(short, long, default_value = "iso3dfd")]
        stencil: String,
        /// Bytes per element: 4 (float) or 8 (double)
        #[arg(short, long, default_value_t = 4)]
        elem_bytes: usize,
        #[arg(short, long, default_value_t = Target::Avx512)]
        target: Target,
        /// Lanes per vector, overriding what the target implies
        #[arg(long)]
        vector_width: Option<usize>,
        /// Lanes per domain dimension, e.g. `x=4,y=4`
        #[arg(long, default_value = "")]
        fold: DimFactors,
        /// Vectors per domain dimension in one cluster, e.g. `y=2`
        #[arg(long, default_value = "")]
        cluster: DimFactors,
        /// Tile extents the runtime will use, checked against fold and cluster
        #[arg(long, default_value = "")]
        tile: DimFactors,
        #[arg(short, long)]
        radius: Option<u32>,
        #[arg(long)]
        halo: Option<u32>,
        #[arg(long)]
        step_alloc: Option<u32>,
        /// Exact number of bundles to produce
        #[arg(long)]
        bundles: Option<usize>,
        #[arg(long)]
        unaligned_loads: bool,
        /// Leave conditionally written points undefined outside their conditions
        #[arg(long)]
        no_default_points: bool,
        /// Where to write the generated header (stdout otherwise)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Expands a loop nest template to C++
    Loops {
        /// The template text, or `@path` to read it from a file
        spec: String,
        /// Stencil dimensions including the step dimension
        #[arg(long, default_value_t = 4)]
        ndims: usize,
        #[arg(long, default_value = "rank")]
        var_set: String,
        /// Reject scan orders that break temporal blocking
        #[arg(long)]
        wavefront: bool,
    },
    /// Lists the registered stencils
    List,
}

fn run(command: Command) -> stencilc::Result<()> {
    match command {
        Command::Compile {
            stencil,
            elem_bytes,
            target,
            vector_width,
            fold,
            cluster,
            tile,
            radius,
            halo,
            step_alloc,
            bundles,
            unaligned_loads,
            no_default_points,
            output,
        } => {
            let to_stdout = output.is_none();
            let settings = CompilerSettings {
                stencil,
                elem_bytes,
                target,
                vector_width,
                fold,
                cluster,
                tile,
                radius,
                halo,
                step_alloc,
                bundle_count: bundles,
                allow_unaligned_loads: unaligned_loads,
                define_all_points: !no_default_points,
                output,
            };

            let code = stencilc::compile(&settings)?;
            if to_stdout {
                print!("{code}");
            }
        }
        Command::Loops {
            spec,
            ndims,
            var_set,
            wavefront,
        } => {
            let source = match spec.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
                    Args::command()
                        .error(ErrorKind::InvalidValue, format!("Cannot read '{path}': {e}"))
                        .exit()
                }),
                None => spec,
            };

            let options = LoopOptions {
                ndims,
                var_set,
                wavefront,
            };
            print!("{}", loops::expand(&source, &options)?);
        }
        Command::List => {
            stencils::register_all();
            for name in STENCIL_REGISTRY.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
