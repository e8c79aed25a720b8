#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the `urban_batch` tools.
//!
//! Each subcommand runs one batch job to completion. With no subcommand,
//! an interactive menu asks which job to run and where its files are.
//!
//! Logging goes through `indicatif-log-bridge` (via
//! [`urban_batch_cli_utils::init_logger`]) so log lines and progress bars
//! share the terminal cleanly. Set `RUST_LOG` to change verbosity.

mod commands;
mod interactive;

use clap::{Parser, Subcommand};

use crate::commands::{AlongRouteArgs, DimFitArgs, WidenArgs};

#[derive(Parser)]
#[command(
    name = "urban_batch",
    about = "Batch spatial analysis for tract routes and parcel footprints"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Density percentiles of the tracts along every tract-to-tract route
    AlongRoute(AlongRouteArgs),
    /// Reshape along-route output into one dense row per ordered tract pair
    Widen(WidenArgs),
    /// Test which building rectangles fit inside each parcel polygon
    DimFit(DimFitArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = urban_batch_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::AlongRoute(args) => commands::along_route(&args, &multi)?,
        Commands::Widen(args) => commands::widen(&args)?,
        Commands::DimFit(args) => commands::dim_fit(&args, &multi)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn along_route_defaults_use_standard_file_names() {
        let cli = Cli::try_parse_from(["urban_batch", "along-route"]).unwrap();
        let Some(Commands::AlongRoute(args)) = cli.command else {
            panic!("expected along-route");
        };
        assert_eq!(args.tracts, Path::new("tract_centroids_density.json"));
        assert_eq!(args.output, Path::new("along_route.csv"));
        assert_eq!(args.chunk_size, 100);
        assert_eq!(args.queue_capacity, 5000);
        assert!(args.workers.is_none());
    }

    #[test]
    fn dim_fit_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["urban_batch", "dim-fit"]).is_err());
        assert!(
            Cli::try_parse_from([
                "urban_batch",
                "dim-fit",
                "--postgis",
                "--geojsonseq",
                "a.geojsonl"
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from(["urban_batch", "dim-fit", "--postgis"]).unwrap();
        let Some(Commands::DimFit(args)) = cli.command else {
            panic!("expected dim-fit");
        };
        assert!(args.postgis);
        assert_eq!(args.table, "diss.buildable_areas");
        assert_eq!(args.srid, 26911);
        assert_eq!(args.page_size, 5000);
    }

    #[test]
    fn no_subcommand_is_interactive() {
        let cli = Cli::try_parse_from(["urban_batch"]).unwrap();
        assert!(cli.command.is_none());
    }
}
