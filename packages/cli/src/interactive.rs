//! Menu-driven front end used when no subcommand is given.

use std::path::PathBuf;

use dialoguer::{Input, Select};
use urban_batch_cli_utils::MultiProgress;
use urban_batch_pool::{DEFAULT_QUEUE_CAPACITY, default_workers};

use crate::commands::{
    self, AlongRouteArgs, DEFAULT_ALONG_ROUTE, DEFAULT_ALONG_ROUTE_WIDE, DEFAULT_DIM_FIT,
    DEFAULT_TRACTS, DimFitArgs, WidenArgs,
};

enum Tool {
    AlongRoute,
    Widen,
    DimFit,
}

impl Tool {
    const ALL: &[Self] = &[Self::AlongRoute, Self::Widen, Self::DimFit];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::AlongRoute => "Band densities along tract-to-tract routes",
            Self::Widen => "Reshape along-route output to one row per pair",
            Self::DimFit => "Test building rectangles against parcels",
        }
    }
}

enum PolygonInput {
    GeoJsonSeq,
    Postgis,
}

impl PolygonInput {
    const ALL: &[Self] = &[Self::GeoJsonSeq, Self::Postgis];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::GeoJsonSeq => "Newline-delimited GeoJSON file",
            Self::Postgis => "PostGIS table (DATABASE_URL)",
        }
    }
}

fn path_prompt(prompt: &str, default: &str) -> Result<PathBuf, dialoguer::Error> {
    let text: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()?;
    Ok(PathBuf::from(text))
}

fn workers_prompt() -> Result<usize, dialoguer::Error> {
    Input::new()
        .with_prompt("Worker threads")
        .default(default_workers())
        .interact_text()
}

/// Prompts for a tool and its inputs, then runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected tool fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::AlongRoute => {
            let args = AlongRouteArgs {
                tracts: path_prompt("Tract centroids", DEFAULT_TRACTS)?,
                output: path_prompt("Output CSV", DEFAULT_ALONG_ROUTE)?,
                workers: Some(workers_prompt()?),
                chunk_size: urban_batch_banding::DEFAULT_PAIR_BATCH_SIZE,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                subsegment_length: urban_batch_spatial::corridor::DEFAULT_SUBSEGMENT_LENGTH_M,
                min_land_area: None,
            };
            commands::along_route(&args, multi)?;
        }
        Tool::Widen => {
            let args = WidenArgs {
                tracts: path_prompt("Tract centroids", DEFAULT_TRACTS)?,
                input: path_prompt("Along-route CSV", DEFAULT_ALONG_ROUTE)?,
                output: path_prompt("Output CSV", DEFAULT_ALONG_ROUTE_WIDE)?,
                min_land_area: None,
            };
            commands::widen(&args)?;
        }
        Tool::DimFit => {
            let input_labels: Vec<&str> =
                PolygonInput::ALL.iter().map(PolygonInput::label).collect();
            let input = Select::new()
                .with_prompt("Polygon source")
                .items(&input_labels)
                .default(1)
                .interact()?;

            let geojsonseq = match PolygonInput::ALL[input] {
                PolygonInput::GeoJsonSeq => {
                    Some(path_prompt("Polygon file", "buildable_areas.geojsonl")?)
                }
                PolygonInput::Postgis => None,
            };
            let postgis = geojsonseq.is_none();
            let table = if postgis {
                Input::new()
                    .with_prompt("Table")
                    .default(urban_batch_footprint::source::DEFAULT_TABLE.to_string())
                    .interact_text()?
            } else {
                urban_batch_footprint::source::DEFAULT_TABLE.to_string()
            };

            let args = DimFitArgs {
                geojsonseq,
                postgis,
                output: path_prompt("Output CSV", DEFAULT_DIM_FIT)?,
                table,
                srid: urban_batch_footprint::source::DEFAULT_SRID,
                page_size: urban_batch_footprint::source::DEFAULT_PAGE_SIZE,
                workers: Some(workers_prompt()?),
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            };
            commands::dim_fit(&args, multi)?;
        }
    }

    Ok(())
}
