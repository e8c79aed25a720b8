//! Parcel polygon sources for the rectangle-fit run.
//!
//! Two sources are supported: a newline-delimited GeoJSON file (one
//! feature per line) and a `PostGIS` table read through a server-side
//! portal so the whole table never sits in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use geo::{MultiPolygon, Polygon};
use geojson::{Feature, GeoJson};
use urban_batch_models::PolygonRecord;

use crate::FootprintError;

/// Default `PostGIS` table of buildable areas.
pub const DEFAULT_TABLE: &str = "diss.buildable_areas";

/// Default output SRID (UTM zone 11N, meters).
pub const DEFAULT_SRID: i32 = 26911;

/// Default rows fetched per portal page.
pub const DEFAULT_PAGE_SIZE: i32 = 5000;

/// Default connection string when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/postgres";

/// Callback receiving each record as it is read.
pub type Emit<'a> = dyn FnMut(PolygonRecord) -> Result<(), FootprintError> + 'a;

/// A stream of parcel polygons.
pub trait PolygonSource: Send {
    /// Number of records [`Self::stream`] will emit, when known up front.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be inspected.
    fn total(&mut self) -> Result<Option<u64>, FootprintError>;

    /// Reads every record in source order, handing each to `emit`.
    ///
    /// Stops at the first error from reading or from `emit`.
    ///
    /// # Errors
    ///
    /// Returns read, parse, or `emit` errors.
    fn stream(self, emit: &mut Emit<'_>) -> Result<(), FootprintError>
    where
        Self: Sized;
}

/// Newline-delimited GeoJSON features with `gid` and `apn` properties.
///
/// Blank lines and RFC 8142 record separators are skipped.
pub struct GeoJsonSeqSource<R> {
    reader: R,
    total: Option<u64>,
}

impl GeoJsonSeqSource<BufReader<File>> {
    /// Opens a file, counting its records up front for progress.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn open(path: &Path) -> Result<Self, FootprintError> {
        let total = count_records(BufReader::new(File::open(path)?))?;
        log::info!("{total} polygon records in {}", path.display());
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            total: Some(total),
        })
    }
}

impl<R: BufRead> GeoJsonSeqSource<R> {
    /// Wraps a reader. The record count is unknown.
    pub const fn from_reader(reader: R) -> Self {
        Self {
            reader,
            total: None,
        }
    }
}

impl<R: BufRead + Send> PolygonSource for GeoJsonSeqSource<R> {
    fn total(&mut self) -> Result<Option<u64>, FootprintError> {
        Ok(self.total)
    }

    fn stream(mut self, emit: &mut Emit<'_>) -> Result<(), FootprintError> {
        let mut line = String::new();
        let mut line_no = 0_u64;
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            let text = trim_record(&line);
            if text.is_empty() {
                continue;
            }
            emit(parse_feature_line(text, line_no)?)?;
        }
        Ok(())
    }
}

fn trim_record(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || c == '\u{1e}')
}

fn count_records(reader: impl Read) -> Result<u64, FootprintError> {
    let mut count = 0;
    for line in BufReader::new(reader).lines() {
        if !trim_record(&line?).is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Parses one GeoJSON feature line into a record.
///
/// # Errors
///
/// Returns [`FootprintError::InvalidRecord`] if the line is not a feature
/// or lacks an integer `gid`, and a geometry error for geometry other
/// than `Polygon`/`MultiPolygon`/null.
pub fn parse_feature_line(text: &str, line: u64) -> Result<PolygonRecord, FootprintError> {
    let invalid = |message: &str| FootprintError::InvalidRecord {
        position: line,
        message: message.to_string(),
    };

    let GeoJson::Feature(feature) = text.parse::<GeoJson>()? else {
        return Err(invalid("expected a GeoJSON Feature"));
    };

    let gid = feature_gid(&feature).ok_or_else(|| invalid("missing or non-integer 'gid'"))?;
    let apn = match feature.property("apn") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let geometry = feature.geometry.map(to_multipolygon).transpose()?;

    Ok(PolygonRecord { gid, apn, geometry })
}

fn feature_gid(feature: &Feature) -> Option<i64> {
    match feature.property("gid")? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Converts a GeoJSON polygon or multipolygon into a multipolygon.
///
/// # Errors
///
/// Returns [`FootprintError::UnsupportedGeometry`] for any other type.
pub fn to_multipolygon(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>, FootprintError> {
    match geometry.value {
        value @ geojson::Value::Polygon(_) => Ok(MultiPolygon(vec![Polygon::try_from(value)?])),
        value @ geojson::Value::MultiPolygon(_) => Ok(MultiPolygon::try_from(value)?),
        other => Err(FootprintError::UnsupportedGeometry(
            geometry_kind(&other).to_string(),
        )),
    }
}

const fn geometry_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Connection and query settings for [`PostgisSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgisOptions {
    pub database_url: String,
    /// Schema-qualified table with `gid`, `apn`, and `geog` columns.
    pub table: String,
    /// SRID geometries are transformed into before fitting.
    pub srid: i32,
    pub page_size: i32,
}

impl PostgisOptions {
    /// Defaults with the connection string taken from `DATABASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            ..Self::default()
        }
    }
}

impl Default for PostgisOptions {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            table: DEFAULT_TABLE.to_string(),
            srid: DEFAULT_SRID,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Buildable-area polygons from a `PostGIS` table.
pub struct PostgisSource {
    options: PostgisOptions,
}

impl PostgisSource {
    /// Validates the options. No connection is made until first use.
    ///
    /// # Errors
    ///
    /// Returns [`FootprintError::InvalidTable`] if the table name is not a
    /// plain (optionally schema-qualified) identifier, or
    /// [`FootprintError::InvalidPageSize`] for a non-positive page size.
    pub fn new(options: PostgisOptions) -> Result<Self, FootprintError> {
        if !is_table_name(&options.table) {
            return Err(FootprintError::InvalidTable(options.table));
        }
        if options.page_size <= 0 {
            return Err(FootprintError::InvalidPageSize(options.page_size));
        }
        Ok(Self { options })
    }

    fn connect(&self) -> Result<postgres::Client, FootprintError> {
        log::debug!("Connecting to PostGIS for table {}", self.options.table);
        Ok(postgres::Client::connect(
            &self.options.database_url,
            postgres::NoTls,
        )?)
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT gid::bigint, apn::text, ST_AsGeoJSON(ST_Transform(geog::geometry, {})) FROM {}",
            self.options.srid, self.options.table
        )
    }
}

impl PolygonSource for PostgisSource {
    fn total(&mut self) -> Result<Option<u64>, FootprintError> {
        let mut client = self.connect()?;
        let sql = format!("SELECT count(*) FROM {}", self.options.table);
        let count: i64 = client.query_one(sql.as_str(), &[])?.try_get(0)?;
        Ok(u64::try_from(count).ok())
    }

    fn stream(self, emit: &mut Emit<'_>) -> Result<(), FootprintError> {
        let mut client = self.connect()?;
        let mut transaction = client.transaction()?;
        let sql = self.select_sql();
        let portal = transaction.bind(sql.as_str(), &[])?;

        let mut position = 0_u64;
        loop {
            let rows = transaction.query_portal(&portal, self.options.page_size)?;
            if rows.is_empty() {
                break;
            }
            log::trace!("Fetched {} rows from {}", rows.len(), self.options.table);

            for row in rows {
                position += 1;
                let gid: i64 = row.try_get(0)?;
                let apn: Option<String> = row.try_get(1)?;
                let geojson: Option<String> = row.try_get(2)?;

                let geometry = match geojson {
                    Some(text) => match text.parse::<GeoJson>()? {
                        GeoJson::Geometry(geometry) => Some(to_multipolygon(geometry)?),
                        _ => {
                            return Err(FootprintError::InvalidRecord {
                                position,
                                message: "ST_AsGeoJSON did not return a geometry".to_string(),
                            });
                        }
                    },
                    None => None,
                };

                emit(PolygonRecord {
                    gid,
                    apn: apn.unwrap_or_default(),
                    geometry,
                })?;
            }
        }

        transaction.commit()?;
        log::info!("Read {position} rows from {}", self.options.table);
        Ok(())
    }
}

fn is_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            part.chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = concat!(
        r#"{"type":"Feature","properties":{"gid":1,"apn":"5550-001-002"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[20,0],[20,15],[0,15],[0,0]]]}}"#,
        "\n\n",
        "\u{1e}",
        r#"{"type":"Feature","properties":{"gid":"2","apn":null},"geometry":null}"#,
        "\n",
        r#"{"type":"Feature","properties":{"gid":3,"apn":77},"geometry":{"type":"MultiPolygon","coordinates":[[[[0,0],[5,0],[5,5],[0,0]]],[[[10,10],[12,10],[12,12],[10,10]]]]}}"#,
        "\n",
    );

    fn collect<S: PolygonSource>(source: S) -> Result<Vec<PolygonRecord>, FootprintError> {
        let mut records = Vec::new();
        source.stream(&mut |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    #[test]
    fn reads_feature_lines() {
        let records = collect(GeoJsonSeqSource::from_reader(LINES.as_bytes())).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!((records[0].gid, records[0].apn.as_str()), (1, "5550-001-002"));
        assert_eq!(records[0].geometry.as_ref().unwrap().0.len(), 1);

        assert_eq!((records[1].gid, records[1].apn.as_str()), (2, ""));
        assert!(records[1].geometry.is_none());

        assert_eq!((records[2].gid, records[2].apn.as_str()), (3, "77"));
        assert_eq!(records[2].geometry.as_ref().unwrap().0.len(), 2);
    }

    #[test]
    fn counts_non_blank_lines() {
        assert_eq!(count_records(LINES.as_bytes()).unwrap(), 3);
    }

    #[test]
    fn missing_gid_reports_line() {
        let text = r#"{"type":"Feature","properties":{"apn":"x"},"geometry":null}"#;
        let result = parse_feature_line(text, 42);
        assert!(matches!(
            result,
            Err(FootprintError::InvalidRecord { position: 42, .. })
        ));
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let text =
            r#"{"type":"Feature","properties":{"gid":1},"geometry":{"type":"Point","coordinates":[1,2]}}"#;
        assert!(matches!(
            parse_feature_line(text, 1),
            Err(FootprintError::UnsupportedGeometry(kind)) if kind == "Point"
        ));
    }

    #[test]
    fn emit_errors_stop_the_stream() {
        let mut seen = 0;
        let result = GeoJsonSeqSource::from_reader(LINES.as_bytes()).stream(&mut |_| {
            seen += 1;
            Err(FootprintError::InvalidPageSize(0))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn validates_table_names() {
        assert!(is_table_name("diss.buildable_areas"));
        assert!(is_table_name("parcels"));
        assert!(!is_table_name("diss.buildable_areas; DROP TABLE x"));
        assert!(!is_table_name("a.b.c"));
        assert!(!is_table_name("1abc"));
        assert!(PostgisSource::new(PostgisOptions::default()).is_ok());
        assert!(matches!(
            PostgisSource::new(PostgisOptions {
                table: "bad name".to_string(),
                ..PostgisOptions::default()
            }),
            Err(FootprintError::InvalidTable(_))
        ));
    }
}
