//! Visualization schema validator
//!
//! Final gate before data reaches presentation. Checks the exact column
//! set and that every cell is coercible to its column type. Values are
//! never repaired or rewritten.

use csv::StringRecord;
use tracing::debug;

use crate::domain::error::{SchemaError, Stage};
use crate::domain::table::{Cell, ColumnKind, ColumnSpec};
use crate::domain::types::EnrichedGpsPoint;

/// Columns required by map and table consumers
pub const VISUALIZATION_SCHEMA: [ColumnSpec; 11] = [
    ColumnSpec::required("route_id", ColumnKind::Text),
    ColumnSpec::required("lat", ColumnKind::Float),
    ColumnSpec::required("lon", ColumnKind::Float),
    ColumnSpec::required("datetime", ColumnKind::Timestamp),
    ColumnSpec::required("unixtime", ColumnKind::Integer),
    ColumnSpec::required("cluster_id", ColumnKind::Integer),
    ColumnSpec::nullable("lat_centroid", ColumnKind::Float),
    ColumnSpec::nullable("lon_centroid", ColumnKind::Float),
    ColumnSpec::nullable("service_start_time", ColumnKind::Timestamp),
    ColumnSpec::nullable("service_end_time", ColumnKind::Timestamp),
    ColumnSpec::nullable("service_duration", ColumnKind::Float),
];

/// Match `headers` against `schema` exactly.
///
/// Returns, for each schema column, its position in `headers`.
pub fn check_columns<S: AsRef<str>>(
    stage: Stage,
    headers: &[S],
    schema: &[ColumnSpec],
) -> Result<Vec<usize>, SchemaError> {
    let mut positions = Vec::with_capacity(schema.len());
    let mut missing = Vec::new();
    for spec in schema {
        match headers.iter().position(|h| h.as_ref() == spec.name) {
            Some(pos) => positions.push(pos),
            None => missing.push(spec.name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns { stage, columns: missing });
    }

    // Anything not claimed above is extra, including repeated names
    let unexpected: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !positions.contains(i))
        .map(|(_, h)| h.as_ref().to_string())
        .collect();
    if !unexpected.is_empty() {
        return Err(SchemaError::UnexpectedColumns { stage, columns: unexpected });
    }

    Ok(positions)
}

/// Check one row of cells, given in schema order
fn check_row(row: usize, cells: &[Cell<'_>], schema: &[ColumnSpec]) -> Result<(), SchemaError> {
    for (spec, cell) in schema.iter().zip(cells) {
        if cell.is_null() {
            if spec.nullable {
                continue;
            }
            return Err(SchemaError::invalid(Stage::Visualization, row, spec.name, "", "null value"));
        }
        if let Err(reason) = cell.coercible_to(spec.kind) {
            return Err(SchemaError::invalid(Stage::Visualization, row, spec.name, cell, reason));
        }
    }

    // Stop aggregates come from one join match: all present or all absent
    let nullable: Vec<(&ColumnSpec, &Cell<'_>)> =
        schema.iter().zip(cells).filter(|(spec, _)| spec.nullable).collect();
    let nulls = nullable.iter().filter(|(_, c)| c.is_null()).count();
    if nulls != 0 && nulls != nullable.len() {
        if let Some((spec, _)) = nullable.iter().find(|(_, c)| c.is_null()) {
            return Err(SchemaError::invalid(
                Stage::Visualization,
                row,
                spec.name,
                "",
                "partial stop aggregates",
            ));
        }
    }
    Ok(())
}

/// Attached aggregates must describe the point's own stop
fn check_stop(row: usize, point: &EnrichedGpsPoint) -> Result<(), SchemaError> {
    let Some(stop) = &point.stop else {
        return Ok(());
    };
    if point.point.is_noise() {
        return Err(SchemaError::invalid(
            Stage::Visualization,
            row,
            "cluster_id",
            point.point.cluster_id,
            "noise point carries stop aggregates",
        ));
    }
    if stop.key() != point.point.key() {
        return Err(SchemaError::invalid(
            Stage::Visualization,
            row,
            "cluster_id",
            format!("{}/{}", stop.route_id, stop.cluster_id),
            "stop aggregates belong to another cluster",
        ));
    }
    Ok(())
}

/// Validate enriched points before they leave the pipeline.
///
/// The column set is fixed by `EnrichedGpsPoint::cells`; each row is checked
/// for coercibility and for aggregates that match its own `(route_id, cluster_id)`.
/// Returns the input unchanged on success.
pub fn validate_visualization_schema(
    points: Vec<EnrichedGpsPoint>,
) -> Result<Vec<EnrichedGpsPoint>, SchemaError> {
    for (row, point) in points.iter().enumerate() {
        check_row(row, &point.cells(), &VISUALIZATION_SCHEMA)?;
        check_stop(row, point)?;
    }
    debug!(rows = %points.len(), "visualization_schema_valid");
    Ok(points)
}

/// Validate a textual table (e.g. an exported points CSV read back).
///
/// Columns may appear in any order; blank cells are nulls.
/// Returns the schema-column positions within `headers`.
pub fn validate_table(headers: &StringRecord, rows: &[StringRecord]) -> Result<Vec<usize>, SchemaError> {
    let names: Vec<&str> = headers.iter().map(str::trim).collect();
    let positions = check_columns(Stage::Visualization, &names, &VISUALIZATION_SCHEMA)?;

    for (row, record) in rows.iter().enumerate() {
        let cells: Vec<Cell<'_>> =
            positions.iter().map(|&pos| Cell::from_text(record.get(pos).unwrap_or(""))).collect();
        check_row(row, &cells, &VISUALIZATION_SCHEMA)?;
    }
    debug!(rows = %rows.len(), "table_schema_valid");
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ClusterId, GpsPoint, StopCluster};

    fn enriched(cluster: i64, with_stop: bool) -> EnrichedGpsPoint {
        let point = GpsPoint::new("A", 10.0, 20.0, "2023-01-05 10:00:00", 1000).labeled(ClusterId(cluster));
        let stop = with_stop.then(|| StopCluster {
            route_id: "A".to_string(),
            cluster_id: ClusterId(cluster),
            lat_centroid: 10.1,
            lon_centroid: 20.1,
            service_start_time: "2023-01-05 10:00:00".to_string(),
            service_end_time: "2023-01-05 10:05:00".to_string(),
            service_duration: 300,
        });
        EnrichedGpsPoint { point, stop }
    }

    fn header() -> StringRecord {
        StringRecord::from(EnrichedGpsPoint::COLUMNS.to_vec())
    }

    #[test]
    fn test_valid_points_pass_through_unchanged() {
        let points = vec![enriched(0, true), enriched(-1, false)];

        let validated = validate_visualization_schema(points.clone()).unwrap();

        assert_eq!(validated, points);
    }

    #[test]
    fn test_nan_coordinate_rejected() {
        let mut point = enriched(0, true);
        point.point.point.lon = f64::NAN;

        let err = validate_visualization_schema(vec![point]).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { ref column, .. } if column == "lon"));
    }

    #[test]
    fn test_unparseable_datetime_rejected() {
        let mut point = enriched(-1, false);
        point.point.point.datetime = "teatime".to_string();

        let err = validate_visualization_schema(vec![point]).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { ref column, .. } if column == "datetime"));
    }

    #[test]
    fn test_stop_from_another_cluster_rejected() {
        let mut point = enriched(0, true);
        if let Some(stop) = point.stop.as_mut() {
            stop.cluster_id = ClusterId(1);
        }

        let err = validate_visualization_schema(vec![enriched(-1, false), point]).unwrap_err();

        assert!(matches!(
            err,
            SchemaError::InvalidValue { row: 1, ref column, ref value, .. }
                if column == "cluster_id" && value == "A/1"
        ));
    }

    #[test]
    fn test_stop_from_another_route_rejected() {
        let mut point = enriched(0, true);
        if let Some(stop) = point.stop.as_mut() {
            stop.route_id = "B".to_string();
        }

        let err = validate_visualization_schema(vec![point]).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { ref reason, .. } if reason.contains("another cluster")));
    }

    #[test]
    fn test_noise_point_with_stop_rejected() {
        let err = validate_visualization_schema(vec![enriched(-1, true)]).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { ref column, .. } if column == "cluster_id"));
    }

    #[test]
    fn test_check_columns_reports_missing_and_extra() {
        let err = check_columns(Stage::Visualization, &["route_id", "lat"], &VISUALIZATION_SCHEMA)
            .unwrap_err();
        let SchemaError::MissingColumns { columns, .. } = err else {
            panic!("Expected MissingColumns");
        };
        assert_eq!(columns.len(), 9);
        assert!(columns.contains(&"unixtime".to_string()));

        let mut headers = EnrichedGpsPoint::COLUMNS.to_vec();
        headers.push("speed");
        let err = check_columns(Stage::Visualization, &headers, &VISUALIZATION_SCHEMA).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnexpectedColumns { stage: Stage::Visualization, columns: vec!["speed".to_string()] }
        );
    }

    #[test]
    fn test_table_blank_aggregates_are_nulls() {
        let rows = vec![
            StringRecord::from(vec![
                "A", "10", "20", "2023-01-05 10:00:00", "1000", "0", "10.1", "20.1",
                "2023-01-05 10:00:00", "2023-01-05 10:05:00", "300",
            ]),
            StringRecord::from(vec![
                "A", "50", "60", "2023-01-05 11:00:00", "4000", "-1.0", "", "", "", "", "",
            ]),
        ];

        let positions = validate_table(&header(), &rows).unwrap();

        assert_eq!(positions, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn test_table_partial_aggregates_rejected() {
        let rows = vec![StringRecord::from(vec![
            "A", "50", "60", "2023-01-05 11:00:00", "4000", "2", "50", "", "", "", "",
        ])];

        let err = validate_table(&header(), &rows).unwrap_err();

        assert!(matches!(
            err,
            SchemaError::InvalidValue { ref reason, .. } if reason == "partial stop aggregates"
        ));
    }

    #[test]
    fn test_table_non_integer_cluster_rejected() {
        let rows = vec![StringRecord::from(vec![
            "A", "50", "60", "2023-01-05 11:00:00", "4000", "x", "", "", "", "", "",
        ])];

        let err = validate_table(&header(), &rows).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { ref column, .. } if column == "cluster_id"));
    }
}
