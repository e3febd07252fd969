//! Shapes a parsed [`Table`] into chart-ready series.
//!
//! Everything here is pure: the same table and configuration always yield
//! the same output, so handlers can call it without touching shared state.

use crate::services::spreadsheet::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

const PALETTE: [(u8, u8, u8); 10] = [
    (255, 99, 132),
    (54, 162, 235),
    (255, 206, 86),
    (75, 192, 192),
    (153, 102, 255),
    (255, 159, 64),
    (199, 199, 199),
    (83, 102, 255),
    (255, 140, 184),
    (100, 255, 218),
];

/// Label used for rows whose group cell is blank.
pub const BLANK_LABEL: &str = "(blank)";

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Chart type '{0}' needs a zAxis column")]
    MissingZAxis(&'static str),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Aggregation {
    #[default]
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "avg", alias = "average")]
    Average,
    #[serde(rename = "count")]
    Count,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Average => "avg",
            Aggregation::Count => "count",
        }
    }
}

impl FromStr for Aggregation {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Aggregation::Sum),
            "avg" | "average" => Ok(Aggregation::Average),
            "count" => Ok(Aggregation::Count),
            other => Err(ChartError::UnknownVariant {
                kind: "aggregation",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "pie")]
    Pie,
    #[serde(rename = "doughnut")]
    Doughnut,
    #[serde(rename = "radar")]
    Radar,
    #[serde(rename = "scatter")]
    Scatter,
    #[serde(rename = "3dscatter")]
    Scatter3d,
    #[serde(rename = "3dsurface")]
    Surface3d,
    #[serde(rename = "3dmesh")]
    Mesh3d,
    #[serde(rename = "3dbar")]
    Bar3d,
}

impl ChartType {
    pub const ALL: [ChartType; 10] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Doughnut,
        ChartType::Radar,
        ChartType::Scatter,
        ChartType::Scatter3d,
        ChartType::Surface3d,
        ChartType::Mesh3d,
        ChartType::Bar3d,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Doughnut => "doughnut",
            ChartType::Radar => "radar",
            ChartType::Scatter => "scatter",
            ChartType::Scatter3d => "3dscatter",
            ChartType::Surface3d => "3dsurface",
            ChartType::Mesh3d => "3dmesh",
            ChartType::Bar3d => "3dbar",
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(
            self,
            ChartType::Scatter3d | ChartType::Surface3d | ChartType::Mesh3d | ChartType::Bar3d
        )
    }
}

impl FromStr for ChartType {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ChartError::UnknownVariant {
                kind: "chart type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default)]
    pub z_axis: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl ChartConfig {
    /// Checks every referenced column against `headers`.
    pub fn validate(&self, headers: &[String]) -> Result<(), ChartError> {
        if self.chart_type.is_3d() && self.z_axis.is_none() {
            return Err(ChartError::MissingZAxis(self.chart_type.as_str()));
        }

        let columns = [Some(&self.x_axis), Some(&self.y_axis), self.z_axis.as_ref(), self.group_by.as_ref()];
        for column in columns.into_iter().flatten() {
            if !headers.iter().any(|h| h == column) {
                return Err(ChartError::UnknownColumn(column.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: Vec<String>,
    pub border_color: Vec<String>,
    pub border_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series {
    Numbers(Vec<Option<f64>>),
    Labels(Vec<String>),
    Matrix(Vec<Vec<Option<f64>>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChartData {
    Categorical {
        #[serde(rename = "chartType")]
        chart_type: ChartType,
        labels: Vec<String>,
        datasets: Vec<Dataset>,
    },
    Spatial {
        #[serde(rename = "chartType")]
        chart_type: ChartType,
        x: Series,
        y: Series,
        z: Series,
    },
}

fn column(table: &Table, name: &str) -> Result<usize, ChartError> {
    table
        .column_index(name)
        .ok_or_else(|| ChartError::UnknownColumn(name.to_string()))
}

/// Groups rows by `group_col` and folds `value_col` with `aggregation`.
/// Groups keep the order in which they first appear; non-numeric values
/// count as zero.
pub fn group_and_aggregate(
    table: &Table,
    group_col: &str,
    value_col: &str,
    aggregation: Aggregation,
) -> Result<Vec<DataPoint>, ChartError> {
    let group_idx = column(table, group_col)?;
    let value_idx = column(table, value_col)?;

    let mut order: Vec<(String, f64, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in &table.rows {
        let group_cell = table.cell(row, group_idx);
        let label = if group_cell.is_empty() {
            BLANK_LABEL.to_string()
        } else {
            group_cell.to_string()
        };
        let value = table.cell(row, value_idx).as_number().unwrap_or(0.0);

        let position = *positions.entry(label.clone()).or_insert_with(|| {
            order.push((label, 0.0, 0));
            order.len() - 1
        });
        let entry = &mut order[position];
        entry.1 += value;
        entry.2 += 1;
    }

    Ok(order
        .into_iter()
        .map(|(label, sum, count)| DataPoint {
            label,
            value: match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Average => sum / count as f64,
                Aggregation::Count => count as f64,
            },
        })
        .collect())
}

fn colours(len: usize, alpha: f32) -> Vec<String> {
    (0..len)
        .map(|i| {
            let (r, g, b) = PALETTE[i % PALETTE.len()];
            format!("rgba({}, {}, {}, {})", r, g, b, alpha)
        })
        .collect()
}

pub fn build_chart(table: &Table, config: &ChartConfig) -> Result<ChartData, ChartError> {
    config.validate(&table.headers)?;

    if config.chart_type.is_3d() {
        return build_spatial(table, config);
    }

    let points = match &config.group_by {
        Some(group_by) => group_and_aggregate(table, group_by, &config.y_axis, config.aggregation)?,
        None => {
            let x = column(table, &config.x_axis)?;
            let y = column(table, &config.y_axis)?;
            table
                .rows
                .iter()
                .map(|row| DataPoint {
                    label: table.cell(row, x).to_string(),
                    value: table.cell(row, y).as_number().unwrap_or(0.0),
                })
                .collect()
        }
    };

    let (labels, data): (Vec<String>, Vec<f64>) =
        points.into_iter().map(|p| (p.label, p.value)).unzip();

    let dataset = Dataset {
        label: format!("{} vs {}", config.y_axis, config.x_axis),
        background_color: colours(data.len(), 0.6),
        border_color: colours(data.len(), 1.0),
        border_width: 1,
        data,
    };

    Ok(ChartData::Categorical {
        chart_type: config.chart_type,
        labels,
        datasets: vec![dataset],
    })
}

fn build_spatial(table: &Table, config: &ChartConfig) -> Result<ChartData, ChartError> {
    let z_axis = config
        .z_axis
        .as_deref()
        .ok_or(ChartError::MissingZAxis(config.chart_type.as_str()))?;
    let x = column(table, &config.x_axis)?;
    let y = column(table, &config.y_axis)?;
    let z = column(table, z_axis)?;

    let numbers = |idx: usize| -> Vec<Option<f64>> {
        table
            .rows
            .iter()
            .map(|row| table.cell(row, idx).as_number())
            .collect()
    };
    let labels = |idx: usize| -> Vec<String> {
        table
            .rows
            .iter()
            .map(|row| table.cell(row, idx).to_string())
            .collect()
    };

    let (x_series, y_series, z_series) = match config.chart_type {
        ChartType::Bar3d => (
            Series::Labels(labels(x)),
            Series::Labels(labels(y)),
            Series::Numbers(numbers(z)),
        ),
        ChartType::Surface3d => (
            Series::Numbers(numbers(x)),
            Series::Numbers(numbers(y)),
            Series::Matrix(vec![numbers(z)]),
        ),
        _ => (
            Series::Numbers(numbers(x)),
            Series::Numbers(numbers(y)),
            Series::Numbers(numbers(z)),
        ),
    };

    Ok(ChartData::Spatial {
        chart_type: config.chart_type,
        x: x_series,
        y: y_series,
        z: z_series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spreadsheet::{CellValue, parse_csv};
    use serde_json::json;

    fn sales() -> Table {
        Table {
            headers: vec!["Product".into(), "Revenue".into()],
            rows: vec![
                vec![CellValue::Text("A".into()), CellValue::Number(10.0)],
                vec![CellValue::Text("B".into()), CellValue::Number(20.0)],
            ],
        }
    }

    fn config(chart_type: ChartType) -> ChartConfig {
        ChartConfig {
            chart_type,
            x_axis: "Product".into(),
            y_axis: "Revenue".into(),
            z_axis: None,
            group_by: None,
            aggregation: Aggregation::Sum,
        }
    }

    #[test]
    fn test_group_sum_example() {
        let points = group_and_aggregate(&sales(), "Product", "Revenue", Aggregation::Sum).unwrap();
        assert_eq!(
            points,
            vec![
                DataPoint { label: "A".into(), value: 10.0 },
                DataPoint { label: "B".into(), value: 20.0 },
            ]
        );
    }

    #[test]
    fn test_avg_and_count_keep_first_seen_order() {
        let table = parse_csv(b"Region,Sales\nWest,10\nEast,4\nWest,20\nEast,oops\n,3\n").unwrap();

        let avg = group_and_aggregate(&table, "Region", "Sales", Aggregation::Average).unwrap();
        assert_eq!(avg[0], DataPoint { label: "West".into(), value: 15.0 });
        assert_eq!(avg[1], DataPoint { label: "East".into(), value: 2.0 });
        assert_eq!(avg[2].label, BLANK_LABEL);

        let count = group_and_aggregate(&table, "Region", "Sales", Aggregation::Count).unwrap();
        let values: Vec<f64> = count.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_unknown_column() {
        let err = group_and_aggregate(&sales(), "Nope", "Revenue", Aggregation::Sum).unwrap_err();
        assert_eq!(err, ChartError::UnknownColumn("Nope".into()));
    }

    #[test]
    fn test_bar_chart_dataset() {
        let chart = build_chart(&sales(), &config(ChartType::Bar)).unwrap();
        let value = serde_json::to_value(&chart).unwrap();

        assert_eq!(value["kind"], "categorical");
        assert_eq!(value["chartType"], "bar");
        assert_eq!(value["labels"], json!(["A", "B"]));
        let dataset = &value["datasets"][0];
        assert_eq!(dataset["label"], "Revenue vs Product");
        assert_eq!(dataset["data"], json!([10.0, 20.0]));
        assert_eq!(dataset["backgroundColor"][0], "rgba(255, 99, 132, 0.6)");
        assert_eq!(dataset["borderColor"][1], "rgba(54, 162, 235, 1)");
        assert_eq!(dataset["borderWidth"], 1);
    }

    #[test]
    fn test_grouped_line_chart() {
        let table = parse_csv(b"Month,Region,Sales\nJan,West,1\nFeb,West,2\nJan,East,5\n").unwrap();
        let chart = build_chart(
            &table,
            &ChartConfig {
                group_by: Some("Region".into()),
                ..ChartConfig {
                    x_axis: "Region".into(),
                    y_axis: "Sales".into(),
                    ..config(ChartType::Line)
                }
            },
        )
        .unwrap();

        match chart {
            ChartData::Categorical { labels, datasets, .. } => {
                assert_eq!(labels, vec!["West", "East"]);
                assert_eq!(datasets[0].data, vec![3.0, 5.0]);
            }
            other => panic!("unexpected chart {:?}", other),
        }
    }

    #[test]
    fn test_grouped_chart_checks_x_axis() {
        let cfg = ChartConfig {
            x_axis: "NoSuchColumn".into(),
            group_by: Some("Product".into()),
            ..config(ChartType::Bar)
        };
        assert_eq!(
            build_chart(&sales(), &cfg).unwrap_err(),
            ChartError::UnknownColumn("NoSuchColumn".into())
        );
    }

    #[test]
    fn test_3d_charts() {
        let table = parse_csv(b"X,Y,Z\n1,2,3\na,5,6\n").unwrap();
        let mut cfg = ChartConfig {
            x_axis: "X".into(),
            y_axis: "Y".into(),
            z_axis: Some("Z".into()),
            ..config(ChartType::Surface3d)
        };

        let surface = serde_json::to_value(build_chart(&table, &cfg).unwrap()).unwrap();
        assert_eq!(surface["kind"], "spatial");
        assert_eq!(surface["x"], json!([1.0, null]));
        assert_eq!(surface["z"], json!([[3.0, 6.0]]));

        cfg.chart_type = ChartType::Bar3d;
        let bars = serde_json::to_value(build_chart(&table, &cfg).unwrap()).unwrap();
        assert_eq!(bars["x"], json!(["1", "a"]));
        assert_eq!(bars["z"], json!([3.0, 6.0]));

        cfg.z_axis = None;
        assert_eq!(
            build_chart(&table, &cfg).unwrap_err(),
            ChartError::MissingZAxis("3dbar")
        );
    }

    #[test]
    fn test_config_wire_format() {
        let cfg: ChartConfig = serde_json::from_value(json!({
            "chartType": "3dmesh",
            "xAxis": "X",
            "yAxis": "Y",
            "zAxis": "Z",
            "aggregation": "average"
        }))
        .unwrap();
        assert_eq!(cfg.chart_type, ChartType::Mesh3d);
        assert_eq!(cfg.aggregation, Aggregation::Average);
        assert!(cfg.group_by.is_none());

        assert!(cfg.validate(&["X".into(), "Y".into(), "Z".into()]).is_ok());
        assert_eq!(
            cfg.validate(&["X".into(), "Y".into()]).unwrap_err(),
            ChartError::UnknownColumn("Z".into())
        );
    }

    #[test]
    fn test_names_round_trip_through_strings() {
        for chart_type in ChartType::ALL {
            assert_eq!(chart_type.as_str().parse::<ChartType>().unwrap(), chart_type);
        }
        assert_eq!("avg".parse::<Aggregation>().unwrap(), Aggregation::Average);
        assert!("median".parse::<Aggregation>().is_err());
    }
}
