//! Downloadable reports of a user's visits
//!
//! A report is first built as a table of typed cells, then rendered into
//! one of the export formats.

use crate::db::repositories::{StatisticsRepository, VisitedCityRepository};
use crate::models::{ParseEnumError, RegionType};
use crate::services::city::VisitSort;
use crate::services::statistics::calculate_ratio;
use crate::services::ServiceResult;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportKind {
    #[default]
    City,
    Region,
    Area,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::City => "city",
            ReportKind::Region => "region",
            ReportKind::Area => "area",
        }
    }

    fn sheet_name(&self) -> &'static str {
        match self {
            ReportKind::City => "Города",
            ReportKind::Region => "Регионы",
            ReportKind::Area => "Округа",
        }
    }
}

impl FromStr for ReportKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "city" => Ok(ReportKind::City),
            "region" => Ok(ReportKind::Region),
            "area" => Ok(ReportKind::Area),
            _ => Err(ParseEnumError::new("report kind", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Txt,
    Csv,
    Xls,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Txt => "txt",
            ReportFormat::Csv => "csv",
            ReportFormat::Xls => "xls",
            ReportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Txt => "text/plain; charset=utf-8",
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Xls => "application/vnd.ms-excel",
            ReportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "txt" => Ok(ReportFormat::Txt),
            "csv" => Ok(ReportFormat::Csv),
            "xls" => Ok(ReportFormat::Xls),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ParseEnumError::new("report format", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// City report: order by region, then city
    pub group_city: bool,
    /// Region report: drop regions without visits
    pub only_visited: bool,
}

/// A rendered report ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Report {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(x) => format!("{:.1}", x),
        }
    }

    fn date(date: Option<NaiveDate>) -> Cell {
        Cell::Text(date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct Table {
    headers: &'static [&'static str],
    /// JSON object keys, parallel to `headers`
    keys: &'static [&'static str],
    rows: Vec<Vec<Cell>>,
}

const CITY_HEADERS: &[&str] = &[
    "Город",
    "Регион",
    "Первое посещение",
    "Посещений",
    "Средняя оценка",
    "Магнит",
];
const CITY_KEYS: &[&str] = &[
    "city",
    "region",
    "first_visit_date",
    "number_of_visits",
    "average_rating",
    "has_magnet",
];

const REGION_HEADERS: &[&str] = &["Регион", "Всего городов", "Посещено", "Процент"];
const REGION_KEYS: &[&str] = &["region", "total_cities", "visited_cities", "ratio"];

const AREA_HEADERS: &[&str] = &[
    "Федеральный округ",
    "Всего регионов",
    "Посещено регионов",
    "Всего городов",
    "Посещено городов",
    "Процент",
];
const AREA_KEYS: &[&str] = &[
    "area",
    "total_regions",
    "visited_regions",
    "total_cities",
    "visited_cities",
    "ratio",
];

pub struct ReportService {
    visits: Arc<dyn VisitedCityRepository>,
    stats: Arc<dyn StatisticsRepository>,
}

impl ReportService {
    pub fn new(visits: Arc<dyn VisitedCityRepository>, stats: Arc<dyn StatisticsRepository>) -> Self {
        Self { visits, stats }
    }

    pub async fn build(
        &self,
        user_id: i64,
        kind: ReportKind,
        format: ReportFormat,
        options: ReportOptions,
        today: NaiveDate,
    ) -> ServiceResult<Report> {
        let table = match kind {
            ReportKind::City => self.city_table(user_id, options).await?,
            ReportKind::Region => self.region_table(user_id, options).await?,
            ReportKind::Area => self.area_table(user_id).await?,
        };

        let body = match format {
            ReportFormat::Txt => render_txt(&table).into_bytes(),
            ReportFormat::Csv => render_csv(&table)?,
            ReportFormat::Xls => render_xls(&table, kind.sheet_name()).into_bytes(),
            ReportFormat::Json => render_json(&table)?,
        };
        tracing::debug!(user_id, kind = kind.as_str(), rows = table.rows.len(), "Report built");

        Ok(Report {
            filename: format!(
                "moi-goroda_{}_{}.{}",
                kind.as_str(),
                today.format("%Y-%m-%d"),
                format.extension()
            ),
            content_type: format.content_type(),
            body,
        })
    }

    async fn city_table(&self, user_id: i64, options: ReportOptions) -> ServiceResult<Table> {
        let order = if options.group_city {
            "t.region_title ASC, t.city_title ASC"
        } else {
            VisitSort::Default.sql()
        };
        let rows = self
            .visits
            .list_summaries(user_id, None, order)
            .await?
            .into_iter()
            .map(|s| {
                vec![
                    Cell::Text(s.city_title),
                    Cell::Text(s.region_title),
                    Cell::date(s.first_visit_date),
                    Cell::Int(s.number_of_visits),
                    Cell::Float(s.average_rating),
                    Cell::Text(if s.magnets > 0 { "да" } else { "нет" }.to_string()),
                ]
            })
            .collect();
        Ok(Table {
            headers: CITY_HEADERS,
            keys: CITY_KEYS,
            rows,
        })
    }

    async fn region_table(&self, user_id: i64, options: ReportOptions) -> ServiceResult<Table> {
        let filter = options.only_visited.then_some("t.visited_cities > 0");
        let rows = self
            .stats
            .region_progress(user_id, filter, "t.ratio_rank ASC, t.title ASC")
            .await?
            .into_iter()
            .map(|r| {
                let name = match r.region_type.parse::<RegionType>() {
                    Ok(kind) => crate::models::region_full_name(&r.title, kind),
                    Err(_) => r.title,
                };
                vec![
                    Cell::Text(name),
                    Cell::Int(r.total_cities),
                    Cell::Int(r.visited_cities),
                    Cell::Int(r.ratio),
                ]
            })
            .collect();
        Ok(Table {
            headers: REGION_HEADERS,
            keys: REGION_KEYS,
            rows,
        })
    }

    async fn area_table(&self, user_id: i64) -> ServiceResult<Table> {
        let rows = self
            .stats
            .area_progress(user_id)
            .await?
            .into_iter()
            .map(|a| {
                vec![
                    Cell::Text(a.title),
                    Cell::Int(a.total_regions),
                    Cell::Int(a.visited_regions),
                    Cell::Int(a.total_cities),
                    Cell::Int(a.visited_cities),
                    Cell::Int(calculate_ratio(a.visited_cities, a.total_cities)),
                ]
            })
            .collect();
        Ok(Table {
            headers: AREA_HEADERS,
            keys: AREA_KEYS,
            rows,
        })
    }
}

/// Column-aligned plain text with a header rule
fn render_txt(table: &Table) -> String {
    let rendered: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(Cell::render).collect())
        .collect();

    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &rendered {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&pad_line(table.headers.iter().copied(), &widths));
    out.push('\n');
    let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in &rendered {
        out.push_str(&pad_line(row.iter().map(String::as_str), &widths));
        out.push('\n');
    }
    out
}

fn pad_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

fn render_csv(table: &Table) -> ServiceResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(table.headers)
        .context("Failed to write report header")?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(Cell::render))
            .context("Failed to write report row")?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish CSV report: {}", e.error()).into())
}

/// SpreadsheetML 2003 workbook, opened by Excel and LibreOffice as `.xls`
fn render_xls(table: &Table, sheet: &str) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <?mso-application progid=\"Excel.Sheet\"?>\n\
         <Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
    );
    let _ = writeln!(out, " <Worksheet ss:Name=\"{}\">\n  <Table>", xml_escape(sheet));

    out.push_str("   <Row>");
    for header in table.headers {
        let _ = write!(out, "<Cell><Data ss:Type=\"String\">{}</Data></Cell>", xml_escape(header));
    }
    out.push_str("</Row>\n");

    for row in &table.rows {
        out.push_str("   <Row>");
        for cell in row {
            let kind = match cell {
                Cell::Text(_) => "String",
                Cell::Int(_) | Cell::Float(_) => "Number",
            };
            let _ = write!(
                out,
                "<Cell><Data ss:Type=\"{}\">{}</Data></Cell>",
                kind,
                xml_escape(&cell.render())
            );
        }
        out.push_str("</Row>\n");
    }

    out.push_str("  </Table>\n </Worksheet>\n</Workbook>\n");
    out
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn render_json(table: &Table) -> ServiceResult<Vec<u8>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = table
        .rows
        .iter()
        .map(|row| {
            table
                .keys
                .iter()
                .zip(row)
                .map(|(key, cell)| Ok((key.to_string(), serde_json::to_value(cell)?)))
                .collect::<Result<_, serde_json::Error>>()
        })
        .collect::<Result<_, _>>()
        .context("Failed to encode report row")?;
    Ok(serde_json::to_vec_pretty(&rows).context("Failed to encode JSON report")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, date};
    use crate::db::repositories::{SqlxStatisticsRepository, SqlxVisitedCityRepository};

    fn sample() -> Table {
        Table {
            headers: REGION_HEADERS,
            keys: REGION_KEYS,
            rows: vec![
                vec![
                    Cell::Text("Тверская область".into()),
                    Cell::Int(3),
                    Cell::Int(2),
                    Cell::Int(66),
                ],
                vec![Cell::Text("A & B".into()), Cell::Int(10), Cell::Int(0), Cell::Int(0)],
            ],
        }
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!("area".parse::<ReportKind>().unwrap(), ReportKind::Area);
        assert_eq!("xls".parse::<ReportFormat>().unwrap(), ReportFormat::Xls);
        assert!("pdf".parse::<ReportFormat>().is_err());
        assert!("country".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_txt_columns_align() {
        let text = render_txt(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].chars().all(|c| c == '-'));
        let column = |line: &str| line.chars().position(|c| c.is_ascii_digit());
        assert_eq!(column(lines[2]), Some(18));
        assert_eq!(column(lines[3]), Some(18));
        assert!(lines[2].starts_with("Тверская область  3"));
    }

    #[test]
    fn test_csv_quotes_and_header() {
        let csv = String::from_utf8(render_csv(&sample()).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Регион,Всего городов,Посещено,Процент"));
        assert_eq!(lines.next(), Some("Тверская область,3,2,66"));
        assert_eq!(lines.next(), Some("A & B,10,0,0"));
    }

    #[test]
    fn test_xls_is_escaped_spreadsheetml() {
        let xml = render_xls(&sample(), "Регионы");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Worksheet ss:Name=\"Регионы\">"));
        assert!(xml.contains("<Data ss:Type=\"String\">A &amp; B</Data>"));
        assert!(xml.contains("<Data ss:Type=\"Number\">66</Data>"));
        assert_eq!(xml.matches("<Row>").count(), 3);
    }

    #[test]
    fn test_json_uses_typed_values() {
        let json: serde_json::Value = serde_json::from_slice(&render_json(&sample()).unwrap()).unwrap();
        assert_eq!(json[0]["region"], "Тверская область");
        assert_eq!(json[0]["ratio"], 66);
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_build_reports_from_visits() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        fixtures::insert_visit(&pool, user, geo.cities[5], Some(date(2024, 5, 1)), 5).await;
        fixtures::insert_visit(&pool, user, geo.cities[1], Some(date(2023, 7, 9)), 4).await;
        fixtures::insert_visit(&pool, user, geo.cities[1], Some(date(2024, 7, 9)), 2).await;

        let service = ReportService::new(
            SqlxVisitedCityRepository::boxed(pool.clone()),
            SqlxStatisticsRepository::boxed(pool),
        );
        let today = date(2024, 9, 1);

        let report = service
            .build(
                user,
                ReportKind::City,
                ReportFormat::Csv,
                ReportOptions {
                    group_city: true,
                    ..Default::default()
                },
                today,
            )
            .await
            .unwrap();
        assert_eq!(report.filename, "moi-goroda_city_2024-09-01.csv");
        assert_eq!(report.content_type, "text/csv; charset=utf-8");
        let body = String::from_utf8(report.body).unwrap();
        let rows: Vec<&str> = body.lines().skip(1).collect();
        assert_eq!(rows, vec!["Казань,Татарстан,2024-05-01,1,5.0,нет", "Ржев,Тверская,2023-07-09,2,3.0,нет"]);

        let regions = service
            .build(
                user,
                ReportKind::Region,
                ReportFormat::Json,
                ReportOptions {
                    only_visited: true,
                    ..Default::default()
                },
                today,
            )
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&regions.body).unwrap();
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["region"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Татарстан область", "Тверская область"]);

        let areas = service
            .build(user, ReportKind::Area, ReportFormat::Xls, ReportOptions::default(), today)
            .await
            .unwrap();
        assert_eq!(areas.content_type, "application/vnd.ms-excel");
        assert_eq!(areas.content_disposition(), "attachment; filename=\"moi-goroda_area_2024-09-01.xls\"");
    }
}
