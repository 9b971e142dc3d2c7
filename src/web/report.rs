//! Report downloads

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

use super::{checked, PageContext, WebResult};
use crate::api::middleware::AppState;
use crate::services::{ReportFormat, ReportKind, ReportOptions, ServiceError};

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub kind: Option<String>,
    pub format: Option<String>,
    pub group_city: Option<String>,
    pub only_visited: Option<String>,
}

/// `GET /report/download?kind=city&format=csv`
pub async fn download(State(state): State<AppState>, page: PageContext, Query(query): Query<DownloadQuery>) -> WebResult {
    let user = page.require_user()?;
    let kind: ReportKind = query.kind.as_deref().unwrap_or("city").parse().map_err(ServiceError::from)?;
    let format: ReportFormat = query.format.as_deref().unwrap_or("txt").parse().map_err(ServiceError::from)?;
    let options = ReportOptions {
        group_city: checked(&query.group_city),
        only_visited: checked(&query.only_visited),
    };

    let report = state
        .report_service
        .build(user.id, kind, format, options, Utc::now().date_naive())
        .await?;
    tracing::info!(user_id = user.id, filename = %report.filename, "Report downloaded");

    let disposition = report.content_disposition();
    Ok((
        [
            (header::CONTENT_TYPE, report.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.body,
    )
        .into_response())
}
