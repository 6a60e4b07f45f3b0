use serde::Deserialize;

use crate::dto::ReportDto;

#[derive(Debug, Clone, Deserialize)]
pub struct MatchRequest {
    pub reports: Vec<ReportDto>,
    #[serde(default)]
    pub correct_early_birds: bool,
    #[serde(default)]
    pub with_arrivals: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArrivalsRequest {
    pub trip_id: String,
    #[serde(default)]
    pub offset: i64,
    pub reports: Vec<ReportDto>,
}
