use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Marker that identifies the credential column in a header row.
const EIN_HEADER: &str = "EIN";

/// A source of raw, free-text credential submissions.
#[rocket::async_trait]
pub trait SpreadsheetDataProvider: Send + Sync {
    /// Every submitted value in the sheet's credential column, top to bottom.
    async fn submissions(&self, sheet_id: &str) -> Result<Vec<String>>;
}

/// Reads submissions from a Google Sheet using the Sheets v4 REST API.
///
/// The first sheet of the spreadsheet is used, and the credential column is
/// the first one whose header mentions `EIN`.
pub struct GoogleSheets {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleSheets {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Spreadsheet(format!("Bad Sheets base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::Spreadsheet("Sheets base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    async fn sheet_info(&self, sheet_id: &str) -> Result<SheetInfo> {
        let url = self.url(&[sheet_id])?;
        let spreadsheet: Spreadsheet = self
            .client
            .get(url)
            .query(&[("key", &self.api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        spreadsheet
            .sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties)
            .ok_or_else(|| Error::Spreadsheet(format!("Spreadsheet {sheet_id} has no sheets")))
    }

    async fn values(&self, sheet_id: &str, range: &str, major_dimension: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&[sheet_id, "values", range])?;
        let range: ValueRange = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("majorDimension", major_dimension)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(range.values)
    }
}

#[rocket::async_trait]
impl SpreadsheetDataProvider for GoogleSheets {
    async fn submissions(&self, sheet_id: &str) -> Result<Vec<String>> {
        let info = self.sheet_info(sheet_id).await?;
        let grid = &info.grid_properties;
        debug!(
            "Sheet '{}' of {sheet_id} is {}x{}",
            info.title, grid.column_count, grid.row_count
        );
        if grid.column_count == 0 || grid.row_count < 2 {
            return Ok(Vec::new());
        }

        let header_range = a1_range(&info.title, 1, 1, grid.column_count, 1);
        let headers = self
            .values(sheet_id, &header_range, "ROWS")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let column = ein_column(&headers).ok_or_else(|| {
            Error::Spreadsheet(format!("No {EIN_HEADER} column in spreadsheet {sheet_id}"))
        })?;

        let range = a1_range(&info.title, column, 2, column, grid.row_count);
        let submissions = self
            .values(sheet_id, &range, "COLUMNS")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        info!("Read {} submissions from spreadsheet {sheet_id}", submissions.len());
        Ok(submissions)
    }
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetInfo {
    title: String,
    grid_properties: GridProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Absent when the range is empty.
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// 1-based column number of the first header mentioning `EIN`.
fn ein_column(headers: &[String]) -> Option<u32> {
    let index = headers.iter().position(|h| h.contains(EIN_HEADER))?;
    u32::try_from(index + 1).ok()
}

/// Spreadsheet column letters for a 1-based column number: `1 -> A`,
/// `26 -> Z`, `27 -> AA`. Zero has no letters.
pub fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        // rem < 26, so this is always an ASCII capital.
        letters.push(char::from(b'A' + rem as u8));
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// An A1-notation range on one sheet, e.g. `'Form Responses 1'!C2:C100`.
fn a1_range(sheet: &str, start_col: u32, start_row: u32, end_col: u32, end_row: u32) -> String {
    format!(
        "'{}'!{}{start_row}:{}{end_row}",
        sheet.replace('\'', "''"),
        column_letters(start_col),
        column_letters(end_col),
    )
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn letters() {
        assert_eq!(column_letters(0), "");
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(52), "AZ");
        assert_eq!(column_letters(53), "BA");
        assert_eq!(column_letters(702), "ZZ");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn ranges() {
        assert_eq!(a1_range("Sheet1", 1, 1, 5, 1), "'Sheet1'!A1:E1");
        assert_eq!(a1_range("Bob's answers", 3, 2, 3, 40), "'Bob''s answers'!C2:C40");
    }

    #[test]
    fn finds_first_ein_column() {
        let headers: Vec<String> = ["Timestamp", "Your EIN", "Confirm EIN"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(ein_column(&headers), Some(2));
        assert_eq!(ein_column(&["Timestamp".to_string()]), None);
        // Header matching is case sensitive.
        assert_eq!(ein_column(&["your ein".to_string()]), None);
    }

    #[test]
    fn parses_api_responses() {
        let spreadsheet: Spreadsheet = serde_json::from_str(
            r#"{
                "spreadsheetId": "abc",
                "sheets": [{
                    "properties": {
                        "sheetId": 0,
                        "title": "Form Responses 1",
                        "gridProperties": {"rowCount": 1000, "columnCount": 26}
                    }
                }]
            }"#,
        )
        .unwrap();
        let info = &spreadsheet.sheets[0].properties;
        assert_eq!(info.title, "Form Responses 1");
        assert_eq!(info.grid_properties.row_count, 1000);

        let empty: ValueRange =
            serde_json::from_str(r#"{"range": "'Sheet1'!B2:B10", "majorDimension": "COLUMNS"}"#)
                .unwrap();
        assert!(empty.values.is_empty());
    }

    #[test]
    fn builds_api_urls() {
        let sheets = GoogleSheets::new("key".to_string())
            .with_base_url("http://localhost:8080/".to_string());
        let url = sheets
            .url(&["abc", "values", "'Form Responses 1'!C2:C9"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v4/spreadsheets/abc/values/'Form%20Responses%201'!C2:C9"
        );
    }
}
