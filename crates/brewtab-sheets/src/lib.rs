//! Google Sheets adapter.
//!
//! Implements the `brewtab-core` [`LedgerStore`] port over the Sheets v4
//! values API. One tab (the configured sheet title), columns `A:E`.

pub mod auth;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use url::Url;

use brewtab_core::{config::Config, errors::Error, ledger::port::LedgerStore, Result};

use auth::{ServiceAccountKey, TokenSource};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

pub struct SheetsLedgerStore {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_title: String,
    tokens: TokenSource,
    sheet_id: OnceCell<i64>,
}

impl SheetsLedgerStore {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_title: impl Into<String>,
        tokens: TokenSource,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("brewtab/0.1")
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_title: sheet_title.into(),
            tokens,
            sheet_id: OnceCell::new(),
        })
    }

    /// Build from config: a service-account key file wins over a static token.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let tokens = if let Some(path) = &cfg.google_credentials_file {
            TokenSource::service_account(ServiceAccountKey::from_file(path)?)
        } else if let Some(token) = &cfg.google_access_token {
            TokenSource::fixed(token.expose_secret())
        } else {
            return Err(Error::Config(
                "GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_ACCESS_TOKEN is required".to_string(),
            ));
        };
        Self::new(cfg.spreadsheet_id.clone(), cfg.sheet_title.clone(), tokens)
    }

    /// Point at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// A1 range on our tab, with the title quoted.
    fn range(&self, cells: &str) -> String {
        format!("'{}'!{cells}", self.sheet_title.replace('\'', "''"))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid sheets base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config("sheets base url cannot be a base".to_string()))?
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let last = format!("{range}{suffix}");
        self.url(&["spreadsheets", &self.spreadsheet_id, "values", &last])
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let token = self.tokens.access_token(&self.http).await?;
        let resp = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::External(format!("sheets {what} request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "sheets {what} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(resp)
    }

    async fn get_values(&self, cells: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(&self.range(cells), "")?;
        let resp = self.send(self.http.get(url), "read").await?;
        let parsed: ValueRange = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("sheets read json error: {e}")))?;
        Ok(parsed
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    /// Numeric id of the configured tab, resolved once per process.
    pub async fn find_sheet_identifier(&self) -> Result<i64> {
        self.sheet_id
            .get_or_try_init(|| async {
                let mut url = self.url(&["spreadsheets", &self.spreadsheet_id])?;
                url.query_pairs_mut()
                    .append_pair("fields", "sheets.properties(sheetId,title)");
                let resp = self.send(self.http.get(url), "metadata").await?;
                let meta: SpreadsheetMeta = resp
                    .json()
                    .await
                    .map_err(|e| Error::External(format!("sheets metadata json error: {e}")))?;

                let id = meta
                    .sheets
                    .into_iter()
                    .find(|s| s.properties.title == self.sheet_title)
                    .map(|s| s.properties.sheet_id)
                    .ok_or_else(|| {
                        Error::NotFound(format!("sheet titled {:?}", self.sheet_title))
                    })?;
                tracing::info!(sheet = %self.sheet_title, sheet_id = id, "resolved sheet id");
                Ok(id)
            })
            .await
            .copied()
    }
}

fn cell_to_string(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerStore for SheetsLedgerStore {
    async fn first_row(&self) -> Result<Vec<String>> {
        Ok(self
            .get_values("A1:E1")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn write_header(&self, header: &[&str]) -> Result<()> {
        let range = self.range("A1:E1");
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [header],
        });
        self.send(self.http.put(url).json(&body), "header write")
            .await?;
        Ok(())
    }

    async fn append_row(&self, values: Vec<String>) -> Result<()> {
        let mut url = self.values_url(&self.range("A:E"), ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({
            "majorDimension": "ROWS",
            "values": [values],
        });
        self.send(self.http.post(url).json(&body), "append").await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Vec<String>>> {
        self.get_values("A:E").await
    }

    async fn delete_row(&self, index: usize) -> Result<()> {
        let sheet_id = self.find_sheet_identifier().await?;
        let url = self.url(&[
            "spreadsheets",
            &format!("{}:batchUpdate", self.spreadsheet_id),
        ])?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": index,
                        "endIndex": index + 1,
                    }
                }
            }]
        });
        self.send(self.http.post(url).json(&body), "delete").await?;
        tracing::debug!(row = index, "ledger row deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, path_regex, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn store(server: &MockServer) -> SheetsLedgerStore {
        SheetsLedgerStore::new("sheet-123", "Sheet1", TokenSource::fixed("tok"))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn read_all_stringifies_cells_and_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/sheet-123/values/.*A:E$"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Sheet1!A1:E3",
                "majorDimension": "ROWS",
                "values": [
                    ["UserID", "UserName", "Date", "Choice", "Price"],
                    ["U1", "Ada", "2024-05-01T10:00:00+00:00", "coffee", 2],
                    ["U2"]
                ]
            })))
            .mount(&server)
            .await;

        let rows = store(&server).read_all().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][4], "2");
        assert_eq!(rows[2], vec!["U2".to_string()]);
    }

    #[tokio::test]
    async fn first_row_of_empty_sheet_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/sheet-123/values/.*A1:E1$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "range": "Sheet1!A1:E1" })),
            )
            .mount(&server)
            .await;

        assert!(store(&server).first_row().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_uses_raw_insert_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/spreadsheets/sheet-123/values/.*A:E:append$"))
            .and(query_param("valueInputOption", "RAW"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(body_partial_json(json!({ "values": [["U1", "Ada", "d", "tea", "1.5"]] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .append_row(vec![
                "U1".into(),
                "Ada".into(),
                "d".into(),
                "tea".into(),
                "1.5".into(),
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_row_resolves_sheet_id_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/sheet-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    { "properties": { "sheetId": 0, "title": "Other" } },
                    { "properties": { "sheetId": 42, "title": "Sheet1" } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/sheet-123:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{ "deleteDimension": { "range": {
                    "sheetId": 42, "dimension": "ROWS", "startIndex": 3, "endIndex": 4
                }}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let s = store(&server);
        s.delete_row(3).await.unwrap();
        s.delete_row(3).await.unwrap();
        assert_eq!(s.find_sheet_identifier().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn missing_sheet_title_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/sheet-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "sheetId": 0, "title": "Other" } }]
            })))
            .mount(&server)
            .await;

        let err = store(&server).find_sheet_identifier().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn api_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = store(&server).read_all().await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("403"), "{msg}");
    }

    #[test]
    fn range_quotes_titles_with_apostrophes() {
        let s = SheetsLedgerStore::new("id", "Bob's tab", TokenSource::fixed("t")).unwrap();
        assert_eq!(s.range("A:E"), "'Bob''s tab'!A:E");
    }

    #[test]
    fn from_config_requires_credentials() {
        let cfg = Config {
            spreadsheet_id: "id".into(),
            ..Config::default()
        };
        assert!(matches!(
            SheetsLedgerStore::from_config(&cfg),
            Err(Error::Config(_))
        ));
    }
}
